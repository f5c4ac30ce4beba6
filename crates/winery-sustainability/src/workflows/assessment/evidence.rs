use serde::{Deserialize, Serialize};

use super::domain::EvidenceUpload;

pub const DEFAULT_MAX_EVIDENCE_BYTES: u64 = 10 * 1024 * 1024;

const PDF_MAGIC: &[u8] = b"%PDF";

/// Upload rules for evidence attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidencePolicy {
    pub max_bytes: u64,
}

impl Default for EvidencePolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_EVIDENCE_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvidenceRejection {
    #[error("evidence file is empty")]
    Empty,
    #[error("evidence must be a PDF document ('{0}' given)")]
    NotPdf(String),
    #[error("evidence is {size} bytes, limit is {max} bytes")]
    TooLarge { size: u64, max: u64 },
}

impl EvidencePolicy {
    pub fn validate(&self, upload: &EvidenceUpload) -> Result<(), EvidenceRejection> {
        if upload.bytes.is_empty() {
            return Err(EvidenceRejection::Empty);
        }

        let size = upload.bytes.len() as u64;
        if size > self.max_bytes {
            return Err(EvidenceRejection::TooLarge {
                size,
                max: self.max_bytes,
            });
        }

        let declared_pdf = upload
            .content_type
            .parse::<mime::Mime>()
            .map(|parsed| parsed.essence_str() == mime::APPLICATION_PDF.essence_str())
            .unwrap_or(false);
        let pdf_extension = upload
            .file_name
            .rsplit_once('.')
            .map(|(_, extension)| extension.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);

        if !declared_pdf || !pdf_extension || !upload.bytes.starts_with(PDF_MAGIC) {
            return Err(EvidenceRejection::NotPdf(upload.file_name.clone()));
        }

        Ok(())
    }
}

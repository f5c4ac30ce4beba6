use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::domain::{
    AnswerDraft, Assessment, AssessmentId, Chapter, Evidence, EvidenceFile, EvidenceUpload,
    ResponseId, SavedResponse, Segment, SegmentId, StoredResponse, WineryId,
};
use super::scoring::ScoreReport;

/// Outcome of asking the backend for an assessment to work on.
#[derive(Debug, Clone, PartialEq)]
pub enum Bootstrap {
    /// A fresh assessment was opened for the winery.
    Created(Assessment),
    /// The winery already had an open assessment.
    Resumed {
        assessment: Assessment,
        responses: Vec<StoredResponse>,
    },
}

impl Bootstrap {
    pub fn assessment(&self) -> &Assessment {
        match self {
            Bootstrap::Created(assessment) => assessment,
            Bootstrap::Resumed { assessment, .. } => assessment,
        }
    }
}

/// Results of a completed assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentResults {
    pub assessment: Assessment,
    pub report: ScoreReport,
}

/// Error categories shared by every collaborator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    Transport,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("backend unavailable: {0}")]
    Transport(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Validation(_) => ErrorKind::Validation,
            GatewayError::Conflict(_) => ErrorKind::Conflict,
            GatewayError::Transport(_) => ErrorKind::Transport,
            GatewayError::NotFound(_) => ErrorKind::NotFound,
        }
    }
}

/// Persistence collaborator driven by the flow controller. Implementations
/// are the single source of truth for assessment state and response
/// uniqueness.
#[async_trait]
pub trait AssessmentGateway: Send + Sync {
    async fn create_or_resume(&self, winery_id: WineryId) -> Result<Bootstrap, GatewayError>;

    /// Structure with `enabled` flags for the assessment's current segment.
    async fn fetch_structure(&self, assessment_id: AssessmentId)
        -> Result<Vec<Chapter>, GatewayError>;

    async fn fetch_segments(&self, assessment_id: AssessmentId)
        -> Result<Vec<Segment>, GatewayError>;

    async fn choose_segment(
        &self,
        assessment_id: AssessmentId,
        segment_id: SegmentId,
    ) -> Result<(), GatewayError>;

    /// Upserts answers; one response per indicator.
    async fn save_responses(
        &self,
        assessment_id: AssessmentId,
        answers: &[AnswerDraft],
    ) -> Result<Vec<SavedResponse>, GatewayError>;

    /// Fails when any enabled indicator is still unanswered.
    async fn finalize(&self, assessment_id: AssessmentId) -> Result<(), GatewayError>;

    async fn cancel(&self, assessment_id: AssessmentId) -> Result<(), GatewayError>;

    async fn upload_evidence(
        &self,
        assessment_id: AssessmentId,
        response_id: ResponseId,
        upload: EvidenceUpload,
    ) -> Result<Evidence, GatewayError>;

    async fn delete_evidence(
        &self,
        assessment_id: AssessmentId,
        response_id: ResponseId,
    ) -> Result<(), GatewayError>;

    async fn download_evidence(
        &self,
        assessment_id: AssessmentId,
        response_id: ResponseId,
    ) -> Result<EvidenceFile, GatewayError>;

    async fn fetch_history(&self, winery_id: WineryId) -> Result<Vec<Assessment>, GatewayError>;

    async fn fetch_results(
        &self,
        assessment_id: AssessmentId,
    ) -> Result<AssessmentResults, GatewayError>;
}

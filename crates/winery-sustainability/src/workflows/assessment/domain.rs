use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Winery owning one or more assessments.
    WineryId
);
numeric_id!(AssessmentId);
numeric_id!(ChapterId);
numeric_id!(IndicatorId);
numeric_id!(LevelId);
numeric_id!(SegmentId);
numeric_id!(
    /// Backend identity of a persisted answer, used to address its evidence.
    ResponseId
);

/// Questionnaire chapter. Indicator order drives navigation and is preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    pub name: String,
    pub indicators: Vec<Indicator>,
}

impl Chapter {
    pub fn enabled_indicators(&self) -> impl Iterator<Item = &Indicator> {
        self.indicators.iter().filter(|indicator| indicator.enabled)
    }
}

/// A single practice being assessed. `enabled` reflects the selected segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub id: IndicatorId,
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub levels: Vec<ResponseLevel>,
}

impl Indicator {
    /// Largest point value across the levels; zero when no levels exist.
    pub fn max_points(&self) -> u32 {
        self.levels
            .iter()
            .map(|level| level.points)
            .max()
            .unwrap_or(0)
    }

    pub fn level(&self, level_id: LevelId) -> Option<&ResponseLevel> {
        self.levels.iter().find(|level| level.id == level_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseLevel {
    pub id: LevelId,
    pub points: u32,
    pub name: String,
    pub description: String,
}

/// Size / tourism-volume segment that decides which indicators apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub name: String,
    pub min_visitors: u32,
    pub max_visitors: Option<u32>,
}

impl Segment {
    pub fn visitor_range_label(&self) -> String {
        match self.max_visitors {
            Some(max) => format!("{} - {} visitors/year", self.min_visitors, max),
            None => format!("{}+ visitors/year", self.min_visitors),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl AssessmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Pending and in-progress assessments can still be resumed and edited.
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: AssessmentId,
    pub winery_id: WineryId,
    pub status: AssessmentStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub segment_id: Option<SegmentId>,
}

/// Metadata of a PDF attached to a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub file_name: String,
    pub size_bytes: u64,
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// Response as persisted by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub response_id: ResponseId,
    pub indicator_id: IndicatorId,
    pub level_id: LevelId,
    pub points: u32,
    pub evidence: Option<Evidence>,
}

/// Locally held answer for one indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub level_id: LevelId,
    pub points: u32,
    /// `None` until the backend acknowledges the save.
    pub response_id: Option<ResponseId>,
    pub evidence: Option<Evidence>,
}

impl Answer {
    pub fn new(level_id: LevelId, points: u32) -> Self {
        Self {
            level_id,
            points,
            response_id: None,
            evidence: None,
        }
    }
}

impl From<StoredResponse> for Answer {
    fn from(value: StoredResponse) -> Self {
        Self {
            level_id: value.level_id,
            points: value.points,
            response_id: Some(value.response_id),
            evidence: value.evidence,
        }
    }
}

/// Answers keyed by indicator; at most one per indicator.
pub type ResponseMap = BTreeMap<IndicatorId, Answer>;

/// Builds a response map from persisted responses. Later entries for the same
/// indicator replace earlier ones, mirroring backend upsert semantics.
pub fn hydrate_responses<I>(responses: I) -> ResponseMap
where
    I: IntoIterator<Item = StoredResponse>,
{
    responses
        .into_iter()
        .map(|response| (response.indicator_id, Answer::from(response)))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRole {
    Winery,
    Administrator,
}

/// Explicit session context handed to the controller by whoever owns login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinerySession {
    pub winery_id: WineryId,
    pub user_email: String,
    pub role: SessionRole,
}

impl WinerySession {
    pub fn winery(winery_id: WineryId, user_email: impl Into<String>) -> Self {
        Self {
            winery_id,
            user_email: user_email.into(),
            role: SessionRole::Winery,
        }
    }
}

/// Answer payload sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerDraft {
    pub indicator_id: IndicatorId,
    pub level_id: LevelId,
}

/// Backend acknowledgement of a saved answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedResponse {
    pub response_id: ResponseId,
    pub indicator_id: IndicatorId,
    pub level_id: LevelId,
}

/// PDF payload handed to the evidence collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(response: u64, indicator: u64, level: u64, points: u32) -> StoredResponse {
        StoredResponse {
            response_id: ResponseId(response),
            indicator_id: IndicatorId(indicator),
            level_id: LevelId(level),
            points,
            evidence: None,
        }
    }

    #[test]
    fn max_points_defaults_to_zero_without_levels() {
        let indicator = Indicator {
            id: IndicatorId(1),
            name: "Water".to_string(),
            description: String::new(),
            enabled: true,
            levels: Vec::new(),
        };
        assert_eq!(indicator.max_points(), 0);
    }

    #[test]
    fn hydrate_keeps_one_entry_per_indicator() {
        let map = hydrate_responses(vec![stored(1, 10, 100, 1), stored(2, 11, 110, 2)]);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&IndicatorId(11)].response_id, Some(ResponseId(2)));

        let map = hydrate_responses(vec![stored(1, 10, 100, 1), stored(1, 10, 101, 3)]);
        assert_eq!(map.len(), 1);
        assert_eq!(map[&IndicatorId(10)].points, 3);
    }

    #[test]
    fn open_statuses() {
        assert!(AssessmentStatus::Pending.is_open());
        assert!(AssessmentStatus::InProgress.is_open());
        assert!(!AssessmentStatus::Completed.is_open());
        assert!(!AssessmentStatus::Cancelled.is_open());
    }
}

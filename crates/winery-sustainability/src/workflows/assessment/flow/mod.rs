//! Client-side assessment flow.
//!
//! The controller walks a winery through segment selection, chapter-by-chapter
//! answering and finalization, delegating every side effect to an
//! [`AssessmentGateway`](super::gateway::AssessmentGateway). Failed calls never
//! commit a partial transition: the state stays where it was and a notice is
//! left for the user to dismiss or retry.

mod controller;
mod tracker;

pub use controller::FlowController;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Assessment, AssessmentId, IndicatorId, LevelId, ResponseId, SegmentId};
use super::evidence::{EvidencePolicy, EvidenceRejection};
use super::gateway::{ErrorKind, GatewayError};
use super::scoring::ChaptersProgress;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FlowState {
    Loading,
    SegmentSelection,
    ChapterView { chapter: usize },
    PendingConflict(PendingSummary),
    Completed,
    Cancelled,
}

impl FlowState {
    pub const fn label(&self) -> &'static str {
        match self {
            FlowState::Loading => "loading",
            FlowState::SegmentSelection => "segment selection",
            FlowState::ChapterView { .. } => "chapter view",
            FlowState::PendingConflict(_) => "pending conflict",
            FlowState::Completed => "completed",
            FlowState::Cancelled => "cancelled",
        }
    }
}

/// What the user is told about an assessment left open earlier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSummary {
    pub assessment_id: AssessmentId,
    pub started_at: DateTime<Utc>,
    pub segment_id: Option<SegmentId>,
    pub saved_responses: usize,
}

impl PendingSummary {
    pub fn segment_chosen(&self) -> bool {
        self.segment_id.is_some()
    }
}

/// User-triggered operations whose in-flight status is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowAction {
    Bootstrap,
    ResolvePending,
    SelectSegment,
    SaveAnswer(IndicatorId),
    Evidence(IndicatorId),
    DownloadEvidence(IndicatorId),
    Finalize,
    Cancel,
    History,
    Results,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("{0:?} is already in progress")]
    Busy(FlowAction),
    #[error("{action:?} is not available during {state}")]
    InvalidTransition {
        action: FlowAction,
        state: &'static str,
    },
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Evidence(#[from] EvidenceRejection),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Transport(String),
    #[error("{0}")]
    NotFound(String),
    #[error("the view that started this request is no longer active")]
    Stale,
}

impl FlowError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            FlowError::Validation(_) | FlowError::Evidence(_) => Some(ErrorKind::Validation),
            FlowError::Conflict(_) => Some(ErrorKind::Conflict),
            FlowError::Transport(_) => Some(ErrorKind::Transport),
            FlowError::NotFound(_) => Some(ErrorKind::NotFound),
            FlowError::Busy(_) | FlowError::InvalidTransition { .. } | FlowError::Stale => None,
        }
    }
}

impl From<GatewayError> for FlowError {
    fn from(value: GatewayError) -> Self {
        match value {
            GatewayError::Validation(message) => FlowError::Validation(message),
            GatewayError::Conflict(message) => FlowError::Conflict(message),
            GatewayError::Transport(message) => FlowError::Transport(message),
            GatewayError::NotFound(message) => FlowError::NotFound(message),
        }
    }
}

/// Dismissable message left by a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlowSettings {
    pub evidence: EvidencePolicy,
}

/// Outcome of an answer change.
#[derive(Debug, PartialEq, Eq)]
pub enum AnswerOutcome {
    Saved,
    /// The indicator already had that level.
    Unchanged,
    /// Evidence is attached; nothing happens until the warning is confirmed.
    EvidenceWarning(EvidenceWarning),
}

/// Issued when a level change would delete attached evidence. Only
/// [`FlowController::confirm_level_change`] consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct EvidenceWarning {
    indicator_id: IndicatorId,
    level_id: LevelId,
    response_id: ResponseId,
    file_name: String,
    epoch: u64,
}

impl EvidenceWarning {
    pub fn indicator_id(&self) -> IndicatorId {
        self.indicator_id
    }

    pub fn level_id(&self) -> LevelId {
        self.level_id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn message(&self) -> String {
        format!(
            "Changing this answer will delete the attached evidence '{}'.",
            self.file_name
        )
    }
}

/// Proof that the user confirmed leaving the current segment context.
#[derive(Debug, PartialEq, Eq)]
pub struct SegmentChangeConfirmation {
    assessment_id: AssessmentId,
    epoch: u64,
}

/// Render-ready view of the controller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowSnapshot {
    pub state: FlowState,
    pub assessment: Option<Assessment>,
    pub chapter_count: usize,
    pub answered: usize,
    pub total: usize,
    pub can_finalize: bool,
    pub progress: ChaptersProgress,
    pub percentage: u8,
    pub in_flight: Vec<FlowAction>,
    pub notice: Option<Notice>,
}

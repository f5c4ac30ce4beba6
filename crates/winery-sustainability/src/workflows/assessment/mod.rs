//! Sustainability self-assessment for wineries: questionnaire model, scoring
//! engine, persistence gateway and the client-side flow that drives it.

pub mod backend;
pub mod domain;
pub mod evidence;
pub mod flow;
pub mod gateway;
pub mod router;
pub mod scoring;
pub mod wire;

#[cfg(test)]
mod tests;

pub use backend::InMemoryBackend;
pub use domain::{
    Answer, AnswerDraft, Assessment, AssessmentId, AssessmentStatus, Chapter, ChapterId,
    Evidence, EvidenceFile, EvidenceUpload, Indicator, IndicatorId, LevelId, ResponseId,
    ResponseLevel, ResponseMap, SavedResponse, Segment, SegmentId, SessionRole, StoredResponse,
    WineryId, WinerySession,
};
pub use evidence::{EvidencePolicy, EvidenceRejection, DEFAULT_MAX_EVIDENCE_BYTES};
pub use flow::{
    AnswerOutcome, EvidenceWarning, FlowAction, FlowController, FlowError, FlowSettings,
    FlowSnapshot, FlowState, Notice, PendingSummary, SegmentChangeConfirmation,
};
pub use gateway::{AssessmentGateway, AssessmentResults, Bootstrap, ErrorKind, GatewayError};
pub use router::{scoring_router, ScoringContext};
pub use scoring::{
    ChapterScore, ChaptersProgress, ScoreReport, ScoreTotals, SegmentLevel, SegmentTierTable,
    SustainabilityTier, TierTable,
};

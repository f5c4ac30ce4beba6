use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::domain::SegmentId;
use super::scoring::{ScoreReport, SegmentTierTable, TierTable};
use super::wire::{normalize_responses, normalize_structure, WireChapter, WireResponse};

/// Tables the scoring endpoint classifies results with.
#[derive(Debug, Clone, Default)]
pub struct ScoringContext {
    pub tiers: TierTable,
    pub segment_tiers: SegmentTierTable,
}

/// Payload of `POST /api/v1/scoring/report`, accepted in any spelling the
/// backend uses for structures and responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringRequest {
    #[serde(alias = "estructura", alias = "capitulos")]
    pub structure: Vec<WireChapter>,
    #[serde(default, alias = "respuestas")]
    pub responses: Vec<WireResponse>,
    #[serde(default, alias = "id_segmento", alias = "idSegmento")]
    pub segment_id: Option<u64>,
}

/// Stateless scoring endpoint: structure and responses in, report out.
pub fn scoring_router(context: Arc<ScoringContext>) -> Router {
    Router::new()
        .route("/api/v1/scoring/report", post(report_handler))
        .with_state(context)
}

pub(crate) async fn report_handler(
    State(context): State<Arc<ScoringContext>>,
    axum::Json(request): axum::Json<ScoringRequest>,
) -> Response {
    let structure = normalize_structure(request.structure);
    if structure.is_empty() {
        let payload = json!({
            "error": "structure must contain at least one chapter",
        });
        return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
    }

    let responses = normalize_responses(request.responses, &structure);
    let segment = request
        .segment_id
        .map(|segment_id| (SegmentId(segment_id), &context.segment_tiers));
    let report = ScoreReport::build(&responses, &structure, &context.tiers, segment);

    debug!(
        chapters = structure.len(),
        responses = responses.len(),
        percentage = report.totals.percentage,
        "scored report request"
    );
    (StatusCode::OK, axum::Json(report)).into_response()
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use serde_json::Value;
use tokio::sync::Notify;

use crate::workflows::assessment::backend::InMemoryBackend;
use crate::workflows::assessment::domain::{
    Answer, AnswerDraft, Assessment, AssessmentId, Chapter, ChapterId, Evidence, EvidenceFile,
    EvidenceUpload, Indicator, IndicatorId, LevelId, ResponseId, ResponseLevel, ResponseMap,
    SavedResponse, Segment, SegmentId, WineryId, WinerySession,
};
use crate::workflows::assessment::evidence::EvidencePolicy;
use crate::workflows::assessment::flow::{FlowController, FlowSettings};
use crate::workflows::assessment::gateway::{
    AssessmentGateway, AssessmentResults, Bootstrap, GatewayError,
};
use crate::workflows::assessment::scoring::TierTable;
use crate::workflows::catalog::QuestionnaireCatalog;

pub(super) const SMALL: SegmentId = SegmentId(1);
pub(super) const MEDIUM: SegmentId = SegmentId(2);
pub(super) const LARGE: SegmentId = SegmentId(3);

pub(super) fn level(id: u64, points: u32) -> ResponseLevel {
    ResponseLevel {
        id: LevelId(id),
        points,
        name: format!("Nivel {points}"),
        description: String::new(),
    }
}

/// Level ids follow the sample catalog convention: `indicator * 10 + points`.
pub(super) fn indicator(id: u64, enabled: bool, points: &[u32]) -> Indicator {
    Indicator {
        id: IndicatorId(id),
        name: format!("Indicador {id}"),
        description: String::new(),
        enabled,
        levels: points
            .iter()
            .map(|points| level(id * 10 + u64::from(*points), *points))
            .collect(),
    }
}

pub(super) fn chapter(id: u64, indicators: Vec<Indicator>) -> Chapter {
    Chapter {
        id: ChapterId(id),
        name: format!("Capítulo {id}"),
        indicators,
    }
}

/// Chapter 1 holds indicators 11 and 12 (max 3 each), chapter 2 holds 21 (max 2).
pub(super) fn two_chapter_structure() -> Vec<Chapter> {
    vec![
        chapter(
            1,
            vec![
                indicator(11, true, &[0, 1, 2, 3]),
                indicator(12, true, &[0, 1, 2, 3]),
            ],
        ),
        chapter(2, vec![indicator(21, true, &[0, 1, 2])]),
    ]
}

pub(super) fn answer(indicator: u64, points: u32) -> (IndicatorId, Answer) {
    (
        IndicatorId(indicator),
        Answer::new(LevelId(indicator * 10 + u64::from(points)), points),
    )
}

pub(super) fn responses<const N: usize>(answers: [(u64, u32); N]) -> ResponseMap {
    answers
        .into_iter()
        .map(|(indicator, points)| answer(indicator, points))
        .collect()
}

/// Every enabled indicator answered at its top level.
pub(super) fn full_marks(structure: &[Chapter]) -> ResponseMap {
    structure
        .iter()
        .flat_map(|chapter| chapter.enabled_indicators())
        .filter_map(|indicator| {
            indicator
                .levels
                .iter()
                .max_by_key(|level| level.points)
                .map(|top| (indicator.id, Answer::new(top.id, top.points)))
        })
        .collect()
}

pub(super) fn session() -> WinerySession {
    WinerySession::winery(WineryId(7), "bodega@example.com")
}

pub(super) fn sample_backend() -> Arc<InMemoryBackend> {
    let catalog = QuestionnaireCatalog::sample().expect("sample catalog parses");
    let segment_tiers =
        QuestionnaireCatalog::sample_segment_tiers().expect("sample segment tiers parse");
    Arc::new(InMemoryBackend::with_tables(
        catalog,
        TierTable::standard(),
        segment_tiers,
        EvidencePolicy::default(),
    ))
}

pub(super) fn pdf(name: &str) -> EvidenceUpload {
    EvidenceUpload {
        file_name: name.to_string(),
        content_type: "application/pdf".to_string(),
        bytes: b"%PDF-1.4\n% plan de sostenibilidad\n".to_vec(),
    }
}

/// Level id in the sample catalog for `indicator` answered at `points`.
pub(super) fn sample_level(indicator: u64, points: u64) -> LevelId {
    LevelId(indicator * 10 + points)
}

pub(super) type ScriptedController = FlowController<ScriptedGateway>;

pub(super) fn controller() -> (Arc<ScriptedController>, Arc<ScriptedGateway>) {
    let gateway = Arc::new(ScriptedGateway::new(sample_backend()));
    let controller = Arc::new(FlowController::new(
        gateway.clone(),
        session(),
        FlowSettings::default(),
    ));
    (controller, gateway)
}

/// Controller already in the first chapter of a small-winery assessment.
pub(super) async fn controller_in_chapters() -> (Arc<ScriptedController>, Arc<ScriptedGateway>) {
    let (controller, gateway) = controller();
    controller.bootstrap().await.expect("bootstrap succeeds");
    controller
        .select_segment(SMALL)
        .await
        .expect("segment selection succeeds");
    (controller, gateway)
}

/// Answers every enabled indicator at `points`.
pub(super) async fn answer_everything(controller: &ScriptedController, points: u64) {
    for chapter in controller.structure() {
        for indicator in chapter.enabled_indicators() {
            controller
                .answer(indicator.id, sample_level(indicator.id.0, points))
                .await
                .expect("answer saves");
        }
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Lets a test pause one gateway call mid-flight.
#[derive(Default)]
pub(super) struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    pub(super) async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub(super) fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Default)]
struct Script {
    failures: HashMap<&'static str, GatewayError>,
    hold: Option<(&'static str, Arc<Gate>)>,
    calls: Vec<&'static str>,
}

/// Wraps the in-memory backend with call recording, one-shot failures and
/// gates.
pub(super) struct ScriptedGateway {
    backend: Arc<InMemoryBackend>,
    script: Mutex<Script>,
}

impl ScriptedGateway {
    pub(super) fn new(backend: Arc<InMemoryBackend>) -> Self {
        Self {
            backend,
            script: Mutex::new(Script::default()),
        }
    }

    pub(super) fn backend(&self) -> &InMemoryBackend {
        &self.backend
    }

    pub(super) fn fail_next(&self, operation: &'static str, error: GatewayError) {
        self.script
            .lock()
            .expect("script lock")
            .failures
            .insert(operation, error);
    }

    pub(super) fn hold(&self, operation: &'static str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.script.lock().expect("script lock").hold = Some((operation, gate.clone()));
        gate
    }

    pub(super) fn calls(&self) -> Vec<&'static str> {
        self.script.lock().expect("script lock").calls.clone()
    }

    pub(super) fn count(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == operation)
            .count()
    }

    async fn enter(&self, operation: &'static str) -> Result<(), GatewayError> {
        let (failure, gate) = {
            let mut script = self.script.lock().expect("script lock");
            script.calls.push(operation);
            let failure = script.failures.remove(operation);
            let gate = match script.hold.take() {
                Some((held, gate)) if held == operation => Some(gate),
                other => {
                    script.hold = other;
                    None
                }
            };
            (failure, gate)
        };

        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        failure.map_or(Ok(()), Err)
    }
}

#[async_trait]
impl AssessmentGateway for ScriptedGateway {
    async fn create_or_resume(&self, winery_id: WineryId) -> Result<Bootstrap, GatewayError> {
        self.enter("create_or_resume").await?;
        self.backend.create_or_resume(winery_id).await
    }

    async fn fetch_structure(
        &self,
        assessment_id: AssessmentId,
    ) -> Result<Vec<Chapter>, GatewayError> {
        self.enter("fetch_structure").await?;
        self.backend.fetch_structure(assessment_id).await
    }

    async fn fetch_segments(
        &self,
        assessment_id: AssessmentId,
    ) -> Result<Vec<Segment>, GatewayError> {
        self.enter("fetch_segments").await?;
        self.backend.fetch_segments(assessment_id).await
    }

    async fn choose_segment(
        &self,
        assessment_id: AssessmentId,
        segment_id: SegmentId,
    ) -> Result<(), GatewayError> {
        self.enter("choose_segment").await?;
        self.backend.choose_segment(assessment_id, segment_id).await
    }

    async fn save_responses(
        &self,
        assessment_id: AssessmentId,
        answers: &[AnswerDraft],
    ) -> Result<Vec<SavedResponse>, GatewayError> {
        self.enter("save_responses").await?;
        self.backend.save_responses(assessment_id, answers).await
    }

    async fn finalize(&self, assessment_id: AssessmentId) -> Result<(), GatewayError> {
        self.enter("finalize").await?;
        self.backend.finalize(assessment_id).await
    }

    async fn cancel(&self, assessment_id: AssessmentId) -> Result<(), GatewayError> {
        self.enter("cancel").await?;
        self.backend.cancel(assessment_id).await
    }

    async fn upload_evidence(
        &self,
        assessment_id: AssessmentId,
        response_id: ResponseId,
        upload: EvidenceUpload,
    ) -> Result<Evidence, GatewayError> {
        self.enter("upload_evidence").await?;
        self.backend
            .upload_evidence(assessment_id, response_id, upload)
            .await
    }

    async fn delete_evidence(
        &self,
        assessment_id: AssessmentId,
        response_id: ResponseId,
    ) -> Result<(), GatewayError> {
        self.enter("delete_evidence").await?;
        self.backend
            .delete_evidence(assessment_id, response_id)
            .await
    }

    async fn download_evidence(
        &self,
        assessment_id: AssessmentId,
        response_id: ResponseId,
    ) -> Result<EvidenceFile, GatewayError> {
        self.enter("download_evidence").await?;
        self.backend
            .download_evidence(assessment_id, response_id)
            .await
    }

    async fn fetch_history(&self, winery_id: WineryId) -> Result<Vec<Assessment>, GatewayError> {
        self.enter("fetch_history").await?;
        self.backend.fetch_history(winery_id).await
    }

    async fn fetch_results(
        &self,
        assessment_id: AssessmentId,
    ) -> Result<AssessmentResults, GatewayError> {
        self.enter("fetch_results").await?;
        self.backend.fetch_results(assessment_id).await
    }
}

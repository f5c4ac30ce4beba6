use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use super::domain::{
    hydrate_responses, AnswerDraft, Assessment, AssessmentId, AssessmentStatus, Chapter, Evidence,
    EvidenceFile, EvidenceUpload, IndicatorId, ResponseId, SavedResponse, Segment, SegmentId,
    StoredResponse, WineryId,
};
use super::evidence::EvidencePolicy;
use super::gateway::{AssessmentGateway, AssessmentResults, Bootstrap, GatewayError};
use super::scoring::{answered_counts, ScoreReport, SegmentTierTable, TierTable};
use crate::workflows::catalog::QuestionnaireCatalog;

#[derive(Debug, Clone)]
struct AssessmentRecord {
    assessment: Assessment,
    responses: BTreeMap<IndicatorId, StoredResponse>,
    evidence_files: BTreeMap<ResponseId, EvidenceFile>,
}

#[derive(Debug, Default)]
struct BackendState {
    next_assessment: u64,
    next_response: u64,
    records: BTreeMap<AssessmentId, AssessmentRecord>,
}

impl BackendState {
    fn record(&self, id: AssessmentId) -> Result<&AssessmentRecord, GatewayError> {
        self.records
            .get(&id)
            .ok_or_else(|| GatewayError::NotFound(format!("assessment {id}")))
    }

    fn record_mut(&mut self, id: AssessmentId) -> Result<&mut AssessmentRecord, GatewayError> {
        self.records
            .get_mut(&id)
            .ok_or_else(|| GatewayError::NotFound(format!("assessment {id}")))
    }

    /// Mutations are only accepted while the assessment is still open.
    fn open_record_mut(
        &mut self,
        id: AssessmentId,
    ) -> Result<&mut AssessmentRecord, GatewayError> {
        let record = self.record_mut(id)?;
        if !record.assessment.status.is_open() {
            return Err(GatewayError::Conflict(format!(
                "assessment {id} is {}",
                record.assessment.status.label().to_lowercase()
            )));
        }
        Ok(record)
    }
}

/// Reference backend holding every assessment in memory. It applies the same
/// rules the remote service does, which makes it the collaborator used by the
/// demo and the test-suite.
pub struct InMemoryBackend {
    catalog: QuestionnaireCatalog,
    tiers: TierTable,
    segment_tiers: SegmentTierTable,
    evidence: EvidencePolicy,
    state: Mutex<BackendState>,
}

impl InMemoryBackend {
    pub fn new(catalog: QuestionnaireCatalog) -> Self {
        Self::with_tables(
            catalog,
            TierTable::standard(),
            SegmentTierTable::default(),
            EvidencePolicy::default(),
        )
    }

    pub fn with_tables(
        catalog: QuestionnaireCatalog,
        tiers: TierTable,
        segment_tiers: SegmentTierTable,
        evidence: EvidencePolicy,
    ) -> Self {
        Self {
            catalog,
            tiers,
            segment_tiers,
            evidence,
            state: Mutex::new(BackendState::default()),
        }
    }

    pub fn catalog(&self) -> &QuestionnaireCatalog {
        &self.catalog
    }

    /// Current assessment row and responses, for inspection.
    pub fn stored(
        &self,
        assessment_id: AssessmentId,
    ) -> Result<(Assessment, Vec<StoredResponse>), GatewayError> {
        let state = self.state()?;
        let record = state.record(assessment_id)?;
        Ok((
            record.assessment.clone(),
            record.responses.values().cloned().collect(),
        ))
    }

    fn state(&self) -> Result<MutexGuard<'_, BackendState>, GatewayError> {
        self.state
            .lock()
            .map_err(|_| GatewayError::Transport("backend state poisoned".to_string()))
    }

    fn structure(&self, assessment: &Assessment) -> Vec<Chapter> {
        self.catalog.structure_for(assessment.segment_id)
    }
}

#[async_trait]
impl AssessmentGateway for InMemoryBackend {
    async fn create_or_resume(&self, winery_id: WineryId) -> Result<Bootstrap, GatewayError> {
        let mut state = self.state()?;

        if let Some(record) = state
            .records
            .values()
            .find(|record| record.assessment.winery_id == winery_id && record.assessment.status.is_open())
        {
            info!(assessment = %record.assessment.id, %winery_id, "resuming open assessment");
            return Ok(Bootstrap::Resumed {
                assessment: record.assessment.clone(),
                responses: record.responses.values().cloned().collect(),
            });
        }

        state.next_assessment += 1;
        let assessment = Assessment {
            id: AssessmentId(state.next_assessment),
            winery_id,
            status: AssessmentStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            segment_id: None,
        };
        state.records.insert(
            assessment.id,
            AssessmentRecord {
                assessment: assessment.clone(),
                responses: BTreeMap::new(),
                evidence_files: BTreeMap::new(),
            },
        );

        info!(assessment = %assessment.id, %winery_id, "created assessment");
        Ok(Bootstrap::Created(assessment))
    }

    async fn fetch_structure(
        &self,
        assessment_id: AssessmentId,
    ) -> Result<Vec<Chapter>, GatewayError> {
        let state = self.state()?;
        let record = state.record(assessment_id)?;
        Ok(self.structure(&record.assessment))
    }

    async fn fetch_segments(
        &self,
        assessment_id: AssessmentId,
    ) -> Result<Vec<Segment>, GatewayError> {
        let state = self.state()?;
        state.record(assessment_id)?;
        Ok(self.catalog.segments().to_vec())
    }

    async fn choose_segment(
        &self,
        assessment_id: AssessmentId,
        segment_id: SegmentId,
    ) -> Result<(), GatewayError> {
        if self.catalog.segment(segment_id).is_none() {
            return Err(GatewayError::NotFound(format!("segment {segment_id}")));
        }

        let mut state = self.state()?;
        let record = state.open_record_mut(assessment_id)?;
        record.assessment.segment_id = Some(segment_id);
        info!(assessment = %assessment_id, segment = %segment_id, "segment selected");
        Ok(())
    }

    async fn save_responses(
        &self,
        assessment_id: AssessmentId,
        answers: &[AnswerDraft],
    ) -> Result<Vec<SavedResponse>, GatewayError> {
        let mut state = self.state()?;

        // Validate the whole batch before touching anything.
        let mut resolved = Vec::with_capacity(answers.len());
        for draft in answers {
            let level = self
                .catalog
                .level(draft.indicator_id, draft.level_id)
                .ok_or_else(|| {
                    GatewayError::Validation(format!(
                        "level {} does not belong to indicator {}",
                        draft.level_id, draft.indicator_id
                    ))
                })?;
            resolved.push((*draft, level.points));
        }
        state.open_record_mut(assessment_id)?;

        let mut saved = Vec::with_capacity(resolved.len());
        for (draft, points) in resolved {
            let existing = state
                .record(assessment_id)?
                .responses
                .get(&draft.indicator_id)
                .map(|response| (response.response_id, response.evidence.clone()));
            let (response_id, evidence) = match existing {
                Some(existing) => existing,
                None => {
                    state.next_response += 1;
                    (ResponseId(state.next_response), None)
                }
            };

            let record = state.record_mut(assessment_id)?;
            record.responses.insert(
                draft.indicator_id,
                StoredResponse {
                    response_id,
                    indicator_id: draft.indicator_id,
                    level_id: draft.level_id,
                    points,
                    evidence,
                },
            );
            if record.assessment.status == AssessmentStatus::Pending {
                record.assessment.status = AssessmentStatus::InProgress;
            }

            saved.push(SavedResponse {
                response_id,
                indicator_id: draft.indicator_id,
                level_id: draft.level_id,
            });
        }

        Ok(saved)
    }

    async fn finalize(&self, assessment_id: AssessmentId) -> Result<(), GatewayError> {
        let mut state = self.state()?;
        let record = state.open_record_mut(assessment_id)?;

        if record.assessment.segment_id.is_none() {
            return Err(GatewayError::Validation(
                "a segment must be selected before finalizing".to_string(),
            ));
        }

        let structure = self.structure(&record.assessment);
        let responses = hydrate_responses(record.responses.values().cloned());
        let (answered, total) = answered_counts(&responses, &structure);
        if answered < total {
            return Err(GatewayError::Conflict(format!(
                "{} of {} indicators still unanswered",
                total - answered,
                total
            )));
        }

        record.assessment.status = AssessmentStatus::Completed;
        record.assessment.completed_at = Some(Utc::now());
        info!(assessment = %assessment_id, answered, "assessment completed");
        Ok(())
    }

    async fn cancel(&self, assessment_id: AssessmentId) -> Result<(), GatewayError> {
        let mut state = self.state()?;
        let record = state.open_record_mut(assessment_id)?;
        record.assessment.status = AssessmentStatus::Cancelled;
        info!(assessment = %assessment_id, "assessment cancelled");
        Ok(())
    }

    async fn upload_evidence(
        &self,
        assessment_id: AssessmentId,
        response_id: ResponseId,
        upload: EvidenceUpload,
    ) -> Result<Evidence, GatewayError> {
        self.evidence
            .validate(&upload)
            .map_err(|rejection| GatewayError::Validation(rejection.to_string()))?;

        let mut state = self.state()?;
        let record = state.open_record_mut(assessment_id)?;
        let response = record
            .responses
            .values_mut()
            .find(|response| response.response_id == response_id)
            .ok_or_else(|| GatewayError::NotFound(format!("response {response_id}")))?;

        let evidence = Evidence {
            file_name: upload.file_name.clone(),
            size_bytes: upload.bytes.len() as u64,
            uploaded_at: Some(Utc::now()),
        };
        response.evidence = Some(evidence.clone());
        record.evidence_files.insert(
            response_id,
            EvidenceFile {
                file_name: upload.file_name,
                content_type: upload.content_type,
                bytes: upload.bytes,
            },
        );

        Ok(evidence)
    }

    async fn delete_evidence(
        &self,
        assessment_id: AssessmentId,
        response_id: ResponseId,
    ) -> Result<(), GatewayError> {
        let mut state = self.state()?;
        let record = state.open_record_mut(assessment_id)?;
        if record.evidence_files.remove(&response_id).is_none() {
            return Err(GatewayError::NotFound(format!(
                "evidence for response {response_id}"
            )));
        }
        if let Some(response) = record
            .responses
            .values_mut()
            .find(|response| response.response_id == response_id)
        {
            response.evidence = None;
        }
        Ok(())
    }

    async fn download_evidence(
        &self,
        assessment_id: AssessmentId,
        response_id: ResponseId,
    ) -> Result<EvidenceFile, GatewayError> {
        let state = self.state()?;
        state
            .record(assessment_id)?
            .evidence_files
            .get(&response_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("evidence for response {response_id}")))
    }

    async fn fetch_history(&self, winery_id: WineryId) -> Result<Vec<Assessment>, GatewayError> {
        let state = self.state()?;
        let mut history: Vec<Assessment> = state
            .records
            .values()
            .filter(|record| record.assessment.winery_id == winery_id)
            .map(|record| record.assessment.clone())
            .collect();
        history.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        Ok(history)
    }

    async fn fetch_results(
        &self,
        assessment_id: AssessmentId,
    ) -> Result<AssessmentResults, GatewayError> {
        let state = self.state()?;
        let record = state.record(assessment_id)?;
        if record.assessment.status != AssessmentStatus::Completed {
            return Err(GatewayError::NotFound(format!(
                "results for assessment {assessment_id}"
            )));
        }

        let structure = self.structure(&record.assessment);
        let responses = hydrate_responses(record.responses.values().cloned());
        let segment = record
            .assessment
            .segment_id
            .map(|segment_id| (segment_id, &self.segment_tiers));
        let report = ScoreReport::build(&responses, &structure, &self.tiers, segment);

        Ok(AssessmentResults {
            assessment: record.assessment.clone(),
            report,
        })
    }
}

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use super::tracker::{RequestTracker, Ticket};
use super::{
    AnswerOutcome, EvidenceWarning, FlowAction, FlowError, FlowSettings, FlowSnapshot, FlowState,
    Notice, PendingSummary, SegmentChangeConfirmation,
};
use crate::workflows::assessment::domain::{
    hydrate_responses, Answer, AnswerDraft, Assessment, AssessmentId, AssessmentStatus, Chapter,
    EvidenceFile, EvidenceUpload, Indicator, IndicatorId, LevelId, ResponseId, ResponseMap,
    Segment, SegmentId, StoredResponse, WinerySession,
};
use crate::workflows::assessment::gateway::{
    AssessmentGateway, AssessmentResults, Bootstrap, ErrorKind, GatewayError,
};
use crate::workflows::assessment::scoring::{answered_counts, chapters_progress, percentage};

#[derive(Debug)]
struct FlowInner {
    state: FlowState,
    tracker: RequestTracker,
    assessment: Option<Assessment>,
    segments: Vec<Segment>,
    structure: Vec<Chapter>,
    responses: ResponseMap,
    /// Responses reported with a resumed assessment, held until the user
    /// decides whether to continue.
    pending_responses: Vec<StoredResponse>,
    notice: Option<Notice>,
}

impl Default for FlowInner {
    fn default() -> Self {
        Self {
            state: FlowState::Loading,
            tracker: RequestTracker::default(),
            assessment: None,
            segments: Vec::new(),
            structure: Vec::new(),
            responses: ResponseMap::new(),
            pending_responses: Vec::new(),
            notice: None,
        }
    }
}

impl FlowInner {
    fn ensure(&self, action: FlowAction, allowed: bool) -> Result<(), FlowError> {
        if allowed {
            Ok(())
        } else {
            Err(FlowError::InvalidTransition {
                action,
                state: self.state.label(),
            })
        }
    }

    fn assessment_id(&self, action: FlowAction) -> Result<AssessmentId, FlowError> {
        self.assessment
            .as_ref()
            .map(|assessment| assessment.id)
            .ok_or(FlowError::InvalidTransition {
                action,
                state: self.state.label(),
            })
    }

    fn chapter_index(&self) -> Option<usize> {
        match self.state {
            FlowState::ChapterView { chapter } => Some(chapter),
            _ => None,
        }
    }

    fn counts(&self) -> (usize, usize) {
        answered_counts(&self.responses, &self.structure)
    }

    /// True once every enabled indicator of a loaded structure is answered.
    fn can_finalize(&self) -> bool {
        let (answered, total) = self.counts();
        total > 0 && answered == total
    }

    fn find_indicator(&self, indicator_id: IndicatorId) -> Option<&Indicator> {
        self.structure
            .iter()
            .flat_map(|chapter| chapter.indicators.iter())
            .find(|indicator| indicator.id == indicator_id)
    }

    /// Records a collaborator failure as a notice and converts it.
    fn fail(&mut self, action: FlowAction, error: GatewayError) -> FlowError {
        warn!(?action, kind = ?error.kind(), %error, "assessment flow action failed");
        self.notice = Some(Notice {
            kind: error.kind(),
            message: error.to_string(),
        });
        FlowError::from(error)
    }

    /// Applies a bootstrap answer from the backend.
    fn enter_bootstrap(&mut self, bootstrap: Bootstrap, segments: Vec<Segment>) {
        self.structure.clear();
        self.responses.clear();
        self.pending_responses.clear();
        match bootstrap {
            Bootstrap::Created(assessment) => {
                info!(assessment = %assessment.id, "new assessment, awaiting segment");
                self.assessment = Some(assessment);
                self.segments = segments;
                self.state = FlowState::SegmentSelection;
            }
            Bootstrap::Resumed {
                assessment,
                responses,
            } => {
                let summary = PendingSummary {
                    assessment_id: assessment.id,
                    started_at: assessment.started_at,
                    segment_id: assessment.segment_id,
                    saved_responses: responses.len(),
                };
                info!(
                    assessment = %assessment.id,
                    saved = summary.saved_responses,
                    "pending assessment found"
                );
                self.assessment = Some(assessment);
                self.segments = segments;
                self.pending_responses = responses;
                self.state = FlowState::PendingConflict(summary);
            }
        }
    }
}

/// Drives one winery's assessment session against a persistence gateway.
///
/// All methods take `&self`; the in-memory state sits behind a mutex that is
/// never held across an await, so independent actions may overlap while a
/// repeated trigger of the same action is refused with [`FlowError::Busy`].
pub struct FlowController<G> {
    gateway: Arc<G>,
    session: WinerySession,
    settings: FlowSettings,
    inner: Mutex<FlowInner>,
}

impl<G> FlowController<G>
where
    G: AssessmentGateway + 'static,
{
    pub fn new(gateway: Arc<G>, session: WinerySession, settings: FlowSettings) -> Self {
        Self {
            gateway,
            session,
            settings,
            inner: Mutex::new(FlowInner::default()),
        }
    }

    pub fn session(&self) -> &WinerySession {
        &self.session
    }

    fn lock(&self) -> MutexGuard<'_, FlowInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Releases `ticket`, failing when the view that issued it is gone.
    fn settle(&self, ticket: &Ticket) -> Result<MutexGuard<'_, FlowInner>, FlowError> {
        let mut inner = self.lock();
        if inner.tracker.finish(ticket) {
            Ok(inner)
        } else {
            debug!("dropping stale assessment flow completion");
            Err(FlowError::Stale)
        }
    }

    pub fn state(&self) -> FlowState {
        self.lock().state.clone()
    }

    pub fn assessment(&self) -> Option<Assessment> {
        self.lock().assessment.clone()
    }

    pub fn segments(&self) -> Vec<Segment> {
        self.lock().segments.clone()
    }

    pub fn structure(&self) -> Vec<Chapter> {
        self.lock().structure.clone()
    }

    pub fn responses(&self) -> ResponseMap {
        self.lock().responses.clone()
    }

    pub fn current_chapter(&self) -> Option<Chapter> {
        let inner = self.lock();
        inner
            .chapter_index()
            .and_then(|index| inner.structure.get(index).cloned())
    }

    pub fn can_finalize(&self) -> bool {
        self.lock().can_finalize()
    }

    pub fn in_flight(&self) -> Vec<FlowAction> {
        self.lock().tracker.in_flight()
    }

    pub fn notice(&self) -> Option<Notice> {
        self.lock().notice.clone()
    }

    pub fn dismiss_notice(&self) {
        self.lock().notice = None;
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        let inner = self.lock();
        let (answered, total) = inner.counts();
        FlowSnapshot {
            state: inner.state.clone(),
            assessment: inner.assessment.clone(),
            chapter_count: inner.structure.len(),
            answered,
            total,
            can_finalize: inner.can_finalize(),
            progress: chapters_progress(&inner.responses, &inner.structure),
            percentage: percentage(&inner.responses, &inner.structure),
            in_flight: inner.tracker.in_flight(),
            notice: inner.notice.clone(),
        }
    }

    /// Abandons the current view. Requests still in flight complete as
    /// [`FlowError::Stale`] and change nothing.
    pub fn leave(&self) {
        let mut inner = self.lock();
        inner.tracker.invalidate();
        let tracker = std::mem::take(&mut inner.tracker);
        *inner = FlowInner {
            tracker,
            ..FlowInner::default()
        };
    }

    /// Opens a new assessment or surfaces the pending one.
    pub async fn bootstrap(&self) -> Result<FlowState, FlowError> {
        let action = FlowAction::Bootstrap;
        let ticket = {
            let mut inner = self.lock();
            let allowed = matches!(
                inner.state,
                FlowState::Loading | FlowState::Completed | FlowState::Cancelled
            );
            inner.ensure(action, allowed)?;
            inner.tracker.begin(action)?
        };

        let result = self.open_assessment().await;

        let mut inner = self.settle(&ticket)?;
        match result {
            Ok((bootstrap, segments)) => {
                inner.notice = None;
                inner.enter_bootstrap(bootstrap, segments);
                Ok(inner.state.clone())
            }
            Err(error) => Err(inner.fail(action, error)),
        }
    }

    async fn open_assessment(&self) -> Result<(Bootstrap, Vec<Segment>), GatewayError> {
        let bootstrap = self.gateway.create_or_resume(self.session.winery_id).await?;
        let segments = self
            .gateway
            .fetch_segments(bootstrap.assessment().id)
            .await?;
        Ok((bootstrap, segments))
    }

    /// Resumes the pending assessment with its saved segment and responses.
    pub async fn continue_pending(&self) -> Result<FlowState, FlowError> {
        let action = FlowAction::ResolvePending;
        let (ticket, summary) = {
            let mut inner = self.lock();
            let summary = match &inner.state {
                FlowState::PendingConflict(summary) => summary.clone(),
                other => {
                    return Err(FlowError::InvalidTransition {
                        action,
                        state: other.label(),
                    })
                }
            };
            (inner.tracker.begin(action)?, summary)
        };

        let structure = match summary.segment_id {
            Some(_) => self
                .gateway
                .fetch_structure(summary.assessment_id)
                .await
                .map(Some),
            None => Ok(None),
        };

        let mut inner = self.settle(&ticket)?;
        match structure {
            Ok(structure) => {
                let saved = std::mem::take(&mut inner.pending_responses);
                inner.responses = hydrate_responses(saved);
                inner.notice = None;
                inner.state = match structure {
                    Some(structure) => {
                        inner.structure = structure;
                        FlowState::ChapterView { chapter: 0 }
                    }
                    None => FlowState::SegmentSelection,
                };
                info!(
                    assessment = %summary.assessment_id,
                    hydrated = inner.responses.len(),
                    state = inner.state.label(),
                    "continuing pending assessment"
                );
                Ok(inner.state.clone())
            }
            Err(error) => Err(inner.fail(action, error)),
        }
    }

    /// Cancels the pending assessment and starts a fresh one.
    pub async fn discard_pending(&self) -> Result<FlowState, FlowError> {
        let action = FlowAction::ResolvePending;
        let (ticket, assessment_id) = {
            let mut inner = self.lock();
            let allowed = matches!(inner.state, FlowState::PendingConflict(_));
            inner.ensure(action, allowed)?;
            let assessment_id = inner.assessment_id(action)?;
            (inner.tracker.begin(action)?, assessment_id)
        };

        if let Err(error) = self.gateway.cancel(assessment_id).await {
            let mut inner = self.settle(&ticket)?;
            return Err(inner.fail(action, error));
        }
        info!(assessment = %assessment_id, "pending assessment discarded");

        let reopened = self.open_assessment().await;

        let mut inner = self.settle(&ticket)?;
        match reopened {
            Ok((bootstrap, segments)) => {
                inner.notice = None;
                inner.enter_bootstrap(bootstrap, segments);
                Ok(inner.state.clone())
            }
            Err(error) => {
                // The discarded assessment is gone server-side; start over.
                inner.assessment = None;
                inner.pending_responses.clear();
                inner.state = FlowState::Loading;
                Err(inner.fail(action, error))
            }
        }
    }

    /// Persists the segment choice and opens the first chapter.
    pub async fn select_segment(&self, segment_id: SegmentId) -> Result<FlowState, FlowError> {
        let action = FlowAction::SelectSegment;
        let (ticket, assessment_id) = {
            let mut inner = self.lock();
            let allowed = matches!(inner.state, FlowState::SegmentSelection);
            inner.ensure(action, allowed)?;
            let assessment_id = inner.assessment_id(action)?;
            (inner.tracker.begin(action)?, assessment_id)
        };

        let result = self.apply_segment(assessment_id, segment_id).await;
        self.enter_segment(&ticket, action, segment_id, result)
    }

    /// First step of a segment change from inside the questionnaire.
    pub fn request_segment_change(&self) -> Result<SegmentChangeConfirmation, FlowError> {
        let action = FlowAction::SelectSegment;
        let inner = self.lock();
        inner.ensure(action, inner.chapter_index().is_some())?;
        Ok(SegmentChangeConfirmation {
            assessment_id: inner.assessment_id(action)?,
            epoch: inner.tracker.epoch(),
        })
    }

    /// Switches segment after confirmation. Saved responses are kept; the
    /// structure is reloaded and navigation restarts at the first chapter.
    pub async fn confirm_segment_change(
        &self,
        confirmation: SegmentChangeConfirmation,
        segment_id: SegmentId,
    ) -> Result<FlowState, FlowError> {
        let action = FlowAction::SelectSegment;
        let (ticket, assessment_id) = {
            let mut inner = self.lock();
            inner.ensure(action, inner.chapter_index().is_some())?;
            let assessment_id = inner.assessment_id(action)?;
            if confirmation.assessment_id != assessment_id
                || confirmation.epoch != inner.tracker.epoch()
            {
                return Err(FlowError::Stale);
            }
            (inner.tracker.begin(action)?, assessment_id)
        };

        let result = self.apply_segment(assessment_id, segment_id).await;
        self.enter_segment(&ticket, action, segment_id, result)
    }

    async fn apply_segment(
        &self,
        assessment_id: AssessmentId,
        segment_id: SegmentId,
    ) -> Result<Vec<Chapter>, GatewayError> {
        self.gateway
            .choose_segment(assessment_id, segment_id)
            .await?;
        self.gateway.fetch_structure(assessment_id).await
    }

    fn enter_segment(
        &self,
        ticket: &Ticket,
        action: FlowAction,
        segment_id: SegmentId,
        result: Result<Vec<Chapter>, GatewayError>,
    ) -> Result<FlowState, FlowError> {
        let mut inner = self.settle(ticket)?;
        match result {
            Ok(structure) => {
                inner.structure = structure;
                if let Some(assessment) = inner.assessment.as_mut() {
                    assessment.segment_id = Some(segment_id);
                }
                inner.notice = None;
                inner.state = FlowState::ChapterView { chapter: 0 };
                info!(segment = %segment_id, "segment applied");
                Ok(inner.state.clone())
            }
            Err(error) => Err(inner.fail(action, error)),
        }
    }

    pub fn next_chapter(&self) -> Result<usize, FlowError> {
        self.move_chapter(true)
    }

    pub fn previous_chapter(&self) -> Result<usize, FlowError> {
        self.move_chapter(false)
    }

    fn move_chapter(&self, forward: bool) -> Result<usize, FlowError> {
        let mut inner = self.lock();
        let current = inner.chapter_index().ok_or(FlowError::Validation(format!(
            "chapter navigation is not available during {}",
            inner.state.label()
        )))?;

        let target = if forward {
            Some(current + 1).filter(|next| *next < inner.structure.len())
        } else {
            current.checked_sub(1)
        };
        let target = target.ok_or_else(|| {
            FlowError::Validation(if forward {
                "already at the last chapter".to_string()
            } else {
                "already at the first chapter".to_string()
            })
        })?;

        inner.state = FlowState::ChapterView { chapter: target };
        Ok(target)
    }

    /// Records an answer. The local map is updated before the backend
    /// acknowledges it and rolled back when the save fails.
    pub async fn answer(
        &self,
        indicator_id: IndicatorId,
        level_id: LevelId,
    ) -> Result<AnswerOutcome, FlowError> {
        let action = FlowAction::SaveAnswer(indicator_id);
        let (ticket, assessment_id, previous, points) = {
            let mut inner = self.lock();
            inner.ensure(action, inner.chapter_index().is_some())?;
            let assessment_id = inner.assessment_id(action)?;
            let points = resolve_level(&inner, indicator_id, level_id)?;
            // An upload or removal in flight decides whether a warning is due.
            inner
                .tracker
                .ensure_idle(FlowAction::Evidence(indicator_id))?;

            let previous = inner.responses.get(&indicator_id).cloned();
            if let Some(existing) = &previous {
                if existing.level_id == level_id {
                    return Ok(AnswerOutcome::Unchanged);
                }
                if let (Some(evidence), Some(response_id)) =
                    (&existing.evidence, existing.response_id)
                {
                    return Ok(AnswerOutcome::EvidenceWarning(EvidenceWarning {
                        indicator_id,
                        level_id,
                        response_id,
                        file_name: evidence.file_name.clone(),
                        epoch: inner.tracker.epoch(),
                    }));
                }
            }

            let ticket = inner.tracker.begin(action)?;
            let response_id = previous.as_ref().and_then(|answer| answer.response_id);
            inner.responses.insert(
                indicator_id,
                Answer {
                    response_id,
                    ..Answer::new(level_id, points)
                },
            );
            (ticket, assessment_id, previous, points)
        };

        let draft = AnswerDraft {
            indicator_id,
            level_id,
        };
        let result = self
            .gateway
            .save_responses(assessment_id, std::slice::from_ref(&draft))
            .await;

        let mut inner = self.settle(&ticket)?;
        match result {
            Ok(saved) => {
                let response_id = saved
                    .iter()
                    .find(|response| response.indicator_id == indicator_id)
                    .map(|response| response.response_id);
                if let Some(answer) = inner.responses.get_mut(&indicator_id) {
                    if answer.level_id == level_id {
                        answer.response_id = response_id.or(answer.response_id);
                    }
                }
                debug!(%indicator_id, %level_id, points, "answer saved");
                Ok(AnswerOutcome::Saved)
            }
            Err(error) => {
                let still_optimistic = inner
                    .responses
                    .get(&indicator_id)
                    .map(|answer| answer.level_id == level_id)
                    .unwrap_or(false);
                if still_optimistic {
                    match previous {
                        Some(previous) => {
                            inner.responses.insert(indicator_id, previous);
                        }
                        None => {
                            inner.responses.remove(&indicator_id);
                        }
                    }
                }
                Err(inner.fail(action, error))
            }
        }
    }

    /// Deletes the evidence named in `warning` and applies the new level.
    pub async fn confirm_level_change(&self, warning: EvidenceWarning) -> Result<(), FlowError> {
        let action = FlowAction::SaveAnswer(warning.indicator_id);
        let (ticket, assessment_id, points) = {
            let mut inner = self.lock();
            inner.ensure(action, inner.chapter_index().is_some())?;
            let assessment_id = inner.assessment_id(action)?;
            if warning.epoch != inner.tracker.epoch() {
                return Err(FlowError::Stale);
            }
            inner
                .tracker
                .ensure_idle(FlowAction::Evidence(warning.indicator_id))?;
            let current = inner.responses.get(&warning.indicator_id);
            let matches_warning = current
                .map(|answer| {
                    answer.response_id == Some(warning.response_id) && answer.evidence.is_some()
                })
                .unwrap_or(false);
            if !matches_warning {
                return Err(FlowError::Conflict(
                    "the answer changed since the warning was shown".to_string(),
                ));
            }
            let points = resolve_level(&inner, warning.indicator_id, warning.level_id)?;
            (inner.tracker.begin(action)?, assessment_id, points)
        };

        if let Err(error) = self
            .gateway
            .delete_evidence(assessment_id, warning.response_id)
            .await
        {
            let mut inner = self.settle(&ticket)?;
            return Err(inner.fail(action, error));
        }

        let draft = AnswerDraft {
            indicator_id: warning.indicator_id,
            level_id: warning.level_id,
        };
        let result = self
            .gateway
            .save_responses(assessment_id, std::slice::from_ref(&draft))
            .await;

        let mut inner = self.settle(&ticket)?;
        match result {
            Ok(saved) => {
                let response_id = saved
                    .iter()
                    .find(|response| response.indicator_id == warning.indicator_id)
                    .map(|response| response.response_id)
                    .unwrap_or(warning.response_id);
                inner.responses.insert(
                    warning.indicator_id,
                    Answer {
                        response_id: Some(response_id),
                        ..Answer::new(warning.level_id, points)
                    },
                );
                info!(
                    indicator = %warning.indicator_id,
                    file = warning.file_name,
                    "evidence removed with level change"
                );
                Ok(())
            }
            Err(error) => {
                // The evidence is already gone; keep the old level without it.
                if let Some(answer) = inner.responses.get_mut(&warning.indicator_id) {
                    answer.evidence = None;
                }
                Err(inner.fail(action, error))
            }
        }
    }

    /// Completes the assessment from the last chapter once every enabled
    /// indicator is answered.
    pub async fn finalize(&self) -> Result<FlowState, FlowError> {
        let action = FlowAction::Finalize;
        let (ticket, assessment_id) = {
            let mut inner = self.lock();
            let on_last_chapter = inner
                .chapter_index()
                .map(|chapter| chapter + 1 == inner.structure.len())
                .unwrap_or(false);
            inner.ensure(action, on_last_chapter)?;
            let (answered, total) = inner.counts();
            if answered != total {
                return Err(FlowError::Validation(format!(
                    "{} of {} indicators still need an answer",
                    total - answered,
                    total
                )));
            }
            let assessment_id = inner.assessment_id(action)?;
            (inner.tracker.begin(action)?, assessment_id)
        };

        let result = self.gateway.finalize(assessment_id).await;

        let mut inner = self.settle(&ticket)?;
        match result {
            Ok(()) => {
                if let Some(assessment) = inner.assessment.as_mut() {
                    assessment.status = AssessmentStatus::Completed;
                }
                inner.notice = None;
                inner.state = FlowState::Completed;
                info!(assessment = %assessment_id, "assessment finalized");
                Ok(FlowState::Completed)
            }
            Err(error) => Err(inner.fail(action, error)),
        }
    }

    pub async fn cancel(&self) -> Result<FlowState, FlowError> {
        let action = FlowAction::Cancel;
        let (ticket, assessment_id) = {
            let mut inner = self.lock();
            let allowed = matches!(
                inner.state,
                FlowState::SegmentSelection
                    | FlowState::ChapterView { .. }
                    | FlowState::PendingConflict(_)
            );
            inner.ensure(action, allowed)?;
            let assessment_id = inner.assessment_id(action)?;
            (inner.tracker.begin(action)?, assessment_id)
        };

        let result = self.gateway.cancel(assessment_id).await;

        let mut inner = self.settle(&ticket)?;
        match result {
            Ok(()) => {
                if let Some(assessment) = inner.assessment.as_mut() {
                    assessment.status = AssessmentStatus::Cancelled;
                }
                inner.pending_responses.clear();
                inner.notice = None;
                inner.state = FlowState::Cancelled;
                info!(assessment = %assessment_id, "assessment cancelled");
                Ok(FlowState::Cancelled)
            }
            Err(error) => Err(inner.fail(action, error)),
        }
    }

    /// Uploads a PDF for an answered indicator while the assessment is open.
    pub async fn attach_evidence(
        &self,
        indicator_id: IndicatorId,
        upload: EvidenceUpload,
    ) -> Result<(), FlowError> {
        let action = FlowAction::Evidence(indicator_id);
        let (ticket, assessment_id, response_id) = {
            let mut inner = self.lock();
            inner.ensure(action, inner.chapter_index().is_some())?;
            let assessment_id = inner.assessment_id(action)?;
            let response_id = inner
                .responses
                .get(&indicator_id)
                .and_then(|answer| answer.response_id)
                .ok_or_else(|| {
                    FlowError::Validation(
                        "answer the indicator before attaching evidence".to_string(),
                    )
                })?;
            self.settings.evidence.validate(&upload)?;
            inner
                .tracker
                .ensure_idle(FlowAction::SaveAnswer(indicator_id))?;
            (inner.tracker.begin(action)?, assessment_id, response_id)
        };

        let result = self
            .gateway
            .upload_evidence(assessment_id, response_id, upload)
            .await;

        let mut inner = self.settle(&ticket)?;
        match result {
            Ok(evidence) => {
                if let Some(answer) = inner.responses.get_mut(&indicator_id) {
                    if answer.response_id == Some(response_id) {
                        answer.evidence = Some(evidence);
                    }
                }
                Ok(())
            }
            Err(error) => Err(inner.fail(action, error)),
        }
    }

    /// Explicit evidence removal requested by the user.
    pub async fn remove_evidence(&self, indicator_id: IndicatorId) -> Result<(), FlowError> {
        let action = FlowAction::Evidence(indicator_id);
        let (ticket, assessment_id, response_id) = {
            let mut inner = self.lock();
            inner.ensure(action, inner.chapter_index().is_some())?;
            let assessment_id = inner.assessment_id(action)?;
            let response_id = attached_response(&inner, indicator_id)?;
            inner
                .tracker
                .ensure_idle(FlowAction::SaveAnswer(indicator_id))?;
            (inner.tracker.begin(action)?, assessment_id, response_id)
        };

        let result = self
            .gateway
            .delete_evidence(assessment_id, response_id)
            .await;

        let mut inner = self.settle(&ticket)?;
        match result {
            Ok(()) => {
                if let Some(answer) = inner.responses.get_mut(&indicator_id) {
                    answer.evidence = None;
                }
                Ok(())
            }
            Err(error) => Err(inner.fail(action, error)),
        }
    }

    pub async fn download_evidence(
        &self,
        indicator_id: IndicatorId,
    ) -> Result<EvidenceFile, FlowError> {
        let action = FlowAction::DownloadEvidence(indicator_id);
        let (ticket, assessment_id, response_id) = {
            let mut inner = self.lock();
            let assessment_id = inner.assessment_id(action)?;
            let response_id = attached_response(&inner, indicator_id)?;
            (inner.tracker.begin(action)?, assessment_id, response_id)
        };

        let result = self
            .gateway
            .download_evidence(assessment_id, response_id)
            .await;

        let mut inner = self.settle(&ticket)?;
        result.map_err(|error| inner.fail(action, error))
    }

    /// Past assessments of the session's winery, newest first.
    pub async fn fetch_history(&self) -> Result<Vec<Assessment>, FlowError> {
        let action = FlowAction::History;
        let ticket = self.lock().tracker.begin(action)?;

        let result = self.gateway.fetch_history(self.session.winery_id).await;

        let mut inner = self.settle(&ticket)?;
        result.map_err(|error| inner.fail(action, error))
    }

    /// Results of a completed assessment; `None` while nothing is completed.
    pub async fn fetch_results(
        &self,
        assessment_id: AssessmentId,
    ) -> Result<Option<AssessmentResults>, FlowError> {
        let action = FlowAction::Results;
        let ticket = self.lock().tracker.begin(action)?;

        let result = self.gateway.fetch_results(assessment_id).await;

        let mut inner = self.settle(&ticket)?;
        match result {
            Ok(results) => Ok(Some(results)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(inner.fail(action, error)),
        }
    }
}

fn resolve_level(
    inner: &FlowInner,
    indicator_id: IndicatorId,
    level_id: LevelId,
) -> Result<u32, FlowError> {
    let indicator = inner
        .find_indicator(indicator_id)
        .filter(|indicator| indicator.enabled)
        .ok_or_else(|| {
            FlowError::Validation(format!(
                "indicator {indicator_id} does not apply to this assessment"
            ))
        })?;
    indicator
        .level(level_id)
        .map(|level| level.points)
        .ok_or_else(|| {
            FlowError::Validation(format!(
                "level {level_id} does not belong to indicator {indicator_id}"
            ))
        })
}

fn attached_response(
    inner: &FlowInner,
    indicator_id: IndicatorId,
) -> Result<ResponseId, FlowError> {
    inner
        .responses
        .get(&indicator_id)
        .filter(|answer| answer.evidence.is_some())
        .and_then(|answer| answer.response_id)
        .ok_or_else(|| FlowError::NotFound(format!("no evidence attached to {indicator_id}")))
}

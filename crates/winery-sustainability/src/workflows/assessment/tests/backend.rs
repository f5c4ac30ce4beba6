use std::sync::Arc;

use super::common::*;
use crate::workflows::assessment::backend::InMemoryBackend;
use crate::workflows::assessment::domain::{
    AnswerDraft, AssessmentId, AssessmentStatus, IndicatorId, ResponseId, SegmentId, WineryId,
};
use crate::workflows::assessment::gateway::{AssessmentGateway, Bootstrap, ErrorKind};
use crate::workflows::assessment::scoring::SegmentLevel;

fn draft(indicator: u64, points: u64) -> AnswerDraft {
    AnswerDraft {
        indicator_id: IndicatorId(indicator),
        level_id: sample_level(indicator, points),
    }
}

async fn open_assessment(segment: Option<SegmentId>) -> (Arc<InMemoryBackend>, AssessmentId) {
    let backend = sample_backend();
    let assessment_id = match backend
        .create_or_resume(WineryId(3))
        .await
        .expect("create succeeds")
    {
        Bootstrap::Created(assessment) => assessment.id,
        other => panic!("expected a new assessment, got {other:?}"),
    };
    if let Some(segment) = segment {
        backend
            .choose_segment(assessment_id, segment)
            .await
            .expect("segment chosen");
    }
    (backend, assessment_id)
}

#[tokio::test]
async fn saves_upsert_one_response_per_indicator() {
    let (backend, id) = open_assessment(Some(SMALL)).await;

    let first = backend
        .save_responses(id, &[draft(101, 1), draft(102, 2)])
        .await
        .expect("save succeeds");
    let second = backend
        .save_responses(id, &[draft(101, 3)])
        .await
        .expect("upsert succeeds");

    assert_eq!(first[0].response_id, second[0].response_id);
    let (assessment, stored) = backend.stored(id).expect("stored");
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].points, 3);
    assert_eq!(assessment.status, AssessmentStatus::InProgress);
}

#[tokio::test]
async fn invalid_batches_change_nothing() {
    let (backend, id) = open_assessment(Some(SMALL)).await;

    let error = backend
        .save_responses(id, &[draft(101, 1), draft(102, 9)])
        .await
        .expect_err("unknown level rejected");

    assert_eq!(error.kind(), ErrorKind::Validation);
    let (assessment, stored) = backend.stored(id).expect("stored");
    assert!(stored.is_empty());
    assert_eq!(assessment.status, AssessmentStatus::Pending);
}

#[tokio::test]
async fn finalize_needs_a_segment_and_every_enabled_answer() {
    let (backend, id) = open_assessment(None).await;
    assert_eq!(
        backend.finalize(id).await.expect_err("no segment").kind(),
        ErrorKind::Validation
    );

    backend
        .choose_segment(id, SMALL)
        .await
        .expect("segment chosen");
    backend
        .save_responses(id, &[draft(101, 1)])
        .await
        .expect("save succeeds");
    assert_eq!(
        backend.finalize(id).await.expect_err("incomplete").kind(),
        ErrorKind::Conflict
    );

    let drafts: Vec<AnswerDraft> = [102, 103, 201, 203, 301, 302]
        .into_iter()
        .map(|indicator| draft(indicator, 1))
        .collect();
    backend
        .save_responses(id, &drafts)
        .await
        .expect("save succeeds");
    backend.finalize(id).await.expect("finalize succeeds");

    let (assessment, _) = backend.stored(id).expect("stored");
    assert_eq!(assessment.status, AssessmentStatus::Completed);
    assert!(assessment.completed_at.is_some());
}

#[tokio::test]
async fn closed_assessments_reject_edits_and_evidence() {
    let (backend, id) = open_assessment(Some(SMALL)).await;
    let saved = backend
        .save_responses(id, &[draft(101, 1)])
        .await
        .expect("save succeeds");
    backend.cancel(id).await.expect("cancel succeeds");

    assert_eq!(
        backend
            .save_responses(id, &[draft(101, 2)])
            .await
            .expect_err("cancelled")
            .kind(),
        ErrorKind::Conflict
    );
    assert_eq!(
        backend
            .upload_evidence(id, saved[0].response_id, pdf("late.pdf"))
            .await
            .expect_err("cancelled")
            .kind(),
        ErrorKind::Conflict
    );
    assert_eq!(
        backend.cancel(id).await.expect_err("already cancelled").kind(),
        ErrorKind::Conflict
    );
}

#[tokio::test]
async fn evidence_is_stored_per_response() {
    let (backend, id) = open_assessment(Some(SMALL)).await;
    let saved = backend
        .save_responses(id, &[draft(103, 2)])
        .await
        .expect("save succeeds");
    let response_id = saved[0].response_id;

    let evidence = backend
        .upload_evidence(id, response_id, pdf("residuos.pdf"))
        .await
        .expect("upload succeeds");
    assert_eq!(evidence.file_name, "residuos.pdf");
    assert!(evidence.uploaded_at.is_some());

    let missing = backend
        .upload_evidence(id, ResponseId(999), pdf("otro.pdf"))
        .await
        .expect_err("unknown response");
    assert_eq!(missing.kind(), ErrorKind::NotFound);

    backend
        .delete_evidence(id, response_id)
        .await
        .expect("delete succeeds");
    assert_eq!(
        backend
            .delete_evidence(id, response_id)
            .await
            .expect_err("already deleted")
            .kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn results_include_segment_level() {
    let (backend, id) = open_assessment(Some(SMALL)).await;
    let drafts: Vec<AnswerDraft> = [101, 102, 103, 201, 203, 301, 302]
        .into_iter()
        .map(|indicator| draft(indicator, 2))
        .collect();
    backend
        .save_responses(id, &drafts)
        .await
        .expect("save succeeds");
    backend.finalize(id).await.expect("finalize succeeds");

    let results = backend.fetch_results(id).await.expect("results");
    assert_eq!(results.report.totals.obtained, 14);
    assert_eq!(results.report.totals.max, 21);
    assert_eq!(results.report.totals.percentage, 67);
    assert_eq!(results.report.tier.name, "Avanzado");
    assert_eq!(results.report.segment_level, Some(SegmentLevel::Medium));
    assert_eq!(results.report.chapters.len(), 3);
}

#[tokio::test]
async fn unknown_segments_are_not_found() {
    let (backend, id) = open_assessment(None).await;
    let error = backend
        .choose_segment(id, SegmentId(42))
        .await
        .expect_err("unknown segment");
    assert_eq!(error.kind(), ErrorKind::NotFound);
}

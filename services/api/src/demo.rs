use crate::infra::{format_timestamp, load_catalog, scoring_context};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use winery_sustainability::config::AppConfig;
use winery_sustainability::error::AppError;
use winery_sustainability::workflows::assessment::wire::{
    normalize_responses, normalize_structure, WireChapter, WireResponse,
};
use winery_sustainability::workflows::assessment::{
    AnswerOutcome, AssessmentGateway, EvidenceUpload, FlowController, FlowError, FlowSettings,
    InMemoryBackend, IndicatorId, ScoreReport, SegmentId, WineryId, WinerySession,
};

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// JSON export of the questionnaire structure (chapters with indicators)
    #[arg(long)]
    pub(crate) structure: PathBuf,
    /// JSON export of the saved responses
    #[arg(long)]
    pub(crate) responses: PathBuf,
    /// Segment id used to classify the point total
    #[arg(long)]
    pub(crate) segment: Option<u64>,
    /// Print the report as JSON instead of text
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Segment to assess under. Defaults to the second configured segment.
    #[arg(long)]
    pub(crate) segment: Option<u64>,
    /// PDF to attach as evidence for the first indicator.
    #[arg(long)]
    pub(crate) evidence: Option<PathBuf>,
    /// Winery id the demo session belongs to.
    #[arg(long, default_value_t = 1)]
    pub(crate) winery: u64,
}

pub(crate) fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let ScoreArgs {
        structure,
        responses,
        segment,
        json,
    } = args;

    let config = AppConfig::load()?;
    let context = scoring_context(&config.assessment)?;

    let structure: Vec<WireChapter> = serde_json::from_str(&std::fs::read_to_string(structure)?)?;
    let responses: Vec<WireResponse> = serde_json::from_str(&std::fs::read_to_string(responses)?)?;

    let structure = normalize_structure(structure);
    let responses = normalize_responses(responses, &structure);
    let report = ScoreReport::build(
        &responses,
        &structure,
        &context.tiers,
        segment.map(|segment| (SegmentId(segment), &context.segment_tiers)),
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        render_report(&report);
    }
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        segment,
        evidence,
        winery,
    } = args;

    let config = AppConfig::load()?;
    let catalog = load_catalog(&config.assessment)?;
    let context = scoring_context(&config.assessment)?;
    let policy = config.assessment.evidence_policy();

    let segment = match segment {
        Some(segment) => SegmentId(segment),
        None => catalog
            .segments()
            .get(1)
            .or_else(|| catalog.segments().first())
            .map(|segment| segment.id)
            .unwrap_or(SegmentId(1)),
    };

    let backend = Arc::new(InMemoryBackend::with_tables(
        catalog,
        context.tiers,
        context.segment_tiers,
        policy,
    ));
    let session = WinerySession::winery(WineryId(winery), "demo@bodega.example");
    let controller = FlowController::new(backend, session, FlowSettings { evidence: policy });

    println!("Winery sustainability self-assessment demo");
    controller.bootstrap().await?;
    println!("Available segments:");
    for option in controller.segments() {
        println!(
            "  - [{}] {} ({})",
            option.id,
            option.name,
            option.visitor_range_label()
        );
    }

    controller.select_segment(segment).await?;
    let structure = controller.structure();
    println!(
        "\nSegment {} selected: {} chapters, {} applicable indicators",
        segment,
        structure.len(),
        controller.snapshot().total
    );

    let mut first_indicator: Option<IndicatorId> = None;
    for (index, chapter) in structure.iter().enumerate() {
        if index > 0 {
            controller.next_chapter()?;
        }
        println!("\nChapter {}: {}", index + 1, chapter.name);
        for (position, indicator) in chapter.enabled_indicators().enumerate() {
            // Spread answers across the available levels.
            let Some(level) = indicator
                .levels
                .get((position + index) % indicator.levels.len().max(1))
            else {
                continue;
            };
            controller.answer(indicator.id, level.id).await?;
            first_indicator.get_or_insert(indicator.id);
            println!(
                "  - {} -> {} ({} pts)",
                indicator.name, level.name, level.points
            );
        }
        let snapshot = controller.snapshot();
        println!(
            "  progress: {}/{} indicators, {}% of maximum score",
            snapshot.answered, snapshot.total, snapshot.percentage
        );
    }

    if let Some(indicator_id) = first_indicator {
        let upload = evidence_upload(evidence.as_deref())?;
        let file_name = upload.file_name.clone();
        match controller.attach_evidence(indicator_id, upload).await {
            Ok(()) => println!("\nEvidence '{}' attached to {}", file_name, indicator_id),
            Err(err) => println!("\nEvidence '{}' rejected: {}", file_name, err),
        }
        demonstrate_evidence_warning(&controller, indicator_id).await?;
    }

    if !controller.can_finalize() {
        println!("\nAssessment incomplete; not finalizing");
        return Ok(());
    }

    let state = controller.finalize().await?;
    let assessment = controller.assessment().ok_or(FlowError::Stale)?;
    println!(
        "\nAssessment {} {} (started {})",
        assessment.id,
        state.label(),
        format_timestamp(assessment.started_at)
    );

    if let Some(results) = controller.fetch_results(assessment.id).await? {
        render_report(&results.report);
    }

    let history = controller.fetch_history().await?;
    println!("\nHistory:");
    for entry in history {
        println!(
            "  - #{} {} since {}",
            entry.id,
            entry.status.label(),
            format_timestamp(entry.started_at)
        );
    }

    Ok(())
}

/// Shows that changing a level with evidence attached is held until confirmed.
async fn demonstrate_evidence_warning<G>(
    controller: &FlowController<G>,
    indicator_id: IndicatorId,
) -> Result<(), AppError>
where
    G: AssessmentGateway + 'static,
{
    let Some(current) = controller.responses().get(&indicator_id).cloned() else {
        return Ok(());
    };
    if current.evidence.is_none() {
        return Ok(());
    }
    let alternative = controller
        .structure()
        .iter()
        .flat_map(|chapter| chapter.indicators.iter())
        .find(|indicator| indicator.id == indicator_id)
        .and_then(|indicator| {
            indicator
                .levels
                .iter()
                .rev()
                .find(|level| level.id != current.level_id)
                .map(|level| level.id)
        });
    let Some(alternative) = alternative else {
        return Ok(());
    };

    if let AnswerOutcome::EvidenceWarning(warning) =
        controller.answer(indicator_id, alternative).await?
    {
        println!("  warning: {}", warning.message());
        controller.confirm_level_change(warning).await?;
        println!("  confirmed: level changed and evidence removed");
    }
    Ok(())
}

fn evidence_upload(path: Option<&Path>) -> Result<EvidenceUpload, AppError> {
    match path {
        Some(path) => {
            let bytes = std::fs::read(path)?;
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "evidence.pdf".to_string());
            let content_type = mime_guess::from_path(path)
                .first_or_octet_stream()
                .essence_str()
                .to_string();
            Ok(EvidenceUpload {
                file_name,
                content_type,
                bytes,
            })
        }
        None => Ok(EvidenceUpload {
            file_name: "plan-sostenibilidad.pdf".to_string(),
            content_type: mime_guess::from_ext("pdf")
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
            bytes: b"%PDF-1.4\n% demo evidence\n".to_vec(),
        }),
    }
}

fn render_report(report: &ScoreReport) {
    println!("\nSustainability report");
    println!(
        "- Total: {}/{} points ({}%)",
        report.totals.obtained, report.totals.max, report.totals.percentage
    );
    println!(
        "- Tier: {} ({}) {}",
        report.tier.name, report.tier.color, report.tier.description
    );
    match report.segment_level {
        Some(level) => println!("- Segment level: {}", level.label()),
        None => println!("- Segment level: below minimum"),
    }
    println!(
        "- Chapters complete: {}/{} ({}%)",
        report.progress.completed, report.progress.total, report.progress.percentage
    );
    for chapter in &report.chapters {
        println!(
            "  - {}: {}/{} pts ({}%), {}/{} indicators",
            chapter.name,
            chapter.obtained,
            chapter.max,
            chapter.percentage,
            chapter.indicators_completed,
            chapter.indicators_total
        );
    }
}

use chrono::{DateTime, Local, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use std::fs::File;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;
use winery_sustainability::config::AssessmentConfig;
use winery_sustainability::error::AppError;
use winery_sustainability::workflows::assessment::{ScoringContext, SegmentTierTable, TierTable};
use winery_sustainability::workflows::catalog::{CatalogImporter, QuestionnaireCatalog};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Configured CSV catalog, or the bundled sample when none is set.
pub(crate) fn load_catalog(config: &AssessmentConfig) -> Result<QuestionnaireCatalog, AppError> {
    match config.catalog_paths()? {
        Some((questions, segments)) => {
            let catalog = CatalogImporter::from_paths(&questions, &segments)?;
            info!(
                questions = %questions.display(),
                chapters = catalog.chapters().len(),
                segments = catalog.segments().len(),
                "questionnaire catalog imported"
            );
            Ok(catalog)
        }
        None => Ok(QuestionnaireCatalog::sample()?),
    }
}

/// Configured segment thresholds, or the ones matching the sample catalog.
pub(crate) fn load_segment_tiers(config: &AssessmentConfig) -> Result<SegmentTierTable, AppError> {
    match &config.segment_tiers_path {
        Some(path) => Ok(SegmentTierTable::from_reader(File::open(path)?)?),
        None => Ok(QuestionnaireCatalog::sample_segment_tiers()?),
    }
}

pub(crate) fn scoring_context(config: &AssessmentConfig) -> Result<ScoringContext, AppError> {
    Ok(ScoringContext {
        tiers: TierTable::standard(),
        segment_tiers: load_segment_tiers(config)?,
    })
}

pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

//! Score computation over a segment-filtered questionnaire.
//!
//! Every function here is pure: the structure decides which indicators count
//! (only `enabled` ones, in both numerator and denominator) and the response
//! map supplies the obtained points. Nothing is persisted; chapter scores are
//! derived on demand.

mod segment_tiers;
mod tiers;

pub use segment_tiers::{
    PointRange, SegmentLevel, SegmentThresholds, SegmentTierError, SegmentTierTable,
};
pub use tiers::{SustainabilityTier, TierBand, TierTable, TierTableError};

use super::domain::{Chapter, ChapterId, ResponseMap, SegmentId};
use serde::{Deserialize, Serialize};

/// Per-chapter breakdown. Field names follow the results payload consumed by
/// the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterScore {
    #[serde(rename = "id_capitulo")]
    pub chapter_id: ChapterId,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "puntuacion_obtenida")]
    pub obtained: u32,
    #[serde(rename = "puntuacion_maxima")]
    pub max: u32,
    #[serde(rename = "porcentaje")]
    pub percentage: u8,
    #[serde(rename = "indicadores_completados")]
    pub indicators_completed: usize,
    #[serde(rename = "indicadores_total")]
    pub indicators_total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaptersProgress {
    #[serde(rename = "completados")]
    pub completed: usize,
    pub total: usize,
    #[serde(rename = "porcentaje")]
    pub percentage: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreTotals {
    pub obtained: u32,
    pub max: u32,
    pub percentage: u8,
}

/// Everything a results view needs, computed in one pass over the inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub totals: ScoreTotals,
    pub chapters: Vec<ChapterScore>,
    pub progress: ChaptersProgress,
    pub tier: SustainabilityTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_level: Option<SegmentLevel>,
}

impl ScoreReport {
    pub fn build(
        responses: &ResponseMap,
        structure: &[Chapter],
        tiers: &TierTable,
        segment: Option<(SegmentId, &SegmentTierTable)>,
    ) -> Self {
        let totals = ScoreTotals {
            obtained: total_score(responses, structure),
            max: max_score(structure),
            percentage: percentage(responses, structure),
        };
        let segment_level =
            segment.and_then(|(segment_id, table)| table.level_for(segment_id, totals.obtained));

        Self {
            totals,
            chapters: chapter_scores(responses, structure),
            progress: chapters_progress(responses, structure),
            tier: tiers.tier_for(totals.percentage).clone(),
            segment_level,
        }
    }
}

/// Sum of each enabled indicator's top level; disabled indicators are ignored.
pub fn max_score(structure: &[Chapter]) -> u32 {
    structure.iter().map(chapter_max).sum()
}

/// Sum of recorded points over enabled indicators. Unanswered ones add zero.
pub fn total_score(responses: &ResponseMap, structure: &[Chapter]) -> u32 {
    structure
        .iter()
        .map(|chapter| chapter_obtained(responses, chapter))
        .sum()
}

/// Rounded share of the maximum, 0 when nothing can be scored.
pub fn percentage(responses: &ResponseMap, structure: &[Chapter]) -> u8 {
    ratio_percentage(
        u64::from(total_score(responses, structure)),
        u64::from(max_score(structure)),
    )
}

pub fn chapter_scores(responses: &ResponseMap, structure: &[Chapter]) -> Vec<ChapterScore> {
    structure
        .iter()
        .map(|chapter| {
            let obtained = chapter_obtained(responses, chapter);
            let max = chapter_max(chapter);
            let (indicators_completed, indicators_total) = chapter_counts(responses, chapter);

            ChapterScore {
                chapter_id: chapter.id,
                name: chapter.name.clone(),
                obtained,
                max,
                percentage: ratio_percentage(u64::from(obtained), u64::from(max)),
                indicators_completed,
                indicators_total,
            }
        })
        .collect()
}

/// A chapter is complete only when it has enabled indicators and all of them
/// are answered.
pub fn chapters_progress(responses: &ResponseMap, structure: &[Chapter]) -> ChaptersProgress {
    let completed = structure
        .iter()
        .filter(|chapter| {
            let (answered, total) = chapter_counts(responses, chapter);
            total > 0 && answered == total
        })
        .count();
    let total = structure.len();

    ChaptersProgress {
        completed,
        total,
        percentage: ratio_percentage(completed as u64, total as u64),
    }
}

/// `(answered, enabled)` indicator counts across the whole structure.
pub fn answered_counts(responses: &ResponseMap, structure: &[Chapter]) -> (usize, usize) {
    structure
        .iter()
        .map(|chapter| chapter_counts(responses, chapter))
        .fold((0, 0), |(answered, total), (a, t)| (answered + a, total + t))
}

fn chapter_max(chapter: &Chapter) -> u32 {
    chapter
        .enabled_indicators()
        .map(|indicator| indicator.max_points())
        .sum()
}

fn chapter_obtained(responses: &ResponseMap, chapter: &Chapter) -> u32 {
    chapter
        .enabled_indicators()
        .filter_map(|indicator| responses.get(&indicator.id))
        .map(|answer| answer.points)
        .sum()
}

fn chapter_counts(responses: &ResponseMap, chapter: &Chapter) -> (usize, usize) {
    chapter
        .enabled_indicators()
        .fold((0, 0), |(answered, total), indicator| {
            let answered = answered + usize::from(responses.contains_key(&indicator.id));
            (answered, total + 1)
        })
}

/// Half-up rounded integer percentage; a zero denominator yields 0.
fn ratio_percentage(part: u64, whole: u64) -> u8 {
    if whole == 0 {
        return 0;
    }
    let rounded = (part * 200 + whole) / (whole * 2);
    rounded.min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_rounds_half_up() {
        assert_eq!(ratio_percentage(5, 8), 63);
        assert_eq!(ratio_percentage(1, 8), 13);
        assert_eq!(ratio_percentage(1, 3), 33);
        assert_eq!(ratio_percentage(2, 3), 67);
        assert_eq!(ratio_percentage(1, 2), 50);
    }

    #[test]
    fn ratio_guards_zero_denominator() {
        assert_eq!(ratio_percentage(0, 0), 0);
        assert_eq!(ratio_percentage(4, 0), 0);
    }

    #[test]
    fn ratio_caps_at_one_hundred() {
        assert_eq!(ratio_percentage(12, 8), 100);
    }
}

mod normalizer;
mod parser;

use crate::workflows::assessment::domain::{
    Chapter, ChapterId, Indicator, IndicatorId, LevelId, ResponseLevel, Segment, SegmentId,
};
use crate::workflows::assessment::scoring::{SegmentTierError, SegmentTierTable};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use parser::{QuestionRecord, SegmentRecord};

const SAMPLE_QUESTIONS: &str = include_str!("sample_questions.csv");
const SAMPLE_SEGMENTS: &str = include_str!("sample_segments.csv");
const SAMPLE_SEGMENT_TIERS: &str = include_str!("sample_segment_tiers.json");

/// Questionnaire indicator together with the segments it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogIndicator {
    pub indicator: Indicator,
    /// Empty means the indicator applies to every segment.
    pub segments: BTreeSet<SegmentId>,
}

impl CatalogIndicator {
    pub fn applies_to(&self, segment: Option<SegmentId>) -> bool {
        match segment {
            Some(segment) => self.segments.is_empty() || self.segments.contains(&segment),
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogChapter {
    pub id: ChapterId,
    pub name: String,
    pub indicators: Vec<CatalogIndicator>,
}

/// Full, unfiltered questionnaire plus the segment definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionnaireCatalog {
    segments: Vec<Segment>,
    chapters: Vec<CatalogChapter>,
}

impl QuestionnaireCatalog {
    /// Bundled questionnaire with three segments and three chapters.
    pub fn sample() -> Result<Self, CatalogImportError> {
        CatalogImporter::from_readers(SAMPLE_QUESTIONS.as_bytes(), SAMPLE_SEGMENTS.as_bytes())
    }

    /// Point thresholds matching [`QuestionnaireCatalog::sample`]: the minimum
    /// level starts where every applicable indicator sits at level 1 and the
    /// high level is the segment's maximum score.
    pub fn sample_segment_tiers() -> Result<SegmentTierTable, SegmentTierError> {
        SegmentTierTable::from_reader(SAMPLE_SEGMENT_TIERS.as_bytes())
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn chapters(&self) -> &[CatalogChapter] {
        &self.chapters
    }

    pub fn segment(&self, segment_id: SegmentId) -> Option<&Segment> {
        self.segments.iter().find(|segment| segment.id == segment_id)
    }

    /// Structure as seen by an assessment: every indicator is present, with
    /// `enabled` set according to the selected segment. Without a segment all
    /// indicators are enabled.
    pub fn structure_for(&self, segment: Option<SegmentId>) -> Vec<Chapter> {
        self.chapters
            .iter()
            .map(|chapter| Chapter {
                id: chapter.id,
                name: chapter.name.clone(),
                indicators: chapter
                    .indicators
                    .iter()
                    .map(|entry| Indicator {
                        enabled: entry.applies_to(segment),
                        ..entry.indicator.clone()
                    })
                    .collect(),
            })
            .collect()
    }

    pub fn indicator(&self, indicator_id: IndicatorId) -> Option<&CatalogIndicator> {
        self.chapters
            .iter()
            .flat_map(|chapter| chapter.indicators.iter())
            .find(|entry| entry.indicator.id == indicator_id)
    }

    pub fn level(&self, indicator_id: IndicatorId, level_id: LevelId) -> Option<&ResponseLevel> {
        self.indicator(indicator_id)
            .and_then(|entry| entry.indicator.level(level_id))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("indicator {indicator} has two levels worth {points} points")]
    DuplicatePoints { indicator: u64, points: u32 },
    #[error("level {0} appears more than once")]
    DuplicateLevel(u64),
    #[error("indicator {indicator} is listed under chapters {first} and {second}")]
    IndicatorChapterMismatch {
        indicator: u64,
        first: u64,
        second: u64,
    },
    #[error("indicator {indicator} references unknown segment '{segment}'")]
    UnknownSegment { indicator: u64, segment: String },
    #[error("segment {0} appears more than once")]
    DuplicateSegment(u64),
    #[error("indicator {indicator} lists different segments on different rows")]
    SegmentListMismatch { indicator: u64 },
}

#[derive(Debug)]
pub enum CatalogImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Catalog(CatalogError),
}

impl std::fmt::Display for CatalogImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogImportError::Io(err) => write!(f, "failed to read questionnaire export: {}", err),
            CatalogImportError::Csv(err) => write!(f, "invalid questionnaire CSV data: {}", err),
            CatalogImportError::Catalog(err) => {
                write!(f, "questionnaire export is inconsistent: {}", err)
            }
        }
    }
}

impl std::error::Error for CatalogImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogImportError::Io(err) => Some(err),
            CatalogImportError::Csv(err) => Some(err),
            CatalogImportError::Catalog(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for CatalogImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for CatalogImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<CatalogError> for CatalogImportError {
    fn from(err: CatalogError) -> Self {
        Self::Catalog(err)
    }
}

/// Builds a [`QuestionnaireCatalog`] from flat CSV exports: one row per
/// response level, plus a separate segment listing.
pub struct CatalogImporter;

impl CatalogImporter {
    pub fn from_paths<P: AsRef<Path>, S: AsRef<Path>>(
        questions: P,
        segments: S,
    ) -> Result<QuestionnaireCatalog, CatalogImportError> {
        let questions = std::fs::File::open(questions)?;
        let segments = std::fs::File::open(segments)?;
        Self::from_readers(questions, segments)
    }

    pub fn from_readers<Q: Read, S: Read>(
        questions: Q,
        segments: S,
    ) -> Result<QuestionnaireCatalog, CatalogImportError> {
        let segments = build_segments(parser::parse_segments(segments)?)?;
        let known: BTreeSet<SegmentId> = segments.iter().map(|segment| segment.id).collect();

        let mut chapters: Vec<CatalogChapter> = Vec::new();
        let mut seen_levels: BTreeSet<u64> = BTreeSet::new();

        for record in parser::parse_questions(questions)? {
            if !seen_levels.insert(record.level_id) {
                return Err(CatalogError::DuplicateLevel(record.level_id).into());
            }
            apply_record(record, &known, &mut chapters)?;
        }

        Ok(QuestionnaireCatalog { segments, chapters })
    }
}

fn build_segments(records: Vec<SegmentRecord>) -> Result<Vec<Segment>, CatalogError> {
    let mut segments: Vec<Segment> = Vec::with_capacity(records.len());
    for record in records {
        if segments.iter().any(|segment| segment.id.0 == record.segment_id) {
            return Err(CatalogError::DuplicateSegment(record.segment_id));
        }
        segments.push(Segment {
            id: SegmentId(record.segment_id),
            name: record.segment_name,
            min_visitors: record.min_visitors,
            max_visitors: record.max_visitors,
        });
    }
    Ok(segments)
}

fn apply_record(
    record: QuestionRecord,
    known_segments: &BTreeSet<SegmentId>,
    chapters: &mut Vec<CatalogChapter>,
) -> Result<(), CatalogError> {
    if let Some(owner) = chapters.iter().find(|chapter| {
        chapter.id.0 != record.chapter_id
            && chapter
                .indicators
                .iter()
                .any(|entry| entry.indicator.id.0 == record.indicator_id)
    }) {
        return Err(CatalogError::IndicatorChapterMismatch {
            indicator: record.indicator_id,
            first: owner.id.0,
            second: record.chapter_id,
        });
    }

    let segments = resolve_segments(&record, known_segments)?;

    let chapter_index = match chapters
        .iter()
        .position(|chapter| chapter.id.0 == record.chapter_id)
    {
        Some(index) => index,
        None => {
            chapters.push(CatalogChapter {
                id: ChapterId(record.chapter_id),
                name: record.chapter_name.clone(),
                indicators: Vec::new(),
            });
            chapters.len() - 1
        }
    };
    let chapter = &mut chapters[chapter_index];

    let indicator_index = match chapter
        .indicators
        .iter()
        .position(|entry| entry.indicator.id.0 == record.indicator_id)
    {
        Some(index) => index,
        None => {
            chapter.indicators.push(CatalogIndicator {
                indicator: Indicator {
                    id: IndicatorId(record.indicator_id),
                    name: record.indicator_name.clone(),
                    description: record.indicator_description.clone(),
                    enabled: true,
                    levels: Vec::new(),
                },
                segments: segments.clone(),
            });
            chapter.indicators.len() - 1
        }
    };
    let entry = &mut chapter.indicators[indicator_index];
    if entry.segments != segments {
        return Err(CatalogError::SegmentListMismatch {
            indicator: record.indicator_id,
        });
    }

    if entry
        .indicator
        .levels
        .iter()
        .any(|level| level.points == record.level_points)
    {
        return Err(CatalogError::DuplicatePoints {
            indicator: record.indicator_id,
            points: record.level_points,
        });
    }

    entry.indicator.levels.push(ResponseLevel {
        id: LevelId(record.level_id),
        points: record.level_points,
        name: record.level_name,
        description: record.level_description,
    });
    entry.indicator.levels.sort_by_key(|level| level.points);

    Ok(())
}

fn resolve_segments(
    record: &QuestionRecord,
    known_segments: &BTreeSet<SegmentId>,
) -> Result<BTreeSet<SegmentId>, CatalogError> {
    record
        .segments
        .iter()
        .map(|raw| {
            raw.parse::<u64>()
                .ok()
                .map(SegmentId)
                .filter(|segment| known_segments.contains(segment))
                .ok_or_else(|| CatalogError::UnknownSegment {
                    indicator: record.indicator_id,
                    segment: raw.clone(),
                })
        })
        .collect()
}

use super::super::domain::SegmentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Read;

/// Point-based sustainability level for a segment size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentLevel {
    /// Every applicable indicator clears at least level 1.
    Minimum,
    Medium,
    /// Every applicable indicator sits at its top level.
    High,
}

impl SegmentLevel {
    pub const fn ordered() -> [Self; 3] {
        [Self::Minimum, Self::Medium, Self::High]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Minimum => "Nivel mínimo",
            Self::Medium => "Nivel medio",
            Self::High => "Nivel alto",
        }
    }
}

/// Inclusive point range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointRange {
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentThresholds {
    pub segment_id: SegmentId,
    pub minimum: PointRange,
    pub medium: PointRange,
    pub high: PointRange,
}

impl SegmentThresholds {
    fn range(&self, level: SegmentLevel) -> PointRange {
        match level {
            SegmentLevel::Minimum => self.minimum,
            SegmentLevel::Medium => self.medium,
            SegmentLevel::High => self.high,
        }
    }

    fn validate(&self) -> Result<(), SegmentTierError> {
        let mut previous: Option<PointRange> = None;
        for level in SegmentLevel::ordered() {
            let range = self.range(level);
            if range.min > range.max {
                return Err(SegmentTierError::InvertedRange {
                    segment_id: self.segment_id,
                    level,
                });
            }
            if let Some(previous) = previous {
                if range.min <= previous.max {
                    return Err(SegmentTierError::Overlap {
                        segment_id: self.segment_id,
                        level,
                    });
                }
            }
            previous = Some(range);
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SegmentTierError {
    #[error("segment {segment_id}: {level:?} range has min above max")]
    InvertedRange {
        segment_id: SegmentId,
        level: SegmentLevel,
    },
    #[error("segment {segment_id}: {level:?} range overlaps the level below it")]
    Overlap {
        segment_id: SegmentId,
        level: SegmentLevel,
    },
    #[error("segment {0} listed more than once")]
    Duplicate(SegmentId),
    #[error("unable to read segment tier table: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid segment tier table: {0}")]
    Json(#[from] serde_json::Error),
}

/// Static lookup of absolute point thresholds per segment. The table is
/// configuration handed to the scoring engine; it is never derived from the
/// questionnaire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SegmentTierTable {
    segments: BTreeMap<SegmentId, SegmentThresholds>,
}

impl SegmentTierTable {
    pub fn new(entries: Vec<SegmentThresholds>) -> Result<Self, SegmentTierError> {
        let mut segments = BTreeMap::new();
        for entry in entries {
            entry.validate()?;
            let segment_id = entry.segment_id;
            if segments.insert(segment_id, entry).is_some() {
                return Err(SegmentTierError::Duplicate(segment_id));
            }
        }
        Ok(Self { segments })
    }

    /// Reads a JSON array of [`SegmentThresholds`].
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SegmentTierError> {
        let entries: Vec<SegmentThresholds> = serde_json::from_reader(reader)?;
        Self::new(entries)
    }

    pub fn thresholds(&self, segment_id: SegmentId) -> Option<&SegmentThresholds> {
        self.segments.get(&segment_id)
    }

    /// Level reached by `points`; `None` for unknown segments or scores below
    /// the minimum range. Scores past the high range still count as high.
    pub fn level_for(&self, segment_id: SegmentId, points: u32) -> Option<SegmentLevel> {
        let thresholds = self.segments.get(&segment_id)?;

        // Ranges ascend strictly, so the highest range whose floor is reached wins.
        SegmentLevel::ordered()
            .into_iter()
            .rev()
            .find(|level| points >= thresholds.range(*level).min)
    }
}

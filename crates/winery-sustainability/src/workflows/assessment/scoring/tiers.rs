use serde::{Deserialize, Serialize};

/// Named sustainability band shown with the overall score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SustainabilityTier {
    pub name: String,
    pub color: String,
    pub description: String,
}

/// Half-open percentage interval `[min, max)` mapped to a tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBand {
    pub min: u8,
    pub max: u8,
    pub tier: SustainabilityTier,
}

impl TierBand {
    fn contains(&self, percentage: u8) -> bool {
        percentage >= self.min && percentage < self.max
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TierTableError {
    #[error("tier table requires at least one band")]
    Empty,
    #[error("tier band '{name}' has min {min} not below max {max}")]
    InvertedBand { name: String, min: u8, max: u8 },
    #[error("tier band '{name}' starts at {min} but previous band ends at {previous_max}")]
    Gap {
        name: String,
        min: u8,
        previous_max: u8,
    },
}

/// Ordered, contiguous percentage bands. Lookups never fail: values at or past
/// the last band's exclusive max resolve to the highest tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TierBand>", into = "Vec<TierBand>")]
pub struct TierTable {
    bands: Vec<TierBand>,
}

impl TierTable {
    pub fn new(bands: Vec<TierBand>) -> Result<Self, TierTableError> {
        if bands.is_empty() {
            return Err(TierTableError::Empty);
        }

        let mut previous_max: Option<u8> = None;
        for band in &bands {
            if band.min >= band.max {
                return Err(TierTableError::InvertedBand {
                    name: band.tier.name.clone(),
                    min: band.min,
                    max: band.max,
                });
            }
            if let Some(previous_max) = previous_max {
                if band.min != previous_max {
                    return Err(TierTableError::Gap {
                        name: band.tier.name.clone(),
                        min: band.min,
                        previous_max,
                    });
                }
            }
            previous_max = Some(band.max);
        }

        Ok(Self { bands })
    }

    /// Five-band scale used by the self-assessment results page.
    pub fn standard() -> Self {
        const BANDS: [(u8, u8, &str, &str, &str); 5] = [
            (
                0,
                20,
                "Inicial",
                "#dc2626",
                "Sustainability practices are just getting started.",
            ),
            (
                20,
                40,
                "Básico",
                "#ea580c",
                "Some practices are in place but coverage is limited.",
            ),
            (
                40,
                60,
                "Intermedio",
                "#ca8a04",
                "Practices cover most areas with room for consolidation.",
            ),
            (
                60,
                80,
                "Avanzado",
                "#65a30d",
                "Consistent practices across chapters with few gaps.",
            ),
            (
                80,
                100,
                "Ejemplar",
                "#15803d",
                "Reference-level sustainability across the operation.",
            ),
        ];

        let bands = BANDS
            .iter()
            .map(|(min, max, name, color, description)| TierBand {
                min: *min,
                max: *max,
                tier: SustainabilityTier {
                    name: (*name).to_string(),
                    color: (*color).to_string(),
                    description: (*description).to_string(),
                },
            })
            .collect();

        Self { bands }
    }

    pub fn bands(&self) -> &[TierBand] {
        &self.bands
    }

    pub fn tier_for(&self, percentage: u8) -> &SustainabilityTier {
        if let Some(band) = self.bands.iter().find(|band| band.contains(percentage)) {
            return &band.tier;
        }

        // `new` guarantees at least one band.
        let first = &self.bands[0];
        if percentage < first.min {
            &first.tier
        } else {
            &self.bands[self.bands.len() - 1].tier
        }
    }
}

impl Default for TierTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl TryFrom<Vec<TierBand>> for TierTable {
    type Error = TierTableError;

    fn try_from(value: Vec<TierBand>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TierTable> for Vec<TierBand> {
    fn from(value: TierTable) -> Self {
        value.bands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(min: u8, max: u8, name: &str) -> TierBand {
        TierBand {
            min,
            max,
            tier: SustainabilityTier {
                name: name.to_string(),
                color: "#000000".to_string(),
                description: String::new(),
            },
        }
    }

    #[test]
    fn full_score_falls_back_to_highest_tier() {
        let table = TierTable::standard();
        assert_eq!(table.tier_for(100).name, "Ejemplar");
        assert_eq!(table.tier_for(99).name, "Ejemplar");
    }

    #[test]
    fn band_boundaries_are_half_open() {
        let table = TierTable::standard();
        assert_eq!(table.tier_for(0).name, "Inicial");
        assert_eq!(table.tier_for(19).name, "Inicial");
        assert_eq!(table.tier_for(20).name, "Básico");
        assert_eq!(table.tier_for(59).name, "Intermedio");
        assert_eq!(table.tier_for(60).name, "Avanzado");
        assert_eq!(table.tier_for(80).name, "Ejemplar");
    }

    #[test]
    fn values_below_first_band_use_lowest_tier() {
        let table = TierTable::new(vec![band(10, 50, "low"), band(50, 90, "high")])
            .expect("valid table");
        assert_eq!(table.tier_for(3).name, "low");
        assert_eq!(table.tier_for(95).name, "high");
    }

    #[test]
    fn rejects_empty_gapped_and_inverted_tables() {
        assert_eq!(TierTable::new(Vec::new()), Err(TierTableError::Empty));
        assert!(matches!(
            TierTable::new(vec![band(0, 40, "a"), band(50, 100, "b")]),
            Err(TierTableError::Gap { .. })
        ));
        assert!(matches!(
            TierTable::new(vec![band(40, 40, "a")]),
            Err(TierTableError::InvertedBand { .. })
        ));
    }

    #[test]
    fn deserializes_through_validation() {
        let json = r##"[{"min":0,"max":50,"tier":{"name":"a","color":"#fff","description":""}},
                       {"min":60,"max":100,"tier":{"name":"b","color":"#000","description":""}}]"##;
        assert!(serde_json::from_str::<TierTable>(json).is_err());
    }
}

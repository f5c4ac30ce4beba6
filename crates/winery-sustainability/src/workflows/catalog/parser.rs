use super::normalizer::clean_text;
use serde::{Deserialize, Deserializer};
use std::io::Read;

#[derive(Debug)]
pub(crate) struct QuestionRecord {
    pub(crate) chapter_id: u64,
    pub(crate) chapter_name: String,
    pub(crate) indicator_id: u64,
    pub(crate) indicator_name: String,
    pub(crate) indicator_description: String,
    pub(crate) level_id: u64,
    pub(crate) level_points: u32,
    pub(crate) level_name: String,
    pub(crate) level_description: String,
    /// Raw `;`-separated segment ids; empty means every segment.
    pub(crate) segments: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct SegmentRecord {
    pub(crate) segment_id: u64,
    pub(crate) segment_name: String,
    pub(crate) min_visitors: u32,
    pub(crate) max_visitors: Option<u32>,
}

pub(crate) fn parse_questions<R: Read>(reader: R) -> Result<Vec<QuestionRecord>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = Vec::new();

    for record in csv_reader.deserialize::<QuestionRow>() {
        let row = record?;
        records.push(QuestionRecord {
            chapter_id: row.chapter_id,
            chapter_name: clean_text(&row.chapter_name),
            indicator_id: row.indicator_id,
            indicator_name: clean_text(&row.indicator_name),
            indicator_description: row
                .indicator_description
                .as_deref()
                .map(clean_text)
                .unwrap_or_default(),
            level_id: row.level_id,
            level_points: row.level_points,
            level_name: clean_text(&row.level_name),
            level_description: row
                .level_description
                .as_deref()
                .map(clean_text)
                .unwrap_or_default(),
            segments: split_segments(row.segments.as_deref()),
        });
    }

    Ok(records)
}

pub(crate) fn parse_segments<R: Read>(reader: R) -> Result<Vec<SegmentRecord>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = Vec::new();

    for record in csv_reader.deserialize::<SegmentRow>() {
        let row = record?;
        records.push(SegmentRecord {
            segment_id: row.segment_id,
            segment_name: clean_text(&row.segment_name),
            min_visitors: row.min_visitors,
            max_visitors: row.max_visitors,
        });
    }

    Ok(records)
}

#[derive(Debug, Deserialize)]
struct QuestionRow {
    chapter_id: u64,
    chapter_name: String,
    indicator_id: u64,
    indicator_name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    indicator_description: Option<String>,
    level_id: u64,
    level_points: u32,
    level_name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    level_description: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    segments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SegmentRow {
    segment_id: u64,
    segment_name: String,
    #[serde(default)]
    min_visitors: u32,
    #[serde(default, deserialize_with = "empty_number_as_none")]
    max_visitors: Option<u32>,
}

fn split_segments(raw: Option<&str>) -> Vec<String> {
    raw.map(|value| {
        value
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn empty_number_as_none<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = empty_string_as_none(deserializer)?;
    opt.map(|value| value.trim().parse::<u32>().map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
pub(crate) fn split_segments_for_tests(raw: Option<&str>) -> Vec<String> {
    split_segments(raw)
}

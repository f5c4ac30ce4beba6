//! Single conversion point from backend JSON into the typed model.
//!
//! The backend has shipped the same fields under several spellings over time
//! (`id_capitulo` / `idCapitulo`, `tiene_evidencia` / `tieneEvidencia`, ...).
//! Each `Wire*` type lists the known spellings as serde aliases and converts
//! into its domain counterpart with `From`; the rest of the crate never looks
//! at raw payloads.

use super::domain::{
    Answer, Assessment, AssessmentId, AssessmentStatus, Chapter, ChapterId, Evidence, Indicator,
    IndicatorId, LevelId, ResponseId, ResponseLevel, ResponseMap, Segment, SegmentId,
    StoredResponse, WineryId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireChapter {
    #[serde(alias = "id_capitulo", alias = "idCapitulo")]
    pub id: u64,
    #[serde(alias = "nombre")]
    pub name: String,
    #[serde(default, alias = "indicadores")]
    pub indicators: Vec<WireIndicator>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireIndicator {
    #[serde(alias = "id_indicador", alias = "idIndicador")]
    pub id: u64,
    #[serde(alias = "nombre")]
    pub name: String,
    #[serde(default, alias = "descripcion")]
    pub description: Option<String>,
    #[serde(default = "enabled_by_default", alias = "habilitado", alias = "aplica")]
    pub enabled: bool,
    #[serde(
        default,
        alias = "niveles",
        alias = "niveles_respuesta",
        alias = "nivelesRespuesta"
    )]
    pub levels: Vec<WireLevel>,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireLevel {
    #[serde(alias = "id_nivel_respuesta", alias = "idNivelRespuesta", alias = "id_nivel")]
    pub id: u64,
    #[serde(default, alias = "puntos", alias = "puntuacion")]
    pub points: u32,
    #[serde(default, alias = "nombre")]
    pub name: String,
    #[serde(default, alias = "descripcion")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireSegment {
    #[serde(alias = "id_segmento", alias = "idSegmento")]
    pub id: u64,
    #[serde(alias = "nombre")]
    pub name: String,
    #[serde(default, alias = "turistas_min", alias = "min_turistas", alias = "minTuristas")]
    pub min_visitors: u32,
    #[serde(default, alias = "turistas_max", alias = "max_turistas", alias = "maxTuristas")]
    pub max_visitors: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WireStatus {
    #[serde(alias = "pendiente")]
    Pending,
    #[serde(alias = "en_progreso", alias = "en_curso", alias = "inProgress")]
    InProgress,
    #[serde(alias = "completada", alias = "finalizada")]
    Completed,
    #[serde(alias = "cancelada")]
    Cancelled,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireAssessment {
    #[serde(alias = "id_autoevaluacion", alias = "idAutoevaluacion")]
    pub id: u64,
    #[serde(alias = "id_bodega", alias = "idBodega")]
    pub winery_id: u64,
    #[serde(alias = "estado")]
    pub status: WireStatus,
    #[serde(alias = "fecha_inicio", alias = "fechaInicio")]
    pub started_at: DateTime<Utc>,
    #[serde(default, alias = "fecha_finalizacion", alias = "fechaFinalizacion")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "id_segmento", alias = "idSegmento")]
    pub segment_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireResponse {
    #[serde(default, alias = "id_respuesta", alias = "idRespuesta")]
    pub response_id: Option<u64>,
    #[serde(alias = "id_indicador", alias = "idIndicador")]
    pub indicator_id: u64,
    #[serde(alias = "id_nivel_respuesta", alias = "idNivelRespuesta", alias = "id_nivel")]
    pub level_id: u64,
    #[serde(default, alias = "puntos", alias = "puntuacion")]
    pub points: Option<u32>,
    #[serde(default, alias = "tiene_evidencia", alias = "tieneEvidencia")]
    pub has_evidence: bool,
    #[serde(default, alias = "nombre_archivo", alias = "nombreArchivo")]
    pub evidence_name: Option<String>,
    #[serde(default, alias = "tamano_archivo", alias = "tamanoArchivo")]
    pub evidence_size: Option<u64>,
    #[serde(default, alias = "fecha_subida", alias = "fechaSubida")]
    pub evidence_uploaded_at: Option<DateTime<Utc>>,
}

impl WireResponse {
    fn evidence(&self) -> Option<Evidence> {
        if !self.has_evidence && self.evidence_name.is_none() {
            return None;
        }
        Some(Evidence {
            file_name: self.evidence_name.clone().unwrap_or_default(),
            size_bytes: self.evidence_size.unwrap_or(0),
            uploaded_at: self.evidence_uploaded_at,
        })
    }
}

impl From<WireLevel> for ResponseLevel {
    fn from(value: WireLevel) -> Self {
        Self {
            id: LevelId(value.id),
            points: value.points,
            name: value.name,
            description: value.description.unwrap_or_default(),
        }
    }
}

impl From<WireIndicator> for Indicator {
    fn from(value: WireIndicator) -> Self {
        Self {
            id: IndicatorId(value.id),
            name: value.name,
            description: value.description.unwrap_or_default(),
            enabled: value.enabled,
            levels: value.levels.into_iter().map(ResponseLevel::from).collect(),
        }
    }
}

impl From<WireChapter> for Chapter {
    fn from(value: WireChapter) -> Self {
        Self {
            id: ChapterId(value.id),
            name: value.name,
            indicators: value.indicators.into_iter().map(Indicator::from).collect(),
        }
    }
}

impl From<WireSegment> for Segment {
    fn from(value: WireSegment) -> Self {
        Self {
            id: SegmentId(value.id),
            name: value.name,
            min_visitors: value.min_visitors,
            max_visitors: value.max_visitors,
        }
    }
}

impl From<WireStatus> for AssessmentStatus {
    fn from(value: WireStatus) -> Self {
        match value {
            WireStatus::Pending => Self::Pending,
            WireStatus::InProgress => Self::InProgress,
            WireStatus::Completed => Self::Completed,
            WireStatus::Cancelled => Self::Cancelled,
        }
    }
}

impl From<WireAssessment> for Assessment {
    fn from(value: WireAssessment) -> Self {
        Self {
            id: AssessmentId(value.id),
            winery_id: WineryId(value.winery_id),
            status: value.status.into(),
            started_at: value.started_at,
            completed_at: value.completed_at,
            segment_id: value.segment_id.map(SegmentId),
        }
    }
}

impl From<WireResponse> for StoredResponse {
    fn from(value: WireResponse) -> Self {
        let evidence = value.evidence();
        Self {
            response_id: ResponseId(value.response_id.unwrap_or(0)),
            indicator_id: IndicatorId(value.indicator_id),
            level_id: LevelId(value.level_id),
            points: value.points.unwrap_or(0),
            evidence,
        }
    }
}

pub fn normalize_structure(chapters: Vec<WireChapter>) -> Vec<Chapter> {
    chapters.into_iter().map(Chapter::from).collect()
}

/// Builds a response map, taking points from the referenced level when the
/// structure knows it and from the payload otherwise.
pub fn normalize_responses(responses: Vec<WireResponse>, structure: &[Chapter]) -> ResponseMap {
    responses
        .into_iter()
        .map(|wire| {
            let indicator_id = IndicatorId(wire.indicator_id);
            let level_id = LevelId(wire.level_id);
            let known_points = structure
                .iter()
                .flat_map(|chapter| chapter.indicators.iter())
                .find(|indicator| indicator.id == indicator_id)
                .and_then(|indicator| indicator.level(level_id))
                .map(|level| level.points);

            let evidence = wire.evidence();
            let answer = Answer {
                level_id,
                points: known_points.or(wire.points).unwrap_or(0),
                response_id: wire.response_id.map(ResponseId),
                evidence,
            };
            (indicator_id, answer)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chapter_accepts_spanish_field_names() {
        let raw = json!([{
            "id_capitulo": 3,
            "nombre": "Agua",
            "indicadores": [{
                "id_indicador": 31,
                "nombre": "Consumo",
                "descripcion": "Medición del consumo",
                "habilitado": false,
                "niveles_respuesta": [
                    {"id_nivel_respuesta": 310, "puntos": 0, "nombre": "Nada"},
                    {"id_nivel_respuesta": 311, "puntos": 2, "nombre": "Total"}
                ]
            }]
        }]);

        let wire: Vec<WireChapter> = serde_json::from_value(raw).expect("wire chapters");
        let structure = normalize_structure(wire);
        assert_eq!(structure[0].id, ChapterId(3));
        let indicator = &structure[0].indicators[0];
        assert!(!indicator.enabled);
        assert_eq!(indicator.max_points(), 2);
        assert_eq!(indicator.description, "Medición del consumo");
    }

    #[test]
    fn indicator_defaults_to_enabled() {
        let wire: WireIndicator =
            serde_json::from_value(json!({"idIndicador": 1, "name": "Energía"})).expect("wire");
        let indicator = Indicator::from(wire);
        assert!(indicator.enabled);
        assert!(indicator.levels.is_empty());
    }

    #[test]
    fn evidence_flag_spellings_are_equivalent() {
        let snake: WireResponse = serde_json::from_value(json!({
            "id_respuesta": 9, "id_indicador": 1, "id_nivel_respuesta": 2, "puntos": 3,
            "tiene_evidencia": true, "nombre_archivo": "plan.pdf"
        }))
        .expect("snake case");
        let camel: WireResponse = serde_json::from_value(json!({
            "idRespuesta": 9, "idIndicador": 1, "idNivelRespuesta": 2, "puntos": 3,
            "tieneEvidencia": true, "nombreArchivo": "plan.pdf"
        }))
        .expect("camel case");

        let snake = StoredResponse::from(snake);
        let camel = StoredResponse::from(camel);
        assert_eq!(snake, camel);
        assert_eq!(snake.evidence.expect("evidence").file_name, "plan.pdf");
    }

    #[test]
    fn assessment_status_aliases() {
        let wire: WireAssessment = serde_json::from_value(json!({
            "id_autoevaluacion": 5,
            "id_bodega": 2,
            "estado": "pendiente",
            "fecha_inicio": "2025-03-01T09:00:00Z"
        }))
        .expect("assessment");
        let assessment = Assessment::from(wire);
        assert_eq!(assessment.status, AssessmentStatus::Pending);
        assert_eq!(assessment.segment_id, None);
    }

    #[test]
    fn response_points_come_from_structure_when_known() {
        let structure = normalize_structure(
            serde_json::from_value(json!([{
                "id": 1, "name": "A",
                "indicators": [{"id": 10, "name": "x", "levels": [{"id": 100, "points": 4}]}]
            }]))
            .expect("structure"),
        );
        let responses: Vec<WireResponse> = serde_json::from_value(json!([
            {"indicator_id": 10, "level_id": 100, "points": 1},
            {"indicator_id": 99, "level_id": 990, "points": 2}
        ]))
        .expect("responses");

        let map = normalize_responses(responses, &structure);
        assert_eq!(map[&IndicatorId(10)].points, 4);
        assert_eq!(map[&IndicatorId(99)].points, 2);
    }
}

use super::common::*;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

use crate::workflows::assessment::router::{report_handler, ScoringRequest};
use crate::workflows::assessment::{scoring_router, ScoringContext};
use crate::workflows::catalog::QuestionnaireCatalog;

fn context() -> Arc<ScoringContext> {
    Arc::new(ScoringContext {
        tiers: Default::default(),
        segment_tiers: QuestionnaireCatalog::sample_segment_tiers().expect("tiers parse"),
    })
}

fn spanish_payload() -> serde_json::Value {
    json!({
        "estructura": [
            {
                "id_capitulo": 1,
                "nombre": "Gestión medioambiental",
                "indicadores": [
                    {
                        "id_indicador": 11,
                        "nombre": "Consumo de agua",
                        "niveles_respuesta": [
                            { "id_nivel_respuesta": 110, "puntos": 0, "nombre": "Sin implantar" },
                            { "id_nivel_respuesta": 113, "puntos": 3, "nombre": "Excelente" }
                        ]
                    },
                    {
                        "id_indicador": 12,
                        "nombre": "Energía",
                        "niveles_respuesta": [
                            { "id_nivel_respuesta": 120, "puntos": 0 },
                            { "id_nivel_respuesta": 123, "puntos": 3 }
                        ]
                    }
                ]
            },
            {
                "idCapitulo": 2,
                "nombre": "Responsabilidad social",
                "indicadores": [
                    {
                        "idIndicador": 21,
                        "nombre": "Empleo local",
                        "habilitado": true,
                        "nivelesRespuesta": [
                            { "idNivelRespuesta": 210, "puntos": 0 },
                            { "idNivelRespuesta": 212, "puntos": 2 }
                        ]
                    },
                    {
                        "idIndicador": 22,
                        "nombre": "Visitas guiadas",
                        "habilitado": false,
                        "nivelesRespuesta": [
                            { "idNivelRespuesta": 223, "puntos": 3 }
                        ]
                    }
                ]
            }
        ],
        "respuestas": [
            { "id_respuesta": 1, "id_indicador": 11, "id_nivel_respuesta": 113, "tiene_evidencia": true, "nombre_archivo": "agua.pdf" },
            { "idRespuesta": 2, "idIndicador": 21, "idNivelRespuesta": 212 },
            { "idRespuesta": 3, "idIndicador": 22, "idNivelRespuesta": 223 }
        ]
    })
}

#[tokio::test]
async fn report_route_scores_backend_payloads() {
    let router = scoring_router(context());

    let response = router
        .oneshot(
            axum::http::Request::post("/api/v1/scoring/report")
                .header(axum::http::header::CONTENT_TYPE, "application/json")
                .body(axum::body::Body::from(
                    serde_json::to_vec(&spanish_payload()).expect("payload serializes"),
                ))
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["totals"]["obtained"], 5);
    assert_eq!(payload["totals"]["max"], 8);
    assert_eq!(payload["totals"]["percentage"], 63);
    assert_eq!(payload["chapters"][0]["id_capitulo"], 1);
    assert_eq!(payload["chapters"][0]["porcentaje"], 50);
    assert_eq!(payload["progress"]["completados"], 1);
    assert_eq!(payload["tier"]["name"], "Avanzado");
    assert!(payload.get("segment_level").is_none());
}

#[tokio::test]
async fn report_handler_adds_segment_level_when_requested() {
    let mut request: ScoringRequest =
        serde_json::from_value(spanish_payload()).expect("request parses");
    request.segment_id = Some(SMALL.0);

    let response = report_handler(State(context()), axum::Json(request)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    // Five points is below the small-winery minimum range.
    assert!(payload["segment_level"].is_null());

    let mut request: ScoringRequest =
        serde_json::from_value(spanish_payload()).expect("request parses");
    request.segment_id = Some(99);
    let response = report_handler(State(context()), axum::Json(request)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn report_handler_rejects_empty_structures() {
    let request = ScoringRequest {
        structure: Vec::new(),
        responses: Vec::new(),
        segment_id: None,
    };

    let response = report_handler(State(context()), axum::Json(request)).await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    assert!(payload["error"]
        .as_str()
        .unwrap_or_default()
        .contains("structure"));
}

#[tokio::test]
async fn malformed_bodies_are_client_errors() {
    let router = scoring_router(context());

    let response = router
        .oneshot(
            axum::http::Request::post("/api/v1/scoring/report")
                .header(axum::http::header::CONTENT_TYPE, "application/json")
                .body(axum::body::Body::from("{\"responses\": []}"))
                .expect("request builds"),
        )
        .await
        .expect("route executes");

    assert!(response.status().is_client_error());
}

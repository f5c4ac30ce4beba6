use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::assessment::flow::FlowError;
use crate::workflows::assessment::gateway::ErrorKind;
use crate::workflows::assessment::scoring::SegmentTierError;
use crate::workflows::catalog::CatalogImportError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Catalog(CatalogImportError),
    SegmentTiers(SegmentTierError),
    Json(serde_json::Error),
    Flow(FlowError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Catalog(err) => write!(f, "catalog error: {}", err),
            AppError::SegmentTiers(err) => write!(f, "segment tier error: {}", err),
            AppError::Json(err) => write!(f, "invalid json: {}", err),
            AppError::Flow(err) => write!(f, "assessment error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Catalog(err) => Some(err),
            AppError::SegmentTiers(err) => Some(err),
            AppError::Json(err) => Some(err),
            AppError::Flow(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Catalog(_) | AppError::SegmentTiers(_) | AppError::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Flow(err) => match err.kind() {
                Some(ErrorKind::Validation) => StatusCode::UNPROCESSABLE_ENTITY,
                Some(ErrorKind::Conflict) | None => StatusCode::CONFLICT,
                Some(ErrorKind::NotFound) => StatusCode::NOT_FOUND,
                Some(ErrorKind::Transport) => StatusCode::BAD_GATEWAY,
            },
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<CatalogImportError> for AppError {
    fn from(value: CatalogImportError) -> Self {
        Self::Catalog(value)
    }
}

impl From<SegmentTierError> for AppError {
    fn from(value: SegmentTierError) -> Self {
        Self::SegmentTiers(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<FlowError> for AppError {
    fn from(value: FlowError) -> Self {
        Self::Flow(value)
    }
}

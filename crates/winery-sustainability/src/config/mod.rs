use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::workflows::assessment::evidence::{EvidencePolicy, DEFAULT_MAX_EVIDENCE_BYTES};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub assessment: AssessmentConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let evidence_max_bytes = match env::var("APP_EVIDENCE_MAX_BYTES") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|bytes| *bytes > 0)
                .ok_or(ConfigError::InvalidEvidenceLimit { value: raw })?,
            Err(_) => DEFAULT_MAX_EVIDENCE_BYTES,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            assessment: AssessmentConfig {
                evidence_max_bytes,
                questions_path: optional_path("APP_CATALOG_PATH"),
                segments_path: optional_path("APP_SEGMENTS_PATH"),
                segment_tiers_path: optional_path("APP_SEGMENT_TIERS_PATH"),
            },
        })
    }
}

fn optional_path(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Questionnaire sources and evidence limits. Unset paths fall back to the
/// bundled sample catalog and its thresholds.
#[derive(Debug, Clone)]
pub struct AssessmentConfig {
    pub evidence_max_bytes: u64,
    pub questions_path: Option<PathBuf>,
    pub segments_path: Option<PathBuf>,
    pub segment_tiers_path: Option<PathBuf>,
}

impl AssessmentConfig {
    pub fn evidence_policy(&self) -> EvidencePolicy {
        EvidencePolicy {
            max_bytes: self.evidence_max_bytes,
        }
    }

    /// Both CSV exports, when a custom catalog is configured.
    pub fn catalog_paths(&self) -> Result<Option<(PathBuf, PathBuf)>, ConfigError> {
        match (&self.questions_path, &self.segments_path) {
            (Some(questions), Some(segments)) => Ok(Some((questions.clone(), segments.clone()))),
            (None, None) => Ok(None),
            _ => Err(ConfigError::IncompleteCatalog),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidEvidenceLimit { value: String },
    IncompleteCatalog,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidEvidenceLimit { value } => write!(
                f,
                "APP_EVIDENCE_MAX_BYTES must be a positive byte count, got '{}'",
                value
            ),
            ConfigError::IncompleteCatalog => write!(
                f,
                "APP_CATALOG_PATH and APP_SEGMENTS_PATH must be set together"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidEvidenceLimit { .. }
            | ConfigError::IncompleteCatalog => None,
        }
    }
}

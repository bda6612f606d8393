use std::path::PathBuf;

use labelrelay_core::AnnotationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to parse configuration {origin}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(
        "failed to parse configuration {origin}: toml error: {toml_error}; json error: {json_error}"
    )]
    Unparseable {
        origin: String,
        toml_error: String,
        json_error: String,
    },
    #[error("invalid value '{value}' for {var}")]
    InvalidOverride { var: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(#[from] AnnotationError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

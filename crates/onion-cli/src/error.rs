//! Error types for the CLI

use std::path::PathBuf;

use onion_cluster::Outcome;

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Cluster(#[from] onion_common::Error),

    #[error("telemetry error: {0}")]
    Telemetry(#[from] onion_common::telemetry::TelemetryError),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read cluster file {path}: {source}")]
    ClusterFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("{operation} finished with outcome {outcome}")]
    Incomplete {
        operation: &'static str,
        outcome: Outcome,
    },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn incomplete(operation: &'static str, outcome: Outcome) -> Self {
        Error::Incomplete { operation, outcome }
    }
}

//! Error types for the Pulse client.

use crate::config::ConfigError;
use crate::export::ExportError;
use crate::settings::SaveError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Save(#[from] SaveError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to initialize tracing: {0}")]
    Telemetry(String),
}

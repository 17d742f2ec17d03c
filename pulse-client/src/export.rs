//! Export Coordinator.
//!
//! One-shot retrieval of an export file for the current filter criteria.
//! Exports bypass the query cache and are never retried; the request is
//! snapshotted by value before the gateway is called.

use chrono::Utc;
use pulse_core::{ExportFormat, ExportRequest, FetchError, FilterState};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{error, info};

use crate::gateway::SharedGateway;

/// A retrieved export file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPayload {
    pub request: ExportRequest,
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportState {
    pub in_progress: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Export request failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Failed to write export: {0}")]
    Io(#[from] std::io::Error),
}

pub struct ExportCoordinator {
    gateway: SharedGateway,
    state: watch::Sender<ExportState>,
}

impl ExportCoordinator {
    pub fn new(gateway: SharedGateway) -> Self {
        let (state, _) = watch::channel(ExportState::default());
        Self { gateway, state }
    }

    /// Fetch an export of everything `filters` matches. Pagination is ignored.
    ///
    /// The request is built before this returns, so later edits to `filters`
    /// do not reach the gateway.
    pub fn export(
        &self,
        filters: &FilterState,
        format: ExportFormat,
        include_metadata: bool,
    ) -> impl Future<Output = Result<ExportPayload, ExportError>> + '_ {
        self.run(ExportRequest::new(filters, format, include_metadata))
    }

    /// Fetch a prepared request.
    pub async fn run(&self, request: ExportRequest) -> Result<ExportPayload, ExportError> {
        self.state.send_modify(|s| {
            s.in_progress = true;
            s.last_error = None;
        });

        match self.gateway.export(&request).await {
            Ok(bytes) => {
                let file_name = file_name(request.format, Utc::now().timestamp_millis());
                info!(
                    file = %file_name,
                    bytes = bytes.len(),
                    gateway = self.gateway.name(),
                    "Export retrieved"
                );
                self.state.send_modify(|s| s.in_progress = false);
                Ok(ExportPayload {
                    content_type: request.format.content_type(),
                    request,
                    bytes,
                    file_name,
                })
            }
            Err(err) => {
                error!(format = %request.format, error = %err, "Export failed");
                self.record_failure(&err.to_string());
                Err(err.into())
            }
        }
    }

    /// Fetch an export and write it into `dir`, returning the file's path.
    pub async fn export_to(
        &self,
        dir: &Path,
        filters: &FilterState,
        format: ExportFormat,
        include_metadata: bool,
    ) -> Result<PathBuf, ExportError> {
        let payload = self.export(filters, format, include_metadata).await?;
        self.save(dir, &payload).await
    }

    /// Write `payload` into `dir` under its file name.
    pub async fn save(&self, dir: &Path, payload: &ExportPayload) -> Result<PathBuf, ExportError> {
        let path = dir.join(&payload.file_name);
        let written = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, &payload.bytes).await
        }
        .await;
        if let Err(err) = written {
            error!(path = %path.display(), error = %err, "Export write failed");
            self.record_failure(&err.to_string());
            return Err(err.into());
        }
        info!(path = %path.display(), "Export saved");
        Ok(path)
    }

    pub fn state(&self) -> ExportState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ExportState> {
        self.state.subscribe()
    }

    fn record_failure(&self, message: &str) {
        self.state.send_modify(|s| {
            s.in_progress = false;
            s.last_error = Some(message.to_string());
        });
    }
}

/// `events-<unix-millis>.<ext>`
pub fn file_name(format: ExportFormat, unix_millis: i64) -> String {
    format!("events-{}.{}", unix_millis, format.extension())
}

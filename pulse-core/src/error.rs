//! Error types for Pulse operations

use thiserror::Error;

/// Failure of a single remote read.
///
/// Stored inside cache entries, so it must be cheap to clone and comparable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network error: {reason}")]
    Network { reason: String },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Malformed response for {resource}: {reason}")]
    Schema { resource: String, reason: String },

    #[error("Unsupported request: {reason}")]
    Unsupported { reason: String },

    #[error("No async runtime available to run the fetch")]
    Runtime,
}

/// Coarse classification used for retry decisions and rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// Timeout, connection failure, 5xx or 429. Retried per policy.
    Transient,
    /// Payload did not match the expected shape. Never retried.
    Schema,
    /// The server rejected the request (4xx) or the strategy cannot serve it.
    Rejected,
    /// Local environment problem.
    Internal,
}

impl FetchError {
    pub fn network(reason: impl Into<String>) -> Self {
        Self::Network {
            reason: reason.into(),
        }
    }

    pub fn schema(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Schema {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => FetchErrorKind::Transient,
            Self::Http { status, .. } if *status >= 500 || *status == 429 => {
                FetchErrorKind::Transient
            }
            Self::Http { .. } | Self::Unsupported { .. } => FetchErrorKind::Rejected,
            Self::Schema { .. } => FetchErrorKind::Schema,
            Self::Runtime => FetchErrorKind::Internal,
        }
    }

    /// Whether the retry policy may attempt this request again.
    pub fn is_retryable(&self) -> bool {
        self.kind() == FetchErrorKind::Transient
    }
}

/// Invalid user-supplied settings input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

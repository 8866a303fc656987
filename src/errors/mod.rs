//! Error handling module for the Peregrine sync service.
//!
//! "Not modified" is absent from these types: upstream calls report it
//! through [`crate::upstream::Fetched::Unchanged`] instead of the error channel.

use std::time::Duration;

use thiserror::Error;

/// Error codes as constants to avoid stringly-typed log fields.
pub mod codes {
    pub const UPSTREAM_HTTP: &str = "UPSTREAM_HTTP";
    pub const UPSTREAM_STATUS: &str = "UPSTREAM_STATUS";
    pub const UPSTREAM_DECODE: &str = "UPSTREAM_DECODE";
    pub const UPSTREAM_TOO_LARGE: &str = "UPSTREAM_TOO_LARGE";
    pub const UPSTREAM_INVALID: &str = "UPSTREAM_INVALID";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const ENCODE_ERROR: &str = "ENCODE_ERROR";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const CANCELLED: &str = "CANCELLED";
}

/// Failure talking to the upstream read API.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request to {path} failed: {source}")]
    Http {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("got unexpected status {status} for {path}")]
    Status { path: String, status: u16 },
    #[error("unable to decode response for {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("response for {path} exceeds {limit} bytes")]
    TooLarge { path: String, limit: usize },
    #[error("invalid data for {path}: {message}")]
    Invalid { path: String, message: String },
}

/// Failure inside the local store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("unable to encode column: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Why a single resource sync run ended early.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("cancelled")]
    Cancelled,
}

impl SyncError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::Upstream(err) => match err {
                UpstreamError::Http { .. } => codes::UPSTREAM_HTTP,
                UpstreamError::Status { .. } => codes::UPSTREAM_STATUS,
                UpstreamError::Decode { .. } => codes::UPSTREAM_DECODE,
                UpstreamError::TooLarge { .. } => codes::UPSTREAM_TOO_LARGE,
                UpstreamError::Invalid { .. } => codes::UPSTREAM_INVALID,
            },
            SyncError::Store(StoreError::Database(_)) => codes::DATABASE_ERROR,
            SyncError::Store(StoreError::Encode(_)) => codes::ENCODE_ERROR,
            SyncError::Timeout(_) => codes::TIMEOUT,
            SyncError::Cancelled => codes::CANCELLED,
        }
    }

    /// Cancellation is a shutdown signal, not a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

/// Invalid startup configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}

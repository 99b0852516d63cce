use std::time::Duration;
use thiserror::Error;

/// Failure of a single attempt against the remote data source.
///
/// The `Display` form is what ends up in `SyncState::error`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("{0}")]
    Transport(String),

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("invalid API base URL: {0}")]
    InvalidBaseUrl(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

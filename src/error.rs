//! Error types for fetching snapshots and loading configuration.
//!
//! Reconciliation itself has no error path: store, tracker and anchor
//! operations are infallible, and malformed fields are absorbed at decode time.

use thiserror::Error;

/// Failure of one backend request.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server error {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend answered `ok: false`.
    #[error("backend reported failure: {0}")]
    Api(String),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FetchError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "transport",
            FetchError::Status { .. } => "status",
            FetchError::Api(_) => "api",
            FetchError::Decode(_) => "decode",
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Why a session refused a snapshot. Either way nothing on screen changed.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("stale snapshot {seq}, already applied {last}")]
    Stale { seq: u64, last: u64 },

    #[error("snapshot {seq} carries a failed summary: {reason}")]
    Rejected { seq: u64, reason: String },
}

//! Unified error handling for the trackrelay crate
//!
//! Remote failures never surface through this type inside the cache engine:
//! they are folded into a [`TrackerStatus`](crate::models::TrackerStatus)
//! carrying an error message. `Error` covers request validation, the update
//! feed, configuration, and I/O at the edges.
//!
//! # Usage
//!
//! ```rust,ignore
//! use trackrelay::error::{Error, ErrorCategory};
//!
//! fn handle_error(err: Error) {
//!     if err.category() == ErrorCategory::Request {
//!         // reported to the client as {ok: false, error}
//!     }
//! }
//! ```

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub use crate::fetcher::FetchError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad client input (conference URL, update parameters)
    Request,
    /// Remote status endpoint failures
    Remote,
    /// External update feed failures
    Feed,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the trackrelay crate
#[derive(Error, Debug)]
pub enum Error {
    /// The conference parameter was missing or empty
    #[error("missing conference")]
    MissingConference,

    /// The conference parameter is not an absolute http(s) URL with a host
    #[error("bad conference {0:?}")]
    BadConference(String),

    /// Network failure reaching the remote endpoint
    #[error("{0}")]
    RemoteTransport(String),

    /// The remote answered `ok: false` or with an unparsable body
    #[error("{0}")]
    RemoteProtocol(String),

    /// Malformed update file in the watch directory
    #[error("{path}: {reason}")]
    BadUpdatePayload { path: PathBuf, reason: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem watcher errors
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a bad update payload error
    pub fn bad_update(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::BadUpdatePayload {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingConference | Self::BadConference(_) => ErrorCategory::Request,
            Self::RemoteTransport(_) | Self::RemoteProtocol(_) => ErrorCategory::Remote,
            Self::BadUpdatePayload { .. } | Self::Watch(_) => ErrorCategory::Feed,
            Self::Config(_) => ErrorCategory::Config,
            Self::Io(_) | Self::Json(_) => ErrorCategory::Other,
        }
    }

    /// Check if retrying the same operation later may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::RemoteTransport(_) | Self::RemoteProtocol(_) | Self::Io(_) => true,
            Self::MissingConference
            | Self::BadConference(_)
            | Self::BadUpdatePayload { .. }
            | Self::Json(_)
            | Self::Watch(_)
            | Self::Config(_) => false,
        }
    }
}

impl From<FetchError> for Error {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Http(_) | FetchError::Timeout => Self::RemoteTransport(err.to_string()),
            FetchError::Decode(_) | FetchError::Remote(_) => Self::RemoteProtocol(err.to_string()),
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for wsync-sync.

use std::path::PathBuf;

use thiserror::Error;
use wsync_core::ConfigError;
use wsync_tree::TreeError;

/// Errors that abort a whole sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to read tree: {0}")]
    Tree(#[from] TreeError),

    /// The remote export failed after retries, or authentication was refused.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("background task failed: {0}")]
    Task(String),

    /// Interrupted while reading or diffing; nothing was applied.
    #[error("interrupted before any change was applied")]
    Cancelled,
}

/// Failures reported by a [`crate::RemoteWorkspace`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Credentials refused. Stops the run.
    #[error("authentication failed: {0}")]
    FatalAuth(String),

    /// Network failure or server error; reads may be retried.
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// The remote refused this particular request.
    #[error("remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// A response that does not follow the export contract.
    #[error("invalid remote response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, RemoteError::FatalAuth(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }

    /// Classify an HTTP status code.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => RemoteError::FatalAuth(message),
            500..=599 => RemoteError::Transient(format!("HTTP {status}: {message}")),
            _ => RemoteError::Rejected { status, message },
        }
    }
}

/// Failure of a single change operation against a destination.
#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A file path that would escape the sync root.
    #[error("refusing unsafe path {0}")]
    UnsafePath(String),

    /// The operation lacks the entity it needs (e.g. an update without source).
    #[error("invalid operation on {key}: {reason}")]
    InvalidOp { key: String, reason: String },

    #[error("background task failed: {0}")]
    Task(String),
}

impl DestinationError {
    /// Fatal errors stop the applier from dispatching further operations.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DestinationError::Remote(e) if e.is_fatal())
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DestinationError {
    DestinationError::Io {
        path: path.into(),
        source,
    }
}

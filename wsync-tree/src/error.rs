//! Error types for wsync-tree.

use std::path::PathBuf;

use thiserror::Error;
use wsync_core::{ConfigError, CoreError};

/// Failure of a whole read. Per-entity problems are not errors: they are
/// reported as [`crate::MalformedEntity`] next to the tree.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory walk failed below the root.
    #[error("failed to walk {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// Codebase globs that do not compile.
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> TreeError {
    TreeError::Io {
        path: path.into(),
        source,
    }
}

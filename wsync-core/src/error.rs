//! Error types for wsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Malformed layered settings. Always fatal: the operation aborts before any
/// tree is read or any destination is touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure while reading or writing `wsync.yaml`.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// YAML serialization error (write path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// An include/exclude pattern that does not compile.
    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("parallelism must be at least 1")]
    ZeroParallelism,

    /// A top-level key that is not a setting. Nested layers report unknown
    /// keys through [`ConfigError::Parse`].
    #[error("unknown key '{key}' in {path}")]
    UnknownKey { path: PathBuf, key: String },
}

/// Structural errors on domain values.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Two entities with the same kind and path were handed to one tree.
    #[error("duplicate entity {key}")]
    DuplicateEntity { key: String },
}

/// Convenience constructor for [`ConfigError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}

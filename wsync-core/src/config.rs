//! `wsync.yaml` persistence.
//!
//! # Storage layout
//!
//! ```text
//! <sync root>/
//!   wsync.yaml     (top-level settings + gitBranches)
//!   f/...          (entity files)
//! ```
//!
//! A missing `wsync.yaml` means "all defaults". A present but malformed one is
//! a [`ConfigError`] and stops the operation before any other I/O.

use std::path::{Path, PathBuf};

use crate::error::{io_err, ConfigError};
use crate::settings::{SyncConfig, SyncOptions};

/// File name of the configuration document at the sync root.
pub const CONFIG_FILE: &str = "wsync.yaml";

/// `<root>/wsync.yaml`: pure, no I/O.
pub fn config_path_at(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Load `<root>/wsync.yaml`, or defaults if it does not exist.
///
/// Returns `ConfigError::Parse` (with path + line context) if malformed YAML,
/// and `ConfigError::UnknownKey` for a top-level key that is not a setting.
pub fn load_at(root: &Path) -> Result<SyncConfig, ConfigError> {
    let path = config_path_at(root);
    if !path.exists() {
        tracing::debug!("no {} at {}, using defaults", CONFIG_FILE, root.display());
        return Ok(SyncConfig::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(SyncConfig::default());
    }
    let value: serde_yaml::Value =
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
    if value.is_null() {
        return Ok(SyncConfig::default());
    }
    if let Some(map) = value.as_mapping() {
        if let Some(key) = map
            .keys()
            .find(|k| !k.as_str().is_some_and(SyncConfig::is_known_key))
        {
            let key = key
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{key:?}"));
            return Err(ConfigError::UnknownKey { path, key });
        }
    }
    serde_yaml::from_value(value).map_err(|source| ConfigError::Parse { path, source })
}

/// Atomically save `config` to `<root>/wsync.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `rename`.
pub fn save_at(root: &Path, config: &SyncConfig) -> Result<(), ConfigError> {
    let path = config_path_at(root);
    let tmp_path = path.with_file_name(format!("{CONFIG_FILE}.tmp"));

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    if let Err(e) = std::fs::rename(&tmp_path, &path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(io_err(&path, e));
    }
    Ok(())
}

/// The document written by `wsync init`.
pub fn starter_config() -> SyncConfig {
    SyncConfig {
        options: SyncOptions {
            includes: Some(vec!["f/**".to_string()]),
            excludes: Some(Vec::new()),
            skip_variables: Some(false),
            skip_resources: Some(false),
            skip_secrets: Some(true),
            ..Default::default()
        },
        git_branches: None,
    }
}

/// Write a starter `wsync.yaml` under `root`.
///
/// Idempotent: if the file already exists, loads and returns it unchanged.
pub fn init_at(root: &Path) -> Result<SyncConfig, ConfigError> {
    if config_path_at(root).exists() {
        return load_at(root);
    }
    std::fs::create_dir_all(root).map_err(|e| io_err(root, e))?;
    let config = starter_config();
    save_at(root, &config)?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

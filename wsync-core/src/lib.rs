//! wsync core library: domain types, layered settings, path filter, errors.
//!
//! - [`types`]: entities, trees, change operations
//! - [`settings`]: settings layers and [`settings::resolve`]
//! - [`config`]: `wsync.yaml` load / save / init
//! - [`filter`]: [`PathFilter`]
//! - [`error`]: [`ConfigError`], [`CoreError`]

pub mod config;
pub mod error;
pub mod filter;
pub mod settings;
pub mod types;

pub use error::{ConfigError, CoreError};
pub use filter::{FilterRejected, PathFilter, Scope};
pub use settings::{
    resolve, BranchConfig, CodebaseConfig, EffectiveSettings, ForceIncludes, SyncConfig,
    SyncOptions,
};
pub use types::{
    ChangeAction, ChangeOp, Entity, EntityFile, EntityKey, EntityKind, EntityPath, FileRole,
    Fingerprint, Tree,
};

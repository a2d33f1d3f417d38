//! Layered sync settings and their resolution.
//!
//! # Layers (highest precedence first)
//!
//! 1. CLI force-include flags for the special kinds.
//! 2. CLI overrides (skip flags, `--includes`, `--excludes`, `--parallelism`).
//! 3. `gitBranches.<promotion>.promotionOverrides` when promoting, otherwise
//!    `gitBranches.<branch>.overrides`.
//! 4. Top-level settings.
//!
//! Every merge is field-granular: a field left unset at one layer falls
//! through to the layer below. [`resolve`] never mutates its inputs and
//! never fails; unknown branches fall back to top-level settings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::EntityKind;

/// Parallelism used when no layer sets one.
pub const DEFAULT_PARALLELISM: usize = 10;

// ---------------------------------------------------------------------------
// Partial settings
// ---------------------------------------------------------------------------

/// A codebase whose TypeScript/JavaScript scripts ship with their local
/// imports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CodebaseConfig {
    /// Codebase root, relative to the sync root (`f/shared`).
    pub relative_path: String,
    /// Globs relative to the codebase root; empty means `**`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
}

/// One settings layer. Every field is optional: `None` means "not set here".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SyncOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub includes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excludes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codebases: Option<Vec<CodebaseConfig>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_scripts: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_flows: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_apps: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_variables: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_resources: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_resource_types: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_secrets: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_folders: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_schedules: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_triggers: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_users: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_groups: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_settings: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_key: Option<bool>,
}

macro_rules! overlay_fields {
    ($base:expr, $over:expr, [$($field:ident),* $(,)?]) => {
        SyncOptions {
            $($field: $over.$field.clone().or_else(|| $base.$field.clone()),)*
        }
    };
}

impl SyncOptions {
    /// Keys a settings layer accepts, as spelled in `wsync.yaml`.
    pub const KEYS: &'static [&'static str] = &[
        "includes",
        "excludes",
        "defaultLanguage",
        "parallelism",
        "codebases",
        "skipScripts",
        "skipFlows",
        "skipApps",
        "skipVariables",
        "skipResources",
        "skipResourceTypes",
        "skipSecrets",
        "skipFolders",
        "includeSchedules",
        "includeTriggers",
        "includeUsers",
        "includeGroups",
        "includeSettings",
        "includeKey",
    ];

    /// Field-granular merge: fields set in `over` win, the rest come from `self`.
    pub fn overlay(&self, over: &SyncOptions) -> SyncOptions {
        overlay_fields!(
            self,
            over,
            [
                includes,
                excludes,
                default_language,
                parallelism,
                codebases,
                skip_scripts,
                skip_flows,
                skip_apps,
                skip_variables,
                skip_resources,
                skip_resource_types,
                skip_secrets,
                skip_folders,
                include_schedules,
                include_triggers,
                include_users,
                include_groups,
                include_settings,
                include_key,
            ]
        )
    }
}

/// Per-branch override sets inside `gitBranches`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BranchConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides: Option<SyncOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promotion_overrides: Option<SyncOptions>,
}

/// Root of `wsync.yaml`: top-level settings plus per-branch overrides.
///
/// Unknown top-level keys are rejected by [`crate::config::load_at`], which
/// checks them against [`SyncConfig::is_known_key`] before deserializing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(flatten)]
    pub options: SyncOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_branches: Option<BTreeMap<String, BranchConfig>>,
}

impl SyncConfig {
    pub const BRANCHES_KEY: &'static str = "gitBranches";

    pub fn is_known_key(key: &str) -> bool {
        key == Self::BRANCHES_KEY || SyncOptions::KEYS.contains(&key)
    }

    pub fn branch(&self, name: &str) -> Option<&BranchConfig> {
        self.git_branches.as_ref().and_then(|b| b.get(name))
    }
}

// ---------------------------------------------------------------------------
// Force includes
// ---------------------------------------------------------------------------

/// CLI `--include-users/groups/settings/key` signals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForceIncludes {
    pub users: bool,
    pub groups: bool,
    pub settings: bool,
    pub key: bool,
}

impl ForceIncludes {
    pub fn all() -> Self {
        Self {
            users: true,
            groups: true,
            settings: true,
            key: true,
        }
    }

    pub fn for_kind(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::User => self.users,
            EntityKind::Group => self.groups,
            EntityKind::Setting => self.settings,
            EntityKind::EncryptionKey => self.key,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Effective settings
// ---------------------------------------------------------------------------

/// Settings for one operation. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveSettings {
    options: SyncOptions,
    force: ForceIncludes,
    branch: Option<String>,
    promotion: Option<String>,
}

impl EffectiveSettings {
    /// The merged layer, with `None` preserved for fields no layer set.
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn includes(&self) -> &[String] {
        self.options.includes.as_deref().unwrap_or(&[])
    }

    pub fn excludes(&self) -> &[String] {
        self.options.excludes.as_deref().unwrap_or(&[])
    }

    pub fn codebases(&self) -> &[CodebaseConfig] {
        self.options.codebases.as_deref().unwrap_or(&[])
    }

    pub fn default_language(&self) -> Option<&str> {
        self.options.default_language.as_deref()
    }

    pub fn parallelism(&self) -> usize {
        self.options.parallelism.unwrap_or(DEFAULT_PARALLELISM)
    }

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref()
    }

    pub fn promotion(&self) -> Option<&str> {
        self.promotion.as_deref()
    }

    /// The CLI force-include signals recorded during resolution.
    pub fn cli_force_includes(&self) -> ForceIncludes {
        self.force
    }

    /// Whether a special kind bypasses path globs: set on the CLI, or enabled
    /// by the resolved `include*` flag.
    pub fn is_forced(&self, kind: EntityKind) -> bool {
        if !kind.is_special() {
            return false;
        }
        let configured = match kind {
            EntityKind::User => self.options.include_users,
            EntityKind::Group => self.options.include_groups,
            EntityKind::Setting => self.options.include_settings,
            EntityKind::EncryptionKey => self.options.include_key,
            _ => None,
        };
        self.force.for_kind(kind) || configured.unwrap_or(false)
    }

    /// Kinds that only participate when explicitly enabled.
    pub fn is_opted_in(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Schedule => self.options.include_schedules.unwrap_or(false),
            EntityKind::Trigger => self.options.include_triggers.unwrap_or(false),
            k if k.is_special() => self.is_forced(k),
            _ => true,
        }
    }

    /// Kind-wide skip flag.
    pub fn skips(&self, kind: EntityKind) -> bool {
        let flag = match kind {
            EntityKind::Script => self.options.skip_scripts,
            EntityKind::Flow => self.options.skip_flows,
            EntityKind::App | EntityKind::RawApp => self.options.skip_apps,
            EntityKind::Variable => self.options.skip_variables,
            EntityKind::Resource => self.options.skip_resources,
            EntityKind::ResourceType => self.options.skip_resource_types,
            EntityKind::Folder => self.options.skip_folders,
            _ => None,
        };
        flag.unwrap_or(false)
    }

    pub fn skips_secrets(&self) -> bool {
        self.options.skip_secrets.unwrap_or(false)
    }

    /// Reject values no layer may legally produce.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.options.parallelism == Some(0) {
            return Err(ConfigError::ZeroParallelism);
        }
        Ok(())
    }
}

/// Merge the configuration layers into the settings for one operation.
///
/// `promotion_branch` selects that branch's `promotionOverrides` and takes
/// precedence over `branch`. Unknown branch names, and branches without the
/// relevant override set, resolve to the top-level settings.
pub fn resolve(
    config: &SyncConfig,
    promotion_branch: Option<&str>,
    force: ForceIncludes,
    cli: &SyncOptions,
    branch: Option<&str>,
) -> EffectiveSettings {
    let top = &config.options;

    let layered = match (promotion_branch, branch) {
        (Some(name), _) => {
            match config.branch(name).and_then(|b| b.promotion_overrides.as_ref()) {
                Some(over) => top.overlay(over),
                None => {
                    tracing::warn!(
                        branch = name,
                        "no promotionOverrides for branch, using top-level settings"
                    );
                    top.clone()
                }
            }
        }
        (None, Some(name)) => match config.branch(name).and_then(|b| b.overrides.as_ref()) {
            Some(over) => top.overlay(over),
            None => {
                tracing::debug!(branch = name, "no overrides for branch, using top-level settings");
                top.clone()
            }
        },
        (None, None) => top.clone(),
    };

    let mut options = layered.overlay(cli);
    if force.users {
        options.include_users = Some(true);
    }
    if force.groups {
        options.include_groups = Some(true);
    }
    if force.settings {
        options.include_settings = Some(true);
    }
    if force.key {
        options.include_key = Some(true);
    }

    EffectiveSettings {
        options,
        force,
        branch: branch.map(str::to_owned),
        promotion: promotion_branch.map(str::to_owned),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

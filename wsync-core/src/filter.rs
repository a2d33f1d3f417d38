//! Path/type filter deciding which entities take part in a sync.
//!
//! Rules, in order:
//! 1. A special kind with its force-include flag set is in scope, whatever
//!    the globs say.
//! 2. A kind that is not opted in, or is skipped, is out of scope.
//! 3. Excludes (any match ⇒ out), then includes (no match ⇒ out; an empty
//!    include list admits everything not excluded).
//!
//! Globs are case-sensitive; `*` stops at `/`, `**` crosses segments. Each
//! pattern is tested against the logical path and the on-disk anchor, so both
//! `f/**` and `**/*.variable.yaml` select `f/db.variable.yaml`.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::error::ConfigError;
use crate::settings::{resolve, EffectiveSettings, ForceIncludes, SyncConfig, SyncOptions};
use crate::types::{Entity, EntityKind};

/// Why an entity was left out. Informational, never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterRejected {
    /// Opt-in kind (schedules, triggers, special kinds) not enabled.
    NotOptedIn(EntityKind),
    /// Kind-wide skip flag.
    Skipped(EntityKind),
    /// Secret variable under `skipSecrets`.
    SecretSkipped,
    /// Matched an exclude pattern.
    Excluded { pattern: String },
    /// Include list is non-empty and nothing matched.
    NotIncluded,
}

/// Outcome of [`PathFilter::classify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Special kind admitted by its force-include flag.
    Forced,
    Included,
    Rejected(FilterRejected),
}

impl Scope {
    pub fn is_in(&self) -> bool {
        !matches!(self, Scope::Rejected(_))
    }
}

/// Compile patterns into a [`GlobSet`] with `/`-aware `*`.
pub fn compile_globs(patterns: &[String]) -> Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|source| ConfigError::InvalidGlob {
                pattern: pattern.clone(),
                source,
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| ConfigError::InvalidGlob {
        pattern: patterns.join(", "),
        source,
    })
}

/// Settings bound to compiled glob sets. Pure: no I/O, no side effects.
#[derive(Debug, Clone)]
pub struct PathFilter {
    settings: EffectiveSettings,
    includes: Option<GlobSet>,
    excludes: GlobSet,
    exclude_patterns: Vec<String>,
}

impl PathFilter {
    /// Compile the filter. Invalid globs and invalid settings are
    /// [`ConfigError`]s.
    pub fn new(settings: &EffectiveSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let includes = if settings.includes().is_empty() {
            None
        } else {
            Some(compile_globs(settings.includes())?)
        };
        Ok(Self {
            settings: settings.clone(),
            includes,
            excludes: compile_globs(settings.excludes())?,
            exclude_patterns: settings.excludes().to_vec(),
        })
    }

    /// Everything is in scope: no globs, no skips, every opt-in kind enabled.
    pub fn unrestricted() -> Self {
        let cli = SyncOptions {
            include_schedules: Some(true),
            include_triggers: Some(true),
            ..Default::default()
        };
        let settings = resolve(&SyncConfig::default(), None, ForceIncludes::all(), &cli, None);
        Self {
            settings,
            includes: None,
            excludes: GlobSet::empty(),
            exclude_patterns: Vec::new(),
        }
    }

    pub fn settings(&self) -> &EffectiveSettings {
        &self.settings
    }

    pub fn in_scope(&self, entity: &Entity) -> bool {
        self.classify(entity).is_in()
    }

    pub fn classify(&self, entity: &Entity) -> Scope {
        let kind = entity.kind();
        if self.settings.is_forced(kind) {
            return Scope::Forced;
        }
        if !self.settings.is_opted_in(kind) {
            return Scope::Rejected(FilterRejected::NotOptedIn(kind));
        }
        if self.settings.skips(kind) {
            return Scope::Rejected(FilterRejected::Skipped(kind));
        }
        if kind == EntityKind::Variable && entity.is_secret() && self.settings.skips_secrets() {
            return Scope::Rejected(FilterRejected::SecretSkipped);
        }

        let candidates = [entity.path().as_str(), entity.anchor()];
        for candidate in candidates {
            if let Some(&idx) = self.excludes.matches(candidate).first() {
                return Scope::Rejected(FilterRejected::Excluded {
                    pattern: self.exclude_patterns[idx].clone(),
                });
            }
        }
        match &self.includes {
            None => Scope::Included,
            Some(set) if candidates.iter().any(|c| set.is_match(c)) => Scope::Included,
            Some(_) => Scope::Rejected(FilterRejected::NotIncluded),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

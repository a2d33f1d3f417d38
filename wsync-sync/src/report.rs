//! Per-entity apply results.

use chrono::{DateTime, Utc};
use serde::Serialize;
use wsync_core::{ChangeAction, EntityKind};

use crate::changeset::{ChangeCounts, Changeset};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Dry run: computed, not executed.
    Planned,
    Applied,
    /// Never dispatched, because of a fatal error or a cancel.
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryReport {
    pub path: String,
    pub kind: EntityKind,
    pub action: ChangeAction,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub planned: usize,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Result of applying a changeset to one destination.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub destination: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub changes: ChangeCounts,
    pub entries: Vec<EntryReport>,
    /// Set when a fatal error stopped dispatch.
    pub aborted: Option<String>,
    pub cancelled: bool,
}

impl ApplyReport {
    /// Report for a dry run: every change planned, nothing touched.
    pub fn planned(destination: impl Into<String>, changeset: &Changeset) -> Self {
        let now = Utc::now();
        Self {
            destination: destination.into(),
            dry_run: true,
            started_at: now,
            finished_at: now,
            changes: changeset.counts(),
            entries: changeset
                .ops()
                .iter()
                .map(|op| EntryReport {
                    path: op.path.to_string(),
                    kind: op.kind,
                    action: op.action,
                    outcome: Outcome::Planned,
                })
                .collect(),
            aborted: None,
            cancelled: false,
        }
    }

    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for entry in &self.entries {
            match entry.outcome {
                Outcome::Planned => counts.planned += 1,
                Outcome::Applied => counts.applied += 1,
                Outcome::Skipped { .. } => counts.skipped += 1,
                Outcome::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }

    pub fn failures(&self) -> impl Iterator<Item = &EntryReport> {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, Outcome::Failed { .. }))
    }

    /// True when something went wrong: a failed entity or a fatal abort.
    pub fn has_failures(&self) -> bool {
        self.aborted.is_some() || self.failures().next().is_some()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

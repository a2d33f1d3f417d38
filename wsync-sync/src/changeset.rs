//! Source/target comparison producing an ordered changeset.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;
use wsync_core::{ChangeAction, ChangeOp, EntityKey, EntityKind, PathFilter, Scope, Tree};

/// Ordered list of operations turning the target into the source.
///
/// Ordered by kind priority, then path. Special kinds therefore come last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    ops: Vec<ChangeOp>,
}

/// Count of operations per action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeCounts {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
}

impl ChangeCounts {
    pub fn total(&self) -> usize {
        self.create + self.update + self.delete
    }
}

/// One line of the machine-readable plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedChange {
    pub path: String,
    pub kind: EntityKind,
    pub action: ChangeAction,
}

/// `{ "changes": [{ "path", "kind", "action" }] }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangesetReport {
    pub changes: Vec<PlannedChange>,
}

impl Changeset {
    pub fn ops(&self) -> &[ChangeOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<ChangeOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn counts(&self) -> ChangeCounts {
        let mut counts = ChangeCounts::default();
        for op in &self.ops {
            match op.action {
                ChangeAction::Create => counts.create += 1,
                ChangeAction::Update => counts.update += 1,
                ChangeAction::Delete => counts.delete += 1,
            }
        }
        counts
    }

    pub fn report(&self) -> ChangesetReport {
        ChangesetReport {
            changes: self
                .ops
                .iter()
                .map(|op| PlannedChange {
                    path: op.path.to_string(),
                    kind: op.kind,
                    action: op.action,
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.report())
    }
}

/// Compute the operations that make `target` match `source`.
///
/// Entities outside the filter's scope are ignored on both sides, so an
/// out-of-scope target entity is never deleted. Keys quarantined as
/// malformed on either side are left alone.
pub fn diff(source: &Tree, target: &Tree, filter: &PathFilter) -> Changeset {
    let quarantined: BTreeSet<&EntityKey> =
        source.quarantined().chain(target.quarantined()).collect();
    let mut ops = Vec::new();

    for entity in source.entities() {
        let key = entity.key();
        if quarantined.contains(&key) {
            debug!(entity = %key, "skipping quarantined entity");
            continue;
        }
        if let Scope::Rejected(reason) = filter.classify(entity) {
            debug!(entity = %key, ?reason, "out of scope");
            continue;
        }
        match target.get(&key) {
            None => ops.push(ChangeOp::create(entity.clone())),
            Some(existing) if existing.fingerprint() != entity.fingerprint() => {
                ops.push(ChangeOp::update(entity.clone(), existing.clone()))
            }
            Some(_) => {}
        }
    }

    for entity in target.entities() {
        let key = entity.key();
        if source.contains(&key) || quarantined.contains(&key) {
            continue;
        }
        if let Scope::Rejected(reason) = filter.classify(entity) {
            debug!(entity = %key, ?reason, "out of scope, not deleted");
            continue;
        }
        ops.push(ChangeOp::delete(entity.clone()));
    }

    ops.sort_by(|a, b| (a.kind, &a.path).cmp(&(b.kind, &b.path)));
    Changeset { ops }
}

//! Concurrent application of a changeset to a destination.
//!
//! Each operation is independent: one failure is recorded and the rest
//! continue. A fatal error (authentication) or an operator cancel stops
//! dispatch; operations already in flight finish, and everything not yet
//! dispatched is reported as skipped. Nothing is rolled back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info};
use wsync_core::settings::DEFAULT_PARALLELISM;

use crate::changeset::Changeset;
use crate::destination::Destination;
use crate::report::{ApplyReport, EntryReport, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOptions {
    pub dry_run: bool,
    /// Maximum operations in flight. Values below 1 are treated as 1.
    pub parallelism: usize,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

/// A cancel signal nobody will ever fire.
pub fn never_cancel() -> watch::Receiver<bool> {
    let (_tx, rx) = watch::channel(false);
    rx
}

/// Apply `changeset` to `destination`.
///
/// In dry-run mode the destination is never called.
pub async fn apply(
    changeset: &Changeset,
    destination: Arc<dyn Destination>,
    options: ApplyOptions,
    cancel: watch::Receiver<bool>,
) -> ApplyReport {
    let label = destination.label();
    if options.dry_run {
        return ApplyReport::planned(label, changeset);
    }

    let started_at = Utc::now();
    let ops = changeset.ops();
    let mut outcomes: Vec<Option<Outcome>> = vec![None; ops.len()];

    let semaphore = Arc::new(Semaphore::new(options.parallelism.max(1)));
    let stop = Arc::new(AtomicBool::new(false));
    let fatal: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let mut set = JoinSet::new();
    let mut cancelled = false;
    let mut dispatched = 0usize;

    for (idx, op) in ops.iter().enumerate() {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        if *cancel.borrow() {
            cancelled = true;
            break;
        }
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let op = op.clone();
        let destination = destination.clone();
        let stop = stop.clone();
        let fatal = fatal.clone();
        set.spawn(async move {
            let result = destination.apply(&op).await;
            if let Err(err) = &result {
                if err.is_fatal() {
                    stop.store(true, Ordering::SeqCst);
                    if let Ok(mut slot) = fatal.lock() {
                        slot.get_or_insert_with(|| err.to_string());
                    }
                }
            }
            drop(permit);
            (idx, op, result)
        });
        dispatched += 1;
    }

    while let Some(joined) = set.join_next().await {
        let Ok((idx, op, result)) = joined else {
            // A panicked task loses its index; it is reported below.
            continue;
        };
        outcomes[idx] = Some(match result {
            Ok(()) => {
                info!(entity = %op.key(), action = %op.action, "applied");
                Outcome::Applied
            }
            Err(err) => {
                error!(entity = %op.key(), action = %op.action, error = %err, "failed");
                Outcome::Failed {
                    reason: err.to_string(),
                }
            }
        });
    }

    let aborted = fatal.lock().ok().and_then(|slot| slot.clone());
    let skip_reason = match (&aborted, cancelled) {
        (Some(reason), _) => format!("aborted: {reason}"),
        (None, true) => "cancelled".to_string(),
        (None, false) => "not dispatched".to_string(),
    };

    let entries: Vec<EntryReport> = ops
        .iter()
        .zip(outcomes)
        .enumerate()
        .map(|(idx, (op, outcome))| EntryReport {
            path: op.path.to_string(),
            kind: op.kind,
            action: op.action,
            outcome: outcome.unwrap_or_else(|| {
                if idx < dispatched {
                    Outcome::Failed {
                        reason: "task panicked".to_string(),
                    }
                } else {
                    Outcome::Skipped {
                        reason: skip_reason.clone(),
                    }
                }
            }),
        })
        .collect();

    ApplyReport {
        destination: label,
        dry_run: false,
        started_at,
        finished_at: Utc::now(),
        changes: changeset.counts(),
        entries,
        aborted,
        cancelled,
    }
}

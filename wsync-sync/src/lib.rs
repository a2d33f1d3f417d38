//! # wsync-sync
//!
//! Changeset computation and application.
//!
//! [`pipeline::run`] reads both sides, diffs them through the path filter and
//! applies the result to a local directory (pull) or a remote workspace
//! (push). [`pipeline::plan`] stops after the diff.
//! [`pipeline::plan_or_cancel`] is the same, abandoned on a cancel signal.

pub mod applier;
pub mod changeset;
pub mod destination;
pub mod diff;
pub mod error;
pub mod pipeline;
pub mod remote;
pub mod report;

pub use applier::{apply, never_cancel, ApplyOptions};
pub use changeset::{diff as compute_changeset, ChangeCounts, Changeset, ChangesetReport};
pub use destination::{Destination, LocalDestination, RemoteDestination};
pub use error::{DestinationError, RemoteError, SyncError};
pub use pipeline::{plan, plan_or_cancel, run, Direction, Plan, SyncOutcome, SyncRequest};
pub use remote::{export_with_retry, DirRemote, MemoryRemote, RemoteWorkspace, RetryPolicy};
pub use report::{ApplyReport, EntryReport, Outcome, OutcomeCounts};

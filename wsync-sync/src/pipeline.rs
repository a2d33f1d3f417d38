//! Shared sync pipeline entrypoint used by `wsync pull`, `push` and `diff`.
//!
//! 1. Load `wsync.yaml` and resolve the effective settings.
//! 2. Build the path filter and the tree reader (config errors stop here,
//!    before any tree is read).
//! 3. Read the local tree and the remote export.
//! 4. Diff source against target.
//! 5. Apply to the destination for the direction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};
use wsync_core::{config, resolve, ForceIncludes, PathFilter, SyncOptions, Tree};
use wsync_tree::{LocalDir, MalformedEntity, MemorySource, TreeReader};

use crate::applier::{apply, ApplyOptions};
use crate::changeset::{diff, Changeset};
use crate::destination::{Destination, LocalDestination, RemoteDestination};
use crate::error::SyncError;
use crate::remote::{export_with_retry, RemoteWorkspace, RetryPolicy};
use crate::report::ApplyReport;

/// Which side is the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Remote → local.
    Pull,
    /// Local → remote.
    Push,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Pull => "pull",
            Direction::Push => "push",
        }
    }
}

/// Everything one run needs besides the remote.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub root: PathBuf,
    pub direction: Direction,
    pub branch: Option<String>,
    pub promotion: Option<String>,
    pub force: ForceIncludes,
    pub cli: SyncOptions,
    pub dry_run: bool,
    pub retry: RetryPolicy,
}

impl SyncRequest {
    pub fn new(root: impl Into<PathBuf>, direction: Direction) -> Self {
        Self {
            root: root.into(),
            direction,
            branch: None,
            promotion: None,
            force: ForceIncludes::default(),
            cli: SyncOptions::default(),
            dry_run: false,
            retry: RetryPolicy::default(),
        }
    }
}

/// A computed changeset together with what was read to compute it.
#[derive(Debug, Clone)]
pub struct Plan {
    pub direction: Direction,
    pub filter: PathFilter,
    pub changeset: Changeset,
    pub local_malformed: Vec<MalformedEntity>,
    pub remote_malformed: Vec<MalformedEntity>,
}

/// Result of [`run`].
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub plan: Plan,
    pub report: ApplyReport,
}

/// Read both sides and compute the changeset. Touches nothing.
pub async fn plan(request: &SyncRequest, remote: &dyn RemoteWorkspace) -> Result<Plan, SyncError> {
    let config = config::load_at(&request.root)?;
    let settings = resolve(
        &config,
        request.promotion.as_deref(),
        request.force,
        &request.cli,
        request.branch.as_deref(),
    );
    let filter = PathFilter::new(&settings)?;
    let reader = TreeReader::new(settings.codebases())?;

    let local = read_local(&reader, &request.root).await?;
    let exported = export_with_retry(remote, &request.retry).await?;
    let remote_read = reader.read(&MemorySource::new(remote.label(), exported))?;

    let (source, target): (&Tree, &Tree) = match request.direction {
        Direction::Pull => (&remote_read.tree, &local.tree),
        Direction::Push => (&local.tree, &remote_read.tree),
    };
    let changeset = diff(source, target, &filter);
    let counts = changeset.counts();
    info!(
        direction = request.direction.as_str(),
        create = counts.create,
        update = counts.update,
        delete = counts.delete,
        "changeset computed"
    );
    for m in local.malformed.iter().chain(remote_read.malformed.iter()) {
        warn!(entity = %m.key, "left untouched: {}", m.reason);
    }

    Ok(Plan {
        direction: request.direction,
        filter,
        changeset,
        local_malformed: local.malformed,
        remote_malformed: remote_read.malformed,
    })
}

/// [`plan`], abandoned with [`SyncError::Cancelled`] as soon as `cancel`
/// turns true.
pub async fn plan_or_cancel(
    request: &SyncRequest,
    remote: &dyn RemoteWorkspace,
    cancel: &mut watch::Receiver<bool>,
) -> Result<Plan, SyncError> {
    tokio::select! {
        biased;
        _ = cancelled(cancel) => {
            warn!(direction = request.direction.as_str(), "interrupted while planning");
            Err(SyncError::Cancelled)
        }
        plan = plan(request, remote) => plan,
    }
}

/// Plan, then apply to the destination for the request's direction.
///
/// `cancel` abandons planning outright; once applying, it only stops
/// dispatch of further operations.
pub async fn run(
    request: &SyncRequest,
    remote: Arc<dyn RemoteWorkspace>,
    mut cancel: watch::Receiver<bool>,
) -> Result<SyncOutcome, SyncError> {
    let plan = plan_or_cancel(request, remote.as_ref(), &mut cancel).await?;
    let destination: Arc<dyn Destination> = match request.direction {
        Direction::Pull => Arc::new(LocalDestination::new(&request.root)),
        Direction::Push => Arc::new(RemoteDestination::new(remote)),
    };
    let options = ApplyOptions {
        dry_run: request.dry_run,
        parallelism: plan.filter.settings().parallelism(),
    };
    let report = apply(&plan.changeset, destination, options, cancel).await;
    let counts = report.counts();
    info!(
        direction = request.direction.as_str(),
        applied = counts.applied,
        skipped = counts.skipped,
        failed = counts.failed,
        dry_run = request.dry_run,
        "sync finished"
    );
    Ok(SyncOutcome { plan, report })
}

/// Resolves once `cancel` is true. A closed channel never cancels.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn read_local(reader: &TreeReader, root: &Path) -> Result<wsync_tree::ReadOutcome, SyncError> {
    let reader = reader.clone();
    let root = root.to_path_buf();
    let outcome = tokio::task::spawn_blocking(move || reader.read(&LocalDir::new(root)))
        .await
        .map_err(|e| SyncError::Task(e.to_string()))??;
    Ok(outcome)
}

//! The remote workspace capability.
//!
//! A remote exposes one read (`export`, the full file listing) and three
//! entity-level writes. Reads are idempotent and retried with bounded
//! exponential backoff; writes are attempted once.

use std::time::Duration;

use async_trait::async_trait;
use wsync_core::{EntityKind, EntityPath};
use wsync_tree::FileMap;

use crate::error::RemoteError;

mod dir;
mod memory;

pub use dir::DirRemote;
pub use memory::MemoryRemote;

#[async_trait]
pub trait RemoteWorkspace: Send + Sync {
    /// Name for log lines.
    fn label(&self) -> String;

    /// Every file of the remote workspace, keyed by workspace-relative path.
    async fn export(&self) -> Result<FileMap, RemoteError>;

    async fn create_entity(
        &self,
        kind: EntityKind,
        path: &EntityPath,
        files: &FileMap,
    ) -> Result<(), RemoteError>;

    /// Replace the entity's complete file set.
    async fn update_entity(
        &self,
        kind: EntityKind,
        path: &EntityPath,
        files: &FileMap,
    ) -> Result<(), RemoteError>;

    async fn delete_entity(&self, kind: EntityKind, path: &EntityPath) -> Result<(), RemoteError>;
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// Bounded exponential backoff for idempotent reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// `export` with retries on transient failures. Fatal and rejected errors are
/// returned immediately.
pub async fn export_with_retry(
    remote: &dyn RemoteWorkspace,
    policy: &RetryPolicy,
) -> Result<FileMap, RemoteError> {
    let mut retries = 0;
    loop {
        match remote.export().await {
            Ok(files) => return Ok(files),
            Err(err) if err.is_transient() && retries < policy.retries => {
                retries += 1;
                let delay = policy.backoff(retries);
                tracing::warn!(
                    remote = %remote.label(),
                    attempt = retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "export failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

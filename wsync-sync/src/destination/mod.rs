//! Where a changeset is applied.

use std::sync::Arc;

use async_trait::async_trait;
use wsync_core::{ChangeAction, ChangeOp};
use wsync_tree::FileMap;

use crate::error::DestinationError;
use crate::remote::RemoteWorkspace;

mod local;

pub use local::LocalDestination;
pub(crate) use local::{delete_entity, write_entity};

/// Applies one change operation at a time. Implementations must be safe to
/// call concurrently for different entities.
#[async_trait]
pub trait Destination: Send + Sync {
    fn label(&self) -> String;

    async fn apply(&self, op: &ChangeOp) -> Result<(), DestinationError>;
}

/// Push side: forwards operations to a [`RemoteWorkspace`]. Writes are not
/// retried.
#[derive(Clone)]
pub struct RemoteDestination {
    remote: Arc<dyn RemoteWorkspace>,
}

impl RemoteDestination {
    pub fn new(remote: Arc<dyn RemoteWorkspace>) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl Destination for RemoteDestination {
    fn label(&self) -> String {
        format!("remote {}", self.remote.label())
    }

    async fn apply(&self, op: &ChangeOp) -> Result<(), DestinationError> {
        match op.action {
            ChangeAction::Create => {
                let files = file_map(op)?;
                self.remote.create_entity(op.kind, &op.path, &files).await?;
            }
            ChangeAction::Update => {
                let files = file_map(op)?;
                self.remote.update_entity(op.kind, &op.path, &files).await?;
            }
            ChangeAction::Delete => self.remote.delete_entity(op.kind, &op.path).await?,
        }
        Ok(())
    }
}

fn file_map(op: &ChangeOp) -> Result<FileMap, DestinationError> {
    let files = op.source_files().ok_or_else(|| DestinationError::InvalidOp {
        key: op.key().to_string(),
        reason: "no source entity".to_string(),
    })?;
    Ok(files
        .iter()
        .map(|f| (f.relative_path.clone(), f.content.clone()))
        .collect())
}

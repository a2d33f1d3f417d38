//! Remote workspace backed by a plain directory (`file://` URLs).
//!
//! Useful for mirroring a workspace to another checkout and for exercising
//! push/pull end to end without a server.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use wsync_core::{Entity, EntityFile, EntityKey, EntityKind, EntityPath};
use wsync_tree::{FileMap, LocalDir, RawSource, TreeReader};

use crate::destination::{delete_entity, write_entity};
use crate::error::{DestinationError, RemoteError};
use crate::remote::RemoteWorkspace;

#[derive(Debug, Clone)]
pub struct DirRemote {
    root: PathBuf,
}

impl DirRemote {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, RemoteError>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T, RemoteError> + Send + 'static,
    {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || f(&root))
            .await
            .map_err(|e| RemoteError::Transient(format!("task failed: {e}")))?
    }
}

#[async_trait]
impl RemoteWorkspace for DirRemote {
    fn label(&self) -> String {
        format!("file://{}", self.root.display())
    }

    async fn export(&self) -> Result<FileMap, RemoteError> {
        self.blocking(|root| {
            if !root.is_dir() {
                return Err(RemoteError::Rejected {
                    status: 404,
                    message: format!("{} is not a directory", root.display()),
                });
            }
            LocalDir::new(root)
                .files()
                .map_err(|e| RemoteError::Transient(e.to_string()))
        })
        .await
    }

    async fn create_entity(
        &self,
        kind: EntityKind,
        path: &EntityPath,
        files: &FileMap,
    ) -> Result<(), RemoteError> {
        let key = EntityKey::new(kind, path.clone());
        let files = files.clone();
        self.blocking(move |root| {
            if find(root, &key)?.is_some() {
                return Err(RemoteError::Rejected {
                    status: 409,
                    message: format!("{key} already exists"),
                });
            }
            write_entity(root, &entity_from(&key, files), None).map_err(into_remote)
        })
        .await
    }

    async fn update_entity(
        &self,
        kind: EntityKind,
        path: &EntityPath,
        files: &FileMap,
    ) -> Result<(), RemoteError> {
        let key = EntityKey::new(kind, path.clone());
        let files = files.clone();
        self.blocking(move |root| {
            let prior = find(root, &key)?.ok_or_else(|| RemoteError::Rejected {
                status: 404,
                message: format!("{key} not found"),
            })?;
            write_entity(root, &entity_from(&key, files), Some(&prior)).map_err(into_remote)
        })
        .await
    }

    async fn delete_entity(&self, kind: EntityKind, path: &EntityPath) -> Result<(), RemoteError> {
        let key = EntityKey::new(kind, path.clone());
        self.blocking(move |root| {
            let prior = find(root, &key)?.ok_or_else(|| RemoteError::Rejected {
                status: 404,
                message: format!("{key} not found"),
            })?;
            delete_entity(root, &prior).map_err(into_remote)
        })
        .await
    }
}

fn find(root: &Path, key: &EntityKey) -> Result<Option<Entity>, RemoteError> {
    let outcome = TreeReader::default()
        .read(&LocalDir::new(root))
        .map_err(|e| RemoteError::Transient(e.to_string()))?;
    Ok(outcome.tree.get(key).cloned())
}

fn entity_from(key: &EntityKey, files: FileMap) -> Entity {
    let files = files
        .into_iter()
        .map(|(rel, content)| EntityFile::owned(rel, content))
        .collect();
    Entity::new(key.kind, key.path.clone(), key.path.as_str(), files)
}

fn into_remote(err: DestinationError) -> RemoteError {
    match err {
        DestinationError::Remote(e) => e,
        DestinationError::UnsafePath(path) => RemoteError::Rejected {
            status: 400,
            message: format!("unsafe path {path}"),
        },
        other => RemoteError::Transient(other.to_string()),
    }
}

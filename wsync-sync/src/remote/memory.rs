//! In-memory remote workspace with fault injection.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use wsync_core::{EntityKey, EntityKind, EntityPath};
use wsync_tree::{FileMap, TreeReader};

use crate::error::RemoteError;
use crate::remote::RemoteWorkspace;

#[derive(Debug, Default)]
struct State {
    entities: BTreeMap<EntityKey, FileMap>,
    /// Files that belong to no well-formed entity.
    loose: FileMap,
    failing_exports: u32,
    auth_denied: bool,
    rejected: BTreeSet<String>,
    export_calls: usize,
    writes: Vec<String>,
}

/// Remote workspace held in memory. Entities are stored by key, the way a
/// server keeps them, and flattened back into files on export.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<State>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a flat file listing, grouped with the default reader.
    pub fn with_files(files: FileMap) -> Self {
        let mut state = State::default();
        match TreeReader::default().read_files(&files) {
            Ok(outcome) => {
                let mut claimed = BTreeSet::new();
                for entity in outcome.tree.entities() {
                    let entity_files: FileMap = entity
                        .files()
                        .iter()
                        .map(|f| (f.relative_path.clone(), f.content.clone()))
                        .collect();
                    claimed.extend(entity_files.keys().cloned());
                    state.entities.insert(entity.key(), entity_files);
                }
                state.loose = files
                    .into_iter()
                    .filter(|(path, _)| !claimed.contains(path))
                    .collect();
            }
            Err(_) => state.loose = files,
        }
        Self {
            state: Mutex::new(state),
        }
    }

    /// Make the next `n` exports fail with a transient error.
    pub fn fail_next_exports(&self, n: u32) {
        self.lock().failing_exports = n;
    }

    /// Refuse every request as unauthenticated.
    pub fn deny_auth(&self) {
        self.lock().auth_denied = true;
    }

    /// Reject writes to the entity at `path` (any kind).
    pub fn reject_writes_to(&self, path: &str) {
        self.lock().rejected.insert(path.to_string());
    }

    pub fn export_calls(&self) -> usize {
        self.lock().export_calls
    }

    /// Applied writes, as `action kind:path`, in arrival order.
    pub fn writes(&self) -> Vec<String> {
        self.lock().writes.clone()
    }

    /// Current flat file listing.
    pub fn files(&self) -> FileMap {
        flatten(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_write(state: &State, path: &EntityPath) -> Result<(), RemoteError> {
        if state.auth_denied {
            return Err(RemoteError::FatalAuth("token rejected".into()));
        }
        if state.rejected.contains(path.as_str()) {
            return Err(RemoteError::Rejected {
                status: 422,
                message: format!("{path} rejected"),
            });
        }
        Ok(())
    }
}

fn flatten(state: &State) -> FileMap {
    let mut files = state.loose.clone();
    for entity_files in state.entities.values() {
        files.extend(entity_files.iter().map(|(p, c)| (p.clone(), c.clone())));
    }
    files
}

#[async_trait]
impl RemoteWorkspace for MemoryRemote {
    fn label(&self) -> String {
        "memory".to_string()
    }

    async fn export(&self) -> Result<FileMap, RemoteError> {
        let mut state = self.lock();
        state.export_calls += 1;
        if state.auth_denied {
            return Err(RemoteError::FatalAuth("token rejected".into()));
        }
        if state.failing_exports > 0 {
            state.failing_exports -= 1;
            return Err(RemoteError::Transient("connection reset".into()));
        }
        Ok(flatten(&state))
    }

    async fn create_entity(
        &self,
        kind: EntityKind,
        path: &EntityPath,
        files: &FileMap,
    ) -> Result<(), RemoteError> {
        let mut state = self.lock();
        Self::check_write(&state, path)?;
        let key = EntityKey::new(kind, path.clone());
        if state.entities.contains_key(&key) {
            return Err(RemoteError::Rejected {
                status: 409,
                message: format!("{key} already exists"),
            });
        }
        state.writes.push(format!("create {key}"));
        state.entities.insert(key, files.clone());
        Ok(())
    }

    async fn update_entity(
        &self,
        kind: EntityKind,
        path: &EntityPath,
        files: &FileMap,
    ) -> Result<(), RemoteError> {
        let mut state = self.lock();
        Self::check_write(&state, path)?;
        let key = EntityKey::new(kind, path.clone());
        if !state.entities.contains_key(&key) {
            return Err(RemoteError::Rejected {
                status: 404,
                message: format!("{key} not found"),
            });
        }
        state.writes.push(format!("update {key}"));
        state.entities.insert(key, files.clone());
        Ok(())
    }

    async fn delete_entity(&self, kind: EntityKind, path: &EntityPath) -> Result<(), RemoteError> {
        let mut state = self.lock();
        Self::check_write(&state, path)?;
        let key = EntityKey::new(kind, path.clone());
        if state.entities.remove(&key).is_none() {
            return Err(RemoteError::Rejected {
                status: 404,
                message: format!("{key} not found"),
            });
        }
        state.writes.push(format!("delete {key}"));
        Ok(())
    }
}

//! Local sync root as a destination (pull).
//!
//! ## Entity write protocol
//!
//! 1. Stage every file of the new version as `<file>.<fp8>.wsync.tmp`.
//! 2. If any staging write fails, remove what was staged and stop. The
//!    entity on disk is untouched.
//! 3. Rename every staged file onto its final path.
//! 4. On update, remove owned files of the prior version that the new
//!    version no longer has.
//!
//! Deletes remove the prior version's owned files only. Bundled codebase
//! files may be shared by other scripts and are never removed here.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use wsync_core::{ChangeAction, ChangeOp, Entity, EntityFile};
use wsync_tree::layout::{parent_dir, STAGING_SUFFIX};

use crate::destination::Destination;
use crate::error::{io_err, DestinationError};

#[derive(Debug, Clone)]
pub struct LocalDestination {
    root: PathBuf,
}

impl LocalDestination {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Destination for LocalDestination {
    fn label(&self) -> String {
        format!("local {}", self.root.display())
    }

    async fn apply(&self, op: &ChangeOp) -> Result<(), DestinationError> {
        let root = self.root.clone();
        let op = op.clone();
        tokio::task::spawn_blocking(move || apply_blocking(&root, &op))
            .await
            .map_err(|e| DestinationError::Task(e.to_string()))?
    }
}

fn apply_blocking(root: &Path, op: &ChangeOp) -> Result<(), DestinationError> {
    match op.action {
        ChangeAction::Create | ChangeAction::Update => {
            let source = op.source.as_ref().ok_or_else(|| DestinationError::InvalidOp {
                key: op.key().to_string(),
                reason: "no source entity".to_string(),
            })?;
            write_entity(root, source, op.prior.as_ref())
        }
        ChangeAction::Delete => {
            let prior = op.prior.as_ref().ok_or_else(|| DestinationError::InvalidOp {
                key: op.key().to_string(),
                reason: "no prior entity".to_string(),
            })?;
            delete_entity(root, prior)
        }
    }
}

/// Write `entity` under `root`, replacing `prior` if given.
pub(crate) fn write_entity(
    root: &Path,
    entity: &Entity,
    prior: Option<&Entity>,
) -> Result<(), DestinationError> {
    let tag = entity.fingerprint().short().to_string();
    write_files(root, entity.files(), &tag)?;

    if let Some(prior) = prior {
        let kept: BTreeSet<&str> = entity
            .files()
            .iter()
            .map(|f| f.relative_path.as_str())
            .collect();
        let stale: Vec<&str> = prior
            .owned_files()
            .map(|f| f.relative_path.as_str())
            .filter(|p| !kept.contains(p))
            .collect();
        if !stale.is_empty() {
            tracing::debug!(entity = %entity.key(), count = stale.len(), "removing stale files");
            remove_files(root, &stale, boundary_of(prior))?;
        }
    }
    Ok(())
}

/// Remove the owned files of `entity` and prune emptied directories.
pub(crate) fn delete_entity(root: &Path, entity: &Entity) -> Result<(), DestinationError> {
    let owned: Vec<&str> = entity
        .owned_files()
        .map(|f| f.relative_path.as_str())
        .collect();
    remove_files(root, &owned, boundary_of(entity))
}

/// Stage then rename every file. Either all files are staged or none is
/// renamed.
fn write_files(
    root: &Path,
    files: &[EntityFile],
    tag: &str,
) -> Result<(), DestinationError> {
    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(files.len());

    for file in files {
        let target = match safe_join(root, &file.relative_path) {
            Ok(target) => target,
            Err(err) => {
                discard(&staged);
                return Err(err);
            }
        };
        let tmp = PathBuf::from(format!("{}.{tag}{STAGING_SUFFIX}", target.display()));
        if let Err(err) = stage(&tmp, &file.content) {
            discard(&staged);
            return Err(err);
        }
        staged.push((tmp, target));
    }

    for (idx, (tmp, target)) in staged.iter().enumerate() {
        if let Err(e) = std::fs::rename(tmp, target) {
            discard(&staged[idx..]);
            return Err(io_err(target, e));
        }
    }
    Ok(())
}

fn stage(tmp: &Path, content: &[u8]) -> Result<(), DestinationError> {
    if let Some(parent) = tmp.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    std::fs::write(tmp, content).map_err(|e| io_err(tmp, e))
}

fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        let _ = std::fs::remove_file(tmp);
    }
}

/// Remove files (missing ones are fine), then prune directories left empty,
/// never going above `boundary` (relative to root).
fn remove_files(
    root: &Path,
    files: &[&str],
    boundary: &str,
) -> Result<(), DestinationError> {
    let mut dirs: BTreeSet<String> = BTreeSet::new();
    for rel in files {
        let path = safe_join(root, rel)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(&path, e)),
        }
        dirs.insert(parent_dir(rel).to_string());
    }

    // Deepest first so children are pruned before their parents.
    let mut dirs: Vec<String> = dirs.into_iter().collect();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.matches('/').count()));
    for dir in dirs {
        prune_empty(root, &dir, boundary);
    }
    Ok(())
}

fn prune_empty(root: &Path, start: &str, boundary: &str) {
    let mut current = start;
    while !current.is_empty() && current != boundary && is_below(current, boundary) {
        let path = root.join(current);
        // `remove_dir` fails on non-empty directories, which ends the walk.
        if std::fs::remove_dir(&path).is_err() {
            break;
        }
        current = parent_dir(current);
    }
}

fn is_below(dir: &str, boundary: &str) -> bool {
    boundary.is_empty() || dir.starts_with(&format!("{boundary}/"))
}

/// Directory above which nothing is pruned: the parent of the entity's
/// anchor, so a directory entity's own directory goes away with it.
fn boundary_of(entity: &Entity) -> &str {
    parent_dir(entity.anchor())
}

/// Join a workspace-relative path onto `root`, refusing anything that could
/// escape it.
fn safe_join(root: &Path, rel: &str) -> Result<PathBuf, DestinationError> {
    let candidate = Path::new(rel);
    let safe = !rel.is_empty()
        && candidate
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if !safe {
        return Err(DestinationError::UnsafePath(rel.to_string()));
    }
    Ok(root.join(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wsync_core::EntityKind;

    fn raw_app(files: &[(&str, &str)]) -> Entity {
        Entity::new(
            EntityKind::RawApp,
            "f/dash",
            "f/dash.raw_app",
            files
                .iter()
                .map(|(p, c)| EntityFile::owned(format!("f/dash.raw_app/{p}"), *c))
                .collect(),
        )
    }

    fn read(root: &Path, rel: &str) -> String {
        std::fs::read_to_string(root.join(rel)).expect("read file")
    }

    fn staging_leftovers(root: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir).expect("read dir") {
                let path = entry.expect("dir entry").path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.to_string_lossy().ends_with(STAGING_SUFFIX) {
                    found.push(path);
                }
            }
        }
        found
    }

    #[test]
    fn create_writes_every_file_and_no_staging_remains() {
        let tmp = TempDir::new().expect("tempdir");
        let app = raw_app(&[("raw_app.yaml", "summary: x\n"), ("backend/a.ts", "a\n")]);
        write_entity(tmp.path(), &app, None).expect("write entity");
        assert_eq!(read(tmp.path(), "f/dash.raw_app/backend/a.ts"), "a\n");
        assert!(staging_leftovers(tmp.path()).is_empty());
    }

    #[test]
    fn update_removes_stale_owned_files_and_empty_dirs() {
        let tmp = TempDir::new().expect("tempdir");
        let v1 = raw_app(&[("raw_app.yaml", "summary: x\n"), ("backend/old.ts", "old\n")]);
        let v2 = raw_app(&[("raw_app.yaml", "summary: y\n")]);
        write_entity(tmp.path(), &v1, None).expect("write entity");
        write_entity(tmp.path(), &v2, Some(&v1)).expect("write entity");

        assert!(!tmp.path().join("f/dash.raw_app/backend/old.ts").exists());
        assert!(!tmp.path().join("f/dash.raw_app/backend").exists());
        assert_eq!(read(tmp.path(), "f/dash.raw_app/raw_app.yaml"), "summary: y\n");
    }

    #[test]
    fn delete_keeps_bundled_files_and_parent_folder() {
        let tmp = TempDir::new().expect("tempdir");
        let script = Entity::new(
            EntityKind::Script,
            "f/code/main",
            "f/code/main.script.yaml",
            vec![
                EntityFile::owned("f/code/main.script.yaml", "summary: x\n"),
                EntityFile::owned("f/code/main.ts", "import './lib';\n"),
                EntityFile::bundled("f/code/lib.ts", "export {}\n"),
            ],
        );
        write_entity(tmp.path(), &script, None).expect("write entity");
        delete_entity(tmp.path(), &script).expect("delete entity");

        assert!(!tmp.path().join("f/code/main.ts").exists());
        assert!(tmp.path().join("f/code/lib.ts").exists());
    }

    #[test]
    fn delete_of_directory_entity_prunes_its_directory() {
        let tmp = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(tmp.path().join("f")).expect("mkdir");
        std::fs::write(tmp.path().join("f/keep.variable.yaml"), "value: 1\n").expect("write file");
        let app = raw_app(&[("raw_app.yaml", "summary: x\n"), ("a/b/c.ts", "c\n")]);
        write_entity(tmp.path(), &app, None).expect("write entity");
        delete_entity(tmp.path(), &app).expect("delete entity");

        assert!(!tmp.path().join("f/dash.raw_app").exists());
        assert!(tmp.path().join("f/keep.variable.yaml").exists());
    }

    #[test]
    fn unsafe_paths_are_refused_before_any_write() {
        let tmp = TempDir::new().expect("tempdir");
        let files = vec![
            EntityFile::owned("f/ok.txt", "ok"),
            EntityFile::owned("../escape.txt", "x"),
        ];
        let err = write_files(tmp.path(), &files, "deadbeef").unwrap_err();
        assert!(matches!(err, DestinationError::UnsafePath(_)));
        assert!(!tmp.path().join("f/ok.txt").exists());
        assert!(staging_leftovers(tmp.path()).is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn staging_failure_leaves_existing_entity_untouched() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().expect("tempdir");
        let v1 = raw_app(&[("raw_app.yaml", "summary: x\n"), ("locked/a.ts", "v1\n")]);
        write_entity(tmp.path(), &v1, None).expect("write entity");

        let locked = tmp.path().join("f/dash.raw_app/locked");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o555)).expect("chmod");
        // Running as root ignores directory permissions; nothing to assert then.
        let canary = locked.join(".canary");
        if std::fs::write(&canary, "").is_ok() {
            let _ = std::fs::remove_file(&canary);
            std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755))
                .expect("chmod");
            return;
        }

        let v2 = raw_app(&[("raw_app.yaml", "summary: y\n"), ("locked/a.ts", "v2\n")]);
        let result = write_entity(tmp.path(), &v2, Some(&v1));
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).expect("chmod");

        assert!(result.is_err());
        assert_eq!(read(tmp.path(), "f/dash.raw_app/raw_app.yaml"), "summary: x\n");
        assert_eq!(read(tmp.path(), "f/dash.raw_app/locked/a.ts"), "v1\n");
        assert!(staging_leftovers(tmp.path()).is_empty());
    }
}

//! Raw file sources a tree can be read from.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{io_err, TreeError};
use crate::layout::{is_ignored, IGNORED_DIRS};

/// Workspace-relative path → raw content.
pub type FileMap = BTreeMap<String, Vec<u8>>;

/// Something that can list every file of one side of a sync.
pub trait RawSource {
    /// Human-readable name for log lines (`local /path`, `remote ws`).
    fn label(&self) -> String;

    /// Every non-ignored file, keyed by `/`-separated relative path.
    fn files(&self) -> Result<FileMap, TreeError>;
}

// ---------------------------------------------------------------------------
// Local directory
// ---------------------------------------------------------------------------

/// A sync root on disk.
#[derive(Debug, Clone)]
pub struct LocalDir {
    root: PathBuf,
}

impl LocalDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl RawSource for LocalDir {
    fn label(&self) -> String {
        format!("local {}", self.root.display())
    }

    fn files(&self) -> Result<FileMap, TreeError> {
        let mut files = FileMap::new();
        if !self.root.exists() {
            return Ok(files);
        }

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0
                    || !(e.file_type().is_dir()
                        && IGNORED_DIRS.iter().any(|d| e.file_name() == *d))
            });

        for entry in walker {
            let entry = entry.map_err(|source| TreeError::Walk {
                root: self.root.clone(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(rel) = relative_slash_path(&self.root, entry.path()) else {
                continue;
            };
            if is_ignored(&rel) {
                continue;
            }
            let content = std::fs::read(entry.path()).map_err(|e| io_err(entry.path(), e))?;
            files.insert(rel, content);
        }
        Ok(files)
    }
}

fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = rel.components().map(|c| c.as_os_str().to_str()).collect();
    let joined = parts?.join("/");
    (!joined.is_empty()).then_some(joined)
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Files already in memory, e.g. a remote export.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    label: String,
    files: FileMap,
}

impl MemorySource {
    pub fn new(label: impl Into<String>, files: FileMap) -> Self {
        Self {
            label: label.into(),
            files,
        }
    }
}

impl RawSource for MemorySource {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn files(&self) -> Result<FileMap, TreeError> {
        Ok(self
            .files
            .iter()
            .filter(|(path, _)| !is_ignored(path))
            .map(|(path, content)| (path.clone(), content.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_dir_skips_ignored_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        std::fs::create_dir_all(root.join("f/sub")).expect("mkdir");
        std::fs::create_dir_all(root.join(".git")).expect("mkdir");
        std::fs::create_dir_all(root.join("f/node_modules/pkg")).expect("mkdir");
        std::fs::write(root.join("f/sub/a.variable.yaml"), "value: 1\n").expect("write file");
        std::fs::write(root.join(".git/HEAD"), "ref: refs/heads/main\n").expect("write file");
        std::fs::write(root.join("f/node_modules/pkg/index.js"), "").expect("write file");
        std::fs::write(root.join("wsync.yaml"), "").expect("write file");
        std::fs::write(root.join("f/x.ts.abcd1234.wsync.tmp"), "").expect("write file");

        let files = LocalDir::new(root).files().expect("list files");
        let keys: Vec<&str> = files.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["f/sub/a.variable.yaml"]);
    }

    #[test]
    fn missing_root_reads_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let files = LocalDir::new(dir.path().join("absent")).files().expect("list files");
        assert!(files.is_empty());
    }

    #[test]
    fn memory_source_filters_ignored_paths() {
        let mut files = FileMap::new();
        files.insert("f/a.variable.yaml".into(), b"value: 1\n".to_vec());
        files.insert(".wsync/state".into(), b"".to_vec());
        let source = MemorySource::new("remote test", files);
        assert_eq!(source.files().expect("list files").len(), 1);
        assert_eq!(source.label(), "remote test");
    }
}

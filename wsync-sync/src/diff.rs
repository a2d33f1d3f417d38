//! Unified text diffs for `wsync diff`.

use similar::TextDiff;
use wsync_core::{ChangeOp, EntityFile};

use crate::changeset::Changeset;

/// Diff of a single file touched by a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: String,
    pub unified_diff: String,
}

/// All file diffs of one change operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpDiff {
    pub entity: String,
    pub action: String,
    pub files: Vec<FileDiff>,
}

/// Render every operation of `changeset` as unified diffs, `a/` being the
/// destination's current content and `b/` the source's.
pub fn render(changeset: &Changeset) -> Vec<OpDiff> {
    changeset
        .ops()
        .iter()
        .map(|op| OpDiff {
            entity: op.key().to_string(),
            action: op.action.to_string(),
            files: op_files(op),
        })
        .collect()
}

fn op_files(op: &ChangeOp) -> Vec<FileDiff> {
    let old = op.prior.as_ref().map(|e| e.files()).unwrap_or_default();
    let new = op.source.as_ref().map(|e| e.files()).unwrap_or_default();

    let mut paths: Vec<&str> = old
        .iter()
        .chain(new.iter())
        .map(|f| f.relative_path.as_str())
        .collect();
    paths.sort_unstable();
    paths.dedup();

    let mut diffs = Vec::new();
    for path in paths {
        let before = old.iter().find(|f| f.relative_path == path);
        let after = new.iter().find(|f| f.relative_path == path);
        if let (Some(b), Some(a)) = (before, after) {
            if b.content_hash == a.content_hash {
                continue;
            }
        }
        diffs.push(FileDiff {
            path: path.to_string(),
            unified_diff: file_diff(path, before, after),
        });
    }
    diffs
}

fn file_diff(path: &str, before: Option<&EntityFile>, after: Option<&EntityFile>) -> String {
    let old_text = before.map(text_of);
    let new_text = after.map(text_of);
    match (old_text, new_text) {
        (Some(None), _) | (_, Some(None)) => format!("Binary file {path} differs\n"),
        (old, new) => {
            let old = old.flatten().unwrap_or_default();
            let new = new.flatten().unwrap_or_default();
            let old_header = if before.is_some() {
                format!("a/{path}")
            } else {
                "/dev/null".to_string()
            };
            let new_header = if after.is_some() {
                format!("b/{path}")
            } else {
                "/dev/null".to_string()
            };
            TextDiff::from_lines(&old, &new)
                .unified_diff()
                .header(&old_header, &new_header)
                .context_radius(3)
                .to_string()
        }
    }
}

fn text_of(file: &EntityFile) -> Option<String> {
    file.text().map(|t| t.replace("\r\n", "\n"))
}

//! On-disk naming conventions.
//!
//! Maps a workspace-relative file path to the entity it belongs to. Paths are
//! always `/`-separated, whatever the host platform.
//!
//! ```text
//! f/jobs/charge.script.yaml        script manifest      (script  f/jobs/charge)
//! f/jobs/charge.ts                 script content       (resolved by the reader)
//! f/jobs/charge.script.lock        script lock file
//! f/dash.raw_app/raw_app.yaml      raw app manifest     (raw_app f/dash)
//! f/dash.raw_app/backend/a.ts      raw app member
//! f/etl.flow/flow.yaml             flow manifest        (flow    f/etl)
//! f/db.variable.yaml               variable             (variable f/db)
//! f/pg.resource.yaml               resource
//! f/pg.resource-type.yaml          resource type
//! f/reports/folder.meta.yaml       folder               (folder  f/reports)
//! f/nightly.schedule.yaml          schedule
//! f/hook.http_trigger.yaml         trigger              (trigger f/hook)
//! groups/ops.group.yaml            group
//! users/alice.user.yaml            user
//! settings.yaml                    workspace settings   (root only)
//! encryption_key.yaml              encryption key       (root only)
//! ```

use wsync_core::EntityKind;

/// Directory names never walked.
pub const IGNORED_DIRS: &[&str] = &[".git", "node_modules", ".wsync"];

/// Suffix of staging files left behind by an interrupted write.
pub const STAGING_SUFFIX: &str = ".wsync.tmp";

/// Where a file sits in the entity layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// File inside a directory entity.
    Member {
        kind: EntityKind,
        path: String,
        /// Directory anchor, e.g. `f/dash.raw_app`.
        dir: String,
        /// Path inside the directory, e.g. `backend/a.ts`.
        inner: String,
    },
    /// `<path>.script.yaml`.
    ScriptManifest { path: String },
    /// `<path>.script.lock`.
    ScriptLock { path: String },
    /// The single manifest of a flat kind.
    Manifest { kind: EntityKind, path: String },
    /// Anything else: script content, codebase sources, unmanaged files.
    Other,
}

/// Files the reader never looks at.
pub fn is_ignored(rel: &str) -> bool {
    if rel == wsync_core::config::CONFIG_FILE || rel.ends_with(STAGING_SUFFIX) {
        return true;
    }
    rel.split('/').any(|segment| IGNORED_DIRS.contains(&segment))
}

const DIRECTORY_KINDS: &[EntityKind] = &[EntityKind::RawApp, EntityKind::Flow, EntityKind::App];

const FLAT_SUFFIXES: &[(&str, EntityKind)] = &[
    (".variable.yaml", EntityKind::Variable),
    (".resource-type.yaml", EntityKind::ResourceType),
    (".resource.yaml", EntityKind::Resource),
    (".schedule.yaml", EntityKind::Schedule),
    (".group.yaml", EntityKind::Group),
    (".user.yaml", EntityKind::User),
];

/// Classify a workspace-relative path.
pub fn classify(rel: &str) -> Placement {
    if let Some(member) = directory_member(rel) {
        return member;
    }

    match rel {
        "settings.yaml" => {
            return Placement::Manifest {
                kind: EntityKind::Setting,
                path: "settings".to_string(),
            }
        }
        "encryption_key.yaml" => {
            return Placement::Manifest {
                kind: EntityKind::EncryptionKey,
                path: "encryption_key".to_string(),
            }
        }
        _ => {}
    }

    if let Some(dir) = rel.strip_suffix("/folder.meta.yaml") {
        return Placement::Manifest {
            kind: EntityKind::Folder,
            path: dir.to_string(),
        };
    }
    if let Some(path) = non_empty_stem(rel, ".script.yaml") {
        return Placement::ScriptManifest { path };
    }
    if let Some(path) = non_empty_stem(rel, ".script.lock") {
        return Placement::ScriptLock { path };
    }
    for (suffix, kind) in FLAT_SUFFIXES {
        if let Some(path) = non_empty_stem(rel, suffix) {
            return Placement::Manifest { kind: *kind, path };
        }
    }
    if let Some(path) = trigger_path(rel) {
        return Placement::Manifest {
            kind: EntityKind::Trigger,
            path,
        };
    }
    Placement::Other
}

/// `f/a/b.ts` → `f/a/b`. Only the file name's last extension is removed.
pub fn strip_extension(rel: &str) -> Option<(&str, &str)> {
    let name_start = rel.rfind('/').map(|i| i + 1).unwrap_or(0);
    let dot = rel[name_start..].rfind('.')?;
    if dot == 0 {
        return None;
    }
    let split = name_start + dot;
    Some((&rel[..split], &rel[split + 1..]))
}

/// Parent directory of a workspace-relative path (`""` at the root).
pub fn parent_dir(rel: &str) -> &str {
    rel.rfind('/').map(|i| &rel[..i]).unwrap_or("")
}

fn directory_member(rel: &str) -> Option<Placement> {
    let segments: Vec<&str> = rel.split('/').collect();
    // The last segment is the file itself; a directory entity needs content.
    for (idx, segment) in segments.iter().enumerate().take(segments.len().saturating_sub(1)) {
        for kind in DIRECTORY_KINDS {
            let Some(suffix) = kind.directory_suffix() else { continue };
            let Some(name) = segment.strip_suffix(suffix) else { continue };
            if name.is_empty() {
                continue;
            }
            let mut path_segments: Vec<&str> = segments[..idx].to_vec();
            path_segments.push(name);
            return Some(Placement::Member {
                kind: *kind,
                path: path_segments.join("/"),
                dir: segments[..=idx].join("/"),
                inner: segments[idx + 1..].join("/"),
            });
        }
    }
    None
}

fn non_empty_stem(rel: &str, suffix: &str) -> Option<String> {
    let stem = rel.strip_suffix(suffix)?;
    if stem.is_empty() || stem.ends_with('/') {
        return None;
    }
    Some(stem.to_string())
}

fn trigger_path(rel: &str) -> Option<String> {
    let stem = rel.strip_suffix("_trigger.yaml")?;
    let (path, trigger_type) = stem.rsplit_once('.')?;
    if path.is_empty() || path.ends_with('/') || trigger_type.is_empty() || trigger_type.contains('/')
    {
        return None;
    }
    Some(path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("f/db.variable.yaml", EntityKind::Variable, "f/db")]
    #[case("f/pg.resource.yaml", EntityKind::Resource, "f/pg")]
    #[case("f/pg.resource-type.yaml", EntityKind::ResourceType, "f/pg")]
    #[case("f/nightly.schedule.yaml", EntityKind::Schedule, "f/nightly")]
    #[case("f/hook.http_trigger.yaml", EntityKind::Trigger, "f/hook")]
    #[case("f/q.kafka_trigger.yaml", EntityKind::Trigger, "f/q")]
    #[case("groups/ops.group.yaml", EntityKind::Group, "groups/ops")]
    #[case("users/alice.user.yaml", EntityKind::User, "users/alice")]
    #[case("f/reports/folder.meta.yaml", EntityKind::Folder, "f/reports")]
    #[case("settings.yaml", EntityKind::Setting, "settings")]
    #[case("encryption_key.yaml", EntityKind::EncryptionKey, "encryption_key")]
    fn flat_manifests(#[case] rel: &str, #[case] kind: EntityKind, #[case] path: &str) {
        assert_eq!(
            classify(rel),
            Placement::Manifest {
                kind,
                path: path.to_string()
            }
        );
    }

    #[test]
    fn settings_only_at_root() {
        assert_eq!(classify("f/settings.yaml"), Placement::Other);
    }

    #[test]
    fn raw_app_members_keep_nested_paths() {
        assert_eq!(
            classify("f/dash.raw_app/backend/a.ts"),
            Placement::Member {
                kind: EntityKind::RawApp,
                path: "f/dash".to_string(),
                dir: "f/dash.raw_app".to_string(),
                inner: "backend/a.ts".to_string(),
            }
        );
    }

    #[test]
    fn yaml_inside_directory_entity_is_a_member() {
        assert!(matches!(
            classify("f/etl.flow/extract.variable.yaml"),
            Placement::Member { kind: EntityKind::Flow, .. }
        ));
    }

    #[test]
    fn bare_directory_suffix_is_not_an_entity() {
        assert_eq!(classify("f/.flow/flow.yaml"), Placement::Other);
    }

    #[test]
    fn script_manifest_and_lock() {
        assert_eq!(
            classify("f/a/charge.script.yaml"),
            Placement::ScriptManifest {
                path: "f/a/charge".to_string()
            }
        );
        assert_eq!(
            classify("f/a/charge.script.lock"),
            Placement::ScriptLock {
                path: "f/a/charge".to_string()
            }
        );
        assert_eq!(classify("f/a/charge.ts"), Placement::Other);
    }

    #[test]
    fn strip_extension_only_touches_file_name() {
        assert_eq!(strip_extension("f/a.b/c.ts"), Some(("f/a.b/c", "ts")));
        assert_eq!(strip_extension("f/a.b/c"), None);
        assert_eq!(strip_extension("f/.env"), None);
    }

    #[rstest]
    #[case("wsync.yaml", true)]
    #[case(".git/HEAD", true)]
    #[case("f/node_modules/x/index.js", true)]
    #[case("f/a.ts.0badc0de.wsync.tmp", true)]
    #[case("f/a.ts", false)]
    fn ignored_paths(#[case] rel: &str, #[case] ignored: bool) {
        assert_eq!(is_ignored(rel), ignored);
    }
}

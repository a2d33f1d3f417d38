//! Reading whole trees: grouping, codebase bundling and malformed isolation.

use std::path::Path;

use wsync_core::{CodebaseConfig, EntityKey, EntityKind, FileRole};
use wsync_tree::{FileMap, LocalDir, MemorySource, TreeReader};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn files(entries: &[(&str, &str)]) -> FileMap {
    entries
        .iter()
        .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
        .collect()
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().expect("parent dir")).expect("mkdir");
    std::fs::write(path, content).expect("write file");
}

fn key(kind: EntityKind, path: &str) -> EntityKey {
    EntityKey::new(kind, path)
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

#[test]
fn raw_app_files_form_one_entity() {
    let input = files(&[
        ("f/dash.raw_app/raw_app.yaml", "summary: Dashboard\n"),
        ("f/dash.raw_app/index.tsx", "export default 1;\n"),
        ("f/dash.raw_app/styles/app.css", "body {}\n"),
        ("f/dash.raw_app/backend/load.ts", "export async function main() {}\n"),
        ("f/dash.raw_app/backend/load.yaml", "type: inline\n"),
    ]);
    let out = TreeReader::default().read_files(&input).expect("read tree");
    assert!(out.malformed.is_empty());
    assert_eq!(out.tree.len(), 1);

    let app = out.tree.get(&key(EntityKind::RawApp, "f/dash")).expect("entity present");
    assert_eq!(app.anchor(), "f/dash.raw_app");
    assert_eq!(app.files().len(), 5);
    assert!(app.files().iter().all(|f| f.role == FileRole::Owned));
}

#[test]
fn script_collects_manifest_content_and_lock() {
    let input = files(&[
        ("f/jobs/charge.script.yaml", "summary: charge\n"),
        ("f/jobs/charge.ts", "export async function main() {}\n"),
        ("f/jobs/charge.script.lock", "{}\n"),
        ("f/jobs/README.md", "notes\n"),
    ]);
    let out = TreeReader::default().read_files(&input).expect("read tree");
    let script = out.tree.get(&key(EntityKind::Script, "f/jobs/charge")).expect("entity present");
    let paths: Vec<&str> = script.files().iter().map(|f| f.relative_path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "f/jobs/charge.script.lock",
            "f/jobs/charge.script.yaml",
            "f/jobs/charge.ts"
        ]
    );
    assert_eq!(out.tree.len(), 1, "README is unmanaged");
}

#[test]
fn every_flat_kind_is_recognised() {
    let input = files(&[
        ("f/db.variable.yaml", "value: x\nis_secret: true\n"),
        ("f/pg.resource.yaml", "value: {}\nresource_type: postgresql\n"),
        ("f/pg.resource-type.yaml", "schema: {}\n"),
        ("f/reports/folder.meta.yaml", "owners: []\n"),
        ("f/nightly.schedule.yaml", "schedule: '0 0 * * *'\nscript_path: f/jobs/charge\n"),
        ("f/hook.http_trigger.yaml", "script_path: f/jobs/charge\n"),
        ("groups/ops.group.yaml", "members: []\n"),
        ("users/alice.user.yaml", "email: alice@example.com\n"),
        ("settings.yaml", "webhook: null\n"),
        ("encryption_key.yaml", "key: abc\n"),
    ]);
    let out = TreeReader::default().read_files(&input).expect("read tree");
    assert!(out.malformed.is_empty(), "{:?}", out.malformed);
    let kinds: Vec<EntityKind> = out.tree.entities().map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            EntityKind::Variable,
            EntityKind::Resource,
            EntityKind::ResourceType,
            EntityKind::Folder,
            EntityKind::Schedule,
            EntityKind::Trigger,
            EntityKind::Group,
            EntityKind::User,
            EntityKind::Setting,
            EntityKind::EncryptionKey,
        ]
    );
    assert!(out.tree.get(&key(EntityKind::Variable, "f/db")).expect("entity present").is_secret());
}

// ---------------------------------------------------------------------------
// Malformed entities
// ---------------------------------------------------------------------------

#[test]
fn malformed_entities_do_not_abort_the_read() {
    let input = files(&[
        ("f/ok.variable.yaml", "value: 1\n"),
        ("f/broken.variable.yaml", "value: [unclosed\n"),
        ("f/nofields.resource.yaml", "value: {}\n"),
        ("f/orphan.flow/inline.ts", "export {}\n"),
        ("f/empty.script.yaml", "summary: x\n"),
        ("f/twice.script.yaml", "summary: x\n"),
        ("f/twice.ts", ""),
        ("f/twice.py", ""),
    ]);
    let out = TreeReader::default().read_files(&input).expect("read tree");
    assert_eq!(out.tree.len(), 1);
    assert!(out.tree.contains(&key(EntityKind::Variable, "f/ok")));

    let bad: Vec<String> = out.malformed.iter().map(|m| m.key.to_string()).collect();
    assert_eq!(
        bad,
        vec![
            "script:f/empty",
            "script:f/twice",
            "flow:f/orphan",
            "variable:f/broken",
            "resource:f/nofields",
        ]
    );
    for m in &out.malformed {
        assert!(out.tree.is_quarantined(&m.key));
    }
}

#[test]
fn duplicate_trigger_paths_are_quarantined() {
    let input = files(&[
        ("f/hook.http_trigger.yaml", "script_path: f/a\n"),
        ("f/hook.kafka_trigger.yaml", "script_path: f/a\n"),
    ]);
    let out = TreeReader::default().read_files(&input).expect("read tree");
    assert!(out.tree.is_empty());
    assert_eq!(out.malformed.len(), 1);
    assert!(out.malformed[0].reason.contains("more than once"));
}

// ---------------------------------------------------------------------------
// Codebases
// ---------------------------------------------------------------------------

fn codebase() -> CodebaseConfig {
    CodebaseConfig {
        relative_path: "f/code".to_string(),
        includes: vec!["**/*.ts".to_string()],
        excludes: vec!["**/*.test.ts".to_string()],
    }
}

#[test]
fn codebase_scripts_bundle_reachable_imports() {
    let input = files(&[
        ("f/code/main.script.yaml", "summary: main\n"),
        ("f/code/main.ts", "import { helper } from './lib/helper';\nimport _ from 'lodash';\n"),
        ("f/code/lib/helper.ts", "import { util } from '../util.js';\n"),
        ("f/code/util.ts", "export const util = 1;\n"),
        ("f/code/lib/helper.test.ts", "import './helper';\n"),
        ("f/code/unrelated.ts", "export {}\n"),
    ]);
    let reader = TreeReader::new(&[codebase()]).expect("reader");
    let out = reader.read_files(&input).expect("read tree");
    let script = out.tree.get(&key(EntityKind::Script, "f/code/main")).expect("entity present");

    let bundled: Vec<&str> = script
        .files()
        .iter()
        .filter(|f| f.role == FileRole::Bundled)
        .map(|f| f.relative_path.as_str())
        .collect();
    assert_eq!(bundled, vec!["f/code/lib/helper.ts", "f/code/util.ts"]);
}

#[test]
fn bundled_dependency_change_changes_fingerprint() {
    let mut input = files(&[
        ("f/code/main.script.yaml", "summary: main\n"),
        ("f/code/main.ts", "import './dep';\n"),
        ("f/code/dep.ts", "export const v = 1;\n"),
    ]);
    let reader = TreeReader::new(&[codebase()]).expect("reader");
    let before = reader.read_files(&input).expect("read tree");
    input.insert("f/code/dep.ts".into(), b"export const v = 2;\n".to_vec());
    let after = reader.read_files(&input).expect("read tree");

    let k = key(EntityKind::Script, "f/code/main");
    assert_ne!(
        before.tree.get(&k).expect("entity present").fingerprint(),
        after.tree.get(&k).expect("entity present").fingerprint()
    );
}

#[test]
fn scripts_outside_codebases_are_not_bundled() {
    let input = files(&[
        ("f/plain.script.yaml", "summary: x\n"),
        ("f/plain.ts", "import './dep';\n"),
        ("f/dep.ts", "export {}\n"),
    ]);
    let reader = TreeReader::new(&[codebase()]).expect("reader");
    let out = reader.read_files(&input).expect("read tree");
    let script = out.tree.get(&key(EntityKind::Script, "f/plain")).expect("entity present");
    assert_eq!(script.files().len(), 2);
}

#[test]
fn invalid_codebase_glob_fails_up_front() {
    let cb = CodebaseConfig {
        relative_path: "f".into(),
        includes: vec!["[".into()],
        excludes: Vec::new(),
    };
    assert!(TreeReader::new(&[cb]).is_err());
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[test]
fn local_and_memory_sources_agree() {
    let dir = tempfile::tempdir().expect("tempdir");
    let entries = [
        ("f/dash.raw_app/raw_app.yaml", "summary: x\n"),
        ("f/dash.raw_app/index.tsx", "export {}\n"),
        ("f/db.variable.yaml", "value: 1\n"),
    ];
    for (rel, content) in entries {
        write(dir.path(), rel, content);
    }
    let reader = TreeReader::default();
    let local = reader.read(&LocalDir::new(dir.path())).expect("read tree");
    let memory = reader
        .read(&MemorySource::new("remote", files(&entries)))
        .expect("read tree");
    assert_eq!(local.tree, memory.tree);
}

#[test]
fn crlf_checkout_reads_as_the_same_entity() {
    let lf = files(&[("f/db.variable.yaml", "value: 1\nsummary: x\n")]);
    let crlf = files(&[("f/db.variable.yaml", "value: 1\r\nsummary: x\r\n")]);
    let reader = TreeReader::default();
    let a = reader.read_files(&lf).expect("read tree").tree;
    let b = reader.read_files(&crlf).expect("read tree").tree;
    let k = key(EntityKind::Variable, "f/db");
    assert!(a.get(&k).expect("entity present").same_as(b.get(&k).expect("entity present")));
}

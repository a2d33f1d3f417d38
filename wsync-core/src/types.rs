//! Domain types for workspace reconciliation.
//!
//! Entities and trees are immutable snapshots: changing content means building
//! a new [`Entity`] (and with it a new [`Fingerprint`]), never editing one in
//! place.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Logical, slash-separated path of an entity (`f/billing/charge`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityPath(pub String);

impl EntityPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for EntityPath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityPath {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Order-sensitive SHA-256 over an entity's file set, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// First eight hex characters, for staging file names and log lines.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(8);
        &self.0[..end]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The kind of a syncable entity.
///
/// Declaration order is the changeset priority order: ordinary resources
/// first, the special kinds (`group`, `user`, `setting`, `encryption_key`)
/// last.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Script,
    Flow,
    App,
    RawApp,
    Variable,
    Resource,
    ResourceType,
    Folder,
    Schedule,
    Trigger,
    Group,
    User,
    Setting,
    EncryptionKey,
}

impl EntityKind {
    /// All kinds, in priority order.
    pub fn all() -> &'static [EntityKind] {
        &[
            EntityKind::Script,
            EntityKind::Flow,
            EntityKind::App,
            EntityKind::RawApp,
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
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Script => "script",
            EntityKind::Flow => "flow",
            EntityKind::App => "app",
            EntityKind::RawApp => "raw_app",
            EntityKind::Variable => "variable",
            EntityKind::Resource => "resource",
            EntityKind::ResourceType => "resource_type",
            EntityKind::Folder => "folder",
            EntityKind::Schedule => "schedule",
            EntityKind::Trigger => "trigger",
            EntityKind::Group => "group",
            EntityKind::User => "user",
            EntityKind::Setting => "setting",
            EntityKind::EncryptionKey => "encryption_key",
        }
    }

    /// Kinds that can be force-included past path globs.
    pub fn is_special(&self) -> bool {
        matches!(
            self,
            EntityKind::Group | EntityKind::User | EntityKind::Setting | EntityKind::EncryptionKey
        )
    }

    /// Directory suffix for kinds stored as one directory per entity.
    pub fn directory_suffix(&self) -> Option<&'static str> {
        match self {
            EntityKind::Flow => Some(".flow"),
            EntityKind::App => Some(".app"),
            EntityKind::RawApp => Some(".raw_app"),
            _ => None,
        }
    }

    /// Manifest file name inside a directory entity.
    pub fn manifest_name(&self) -> Option<&'static str> {
        match self {
            EntityKind::Flow => Some("flow.yaml"),
            EntityKind::App => Some("app.yaml"),
            EntityKind::RawApp => Some("raw_app.yaml"),
            _ => None,
        }
    }

    /// Manifest keys that must be present for the entity to be well formed.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::Flow | EntityKind::App | EntityKind::Variable => &["value"],
            EntityKind::RawApp => &["summary"],
            EntityKind::Resource => &["value", "resource_type"],
            EntityKind::ResourceType => &["schema"],
            EntityKind::Schedule => &["schedule", "script_path"],
            EntityKind::Trigger => &["script_path"],
            EntityKind::User => &["email"],
            EntityKind::EncryptionKey => &["key"],
            EntityKind::Script | EntityKind::Folder | EntityKind::Group | EntityKind::Setting => {
                &[]
            }
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a file relates to the entity that carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileRole {
    /// Belongs to exactly this entity; removed when the entity is deleted.
    Owned,
    /// Codebase dependency reachable from a script. Shipped with the entity
    /// but possibly shared with siblings, so never deleted on its behalf.
    Bundled,
}

/// The three changeset actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeAction::Create => write!(f, "create"),
            ChangeAction::Update => write!(f, "update"),
            ChangeAction::Delete => write!(f, "delete"),
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// SHA-256 of file content, hex encoded.
///
/// UTF-8 content is hashed with CRLF normalised to LF so that line-ending
/// churn alone never produces an update.
pub fn content_hash(content: &[u8]) -> String {
    let mut h = Sha256::new();
    match std::str::from_utf8(content) {
        Ok(text) if text.contains("\r\n") => h.update(text.replace("\r\n", "\n").as_bytes()),
        _ => h.update(content),
    }
    hex::encode(h.finalize())
}

/// One file of an entity. `relative_path` is relative to the workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityFile {
    pub relative_path: String,
    pub content: Vec<u8>,
    pub content_hash: String,
    pub role: FileRole,
}

impl EntityFile {
    pub fn new(relative_path: impl Into<String>, content: Vec<u8>, role: FileRole) -> Self {
        let content_hash = content_hash(&content);
        Self {
            relative_path: relative_path.into(),
            content,
            content_hash,
            role,
        }
    }

    pub fn owned(relative_path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self::new(relative_path, content.into(), FileRole::Owned)
    }

    pub fn bundled(relative_path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self::new(relative_path, content.into(), FileRole::Bundled)
    }

    /// Content as UTF-8, if it is text.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

/// Identity of an entity within a tree. Orders by kind priority, then path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub path: EntityPath,
}

impl EntityKey {
    pub fn new(kind: EntityKind, path: impl Into<EntityPath>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.path)
    }
}

/// The unit of sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    kind: EntityKind,
    path: EntityPath,
    anchor: String,
    files: Vec<EntityFile>,
    fingerprint: Fingerprint,
    secret: bool,
}

impl Entity {
    /// Build an entity. Files are ordered by relative path (a later duplicate
    /// replaces an earlier one) and the fingerprint is computed over that order.
    ///
    /// `anchor` is the on-disk path that identifies the entity: its manifest
    /// file, or its directory for directory kinds.
    pub fn new(
        kind: EntityKind,
        path: impl Into<EntityPath>,
        anchor: impl Into<String>,
        files: Vec<EntityFile>,
    ) -> Self {
        let mut by_path: BTreeMap<String, EntityFile> = BTreeMap::new();
        for file in files {
            by_path.insert(file.relative_path.clone(), file);
        }
        let files: Vec<EntityFile> = by_path.into_values().collect();
        let fingerprint = fingerprint_of(&files);
        Self {
            kind,
            path: path.into(),
            anchor: anchor.into(),
            files,
            fingerprint,
            secret: false,
        }
    }

    /// Mark the entity as carrying a secret value.
    pub fn with_secret(mut self, secret: bool) -> Self {
        self.secret = secret;
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn path(&self) -> &EntityPath {
        &self.path
    }

    pub fn anchor(&self) -> &str {
        &self.anchor
    }

    pub fn files(&self) -> &[EntityFile] {
        &self.files
    }

    pub fn owned_files(&self) -> impl Iterator<Item = &EntityFile> {
        self.files.iter().filter(|f| f.role == FileRole::Owned)
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn is_secret(&self) -> bool {
        self.secret
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.path.clone())
    }

    /// Kind, path and fingerprint all match.
    pub fn same_as(&self, other: &Entity) -> bool {
        self.kind == other.kind && self.path == other.path && self.fingerprint == other.fingerprint
    }
}

fn fingerprint_of(files: &[EntityFile]) -> Fingerprint {
    let mut h = Sha256::new();
    for file in files {
        h.update(file.relative_path.as_bytes());
        h.update([0u8]);
        h.update(file.content_hash.as_bytes());
        h.update([b'\n']);
    }
    Fingerprint(hex::encode(h.finalize()))
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// One side (local or remote) of a reconciliation at a point in time.
///
/// `quarantined` holds the keys of entities that exist on this side but could
/// not be read; the changeset engine leaves those keys alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entities: BTreeMap<EntityKey, Entity>,
    quarantined: BTreeSet<EntityKey>,
}

impl Tree {
    /// Build a complete tree. Duplicate keys are rejected.
    pub fn from_entities(
        entities: impl IntoIterator<Item = Entity>,
        quarantined: impl IntoIterator<Item = EntityKey>,
    ) -> Result<Self, CoreError> {
        let mut map = BTreeMap::new();
        for entity in entities {
            let key = entity.key();
            if map.contains_key(&key) {
                return Err(CoreError::DuplicateEntity {
                    key: key.to_string(),
                });
            }
            map.insert(key, entity);
        }
        Ok(Self {
            entities: map,
            quarantined: quarantined.into_iter().collect(),
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &EntityKey) -> Option<&Entity> {
        self.entities.get(key)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    pub fn is_quarantined(&self, key: &EntityKey) -> bool {
        self.quarantined.contains(key)
    }

    pub fn quarantined(&self) -> impl Iterator<Item = &EntityKey> {
        self.quarantined.iter()
    }

    /// Entities in priority order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.entities.keys()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Change operations
// ---------------------------------------------------------------------------

/// One typed operation of a changeset.
///
/// `source` carries the complete new file set (create/update); `prior` is the
/// destination's current version (update/delete).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeOp {
    pub kind: EntityKind,
    pub path: EntityPath,
    pub action: ChangeAction,
    pub source: Option<Entity>,
    pub prior: Option<Entity>,
}

impl ChangeOp {
    pub fn create(source: Entity) -> Self {
        Self {
            kind: source.kind(),
            path: source.path().clone(),
            action: ChangeAction::Create,
            source: Some(source),
            prior: None,
        }
    }

    pub fn update(source: Entity, prior: Entity) -> Self {
        Self {
            kind: source.kind(),
            path: source.path().clone(),
            action: ChangeAction::Update,
            source: Some(source),
            prior: Some(prior),
        }
    }

    pub fn delete(prior: Entity) -> Self {
        Self {
            kind: prior.kind(),
            path: prior.path().clone(),
            action: ChangeAction::Delete,
            source: None,
            prior: Some(prior),
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.path.clone())
    }

    pub fn source_files(&self) -> Option<&[EntityFile]> {
        self.source.as_ref().map(Entity::files)
    }

    pub fn prior_fingerprint(&self) -> Option<&Fingerprint> {
        self.prior.as_ref().map(Entity::fingerprint)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(path: &str, value: &str) -> Entity {
        Entity::new(
            EntityKind::Variable,
            path,
            format!("{path}.variable.yaml"),
            vec![EntityFile::owned(
                format!("{path}.variable.yaml"),
                format!("value: {value}\n"),
            )],
        )
    }

    #[test]
    fn kind_order_puts_special_kinds_last() {
        let all = EntityKind::all();
        let first_special = all.iter().position(|k| k.is_special()).expect("special kind");
        assert!(all[first_special..].iter().all(|k| k.is_special()));
        assert!(EntityKind::Script < EntityKind::RawApp);
        assert!(EntityKind::Resource < EntityKind::Group);
        assert!(EntityKind::Setting < EntityKind::EncryptionKey);
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = yaml_name(EntityKind::RawApp);
        assert_eq!(json, "raw_app");
        assert_eq!(EntityKind::EncryptionKey.to_string(), "encryption_key");
    }

    fn yaml_name(kind: EntityKind) -> String {
        serde_yaml::to_string(&kind).expect("serialize kind").trim().to_string()
    }

    #[test]
    fn fingerprint_ignores_input_order() {
        let a = Entity::new(
            EntityKind::RawApp,
            "f/dash",
            "f/dash.raw_app",
            vec![
                EntityFile::owned("f/dash.raw_app/raw_app.yaml", "summary: x\n"),
                EntityFile::owned("f/dash.raw_app/index.tsx", "export {}\n"),
            ],
        );
        let b = Entity::new(
            EntityKind::RawApp,
            "f/dash",
            "f/dash.raw_app",
            vec![
                EntityFile::owned("f/dash.raw_app/index.tsx", "export {}\n"),
                EntityFile::owned("f/dash.raw_app/raw_app.yaml", "summary: x\n"),
            ],
        );
        assert!(a.same_as(&b));
        assert_eq!(a.files()[0].relative_path, "f/dash.raw_app/index.tsx");
    }

    #[test]
    fn fingerprint_changes_when_a_file_is_renamed() {
        let a = Entity::new(
            EntityKind::RawApp,
            "f/dash",
            "f/dash.raw_app",
            vec![EntityFile::owned("f/dash.raw_app/a.ts", "x")],
        );
        let b = Entity::new(
            EntityKind::RawApp,
            "f/dash",
            "f/dash.raw_app",
            vec![EntityFile::owned("f/dash.raw_app/b.ts", "x")],
        );
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn crlf_and_lf_content_share_the_same_hash() {
        assert_eq!(content_hash(b"a\r\nb\r\n"), content_hash(b"a\nb\n"));
        assert_ne!(content_hash(b"a\nb\n"), content_hash(b"a\nc\n"));
    }

    #[test]
    fn tree_rejects_duplicate_keys() {
        let err = Tree::from_entities(
            vec![variable("f/x", "1"), variable("f/x", "2")],
            Vec::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("variable:f/x"));
    }

    #[test]
    fn tree_iterates_in_priority_order() {
        let user = Entity::new(
            EntityKind::User,
            "users/alice",
            "users/alice.user.yaml",
            vec![EntityFile::owned("users/alice.user.yaml", "email: a@b.c\n")],
        );
        let tree = Tree::from_entities(vec![user, variable("f/b", "1"), variable("f/a", "1")], [])
            .expect("tree");
        let keys: Vec<String> = tree.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["variable:f/a", "variable:f/b", "user:users/alice"]);
    }

    #[test]
    fn change_op_exposes_files_and_prior_fingerprint() {
        let old = variable("f/x", "1");
        let new = variable("f/x", "2");
        let op = ChangeOp::update(new.clone(), old.clone());
        assert_eq!(op.action, ChangeAction::Update);
        assert_eq!(op.source_files().expect("source files").len(), 1);
        assert_eq!(op.prior_fingerprint(), Some(old.fingerprint()));
        assert_eq!(op.key(), new.key());
    }

    #[test]
    fn fingerprint_short_is_eight_chars() {
        let e = variable("f/x", "1");
        assert_eq!(e.fingerprint().short().len(), 8);
    }
}

//! Groups raw files into entities and builds a [`Tree`].
//!
//! Reading never aborts on a single bad entity: it is recorded as a
//! [`MalformedEntity`], its key is quarantined in the tree, and every other
//! entity is read normally. Only failures of the source itself are errors.

use std::collections::{BTreeMap, BTreeSet};

use globset::GlobSet;
use serde_yaml::Value;
use tracing::{debug, warn};
use wsync_core::filter::compile_globs;
use wsync_core::{CodebaseConfig, Entity, EntityFile, EntityKey, EntityKind, FileRole, Tree};

use crate::error::TreeError;
use crate::imports::{is_source_file, reachable};
use crate::layout::{classify, strip_extension, Placement};
use crate::source::{FileMap, RawSource};

/// An entity found on one side that could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedEntity {
    pub key: EntityKey,
    pub anchor: String,
    pub reason: String,
}

/// Result of reading one side.
#[derive(Debug, Clone, Default)]
pub struct ReadOutcome {
    pub tree: Tree,
    pub malformed: Vec<MalformedEntity>,
}

// ---------------------------------------------------------------------------
// Codebases
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Codebase {
    /// Normalised root, `""` for the workspace root.
    root: String,
    includes: GlobSet,
    excludes: GlobSet,
}

impl Codebase {
    fn compile(config: &CodebaseConfig) -> Result<Self, TreeError> {
        let root = config
            .relative_path
            .trim_start_matches("./")
            .trim_end_matches('/')
            .to_string();
        let root = if root == "." { String::new() } else { root };
        let includes = if config.includes.is_empty() {
            vec!["**".to_string()]
        } else {
            config.includes.clone()
        };
        Ok(Self {
            root,
            includes: compile_globs(&includes)?,
            excludes: compile_globs(&config.excludes)?,
        })
    }

    /// Path relative to the codebase root, if `rel` is inside it.
    fn inner<'a>(&self, rel: &'a str) -> Option<&'a str> {
        if self.root.is_empty() {
            return Some(rel);
        }
        rel.strip_prefix(self.root.as_str())?.strip_prefix('/')
    }

    fn contains(&self, rel: &str) -> bool {
        match self.inner(rel) {
            Some(inner) => self.includes.is_match(inner) && !self.excludes.is_match(inner),
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Turns a [`RawSource`] into a [`Tree`].
#[derive(Debug, Clone, Default)]
pub struct TreeReader {
    codebases: Vec<Codebase>,
}

#[derive(Debug, Default)]
struct ScriptParts {
    manifest: Option<String>,
    lock: Option<String>,
    content: Vec<String>,
}

#[derive(Debug)]
struct DirParts {
    dir: String,
    files: Vec<String>,
}

impl TreeReader {
    /// Reader with the given codebase definitions. Invalid codebase globs
    /// fail here, before any file is read.
    pub fn new(codebases: &[CodebaseConfig]) -> Result<Self, TreeError> {
        let codebases = codebases
            .iter()
            .map(Codebase::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { codebases })
    }

    pub fn read(&self, source: &dyn RawSource) -> Result<ReadOutcome, TreeError> {
        let files = source.files()?;
        let outcome = self.read_files(&files)?;
        debug!(
            source = %source.label(),
            files = files.len(),
            entities = outcome.tree.len(),
            malformed = outcome.malformed.len(),
            "tree read"
        );
        Ok(outcome)
    }

    /// Group an in-memory file map into entities.
    pub fn read_files(&self, files: &FileMap) -> Result<ReadOutcome, TreeError> {
        let mut scripts: BTreeMap<String, ScriptParts> = BTreeMap::new();
        let mut dirs: BTreeMap<EntityKey, DirParts> = BTreeMap::new();
        let mut flat: Vec<(EntityKind, String, String)> = Vec::new();
        let mut others: Vec<&str> = Vec::new();

        for rel in files.keys() {
            match classify(rel) {
                Placement::Member { kind, path, dir, .. } => {
                    dirs.entry(EntityKey::new(kind, path))
                        .or_insert_with(|| DirParts {
                            dir,
                            files: Vec::new(),
                        })
                        .files
                        .push(rel.clone());
                }
                Placement::ScriptManifest { path } => {
                    scripts.entry(path).or_default().manifest = Some(rel.clone());
                }
                Placement::ScriptLock { path } => {
                    scripts.entry(path).or_default().lock = Some(rel.clone());
                }
                Placement::Manifest { kind, path } => flat.push((kind, path, rel.clone())),
                Placement::Other => others.push(rel),
            }
        }

        let mut unmanaged = 0usize;
        for rel in others {
            match strip_extension(rel).and_then(|(stem, _)| scripts.get_mut(stem)) {
                Some(parts) => parts.content.push(rel.to_string()),
                None => {
                    unmanaged += 1;
                    debug!(path = rel, "unmanaged file");
                }
            }
        }

        let mut candidates: Vec<Result<Entity, MalformedEntity>> = Vec::new();
        for (path, parts) in scripts {
            candidates.push(self.script(files, &path, parts));
        }
        for (key, parts) in dirs {
            candidates.push(directory_entity(files, key, parts));
        }
        for (kind, path, rel) in flat {
            candidates.push(flat_entity(files, kind, path, rel));
        }

        let mut by_key: BTreeMap<EntityKey, Vec<Result<Entity, MalformedEntity>>> =
            BTreeMap::new();
        for candidate in candidates {
            let key = match &candidate {
                Ok(entity) => entity.key(),
                Err(malformed) => malformed.key.clone(),
            };
            by_key.entry(key).or_default().push(candidate);
        }

        let mut entities = Vec::new();
        let mut malformed = Vec::new();
        for (key, mut group) in by_key {
            if group.len() > 1 {
                let anchors: Vec<String> = group
                    .iter()
                    .map(|c| match c {
                        Ok(entity) => entity.anchor().to_string(),
                        Err(m) => m.anchor.clone(),
                    })
                    .collect();
                malformed.push(MalformedEntity {
                    key,
                    anchor: anchors[0].clone(),
                    reason: format!("defined more than once: {}", anchors.join(", ")),
                });
                continue;
            }
            match group.pop() {
                Some(Ok(entity)) => entities.push(entity),
                Some(Err(m)) => malformed.push(m),
                None => {}
            }
        }

        for m in &malformed {
            warn!(entity = %m.key, anchor = %m.anchor, reason = %m.reason, "malformed entity");
        }
        if unmanaged > 0 {
            debug!(count = unmanaged, "ignored unmanaged files");
        }

        let quarantined: BTreeSet<EntityKey> = malformed.iter().map(|m| m.key.clone()).collect();
        let tree = Tree::from_entities(entities, quarantined)?;
        Ok(ReadOutcome { tree, malformed })
    }

    fn script(
        &self,
        files: &FileMap,
        path: &str,
        parts: ScriptParts,
    ) -> Result<Entity, MalformedEntity> {
        let key = EntityKey::new(EntityKind::Script, path);
        let anchor = parts
            .manifest
            .clone()
            .unwrap_or_else(|| format!("{path}.script.yaml"));
        let fail = |reason: String| MalformedEntity {
            key: key.clone(),
            anchor: anchor.clone(),
            reason,
        };

        let Some(manifest) = parts.manifest else {
            return Err(fail("script manifest missing".to_string()));
        };
        parse_manifest(EntityKind::Script, &files[&manifest]).map_err(fail)?;

        let content = match parts.content.as_slice() {
            [] => return Err(fail("no content file".to_string())),
            [single] => single.clone(),
            many => return Err(fail(format!("multiple content files: {}", many.join(", ")))),
        };

        let mut owned = vec![manifest, content.clone()];
        owned.extend(parts.lock);
        let mut entity_files: Vec<EntityFile> = owned
            .iter()
            .map(|rel| EntityFile::new(rel.clone(), files[rel].clone(), FileRole::Owned))
            .collect();

        for dep in self.bundled_deps(files, &content) {
            if !owned.contains(&dep) {
                entity_files.push(EntityFile::new(dep.clone(), files[&dep].clone(), FileRole::Bundled));
            }
        }

        Ok(Entity::new(EntityKind::Script, path, anchor, entity_files))
    }

    /// Codebase files statically reachable from a script's content file.
    fn bundled_deps(&self, files: &FileMap, content: &str) -> BTreeSet<String> {
        let Some(codebase) = self.codebases.iter().find(|c| c.inner(content).is_some()) else {
            return BTreeSet::new();
        };
        if !is_source_file(content) {
            return BTreeSet::new();
        }
        let read = |p: &str| {
            files
                .get(p)
                .and_then(|bytes| std::str::from_utf8(bytes).ok())
                .map(str::to_string)
        };
        let exists = |p: &str| files.contains_key(p);
        let in_scope = |p: &str| codebase.contains(p);
        let deps = reachable(content, &read, &exists, &in_scope);
        if !deps.is_empty() {
            debug!(script = content, deps = deps.len(), "bundled codebase dependencies");
        }
        deps
    }
}

fn directory_entity(
    files: &FileMap,
    key: EntityKey,
    parts: DirParts,
) -> Result<Entity, MalformedEntity> {
    let kind = key.kind;
    let manifest_name = kind.manifest_name().unwrap_or_default();
    let manifest = format!("{}/{}", parts.dir, manifest_name);
    let fail = |reason: String| MalformedEntity {
        key: key.clone(),
        anchor: parts.dir.clone(),
        reason,
    };

    let Some(content) = files.get(&manifest) else {
        return Err(fail(format!("missing manifest {manifest_name}")));
    };
    parse_manifest(kind, content).map_err(fail)?;

    let entity_files = parts
        .files
        .iter()
        .map(|rel| EntityFile::new(rel.clone(), files[rel].clone(), FileRole::Owned))
        .collect();
    Ok(Entity::new(kind, key.path.clone(), parts.dir.clone(), entity_files))
}

fn flat_entity(
    files: &FileMap,
    kind: EntityKind,
    path: String,
    rel: String,
) -> Result<Entity, MalformedEntity> {
    let content = &files[&rel];
    let manifest = parse_manifest(kind, content).map_err(|reason| MalformedEntity {
        key: EntityKey::new(kind, path.clone()),
        anchor: rel.clone(),
        reason,
    })?;
    let secret = kind == EntityKind::Variable
        && manifest.get("is_secret").and_then(Value::as_bool) == Some(true);
    Ok(
        Entity::new(kind, path, rel.clone(), vec![EntityFile::owned(rel, content.clone())])
            .with_secret(secret),
    )
}

/// Parse a manifest as a YAML mapping carrying the kind's required fields.
fn parse_manifest(kind: EntityKind, content: &[u8]) -> Result<Value, String> {
    let value: Value =
        serde_yaml::from_slice(content).map_err(|e| format!("invalid YAML: {e}"))?;
    if !value.is_mapping() {
        return Err("manifest is not a YAML mapping".to_string());
    }
    let missing: Vec<&str> = kind
        .required_fields()
        .iter()
        .copied()
        .filter(|field| value.get(field).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(format!("missing required fields: {}", missing.join(", ")));
    }
    Ok(value)
}

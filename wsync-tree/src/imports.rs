//! Static import resolution for codebase-bundled scripts.
//!
//! Only relative specifiers (`./x`, `../x`) are followed. Package imports
//! belong to the bundler, not to the entity's file set.

use std::collections::{BTreeSet, VecDeque};
use std::sync::OnceLock;

use regex::Regex;

use crate::layout::{parent_dir, strip_extension};

/// Extensions whose files are parsed for further imports.
pub const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs"];

const CANDIDATE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs", "json"];

fn static_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\b(?:import|export)\s+(?:[\w$*{}\s,]+?\s+from\s+)?["']([^"'\n]+)["']"#)
            .expect("static import regex")
    })
}

fn call_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\b(?:require|import)\s*\(\s*["']([^"'\n]+)["']\s*\)"#)
            .expect("call import regex")
    })
}

pub fn is_source_file(rel: &str) -> bool {
    strip_extension(rel).is_some_and(|(_, ext)| SOURCE_EXTENSIONS.contains(&ext))
}

/// Every module specifier literally imported by `source`, in order of appearance.
pub fn specifiers(source: &str) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();
    for re in [static_import_re(), call_import_re()] {
        for cap in re.captures_iter(source) {
            if let Some(m) = cap.get(1) {
                found.push((m.start(), m.as_str().to_string()));
            }
        }
    }
    found.sort_by_key(|(pos, _)| *pos);
    let mut seen = BTreeSet::new();
    found
        .into_iter()
        .filter(|(_, s)| seen.insert(s.clone()))
        .map(|(_, s)| s)
        .collect()
}

/// Resolve a relative `specifier` imported from `importer` against the set of
/// known files. Returns `None` for package imports, paths escaping the root,
/// and specifiers that match no file.
pub fn resolve_specifier(
    importer: &str,
    specifier: &str,
    exists: &dyn Fn(&str) -> bool,
) -> Option<String> {
    if !(specifier.starts_with("./") || specifier.starts_with("../")) {
        return None;
    }
    let joined = normalize(parent_dir(importer), specifier)?;

    if exists(&joined) {
        return Some(joined);
    }
    // `./util.js` written against `util.ts` sources.
    if let Some(stem) = joined.strip_suffix(".js") {
        for ext in ["ts", "tsx"] {
            let candidate = format!("{stem}.{ext}");
            if exists(&candidate) {
                return Some(candidate);
            }
        }
    }
    for ext in CANDIDATE_EXTENSIONS {
        let candidate = format!("{joined}.{ext}");
        if exists(&candidate) {
            return Some(candidate);
        }
    }
    for ext in CANDIDATE_EXTENSIONS {
        let candidate = format!("{joined}/index.{ext}");
        if exists(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// All files transitively reachable from `entry` (excluded), restricted to
/// files accepted by `in_scope`. Cycles are visited once.
pub fn reachable(
    entry: &str,
    read: &dyn Fn(&str) -> Option<String>,
    exists: &dyn Fn(&str) -> bool,
    in_scope: &dyn Fn(&str) -> bool,
) -> BTreeSet<String> {
    let mut visited = BTreeSet::new();
    let mut queue = VecDeque::from([entry.to_string()]);
    let mut result = BTreeSet::new();

    while let Some(current) = queue.pop_front() {
        if !visited.insert(current.clone()) {
            continue;
        }
        if !is_source_file(&current) {
            continue;
        }
        let Some(source) = read(&current) else { continue };
        for specifier in specifiers(&source) {
            let Some(target) = resolve_specifier(&current, &specifier, exists) else {
                continue;
            };
            if target == entry || !in_scope(&target) {
                continue;
            }
            if result.insert(target.clone()) {
                queue.push_back(target);
            }
        }
    }
    result
}

/// Join `base` and a relative specifier, resolving `.` and `..`.
fn normalize(base: &str, specifier: &str) -> Option<String> {
    let mut parts: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for segment in specifier.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

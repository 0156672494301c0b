// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! package.json reading and `exports`/`imports` map lookup

use crate::error::{ModuleError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Parse a package.json file into a generic JSON value.
///
/// Read failures are I/O errors carrying the path; malformed JSON is a
/// syntax error. The parsed value is returned unmodified.
pub fn parse(path: &Path) -> Result<serde_json::Value> {
    let bytes = std::fs::read(path).map_err(|e| ModuleError::io(path, "open", e))?;
    serde_json::from_slice(&bytes).map_err(|e| ModuleError::Syntax {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Nearest `package.json` at or above `dir`
pub fn find_nearest(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .map(|d| d.join("package.json"))
        .find(|candidate| candidate.is_file())
}

/// Fields of package.json the resolver looks at
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
    /// Package name
    #[serde(default)]
    pub name: Option<String>,
    /// Legacy entry point
    #[serde(default)]
    pub main: Option<String>,
    /// "module" or "commonjs"
    #[serde(default, rename = "type")]
    pub type_field: Option<String>,
    /// Export map
    #[serde(default)]
    pub exports: Option<serde_json::Value>,
    /// Package-private import map
    #[serde(default)]
    pub imports: Option<serde_json::Value>,
}

impl PackageJson {
    /// Read and parse the resolver's view of a package.json
    pub fn read(path: &Path) -> Result<Self> {
        let value = parse(path)?;
        serde_json::from_value(value).map_err(|e| ModuleError::Syntax {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Resolve `subpath` ("." or "./x") through the `exports` field
    pub fn resolve_export(&self, subpath: &str, conditions: &[String]) -> Option<String> {
        let exports = self.exports.as_ref()?;
        if is_subpath_map(exports) {
            lookup_map(exports, subpath, conditions)
        } else if subpath == "." {
            resolve_target(exports, conditions)
        } else {
            None
        }
    }

    /// Resolve `#name` through the `imports` field
    pub fn resolve_import(&self, name: &str, conditions: &[String]) -> Option<String> {
        lookup_map(self.imports.as_ref()?, name, conditions)
    }
}

/// Whether an exports object is keyed by subpaths rather than conditions
fn is_subpath_map(exports: &serde_json::Value) -> bool {
    exports
        .as_object()
        .and_then(|map| map.keys().next())
        .is_some_and(|key| key.starts_with('.'))
}

/// Exact key first, then the longest `*` pattern match.
fn lookup_map(map: &serde_json::Value, key: &str, conditions: &[String]) -> Option<String> {
    let map = map.as_object()?;
    if let Some(target) = map.get(key) {
        return resolve_target(target, conditions);
    }

    let mut best: Option<(&str, &str, &serde_json::Value)> = None;
    for (pattern, target) in map {
        let Some((prefix, suffix)) = pattern.split_once('*') else {
            continue;
        };
        if key.len() >= prefix.len() + suffix.len()
            && key.starts_with(prefix)
            && key.ends_with(suffix)
            && best.is_none_or(|(p, _, _)| prefix.len() > p.len())
        {
            best = Some((prefix, suffix, target));
        }
    }

    let (prefix, suffix, target) = best?;
    let matched = &key[prefix.len()..key.len() - suffix.len()];
    resolve_target(target, conditions).map(|t| t.replace('*', matched))
}

/// Resolve a conditional target: strings are final, objects pick the first key
/// in document order that is an active condition or "default", arrays take the
/// first resolvable element.
pub fn resolve_target(target: &serde_json::Value, conditions: &[String]) -> Option<String> {
    match target {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Object(map) => map
            .iter()
            .filter(|(key, _)| key.as_str() == "default" || conditions.iter().any(|c| c == *key))
            .find_map(|(_, value)| resolve_target(value, conditions)),
        serde_json::Value::Array(items) => {
            items.iter().find_map(|item| resolve_target(item, conditions))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn conditions(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn package(json: &str) -> PackageJson {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_returns_value_unmodified() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("package.json");
        fs::write(&path, r#"{"name":"x","version":"1.0.0"}"#).unwrap();

        let value = parse(&path).unwrap();
        assert_eq!(value, serde_json::json!({"name": "x", "version": "1.0.0"}));
    }

    #[test]
    fn test_parse_distinguishes_io_from_syntax() {
        let dir = tempdir().unwrap();
        let err = parse(&dir.path().join("missing.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read file"));

        let path = dir.path().join("package.json");
        fs::write(&path, r#"{"a":1,}"#).unwrap();
        let err = parse(&path).unwrap_err();
        assert!(matches!(err, ModuleError::Syntax { .. }));
    }

    #[test]
    fn test_conditions_follow_document_order() {
        let pkg = package(
            r#"{"exports":{"require":"./a.cjs","import":"./a.mjs","default":"./a.js"}}"#,
        );
        assert_eq!(
            pkg.resolve_export(".", &conditions(&["node", "import"])),
            Some("./a.mjs".into())
        );
        assert_eq!(
            pkg.resolve_export(".", &conditions(&["require", "import"])),
            Some("./a.cjs".into())
        );
        assert_eq!(pkg.resolve_export(".", &conditions(&[])), Some("./a.js".into()));
    }

    #[test]
    fn test_subpath_exports() {
        let pkg = package(
            r#"{"exports":{".":"./index.js","./utils":{"node":{"import":"./u.mjs"}},"./features/*":"./src/features/*.js"}}"#,
        );
        let conds = conditions(&["node", "import"]);
        assert_eq!(pkg.resolve_export(".", &conds), Some("./index.js".into()));
        assert_eq!(pkg.resolve_export("./utils", &conds), Some("./u.mjs".into()));
        assert_eq!(
            pkg.resolve_export("./features/x", &conds),
            Some("./src/features/x.js".into())
        );
        assert_eq!(pkg.resolve_export("./private", &conds), None);
    }

    #[test]
    fn test_imports_map() {
        let pkg = package(r##"{"imports":{"#dep":{"node":"dep-node","default":"./dep.js"}}}"##);
        assert_eq!(
            pkg.resolve_import("#dep", &conditions(&["node"])),
            Some("dep-node".into())
        );
        assert_eq!(pkg.resolve_import("#dep", &conditions(&[])), Some("./dep.js".into()));
        assert_eq!(pkg.resolve_import("#other", &conditions(&[])), None);
    }

    #[test]
    fn test_find_nearest_walks_up() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        let nested = dir.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_nearest(&nested), Some(dir.path().join("package.json")));
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Built-in specifier resolution
//!
//! This is the innermost link of every resolve chain. It never calls
//! further and never touches the network: remote URLs are only checked
//! against the loading policy here and fetched later by the loader.
//!
//! Filesystem lookup follows the Node.js algorithm:
//! - exact path, then each configured extension appended to the file name
//! - directories through package.json `exports`, then `main`, then `index.*`
//! - bare names by walking up `node_modules` directories
//! - `#name` through the nearest package.json `imports`

pub mod package_json;
pub mod specifier;

pub use package_json::PackageJson;
pub use specifier::{BUILTIN_MODULES, Specifier, is_builtin, split_package};

use crate::config::HttpModuleConfig;
use crate::error::{ModuleError, PolicyViolation, Result};
use crate::format::{self, ModuleFormat};
use crate::remote;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

/// Entry files tried in a directory without a usable package.json
const INDEX_FILES: &[&str] = &["index.js", "index.mjs", "index.cjs"];

/// Outcome of built-in resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Canonical URL
    pub url: String,
    /// Format, when it can be known without loading
    pub format: Option<ModuleFormat>,
}

/// Where relative specifiers are resolved from
#[derive(Debug, Clone)]
enum Base {
    Dir(PathBuf),
    Remote(Url),
}

/// Module resolver implementing the Node.js resolution algorithm
#[derive(Debug, Clone)]
pub struct Resolver {
    extensions: Vec<String>,
}

impl Resolver {
    /// Create a resolver trying `extensions` in order
    pub fn new(extensions: Vec<String>) -> Self {
        Self { extensions }
    }

    /// Resolve `specifier` as imported from `parent_url`.
    pub fn resolve(
        &self,
        specifier: &str,
        parent_url: Option<&str>,
        conditions: &[String],
        http: &HttpModuleConfig,
    ) -> Result<Resolved> {
        let base = base_of(parent_url)?;
        let resolved = self.resolve_from(specifier, &base, conditions, http)?;
        match resolved {
            Some(resolved) => {
                debug!("Resolved '{}' to {}", specifier, resolved.url);
                Ok(resolved)
            }
            None => Err(ModuleError::not_found(specifier, parent_url)),
        }
    }

    fn resolve_from(
        &self,
        specifier: &str,
        base: &Base,
        conditions: &[String],
        http: &HttpModuleConfig,
    ) -> Result<Option<Resolved>> {
        match Specifier::parse(specifier)? {
            Specifier::Builtin { scheme, name } => {
                if !is_builtin(name) {
                    return Ok(None);
                }
                Ok(Some(Resolved {
                    url: format!("{}:{}", scheme, name),
                    format: Some(ModuleFormat::Builtin),
                }))
            }
            Specifier::Url(url) if remote::is_remote(url) => resolve_remote(url, http).map(Some),
            Specifier::Url(url) => {
                let path = Url::parse(url).ok().and_then(|u| u.to_file_path().ok());
                match path {
                    Some(path) => Ok(self.resolve_path(&path, conditions).and_then(file_result)),
                    None => Ok(None),
                }
            }
            Specifier::Absolute(path) => {
                Ok(self.resolve_path(Path::new(path), conditions).and_then(file_result))
            }
            Specifier::Relative(relative) => match base {
                Base::Remote(parent) => {
                    let joined = parent
                        .join(relative)
                        .map_err(|_| ModuleError::policy(relative, PolicyViolation::InvalidUrl))?;
                    resolve_remote(joined.as_str(), http).map(Some)
                }
                Base::Dir(dir) => {
                    Ok(self.resolve_path(&dir.join(relative), conditions).and_then(file_result))
                }
            },
            Specifier::PackageImport(name) => match base {
                Base::Dir(dir) => self.resolve_package_import(name, dir, conditions, http),
                Base::Remote(_) => Ok(None),
            },
            Specifier::Bare { package, subpath } => match base {
                Base::Dir(dir) => Ok(self
                    .resolve_node_modules(package, subpath, dir, conditions)
                    .and_then(file_result)),
                Base::Remote(_) => Ok(None),
            },
        }
    }

    /// Exact file, then extensions, then directory entry points
    fn resolve_path(&self, path: &Path, conditions: &[String]) -> Option<PathBuf> {
        if path.is_file() {
            return Some(path.to_path_buf());
        }

        if let Some(found) = self.with_extensions(path) {
            return Some(found);
        }

        if path.is_dir() {
            return self.resolve_directory(path, conditions);
        }

        None
    }

    /// Append each extension to the full file name (`a.min` -> `a.min.js`)
    fn with_extensions(&self, path: &Path) -> Option<PathBuf> {
        let file_name = path.file_name()?.to_string_lossy().into_owned();
        self.extensions
            .iter()
            .map(|ext| path.with_file_name(format!("{}{}", file_name, ext)))
            .find(|candidate| candidate.is_file())
    }

    /// Resolve a directory: package.json exports, then main, then index files
    fn resolve_directory(&self, dir: &Path, conditions: &[String]) -> Option<PathBuf> {
        if let Ok(pkg) = PackageJson::read(&dir.join("package.json")) {
            if let Some(target) = pkg.resolve_export(".", conditions) {
                let entry = dir.join(target);
                if entry.is_file() {
                    return Some(entry);
                }
            }

            if let Some(main) = pkg.main.as_deref() {
                let main_path = dir.join(main);
                if main_path.is_file() {
                    return Some(main_path);
                }
                if let Some(found) = self.with_extensions(&main_path) {
                    return Some(found);
                }
            }
        }

        INDEX_FILES
            .iter()
            .map(|index| dir.join(index))
            .find(|candidate| candidate.is_file())
    }

    /// Look for `package` in `node_modules` of `start` and each ancestor
    fn resolve_node_modules(
        &self,
        package: &str,
        subpath: Option<&str>,
        start: &Path,
        conditions: &[String],
    ) -> Option<PathBuf> {
        for dir in start.ancestors() {
            if dir.file_name().is_some_and(|name| name == "node_modules") {
                continue;
            }

            let package_dir = dir.join("node_modules").join(package);
            if !package_dir.is_dir() {
                continue;
            }

            let manifest = PackageJson::read(&package_dir.join("package.json")).ok();
            if let Some(pkg) = manifest.filter(|pkg| pkg.exports.is_some()) {
                // An exports map hides every subpath it does not list.
                let key = match subpath {
                    Some(sub) => format!("./{}", sub),
                    None => ".".to_string(),
                };
                return pkg
                    .resolve_export(&key, conditions)
                    .map(|target| package_dir.join(target))
                    .filter(|entry| entry.is_file());
            }

            return match subpath {
                Some(sub) => self.resolve_path(&package_dir.join(sub), conditions),
                None => self.resolve_directory(&package_dir, conditions),
            };
        }

        None
    }

    /// `#name` through the nearest package.json "imports"
    fn resolve_package_import(
        &self,
        name: &str,
        dir: &Path,
        conditions: &[String],
        http: &HttpModuleConfig,
    ) -> Result<Option<Resolved>> {
        let Some(pkg_path) = package_json::find_nearest(dir) else {
            return Ok(None);
        };
        let Ok(pkg) = PackageJson::read(&pkg_path) else {
            return Ok(None);
        };
        let Some(target) = pkg.resolve_import(name, conditions) else {
            return Ok(None);
        };
        if target.starts_with('#') {
            return Ok(None);
        }

        let pkg_dir = pkg_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        self.resolve_from(&target, &Base::Dir(pkg_dir), conditions, http)
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(crate::config::LoaderConfig::default().extensions)
    }
}

fn resolve_remote(url: &str, http: &HttpModuleConfig) -> Result<Resolved> {
    let parsed = remote::check_url(http, url)?;
    let url = parsed.to_string();
    let format = format::url_extension_format(&url);
    Ok(Resolved { url, format })
}

/// Canonical `file://` result for a found path
fn file_result(path: PathBuf) -> Option<Resolved> {
    let path = path.canonicalize().unwrap_or(path);
    let url = Url::from_file_path(&path).ok()?;
    Some(Resolved {
        url: url.to_string(),
        format: Some(format::detect_file(&path, None)),
    })
}

/// Directory relative specifiers resolve against, from the parent's URL
fn base_of(parent_url: Option<&str>) -> Result<Base> {
    let Some(parent) = parent_url else {
        return current_dir().map(Base::Dir);
    };

    if remote::is_remote(parent) {
        return Url::parse(parent)
            .map(Base::Remote)
            .map_err(|_| ModuleError::policy(parent, PolicyViolation::InvalidUrl));
    }

    if parent.starts_with("file:") {
        return Url::parse(parent)
            .ok()
            .and_then(|u| u.to_file_path().ok())
            .map(|path| Base::Dir(containing_dir(path)))
            .ok_or_else(|| ModuleError::type_error(format!("Invalid parentURL '{}'", parent)));
    }

    let path = Path::new(parent);
    if path.is_absolute() {
        return Ok(Base::Dir(containing_dir(path.to_path_buf())));
    }

    // Virtual parents (e.g. "virtual:entry") resolve from the working directory.
    current_dir().map(Base::Dir)
}

/// `path` itself if it is a directory, else its parent
pub(crate) fn containing_dir(path: PathBuf) -> PathBuf {
    if path.is_dir() {
        return path;
    }
    match path.parent() {
        Some(parent) => parent.to_path_buf(),
        None => path,
    }
}

fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().map_err(|e| ModuleError::io(".", "getcwd", e))
}

/// `file://` URL for `path`
pub fn file_url(path: &Path) -> Option<String> {
    Url::from_file_path(path).ok().map(String::from)
}

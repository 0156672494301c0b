// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module format detection

use crate::resolver::package_json::{PackageJson, find_nearest};
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

static ESM_SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)^\s*(?:import\s+(?:[\w$*{]|['"])|export\s+(?:default|const|let|var|function|class|async|\{|\*))"#,
    )
    .expect("ESM syntax pattern is valid")
});

static CJS_SYNTAX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\brequire\s*\(\s*['"`]|\bmodule\.exports\b|\bexports\.[\w$]+\s*="#)
        .expect("CommonJS syntax pattern is valid")
});

/// Module format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleFormat {
    /// ECMAScript module (import/export)
    Module,
    /// CommonJS module (require/module.exports)
    CommonJs,
    /// JSON document
    Json,
    /// WebAssembly binary
    Wasm,
    /// Module provided by the runtime itself
    Builtin,
}

impl ModuleFormat {
    /// Format name as used in hook results
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleFormat::Module => "module",
            ModuleFormat::CommonJs => "commonjs",
            ModuleFormat::Json => "json",
            ModuleFormat::Wasm => "wasm",
            ModuleFormat::Builtin => "builtin",
        }
    }

    /// Whether sources of this format are binary
    pub fn is_binary(&self) -> bool {
        matches!(self, ModuleFormat::Wasm)
    }

    /// Format implied by a file extension, for extensions that decide it alone
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "mjs" => Some(ModuleFormat::Module),
            "cjs" => Some(ModuleFormat::CommonJs),
            "json" => Some(ModuleFormat::Json),
            "wasm" => Some(ModuleFormat::Wasm),
            _ => None,
        }
    }

    /// Format implied by a package.json "type" field
    pub fn from_package_type(type_field: Option<&str>) -> Option<Self> {
        match type_field {
            Some("module") => Some(ModuleFormat::Module),
            Some("commonjs") => Some(ModuleFormat::CommonJs),
            _ => None,
        }
    }

    /// Guess from source text
    pub fn from_source(source: &str) -> Option<Self> {
        if ESM_SYNTAX.is_match(source) {
            Some(ModuleFormat::Module)
        } else if CJS_SYNTAX.is_match(source) {
            Some(ModuleFormat::CommonJs)
        } else {
            None
        }
    }

    /// Format from a response content type
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let content_type = content_type.to_ascii_lowercase();
        if content_type.contains("application/json") {
            Some(ModuleFormat::Json)
        } else if content_type.contains("application/wasm") {
            Some(ModuleFormat::Wasm)
        } else {
            None
        }
    }
}

impl fmt::Display for ModuleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleFormat {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "module" => Ok(ModuleFormat::Module),
            "commonjs" => Ok(ModuleFormat::CommonJs),
            "json" => Ok(ModuleFormat::Json),
            "wasm" => Ok(ModuleFormat::Wasm),
            "builtin" => Ok(ModuleFormat::Builtin),
            _ => Err(()),
        }
    }
}

/// Format of a local file: extension, then the nearest package.json "type",
/// then the source text (read only if `source` is `None`), then CommonJS.
pub fn detect_file(path: &Path, source: Option<&str>) -> ModuleFormat {
    if let Some(format) = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(ModuleFormat::from_extension)
    {
        return format;
    }

    if let Some(format) = path
        .parent()
        .and_then(find_nearest)
        .and_then(|pkg_path| PackageJson::read(&pkg_path).ok())
        .and_then(|pkg| ModuleFormat::from_package_type(pkg.type_field.as_deref()))
    {
        return format;
    }

    let from_source = match source {
        Some(text) => ModuleFormat::from_source(text),
        None => std::fs::read_to_string(path)
            .ok()
            .and_then(|text| ModuleFormat::from_source(&text)),
    };

    from_source.unwrap_or(ModuleFormat::CommonJs)
}

/// Format of a remote module: content type, then URL extension, then ESM.
pub fn detect_remote(url: &str, content_type: Option<&str>) -> ModuleFormat {
    if let Some(format) = content_type.and_then(ModuleFormat::from_content_type) {
        return format;
    }
    url_extension_format(url).unwrap_or(ModuleFormat::Module)
}

/// Format implied by the extension of a URL's path, ignoring query and fragment
pub fn url_extension_format(url: &str) -> Option<ModuleFormat> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = file.rsplit_once('.')?;
    ModuleFormat::from_extension(ext)
}

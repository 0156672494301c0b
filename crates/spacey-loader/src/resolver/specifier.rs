// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Specifier classification

use crate::error::{ModuleError, Result};
use std::path::Path;

/// Modules provided by the runtime
pub const BUILTIN_MODULES: &[&str] = &[
    "assert",
    "buffer",
    "child_process",
    "console",
    "crypto",
    "dns",
    "events",
    "fs",
    "fs/promises",
    "http",
    "https",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "querystring",
    "readline",
    "stream",
    "string_decoder",
    "timers",
    "tty",
    "url",
    "util",
    "worker_threads",
    "zlib",
];

/// Prefixes naming the builtin namespace
const BUILTIN_SCHEMES: &[&str] = &["node:", "spacey:"];

/// A classified module specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Specifier<'a> {
    /// Runtime-provided module; `scheme` is "node" unless `spacey:` was used
    Builtin {
        /// Namespace of the canonical URL
        scheme: &'static str,
        /// Name without prefix
        name: &'a str,
    },
    /// Absolute URL (`https://`, `http://`, `file://`)
    Url(&'a str),
    /// Absolute filesystem path
    Absolute(&'a str),
    /// `./x`, `../x`, `.` or `..`
    Relative(&'a str),
    /// `#name`, resolved through package.json "imports"
    PackageImport(&'a str),
    /// Package name with optional subpath
    Bare {
        /// `name` or `@scope/name`
        package: &'a str,
        /// Remainder after the package name
        subpath: Option<&'a str>,
    },
}

impl<'a> Specifier<'a> {
    /// Classify `specifier`
    pub fn parse(specifier: &'a str) -> Result<Self> {
        if specifier.is_empty() {
            return Err(ModuleError::type_error("module specifier must be a non-empty string"));
        }

        for &scheme in BUILTIN_SCHEMES {
            if let Some(name) = specifier.strip_prefix(scheme) {
                return Ok(Specifier::Builtin {
                    scheme: &scheme[..scheme.len() - 1],
                    name,
                });
            }
        }

        if specifier.contains("://") {
            return Ok(Specifier::Url(specifier));
        }

        if is_relative(specifier) {
            return Ok(Specifier::Relative(specifier));
        }

        if Path::new(specifier).is_absolute() {
            return Ok(Specifier::Absolute(specifier));
        }

        if specifier.starts_with('#') {
            return Ok(Specifier::PackageImport(specifier));
        }

        if is_builtin(specifier) {
            return Ok(Specifier::Builtin {
                scheme: "node",
                name: specifier,
            });
        }

        let (package, subpath) = split_package(specifier);
        Ok(Specifier::Bare { package, subpath })
    }
}

/// Whether `name` (with or without a builtin prefix) names a builtin module
pub fn is_builtin(name: &str) -> bool {
    let name = BUILTIN_SCHEMES
        .iter()
        .find_map(|scheme| name.strip_prefix(*scheme))
        .unwrap_or(name);
    BUILTIN_MODULES.iter().any(|builtin| *builtin == name)
}

fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// Split a package specifier into name and optional subpath
pub fn split_package(specifier: &str) -> (&str, Option<&str>) {
    let name_end = if specifier.starts_with('@') {
        // @scope/name[/subpath]
        specifier
            .find('/')
            .and_then(|scope_end| {
                specifier[scope_end + 1..]
                    .find('/')
                    .map(|i| scope_end + 1 + i)
            })
    } else {
        specifier.find('/')
    };

    match name_end {
        Some(end) => (&specifier[..end], Some(&specifier[end + 1..])),
        None => (specifier, None),
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Built-in module loader - the innermost link of every load chain

use crate::deferred::Deferred;
use crate::error::{ModuleError, Result};
use crate::format::{self, ModuleFormat};
use crate::hooks::{LoadContext, LoadResult, ModuleSource};
use crate::remote::{self, RemoteFetcher};
use crate::resolver::is_builtin;
use bytes::Bytes;
use futures::FutureExt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Reads module bytes for a canonical URL
#[derive(Clone)]
pub struct DefaultLoader {
    fetcher: Arc<RemoteFetcher>,
}

impl DefaultLoader {
    /// Create a loader fetching remote modules through `fetcher`
    pub fn new(fetcher: Arc<RemoteFetcher>) -> Self {
        Self { fetcher }
    }

    /// Load `url`. File and builtin loads complete synchronously; remote
    /// loads are pending until the fetch settles.
    pub fn load(&self, url: &str, ctx: &LoadContext) -> Deferred<LoadResult> {
        if remote::is_remote(url) {
            let fetcher = Arc::clone(&self.fetcher);
            let url = url.to_string();
            let hint = ctx.format.clone();
            return Deferred::Pending(
                async move {
                    let module = fetcher.fetch(&url).await?;
                    let format = hint.unwrap_or_else(|| {
                        format::detect_remote(&module.url, module.content_type.as_deref())
                            .to_string()
                    });
                    debug!("Loaded remote module {} as {}", url, format);
                    Ok(LoadResult {
                        source: source_for(module.bytes, &format),
                        format: Some(format),
                        short_circuit: None,
                    })
                }
                .boxed(),
            );
        }

        Deferred::Ready(load_local(url, ctx))
    }
}

fn load_local(url: &str, ctx: &LoadContext) -> Result<LoadResult> {
    if let Some(name) = url.strip_prefix("node:").or_else(|| url.strip_prefix("spacey:")) {
        if !is_builtin(name) {
            return Err(ModuleError::not_found(url, None));
        }
        return Ok(LoadResult {
            format: Some(ModuleFormat::Builtin.to_string()),
            source: ModuleSource::Text(String::new()),
            short_circuit: None,
        });
    }

    let path = Url::parse(url)
        .ok()
        .filter(|u| u.scheme() == "file")
        .and_then(|u| u.to_file_path().ok())
        .ok_or_else(|| ModuleError::not_found(url, None))?;

    load_file(&path, ctx.format.clone())
}

/// Read a local file and determine its format unless `hint` supplies one.
pub fn load_file(path: &Path, hint: Option<String>) -> Result<LoadResult> {
    let bytes = std::fs::read(path).map_err(|e| ModuleError::io(path, "open", e))?;
    let bytes = Bytes::from(bytes);

    let format = match hint {
        Some(format) => format,
        None => {
            let text = std::str::from_utf8(&bytes).ok();
            format::detect_file(path, text).to_string()
        }
    };

    debug!("Loaded {} as {}", path.display(), format);
    Ok(LoadResult {
        source: source_for(bytes, &format),
        format: Some(format),
        short_circuit: None,
    })
}

/// Text for textual formats (BOM removed), raw bytes for wasm or invalid UTF-8
fn source_for(bytes: Bytes, format: &str) -> ModuleSource {
    if format == ModuleFormat::Wasm.as_str() {
        return ModuleSource::Binary(bytes);
    }
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&bytes[..]);
    match std::str::from_utf8(body) {
        Ok(text) => ModuleSource::Text(text.to_string()),
        Err(_) => ModuleSource::Binary(bytes),
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Remote module policy checks.
//!
//! Every check here runs before a request is issued or before a response
//! is admitted to the cache.

use crate::config::HttpModuleConfig;
use crate::error::{ModuleError, PolicyViolation, Result};
use tracing::warn;
use url::Url;

/// Content types accepted for remote modules (substring match).
const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "application/javascript",
    "text/javascript",
    "application/ecmascript",
    "text/ecmascript",
    "application/json",
    "application/wasm",
    "text/plain",
];

/// Whether `specifier` names a remote module
pub fn is_remote(specifier: &str) -> bool {
    specifier.starts_with("http://") || specifier.starts_with("https://")
}

/// Check `url` against the remote-loading policy and return it parsed.
pub fn check_url(config: &HttpModuleConfig, url: &str) -> Result<Url> {
    let reject = |violation: PolicyViolation| {
        warn!("Rejected remote module {}: {}", url, violation);
        ModuleError::policy(url, violation)
    };

    if !config.enabled {
        return Err(reject(PolicyViolation::Disabled));
    }

    let parsed = Url::parse(url).map_err(|_| reject(PolicyViolation::InvalidUrl))?;

    match parsed.scheme() {
        "https" => {}
        "http" if !config.https_only => {}
        _ => return Err(reject(PolicyViolation::ProtocolNotAllowed)),
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| reject(PolicyViolation::InvalidUrl))?;

    if !config.is_domain_allowed(host) {
        return Err(reject(PolicyViolation::DomainNotAllowed));
    }

    Ok(parsed)
}

/// Check a response body before it is cached.
pub fn check_response(
    config: &HttpModuleConfig,
    url: &str,
    content_type: Option<&str>,
    size: usize,
) -> Result<()> {
    if size > config.max_module_size {
        warn!("Remote module {} is {} bytes, limit is {}", url, size, config.max_module_size);
        return Err(ModuleError::policy(url, PolicyViolation::TooLarge));
    }

    // CDNs frequently omit the header; only a present, foreign type is rejected.
    if let Some(content_type) = content_type {
        let content_type = content_type.to_ascii_lowercase();
        if !ALLOWED_CONTENT_TYPES.iter().any(|t| content_type.contains(t)) {
            warn!("Remote module {} has content type {}", url, content_type);
            return Err(ModuleError::policy(url, PolicyViolation::InvalidContentType));
        }
    }

    Ok(())
}

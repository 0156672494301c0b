// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hosts trusted for remote module loading out of the box.
pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &[
    "esm.run",
    "esm.sh",
    "cdn.skypack.dev",
    "cdn.jsdelivr.net",
    "unpkg.com",
];

/// Environment variable prefix for remote-module settings.
pub const ENV_PREFIX: &str = "SPACEY_HTTP_MODULES_";

const DEFAULT_CACHE_SIZE: usize = 100;

/// Configuration for a module runtime instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Remote module settings
    pub http: HttpModuleConfig,

    /// Conditions used when the caller supplies none
    pub conditions: Vec<String>,

    /// Extensions tried after the exact path, in order
    pub extensions: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            http: HttpModuleConfig::default(),
            conditions: vec!["node".to_string(), "import".to_string()],
            extensions: [".js", ".json", ".mjs", ".cjs"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl LoaderConfig {
    /// Defaults overridden by `SPACEY_HTTP_MODULES_*` environment variables.
    pub fn load() -> Self {
        let mut config = Self::default();
        config.apply_env(std::env::vars());
        config
    }

    /// Apply every `SPACEY_HTTP_MODULES_*` pair from `vars`.
    pub fn apply_env<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(setting) = key.strip_prefix(ENV_PREFIX) {
                let setting = setting.to_lowercase().replace('_', "-");
                self.set(&setting, &value);
            }
        }
    }

    /// Set a configuration value. Unknown keys and unparsable numbers are ignored.
    pub fn set(&mut self, key: &str, value: &str) {
        let http = &mut self.http;
        match key {
            "enabled" => {
                if let Some(b) = parse_flag(value) {
                    http.enabled = b;
                }
            }
            "https-only" => {
                if let Some(b) = parse_flag(value) {
                    http.https_only = b;
                }
            }
            "allowed" | "allowed-domains" => http.allowed_domains = parse_domains(value),
            "max-size" => {
                if let Ok(n) = value.trim().parse() {
                    http.max_module_size = n;
                }
            }
            "timeout" => {
                if let Ok(n) = value.trim().parse() {
                    http.timeout_secs = n;
                }
            }
            "user-agent" => http.user_agent = value.to_string(),
            "cache-size" => {
                if let Ok(n) = value.trim().parse() {
                    http.cache_size = n;
                }
            }
            "cache-ttl" => {
                if let Ok(n) = value.trim().parse() {
                    http.cache_ttl_secs = n;
                }
            }
            _ => {
                tracing::debug!("Ignoring unknown loader setting '{}'", key);
            }
        }
    }
}

/// Remote (`http:`/`https:`) module settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpModuleConfig {
    /// Whether remote loading is allowed at all
    pub enabled: bool,

    /// Reject plain `http:` URLs
    pub https_only: bool,

    /// Trusted hosts, matched exactly
    pub allowed_domains: Vec<String>,

    /// Largest accepted response body in bytes
    pub max_module_size: usize,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// User-Agent header
    pub user_agent: String,

    /// Remote cache capacity in entries (0 selects the default)
    pub cache_size: usize,

    /// Remote cache entry lifetime in seconds
    pub cache_ttl_secs: u64,
}

impl Default for HttpModuleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            https_only: false,
            allowed_domains: DEFAULT_ALLOWED_DOMAINS.iter().map(|s| s.to_string()).collect(),
            max_module_size: 10 * 1024 * 1024,
            timeout_secs: 30,
            user_agent: format!("spacey/{}", env!("CARGO_PKG_VERSION")),
            cache_size: DEFAULT_CACHE_SIZE,
            cache_ttl_secs: 3600,
        }
    }
}

impl HttpModuleConfig {
    /// Whether `host` is on the allow-list
    pub fn is_domain_allowed(&self, host: &str) -> bool {
        self.allowed_domains.iter().any(|d| d == host)
    }

    /// Cache capacity with the zero fallback applied
    pub fn effective_cache_size(&self) -> usize {
        if self.cache_size == 0 {
            DEFAULT_CACHE_SIZE
        } else {
            self.cache_size
        }
    }

    /// Request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Cache entry lifetime
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

/// Split a comma-separated domain list, trimming blanks and dropping empties.
fn parse_domains(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}

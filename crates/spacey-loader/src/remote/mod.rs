// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Remote (`http:`/`https:`) module fetching
//!
//! The fetcher validates every URL against the allow-list before any request
//! is made, serves fresh hits from an LRU+TTL byte cache, and performs
//! exactly one GET per miss. It never retries; callers wanting fallbacks use
//! [`RemoteFetcher::fetch_first`].

pub mod cache;
pub mod client;
pub mod security;

pub use cache::{CacheEntry, CacheStats, RemoteCache};
pub use client::{HttpClient, HttpResponse, ReqwestClient};
pub use security::{check_response, check_url, is_remote};

use crate::config::HttpModuleConfig;
use crate::error::{ModuleError, Result};
use bytes::Bytes;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Bytes of a fetched remote module
#[derive(Debug, Clone)]
pub struct RemoteModule {
    /// Exact URL the bytes were fetched from
    pub url: String,
    /// Response body
    pub bytes: Bytes,
    /// Response content type
    pub content_type: Option<String>,
}

impl RemoteModule {
    /// Body decoded as UTF-8 with a leading BOM removed
    pub fn text(&self) -> String {
        let body = self.bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&self.bytes[..]);
        String::from_utf8_lossy(body).into_owned()
    }
}

impl From<CacheEntry> for RemoteModule {
    fn from(entry: CacheEntry) -> Self {
        Self {
            url: entry.url,
            bytes: entry.bytes,
            content_type: entry.content_type,
        }
    }
}

/// Allow-list gated fetcher with a byte cache
pub struct RemoteFetcher {
    config: RwLock<HttpModuleConfig>,
    client: Arc<dyn HttpClient>,
    cache: Arc<Mutex<RemoteCache>>,
    in_flight: DashMap<String, Shared<BoxFuture<'static, Result<RemoteModule>>>>,
}

impl RemoteFetcher {
    /// Create a fetcher over the given transport
    pub fn new(config: HttpModuleConfig, client: Arc<dyn HttpClient>) -> Self {
        let cache = RemoteCache::new(config.effective_cache_size(), config.cache_ttl());
        Self {
            config: RwLock::new(config),
            client,
            cache: Arc::new(Mutex::new(cache)),
            in_flight: DashMap::new(),
        }
    }

    /// Create a fetcher using `reqwest`
    pub fn with_reqwest(config: HttpModuleConfig) -> Result<Self> {
        let client = ReqwestClient::new(&config)?;
        Ok(Self::new(config, Arc::new(client)))
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> HttpModuleConfig {
        self.config.read().clone()
    }

    /// Replace the configuration. Applies to subsequent calls; requests
    /// already in flight keep the settings they started with.
    pub fn set_config(&self, config: HttpModuleConfig) {
        if let Err(e) = self.client.configure(&config) {
            warn!("Keeping previous HTTP client settings: {}", e);
        }
        {
            let mut cache = self.cache.lock();
            cache.resize(config.effective_cache_size());
            cache.set_ttl(config.cache_ttl());
        }
        *self.config.write() = config;
    }

    /// Check `url` against the current policy without fetching it.
    pub fn check(&self, url: &str) -> Result<url::Url> {
        check_url(&self.config.read(), url)
    }

    /// Fetch `url`, serving from the cache when a fresh entry exists.
    ///
    /// Concurrent misses for the same URL share one request.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<RemoteModule> {
        let config = self.config();
        check_url(&config, url)?;

        if let Some(entry) = self.cache.lock().get(url) {
            debug!("Remote cache hit for {}", url);
            return Ok(entry.into());
        }

        let shared = self
            .in_flight
            .entry(url.to_string())
            .or_insert_with(|| {
                debug!("Fetching remote module {}", url);
                download(
                    Arc::clone(&self.client),
                    Arc::clone(&self.cache),
                    config,
                    url.to_string(),
                )
                .boxed()
                .shared()
            })
            .value()
            .clone();

        let result = shared.clone().await;
        self.in_flight.remove_if(url, |_, current| current.ptr_eq(&shared));
        result
    }

    /// Try each candidate in order and return the first success, or the last
    /// error if all of them fail.
    pub async fn fetch_first<S: AsRef<str>>(&self, candidates: &[S]) -> Result<RemoteModule> {
        let mut last_error = None;
        for candidate in candidates {
            match self.fetch(candidate.as_ref()).await {
                Ok(module) => return Ok(module),
                Err(e) => {
                    debug!("Candidate {} failed: {}", candidate.as_ref(), e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| ModuleError::type_error("no candidate URLs given")))
    }

    /// Number of requests currently in flight
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Remote cache statistics
    pub fn stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    /// Drop all cached bodies
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }
}

/// One GET, validated, stored on success. Failures leave the cache untouched.
async fn download(
    client: Arc<dyn HttpClient>,
    cache: Arc<Mutex<RemoteCache>>,
    config: HttpModuleConfig,
    url: String,
) -> Result<RemoteModule> {
    let response = client.get(&url).await?;

    if !response.is_success() {
        return Err(ModuleError::network(&url, format!("HTTP {}", response.status)));
    }

    check_response(
        &config,
        &url,
        response.content_type.as_deref(),
        response.body.len(),
    )?;

    let entry = cache.lock().put(&url, response.body, response.content_type);
    Ok(entry.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeClient {
        responses: HashMap<String, HttpResponse>,
        calls: AtomicUsize,
        user_agents: Mutex<Vec<String>>,
    }

    impl FakeClient {
        fn with(mut self, url: &str, status: u16, content_type: Option<&str>, body: &str) -> Self {
            self.responses.insert(
                url.to_string(),
                HttpResponse {
                    status,
                    content_type: content_type.map(str::to_string),
                    body: Bytes::from(body.to_string()),
                },
            );
            self
        }
    }

    #[async_trait]
    impl HttpClient for FakeClient {
        async fn get(&self, url: &str) -> Result<HttpResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.responses
                .get(url)
                .cloned()
                .ok_or_else(|| ModuleError::network(url, "connection refused"))
        }

        fn configure(&self, config: &HttpModuleConfig) -> Result<()> {
            self.user_agents.lock().push(config.user_agent.clone());
            Ok(())
        }
    }

    fn fetcher(client: Arc<FakeClient>) -> RemoteFetcher {
        RemoteFetcher::new(HttpModuleConfig::default(), client)
    }

    #[tokio::test]
    async fn test_second_fetch_is_served_from_cache() {
        let client = Arc::new(FakeClient::default().with(
            "https://esm.sh/a.js",
            200,
            Some("application/javascript"),
            "\u{feff}export default 1;",
        ));
        let fetcher = fetcher(client.clone());

        let first = fetcher.fetch("https://esm.sh/a.js").await.unwrap();
        let second = fetcher.fetch("https://esm.sh/a.js").await.unwrap();

        assert_eq!(first.text(), "export default 1;");
        assert_eq!(second.bytes, first.bytes);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_request() {
        let client = Arc::new(FakeClient::default().with(
            "https://esm.sh/a.js",
            200,
            Some("application/javascript"),
            "export {};",
        ));
        let fetcher = fetcher(client.clone());

        let (a, b) = tokio::join!(
            fetcher.fetch("https://esm.sh/a.js"),
            fetcher.fetch("https://esm.sh/a.js")
        );
        assert_eq!(a.unwrap().bytes, b.unwrap().bytes);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.in_flight(), 0);
        assert_eq!(fetcher.stats().entries, 1);
    }

    #[tokio::test]
    async fn test_concurrent_failures_are_shared_and_not_cached() {
        let client = Arc::new(FakeClient::default());
        let fetcher = fetcher(client.clone());

        let (a, b) = tokio::join!(
            fetcher.fetch("https://esm.sh/down.js"),
            fetcher.fetch("https://esm.sh/down.js")
        );
        assert!(a.unwrap_err().is_network());
        assert!(b.unwrap_err().is_network());
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fetcher.in_flight(), 0);
        assert_eq!(fetcher.stats().entries, 0);

        assert!(fetcher.fetch("https://esm.sh/down.js").await.is_err());
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_set_config_reconfigures_transport() {
        let client = Arc::new(FakeClient::default());
        let fetcher = fetcher(client.clone());
        let mut config = fetcher.config();
        config.user_agent = "custom/1.0".to_string();
        config.timeout_secs = 5;
        fetcher.set_config(config);

        assert_eq!(*client.user_agents.lock(), vec!["custom/1.0".to_string()]);
        assert_eq!(fetcher.config().timeout_secs, 5);
    }

    #[test]
    fn test_reqwest_client_can_be_rebuilt() {
        let config = HttpModuleConfig::default();
        let client = ReqwestClient::new(&config).unwrap();
        let updated = HttpModuleConfig {
            user_agent: "spacey-test".to_string(),
            timeout_secs: 1,
            ..config
        };
        assert!(client.configure(&updated).is_ok());
    }

    #[tokio::test]
    async fn test_policy_rejection_issues_no_request() {
        let client = Arc::new(FakeClient::default());
        let fetcher = fetcher(client.clone());

        let err = fetcher.fetch("https://evil.example/x.js").await.unwrap_err();
        assert!(err.to_string().contains("allowlist"));
        assert!(err.is_policy());
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failures_leave_cache_untouched() {
        let client = Arc::new(
            FakeClient::default()
                .with("https://esm.sh/404.js", 404, None, "")
                .with("https://esm.sh/page", 200, Some("text/html"), "<html>"),
        );
        let fetcher = fetcher(client.clone());

        let err = fetcher.fetch("https://esm.sh/404.js").await.unwrap_err();
        assert!(err.is_network());
        assert!(err.to_string().contains("https://esm.sh/404.js"));

        let err = fetcher.fetch("https://esm.sh/page").await.unwrap_err();
        assert!(err.to_string().contains("Invalid content type"));

        let err = fetcher.fetch("https://esm.sh/down.js").await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));

        assert_eq!(fetcher.stats().entries, 0);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fetch_first_falls_back_in_order() {
        let client = Arc::new(FakeClient::default().with(
            "https://unpkg.com/a.js",
            200,
            None,
            "ok",
        ));
        let fetcher = fetcher(client.clone());

        let module = fetcher
            .fetch_first(&["https://esm.sh/a.js", "https://unpkg.com/a.js"])
            .await
            .unwrap();
        assert_eq!(module.url, "https://unpkg.com/a.js");
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);

        let empty: [&str; 0] = [];
        assert!(fetcher.fetch_first(&empty).await.is_err());
    }

    #[tokio::test]
    async fn test_disabling_applies_to_next_call() {
        let client = Arc::new(FakeClient::default());
        let fetcher = fetcher(client.clone());
        let mut config = fetcher.config();
        config.enabled = false;
        fetcher.set_config(config);

        let err = fetcher.fetch("https://esm.sh/a.js").await.unwrap_err();
        assert!(err.to_string().contains("HTTP module loading is disabled"));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }
}

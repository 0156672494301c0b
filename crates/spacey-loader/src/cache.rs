// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Single-flight module record cache
//!
//! Resolutions are memoized per (specifier, context) and loads per
//! (canonical URL, conditions). Concurrent requests for the same key share
//! one in-flight operation and observe the same outcome. Failed operations
//! are evicted once they settle so a later request can retry.

use crate::error::Result;
use crate::hooks::{ModuleSource, ResolveContext, ResolveResult};
use crate::value::Value;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

type SharedResult<T> = Shared<BoxFuture<'static, Result<T>>>;

/// Lifecycle of a module record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// Resolution in flight
    Resolving,
    /// URL known, not yet loading
    Resolved,
    /// Load in flight
    Loading,
    /// Source available
    Loaded,
}

/// A resolved and loaded module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    /// Canonical URL, fixed at resolution
    pub url: String,
    /// Module format
    pub format: Option<String>,
    /// Module source
    pub source: ModuleSource,
}

/// Key of a resolution: what was asked for, from where
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolveKey {
    /// Requested specifier
    pub specifier: String,
    /// Resolution context
    pub context: ResolveContext,
}

/// Key of a load: canonical URL under a set of conditions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    /// Canonical URL
    pub url: String,
    /// Conditions the URL was resolved under
    pub conditions: Vec<String>,
}

/// Record cache counters
///
/// A hit is a request that joined a cached or in-flight record; a miss
/// started a new load. Each started load counts once toward the totals.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModuleStatistics {
    /// Loads started
    pub loads_total: u64,
    /// Loads that produced a record
    pub loads_success: u64,
    /// Loads that failed
    pub loads_failed: u64,
    /// Requests served by an existing record or flight
    pub cache_hits: u64,
    /// Requests that started a load
    pub cache_misses: u64,
}

impl ModuleStatistics {
    /// Fraction of settled loads that succeeded, 0 before any settle
    pub fn success_rate(&self) -> f64 {
        let settled = self.loads_success + self.loads_failed;
        if settled == 0 {
            return 0.0;
        }
        self.loads_success as f64 / settled as f64
    }

    /// Script view: `{ loadsTotal, loadsSuccess, loadsFailed, successRate, cacheHits, cacheMisses }`
    pub fn to_value(&self) -> Value {
        Value::object([
            ("loadsTotal", Value::Number(self.loads_total as f64)),
            ("loadsSuccess", Value::Number(self.loads_success as f64)),
            ("loadsFailed", Value::Number(self.loads_failed as f64)),
            ("successRate", Value::Number(self.success_rate())),
            ("cacheHits", Value::Number(self.cache_hits as f64)),
            ("cacheMisses", Value::Number(self.cache_misses as f64)),
        ])
    }
}

#[derive(Default)]
struct Counters {
    loads_total: AtomicU64,
    loads_success: AtomicU64,
    loads_failed: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl Counters {
    fn settled<T>(&self, result: &Result<T>) {
        let counter = match result {
            Ok(_) => &self.loads_success,
            Err(_) => &self.loads_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Memoizes resolve and load results per runtime instance
pub struct ModuleCache {
    resolutions: DashMap<ResolveKey, SharedResult<ResolveResult>>,
    records: DashMap<RecordKey, SharedResult<Arc<ModuleRecord>>>,
    counters: Arc<Counters>,
}

impl ModuleCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            resolutions: DashMap::new(),
            records: DashMap::new(),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Resolve `key` once; `resolve` runs only if no attempt is cached or in flight.
    pub async fn resolve<F, Fut>(&self, key: ResolveKey, resolve: F) -> Result<ResolveResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ResolveResult>> + Send + 'static,
    {
        let (shared, _) = join_or_start(&self.resolutions, &key, resolve);
        settle(&self.resolutions, &key, shared).await
    }

    /// Load `key` once; `load` runs only if no attempt is cached or in flight.
    pub async fn load<F, Fut>(&self, key: RecordKey, load: F) -> Result<Arc<ModuleRecord>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<ModuleRecord>>> + Send + 'static,
    {
        let counters = Arc::clone(&self.counters);
        let counted = move || {
            counters.loads_total.fetch_add(1, Ordering::Relaxed);
            let pending = load();
            async move {
                let result = pending.await;
                counters.settled(&result);
                result
            }
        };

        let (shared, started) = join_or_start(&self.records, &key, counted);
        let counter = if started {
            &self.counters.cache_misses
        } else {
            &self.counters.cache_hits
        };
        counter.fetch_add(1, Ordering::Relaxed);
        settle(&self.records, &key, shared).await
    }

    /// Snapshot of the record counters
    pub fn statistics(&self) -> ModuleStatistics {
        let c = &self.counters;
        ModuleStatistics {
            loads_total: c.loads_total.load(Ordering::Relaxed),
            loads_success: c.loads_success.load(Ordering::Relaxed),
            loads_failed: c.loads_failed.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            cache_misses: c.cache_misses.load(Ordering::Relaxed),
        }
    }

    /// Lifecycle state of a resolution
    pub fn resolution_state(&self, key: &ResolveKey) -> Option<ModuleState> {
        let entry = self.resolutions.get(key)?;
        match entry.peek() {
            None => Some(ModuleState::Resolving),
            Some(Ok(_)) => Some(ModuleState::Resolved),
            Some(Err(_)) => None,
        }
    }

    /// Lifecycle state of the record for `url` under `conditions`
    pub fn state(&self, url: &str, conditions: &[String]) -> Option<ModuleState> {
        let key = RecordKey {
            url: url.to_string(),
            conditions: conditions.to_vec(),
        };
        if let Some(entry) = self.records.get(&key) {
            return match entry.peek() {
                None => Some(ModuleState::Loading),
                Some(Ok(_)) => Some(ModuleState::Loaded),
                Some(Err(_)) => None,
            };
        }

        let resolved = self.resolutions.iter().any(|entry| {
            entry.key().context.conditions == conditions
                && matches!(entry.value().peek(), Some(Ok(result)) if result.url() == url)
        });
        resolved.then_some(ModuleState::Resolved)
    }

    /// Loaded record, if present
    pub fn get(&self, url: &str, conditions: &[String]) -> Option<Arc<ModuleRecord>> {
        let key = RecordKey {
            url: url.to_string(),
            conditions: conditions.to_vec(),
        };
        let entry = self.records.get(&key)?;
        match entry.peek() {
            Some(Ok(record)) => Some(Arc::clone(record)),
            _ => None,
        }
    }

    /// Number of cached records (loaded or in flight)
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records are cached
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every resolution and record
    pub fn clear(&self) {
        self.resolutions.clear();
        self.records.clear();
    }
}

impl Default for ModuleCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Join the flight for `key`, starting one if none is cached or in flight.
/// The flag is true when this call started it.
fn join_or_start<K, T, F, Fut>(
    map: &DashMap<K, SharedResult<T>>,
    key: &K,
    start: F,
) -> (SharedResult<T>, bool)
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let mut started = false;
    let shared = map
        .entry(key.clone())
        .or_insert_with(|| {
            debug!("Starting {:?}", key);
            started = true;
            start().boxed().shared()
        })
        .value()
        .clone();
    (shared, started)
}

/// Await a flight; a failure evicts it unless a newer flight replaced it.
async fn settle<K, T>(map: &DashMap<K, SharedResult<T>>, key: &K, shared: SharedResult<T>) -> Result<T>
where
    K: Eq + Hash,
    T: Clone + Send + Sync + 'static,
{
    let result = shared.clone().await;
    if result.is_err() {
        map.remove_if(key, |_, current| current.ptr_eq(&shared));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModuleError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    fn key(specifier: &str) -> ResolveKey {
        ResolveKey {
            specifier: specifier.to_string(),
            context: ResolveContext::new(None, vec!["import".into()]),
        }
    }

    #[tokio::test]
    async fn test_concurrent_resolves_share_one_flight() {
        let cache = ModuleCache::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel::<()>();

        let start = |runs: Arc<AtomicUsize>, rx: Option<oneshot::Receiver<()>>| {
            move || {
                runs.fetch_add(1, Ordering::SeqCst);
                async move {
                    if let Some(rx) = rx {
                        let _ = rx.await;
                    }
                    Ok(ResolveResult::new("file:///a.js", None, None))
                }
            }
        };

        let first = cache.resolve(key("./a"), start(runs.clone(), Some(rx)));
        let second = cache.resolve(key("./a"), start(runs.clone(), None));
        let release = async {
            tokio::task::yield_now().await;
            assert_eq!(cache.resolution_state(&key("./a")), Some(ModuleState::Resolving));
            tx.send(()).unwrap();
        };

        let (a, b, ()) = tokio::join!(first, second, release);
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(cache.resolution_state(&key("./a")), Some(ModuleState::Resolved));
        assert_eq!(
            cache.state("file:///a.js", &["import".to_string()]),
            Some(ModuleState::Resolved)
        );
    }

    #[tokio::test]
    async fn test_failures_are_shared_then_evicted() {
        let cache = ModuleCache::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let failing = || {
            runs.fetch_add(1, Ordering::SeqCst);
            async { Err(ModuleError::thrown("boom")) }
        };

        let err = cache.resolve(key("x"), failing).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(cache.resolution_state(&key("x")), None);

        let failing = || {
            runs.fetch_add(1, Ordering::SeqCst);
            async { Err(ModuleError::thrown("boom")) }
        };
        assert!(cache.resolve(key("x"), failing).await.is_err());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_loaded_records_are_reused() {
        let cache = ModuleCache::new();
        let record = Arc::new(ModuleRecord {
            url: "file:///a.js".into(),
            format: Some("module".into()),
            source: ModuleSource::Text("export {}".into()),
        });
        let key = RecordKey {
            url: "file:///a.js".into(),
            conditions: vec![],
        };

        let stored = record.clone();
        let loaded = cache
            .load(key.clone(), move || async move { Ok(stored) })
            .await
            .unwrap();
        let again = cache
            .load(key, || -> futures::future::Ready<Result<Arc<ModuleRecord>>> {
                panic!("must not load twice")
            })
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&loaded, &again));
        let stats = cache.statistics();
        assert_eq!(stats.loads_total, 1);
        assert_eq!(stats.loads_success, 1);
        assert_eq!(stats.cache_misses, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(cache.state("file:///a.js", &[]), Some(ModuleState::Loaded));
        assert_eq!(cache.get("file:///a.js", &[]), Some(record));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_loads_are_counted() {
        let cache = ModuleCache::new();
        let key = RecordKey {
            url: "virtual:broken".into(),
            conditions: vec![],
        };
        let failing = || async { Err(ModuleError::not_found("virtual:broken", None)) };

        assert!(cache.load(key.clone(), failing).await.is_err());
        assert!(cache.load(key, failing).await.is_err());

        let stats = cache.statistics();
        assert_eq!(stats.loads_total, 2);
        assert_eq!(stats.loads_failed, 2);
        assert_eq!(stats.cache_misses, 2);
        assert_eq!(stats.cache_hits, 0);
        assert_eq!(stats.success_rate(), 0.0);
    }

    #[test]
    fn test_statistics_value() {
        let stats = ModuleStatistics {
            loads_total: 4,
            loads_success: 3,
            loads_failed: 1,
            cache_hits: 2,
            cache_misses: 4,
        };
        let value = stats.to_value();
        assert_eq!(value.get("successRate"), Value::Number(0.75));
        assert_eq!(value.get("cacheHits"), Value::Number(2.0));
        assert_eq!(ModuleStatistics::default().success_rate(), 0.0);
    }
}

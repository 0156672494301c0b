// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Per-instance module runtime
//!
//! A [`ModuleRuntime`] owns everything module loading needs for one script
//! runtime instance: its hook registry, resolver, remote fetcher and record
//! cache. Two runtimes never observe each other's hooks.

use crate::cache::{ModuleCache, ModuleRecord, ModuleState, ModuleStatistics, RecordKey, ResolveKey};
use crate::config::{HttpModuleConfig, LoaderConfig};
use crate::deferred::Deferred;
use crate::error::{ModuleError, Result};
use crate::hooks::{
    Chain, HookHandle, HookRegistry, LoadContext, LoadResult, LoadStep, ResolveContext,
    ResolveResult, ResolveStep, Terminal,
};
use crate::loader::DefaultLoader;
use crate::remote::{CacheStats, HttpClient, RemoteFetcher, RemoteModule};
use crate::resolver::{self, BUILTIN_MODULES, Resolver, Specifier, package_json};
use crate::value::Value;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, instrument};

struct RuntimeInner {
    config: RwLock<LoaderConfig>,
    registry: HookRegistry,
    resolver: Resolver,
    fetcher: Arc<RemoteFetcher>,
    loader: DefaultLoader,
    cache: ModuleCache,
}

/// Module resolution and loading for one runtime instance.
///
/// Cloning is cheap and yields a handle to the same instance.
#[derive(Clone)]
pub struct ModuleRuntime {
    inner: Arc<RuntimeInner>,
}

impl ModuleRuntime {
    /// Create a runtime fetching remote modules with `reqwest`
    pub fn new(config: LoaderConfig) -> Result<Self> {
        let fetcher = RemoteFetcher::with_reqwest(config.http.clone())?;
        Ok(Self::with_fetcher(config, fetcher))
    }

    /// Create a runtime over a custom HTTP transport
    pub fn with_http_client(config: LoaderConfig, client: Arc<dyn HttpClient>) -> Self {
        let fetcher = RemoteFetcher::new(config.http.clone(), client);
        Self::with_fetcher(config, fetcher)
    }

    fn with_fetcher(config: LoaderConfig, fetcher: RemoteFetcher) -> Self {
        let fetcher = Arc::new(fetcher);
        Self {
            inner: Arc::new(RuntimeInner {
                resolver: Resolver::new(config.extensions.clone()),
                loader: DefaultLoader::new(Arc::clone(&fetcher)),
                config: RwLock::new(config),
                registry: HookRegistry::new(),
                fetcher,
                cache: ModuleCache::new(),
            }),
        }
    }

    /// Current configuration
    pub fn config(&self) -> LoaderConfig {
        let mut config = self.inner.config.read().clone();
        config.http = self.inner.fetcher.config();
        config
    }

    /// Replace the remote-module settings; applies to subsequent calls
    pub fn set_http_config(&self, http: HttpModuleConfig) {
        self.inner.fetcher.set_config(http.clone());
        self.inner.config.write().http = http;
    }

    /// Resolve context for an import from `parent_url` with the default conditions
    pub fn context(&self, parent_url: Option<&str>) -> ResolveContext {
        ResolveContext::new(
            parent_url.map(str::to_string),
            self.inner.config.read().conditions.clone(),
        )
    }

    /// Install a `{ resolve?, load? }` hook pair
    pub fn register_hooks(&self, options: &Value) -> Result<HookHandle> {
        self.inner.registry.register(options)
    }

    /// Number of `registerHooks` calls so far
    pub fn hook_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Run the resolve chain for `specifier`.
    ///
    /// Ready when every participant answered synchronously, pending otherwise.
    pub fn resolve(&self, specifier: &str, ctx: ResolveContext) -> Deferred<ResolveResult> {
        let weak = Arc::downgrade(&self.inner);
        let terminal: Terminal<ResolveStep> = Arc::new(move |specifier: String, ctx: ResolveContext| {
            let resolved = upgrade(&weak).and_then(|runtime| {
                let inner = &runtime.inner;
                inner
                    .resolver
                    .resolve(&specifier, ctx.parent_url.as_deref(), &ctx.conditions, &inner.fetcher.config())
                    .map(|r| ResolveResult::new(r.url, r.format.map(|f| f.to_string()), None))
            });
            Deferred::Ready(resolved)
        });

        Chain::<ResolveStep>::new(self.inner.registry.resolve_chain(), terminal).run(specifier.to_string(), ctx)
    }

    /// Run the load chain for a resolved URL
    pub fn load(&self, url: &str, ctx: LoadContext) -> Deferred<LoadResult> {
        let weak = Arc::downgrade(&self.inner);
        let terminal: Terminal<LoadStep> = Arc::new(move |url: String, ctx: LoadContext| {
            match upgrade(&weak) {
                Ok(runtime) => runtime.inner.loader.load(&url, &ctx),
                Err(e) => Deferred::Ready(Err(e)),
            }
        });

        Chain::<LoadStep>::new(self.inner.registry.load_chain(), terminal).run(url.to_string(), ctx)
    }

    /// Resolve through the record cache: concurrent and repeated calls with the
    /// same specifier and context run the chain once.
    pub async fn resolve_once(&self, specifier: &str, ctx: ResolveContext) -> Result<ResolveResult> {
        let key = ResolveKey {
            specifier: specifier.to_string(),
            context: ctx.clone(),
        };
        // The chain runs on first poll, outside the cache's shard lock. The
        // cached future holds the runtime weakly since the cache lives inside it.
        let weak = Arc::downgrade(&self.inner);
        let specifier = specifier.to_string();
        self.inner
            .cache
            .resolve(key, move || async move {
                let pending = upgrade(&weak)?.resolve(&specifier, ctx);
                pending.await
            })
            .await
    }

    /// Resolve and load `specifier`, each at most once per URL and conditions.
    #[instrument(skip(self, ctx))]
    pub async fn import(&self, specifier: &str, ctx: ResolveContext) -> Result<Arc<ModuleRecord>> {
        let resolved = self.resolve_once(specifier, ctx.clone()).await?;
        let url = resolved.url().to_string();
        let key = RecordKey {
            url: url.clone(),
            conditions: ctx.conditions.clone(),
        };
        let load_ctx = LoadContext::new(resolved.format().map(str::to_string), ctx.conditions);

        let weak = Arc::downgrade(&self.inner);
        self.inner
            .cache
            .load(key, move || async move {
                debug!("Loading {}", url);
                let pending = upgrade(&weak)?.load(&url, load_ctx);
                let loaded = pending.await?;
                Ok(Arc::new(ModuleRecord {
                    url,
                    format: loaded.format,
                    source: loaded.source,
                }))
            })
            .await
    }

    /// Lifecycle state of a cached module
    pub fn module_state(&self, url: &str, conditions: &[String]) -> Option<ModuleState> {
        self.inner.cache.state(url, conditions)
    }

    /// Parse a package.json file without validating its contents
    pub fn parse_package_json(&self, path: impl AsRef<Path>) -> Result<serde_json::Value> {
        package_json::parse(path.as_ref())
    }

    /// Nearest package.json for `specifier` as seen from `base` (a file URL
    /// or path; the working directory if absent).
    pub fn find_package_json(&self, specifier: &str, base: Option<&str>) -> Result<Option<PathBuf>> {
        let base_dir = match base {
            Some(base) => resolver::containing_dir(url_or_path(base)?),
            None => std::env::current_dir().map_err(|e| ModuleError::io(".", "getcwd", e))?,
        };

        let target = match Specifier::parse(specifier)? {
            Specifier::Relative(relative) => base_dir.join(relative),
            Specifier::Absolute(path) => PathBuf::from(path),
            Specifier::Url(url) if url.starts_with("file:") => url_or_path(url)?,
            Specifier::Bare { .. } | Specifier::PackageImport(_) => {
                let parent = resolver::file_url(&base_dir.join("noop.js"));
                let conditions = self.inner.config.read().conditions.clone();
                let resolved = self.inner.resolver.resolve(
                    specifier,
                    parent.as_deref(),
                    &conditions,
                    &self.inner.fetcher.config(),
                )?;
                url_or_path(&resolved.url)?
            }
            Specifier::Builtin { .. } | Specifier::Url(_) => return Ok(None),
        };

        let start = resolver::containing_dir(target);
        Ok(package_json::find_nearest(&start))
    }

    /// Fetch a remote module through the allow-list and cache
    pub async fn fetch_remote(&self, url: &str) -> Result<RemoteModule> {
        self.inner.fetcher.fetch(url).await
    }

    /// Import counters: loads started, succeeded and failed, record cache hits and misses
    pub fn statistics(&self) -> ModuleStatistics {
        self.inner.cache.statistics()
    }

    /// Remote cache statistics
    pub fn remote_cache_stats(&self) -> CacheStats {
        self.inner.fetcher.stats()
    }

    /// Whether `name` is a runtime-provided module
    pub fn is_builtin(&self, name: &str) -> bool {
        resolver::is_builtin(name)
    }

    /// Names of runtime-provided modules
    pub fn builtin_modules(&self) -> &'static [&'static str] {
        BUILTIN_MODULES
    }

    /// The script-facing `module` object.
    ///
    /// Its functions hold a weak reference; calling them after the runtime
    /// is dropped throws.
    pub fn module_object(&self) -> Value {
        let weak = Arc::downgrade(&self.inner);

        let register = {
            let weak = weak.clone();
            Value::function("registerHooks", move |args| {
                let runtime = upgrade(&weak)?;
                let options = args.into_iter().next().unwrap_or_default();
                runtime.register_hooks(&options).map(|handle| handle.to_value())
            })
        };

        let parse = {
            let weak = weak.clone();
            Value::function("parsePackageJSON", move |args| {
                let runtime = upgrade(&weak)?;
                let path = string_arg(&args, 0, "path")?;
                runtime
                    .parse_package_json(path)
                    .map(|json| Value::from(&json))
            })
        };

        let find = {
            let weak = weak.clone();
            Value::function("findPackageJSON", move |args| {
                let runtime = upgrade(&weak)?;
                let specifier = string_arg(&args, 0, "specifier")?;
                let base = args.get(1).and_then(Value::as_str);
                let found = runtime.find_package_json(specifier, base)?;
                Ok(Value::from(found.map(|p| p.display().to_string())))
            })
        };

        let statistics = {
            let weak = weak.clone();
            Value::function("getStatistics", move |_| {
                Ok(upgrade(&weak)?.statistics().to_value())
            })
        };

        let is_builtin = Value::function("isBuiltin", |args| {
            let name = args.first().and_then(Value::as_str).unwrap_or_default();
            Ok(Value::Boolean(resolver::is_builtin(name)))
        });

        let builtins = Value::Array(BUILTIN_MODULES.iter().map(|name| Value::from(*name)).collect());

        Value::object([
            ("registerHooks", register),
            ("parsePackageJSON", parse),
            ("findPackageJSON", find),
            ("getStatistics", statistics),
            ("isBuiltin", is_builtin),
            ("builtinModules", builtins),
        ])
    }
}

impl std::fmt::Debug for ModuleRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRuntime")
            .field("hooks", &self.inner.registry.len())
            .field("records", &self.inner.cache.len())
            .finish()
    }
}

fn upgrade(weak: &Weak<RuntimeInner>) -> Result<ModuleRuntime> {
    weak.upgrade()
        .map(|inner| ModuleRuntime { inner })
        .ok_or_else(|| ModuleError::thrown("Error: module runtime is no longer available"))
}

fn string_arg<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a str> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s),
        other => Err(ModuleError::type_error(format!(
            "The \"{}\" argument must be of type string, got {}",
            name,
            other.map_or("undefined", Value::type_of)
        ))),
    }
}

/// A `file:` URL or a plain path
fn url_or_path(input: &str) -> Result<PathBuf> {
    if input.starts_with("file:") {
        url::Url::parse(input)
            .ok()
            .and_then(|u| u.to_file_path().ok())
            .ok_or_else(|| ModuleError::type_error(format!("Invalid file URL '{}'", input)))
    } else {
        Ok(PathBuf::from(input))
    }
}

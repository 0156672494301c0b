// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # spacey-loader
//!
//! Hookable module resolution and loading for the Spacey runtime.
//!
//! Every module request, whether a file path, a bare package name or a
//! remote URL, passes through the hooks installed with `registerHooks`
//! before falling through to the built-in resolver and loader:
//!
//! - LIFO resolve/load hook chains with an explicit `next` continuation
//! - Node.js filesystem resolution (`exports`, `imports`, `node_modules`)
//! - Allow-listed `https:` module fetching with an LRU+TTL byte cache
//! - Single-flight caching of resolved and loaded modules
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use spacey_loader::{LoaderConfig, ModuleRuntime, Value};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = ModuleRuntime::new(LoaderConfig::load())?;
//!
//!     runtime.register_hooks(&Value::object([(
//!         "resolve",
//!         Value::function("resolve", |args| {
//!             let specifier = args[0].as_str().unwrap_or_default();
//!             if specifier == "alias" {
//!                 return Ok(Value::from("file:///app/real.js"));
//!             }
//!             match &args[2] {
//!                 Value::Function(next) => next.call(args[..1].to_vec()),
//!                 _ => unreachable!(),
//!             }
//!         }),
//!     )]))?;
//!
//!     let record = runtime.import("./main.js", runtime.context(None)).await?;
//!     println!("{} ({:?})", record.url, record.format);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod deferred;
pub mod error;
pub mod format;
pub mod hooks;
pub mod loader;
pub mod remote;
pub mod resolver;
pub mod runtime;
pub mod value;

// Re-exports
pub use cache::{ModuleRecord, ModuleState, ModuleStatistics};
pub use config::{HttpModuleConfig, LoaderConfig};
pub use deferred::Deferred;
pub use error::{ErrorKind, ModuleError, PolicyViolation, Result};
pub use format::ModuleFormat;
pub use hooks::{
    HookHandle, LoadContext, LoadResult, ModuleSource, ResolveContext, ResolveResult,
};
pub use remote::{HttpClient, HttpResponse, RemoteFetcher, RemoteModule};
pub use runtime::ModuleRuntime;
pub use value::{Promise, Value};

/// Version of the spacey-loader crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

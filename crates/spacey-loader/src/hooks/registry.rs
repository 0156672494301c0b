// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Registered hook pairs

use crate::error::{ModuleError, Result};
use crate::value::{NativeFunction, Value};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// One `registerHooks` call
#[derive(Debug)]
pub struct HookRegistration {
    /// Registration id, increasing with registration order
    pub id: u64,
    /// Resolve interceptor
    pub resolve: Option<Arc<NativeFunction>>,
    /// Load interceptor
    pub load: Option<Arc<NativeFunction>>,
}

/// Returned to the caller of `registerHooks`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookHandle {
    /// Registration id
    pub id: u64,
    /// Whether a resolve hook was installed
    pub resolve: bool,
    /// Whether a load hook was installed
    pub load: bool,
}

impl HookHandle {
    /// `{ id, resolve, load }`
    pub fn to_value(&self) -> Value {
        Value::object([
            ("id", Value::Number(self.id as f64)),
            ("resolve", Value::Boolean(self.resolve)),
            ("load", Value::Boolean(self.load)),
        ])
    }
}

/// Append-only store of hook registrations owned by one runtime.
///
/// Registrations are kept oldest first and visited newest first.
#[derive(Debug)]
pub struct HookRegistry {
    next_id: AtomicU64,
    hooks: RwLock<Vec<Arc<HookRegistration>>>,
}

impl HookRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            hooks: RwLock::new(Vec::new()),
        }
    }

    /// Validate a `registerHooks` options value and append the registration.
    pub fn register(&self, options: &Value) -> Result<HookHandle> {
        let (resolve, load) = match options {
            Value::Undefined => {
                return Err(ModuleError::type_error(
                    "registerHooks() options object is required",
                ));
            }
            Value::Object(_) => (
                hook_option(options, "resolve")?,
                hook_option(options, "load")?,
            ),
            _ => {
                return Err(ModuleError::type_error(
                    "registerHooks() options must be an object",
                ));
            }
        };

        if resolve.is_none() && load.is_none() {
            return Err(ModuleError::type_error(
                "registerHooks() requires at least resolve or load function",
            ));
        }

        let registration = HookRegistration {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            resolve,
            load,
        };
        let handle = HookHandle {
            id: registration.id,
            resolve: registration.resolve.is_some(),
            load: registration.load.is_some(),
        };

        debug!(
            "Registered hooks #{} (resolve: {}, load: {})",
            handle.id, handle.resolve, handle.load
        );
        self.hooks.write().push(Arc::new(registration));
        Ok(handle)
    }

    /// Resolve hooks, newest first, as of now
    pub fn resolve_chain(&self) -> Arc<[Arc<NativeFunction>]> {
        self.snapshot(|r| r.resolve.clone())
    }

    /// Load hooks, newest first, as of now
    pub fn load_chain(&self) -> Arc<[Arc<NativeFunction>]> {
        self.snapshot(|r| r.load.clone())
    }

    fn snapshot<F>(&self, pick: F) -> Arc<[Arc<NativeFunction>]>
    where
        F: Fn(&HookRegistration) -> Option<Arc<NativeFunction>>,
    {
        self.hooks
            .read()
            .iter()
            .rev()
            .filter_map(|registration| pick(registration))
            .collect()
    }

    /// Number of registrations
    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    /// Whether nothing has been registered
    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A callable, or `None` when the option is absent or null
fn hook_option(options: &Value, name: &str) -> Result<Option<Arc<NativeFunction>>> {
    match options.get(name) {
        Value::Function(func) => Ok(Some(func)),
        Value::Undefined | Value::Null => Ok(None),
        _ => Err(ModuleError::type_error(format!(
            "registerHooks() {} option must be a function",
            name
        ))),
    }
}

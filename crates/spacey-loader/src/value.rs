// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Script values crossing the hook boundary.
//!
//! Hooks, their options and their results are values of the embedded
//! language. This is the subset of the engine's value model the module
//! system needs to inspect: plain data, binary buffers, callables and
//! promises.

use crate::error::{ModuleError, Result};
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use indexmap::IndexMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Object properties, in insertion order
pub type ObjectMap = IndexMap<String, Value>;

/// A script value.
#[derive(Clone, Default)]
pub enum Value {
    /// undefined
    #[default]
    Undefined,
    /// null
    Null,
    /// Boolean value
    Boolean(bool),
    /// Number (IEEE 754 double)
    Number(f64),
    /// String
    String(String),
    /// ArrayBuffer / Uint8Array contents
    Bytes(Bytes),
    /// Array
    Array(Vec<Value>),
    /// Plain object
    Object(ObjectMap),
    /// Callable
    Function(Arc<NativeFunction>),
    /// Thenable
    Promise(Promise),
}

/// Signature of a host-callable function
pub type NativeFn = dyn Fn(Vec<Value>) -> Result<Value> + Send + Sync;

/// A callable value
pub struct NativeFunction {
    /// Function name, for diagnostics
    pub name: String,
    func: Box<NativeFn>,
}

impl NativeFunction {
    /// Invoke the function
    pub fn call(&self, args: Vec<Value>) -> Result<Value> {
        (self.func)(args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function: {}]", self.name)
    }
}

/// A promise: a shareable future that settles to a value or an error.
///
/// Cloning a promise does not re-run the work; every clone observes the
/// same settlement.
#[derive(Clone)]
pub struct Promise {
    inner: Shared<BoxFuture<'static, Result<Value>>>,
}

impl Promise {
    /// Wrap a future. A promise that settles to another promise adopts its outcome.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value>> + Send + 'static,
    {
        let settled = async move {
            let mut value = future.await?;
            while let Value::Promise(inner) = value {
                value = inner.await?;
            }
            Ok(value)
        };
        Self {
            inner: settled.boxed().shared(),
        }
    }

    /// An already-fulfilled promise
    pub fn resolve(value: Value) -> Self {
        Self::new(futures::future::ready(Ok(value)))
    }

    /// An already-rejected promise
    pub fn reject(error: ModuleError) -> Self {
        Self::new(futures::future::ready(Err(error)))
    }
}

impl Future for Promise {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Promise { <pending> }")
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => write!(f, "Uint8Array({})", b.len()),
            Value::Array(items) => f.debug_list().entries(items).finish(),
            Value::Object(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Function(func) => write!(f, "{:?}", func),
            Value::Promise(p) => write!(f, "{:?}", p),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Value {
    /// Build a function value from a closure
    pub fn function<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
    {
        Value::Function(Arc::new(NativeFunction {
            name: name.into(),
            func: Box::new(func),
        }))
    }

    /// Build a promise value from a future
    pub fn promise<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value>> + Send + 'static,
    {
        Value::Promise(Promise::new(future))
    }

    /// Build an object from key/value pairs
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns true if this value is undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Returns true if this value is nullish (null or undefined).
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Returns true if this value is a function.
    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    /// Returns true for any non-primitive value.
    pub fn is_object(&self) -> bool {
        matches!(
            self,
            Value::Object(_) | Value::Array(_) | Value::Function(_) | Value::Bytes(_) | Value::Promise(_)
        )
    }

    /// Property lookup; missing properties and non-objects read as undefined.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Object(map) => map.get(key).cloned().unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    /// String contents, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Converts the value to a boolean (ToBoolean).
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => !n.is_nan() && *n != 0.0,
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Returns the type of this value as a string.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Null | Value::Bytes(_) | Value::Array(_) | Value::Object(_) | Value::Promise(_) => {
                "object"
            }
        }
    }

    /// Convert to JSON; functions, promises and undefined become null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::Array(b.iter().map(|byte| (*byte).into()).collect()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            _ => serde_json::Value::Null,
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(arr) => Value::Array(arr.iter().map(Value::from).collect()),
            serde_json::Value::Object(obj) => {
                Value::Object(obj.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(Bytes::from(bytes))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or_default()
    }
}

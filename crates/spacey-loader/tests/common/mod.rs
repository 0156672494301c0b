// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use spacey_loader::{HttpClient, HttpResponse, LoaderConfig, ModuleError, ModuleRuntime, Result, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory HTTP transport that counts requests
#[derive(Default)]
pub struct CountingClient {
    responses: Mutex<HashMap<String, HttpResponse>>,
    calls: AtomicUsize,
}

impl CountingClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, content_type: Option<&str>, body: &str) {
        self.responses.lock().insert(
            url.to_string(),
            HttpResponse {
                status: 200,
                content_type: content_type.map(str::to_string),
                body: Bytes::from(body.to_string()),
            },
        );
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpClient for CountingClient {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.responses
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| ModuleError::network(url, "getaddrinfo ENOTFOUND"))
    }
}

/// Runtime with default configuration over a counting transport
pub fn runtime() -> (ModuleRuntime, Arc<CountingClient>) {
    let client = CountingClient::new();
    let runtime = ModuleRuntime::with_http_client(LoaderConfig::default(), client.clone());
    (runtime, client)
}

/// Call a function value
pub fn call(func: &Value, args: Vec<Value>) -> Result<Value> {
    match func {
        Value::Function(f) => f.call(args),
        other => panic!("expected a function, got {:?}", other),
    }
}

/// Call the `next` argument a hook received, forwarding `args`
pub fn next(hook_args: &[Value], args: Vec<Value>) -> Result<Value> {
    call(&hook_args[2], args)
}

/// `{ resolve: f }`
pub fn resolve_hook<F>(f: F) -> Value
where
    F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
{
    Value::object([("resolve", Value::function("resolve", f))])
}

/// `{ load: f }`
pub fn load_hook<F>(f: F) -> Value
where
    F: Fn(Vec<Value>) -> Result<Value> + Send + Sync + 'static,
{
    Value::object([("load", Value::function("load", f))])
}

/// Settle a value that may be a promise
pub async fn settle(value: Value) -> Result<Value> {
    match value {
        Value::Promise(promise) => promise.await,
        other => Ok(other),
    }
}

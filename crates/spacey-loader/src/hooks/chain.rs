// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! LIFO interceptor chain shared by resolve and load.
//!
//! Link `i` is invoked as `hook(input, context, next)`. `next` runs link
//! `i + 1`; the last link is the built-in terminal, which never delegates.
//! Whether older links run depends only on whether `next` was called.

use crate::deferred::Deferred;
use crate::error::{ModuleError, Result};
use crate::value::{NativeFunction, Value};
use std::sync::Arc;
use tracing::trace;

/// What differs between the resolve and load chains
pub trait ChainStep: Send + Sync + 'static {
    /// Context handed to each hook
    type Context: Clone + Send + Sync + 'static;
    /// Normalized result of a link
    type Output: Send + 'static;

    /// "resolve" or "load"
    const NAME: &'static str;

    /// Context as seen by script code
    fn context_to_value(ctx: &Self::Context) -> Value;

    /// Apply the overrides a hook passed to `next`
    fn merge_context(ctx: &Self::Context, overrides: &Value) -> Result<Self::Context>;

    /// Turn a hook's raw return value into the internal result type
    fn normalize(value: Value, ctx: &Self::Context) -> Result<Self::Output>;

    /// Result as seen by script code (what `next` returns)
    fn output_to_value(output: Self::Output) -> Value;
}

/// Built-in innermost link
pub type Terminal<S> = Arc<
    dyn Fn(String, <S as ChainStep>::Context) -> Deferred<<S as ChainStep>::Output> + Send + Sync,
>;

/// One call's view of the chain: the hooks registered when the call started,
/// newest first, followed by the terminal.
pub struct Chain<S: ChainStep> {
    hooks: Arc<[Arc<NativeFunction>]>,
    terminal: Terminal<S>,
}

impl<S: ChainStep> Chain<S> {
    /// Build a chain over a registry snapshot
    pub fn new(hooks: Arc<[Arc<NativeFunction>]>, terminal: Terminal<S>) -> Arc<Self> {
        Arc::new(Self { hooks, terminal })
    }

    /// Run from the newest hook
    pub fn run(self: Arc<Self>, input: String, ctx: S::Context) -> Deferred<S::Output> {
        self.call(0, input, ctx)
    }

    fn call(self: Arc<Self>, index: usize, input: String, ctx: S::Context) -> Deferred<S::Output> {
        let Some(hook) = self.hooks.get(index).cloned() else {
            trace!("{} terminal for '{}'", S::NAME, input);
            return (self.terminal)(input, ctx);
        };

        trace!("{} hook {} of {} for '{}'", S::NAME, index + 1, self.hooks.len(), input);
        let next = self.next_fn(index + 1, input.clone(), ctx.clone());
        let args = vec![
            Value::String(input),
            S::context_to_value(&ctx),
            next,
        ];

        match hook.call(args) {
            Ok(returned) => Deferred::from_value(returned, move |value| S::normalize(value, &ctx)),
            Err(e) => Deferred::Ready(Err(e)),
        }
    }

    /// The `next` continuation handed to link `index - 1`
    fn next_fn(self: &Arc<Self>, index: usize, input: String, ctx: S::Context) -> Value {
        let chain = Arc::clone(self);
        Value::function(format!("next{}", S::NAME), move |args| {
            let mut args = args.into_iter();
            let input = match args.next() {
                None | Some(Value::Undefined) => input.clone(),
                Some(Value::String(s)) => s,
                Some(other) => {
                    return Err(ModuleError::type_error(format!(
                        "next{}() expects a string as its first argument, got {}",
                        S::NAME,
                        other.type_of()
                    )));
                }
            };
            let ctx = match args.next() {
                None | Some(Value::Undefined) => ctx.clone(),
                Some(overrides) => S::merge_context(&ctx, &overrides)?,
            };

            Arc::clone(&chain)
                .call(index, input, ctx)
                .into_value(S::output_to_value)
        })
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Results that are either available now or settle later.
//!
//! A hook chain stays synchronous as long as every participant answers
//! synchronously. As soon as one link hands back a promise, the remainder of
//! the composition is carried inside a future and the caller receives
//! [`Deferred::Pending`].

use crate::error::Result;
use crate::value::Value;
use futures::future::{BoxFuture, FutureExt};
use std::fmt;
use std::future::IntoFuture;

/// A result that may still be in flight.
pub enum Deferred<T> {
    /// Settled synchronously
    Ready(Result<T>),
    /// Settles when the future completes
    Pending(BoxFuture<'static, Result<T>>),
}

impl<T: Send + 'static> Deferred<T> {
    /// A synchronous success
    pub fn ok(value: T) -> Self {
        Deferred::Ready(Ok(value))
    }

    /// Whether the result is still in flight
    pub fn is_pending(&self) -> bool {
        matches!(self, Deferred::Pending(_))
    }

    /// The synchronous result, or `None` if the result is pending.
    pub fn into_ready(self) -> Option<Result<T>> {
        match self {
            Deferred::Ready(result) => Some(result),
            Deferred::Pending(_) => None,
        }
    }

    /// Lift a hook's raw return value, waiting on it first if it is a promise.
    pub fn from_value<F>(value: Value, normalize: F) -> Self
    where
        F: FnOnce(Value) -> Result<T> + Send + 'static,
    {
        match value {
            Value::Promise(promise) => {
                Deferred::Pending(async move { normalize(promise.await?) }.boxed())
            }
            value => Deferred::Ready(normalize(value)),
        }
    }

    /// Transform a successful result.
    pub fn map<U, F>(self, f: F) -> Deferred<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Result<U> + Send + 'static,
    {
        match self {
            Deferred::Ready(result) => Deferred::Ready(result.and_then(f)),
            Deferred::Pending(fut) => Deferred::Pending(async move { f(fut.await?) }.boxed()),
        }
    }

    /// Chain another step that may itself be deferred.
    pub fn and_then<U, F>(self, f: F) -> Deferred<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Deferred<U> + Send + 'static,
    {
        match self {
            Deferred::Ready(Ok(value)) => f(value),
            Deferred::Ready(Err(e)) => Deferred::Ready(Err(e)),
            Deferred::Pending(fut) => Deferred::Pending(
                async move {
                    let value = fut.await?;
                    f(value).await
                }
                .boxed(),
            ),
        }
    }

    /// Hand the result back to script code: a plain value, a thrown error,
    /// or a promise when the result is still pending.
    pub fn into_value<F>(self, to_value: F) -> Result<Value>
    where
        F: FnOnce(T) -> Value + Send + 'static,
    {
        match self {
            Deferred::Ready(result) => result.map(to_value),
            Deferred::Pending(fut) => Ok(Value::promise(async move { fut.await.map(to_value) })),
        }
    }
}

impl<T: Send + 'static> IntoFuture for Deferred<T> {
    type Output = Result<T>;
    type IntoFuture = BoxFuture<'static, Result<T>>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Deferred::Ready(result) => futures::future::ready(result).boxed(),
            Deferred::Pending(fut) => fut,
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deferred::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Deferred::Pending(_) => f.write_str("Pending"),
        }
    }
}

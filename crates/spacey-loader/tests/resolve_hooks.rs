// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

mod common;

use common::{call, next, resolve_hook, runtime, settle};
use parking_lot::Mutex;
use spacey_loader::{ModuleError, ResolveContext, ResolveResult, Value};
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::tempdir;

fn ctx() -> ResolveContext {
    ResolveContext::new(Some("file:///app/main.js".into()), vec!["node".into(), "import".into()])
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

#[test]
fn test_hooks_run_newest_first_until_one_stops() {
    let (rt, _) = runtime();
    let order = Arc::new(Mutex::new(Vec::new()));

    for label in ["first", "second", "third"] {
        let order = order.clone();
        rt.register_hooks(&resolve_hook(move |args| {
            order.lock().push(label);
            if label == "first" {
                return Ok(Value::from("virtual:end"));
            }
            next(&args, vec![])
        }))
        .unwrap();
    }

    let result = rt.resolve("x", ctx()).into_ready().unwrap().unwrap();
    assert_eq!(result.url(), "virtual:end");
    assert_eq!(*order.lock(), vec!["third", "second", "first"]);
}

#[test]
fn test_short_circuit_skips_older_hooks_and_terminal() {
    let (rt, _) = runtime();
    let older = counter();

    let seen = older.clone();
    rt.register_hooks(&resolve_hook(move |args| {
        seen.fetch_add(1, Ordering::SeqCst);
        next(&args, vec![])
    }))
    .unwrap();
    rt.register_hooks(&resolve_hook(|_| {
        Ok(Value::object([
            ("url", Value::from("virtual:done")),
            ("shortCircuit", Value::Boolean(true)),
        ]))
    }))
    .unwrap();

    // The terminal would reject this bare name; success proves it never ran.
    let result = rt.resolve("not-a-package", ctx()).into_ready().unwrap().unwrap();
    assert_eq!(result.url(), "virtual:done");
    assert_eq!(result.short_circuit(), Some(true));
    assert_eq!(older.load(Ordering::SeqCst), 0);
}

#[test]
fn test_alias_and_intercept_scenario() {
    let (rt, _) = runtime();
    let a_calls = counter();
    let b_calls = counter();

    let a_seen = a_calls.clone();
    let a = rt
        .register_hooks(&resolve_hook(move |args| {
            a_seen.fetch_add(1, Ordering::SeqCst);
            if args[0].as_str() == Some("alias") {
                return Ok(Value::object([
                    ("url", Value::from("virtual:a")),
                    ("shortCircuit", Value::Boolean(true)),
                ]));
            }
            next(&args, vec![])
        }))
        .unwrap();

    let b_seen = b_calls.clone();
    let b = rt
        .register_hooks(&resolve_hook(move |args| {
            b_seen.fetch_add(1, Ordering::SeqCst);
            if args[0].as_str() == Some("intercept-me") {
                return Ok(Value::object([
                    ("url", Value::from("virtual:b")),
                    ("shortCircuit", Value::Boolean(true)),
                ]));
            }
            next(&args, vec![])
        }))
        .unwrap();
    assert!(b.id > a.id);

    let alias = rt.resolve("alias", ctx()).into_ready().unwrap().unwrap();
    assert_eq!(alias.url(), "virtual:a");
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);

    let intercepted = rt.resolve("intercept-me", ctx()).into_ready().unwrap().unwrap();
    assert_eq!(intercepted.url(), "virtual:b");
    assert_eq!(b_calls.load(Ordering::SeqCst), 2);
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_thrown_error_aborts_chain_verbatim() {
    let (rt, _) = runtime();
    let older = counter();

    let seen = older.clone();
    rt.register_hooks(&resolve_hook(move |args| {
        seen.fetch_add(1, Ordering::SeqCst);
        next(&args, vec![])
    }))
    .unwrap();
    rt.register_hooks(&resolve_hook(|_| Err(ModuleError::thrown("Error: blocked by policy"))))
        .unwrap();

    let err = rt.resolve("x", ctx()).into_ready().unwrap().unwrap_err();
    assert_eq!(err.to_string(), "Error: blocked by policy");
    assert_eq!(older.load(Ordering::SeqCst), 0);
}

#[test]
fn test_next_forwards_modified_specifier_and_context() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("real.js"), "export {}").unwrap();
    let parent = url::Url::from_file_path(dir.path().join("main.js")).unwrap().to_string();

    let (rt, _) = runtime();
    let seen_conditions = Arc::new(Mutex::new(Value::Undefined));

    let seen = seen_conditions.clone();
    rt.register_hooks(&resolve_hook(move |args| {
        *seen.lock() = args[1].get("conditions");
        next(&args, vec![])
    }))
    .unwrap();
    rt.register_hooks(&resolve_hook(|args| {
        next(
            &args,
            vec![
                Value::from("./real.js"),
                Value::object([("conditions", Value::Array(vec![Value::from("custom")]))]),
            ],
        )
    }))
    .unwrap();

    let result = rt
        .resolve("./virtual-name.js", rt.context(Some(&parent)))
        .into_ready()
        .unwrap()
        .unwrap();
    assert!(result.url().ends_with("/real.js"));
    assert_eq!(result.format(), Some("module"));
    assert_eq!(*seen_conditions.lock(), Value::Array(vec![Value::from("custom")]));
}

#[test]
fn test_malformed_hook_result_is_a_type_error() {
    let (rt, _) = runtime();
    rt.register_hooks(&resolve_hook(|_| Ok(Value::Number(42.0)))).unwrap();

    let err = rt.resolve("x", ctx()).into_ready().unwrap().unwrap_err();
    assert!(err.to_string().starts_with("TypeError"));
}

#[test]
fn test_registration_during_a_call_applies_to_the_next_call() {
    let (rt, _) = runtime();
    let register = rt.module_object().get("registerHooks");
    let registered = Arc::new(AtomicUsize::new(0));

    let done = registered.clone();
    rt.register_hooks(&resolve_hook(move |_| {
        if done.fetch_add(1, Ordering::SeqCst) == 0 {
            call(
                &register,
                vec![resolve_hook(|_| Ok(Value::from("virtual:late")))],
            )?;
        }
        Ok(Value::from("virtual:early"))
    }))
    .unwrap();

    let first = rt.resolve("x", ctx()).into_ready().unwrap().unwrap();
    assert_eq!(first.url(), "virtual:early");
    assert_eq!(rt.hook_count(), 2);

    let second = rt.resolve("x", ctx()).into_ready().unwrap().unwrap();
    assert_eq!(second.url(), "virtual:late");
}

#[tokio::test]
async fn test_async_hook_makes_resolve_pending() {
    let (rt, _) = runtime();
    rt.register_hooks(&resolve_hook(|args| {
        Ok(Value::promise(async move {
            tokio::task::yield_now().await;
            let specifier = args[0].as_str().unwrap_or_default().to_string();
            Ok(Value::from(format!("virtual:{}", specifier)))
        }))
    }))
    .unwrap();

    let deferred = rt.resolve("lazy", ctx());
    assert!(deferred.is_pending());
    assert_eq!(deferred.await.unwrap().url(), "virtual:lazy");
}

#[tokio::test]
async fn test_sync_hook_over_async_hook_sees_a_promise_from_next() {
    let (rt, _) = runtime();
    rt.register_hooks(&resolve_hook(|_| {
        Ok(Value::promise(async { Ok(Value::from("virtual:inner")) }))
    }))
    .unwrap();

    let saw_promise = Arc::new(AtomicUsize::new(0));
    let seen = saw_promise.clone();
    rt.register_hooks(&resolve_hook(move |args| {
        let result = next(&args, vec![])?;
        if matches!(result, Value::Promise(_)) {
            seen.fetch_add(1, Ordering::SeqCst);
        }
        Ok(result)
    }))
    .unwrap();

    let result = rt.resolve("x", ctx()).await.unwrap();
    assert_eq!(result.url(), "virtual:inner");
    assert_eq!(saw_promise.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_async_hook_returning_next_over_async_hook() {
    let (rt, _) = runtime();
    rt.register_hooks(&resolve_hook(|_| {
        Ok(Value::promise(async {
            tokio::task::yield_now().await;
            Ok(Value::from("virtual:a"))
        }))
    }))
    .unwrap();
    rt.register_hooks(&resolve_hook(|args| {
        Ok(Value::promise(async move { next(&args, vec![]) }))
    }))
    .unwrap();

    let result = rt.resolve("x", ctx()).await.unwrap();
    assert_eq!(result.url(), "virtual:a");

    let (a, b) = tokio::join!(rt.resolve_once("x", ctx()), rt.resolve_once("x", ctx()));
    assert_eq!(a.unwrap(), b.unwrap());
}

#[tokio::test]
async fn test_rejection_skips_older_hooks() {
    let (rt, _) = runtime();
    let older = counter();

    let seen = older.clone();
    rt.register_hooks(&resolve_hook(move |args| {
        seen.fetch_add(1, Ordering::SeqCst);
        next(&args, vec![])
    }))
    .unwrap();
    rt.register_hooks(&resolve_hook(|_| {
        Ok(Value::promise(async {
            Err::<Value, _>(ModuleError::thrown("Error: async failure"))
        }))
    }))
    .unwrap();

    let err = rt.resolve("x", ctx()).await.unwrap_err();
    assert_eq!(err.to_string(), "Error: async failure");
    assert_eq!(older.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_hook_can_catch_and_substitute() {
    let (rt, _) = runtime();
    rt.register_hooks(&resolve_hook(|args| {
        let attempted = settle(next(&args, vec![]).unwrap_or(Value::Undefined));
        Ok(Value::promise(async move {
            match attempted.await {
                Ok(Value::Undefined) | Err(_) => Ok(Value::from("virtual:fallback")),
                Ok(other) => Ok(other),
            }
        }))
    }))
    .unwrap();

    let result = rt.resolve("./does-not-exist", ctx()).await.unwrap();
    assert_eq!(result, ResolveResult::new("virtual:fallback", None, None));
}

#[tokio::test]
async fn test_concurrent_resolves_run_the_chain_once() {
    let (rt, _) = runtime();
    let runs = counter();

    let seen = runs.clone();
    rt.register_hooks(&resolve_hook(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(Value::promise(async {
            tokio::task::yield_now().await;
            Ok(Value::from("virtual:shared"))
        }))
    }))
    .unwrap();

    let (a, b) = tokio::join!(rt.resolve_once("dep", ctx()), rt.resolve_once("dep", ctx()));
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    rt.resolve_once("dep", ctx()).await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_failures_are_shared() {
    let (rt, _) = runtime();
    let runs = counter();

    let seen = runs.clone();
    rt.register_hooks(&resolve_hook(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(Value::promise(async {
            tokio::task::yield_now().await;
            Err::<Value, _>(ModuleError::thrown("Error: flaky"))
        }))
    }))
    .unwrap();

    let (a, b) = tokio::join!(rt.resolve_once("dep", ctx()), rt.resolve_once("dep", ctx()));
    assert_eq!(a.unwrap_err().to_string(), "Error: flaky");
    assert_eq!(b.unwrap_err().to_string(), "Error: flaky");
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Failed attempts are not memoized.
    assert!(rt.resolve_once("dep", ctx()).await.is_err());
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

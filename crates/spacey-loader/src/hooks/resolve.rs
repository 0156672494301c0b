// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Resolve hook types and result normalization

use super::chain::ChainStep;
use crate::error::{ModuleError, Result};
use crate::value::Value;

/// Context passed to resolve hooks
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolveContext {
    /// URL of the importing module
    pub parent_url: Option<String>,
    /// Active export conditions, in priority order
    pub conditions: Vec<String>,
}

impl ResolveContext {
    /// Context for an import from `parent_url`
    pub fn new(parent_url: Option<String>, conditions: Vec<String>) -> Self {
        Self {
            parent_url,
            conditions,
        }
    }

    /// `{ parentURL, conditions }`
    pub fn to_value(&self) -> Value {
        Value::object([
            ("parentURL", Value::from(self.parent_url.clone())),
            ("conditions", strings_to_value(&self.conditions)),
        ])
    }

    /// Copy with the fields present in `overrides` replaced
    pub fn merged(&self, overrides: &Value) -> Result<Self> {
        if !matches!(overrides, Value::Object(_)) {
            return Err(ModuleError::type_error("nextResolve() context must be an object"));
        }

        let mut ctx = self.clone();
        match overrides.get("parentURL") {
            Value::Undefined => {}
            Value::Null => ctx.parent_url = None,
            Value::String(url) => ctx.parent_url = Some(url),
            other => {
                return Err(ModuleError::type_error(format!(
                    "context.parentURL must be a string, got {}",
                    other.type_of()
                )));
            }
        }
        if let Some(conditions) = conditions_override(overrides)? {
            ctx.conditions = conditions;
        }
        Ok(ctx)
    }
}

/// A normalized resolve result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveResult {
    /// Only a URL was given
    Url {
        /// Canonical URL
        url: String,
        /// Hook's short-circuit declaration
        short_circuit: Option<bool>,
    },
    /// A URL with a format hint
    UrlWithFormat {
        /// Canonical URL
        url: String,
        /// Format hint
        format: String,
        /// Hook's short-circuit declaration
        short_circuit: Option<bool>,
    },
}

impl ResolveResult {
    /// Build from a URL and optional format
    pub fn new(url: impl Into<String>, format: Option<String>, short_circuit: Option<bool>) -> Self {
        let url = url.into();
        match format {
            Some(format) => ResolveResult::UrlWithFormat {
                url,
                format,
                short_circuit,
            },
            None => ResolveResult::Url { url, short_circuit },
        }
    }

    /// Canonical URL
    pub fn url(&self) -> &str {
        match self {
            ResolveResult::Url { url, .. } | ResolveResult::UrlWithFormat { url, .. } => url,
        }
    }

    /// Format hint
    pub fn format(&self) -> Option<&str> {
        match self {
            ResolveResult::Url { .. } => None,
            ResolveResult::UrlWithFormat { format, .. } => Some(format),
        }
    }

    /// Short-circuit flag as returned by the hook
    pub fn short_circuit(&self) -> Option<bool> {
        match self {
            ResolveResult::Url { short_circuit, .. }
            | ResolveResult::UrlWithFormat { short_circuit, .. } => *short_circuit,
        }
    }

    /// Normalize a hook's return value: a URL string or
    /// `{ url, format?, shortCircuit? }`.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(url) if !url.is_empty() => Ok(ResolveResult::Url {
                url,
                short_circuit: None,
            }),
            Value::Object(_) => {
                let url = match value.get("url") {
                    Value::String(url) if !url.is_empty() => url,
                    other => {
                        return Err(ModuleError::type_error(format!(
                            "resolve hook result must have a non-empty string 'url', got {}",
                            other.type_of()
                        )));
                    }
                };
                let format = optional_string(&value, "format", "resolve")?;
                let short_circuit = optional_bool(&value);
                Ok(Self::new(url, format, short_circuit))
            }
            other => Err(ModuleError::type_error(format!(
                "resolve hook must return an object with a 'url' property, got {}",
                other.type_of()
            ))),
        }
    }

    /// `{ url, format?, shortCircuit? }`
    pub fn to_value(&self) -> Value {
        let mut entries = vec![("url", Value::from(self.url()))];
        if let Some(format) = self.format() {
            entries.push(("format", Value::from(format)));
        }
        if let Some(short_circuit) = self.short_circuit() {
            entries.push(("shortCircuit", Value::Boolean(short_circuit)));
        }
        Value::object(entries)
    }
}

/// Resolve flavor of the chain
pub struct ResolveStep;

impl ChainStep for ResolveStep {
    type Context = ResolveContext;
    type Output = ResolveResult;

    const NAME: &'static str = "Resolve";

    fn context_to_value(ctx: &ResolveContext) -> Value {
        ctx.to_value()
    }

    fn merge_context(ctx: &ResolveContext, overrides: &Value) -> Result<ResolveContext> {
        ctx.merged(overrides)
    }

    fn normalize(value: Value, _ctx: &ResolveContext) -> Result<ResolveResult> {
        ResolveResult::from_value(value)
    }

    fn output_to_value(output: ResolveResult) -> Value {
        output.to_value()
    }
}

pub(crate) fn strings_to_value(items: &[String]) -> Value {
    Value::Array(items.iter().map(|s| Value::from(s.as_str())).collect())
}

/// `conditions` from a context override, if present
pub(crate) fn conditions_override(overrides: &Value) -> Result<Option<Vec<String>>> {
    match overrides.get("conditions") {
        Value::Undefined => Ok(None),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(ModuleError::type_error(format!(
                    "context.conditions must contain only strings, got {}",
                    other.type_of()
                ))),
            })
            .collect::<Result<Vec<_>>>()
            .map(Some),
        other => Err(ModuleError::type_error(format!(
            "context.conditions must be an array, got {}",
            other.type_of()
        ))),
    }
}

/// A string property, treating null and undefined as absent
pub(crate) fn optional_string(value: &Value, key: &str, hook: &str) -> Result<Option<String>> {
    match value.get(key) {
        Value::Undefined | Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        other => Err(ModuleError::type_error(format!(
            "{} hook result '{}' must be a string, got {}",
            hook,
            key,
            other.type_of()
        ))),
    }
}

/// `shortCircuit`, coerced like a script truthiness test when present
pub(crate) fn optional_bool(value: &Value) -> Option<bool> {
    match value.get("shortCircuit") {
        Value::Undefined => None,
        other => Some(other.to_boolean()),
    }
}

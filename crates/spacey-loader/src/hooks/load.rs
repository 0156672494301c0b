// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Load hook types and result normalization

use super::chain::ChainStep;
use super::resolve::{conditions_override, optional_bool, optional_string, strings_to_value};
use crate::error::{ModuleError, Result};
use crate::value::Value;
use bytes::Bytes;

/// Context passed to load hooks
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadContext {
    /// Format hint from resolution
    pub format: Option<String>,
    /// Active export conditions
    pub conditions: Vec<String>,
}

impl LoadContext {
    /// Create a load context
    pub fn new(format: Option<String>, conditions: Vec<String>) -> Self {
        Self { format, conditions }
    }

    /// `{ format, conditions }`
    pub fn to_value(&self) -> Value {
        Value::object([
            ("format", Value::from(self.format.clone())),
            ("conditions", strings_to_value(&self.conditions)),
        ])
    }

    /// Copy with the fields present in `overrides` replaced
    pub fn merged(&self, overrides: &Value) -> Result<Self> {
        if !matches!(overrides, Value::Object(_)) {
            return Err(ModuleError::type_error("nextLoad() context must be an object"));
        }

        let mut ctx = self.clone();
        match overrides.get("format") {
            Value::Undefined => {}
            Value::Null => ctx.format = None,
            Value::String(format) => ctx.format = Some(format),
            other => {
                return Err(ModuleError::type_error(format!(
                    "context.format must be a string, got {}",
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

/// Module source: text or raw bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    /// Source text
    Text(String),
    /// Binary contents (ArrayBuffer / Uint8Array)
    Binary(Bytes),
}

impl ModuleSource {
    /// Length in bytes
    pub fn len(&self) -> usize {
        match self {
            ModuleSource::Text(text) => text.len(),
            ModuleSource::Binary(bytes) => bytes.len(),
        }
    }

    /// Whether the source is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text contents, if textual
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ModuleSource::Text(text) => Some(text),
            ModuleSource::Binary(_) => None,
        }
    }

    /// Raw bytes of either variant
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ModuleSource::Text(text) => text.as_bytes(),
            ModuleSource::Binary(bytes) => &bytes[..],
        }
    }

    /// Script value for this source
    pub fn to_value(&self) -> Value {
        match self {
            ModuleSource::Text(text) => Value::from(text.as_str()),
            ModuleSource::Binary(bytes) => Value::Bytes(bytes.clone()),
        }
    }
}

/// A normalized load result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult {
    /// Module format
    pub format: Option<String>,
    /// Module source
    pub source: ModuleSource,
    /// Hook's short-circuit declaration
    pub short_circuit: Option<bool>,
}

impl LoadResult {
    /// Normalize a hook's return value.
    ///
    /// A bare string is shorthand for
    /// `{ format: context.format, source: string, shortCircuit: true }`.
    /// An object without a `format` inherits the context's.
    pub fn from_value(value: Value, ctx: &LoadContext) -> Result<Self> {
        match value {
            Value::String(source) => Ok(LoadResult {
                format: ctx.format.clone(),
                source: ModuleSource::Text(source),
                short_circuit: Some(true),
            }),
            Value::Object(_) => {
                let source = match value.get("source") {
                    Value::String(text) => ModuleSource::Text(text),
                    Value::Bytes(bytes) => ModuleSource::Binary(bytes),
                    other => {
                        return Err(ModuleError::type_error(format!(
                            "load hook result 'source' must be a string or binary buffer, got {}",
                            other.type_of()
                        )));
                    }
                };
                let format = optional_string(&value, "format", "load")?.or_else(|| ctx.format.clone());
                Ok(LoadResult {
                    format,
                    source,
                    short_circuit: optional_bool(&value),
                })
            }
            other => Err(ModuleError::type_error(format!(
                "load hook must return an object with a 'source' property or a string, got {}",
                other.type_of()
            ))),
        }
    }

    /// `{ format, source, shortCircuit? }`
    pub fn to_value(&self) -> Value {
        let mut entries = vec![
            ("format", Value::from(self.format.clone())),
            ("source", self.source.to_value()),
        ];
        if let Some(short_circuit) = self.short_circuit {
            entries.push(("shortCircuit", Value::Boolean(short_circuit)));
        }
        Value::object(entries)
    }
}

/// Load flavor of the chain
pub struct LoadStep;

impl ChainStep for LoadStep {
    type Context = LoadContext;
    type Output = LoadResult;

    const NAME: &'static str = "Load";

    fn context_to_value(ctx: &LoadContext) -> Value {
        ctx.to_value()
    }

    fn merge_context(ctx: &LoadContext, overrides: &Value) -> Result<LoadContext> {
        ctx.merged(overrides)
    }

    fn normalize(value: Value, ctx: &LoadContext) -> Result<LoadResult> {
        LoadResult::from_value(value, ctx)
    }

    fn output_to_value(output: LoadResult) -> Value {
        output.to_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(format: Option<&str>) -> LoadContext {
        LoadContext::new(format.map(str::to_string), vec!["node".into()])
    }

    #[test]
    fn test_bare_string_is_legacy_shorthand() {
        let source = "export const legacy = true;";
        let shorthand = LoadResult::from_value(Value::from(source), &ctx(Some("module"))).unwrap();
        let explicit = LoadResult::from_value(
            Value::object([
                ("format", Value::from("module")),
                ("source", Value::from(source)),
                ("shortCircuit", Value::Boolean(true)),
            ]),
            &ctx(Some("module")),
        )
        .unwrap();
        assert_eq!(shorthand, explicit);
    }

    #[test]
    fn test_binary_source() {
        let result = LoadResult::from_value(
            Value::object([
                ("format", Value::from("wasm")),
                ("source", Value::from(vec![0u8, 0x61, 0x73, 0x6d])),
            ]),
            &ctx(None),
        )
        .unwrap();
        assert_eq!(result.source, ModuleSource::Binary(Bytes::from_static(b"\0asm")));
        assert_eq!(result.short_circuit, None);
        assert_eq!(result.source.as_text(), None);
    }

    #[test]
    fn test_missing_format_inherits_context() {
        let result = LoadResult::from_value(
            Value::object([("source", Value::from("x"))]),
            &ctx(Some("commonjs")),
        )
        .unwrap();
        assert_eq!(result.format.as_deref(), Some("commonjs"));
    }

    #[test]
    fn test_malformed_results() {
        for bad in [
            Value::Undefined,
            Value::Number(3.0),
            Value::object([("format", Value::from("module"))]),
            Value::object([("source", Value::Number(1.0))]),
        ] {
            assert!(LoadResult::from_value(bad, &ctx(None)).is_err());
        }
    }
}

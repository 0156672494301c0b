// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for module resolution and loading

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type for module system operations
pub type Result<T> = std::result::Result<T, ModuleError>;

/// Errors that can occur while resolving or loading a module.
///
/// The type is `Clone` because one failure may be observed by several
/// waiters (single-flight cache entries, shared promises).
#[derive(Debug, Clone, Error)]
pub enum ModuleError {
    /// Malformed arguments or malformed hook results
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Terminal resolution failed
    #[error("Cannot find module '{specifier}'{}", parent_suffix(.parent))]
    ModuleNotFound {
        /// Module specifier
        specifier: String,
        /// URL of the requesting module, if any
        parent: Option<String>,
    },

    /// Reading a file failed
    #[error("{syscall}: failed to read file '{}': {source}", .path.display())]
    Io {
        /// Path that could not be read
        path: PathBuf,
        /// Conceptual syscall that failed
        syscall: &'static str,
        /// Underlying error
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Malformed JSON or source text
    #[error("SyntaxError: {message} in '{}'", .path.display())]
    Syntax {
        /// File being parsed
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Remote module rejected by policy before any network I/O
    #[error("Failed to load module from {url}: {violation}")]
    Policy {
        /// Requested URL
        url: String,
        /// Which rule was violated
        violation: PolicyViolation,
    },

    /// DNS, connection, timeout or non-2xx failure
    #[error("Failed to fetch module from {url}: {cause}")]
    Network {
        /// Requested URL
        url: String,
        /// Underlying cause
        cause: String,
    },

    /// Error thrown by a user hook, surfaced verbatim
    #[error("{0}")]
    Thrown(String),
}

fn parent_suffix(parent: &Option<String>) -> String {
    match parent {
        Some(parent) => format!(" imported from {}", parent),
        None => String::new(),
    }
}

/// Remote-loading policy rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyViolation {
    /// Remote loading switched off
    Disabled,
    /// Scheme not permitted (e.g. `http:` under https-only)
    ProtocolNotAllowed,
    /// Host missing from the allow-list
    DomainNotAllowed,
    /// Not an http(s) URL, or no host
    InvalidUrl,
    /// Response body over the configured limit
    TooLarge,
    /// Response content type is not a module type
    InvalidContentType,
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            PolicyViolation::Disabled => "HTTP module loading is disabled",
            PolicyViolation::ProtocolNotAllowed => "protocol not allowed",
            PolicyViolation::DomainNotAllowed => "Domain not in allowlist",
            PolicyViolation::InvalidUrl => "Invalid URL format",
            PolicyViolation::TooLarge => "Module too large",
            PolicyViolation::InvalidContentType => "Invalid content type",
        };
        f.write_str(msg)
    }
}

/// Error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad arguments or hook result shapes
    Validation,
    /// Terminal resolution failure
    NotFound,
    /// File read failure
    Io,
    /// Malformed JSON or source
    Syntax,
    /// Security policy rejection
    Policy,
    /// Network failure
    Network,
    /// Raised by a user hook
    Hook,
}

impl ModuleError {
    /// Create a new TypeError
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a module not found error
    pub fn not_found(specifier: impl Into<String>, parent: Option<&str>) -> Self {
        Self::ModuleNotFound {
            specifier: specifier.into(),
            parent: parent.map(str::to_string),
        }
    }

    /// Create a read failure for `path`
    pub fn io(path: impl Into<PathBuf>, syscall: &'static str, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            syscall,
            source: Arc::new(source),
        }
    }

    /// Create a policy rejection for `url`
    pub fn policy(url: impl Into<String>, violation: PolicyViolation) -> Self {
        Self::Policy {
            url: url.into(),
            violation,
        }
    }

    /// Create a network failure for `url`
    pub fn network(url: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self::Network {
            url: url.into(),
            cause: cause.to_string(),
        }
    }

    /// Create an error as thrown by a hook
    pub fn thrown(msg: impl Into<String>) -> Self {
        Self::Thrown(msg.into())
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModuleError::TypeError(_) => ErrorKind::Validation,
            ModuleError::ModuleNotFound { .. } => ErrorKind::NotFound,
            ModuleError::Io { .. } => ErrorKind::Io,
            ModuleError::Syntax { .. } => ErrorKind::Syntax,
            ModuleError::Policy { .. } => ErrorKind::Policy,
            ModuleError::Network { .. } => ErrorKind::Network,
            ModuleError::Thrown(_) => ErrorKind::Hook,
        }
    }

    /// Whether this is a security-policy rejection
    pub fn is_policy(&self) -> bool {
        self.kind() == ErrorKind::Policy
    }

    /// Whether this is a network failure
    pub fn is_network(&self) -> bool {
        self.kind() == ErrorKind::Network
    }
}

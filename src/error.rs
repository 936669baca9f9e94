//! Error types for the storage adapters.
//!
//! This module provides structured errors for construction and per-operation
//! failures, enabling callers to distinguish "absent value" (`Ok(None)` at the
//! `get` boundary) from real backend errors.

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error source from an underlying storage engine.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Storage errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Table or bucket name failed validation. Fatal to construction,
    /// never retried.
    #[error("invalid {role} name '{name}': only ASCII letters, digits, and underscore allowed")]
    InvalidIdentifier { role: &'static str, name: String },

    /// Schema or engine bootstrap failed. Fatal to construction; no
    /// partially usable handle is returned.
    #[error("failed to {step} for '{target}': {source}")]
    Bootstrap {
        step: String,
        target: String,
        #[source]
        source: BoxError,
    },

    /// An engine error during an operation, wrapped with operation context.
    #[error("{op} failed: {source}")]
    Backend {
        op: String,
        #[source]
        source: BoxError,
    },

    /// Operation attempted on a closed store.
    #[error("store is closed")]
    Closed,

    /// System clock reports a time before the Unix epoch.
    #[error("system time before UNIX epoch")]
    Clock,
}

impl Error {
    /// Create a bootstrap error with step and target context.
    pub fn bootstrap(
        step: impl Into<String>,
        target: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Bootstrap {
            step: step.into(),
            target: target.into(),
            source: source.into(),
        }
    }

    /// Create a backend error with operation context.
    pub fn backend(op: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Backend {
            op: op.into(),
            source: source.into(),
        }
    }

    /// Create an invalid identifier error.
    pub fn invalid_identifier(role: &'static str, name: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            role,
            name: name.into(),
        }
    }
}

//! Error types for LeadScout.
//!
//! Library crates use [`LeadScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all LeadScout operations.
#[derive(Debug, thiserror::Error)]
pub enum LeadScoutError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error outside of a per-record search (e.g. client setup).
    #[error("network error: {0}")]
    Network(String),

    /// Input parsing error (CSV rows, HTML, JSON documents).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Progress store failure. Fatal to an enrichment run.
    #[error("storage error: {0}")]
    Storage(String),

    /// A search source could not be opened or used at all.
    #[error("source error: {0}")]
    Source(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad bounds, unsupported input format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LeadScoutError>;

impl LeadScoutError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must abort an enrichment run.
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io { .. })
    }
}

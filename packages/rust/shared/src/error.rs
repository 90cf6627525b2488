//! Error types for seolens.
//!
//! Library crates use [`SeolensError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Propagation policy: `Fetch` errors are absorbed per-page and reflected in
//! page data; `StageFailure` terminates the audit; `StoreConflict` is retried
//! internally against fresh state and only escalates when retries exhaust.

use std::path::PathBuf;

use crate::types::Stage;

/// Top-level error type for all seolens operations.
#[derive(Debug, thiserror::Error)]
pub enum SeolensError {
    /// Bad URL or request input, rejected before any state is created.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Per-page fetch failure (non-2xx, timeout, transport error). Recorded
    /// as a `fail`-status page, never aborts the audit.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// A whole-stage precondition cannot be met; aborts the audit.
    #[error("stage {stage} failed: {reason}")]
    StageFailure { stage: Stage, reason: String },

    /// Optimistic-update race: the record changed under us.
    #[error("store conflict on {id}: expected version {expected}")]
    StoreConflict { id: String, expected: u64 },

    /// No record with the given id.
    #[error("not found: {id}")]
    NotFound { id: String },

    /// User-requested cancellation. Terminal, not an error from the caller's
    /// perspective.
    #[error("audit cancelled")]
    Cancelled,

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// HTML or structured-data parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SeolensError>;

impl SeolensError {
    /// Create an invalid-input error from any displayable message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

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

    /// Create a not-found error for the given id.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a stage failure for the given stage.
    pub fn stage_failure(stage: Stage, reason: impl Into<String>) -> Self {
        Self::StageFailure {
            stage,
            reason: reason.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

//! Compilation error taxonomy.
//!
//! User errors (validation, rewrite, unsupported feature, cancellation) are
//! kept apart from [`CompileError::Invariant`], which signals a defect in the
//! compiler itself.

use crate::rewrite::{RewriteError, RewritePass};
use crate::translate::TranslateError;
use crate::validation::ValidationError;

/// Errors that can occur during compilation.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("{pass} pass failed: {source}")]
    Rewrite {
        pass: RewritePass,
        #[source]
        source: RewriteError,
    },

    #[error("{feature} is not supported by the {dialect} dialect")]
    Unsupported { dialect: String, feature: String },

    #[error("internal compiler error: {0}")]
    Invariant(String),

    #[error("compilation cancelled: {0}")]
    Cancelled(String),
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Coarse classification for logs and telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Rewrite,
    Unsupported,
    Invariant,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Rewrite => "rewrite",
            ErrorKind::Unsupported => "unsupported",
            ErrorKind::Invariant => "invariant",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl CompileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::Validation(_) => ErrorKind::Validation,
            CompileError::Rewrite { .. } => ErrorKind::Rewrite,
            CompileError::Unsupported { .. } => ErrorKind::Unsupported,
            CompileError::Invariant(_) => ErrorKind::Invariant,
            CompileError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// True for compiler defects, false for anything the caller caused.
    pub fn is_internal(&self) -> bool {
        matches!(self, CompileError::Invariant(_))
    }

    pub fn unsupported(dialect: &str, feature: impl Into<String>) -> Self {
        CompileError::Unsupported {
            dialect: dialect.to_string(),
            feature: feature.into(),
        }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!(target: "metricsql::compile", error = %msg, "compiler invariant violated");
        CompileError::Invariant(msg)
    }

    /// Wrap a pass failure. Cancellation keeps its own kind so callers can
    /// tell an aborted request from a failed one.
    pub fn from_pass(pass: RewritePass, source: RewriteError) -> Self {
        match source {
            RewriteError::Cancelled(reason) => {
                CompileError::Cancelled(format!("{pass} pass: {reason}"))
            }
            source => CompileError::Rewrite { pass, source },
        }
    }
}

impl From<TranslateError> for CompileError {
    fn from(err: TranslateError) -> Self {
        match err {
            TranslateError::Unsupported { dialect, feature } => {
                CompileError::Unsupported { dialect, feature }
            }
            TranslateError::Build(inner) => *inner,
            other => CompileError::invariant(other.to_string()),
        }
    }
}

//! Error types for frame resolution and record analysis.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-frame failures. None of these abort a record: the offending line is
/// parked in the record's unresolved list and the walk continues.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameError {
    #[error("type not found: {type_name}")]
    TypeNotFound { type_name: String },

    #[error("method not found: {qualified_name}")]
    MethodNotFound { qualified_name: String },

    #[error("multiple methods found for {qualified_name} ({candidates} candidates)")]
    AmbiguousMethod {
        qualified_name: String,
        candidates: usize,
    },

    #[error("dynamic method is not supported: {qualified_name}")]
    UnsupportedDynamicFrame { qualified_name: String },

    #[error("malformed frame text ({reason}): {line}")]
    MalformedFrameText { line: String, reason: String },
}

impl FrameError {
    pub fn type_not_found(type_name: impl Into<String>) -> Self {
        FrameError::TypeNotFound {
            type_name: type_name.into(),
        }
    }

    pub fn method_not_found(qualified_name: impl Into<String>) -> Self {
        FrameError::MethodNotFound {
            qualified_name: qualified_name.into(),
        }
    }

    pub fn ambiguous(qualified_name: impl Into<String>, candidates: usize) -> Self {
        FrameError::AmbiguousMethod {
            qualified_name: qualified_name.into(),
            candidates,
        }
    }

    pub fn unsupported_dynamic(qualified_name: impl Into<String>) -> Self {
        FrameError::UnsupportedDynamicFrame {
            qualified_name: qualified_name.into(),
        }
    }

    pub fn malformed(line: impl Into<String>, reason: impl Into<String>) -> Self {
        FrameError::MalformedFrameText {
            line: line.into(),
            reason: reason.into(),
        }
    }
}

/// Whole-record failure raised while a record is being made ready.
///
/// The record is dropped from the pending queue and the failure is handed to
/// the host once.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionFailure {
    #[error("patch layer failed for {method}: {message}")]
    Collaborator { method: String, message: String },

    #[error("resolution panicked: {message}")]
    Panicked { message: String },
}

impl ResolutionFailure {
    pub fn collaborator(method: impl Into<String>, err: &anyhow::Error) -> Self {
        ResolutionFailure::Collaborator {
            method: method.into(),
            message: format!("{err:#}"),
        }
    }

    pub fn panicked(message: impl Into<String>) -> Self {
        ResolutionFailure::Panicked {
            message: message.into(),
        }
    }
}

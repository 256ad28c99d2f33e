//! Error types for state documents

use thiserror::Error;

/// State document errors
///
/// Only whole-document problems are errors. A missing field or an
/// unexpected value shape inside an instance is a no-op for that pass.
#[derive(Error, Debug)]
pub enum StateError {
    /// Text is not valid JSON
    #[error("invalid state JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON does not look like a state file, a resource or an instance
    #[error("unrecognized state document shape: {0}")]
    UnknownShape(String),

    /// A resource entry is missing a required key
    #[error("resource #{index} is invalid: {reason}")]
    InvalidResource {
        /// Position in the `resources` array
        index: usize,
        /// What is wrong
        reason: String,
    },
}

impl StateError {
    /// Create an unknown-shape error
    #[must_use]
    pub fn unknown_shape(detail: impl Into<String>) -> Self {
        Self::UnknownShape(detail.into())
    }

    /// Create an invalid-resource error
    #[must_use]
    pub fn invalid_resource(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidResource {
            index,
            reason: reason.into(),
        }
    }
}

/// Result type for state operations
pub type Result<T> = std::result::Result<T, StateError>;

//! Error types for the block rewriter

use thiserror::Error;

/// Rewriter errors
///
/// Structural mismatches are never errors; only rule construction can fail.
#[derive(Error, Debug)]
pub enum RewriteError {
    /// A preprocess pattern did not compile
    #[error("invalid preprocess pattern {pattern:?}: {source}")]
    InvalidPattern {
        /// Pattern as given
        pattern: String,
        /// Regex compilation error
        #[source]
        source: regex::Error,
    },
}

impl RewriteError {
    /// Create an invalid-pattern error
    #[must_use]
    pub fn invalid_pattern(pattern: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            source,
        }
    }
}

/// Result type for rewriter operations
pub type Result<T> = std::result::Result<T, RewriteError>;

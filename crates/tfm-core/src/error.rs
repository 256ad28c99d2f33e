//! Error types for the migration engine
//!
//! Only document-level failures are errors:
//! - Configuration text that does not parse
//! - State text that is not a state document
//! - Catalogs that cannot be loaded
//!
//! A construct a rule expects but does not find is never an error. It is a
//! no-op for that rule and shows up in the report.

use tfm_rewrite::RewriteError;
use tfm_state::StateError;
use tfm_syntax::ParseError;

/// Main migration error type
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Configuration text failed to parse
    #[error("configuration parse failed: {0}")]
    Parse(#[from] ParseError),

    /// State document could not be read
    #[error("state document: {0}")]
    State(#[from] StateError),

    /// Catalog could not be loaded
    #[error("catalog: {0}")]
    Catalog(#[from] CatalogError),

    /// Engine settings could not be loaded
    #[error("engine configuration: {0}")]
    Config(String),

    /// A migrator gave up on one resource
    #[error("migrator {migrator} failed on {address}: {reason}")]
    Migrator {
        /// Migrator name
        migrator: String,
        /// Resource address
        address: String,
        /// What went wrong
        reason: String,
    },
}

impl MigrationError {
    /// Create a migrator failure
    #[inline]
    pub fn migrator(
        migrator: impl Into<String>,
        address: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Migrator {
            migrator: migrator.into(),
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error came from malformed input text
    #[inline]
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::State(_))
    }
}

/// Catalog loading errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// TOML syntax or schema error
    #[error("invalid TOML catalog: {0}")]
    Toml(#[from] toml::de::Error),

    /// YAML syntax or schema error
    #[error("invalid YAML catalog: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Preprocess pattern does not compile
    #[error("invalid preprocess rule: {0}")]
    Rewrite(#[from] RewriteError),

    /// Entry is structurally wrong
    #[error("invalid catalog entry {entry}: {reason}")]
    InvalidEntry {
        /// Source type of the entry
        entry: String,
        /// What is wrong
        reason: String,
    },

    /// Two entries claim the same source type
    #[error("source type {0} is declared twice")]
    Duplicate(String),
}

impl CatalogError {
    /// Create an invalid-entry error
    #[inline]
    pub fn invalid_entry(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEntry {
            entry: entry.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for migration operations
pub type Result<T> = std::result::Result<T, MigrationError>;

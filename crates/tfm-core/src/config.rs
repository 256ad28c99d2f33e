//! Engine settings

use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, Result};

/// Switches of one migration engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrateConfig {
    /// Rewrite references to renamed addresses
    pub rewrite_references: bool,
    /// Emit `moved` blocks for renamed managed resources
    pub emit_moved_blocks: bool,
    /// Run migrator text fixes before parsing
    pub preprocess: bool,
    /// Indentation of re-rendered state JSON
    pub state_indent: usize,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            rewrite_references: true,
            emit_moved_blocks: true,
            preprocess: true,
            state_indent: 2,
        }
    }
}

impl MigrateConfig {
    /// Default settings
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from TOML; missing keys keep their default
    ///
    /// # Errors
    /// Returns [`MigrationError::Config`] for invalid TOML or unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| MigrationError::Config(e.to_string()))
    }

    /// Set reference rewriting
    #[inline]
    #[must_use]
    pub fn with_rewrite_references(mut self, enabled: bool) -> Self {
        self.rewrite_references = enabled;
        self
    }

    /// Set `moved` block emission
    #[inline]
    #[must_use]
    pub fn with_moved_blocks(mut self, enabled: bool) -> Self {
        self.emit_moved_blocks = enabled;
        self
    }

    /// Set text preprocessing
    #[inline]
    #[must_use]
    pub fn with_preprocess(mut self, enabled: bool) -> Self {
        self.preprocess = enabled;
        self
    }

    /// Set state indentation
    #[inline]
    #[must_use]
    pub fn with_state_indent(mut self, indent: usize) -> Self {
        self.state_indent = indent;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = MigrateConfig::from_toml_str("emit_moved_blocks = false\n").unwrap();
        assert!(!config.emit_moved_blocks);
        assert!(config.rewrite_references);
        assert_eq!(config.state_indent, 2);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = MigrateConfig::from_toml_str("emit_moved = false\n").unwrap_err();
        assert!(matches!(err, MigrationError::Config(_)));
    }
}

//! Text-level fixes applied before parsing
//!
//! Reserved for lexical changes that are awkward as tree edits, such as a
//! renamed function. Rules run in insertion order on the raw document.

use std::borrow::Cow;

use regex::Regex;
use tracing::debug;

use crate::error::{Result, RewriteError};

#[derive(Debug, Clone)]
struct TextRule {
    pattern: Regex,
    replacement: String,
}

/// Ordered list of regex replacements
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    rules: Vec<TextRule>,
}

impl Preprocessor {
    /// Create an empty preprocessor
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a regex replacement (`$1`-style capture references allowed)
    ///
    /// # Errors
    /// Returns [`RewriteError::InvalidPattern`] when the pattern does not compile.
    pub fn with_rule(mut self, pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        let compiled =
            Regex::new(pattern).map_err(|e| RewriteError::invalid_pattern(pattern, e))?;
        self.rules.push(TextRule {
            pattern: compiled,
            replacement: replacement.into(),
        });
        Ok(self)
    }

    /// Rename calls of function `from` to `to`
    ///
    /// # Errors
    /// Returns [`RewriteError::InvalidPattern`] when the names produce an
    /// invalid pattern.
    pub fn with_function_rename(self, from: &str, to: &str) -> Result<Self> {
        let pattern = format!(r"\b{}\s*\(", regex::escape(from));
        let replacement = format!("{}(", to.replace('$', "$$"));
        self.with_rule(&pattern, replacement)
    }

    /// Number of rules
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check for an empty rule list
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply all rules in order
    #[must_use]
    pub fn apply<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(text);
        for rule in &self.rules {
            let replaced = match rule.pattern.replace_all(&out, rule.replacement.as_str()) {
                Cow::Owned(text) => Some(text),
                Cow::Borrowed(_) => None,
            };
            if let Some(text) = replaced {
                debug!(pattern = %rule.pattern, "preprocess rule applied");
                out = Cow::Owned(text);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_rename() {
        let pre = Preprocessor::new()
            .with_function_rename("old_fn", "provider::cloud::new_fn")
            .unwrap();
        assert_eq!(
            pre.apply("a = old_fn(x)\nb = my_old_fn(y)\n"),
            "a = provider::cloud::new_fn(x)\nb = my_old_fn(y)\n"
        );
    }

    #[test]
    fn rules_apply_in_order_and_borrow_when_untouched() {
        let pre = Preprocessor::new()
            .with_rule(r"legacy_(\w+)", "modern_$1")
            .unwrap()
            .with_rule("modern_x", "final_x")
            .unwrap();
        assert_eq!(pre.len(), 2);
        assert_eq!(pre.apply("legacy_x legacy_y"), "final_x modern_y");
        assert!(matches!(pre.apply("nothing here"), Cow::Borrowed(_)));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = Preprocessor::new().with_rule("(", "x").unwrap_err();
        assert!(err.to_string().contains("invalid preprocess pattern"));
    }
}

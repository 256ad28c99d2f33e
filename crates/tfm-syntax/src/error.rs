//! Error types for lexing and parsing

use std::fmt::{self, Display, Formatter};

/// 1-based position in source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    /// Line number (1-based)
    pub line: usize,
    /// Column in bytes (1-based)
    pub column: usize,
}

impl Position {
    /// Create a new position
    #[inline]
    #[must_use]
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Errors raised while reading block-language source
///
/// A parse failure is fatal for the document being read; no partial
/// tree is ever returned alongside it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Character that cannot start any token
    #[error("unexpected character {ch:?} at {at}")]
    UnexpectedChar {
        /// Offending character
        ch: char,
        /// Where it was found
        at: Position,
    },

    /// String, heredoc, comment or interpolation without its terminator
    #[error("unterminated {what} starting at {at}")]
    Unterminated {
        /// Construct kind
        what: &'static str,
        /// Where it started
        at: Position,
    },

    /// Token stream does not form a valid body or expression
    #[error("{message} at {at}")]
    Syntax {
        /// Human-readable description
        message: String,
        /// Where it was detected
        at: Position,
    },
}

impl ParseError {
    /// Create a syntax error at a position
    pub fn syntax(message: impl Into<String>, at: Position) -> Self {
        Self::Syntax {
            message: message.into(),
            at,
        }
    }

    /// Position the error refers to
    #[must_use]
    pub fn position(&self) -> Position {
        match self {
            Self::UnexpectedChar { at, .. }
            | Self::Unterminated { at, .. }
            | Self::Syntax { at, .. } => *at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display() {
        let err = ParseError::syntax("expected '{'", Position::new(3, 7));
        assert_eq!(err.to_string(), "expected '{' at 3:7");
        assert_eq!(err.position(), Position::new(3, 7));
    }

    #[test]
    fn unterminated_display() {
        let err = ParseError::Unterminated {
            what: "string",
            at: Position::new(1, 5),
        };
        assert_eq!(err.to_string(), "unterminated string starting at 1:5");
    }
}

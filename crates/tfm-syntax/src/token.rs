//! Tokens of the block language
//!
//! A [`Token`] keeps its exact source text and the horizontal whitespace
//! that preceded it, so a token sequence can be written back byte for byte.

use std::fmt::{self, Display, Formatter};

/// Token classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Identifier or keyword (`var`, `true`, `for`, `cloudflare_record`)
    Ident,

    /// Numeric literal
    Number,

    /// Quoted template, including any `${...}` / `%{...}` segments
    Template,

    /// Heredoc template, opening marker through closing marker
    Heredoc,

    /// Operator or delimiter
    Punct,

    /// Line or block comment
    Comment,

    /// Line break
    Newline,
}

/// Single token with its leading whitespace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    /// Kind of token
    pub kind: TokenKind,

    /// Exact source text
    pub text: String,

    /// Horizontal whitespace written before the token
    pub spaces_before: String,
}

impl Token {
    /// Create a token with no leading whitespace
    #[inline]
    #[must_use]
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            spaces_before: String::new(),
        }
    }

    /// Create a token preceded by a single space
    #[inline]
    #[must_use]
    pub fn spaced(kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            spaces_before: " ".to_string(),
        }
    }

    /// Identifier token
    #[inline]
    #[must_use]
    pub fn ident(text: impl Into<String>) -> Self {
        Self::new(TokenKind::Ident, text)
    }

    /// Punctuation token
    #[inline]
    #[must_use]
    pub fn punct(text: impl Into<String>) -> Self {
        Self::new(TokenKind::Punct, text)
    }

    /// Newline token
    #[inline]
    #[must_use]
    pub fn newline() -> Self {
        Self::new(TokenKind::Newline, "\n")
    }

    /// Replace leading whitespace
    #[inline]
    #[must_use]
    pub fn with_spaces(mut self, spaces: &str) -> Self {
        self.spaces_before = spaces.to_string();
        self
    }

    /// Check for a punctuation token with the given text
    #[inline]
    #[must_use]
    pub fn is_punct(&self, text: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == text
    }

    /// Check for an identifier token with the given text
    #[inline]
    #[must_use]
    pub fn is_ident(&self, text: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == text
    }

    /// Opening bracket of any kind
    #[inline]
    #[must_use]
    pub fn opens(&self) -> bool {
        self.kind == TokenKind::Punct && matches!(self.text.as_str(), "(" | "[" | "{")
    }

    /// Closing bracket of any kind
    #[inline]
    #[must_use]
    pub fn closes(&self) -> bool {
        self.kind == TokenKind::Punct && matches!(self.text.as_str(), ")" | "]" | "}")
    }

    /// Tokens that carry no value (layout and comments)
    #[inline]
    #[must_use]
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Newline | TokenKind::Comment)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.spaces_before, self.text)
    }
}

/// Write tokens back verbatim, leading whitespace included
#[must_use]
pub fn render_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        out.push_str(&token.spaces_before);
        out.push_str(&token.text);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_predicates() {
        assert!(Token::punct("{").opens());
        assert!(Token::punct("]").closes());
        assert!(!Token::ident("x").opens());
        assert!(Token::newline().is_trivia());
        assert!(Token::ident("for").is_ident("for"));
    }

    #[test]
    fn render_keeps_spacing() {
        let tokens = vec![
            Token::ident("var"),
            Token::punct("."),
            Token::ident("name"),
            Token::spaced(TokenKind::Punct, "=="),
            Token::spaced(TokenKind::Template, "\"x\""),
        ];
        assert_eq!(render_tokens(&tokens), "var.name == \"x\"");
    }
}

//! Lexer for the block language
//!
//! Produces a flat token stream. Quoted templates and heredocs are single
//! tokens: interpolation segments inside them are matched structurally
//! (nested braces and nested strings) but not split, so a template is
//! always reproduced exactly as written.

use crate::error::{ParseError, Position};
use crate::token::{Token, TokenKind};

/// Token with the position where it starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexed {
    /// The token
    pub token: Token,
    /// Start position of the token text
    pub at: Position,
}

const PUNCT3: &[&str] = &["..."];
const PUNCT2: &[&str] = &["==", "!=", "<=", ">=", "&&", "||", "=>", "::"];
const PUNCT1: &[u8] = b"{}[]()=<>?:,.+-*/%!";

/// Split source text into tokens
///
/// # Errors
/// Returns [`ParseError`] for unknown characters and unterminated
/// strings, heredocs or comments.
pub fn tokenize(src: &str) -> Result<Vec<Lexed>, ParseError> {
    Lexer::new(src).run()
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    line_start: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            line_start: 0,
        }
    }

    fn here(&self) -> Position {
        Position::new(self.line, self.pos - self.line_start + 1)
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn run(mut self) -> Result<Vec<Lexed>, ParseError> {
        let mut out = Vec::new();

        loop {
            let ws_start = self.pos;
            while let Some(b) = self.peek_at(0) {
                if b == b' ' || b == b'\t' || b == b'\r' {
                    self.pos += 1;
                } else {
                    break;
                }
            }
            let spaces = &self.src[ws_start..self.pos];

            let Some(b) = self.peek_at(0) else {
                break;
            };

            let start = self.pos;
            let at = self.here();

            let kind = match b {
                b'\n' => {
                    self.pos += 1;
                    TokenKind::Newline
                }
                b'#' => {
                    self.skip_to_line_end();
                    TokenKind::Comment
                }
                b'/' if self.peek_at(1) == Some(b'/') => {
                    self.skip_to_line_end();
                    TokenKind::Comment
                }
                b'/' if self.peek_at(1) == Some(b'*') => {
                    let end = self.src[self.pos + 2..]
                        .find("*/")
                        .ok_or(ParseError::Unterminated { what: "comment", at })?;
                    self.pos += 2 + end + 2;
                    TokenKind::Comment
                }
                b'"' => {
                    self.pos = scan_string(self.bytes, self.pos)
                        .ok_or(ParseError::Unterminated { what: "string", at })?;
                    TokenKind::Template
                }
                b'<' if self.peek_at(1) == Some(b'<') && self.heredoc_marker().is_some() => {
                    self.scan_heredoc(at)?;
                    TokenKind::Heredoc
                }
                b'0'..=b'9' => {
                    self.scan_number();
                    TokenKind::Number
                }
                c if is_ident_start(c) => {
                    while self.peek_at(0).is_some_and(is_ident_continue) {
                        self.pos += 1;
                    }
                    TokenKind::Ident
                }
                _ => {
                    self.scan_punct(at)?;
                    TokenKind::Punct
                }
            };

            let text = &self.src[start..self.pos];
            if let Some(last) = text.rfind('\n') {
                self.line += text.matches('\n').count();
                self.line_start = start + last + 1;
            }

            out.push(Lexed {
                token: Token {
                    kind,
                    text: text.to_string(),
                    spaces_before: spaces.to_string(),
                },
                at,
            });
        }

        Ok(out)
    }

    fn skip_to_line_end(&mut self) {
        while let Some(b) = self.peek_at(0) {
            if b == b'\n' {
                break;
            }
            self.pos += 1;
        }
        // A trailing '\r' belongs to the line break, not the comment.
        if self.pos > 0 && self.bytes[self.pos - 1] == b'\r' && self.peek_at(0) == Some(b'\n') {
            self.pos -= 1;
        }
    }

    /// Marker name if the text at `pos` opens a heredoc (`<<EOF`, `<<-EOF`)
    fn heredoc_marker(&self) -> Option<(bool, &'a str)> {
        let mut i = self.pos + 2;
        let indented = self.bytes.get(i) == Some(&b'-');
        if indented {
            i += 1;
        }
        let start = i;
        if !self.bytes.get(i).copied().is_some_and(is_ident_start) {
            return None;
        }
        while self.bytes.get(i).copied().is_some_and(is_ident_continue) {
            i += 1;
        }
        Some((indented, &self.src[start..i]))
    }

    fn scan_heredoc(&mut self, at: Position) -> Result<(), ParseError> {
        let Some((_, marker)) = self.heredoc_marker() else {
            return Err(ParseError::Unterminated { what: "heredoc", at });
        };

        let opening_end = self.src[self.pos..]
            .find('\n')
            .map(|i| self.pos + i)
            .ok_or(ParseError::Unterminated { what: "heredoc", at })?;

        let mut line_begin = opening_end + 1;
        loop {
            let line_end = self.src[line_begin..]
                .find('\n')
                .map_or(self.src.len(), |i| line_begin + i);
            if self.src[line_begin..line_end].trim() == marker {
                self.pos = line_end;
                if self.bytes.get(self.pos - 1) == Some(&b'\r') {
                    self.pos -= 1;
                }
                return Ok(());
            }
            if line_end >= self.src.len() {
                return Err(ParseError::Unterminated { what: "heredoc", at });
            }
            line_begin = line_end + 1;
        }
    }

    fn scan_number(&mut self) {
        while self.peek_at(0).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek_at(0) == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
            while self.peek_at(0).is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek_at(0), Some(b'e' | b'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some(b'+' | b'-')));
            if self.peek_at(1 + sign).is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1 + sign;
                while self.peek_at(0).is_some_and(|b| b.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }
    }

    fn scan_punct(&mut self, at: Position) -> Result<(), ParseError> {
        let rest = &self.src[self.pos..];
        if let Some(p) = PUNCT3.iter().chain(PUNCT2).find(|p| rest.starts_with(**p)) {
            self.pos += p.len();
            return Ok(());
        }
        if PUNCT1.contains(&self.bytes[self.pos]) {
            self.pos += 1;
            return Ok(());
        }
        let ch = rest.chars().next().unwrap_or('\0');
        Err(ParseError::UnexpectedChar { ch, at })
    }
}

#[inline]
fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

#[inline]
fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

/// Scan a quoted template starting at the opening quote
///
/// Returns the index just past the closing quote, or `None` when the
/// string is not terminated on its line.
pub(crate) fn scan_string(bytes: &[u8], start: usize) -> Option<usize> {
    let mut j = start + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b'"' => return Some(j + 1),
            b'\n' => return None,
            b'$' | b'%'
                if bytes.get(j + 1) == Some(&bytes[j]) && bytes.get(j + 2) == Some(&b'{') =>
            {
                j += 3;
            }
            b'$' | b'%' if bytes.get(j + 1) == Some(&b'{') => {
                j = match_brace(bytes, j + 2)? + 1;
            }
            _ => j += 1,
        }
    }
    None
}

/// Find the `}` closing a brace whose body starts at `start`
pub(crate) fn match_brace(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut j = start;
    while j < bytes.len() {
        match bytes[j] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(j);
                }
            }
            b'"' => {
                j = scan_string(bytes, j)?;
                continue;
            }
            _ => {}
        }
        j += 1;
    }
    None
}

/// Byte ranges of the contents of every `${...}` / `%{...}` segment
///
/// Ranges exclude the opening `${` and the closing `}`. Escaped
/// sequences (`$${`, `%%{`) are skipped.
#[must_use]
pub fn interpolation_spans(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut j = 0;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b'$' | b'%'
                if bytes.get(j + 1) == Some(&bytes[j]) && bytes.get(j + 2) == Some(&b'{') =>
            {
                j += 3;
            }
            b'$' | b'%' if bytes.get(j + 1) == Some(&b'{') => match match_brace(bytes, j + 2) {
                Some(end) => {
                    spans.push((j + 2, end));
                    j = end + 1;
                }
                None => break,
            },
            _ => j += 1,
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<(TokenKind, String)> {
        tokenize(src)
            .unwrap()
            .into_iter()
            .map(|l| (l.token.kind, l.token.text))
            .collect()
    }

    #[test]
    fn lex_attribute() {
        let toks = kinds("name = var.x\n");
        assert_eq!(
            toks,
            vec![
                (TokenKind::Ident, "name".to_string()),
                (TokenKind::Punct, "=".to_string()),
                (TokenKind::Ident, "var".to_string()),
                (TokenKind::Punct, ".".to_string()),
                (TokenKind::Ident, "x".to_string()),
                (TokenKind::Newline, "\n".to_string()),
            ]
        );
    }

    #[test]
    fn lex_template_with_nested_interpolation() {
        let toks = kinds(r#"a = "${lookup(var.m, "k-${var.n}")}-x""#);
        assert_eq!(toks[2].0, TokenKind::Template);
        assert_eq!(toks[2].1, r#""${lookup(var.m, "k-${var.n}")}-x""#);
        assert_eq!(toks.len(), 3);
    }

    #[test]
    fn lex_escaped_interpolation() {
        let toks = kinds(r#"a = "$${literal}""#);
        assert_eq!(toks[2].1, r#""$${literal}""#);
    }

    #[test]
    fn lex_heredoc_is_one_token() {
        let src = "a = <<-EOT\n  hello ${var.x}\n  EOT\nb = 1\n";
        let toks = kinds(src);
        assert_eq!(toks[2].0, TokenKind::Heredoc);
        assert_eq!(toks[2].1, "<<-EOT\n  hello ${var.x}\n  EOT");
        assert_eq!(toks[3].0, TokenKind::Newline);
        assert_eq!(toks[4].1, "b");
    }

    #[test]
    fn lex_comments() {
        let toks = kinds("# one\n// two\n/* three\n */ x");
        assert_eq!(toks[0], (TokenKind::Comment, "# one".to_string()));
        assert_eq!(toks[2], (TokenKind::Comment, "// two".to_string()));
        assert_eq!(toks[4], (TokenKind::Comment, "/* three\n */".to_string()));
        assert_eq!(toks[5], (TokenKind::Ident, "x".to_string()));
    }

    #[test]
    fn lex_numbers_and_punct() {
        let toks = kinds("x = 1.5e3 >= -2 ...");
        assert_eq!(toks[2], (TokenKind::Number, "1.5e3".to_string()));
        assert_eq!(toks[3], (TokenKind::Punct, ">=".to_string()));
        assert_eq!(toks[4], (TokenKind::Punct, "-".to_string()));
        assert_eq!(toks[6], (TokenKind::Punct, "...".to_string()));
    }

    #[test]
    fn lex_positions() {
        let lexed = tokenize("a = 1\n  b = 2").unwrap();
        let b = lexed.iter().find(|l| l.token.text == "b").unwrap();
        assert_eq!(b.at, Position::new(2, 3));
        assert_eq!(b.token.spaces_before, "  ");
    }

    #[test]
    fn lex_unterminated_string() {
        let err = tokenize("a = \"oops\n").unwrap_err();
        assert!(matches!(err, ParseError::Unterminated { what: "string", .. }));
    }

    #[test]
    fn lex_unexpected_char() {
        let err = tokenize("a = @").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedChar { ch: '@', .. }));
    }

    #[test]
    fn spans_skip_escapes() {
        let text = r#""$${no} ${yes} %{ if x }""#;
        let spans = interpolation_spans(text);
        let parts: Vec<&str> = spans.iter().map(|(s, e)| &text[*s..*e]).collect();
        assert_eq!(parts, vec!["yes", " if x "]);
    }
}

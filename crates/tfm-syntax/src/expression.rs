//! Opaque expression carrier
//!
//! An [`Expression`] is the token sequence of one attribute value. It is
//! never evaluated: only literal shapes can be inspected, and copying an
//! expression somewhere else reproduces its tokens exactly. References,
//! function calls and templates stay as written.

use std::fmt::{self, Display, Formatter};

use crate::error::ParseError;
use crate::lexer::{interpolation_spans, tokenize};
use crate::token::{render_tokens, Token, TokenKind};

/// Interpreted literal value, for inspection only
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    /// Quoted string without interpolation (unescaped)
    String(String),
    /// `true` / `false`
    Bool(bool),
    /// Numeric literal, kept as written
    Number(String),
    /// `null`
    Null,
}

impl Literal {
    /// Literal rendered as a map key; `null` is no key
    #[must_use]
    pub fn as_key(&self) -> Option<String> {
        match self {
            Self::String(s) | Self::Number(s) => Some(s.clone()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Null => None,
        }
    }
}

/// Value expression as a token sequence
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct Expression {
    tokens: Vec<Token>,
}

impl Expression {
    /// Wrap a token sequence
    ///
    /// Leading whitespace of the first token is dropped; the printer decides
    /// what goes between `=` and the value.
    #[must_use]
    pub fn from_tokens(mut tokens: Vec<Token>) -> Self {
        if let Some(first) = tokens.first_mut() {
            first.spaces_before.clear();
        }
        Self { tokens }
    }

    /// Lex a standalone expression
    ///
    /// # Errors
    /// Returns [`ParseError`] for lexical errors or unbalanced brackets.
    pub fn parse(src: &str) -> Result<Self, ParseError> {
        crate::parser::parse_expression(src)
    }

    /// Quoted string literal
    #[must_use]
    pub fn string(value: &str) -> Self {
        Self::from_tokens(vec![Token::new(TokenKind::Template, quote(value))])
    }

    /// Boolean literal
    #[must_use]
    pub fn bool(value: bool) -> Self {
        Self::from_tokens(vec![Token::ident(if value { "true" } else { "false" })])
    }

    /// Numeric literal
    #[must_use]
    pub fn number(value: impl Display) -> Self {
        let text = value.to_string();
        match text.strip_prefix('-') {
            Some(rest) => Self::from_tokens(vec![
                Token::punct("-"),
                Token::new(TokenKind::Number, rest),
            ]),
            None => Self::from_tokens(vec![Token::new(TokenKind::Number, text)]),
        }
    }

    /// `null`
    #[must_use]
    pub fn null() -> Self {
        Self::from_tokens(vec![Token::ident("null")])
    }

    /// Dotted traversal such as `cloudflare_zone.main.id`
    #[must_use]
    pub fn traversal(parts: &[&str]) -> Self {
        let mut tokens = Vec::with_capacity(parts.len() * 2);
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                tokens.push(Token::punct("."));
            }
            tokens.push(Token::ident(*part));
        }
        Self::from_tokens(tokens)
    }

    /// Token sequence
    #[inline]
    #[must_use]
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Consume into the token sequence
    #[inline]
    #[must_use]
    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    /// Check for an empty token sequence
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Expression spans more than one line
    #[must_use]
    pub fn is_multiline(&self) -> bool {
        self.tokens
            .iter()
            .any(|t| t.kind == TokenKind::Newline || t.text.contains('\n'))
    }

    /// Source text exactly as carried
    #[must_use]
    pub fn source(&self) -> String {
        render_tokens(&self.tokens)
    }

    fn significant(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter().filter(|t| !t.is_trivia())
    }

    /// Interpret a literal value
    ///
    /// Returns `None` for anything that is not a plain literal, including
    /// templates with interpolation.
    #[must_use]
    pub fn as_literal(&self) -> Option<Literal> {
        let sig: Vec<&Token> = self.significant().collect();
        match sig.as_slice() {
            [t] if t.kind == TokenKind::Template => template_literal(&t.text).map(Literal::String),
            [t] if t.kind == TokenKind::Number => Some(Literal::Number(t.text.clone())),
            [t] if t.is_ident("true") => Some(Literal::Bool(true)),
            [t] if t.is_ident("false") => Some(Literal::Bool(false)),
            [t] if t.is_ident("null") => Some(Literal::Null),
            [sign, t] if sign.is_punct("-") && t.kind == TokenKind::Number => {
                Some(Literal::Number(format!("-{}", t.text)))
            }
            _ => None,
        }
    }

    /// Literal string value, if this is a plain quoted string
    #[must_use]
    pub fn as_string(&self) -> Option<String> {
        match self.as_literal()? {
            Literal::String(s) => Some(s),
            _ => None,
        }
    }

    /// Literal tuple of plain strings, e.g. `["a", "b"]`
    #[must_use]
    pub fn as_string_list(&self) -> Option<Vec<String>> {
        let sig: Vec<&Token> = self.significant().collect();
        let (open, rest) = sig.split_first()?;
        if !open.is_punct("[") {
            return None;
        }
        let mut values = Vec::new();
        let mut iter = rest.iter().peekable();
        loop {
            let token = iter.next()?;
            if token.is_punct("]") {
                return iter.next().is_none().then_some(values);
            }
            if token.kind != TokenKind::Template {
                return None;
            }
            values.push(template_literal(&token.text)?);
            match iter.next()? {
                t if t.is_punct(",") => {}
                t if t.is_punct("]") => return iter.next().is_none().then_some(values),
                _ => return None,
            }
        }
    }

    /// Elements of a tuple expression `[a, b.c, "d"]`
    ///
    /// `None` when this is not a bracketed tuple (comprehensions included).
    #[must_use]
    pub fn tuple_elements(&self) -> Option<Vec<Expression>> {
        let sig: Vec<&Token> = self.significant().collect();
        let (open, rest) = sig.split_first()?;
        let (close, inner) = rest.split_last()?;
        if !open.is_punct("[") || !close.is_punct("]") {
            return None;
        }
        if inner.first().is_some_and(|t| t.is_ident("for")) {
            return None;
        }
        let mut elements = Vec::new();
        let mut current: Vec<Token> = Vec::new();
        let mut depth = 0usize;
        for token in inner {
            if depth == 0 && token.is_punct(",") {
                elements.push(Self::from_tokens(std::mem::take(&mut current)));
                continue;
            }
            if token.opens() {
                depth += 1;
            } else if token.closes() {
                if depth == 0 {
                    return None;
                }
                depth -= 1;
            }
            current.push((*token).clone());
        }
        if depth != 0 {
            return None;
        }
        if !current.is_empty() {
            elements.push(Self::from_tokens(current));
        }
        Some(elements)
    }

    /// Plain traversal (`a.b.c`, `a.b[0].c`) rather than a literal or call
    #[must_use]
    pub fn is_traversal(&self) -> bool {
        let sig: Vec<&Token> = self.significant().collect();
        let Some(first) = sig.first() else {
            return false;
        };
        if first.kind != TokenKind::Ident || matches!(first.text.as_str(), "true" | "false" | "null")
        {
            return false;
        }
        let mut i = 1;
        while i < sig.len() {
            if sig[i].is_punct(".") && sig.get(i + 1).is_some_and(|t| {
                t.kind == TokenKind::Ident || t.kind == TokenKind::Number || t.is_punct("*")
            }) {
                i += 2;
            } else if sig[i].is_punct("[") {
                let mut depth = 0usize;
                while i < sig.len() {
                    if sig[i].opens() {
                        depth += 1;
                    } else if sig[i].closes() {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    i += 1;
                }
                i += 1;
            } else {
                return false;
            }
        }
        true
    }

    /// Attribute names addressed by a traversal, index steps rendered `[N]`
    ///
    /// `a.b[0].c` yields `["a", "b", "[0]", "c"]`.
    #[must_use]
    pub fn traversal_steps(&self) -> Option<Vec<String>> {
        if !self.is_traversal() {
            return None;
        }
        let mut steps = Vec::new();
        let mut index = String::new();
        let mut depth = 0usize;
        for token in self.significant() {
            if depth > 0 {
                index.push_str(&token.text);
                if token.opens() {
                    depth += 1;
                } else if token.closes() {
                    depth -= 1;
                    if depth == 0 {
                        steps.push(std::mem::take(&mut index));
                    }
                }
            } else if token.is_punct("[") {
                depth = 1;
                index.push('[');
            } else if !token.is_punct(".") {
                steps.push(token.text.clone());
            }
        }
        Some(steps)
    }

    /// Rename the root of every traversal starting with `old`
    ///
    /// `old` and `new` are dotted prefixes (`["data", "old_type"]`). A match
    /// must be a traversal root (not preceded by `.`) and must be followed
    /// by a further `.name` step. Interpolations inside templates are
    /// rewritten as well. Returns whether anything changed.
    pub fn rename_traversal_root(&mut self, old: &[&str], new: &[&str]) -> bool {
        let replacement = traversal_tokens(new);
        self.rewrite_tokens(&|tokens: &mut Vec<Token>| {
            replace_prefix(tokens, old, &replacement, true)
        })
    }

    /// Rename references to the full address `old`
    ///
    /// Like [`Expression::rename_traversal_root`], but a bare `old` (as in
    /// `depends_on = [old.name]`) matches too.
    pub fn rename_address(&mut self, old: &[&str], new: &[&str]) -> bool {
        let replacement = traversal_tokens(new);
        self.rewrite_tokens(&|tokens: &mut Vec<Token>| {
            replace_prefix(tokens, old, &replacement, false)
        })
    }

    /// Rewrite loop-variable references for a comprehension
    ///
    /// `<iterator>.value` becomes `<iterator>` and `<iterator>.key`
    /// becomes `<key_var>`, in plain tokens and inside interpolations.
    /// Returns whether anything changed.
    pub fn rewrite_iterator(&mut self, iterator: &str, key_var: &str) -> bool {
        let value_repl = vec![Token::ident(iterator)];
        let key_repl = vec![Token::ident(key_var)];
        self.rewrite_tokens(&|tokens: &mut Vec<Token>| {
            let a = replace_prefix(tokens, &[iterator, "value"], &value_repl, false);
            let b = replace_prefix(tokens, &[iterator, "key"], &key_repl, false);
            a || b
        })
    }

    /// Check whether `<iterator>.key` appears anywhere
    #[must_use]
    pub fn references_iterator_key(&self, iterator: &str) -> bool {
        let mut scratch = self.clone();
        scratch.rewrite_tokens(&|tokens: &mut Vec<Token>| {
            replace_prefix(tokens, &[iterator, "key"], &[Token::ident("_")], false)
        })
    }

    fn rewrite_tokens(&mut self, edit: &dyn Fn(&mut Vec<Token>) -> bool) -> bool {
        let mut changed = edit(&mut self.tokens);
        for token in &mut self.tokens {
            if matches!(token.kind, TokenKind::Template | TokenKind::Heredoc) {
                if let Some(text) = rewrite_interpolations(&token.text, edit) {
                    token.text = text;
                    changed = true;
                }
            }
        }
        changed
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source())
    }
}

fn traversal_tokens(parts: &[&str]) -> Vec<Token> {
    Expression::traversal(parts).into_tokens()
}

/// Replace every occurrence of the dotted `prefix` by `replacement`
fn replace_prefix(
    tokens: &mut Vec<Token>,
    prefix: &[&str],
    replacement: &[Token],
    require_more: bool,
) -> bool {
    if prefix.is_empty() {
        return false;
    }
    let pattern_len = prefix.len() * 2 - 1;
    let mut changed = false;
    let mut i = 0;
    while i + pattern_len <= tokens.len() {
        let at_root = i == 0 || !tokens[i - 1].is_punct(".");
        let matches = at_root
            && prefix.iter().enumerate().all(|(k, part)| {
                tokens[i + k * 2].is_ident(part) && (k == 0 || tokens[i + k * 2 - 1].is_punct("."))
            });
        let continues = tokens
            .get(i + pattern_len)
            .is_some_and(|t| t.is_punct(".") || t.is_punct("["));
        let ends_word = tokens
            .get(i + pattern_len)
            .map_or(true, |t| t.kind != TokenKind::Ident || !t.spaces_before.is_empty());

        if matches && ends_word && (!require_more || continues) {
            let spaces = tokens[i].spaces_before.clone();
            let mut repl = replacement.to_vec();
            if let Some(first) = repl.first_mut() {
                first.spaces_before = spaces;
            }
            let repl_len = repl.len();
            tokens.splice(i..i + pattern_len, repl);
            i += repl_len;
            changed = true;
        } else {
            i += 1;
        }
    }
    changed
}

fn rewrite_interpolations(text: &str, edit: &dyn Fn(&mut Vec<Token>) -> bool) -> Option<String> {
    let spans = interpolation_spans(text);
    if spans.is_empty() {
        return None;
    }
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut changed = false;
    for (start, end) in spans {
        let inner = &text[start..end];
        out.push_str(&text[last..start]);
        match tokenize(inner) {
            Ok(lexed) => {
                let mut tokens: Vec<Token> = lexed.into_iter().map(|l| l.token).collect();
                let mut inner_changed = edit(&mut tokens);
                for token in &mut tokens {
                    if token.kind == TokenKind::Template {
                        if let Some(nested) = rewrite_interpolations(&token.text, edit) {
                            token.text = nested;
                            inner_changed = true;
                        }
                    }
                }
                if inner_changed {
                    let trailing = &inner[inner.trim_end().len()..];
                    out.push_str(&render_tokens(&tokens));
                    out.push_str(trailing);
                    changed = true;
                } else {
                    out.push_str(inner);
                }
            }
            Err(_) => out.push_str(inner),
        }
        last = end;
    }
    out.push_str(&text[last..]);
    changed.then_some(out)
}

/// Decode a quoted template that has no interpolation
fn template_literal(text: &str) -> Option<String> {
    let inner = text.strip_prefix('"')?.strip_suffix('"')?;
    if !interpolation_spans(text).is_empty() {
        return None;
    }
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next()? {
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                '"' => out.push('"'),
                '\\' => out.push('\\'),
                'u' => {
                    let hex: String = chars.by_ref().take(4).collect();
                    out.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
                }
                other => {
                    out.push('\\');
                    out.push(other);
                }
            },
            '$' | '%' if chars.peek() == Some(&c) => {
                let mut ahead = chars.clone();
                ahead.next();
                if ahead.peek() == Some(&'{') {
                    chars.next();
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    Some(out)
}

/// Quote a string as a template literal, escaping interpolation markers
#[must_use]
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(src: &str) -> Expression {
        Expression::parse(src).unwrap()
    }

    #[test]
    fn literal_inspection() {
        assert_eq!(expr("\"a\\\"b\"").as_literal(), Some(Literal::String("a\"b".into())));
        assert_eq!(expr("true").as_literal(), Some(Literal::Bool(true)));
        assert_eq!(expr("-5").as_literal(), Some(Literal::Number("-5".into())));
        assert_eq!(expr("null").as_literal(), Some(Literal::Null));
        assert_eq!(expr("\"${var.x}\"").as_literal(), None);
        assert_eq!(expr("var.x").as_literal(), None);
        assert_eq!(expr("\"$${x}\"").as_string(), Some("${x}".into()));
    }

    #[test]
    fn string_list_inspection() {
        assert_eq!(
            expr("[\"a\", \"b\",]").as_string_list(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(expr("[]").as_string_list(), Some(vec![]));
        assert_eq!(expr("[\"a\", var.b]").as_string_list(), None);
        assert_eq!(expr("var.list").as_string_list(), None);
    }

    #[test]
    fn tuple_element_split() {
        let parts = expr("[a, b[0].c, f(x, y),]").tuple_elements().unwrap();
        let sources: Vec<String> = parts.iter().map(Expression::source).collect();
        assert_eq!(sources, vec!["a", "b[0].c", "f(x, y)"]);
        assert_eq!(expr("[]").tuple_elements(), Some(vec![]));
        assert_eq!(expr("[for x in y : x]").tuple_elements(), None);
        assert_eq!(expr("var.list").tuple_elements(), None);
    }

    #[test]
    fn source_is_verbatim() {
        let src = "merge(var.a,   { x = \"${local.y}\" })";
        assert_eq!(expr(src).source(), src);
    }

    #[test]
    fn quote_round_trips_through_literal() {
        let raw = "line\n\"quoted\" ${not} \\";
        let e = Expression::string(raw);
        assert_eq!(e.as_string(), Some(raw.to_string()));
    }

    #[test]
    fn number_constructor() {
        assert_eq!(Expression::number(-3).source(), "-3");
        assert_eq!(Expression::number(60).as_literal(), Some(Literal::Number("60".into())));
    }

    #[test]
    fn traversal_detection() {
        assert!(expr("var.x").is_traversal());
        assert!(expr("a.b[0].c").is_traversal());
        assert!(!expr("true").is_traversal());
        assert!(!expr("f(x)").is_traversal());
        assert_eq!(
            expr("a.b[0].c").traversal_steps(),
            Some(vec!["a".into(), "b".into(), "[0]".into(), "c".into()])
        );
    }

    #[test]
    fn rename_root_in_tokens_and_templates() {
        let mut e = expr("\"${old_type.main.id}-${other.old_type.x}\"");
        assert!(e.rename_traversal_root(&["old_type"], &["new_type"]));
        assert_eq!(e.source(), "\"${new_type.main.id}-${other.old_type.x}\"");

        let mut e = expr("[old_type.a.id, data.old_type.b.id]");
        assert!(e.rename_traversal_root(&["old_type"], &["new_type"]));
        assert_eq!(e.source(), "[new_type.a.id, data.old_type.b.id]");

        let mut e = expr("data.old_type.b.id");
        assert!(e.rename_traversal_root(&["data", "old_type"], &["data", "new_type"]));
        assert_eq!(e.source(), "data.new_type.b.id");
    }

    #[test]
    fn rename_requires_further_step() {
        let mut e = expr("old_type");
        assert!(!e.rename_traversal_root(&["old_type"], &["new_type"]));
        let mut e = expr("old_type_extra.a");
        assert!(!e.rename_traversal_root(&["old_type"], &["new_type"]));
    }

    #[test]
    fn rename_full_address() {
        let mut e = expr("[old_type.main, old_type.other, old_type.main.id]");
        assert!(e.rename_address(&["old_type", "main"], &["new_type", "main"]));
        assert_eq!(e.source(), "[new_type.main, old_type.other, new_type.main.id]");

        let mut e = expr("old_type.main_2");
        assert!(!e.rename_address(&["old_type", "main"], &["new_type", "main"]));
    }

    #[test]
    fn empty_address_renames_nothing() {
        let mut e = expr("[a.b, \"${c.d}\"]");
        assert!(!e.rename_address(&[], &["x"]));
        assert!(!e.rename_traversal_root(&[], &["x"]));
        assert_eq!(e.source(), "[a.b, \"${c.d}\"]");
    }

    #[test]
    fn null_literal_is_no_key() {
        assert_eq!(Literal::Null.as_key(), None);
        assert_eq!(Literal::Bool(false).as_key(), Some("false".into()));
        assert_eq!(Literal::Number("8".into()).as_key(), Some("8".into()));
    }

    #[test]
    fn iterator_rewrite() {
        let mut e = expr("\"${item.value.name}:${item.key}\"");
        assert!(e.rewrite_iterator("item", "item_key"));
        assert_eq!(e.source(), "\"${item.name}:${item_key}\"");

        let mut e = expr("lookup(item.value, \"y\", item.value.z)");
        assert!(e.rewrite_iterator("item", "item_key"));
        assert_eq!(e.source(), "lookup(item, \"y\", item.z)");

        let mut e = expr("other.value.x");
        assert!(!e.rewrite_iterator("item", "item_key"));
    }

    #[test]
    fn key_reference_detection() {
        assert!(expr("item.key").references_iterator_key("item"));
        assert!(!expr("item.value.key").references_iterator_key("item"));
    }
}

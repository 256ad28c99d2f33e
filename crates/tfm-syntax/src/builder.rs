//! Construction of object, array and map expressions
//!
//! Builders only concatenate existing token sequences with delimiters and
//! newline tokens. Nothing is stringified and parsed again, so every copied
//! sub-expression keeps its exact tokens. Indentation is left to the
//! printer.

use std::collections::BTreeMap;

use crate::body::Body;
use crate::expression::{quote, Expression};
use crate::token::{Token, TokenKind};

/// Key of an object entry
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectKey {
    /// Bare identifier key: `name = ...`
    Ident(String),
    /// Quoted key: `"X-Name" = ...`
    Quoted(String),
}

impl ObjectKey {
    /// Bare key when `name` is a plain identifier, quoted otherwise
    #[must_use]
    pub fn for_name(name: &str) -> Self {
        if is_identifier(name) {
            Self::Ident(name.to_string())
        } else {
            Self::Quoted(name.to_string())
        }
    }

    /// Key text without quotes
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Ident(n) | Self::Quoted(n) => n,
        }
    }

    fn token(&self) -> Token {
        match self {
            Self::Ident(n) => Token::ident(n.as_str()),
            Self::Quoted(n) => Token::new(TokenKind::Template, quote(n)),
        }
    }
}

/// Check whether `name` can be written as a bare object key
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && !matches!(name, "true" | "false" | "null" | "for" | "in" | "if")
}

fn push_expr(tokens: &mut Vec<Token>, expr: Expression, spaces: &str) {
    let mut iter = expr.into_tokens().into_iter();
    if let Some(first) = iter.next() {
        tokens.push(first.with_spaces(spaces));
    }
    tokens.extend(iter);
}

/// Object with entries in the given order
///
/// Renders `{}` when empty, otherwise one entry per line.
#[must_use]
pub fn object(entries: Vec<(ObjectKey, Expression)>) -> Expression {
    if entries.is_empty() {
        return Expression::from_tokens(vec![Token::punct("{"), Token::punct("}")]);
    }
    let mut tokens = vec![Token::punct("{"), Token::newline()];
    for (key, value) in entries {
        tokens.push(key.token());
        tokens.push(Token::punct("=").with_spaces(" "));
        push_expr(&mut tokens, value, " ");
        tokens.push(Token::newline());
    }
    tokens.push(Token::punct("}"));
    Expression::from_tokens(tokens)
}

/// Object with keys in lexicographic order
///
/// Used whenever the key set is synthesized rather than user-ordered.
#[must_use]
pub fn sorted_object(entries: Vec<(String, Expression)>) -> Expression {
    let sorted: BTreeMap<String, Expression> = entries.into_iter().collect();
    object(
        sorted
            .into_iter()
            .map(|(name, value)| (ObjectKey::for_name(&name), value))
            .collect(),
    )
}

/// Map with quoted keys in sorted order
#[must_use]
pub fn map(entries: BTreeMap<String, Expression>) -> Expression {
    object(
        entries
            .into_iter()
            .map(|(key, value)| (ObjectKey::Quoted(key), value))
            .collect(),
    )
}

/// Array with elements in the given order
///
/// Single line when every element fits on one line, otherwise one element
/// per line with trailing commas.
#[must_use]
pub fn array(elements: Vec<Expression>) -> Expression {
    let multiline = elements.iter().any(Expression::is_multiline);
    let mut tokens = vec![Token::punct("[")];
    if multiline {
        tokens.push(Token::newline());
        for element in elements {
            push_expr(&mut tokens, element, "");
            tokens.push(Token::punct(","));
            tokens.push(Token::newline());
        }
    } else {
        for (i, element) in elements.into_iter().enumerate() {
            if i > 0 {
                tokens.push(Token::punct(","));
            }
            push_expr(&mut tokens, element, if i > 0 { " " } else { "" });
        }
    }
    tokens.push(Token::punct("]"));
    Expression::from_tokens(tokens)
}

/// Object built from a block body
///
/// Attributes are sorted by name. Nested blocks are kept as entries too: a
/// single block becomes a nested object and repeated blocks of one type an
/// array of objects in document order.
#[must_use]
pub fn object_from_body(body: &Body) -> Expression {
    let mut entries: BTreeMap<String, Expression> = BTreeMap::new();
    for attr in body.attributes() {
        entries.insert(attr.name.clone(), attr.expr.clone());
    }

    let mut nested: BTreeMap<&str, Vec<Expression>> = BTreeMap::new();
    for block in body.blocks() {
        nested
            .entry(block.ident.as_str())
            .or_default()
            .push(object_from_body(&block.body));
    }
    for (ident, mut objects) in nested {
        if entries.contains_key(ident) {
            continue;
        }
        let value = if objects.len() == 1 {
            objects.remove(0)
        } else {
            array(objects)
        };
        entries.insert(ident.to_string(), value);
    }

    sorted_object(entries.into_iter().collect())
}

/// `[for <key>, <iterator> in <collection> : <value>]`
#[must_use]
pub fn for_list(
    iterator: &str,
    key_var: Option<&str>,
    collection: Expression,
    value: Expression,
) -> Expression {
    let mut tokens = vec![Token::punct("["), Token::ident("for")];
    push_for_head(&mut tokens, iterator, key_var, collection);
    push_expr(&mut tokens, value, " ");
    tokens.push(Token::punct("]"));
    Expression::from_tokens(tokens)
}

/// `{for <key>, <iterator> in <collection> : <key_expr> => <value>}`
#[must_use]
pub fn for_map(
    iterator: &str,
    key_var: Option<&str>,
    collection: Expression,
    key: Expression,
    value: Expression,
) -> Expression {
    let mut tokens = vec![Token::punct("{"), Token::ident("for")];
    push_for_head(&mut tokens, iterator, key_var, collection);
    push_expr(&mut tokens, key, " ");
    tokens.push(Token::punct("=>").with_spaces(" "));
    push_expr(&mut tokens, value, " ");
    tokens.push(Token::punct("}"));
    Expression::from_tokens(tokens)
}

fn push_for_head(
    tokens: &mut Vec<Token>,
    iterator: &str,
    key_var: Option<&str>,
    collection: Expression,
) {
    if let Some(key) = key_var {
        tokens.push(Token::ident(key).with_spaces(" "));
        tokens.push(Token::punct(","));
    }
    tokens.push(Token::ident(iterator).with_spaces(" "));
    tokens.push(Token::ident("in").with_spaces(" "));
    push_expr(tokens, collection, " ");
    tokens.push(Token::punct(":").with_spaces(" "));
}

/// Function call `<name>(<arg>, <arg>, ...)`
#[must_use]
pub fn call(name: &str, args: Vec<Expression>) -> Expression {
    let mut tokens = vec![Token::ident(name), Token::punct("(")];
    for (i, arg) in args.into_iter().enumerate() {
        if i > 0 {
            tokens.push(Token::punct(","));
        }
        push_expr(&mut tokens, arg, if i > 0 { " " } else { "" });
    }
    tokens.push(Token::punct(")"));
    Expression::from_tokens(tokens)
}

/// `concat(<list>, <list>, ...)`
#[must_use]
pub fn concat(lists: Vec<Expression>) -> Expression {
    call("concat", lists)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::print_expression;
    use pretty_assertions::assert_eq;

    fn expr(src: &str) -> Expression {
        Expression::parse(src).unwrap()
    }

    #[test]
    fn map_sorts_and_quotes_keys() {
        let mut entries = BTreeMap::new();
        entries.insert(
            "X-B".to_string(),
            sorted_object(vec![("op".into(), Expression::string("remove"))]),
        );
        entries.insert(
            "X-A".to_string(),
            sorted_object(vec![
                ("value".into(), Expression::string("v")),
                ("op".into(), Expression::string("set")),
            ]),
        );
        assert_eq!(
            print_expression(&map(entries)),
            "{\n  \"X-A\" = {\n    op = \"set\"\n    value = \"v\"\n  }\n  \"X-B\" = {\n    op = \"remove\"\n  }\n}"
        );
    }

    #[test]
    fn empty_shapes() {
        assert_eq!(object(vec![]).source(), "{}");
        assert_eq!(array(vec![]).source(), "[]");
    }

    #[test]
    fn array_layout_follows_elements() {
        let flat = array(vec![expr("var.a"), expr("\"b\"")]);
        assert_eq!(flat.source(), "[var.a, \"b\"]");

        let nested = array(vec![sorted_object(vec![("a".into(), expr("1"))])]);
        assert_eq!(print_expression(&nested), "[\n  {\n    a = 1\n  },\n]");
    }

    #[test]
    fn copied_expressions_keep_their_tokens() {
        let reference = expr("lookup(var.m,   \"k\", \"${local.d}\")");
        let obj = sorted_object(vec![("x".into(), reference.clone())]);
        assert!(obj.source().contains(&reference.source()));
    }

    #[test]
    fn object_from_body_sorts_and_keeps_nested_blocks() {
        let body = Body::parse("z = 1\na = var.a\ninner {\n  k = 2\n}\nrep {\n  n = 1\n}\nrep {\n  n = 2\n}\n")
            .unwrap();
        let out = print_expression(&object_from_body(&body));
        assert_eq!(
            out,
            "{\n  a = var.a\n  inner = {\n    k = 2\n  }\n  rep = [\n    {\n      n = 1\n    },\n    {\n      n = 2\n    },\n  ]\n  z = 1\n}"
        );
    }

    #[test]
    fn comprehension_forms() {
        let value = sorted_object(vec![("y".into(), expr("item.y"))]);
        let list = for_list("item", None, expr("var.list"), value.clone());
        assert_eq!(
            print_expression(&list),
            "[for item in var.list : {\n  y = item.y\n}]"
        );

        let keyed = for_map("item", Some("item_key"), expr("var.m"), expr("item_key"), value);
        assert!(keyed.source().starts_with("{for item_key, item in var.m : item_key => {"));
    }

    #[test]
    fn keys_that_need_quotes() {
        assert_eq!(ObjectKey::for_name("name"), ObjectKey::Ident("name".into()));
        assert_eq!(ObjectKey::for_name("X-A"), ObjectKey::Ident("X-A".into()));
        assert_eq!(ObjectKey::for_name("1a"), ObjectKey::Quoted("1a".into()));
        assert_eq!(ObjectKey::for_name("null"), ObjectKey::Quoted("null".into()));
        assert_eq!(concat(vec![expr("[1]"), expr("var.b")]).source(), "concat([1], var.b)");
    }
}

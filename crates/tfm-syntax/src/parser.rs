//! Parser from token stream to [`Body`]
//!
//! Attribute values are not parsed into an expression tree: the parser only
//! tracks bracket depth to find where a value ends and keeps the tokens.

use crate::body::{Attribute, Block, Body, Label, Structure};
use crate::error::{ParseError, Position};
use crate::expression::Expression;
use crate::lexer::{tokenize, Lexed};
use crate::token::{Token, TokenKind};

/// Parse a whole document
///
/// # Errors
/// Returns the first lexical or structural error with its position.
pub fn parse_body(src: &str) -> Result<Body, ParseError> {
    let tokens = tokenize(src)?;
    let end = end_position(src);
    let mut parser = Parser {
        tokens,
        pos: 0,
        end,
    };
    parser.body(false)
}

fn end_position(src: &str) -> Position {
    let line = src.matches('\n').count() + 1;
    let column = src.rsplit('\n').next().map_or(0, str::len) + 1;
    Position::new(line, column)
}

/// Space run before `=` kept for alignment; tabs and single spaces are not
fn alignment(spaces: &str) -> usize {
    if spaces.len() > 1 && spaces.bytes().all(|b| b == b' ') {
        spaces.len()
    } else {
        0
    }
}

struct Parser {
    tokens: Vec<Lexed>,
    pos: usize,
    end: Position,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|l| &l.token)
    }

    fn here(&self) -> Position {
        self.tokens.get(self.pos).map_or(self.end, |l| l.at)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|l| l.token.clone());
        self.pos += 1;
        token
    }

    fn body(&mut self, nested: bool) -> Result<Body, ParseError> {
        let mut items: Vec<Structure> = Vec::new();
        let mut newline_run = 0usize;

        loop {
            let Some(token) = self.peek() else {
                if nested {
                    return Err(ParseError::syntax("expected '}' to close block", self.end));
                }
                break;
            };

            match token.kind {
                TokenKind::Newline => {
                    newline_run += 1;
                    if newline_run == 2 && !items.is_empty() {
                        items.push(Structure::BlankLine);
                    }
                    self.pos += 1;
                    continue;
                }
                TokenKind::Comment => {
                    let text = token.text.clone();
                    self.pos += 1;
                    items.push(Structure::Comment(text));
                }
                TokenKind::Punct if token.text == "}" && nested => {
                    self.pos += 1;
                    break;
                }
                TokenKind::Ident => {
                    let item = self.item(nested)?;
                    items.push(item);
                }
                _ => {
                    return Err(ParseError::syntax(
                        format!("expected attribute or block, found '{}'", token.text),
                        self.here(),
                    ));
                }
            }
            newline_run = 0;
        }

        let mut body: Body = items.into_iter().collect();
        body.tidy_blank_lines();
        Ok(body)
    }

    fn item(&mut self, nested: bool) -> Result<Structure, ParseError> {
        let name = self.bump().map(|t| t.text).unwrap_or_default();

        if let Some(equals) = self.peek().filter(|t| t.is_punct("=")) {
            let padding = alignment(&equals.spaces_before);
            self.pos += 1;
            let expr = self.expression(nested)?;
            let trailing_comment = match self.peek() {
                Some(t) if t.kind == TokenKind::Comment => {
                    let text = t.text.clone();
                    self.pos += 1;
                    Some(text)
                }
                _ => None,
            };
            self.expect_item_end(nested)?;
            return Ok(Structure::Attribute(Attribute {
                name,
                expr,
                trailing_comment,
                padding,
            }));
        }

        let mut labels = Vec::new();
        loop {
            match self.peek() {
                Some(t) if t.kind == TokenKind::Template => {
                    let at = self.here();
                    let value = Expression::from_tokens(vec![t.clone()])
                        .as_string()
                        .ok_or_else(|| ParseError::syntax("block label must be a literal", at))?;
                    labels.push(Label::Quoted(value));
                    self.pos += 1;
                }
                Some(t) if t.kind == TokenKind::Ident => {
                    labels.push(Label::Bare(t.text.clone()));
                    self.pos += 1;
                }
                Some(t) if t.is_punct("{") => {
                    self.pos += 1;
                    break;
                }
                Some(t) => {
                    return Err(ParseError::syntax(
                        format!("expected '=' or '{{' after '{name}', found '{}'", t.text),
                        self.here(),
                    ));
                }
                None => {
                    return Err(ParseError::syntax(
                        format!("expected '=' or '{{' after '{name}'"),
                        self.end,
                    ));
                }
            }
        }

        let body = self.body(true)?;
        self.expect_item_end(nested)?;
        Ok(Structure::Block(Block {
            ident: name,
            labels,
            body,
        }))
    }

    fn expect_item_end(&self, nested: bool) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some(t) if t.kind == TokenKind::Newline => Ok(()),
            Some(t) if nested && t.is_punct("}") => Ok(()),
            Some(t) => Err(ParseError::syntax(
                format!("expected end of line, found '{}'", t.text),
                self.here(),
            )),
        }
    }

    fn expression(&mut self, nested: bool) -> Result<Expression, ParseError> {
        let start = self.here();
        let mut depth = 0usize;
        let mut tokens = Vec::new();

        while let Some(token) = self.peek() {
            if depth == 0 {
                if token.kind == TokenKind::Newline || token.kind == TokenKind::Comment {
                    break;
                }
                if token.is_punct("}") && nested {
                    break;
                }
            }
            if token.opens() {
                depth += 1;
            } else if token.closes() {
                if depth == 0 {
                    return Err(ParseError::syntax(
                        format!("unbalanced '{}'", token.text),
                        self.here(),
                    ));
                }
                depth -= 1;
            }
            tokens.push(token.clone());
            self.pos += 1;
        }

        if depth > 0 {
            return Err(ParseError::Unterminated {
                what: "bracketed expression",
                at: start,
            });
        }
        if tokens.is_empty() {
            return Err(ParseError::syntax("expected expression", start));
        }
        Ok(Expression::from_tokens(tokens))
    }
}

/// Parse a single expression from text
///
/// # Errors
/// Returns [`ParseError`] for lexical errors or unbalanced brackets.
pub fn parse_expression(src: &str) -> Result<Expression, ParseError> {
    let mut parser = Parser {
        tokens: tokenize(src.trim())?,
        pos: 0,
        end: end_position(src),
    };
    let expr = parser.expression(false)?;
    if let Some(token) = parser.peek() {
        if token.kind != TokenKind::Comment {
            return Err(ParseError::syntax(
                format!("unexpected '{}' after expression", token.text),
                parser.here(),
            ));
        }
    }
    Ok(expr)
}

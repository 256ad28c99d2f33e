//! Printer from [`Body`] back to text
//!
//! Token text and the spacing between tokens on a line are written as
//! carried. Only indentation at the start of a line is computed, from the
//! nesting of blocks and of brackets opened on earlier lines, which makes
//! printing a parsed document a fixed point.

use crate::body::{Body, Structure};
use crate::expression::Expression;
use crate::token::TokenKind;

const INDENT: &str = "  ";

/// Print a body as configuration text
#[must_use]
pub fn print_body(body: &Body) -> String {
    let mut out = String::new();
    write_body(&mut out, body, 0);
    out
}

/// Print one expression as it would appear at top level
#[must_use]
pub fn print_expression(expr: &Expression) -> String {
    let mut out = String::new();
    write_expression(&mut out, expr, 0);
    out
}

fn indent(out: &mut String, level: usize) {
    for _ in 0..level {
        out.push_str(INDENT);
    }
}

fn write_body(out: &mut String, body: &Body, level: usize) {
    for item in body.items() {
        match item {
            Structure::Attribute(attr) => {
                indent(out, level);
                out.push_str(&attr.name);
                out.push_str(&" ".repeat(attr.padding.max(1)));
                out.push_str("= ");
                write_expression(out, &attr.expr, level);
                if let Some(comment) = &attr.trailing_comment {
                    out.push(' ');
                    out.push_str(comment);
                }
                out.push('\n');
            }
            Structure::Block(block) => {
                indent(out, level);
                out.push_str(&block.ident);
                for label in &block.labels {
                    out.push(' ');
                    out.push_str(&label.to_string());
                }
                if block.body.items().is_empty() {
                    out.push_str(" {}\n");
                } else {
                    out.push_str(" {\n");
                    write_body(out, &block.body, level + 1);
                    indent(out, level);
                    out.push_str("}\n");
                }
            }
            Structure::Comment(text) => {
                indent(out, level);
                out.push_str(text);
                out.push('\n');
            }
            Structure::BlankLine => out.push('\n'),
        }
    }
}

fn write_expression(out: &mut String, expr: &Expression, level: usize) {
    // Indent level of the content of every open bracket.
    let mut open: Vec<usize> = Vec::new();
    let mut line_level = level;
    let mut at_line_start = false;

    for (i, token) in expr.tokens().iter().enumerate() {
        if token.kind == TokenKind::Newline {
            out.push('\n');
            at_line_start = true;
            continue;
        }

        if at_line_start {
            line_level = if token.closes() {
                open.last().map_or(level + 1, |l| *l).saturating_sub(1)
            } else {
                open.last().copied().unwrap_or(level)
            };
            indent(out, line_level);
            at_line_start = false;
        } else if i > 0 {
            out.push_str(&token.spaces_before);
        }

        out.push_str(&token.text);

        if token.opens() {
            open.push(line_level + 1);
        } else if token.closes() {
            open.pop();
        }
    }
}

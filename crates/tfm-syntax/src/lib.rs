//! Lossless syntax layer for block-structured configuration
//!
//! Parses configuration text into a [`Body`] of attributes, blocks,
//! comments and blank lines, and prints it back. Attribute values are kept
//! as opaque [`Expression`] token sequences: they are copied, never
//! evaluated, so references, calls and interpolations survive a migration
//! byte for byte.
//!
//! # Core Concepts
//!
//! - [`Expression`]: token sequence of one value, with literal inspection
//! - [`Body`] / [`Block`] / [`Attribute`]: ordered document tree
//! - [`builder`]: object, array, map and comprehension construction
//!
//! # Example
//!
//! ```rust
//! use tfm_syntax::{builder, Body, Expression};
//!
//! let mut body = Body::parse("resource \"t\" \"n\" {\n  a = var.a\n}\n").unwrap();
//! let block = body.first_block_mut("resource").unwrap();
//! let value = builder::sorted_object(vec![("x".into(), Expression::string("y"))]);
//! block.body.set_attribute("settings", value);
//! assert!(body.to_hcl().contains("settings = {"));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod body;
pub mod builder;
mod error;
mod expression;
mod lexer;
mod parser;
mod printer;
mod token;

// Re-exports
pub use body::{Attribute, Block, Body, Document, Label, Structure};
pub use error::{ParseError, Position};
pub use expression::{quote, Expression, Literal};
pub use lexer::{interpolation_spans, tokenize, Lexed};
pub use parser::{parse_body, parse_expression};
pub use printer::{print_body, print_expression};
pub use token::{render_tokens, Token, TokenKind};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn edit_and_print_keeps_untouched_text() {
        let src = r#"# managed by hand
resource "a_type" "main" {
  zone_id = var.zone_id
  name    = "${var.prefix}-main" # padded

  settings {
    mode = "strict"
  }
}

data "a_type" "lookup" {
  name = "x"
}
"#;
        let mut body = Body::parse(src).unwrap();
        let block = body.first_block_mut("resource").unwrap();
        let (index, mut found) = block.body.take_blocks("settings").unwrap();
        let settings = found.remove(0);
        block
            .body
            .set_attribute_at(index, "settings", builder::object_from_body(&settings.body));

        assert_eq!(
            body.to_hcl(),
            r#"# managed by hand
resource "a_type" "main" {
  zone_id = var.zone_id
  name    = "${var.prefix}-main" # padded

  settings = {
    mode = "strict"
  }
}

data "a_type" "lookup" {
  name = "x"
}
"#
        );
    }

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}

//! Block rewriter
//!
//! Structural edits that move a configuration body from a nested-block
//! schema to an attribute-valued one. Every operation takes the body by
//! mutable reference, treats a missing construct as nothing to do and
//! returns whether it changed anything.
//!
//! # Core Concepts
//!
//! - [`Conversion`]: block type to object, array or map attribute
//! - [`convert_dynamic_block`]: iterator blocks to comprehensions
//! - [`merge_sibling_blocks`]: sibling blocks folded into one object
//! - [`meta`]: shared modifiers and the `ignore_changes` filter
//! - [`Preprocessor`]: regex fixes on raw text, before parsing
//!
//! # Example
//!
//! ```rust
//! use tfm_rewrite::{apply_conversion, Conversion};
//! use tfm_syntax::Body;
//!
//! let mut body = Body::parse("settings {\n  mode = \"strict\"\n}\n").unwrap();
//! assert!(apply_conversion(&mut body, &Conversion::object("settings")));
//! assert_eq!(body.to_hcl(), "settings = {\n  mode = \"strict\"\n}\n");
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod attributes;
mod collapse;
mod dynamic;
mod error;
mod merge;
pub mod meta;
mod preprocess;

// Re-exports
pub use attributes::{
    remove_attributes, rename_attribute, rename_block, set_default, string_list_to_named_objects,
};
pub use collapse::{
    apply_conversion, apply_conversions, collapse_blocks_to_array, collapse_blocks_to_map,
    collapse_single_block, Conversion,
};
pub use dynamic::{convert_dynamic_block, DynamicShape, DYNAMIC_BLOCK};
pub use error::{Result, RewriteError};
pub use merge::{merge_sibling_blocks, MergeRule, WILDCARD};
pub use preprocess::Preprocessor;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tfm_syntax::Body;

    #[test]
    fn rule_pipeline_on_one_resource() {
        let src = r#"resource "cloud_ruleset" "main" {
  zone_id = var.zone_id
  old_name = "r"

  rules {
    action = "block"
    action_parameters {
      response {
        status_code = 403
      }
    }
  }
  rules {
    action = "log"
  }
}
"#;
        let mut doc = Body::parse(src).unwrap();
        let block = doc.first_block_mut("resource").unwrap();
        let rules = Conversion::array("rules", true).with_nested(
            Conversion::object("action_parameters").with_nested(Conversion::object("response")),
        );
        assert!(rename_attribute(&mut block.body, "old_name", "name"));
        assert!(apply_conversion(&mut block.body, &rules));

        let once = doc.to_hcl();
        assert_eq!(
            once,
            r#"resource "cloud_ruleset" "main" {
  zone_id = var.zone_id
  name = "r"

  rules = [
    {
      action = "block"
      action_parameters = {
        response = {
          status_code = 403
        }
      }
    },
    {
      action = "log"
    },
  ]
}
"#
        );

        let mut again = Body::parse(&once).unwrap();
        let block = again.first_block_mut("resource").unwrap();
        assert!(!rename_attribute(&mut block.body, "old_name", "name"));
        assert!(!apply_conversion(&mut block.body, &rules));
        assert_eq!(again.to_hcl(), once);
    }
}

//! Merging same-typed sibling blocks into one object attribute
//!
//! Each sibling names its slot through a literal attribute and contributes
//! one value field:
//!
//! ```hcl
//! filter {
//!   direction = "include"
//!   values    = ["a", "b"]
//! }
//! filter {
//!   direction = "exclude"
//!   values    = ["*"]
//! }
//! ```
//!
//! becomes
//!
//! ```hcl
//! filter = {
//!   exclude = {
//!     all = true
//!   }
//!   include = {
//!     names = ["a", "b"]
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tfm_syntax::{builder, Body, Expression};
use tracing::{debug, warn};

/// Value marking "every element" in a source list
pub const WILDCARD: &str = "*";

/// How sibling blocks are folded into one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRule {
    /// Target attribute name
    pub attribute: String,

    /// Sibling attribute whose literal value names the slot
    #[serde(default = "default_slot_attribute")]
    pub slot_attribute: String,

    /// Sibling attribute holding the contributed value
    #[serde(default = "default_value_field")]
    pub value_field: String,

    /// Field wrapping a regular value inside the slot object
    #[serde(default = "default_list_field")]
    pub list_field: String,

    /// Flag set to `true` when the value is the wildcard list `["*"]`
    #[serde(default = "default_wildcard_flag")]
    pub wildcard_flag: String,
}

fn default_slot_attribute() -> String {
    "direction".to_string()
}

fn default_value_field() -> String {
    "values".to_string()
}

fn default_list_field() -> String {
    "names".to_string()
}

fn default_wildcard_flag() -> String {
    "all".to_string()
}

impl MergeRule {
    /// Create a rule writing to `attribute`
    #[must_use]
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            slot_attribute: default_slot_attribute(),
            value_field: default_value_field(),
            list_field: default_list_field(),
            wildcard_flag: default_wildcard_flag(),
        }
    }

    /// Set the slot-naming attribute
    #[must_use]
    pub fn with_slot_attribute(mut self, name: impl Into<String>) -> Self {
        self.slot_attribute = name.into();
        self
    }

    /// Set the contributed value field
    #[must_use]
    pub fn with_value_field(mut self, name: impl Into<String>) -> Self {
        self.value_field = name.into();
        self
    }

    /// Set the wrapping list field
    #[must_use]
    pub fn with_list_field(mut self, name: impl Into<String>) -> Self {
        self.list_field = name.into();
        self
    }

    /// Set the wildcard flag name
    #[must_use]
    pub fn with_wildcard_flag(mut self, name: impl Into<String>) -> Self {
        self.wildcard_flag = name.into();
        self
    }

    fn slot_value(&self, value: Expression) -> Expression {
        let is_wildcard = value
            .as_string_list()
            .is_some_and(|list| list.len() == 1 && list[0] == WILDCARD);
        if is_wildcard {
            builder::sorted_object(vec![(self.wildcard_flag.clone(), Expression::bool(true))])
        } else {
            builder::sorted_object(vec![(self.list_field.clone(), value)])
        }
    }
}

/// Fold sibling blocks of `block_type` into one object attribute
///
/// When any sibling lacks a literal slot or the value field, or repeats a
/// slot, nothing is merged and the body is left untouched.
pub fn merge_sibling_blocks(body: &mut Body, block_type: &str, rule: &MergeRule) -> bool {
    if body.has_attribute(&rule.attribute) {
        return false;
    }

    let mut slots: BTreeMap<String, Expression> = BTreeMap::new();
    for block in body.blocks_of_type(block_type) {
        let slot = block
            .body
            .expr(&rule.slot_attribute)
            .and_then(Expression::as_literal)
            .and_then(|l| l.as_key());
        let value = block.body.expr(&rule.value_field).cloned();
        match (slot, value) {
            (Some(slot), Some(value)) if !slots.contains_key(&slot) => {
                slots.insert(slot, rule.slot_value(value));
            }
            _ => {
                warn!(block_type, "sibling block cannot be merged, blocks left in place");
                return false;
            }
        }
    }

    let Some((index, _)) = body.take_blocks(block_type) else {
        return false;
    };
    let entries = slots.into_iter().collect();
    body.set_attribute_at(index, &rule.attribute, builder::sorted_object(entries));
    debug!(block_type, attribute = %rule.attribute, "merged sibling blocks");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn include_exclude_with_wildcard() {
        let mut body = Body::parse(
            "filter {\n  direction = \"include\"\n  values = [\"a\", \"b\"]\n}\nfilter {\n  direction = \"exclude\"\n  values = [\"*\"]\n}\n",
        )
        .unwrap();
        let rule = MergeRule::new("filter");
        assert!(merge_sibling_blocks(&mut body, "filter", &rule));
        assert_eq!(
            body.to_hcl(),
            "filter = {\n  exclude = {\n    all = true\n  }\n  include = {\n    names = [\"a\", \"b\"]\n  }\n}\n"
        );
        assert!(!merge_sibling_blocks(&mut body, "filter", &rule));
    }

    #[test]
    fn reference_values_are_wrapped_verbatim() {
        let mut body = Body::parse("scope {\n  kind = \"allow\"\n  ids = var.ids\n}\n").unwrap();
        let rule = MergeRule::new("scopes")
            .with_slot_attribute("kind")
            .with_value_field("ids")
            .with_list_field("list")
            .with_wildcard_flag("any");
        assert!(merge_sibling_blocks(&mut body, "scope", &rule));
        assert_eq!(body.to_hcl(), "scopes = {\n  allow = {\n    list = var.ids\n  }\n}\n");
    }

    #[test]
    fn unmergeable_siblings_stay() {
        let mut body = Body::parse("f {\n  values = [\"x\"]\n}\n").unwrap();
        assert!(!merge_sibling_blocks(&mut body, "f", &MergeRule::new("f")));
        assert_eq!(body.blocks().count(), 1);
    }

    #[test]
    fn one_bad_sibling_leaves_body_untouched() {
        let src = "f {\n  direction = \"include\"\n  values = [\"a\"]\n}\nx = 1\nf {\n  values = [\"b\"]\n}\n";
        let mut body = Body::parse(src).unwrap();
        assert!(!merge_sibling_blocks(&mut body, "f", &MergeRule::new("f")));
        assert_eq!(body.to_hcl(), src);
    }
}

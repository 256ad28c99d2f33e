//! Block collapsing: nested blocks to object, array and map attributes
//!
//! All operations treat a missing block as nothing to do and return whether
//! the body changed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tfm_syntax::{builder, Body, Expression};
use tracing::{debug, warn};

/// Target shape of one block type, with conversions for blocks nested in it
///
/// Nested conversions run first, so inner blocks are already attributes when
/// the outer block is turned into an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Conversion {
    /// At most one block, becomes an object attribute
    Object {
        /// Block type
        block: String,
        /// Attribute name (defaults to the block type)
        #[serde(default)]
        attribute: Option<String>,
        /// Conversions applied inside each block first
        #[serde(default)]
        nested: Vec<Conversion>,
    },
    /// Repeated blocks, become an array of objects in document order
    Array {
        /// Block type
        block: String,
        /// Attribute name (defaults to the block type)
        #[serde(default)]
        attribute: Option<String>,
        /// Emit `[]` when no block is present
        #[serde(default)]
        force_empty: bool,
        /// Conversions applied inside each block first
        #[serde(default)]
        nested: Vec<Conversion>,
    },
    /// Repeated blocks keyed by a literal attribute, become a map
    Map {
        /// Block type
        block: String,
        /// Attribute holding the map key
        key: String,
        /// Attribute name (defaults to the block type)
        #[serde(default)]
        attribute: Option<String>,
        /// Conversions applied inside each block first
        #[serde(default)]
        nested: Vec<Conversion>,
    },
}

impl Conversion {
    /// Object conversion without nesting
    #[must_use]
    pub fn object(block: impl Into<String>) -> Self {
        Self::Object {
            block: block.into(),
            attribute: None,
            nested: Vec::new(),
        }
    }

    /// Array conversion without nesting
    #[must_use]
    pub fn array(block: impl Into<String>, force_empty: bool) -> Self {
        Self::Array {
            block: block.into(),
            attribute: None,
            force_empty,
            nested: Vec::new(),
        }
    }

    /// Map conversion keyed by `key`
    #[must_use]
    pub fn map(block: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Map {
            block: block.into(),
            key: key.into(),
            attribute: None,
            nested: Vec::new(),
        }
    }

    /// Write the result to a differently named attribute
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>) -> Self {
        match &mut self {
            Self::Object { attribute, .. }
            | Self::Array { attribute, .. }
            | Self::Map { attribute, .. } => *attribute = Some(name.into()),
        }
        self
    }

    /// Add a conversion for blocks nested inside this one
    #[must_use]
    pub fn with_nested(mut self, conversion: Conversion) -> Self {
        match &mut self {
            Self::Object { nested, .. } | Self::Array { nested, .. } | Self::Map { nested, .. } => {
                nested.push(conversion);
            }
        }
        self
    }

    /// Block type this conversion applies to
    #[inline]
    #[must_use]
    pub fn block(&self) -> &str {
        match self {
            Self::Object { block, .. } | Self::Array { block, .. } | Self::Map { block, .. } => {
                block
            }
        }
    }

    /// Attribute the result is written to
    #[must_use]
    pub fn attribute(&self) -> &str {
        match self {
            Self::Object { attribute, block, .. }
            | Self::Array { attribute, block, .. }
            | Self::Map { attribute, block, .. } => attribute.as_deref().unwrap_or(block),
        }
    }

    fn nested(&self) -> &[Conversion] {
        match self {
            Self::Object { nested, .. } | Self::Array { nested, .. } | Self::Map { nested, .. } => {
                nested
            }
        }
    }
}

/// Apply conversions in order
pub fn apply_conversions(body: &mut Body, conversions: &[Conversion]) -> bool {
    let mut changed = false;
    for conversion in conversions {
        changed |= apply_conversion(body, conversion);
    }
    changed
}

/// Apply one conversion, innermost blocks first
pub fn apply_conversion(body: &mut Body, conversion: &Conversion) -> bool {
    let mut changed = false;
    if !conversion.nested().is_empty() {
        for block in body.blocks_mut().filter(|b| b.ident == conversion.block()) {
            changed |= apply_conversions(&mut block.body, conversion.nested());
        }
    }

    let attribute = conversion.attribute();
    let applied = match conversion {
        Conversion::Object { block, .. } => collapse_single_block(body, block, attribute),
        Conversion::Array {
            block, force_empty, ..
        } => collapse_blocks_to_array(body, block, attribute, *force_empty),
        Conversion::Map { block, key, .. } => collapse_blocks_to_map(body, block, key, attribute),
    };
    changed || applied
}

/// Replace the first block of `block_type` by an object attribute
///
/// A block without attributes becomes `{}`. Skipped when `attribute`
/// already exists.
pub fn collapse_single_block(body: &mut Body, block_type: &str, attribute: &str) -> bool {
    if body.first_block(block_type).is_none() {
        return false;
    }
    if body.has_attribute(attribute) {
        warn!(block_type, attribute, "attribute already present, block left in place");
        return false;
    }
    let Some((index, block)) = body.take_first_block(block_type) else {
        return false;
    };
    if body.first_block(block_type).is_some() {
        warn!(block_type, "more than one block for a single-object field, only the first was converted");
    }
    body.set_attribute_at(index, attribute, builder::object_from_body(&block.body));
    debug!(block_type, attribute, "collapsed block to object");
    true
}

/// Replace every block of `block_type` by an array of objects
///
/// Elements keep document order. With `force_empty`, a missing block yields
/// `attribute = []` unless the attribute is already set.
pub fn collapse_blocks_to_array(
    body: &mut Body,
    block_type: &str,
    attribute: &str,
    force_empty: bool,
) -> bool {
    if body.has_attribute(attribute) {
        return false;
    }
    let Some((index, blocks)) = body.take_blocks(block_type) else {
        if force_empty {
            body.set_attribute(attribute, builder::array(Vec::new()));
            debug!(block_type, attribute, "emitted empty array");
            return true;
        }
        return false;
    };
    let elements = blocks
        .iter()
        .map(|b| builder::object_from_body(&b.body))
        .collect();
    body.set_attribute_at(index, attribute, builder::array(elements));
    debug!(block_type, attribute, count = blocks.len(), "collapsed blocks to array");
    true
}

/// Replace blocks of `block_type` by a map keyed by a literal attribute
///
/// The key attribute is dropped from each value object. Keys are sorted.
/// When any block lacks a literal key or repeats an earlier one, nothing
/// is converted and the body is left untouched.
pub fn collapse_blocks_to_map(
    body: &mut Body,
    block_type: &str,
    key_attribute: &str,
    attribute: &str,
) -> bool {
    if body.has_attribute(attribute) {
        return false;
    }

    let mut entries: BTreeMap<String, Expression> = BTreeMap::new();
    for block in body.blocks_of_type(block_type) {
        let Some(key) = block
            .body
            .expr(key_attribute)
            .and_then(Expression::as_literal)
            .and_then(|l| l.as_key())
        else {
            warn!(block_type, key_attribute, "block has no literal key, blocks left in place");
            return false;
        };
        if entries.contains_key(&key) {
            warn!(block_type, key = %key, "duplicate map key, blocks left in place");
            return false;
        }
        let mut value = block.body.clone();
        value.remove_attribute(key_attribute);
        entries.insert(key, builder::object_from_body(&value));
    }

    let Some((index, _)) = body.take_blocks(block_type) else {
        return false;
    };
    body.set_attribute_at(index, attribute, builder::map(entries));
    debug!(block_type, attribute, "collapsed blocks to map");
    true
}

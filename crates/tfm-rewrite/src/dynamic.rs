//! Iterator blocks to comprehension expressions
//!
//! ```hcl
//! dynamic "rule" {
//!   for_each = var.rules
//!   iterator = item
//!   content {
//!     action = item.value.action
//!   }
//! }
//! ```
//!
//! becomes `rule = [for item in var.rules : { action = item.action }]`.

use serde::{Deserialize, Serialize};
use tfm_syntax::{builder, Block, Body, Expression, Structure};
use tracing::{debug, warn};

/// Block type of iterator constructs
pub const DYNAMIC_BLOCK: &str = "dynamic";

/// Shape of the generated comprehension
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum DynamicShape {
    /// `[for it in src : {...}]`
    #[default]
    List,
    /// `{for k, it in src : <key> => {...}}`
    Map {
        /// Content attribute used as the map key; the source key otherwise
        #[serde(default)]
        key_attribute: Option<String>,
    },
}

/// Convert `dynamic "<block_type>"` blocks into one comprehension attribute
///
/// Static blocks of the same type are kept in list-shaped output: consecutive
/// static blocks form a tuple and the parts are joined with `concat(...)` in
/// document order. For map-shaped output several iterator blocks are joined
/// with `merge(...)` and static blocks are left alone.
pub fn convert_dynamic_block(
    body: &mut Body,
    block_type: &str,
    attribute: &str,
    shape: &DynamicShape,
) -> bool {
    let is_target = |b: &Block| b.ident == DYNAMIC_BLOCK && b.label(0) == Some(block_type);
    if !body.blocks().any(|b| is_target(b)) {
        return false;
    }
    if body.has_attribute(attribute) {
        warn!(block_type, attribute, "attribute already present, iterator block left in place");
        return false;
    }
    let include_static = matches!(shape, DynamicShape::List);

    let mut first_index = None;
    let mut taken: Vec<Block> = Vec::new();
    let mut kept: Vec<Structure> = Vec::with_capacity(body.items().len());
    for (i, item) in std::mem::take(body.items_mut()).into_iter().enumerate() {
        match item {
            Structure::Block(b) if is_target(&b) || (include_static && b.ident == block_type) => {
                first_index.get_or_insert(i - taken.len());
                taken.push(b);
            }
            other => kept.push(other),
        }
    }
    *body.items_mut() = kept;

    let mut parts: Vec<Expression> = Vec::new();
    let mut statics: Vec<Expression> = Vec::new();
    for block in taken {
        if is_target(&block) {
            if !statics.is_empty() {
                parts.push(builder::array(std::mem::take(&mut statics)));
            }
            parts.push(comprehension(&block, block_type, shape));
        } else {
            statics.push(builder::object_from_body(&block.body));
        }
    }
    if !statics.is_empty() {
        parts.push(builder::array(statics));
    }

    let value = if parts.len() == 1 {
        parts.remove(0)
    } else if include_static {
        builder::concat(parts)
    } else {
        builder::call("merge", parts)
    };
    body.set_attribute_at(first_index.unwrap_or(0), attribute, value);
    debug!(block_type, attribute, "converted iterator block to comprehension");
    true
}

fn iterator_name(block: &Block, block_type: &str) -> String {
    let Some(expr) = block.body.expr("iterator") else {
        return block_type.to_string();
    };
    if let Some(name) = expr.as_string() {
        return name;
    }
    match expr.traversal_steps() {
        Some(steps) if steps.len() == 1 => steps[0].clone(),
        _ => {
            warn!(block_type, iterator = %expr, "unsupported iterator expression, using block type");
            block_type.to_string()
        }
    }
}

fn comprehension(block: &Block, block_type: &str, shape: &DynamicShape) -> Expression {
    let iterator = iterator_name(block, block_type);
    let key_var = format!("{iterator}_key");
    let collection = block
        .body
        .expr("for_each")
        .cloned()
        .unwrap_or_else(Expression::null);

    let mut content = block
        .body
        .first_block("content")
        .map(|c| c.body.clone())
        .unwrap_or_default();

    let mut uses_key = false;
    content.visit_expressions_mut(&mut |expr| {
        uses_key |= expr.references_iterator_key(&iterator);
        expr.rewrite_iterator(&iterator, &key_var);
    });

    match shape {
        DynamicShape::List => {
            let value = builder::object_from_body(&content);
            builder::for_list(&iterator, uses_key.then_some(key_var.as_str()), collection, value)
        }
        DynamicShape::Map { key_attribute } => {
            let key = key_attribute
                .as_deref()
                .and_then(|name| content.remove_attribute(name))
                .map_or_else(|| Expression::traversal(&[key_var.as_str()]), |a| a.expr);
            let value = builder::object_from_body(&content);
            builder::for_map(&iterator, Some(&key_var), collection, key, value)
        }
    }
}

//! Single-element array collapsing
//!
//! A field stored as a list but typed as a single nested object in the
//! target schema collapses: `[]` to `null`, `[x]` to `x`. Longer lists stay.
//! Exempt fields keep their list shape at any length, but their elements
//! are still walked.

use serde_json::Value;
use tracing::trace;

use crate::fields::{segments, visit_parents};

/// Collapse every non-exempt array field below `value`
pub fn collapse_single_element_arrays<S: AsRef<str>>(value: &mut Value, exempt: &[S]) -> bool {
    collapse_children(value, exempt)
}

/// Collapse the field at `path` and everything below it
pub fn collapse_single_element_arrays_at<S: AsRef<str>>(
    attrs: &mut Value,
    path: &str,
    exempt: &[S],
) -> bool {
    let segs = segments(path);
    visit_parents(attrs, &segs, &mut |map, leaf| match map.get_mut(leaf) {
        Some(child) => collapse_field(leaf, child, exempt),
        None => false,
    })
}

fn is_exempt<S: AsRef<str>>(key: &str, exempt: &[S]) -> bool {
    exempt.iter().any(|e| e.as_ref() == key)
}

fn collapse_children<S: AsRef<str>>(value: &mut Value, exempt: &[S]) -> bool {
    match value {
        Value::Object(map) => {
            let mut changed = false;
            for (key, child) in map.iter_mut() {
                changed |= collapse_field(key, child, exempt);
            }
            changed
        }
        Value::Array(items) => {
            let mut changed = false;
            for item in items {
                changed |= collapse_children(item, exempt);
            }
            changed
        }
        _ => false,
    }
}

fn collapse_field<S: AsRef<str>>(key: &str, child: &mut Value, exempt: &[S]) -> bool {
    let len = match &*child {
        Value::Array(items) if !is_exempt(key, exempt) => Some(items.len()),
        _ => None,
    };
    let Some(len) = len else {
        return collapse_children(child, exempt);
    };
    match len {
        0 => {
            *child = Value::Null;
            trace!(field = key, "collapsed empty array to null");
            true
        }
        1 => {
            if let Value::Array(mut items) = std::mem::take(child) {
                *child = items.pop().unwrap_or(Value::Null);
            }
            trace!(field = key, "collapsed single-element array");
            collapse_field(key, child, exempt);
            true
        }
        _ => collapse_children(child, exempt),
    }
}

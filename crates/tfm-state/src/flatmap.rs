//! Legacy flat/indexed attribute encoding
//!
//! Older state stored nested values as flat keys: `rules.# = "2"` with
//! `rules.0.action`, `rules.1.action` for lists, and `tags.% = "1"` with
//! `tags.env` for maps. Decoding replaces those keys with one nested value
//! at the position of the first flat key. Input without the count key is
//! left alone, so decoding already-nested attributes is a no-op.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Suffix of list count keys
pub const LIST_COUNT: &str = "#";

/// Suffix of map count keys
pub const MAP_COUNT: &str = "%";

fn parse_count(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        _ => None,
    }
}

/// Replace every `<field>` / `<field>.*` key by `field = value`
fn replace_field_keys(map: &mut Map<String, Value>, field: &str, value: Value) {
    let prefix = format!("{field}.");
    let mut value = Some(value);
    let entries = std::mem::take(map);
    for (key, old) in entries {
        if key == field || key.starts_with(&prefix) {
            if let Some(v) = value.take() {
                map.insert(field.to_string(), v);
            }
        } else {
            map.insert(key, old);
        }
    }
}

/// Decode `<field>.#` list keys into a nested array
///
/// Elements are ordered by numeric index, which also orders set-style
/// hashed indexes. The list holds exactly the elements found; a count
/// that disagrees is logged, never padded to. A count of `0` yields `[]`.
/// Element objects are decoded recursively. Returns `false` when there is
/// no count key.
pub fn decode_flat_indexed(attrs: &mut Value, field: &str) -> bool {
    let Value::Object(map) = attrs else {
        return false;
    };
    let count_key = format!("{field}.{LIST_COUNT}");
    let Some(count) = map.get(&count_key).map(parse_count) else {
        return false;
    };
    if count.is_none() {
        warn!(field, "unreadable list count, decoding found elements");
    }

    let prefix = format!("{field}.");
    let mut objects: BTreeMap<u64, Map<String, Value>> = BTreeMap::new();
    let mut scalars: BTreeMap<u64, Value> = BTreeMap::new();
    for (key, value) in map.iter() {
        let Some(rest) = key.strip_prefix(&prefix) else {
            continue;
        };
        let (index, sub) = match rest.split_once('.') {
            Some((index, sub)) => (index, Some(sub)),
            None => (rest, None),
        };
        let Ok(index) = index.parse::<u64>() else {
            continue;
        };
        match sub {
            Some(sub) => {
                objects
                    .entry(index)
                    .or_default()
                    .insert(sub.to_string(), value.clone());
            }
            None => {
                scalars.insert(index, value.clone());
            }
        }
    }

    let mut indexes: Vec<u64> = objects.keys().chain(scalars.keys()).copied().collect();
    indexes.sort_unstable();
    indexes.dedup();

    let mut items: Vec<Value> = Vec::with_capacity(indexes.len());
    for index in indexes {
        if let Some(element) = objects.remove(&index) {
            let mut element = Value::Object(element);
            expand_all_flat(&mut element);
            items.push(element);
        } else if let Some(scalar) = scalars.remove(&index) {
            items.push(scalar);
        }
    }
    if let Some(count) = count.filter(|&count| count != items.len()) {
        warn!(field, count, found = items.len(), "list count disagrees with indexed elements");
    }

    debug!(field, elements = items.len(), "decoded flat list");
    replace_field_keys(map, field, Value::Array(items));
    true
}

/// Decode `<field>.%` map keys into a nested object
///
/// Entry keys are taken verbatim after the `<field>.` prefix.
pub fn decode_flat_map(attrs: &mut Value, field: &str) -> bool {
    let Value::Object(map) = attrs else {
        return false;
    };
    let count_key = format!("{field}.{MAP_COUNT}");
    if !map.contains_key(&count_key) {
        return false;
    }
    let prefix = format!("{field}.");
    let mut entries: BTreeMap<String, Value> = BTreeMap::new();
    for (key, value) in map.iter() {
        if key == &count_key {
            continue;
        }
        if let Some(rest) = key.strip_prefix(&prefix) {
            entries.insert(rest.to_string(), value.clone());
        }
    }
    debug!(field, entries = entries.len(), "decoded flat map");
    replace_field_keys(map, field, Value::Object(entries.into_iter().collect()));
    true
}

/// Decode one field, whichever count key it carries
pub fn expand_flat_field(attrs: &mut Value, field: &str) -> bool {
    decode_flat_indexed(attrs, field) || decode_flat_map(attrs, field)
}

/// Decode every top-level flat field
pub fn expand_all_flat(attrs: &mut Value) -> bool {
    let Value::Object(map) = &*attrs else {
        return false;
    };
    let fields: Vec<String> = map
        .keys()
        .filter_map(|key| {
            let field = key
                .strip_suffix(&format!(".{LIST_COUNT}"))
                .or_else(|| key.strip_suffix(&format!(".{MAP_COUNT}")))?;
            (!field.contains('.')).then(|| field.to_string())
        })
        .collect();

    let mut changed = false;
    for field in fields {
        changed |= expand_flat_field(attrs, &field);
    }
    changed
}

/// Check whether attributes carry any flat count key
#[must_use]
pub fn is_flat(attrs: &Value) -> bool {
    attrs.as_object().is_some_and(|map| {
        map.keys()
            .any(|k| k.ends_with(&format!(".{LIST_COUNT}")) || k.ends_with(&format!(".{MAP_COUNT}")))
    })
}

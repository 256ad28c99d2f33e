//! Structural shape changes mirroring the configuration side
//!
//! Keys and ordering follow the block rewriter: map keys come from the
//! literal key field and are sorted, and named-object lists keep the
//! original element order.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::fields::{put_key, segments, visit_parents};

/// Map key for a scalar JSON value, as the configuration side renders it
#[must_use]
pub fn key_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `[{name: "a", v: 1}, ...]` to `{"a": {v: 1}, ...}`
///
/// Left alone when any element lacks a scalar key or keys repeat, so no
/// element is lost. An object value is already converted.
pub fn keyed_list_to_map(attrs: &mut Value, path: &str, key_field: &str) -> bool {
    visit_parents(attrs, &segments(path), &mut |map, leaf| {
        let Some(Value::Array(items)) = map.get(leaf) else {
            return false;
        };

        let mut entries: BTreeMap<String, Value> = BTreeMap::new();
        for item in items {
            let Some(object) = item.as_object() else {
                warn!(field = leaf, "keyed list element is not an object");
                return false;
            };
            let Some(key) = object.get(key_field).and_then(key_of) else {
                warn!(field = leaf, key_field, "keyed list element has no key");
                return false;
            };
            let rest: Map<String, Value> = object
                .iter()
                .filter(|(k, _)| k.as_str() != key_field)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            if entries.insert(key, Value::Object(rest)).is_some() {
                warn!(field = leaf, "duplicate key in keyed list");
                return false;
            }
        }

        put_key(map, leaf, Value::Object(entries.into_iter().collect()));
        debug!(field = leaf, "converted keyed list to map");
        true
    })
}

/// `["a", "b"]` to `[{<name_field>: "a"}, {<name_field>: "b"}]`
///
/// Only a non-empty list made entirely of strings is converted.
pub fn string_list_to_named_objects(attrs: &mut Value, path: &str, name_field: &str) -> bool {
    visit_parents(attrs, &segments(path), &mut |map, leaf| {
        let Some(Value::Array(items)) = map.get(leaf) else {
            return false;
        };
        if items.is_empty() || !items.iter().all(Value::is_string) {
            return false;
        }
        let converted: Vec<Value> = items
            .iter()
            .map(|s| {
                let mut object = Map::new();
                object.insert(name_field.to_string(), s.clone());
                Value::Object(object)
            })
            .collect();
        put_key(map, leaf, Value::Array(converted));
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn headers_to_sorted_map() {
        let mut v = json!({"headers": [
            {"name": "X-B", "op": "remove"},
            {"name": "X-A", "op": "set", "value": "v"}
        ]});
        assert!(keyed_list_to_map(&mut v, "headers", "name"));
        assert_eq!(
            v.to_string(),
            r#"{"headers":{"X-A":{"op":"set","value":"v"},"X-B":{"op":"remove"}}}"#
        );
        assert!(!keyed_list_to_map(&mut v, "headers", "name"));
    }

    #[test]
    fn keyless_element_blocks_conversion() {
        let mut v = json!({"headers": [{"name": "a"}, {"op": "x"}]});
        assert!(!keyed_list_to_map(&mut v, "headers", "name"));
        assert!(v["headers"].is_array());
    }

    #[test]
    fn strings_to_named_objects() {
        let mut v = json!({"countries": ["US", "CA"]});
        assert!(string_list_to_named_objects(&mut v, "countries", "name"));
        assert_eq!(v, json!({"countries": [{"name": "US"}, {"name": "CA"}]}));
        assert!(!string_list_to_named_objects(&mut v, "countries", "name"));
    }
}

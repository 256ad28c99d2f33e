//! Field edits on dotted paths
//!
//! Paths are dot-separated keys relative to an instance's attributes
//! (`settings.mode`). A `*` segment addresses every element of an array;
//! applied to an object it addresses the object itself, so a path keeps
//! working after a single-element array was collapsed.

use serde_json::{Map, Value};
use tracing::debug;

/// Split a dotted path into segments
#[must_use]
pub fn segments(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

/// Value at a dotted path without wildcards
#[must_use]
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    segments(path)
        .into_iter()
        .try_fold(value, |current, segment| current.get(segment))
}

/// Call `visit` with every object that owns the last segment of `segments`
///
/// Returns whether any call reported a change.
pub(crate) fn visit_parents(
    value: &mut Value,
    segments: &[&str],
    visit: &mut dyn FnMut(&mut Map<String, Value>, &str) -> bool,
) -> bool {
    match segments {
        [] => false,
        [last] => match value {
            Value::Object(map) => visit(map, last),
            _ => false,
        },
        ["*", rest @ ..] => {
            if value.is_object() {
                return visit_parents(value, rest, visit);
            }
            let Value::Array(items) = value else {
                return false;
            };
            let mut changed = false;
            for item in items {
                changed |= visit_parents(item, rest, visit);
            }
            changed
        }
        [head, rest @ ..] => match value.get_mut(*head) {
            Some(child) => visit_parents(child, rest, visit),
            None => false,
        },
    }
}

/// Rename a key in place, keeping its position
///
/// No-op when `from` is missing or `to` already exists.
pub(crate) fn rename_key(map: &mut Map<String, Value>, from: &str, to: &str) -> bool {
    if from == to || !map.contains_key(from) || map.contains_key(to) {
        return false;
    }
    let entries = std::mem::take(map);
    for (key, value) in entries {
        if key == from {
            map.insert(to.to_string(), value);
        } else {
            map.insert(key, value);
        }
    }
    true
}

/// Remove a key, keeping the order of the remaining keys
pub(crate) fn remove_key(map: &mut Map<String, Value>, key: &str) -> Option<Value> {
    if !map.contains_key(key) {
        return None;
    }
    let mut removed = None;
    let entries = std::mem::take(map);
    for (k, v) in entries {
        if k == key {
            removed = Some(v);
        } else {
            map.insert(k, v);
        }
    }
    removed
}

/// Replace the value of an existing key, or append a new key
pub(crate) fn put_key(map: &mut Map<String, Value>, key: &str, value: Value) {
    match map.get_mut(key) {
        Some(slot) => *slot = value,
        None => {
            map.insert(key.to_string(), value);
        }
    }
}

/// Rename a field
///
/// When both paths share a parent the key is renamed in place (wildcards
/// allowed). Otherwise the value moves to `to`, creating missing parent
/// objects. Never overwrites an existing destination.
pub fn rename_field(attrs: &mut Value, from: &str, to: &str) -> bool {
    let from_segments = segments(from);
    let to_segments = segments(to);
    let (Some((from_leaf, from_parent)), Some((to_leaf, to_parent))) =
        (from_segments.split_last(), to_segments.split_last())
    else {
        return false;
    };

    let changed = if from_parent == to_parent {
        visit_parents(attrs, &from_segments, &mut |map, leaf| rename_key(map, leaf, to_leaf))
    } else {
        move_field(attrs, from_parent, from_leaf, to_parent, to_leaf)
    };
    if changed {
        debug!(from, to, "renamed state field");
    }
    changed
}

fn move_field(attrs: &mut Value, from_parent: &[&str], from_leaf: &str, to_parent: &[&str], to_leaf: &str) -> bool {
    if from_parent.contains(&"*") || to_parent.contains(&"*") {
        return false;
    }
    let source_exists = from_parent
        .iter()
        .try_fold(&*attrs, |v, s| v.get(*s))
        .and_then(|p| p.get(from_leaf))
        .is_some();
    let dest_exists = to_parent
        .iter()
        .try_fold(&*attrs, |v, s| v.get(*s))
        .and_then(|p| p.get(to_leaf))
        .is_some();
    if !source_exists || dest_exists {
        return false;
    }

    let mut taken = None;
    let mut path: Vec<&str> = from_parent.to_vec();
    path.push(from_leaf);
    visit_parents(attrs, &path, &mut |map, leaf| {
        taken = remove_key(map, leaf);
        taken.is_some()
    });
    let Some(value) = taken else {
        return false;
    };

    let mut target = attrs;
    for segment in to_parent {
        let Value::Object(map) = target else {
            return false;
        };
        target = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    match target {
        Value::Object(map) => {
            map.insert(to_leaf.to_string(), value);
            true
        }
        _ => false,
    }
}

/// Remove fields by path; already-absent fields are ignored
pub fn remove_fields<S: AsRef<str>>(attrs: &mut Value, paths: &[S]) -> bool {
    let mut changed = false;
    for path in paths {
        let segs = segments(path.as_ref());
        changed |= visit_parents(attrs, &segs, &mut |map, leaf| remove_key(map, leaf).is_some());
    }
    changed
}

/// Write `default` only where the field is completely absent
///
/// A present value is never replaced, whatever it is (`false`, `0`, `""`
/// and `null` included). Parents are not created.
pub fn ensure_field_with_default(attrs: &mut Value, path: &str, default: &Value) -> bool {
    let segs = segments(path);
    visit_parents(attrs, &segs, &mut |map, leaf| {
        if map.contains_key(leaf) {
            return false;
        }
        map.insert(leaf.to_string(), default.clone());
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn get_nested_path() {
        let v = json!({"a": {"b": {"c": 1}}});
        assert_eq!(get_path(&v, "a.b.c"), Some(&json!(1)));
        assert_eq!(get_path(&v, "a.x"), None);
    }

    #[test]
    fn rename_keeps_position() {
        let mut v = json!({"a": 1, "old": 2, "z": 3});
        assert!(rename_field(&mut v, "old", "new"));
        assert_eq!(v.to_string(), r#"{"a":1,"new":2,"z":3}"#);
        assert!(!rename_field(&mut v, "old", "new"));
    }

    #[test]
    fn rename_never_clobbers() {
        let mut v = json!({"old": 1, "new": 2});
        assert!(!rename_field(&mut v, "old", "new"));
        assert_eq!(v, json!({"old": 1, "new": 2}));
    }

    #[test]
    fn rename_through_wildcard() {
        let mut v = json!({"rules": [{"old": 1}, {"old": 2}, {"other": 3}]});
        assert!(rename_field(&mut v, "rules.*.old", "rules.*.new"));
        assert_eq!(v, json!({"rules": [{"new": 1}, {"new": 2}, {"other": 3}]}));

        let mut v = json!({"rules": {"old": 1}});
        assert!(rename_field(&mut v, "rules.*.old", "rules.*.new"));
        assert_eq!(v, json!({"rules": {"new": 1}}));
    }

    #[test]
    fn move_to_new_parent() {
        let mut v = json!({"mode": "strict", "x": 1});
        assert!(rename_field(&mut v, "mode", "settings.mode"));
        assert_eq!(v, json!({"x": 1, "settings": {"mode": "strict"}}));
        assert!(!rename_field(&mut v, "mode", "settings.mode"));
    }

    #[test]
    fn remove_is_idempotent() {
        let mut v = json!({"a": 1, "b": {"c": 2, "d": 3}});
        assert!(remove_fields(&mut v, &["a", "b.c"]));
        assert!(!remove_fields(&mut v, &["a", "b.c"]));
        assert_eq!(v, json!({"b": {"d": 3}}));
    }

    #[test]
    fn default_does_not_override_falsy() {
        let mut v = json!({"enabled": false, "count": 0, "name": "", "gone": null});
        for field in ["enabled", "count", "name", "gone"] {
            assert!(!ensure_field_with_default(&mut v, field, &json!("x")));
        }
        assert!(ensure_field_with_default(&mut v, "ttl", &json!(1)));
        assert_eq!(v["ttl"], json!(1));
        assert!(!ensure_field_with_default(&mut v, "missing.child", &json!(1)));
    }
}

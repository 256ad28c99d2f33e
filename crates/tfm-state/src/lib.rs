//! State normalizer
//!
//! JSON passes that bring a stored resource instance in line with a new
//! schema, plus the router that walks a state document and re-renders only
//! what changed.
//!
//! # Core Concepts
//!
//! - Field edits on dotted paths: [`rename_field`], [`remove_fields`],
//!   [`ensure_field_with_default`]
//! - Legacy flat attributes: [`decode_flat_indexed`], [`expand_all_flat`]
//! - Shape changes: [`collapse_single_element_arrays`], [`keyed_list_to_map`]
//! - Type changes: [`convert_numeric_widened`], [`coerce_field_types`]
//! - [`DocumentRouter`]: full state, single resource or single instance
//!
//! Every pass is idempotent and returns whether it changed anything.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use tfm_state::{collapse_single_element_arrays, rename_field};
//!
//! let mut attrs = json!({"old": 1, "limits": [{"burst": 10}]});
//! rename_field(&mut attrs, "old", "new");
//! collapse_single_element_arrays(&mut attrs, &[] as &[&str]);
//! assert_eq!(attrs, json!({"new": 1, "limits": {"burst": 10}}));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod coerce;
mod collapse;
mod document;
mod error;
mod fields;
mod flatmap;
mod shape;

// Re-exports
pub use coerce::{coerce_field_types, convert_numeric_widened, normalize_empty_strings, FieldType};
pub use collapse::{collapse_single_element_arrays, collapse_single_element_arrays_at};
pub use document::{
    detect_shape, prepare_instance, DocumentRouter, DocumentShape, InstanceSite, InstanceUpdate,
    ResourceMode, StateOutcome, ATTRIBUTES, ATTRIBUTES_FLAT, INSTANCES, RESOURCES,
};
pub use error::{Result, StateError};
pub use fields::{ensure_field_with_default, get_path, remove_fields, rename_field, segments};
pub use flatmap::{
    decode_flat_indexed, decode_flat_map, expand_all_flat, expand_flat_field, is_flat, LIST_COUNT,
    MAP_COUNT,
};
pub use shape::{key_of, keyed_list_to_map, string_list_to_named_objects};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    fn normalize(attrs: &mut Value) -> bool {
        let mut changed = expand_all_flat(attrs);
        changed |= rename_field(attrs, "old_ttl", "ttl");
        changed |= collapse_single_element_arrays(attrs, &["rules"]);
        changed |= convert_numeric_widened(
            attrs,
            &["ratelimit.period", "ratelimit.timeout"],
            &["ratelimit.timeout"],
        );
        changed |= keyed_list_to_map(attrs, "rules.*.headers", "name");
        changed |= ensure_field_with_default(attrs, "enabled", &json!(true));
        changed
    }

    #[test]
    fn legacy_instance_normalizes_in_one_pass() {
        let mut attrs = json!({
            "id": "r1",
            "old_ttl": "300",
            "ratelimit.#": "1",
            "ratelimit.0.period": "60",
            "ratelimit.0.timeout": "0",
            "rules.#": "1",
            "rules.0.headers.#": "2",
            "rules.0.headers.0.name": "X-B",
            "rules.0.headers.1.name": "X-A"
        });
        assert!(normalize(&mut attrs));
        assert_eq!(
            attrs,
            json!({
                "id": "r1",
                "ttl": "300",
                "ratelimit": {"period": 60.0},
                "rules": [{"headers": {"X-A": {}, "X-B": {}}}],
                "enabled": true
            })
        );

        let settled = attrs.clone();
        assert!(!normalize(&mut attrs));
        assert_eq!(attrs, settled);
    }

    #[test]
    fn router_applies_passes_per_instance() {
        let text = r#"{"version":4,"resources":[{"mode":"managed","type":"rec","name":"a",
            "instances":[{"attributes":{"old_ttl":1}}]}]}"#;
        let out = DocumentRouter::new()
            .rewrite(text, |_: &InstanceSite, mut instance: Value| -> Result<_> {
                if let Some(attrs) = instance.get_mut(ATTRIBUTES) {
                    rename_field(attrs, "old_ttl", "ttl");
                }
                Ok(InstanceUpdate::rewritten(instance))
            })
            .unwrap()
            .unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["resources"][0]["instances"][0]["attributes"], json!({"ttl": 1}));
    }
}

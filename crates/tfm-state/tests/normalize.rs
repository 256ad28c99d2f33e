use proptest::prelude::*;
use serde_json::{json, Map, Value};
use tfm_state::{
    collapse_single_element_arrays, convert_numeric_widened, expand_all_flat, keyed_list_to_map,
    remove_fields, rename_field, DocumentRouter, InstanceSite, InstanceUpdate, StateError,
};

fn flat_rules(actions: &[String]) -> Value {
    let mut map = Map::new();
    map.insert("id".into(), json!("r"));
    map.insert("rules.#".into(), json!(actions.len().to_string()));
    for (i, action) in actions.iter().enumerate() {
        map.insert(format!("rules.{i}.action"), json!(action));
        map.insert(format!("rules.{i}.limits.#"), json!("1"));
        map.insert(format!("rules.{i}.limits.0.period"), json!(i.to_string()));
    }
    Value::Object(map)
}

fn normalize(attrs: &mut Value) -> bool {
    let mut changed = expand_all_flat(attrs);
    changed |= rename_field(attrs, "rules.*.action", "rules.*.kind");
    changed |= collapse_single_element_arrays(attrs, &["rules"]);
    changed |= convert_numeric_widened(attrs, &["rules.*.limits.period"], &[] as &[&str]);
    changed |= remove_fields(attrs, &["legacy"]);
    changed
}

fn attribute_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::from),
        "[a-z]{0,4}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,3}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn prop_flat_rules_decode_in_order(actions in prop::collection::vec("[a-z]{1,6}", 0..6)) {
        let mut attrs = flat_rules(&actions);
        prop_assert!(normalize(&mut attrs));

        let rules = attrs["rules"].as_array().unwrap();
        prop_assert_eq!(rules.len(), actions.len());
        for (i, rule) in rules.iter().enumerate() {
            prop_assert_eq!(&rule["kind"], &json!(actions[i]));
            prop_assert!(rule["limits"]["period"].is_f64());
        }
    }

    #[test]
    fn prop_normalize_is_idempotent(
        actions in prop::collection::vec("[a-z]{1,6}", 0..6),
        extra in prop::collection::btree_map("[a-z]{1,4}", attribute_value(), 0..4),
    ) {
        let mut attrs = flat_rules(&actions);
        if let Value::Object(map) = &mut attrs {
            for (key, value) in extra {
                map.entry(key).or_insert(value);
            }
        }
        normalize(&mut attrs);
        let once = attrs.clone();
        prop_assert!(!normalize(&mut attrs));
        prop_assert_eq!(attrs, once);
    }

    #[test]
    fn prop_untouched_state_is_verbatim(names in prop::collection::vec("[a-z]{1,8}", 1..5)) {
        let resources: Vec<Value> = names
            .iter()
            .map(|n| json!({"mode": "managed", "type": "rec", "name": n,
                            "instances": [{"attributes": {"id": n}}]}))
            .collect();
        let text = serde_json::to_string_pretty(&json!({"version": 4, "resources": resources})).unwrap();
        let out = DocumentRouter::new()
            .rewrite(&text, |_: &InstanceSite, v: Value| -> Result<_, StateError> {
                Ok(InstanceUpdate::rewritten(v))
            })
            .unwrap();
        prop_assert_eq!(out, Some(text));
    }
}

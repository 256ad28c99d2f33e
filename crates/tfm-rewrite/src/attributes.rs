//! Attribute and block edits on a body
//!
//! Configuration-side counterparts of the state field edits. Each returns
//! whether the body changed.

use tfm_syntax::{builder, Body, Expression};
use tracing::debug;

/// Rename an attribute, keeping its position
///
/// No-op when the source is missing or the destination is already set.
pub fn rename_attribute(body: &mut Body, from: &str, to: &str) -> bool {
    let renamed = body.rename_attribute(from, to);
    if renamed {
        debug!(from, to, "renamed attribute");
    }
    renamed
}

/// Remove attributes by name
pub fn remove_attributes<S: AsRef<str>>(body: &mut Body, names: &[S]) -> bool {
    let mut changed = false;
    for name in names {
        changed |= body.remove_attribute(name.as_ref()).is_some();
    }
    changed
}

/// Set an attribute only when it is absent
///
/// An explicit value, including `false`, `0` or `""`, is never replaced.
pub fn set_default(body: &mut Body, name: &str, value: Expression) -> bool {
    if body.has_attribute(name) {
        return false;
    }
    body.set_attribute(name, value);
    debug!(name, "injected default");
    true
}

/// Rename every nested block of one type
pub fn rename_block(body: &mut Body, from: &str, to: &str) -> bool {
    let mut changed = false;
    for block in body.blocks_mut().filter(|b| b.ident == from) {
        block.ident = to.to_string();
        changed = true;
    }
    changed
}

/// Turn a list of strings into a list of `{ <name_field> = ... }` objects
///
/// A literal list is rewritten element by element in order; `[]` is
/// already in the new shape and is left alone. A plain
/// reference becomes `[for value in <ref> : { <name_field> = value }]`.
/// Anything else (including the converted forms) is left alone.
pub fn string_list_to_named_objects(body: &mut Body, attribute: &str, name_field: &str) -> bool {
    let Some(expr) = body.expr(attribute) else {
        return false;
    };

    let converted = if let Some(values) = expr.as_string_list() {
        if values.is_empty() {
            return false;
        }
        builder::array(
            values
                .iter()
                .map(|v| builder::sorted_object(vec![(name_field.to_string(), Expression::string(v))]))
                .collect(),
        )
    } else if expr.is_traversal() {
        let item = builder::sorted_object(vec![(
            name_field.to_string(),
            Expression::traversal(&["value"]),
        )]);
        builder::for_list("value", None, expr.clone(), item)
    } else {
        return false;
    };

    body.set_attribute(attribute, converted);
    debug!(attribute, name_field, "converted string list to named objects");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn body(src: &str) -> Body {
        Body::parse(src).unwrap()
    }

    #[test]
    fn default_never_overrides_explicit_falsy() {
        let mut b = body("enabled = false\n");
        assert!(!set_default(&mut b, "enabled", Expression::bool(true)));
        assert_eq!(b.to_hcl(), "enabled = false\n");
        assert!(set_default(&mut b, "ttl", Expression::number(1)));
        assert_eq!(b.to_hcl(), "enabled = false\nttl = 1\n");
    }

    #[test]
    fn remove_and_rename() {
        let mut b = body("a = 1\nb = 2\nc = 3\n");
        assert!(remove_attributes(&mut b, &["b", "missing"]));
        assert!(!remove_attributes(&mut b, &["b"]));
        assert!(rename_attribute(&mut b, "a", "z"));
        assert_eq!(b.to_hcl(), "z = 1\nc = 3\n");
    }

    #[test]
    fn block_rename() {
        let mut b = body("old {\n  x = 1\n}\nold {\n  x = 2\n}\n");
        assert!(rename_block(&mut b, "old", "new"));
        assert_eq!(b.blocks_of_type("new").count(), 2);
        assert!(!rename_block(&mut b, "old", "new"));
    }

    #[test]
    fn literal_list_to_objects() {
        let mut b = body("countries = [\"US\", \"CA\"]\n");
        assert!(string_list_to_named_objects(&mut b, "countries", "name"));
        assert_eq!(
            b.to_hcl(),
            "countries = [\n  {\n    name = \"US\"\n  },\n  {\n    name = \"CA\"\n  },\n]\n"
        );
        assert!(!string_list_to_named_objects(&mut b, "countries", "name"));
    }

    #[test]
    fn empty_list_is_left_alone() {
        let mut b = body("countries = []\n");
        assert!(!string_list_to_named_objects(&mut b, "countries", "name"));
        assert_eq!(b.to_hcl(), "countries = []\n");
    }

    #[test]
    fn reference_list_to_comprehension() {
        let mut b = body("countries = var.countries\n");
        assert!(string_list_to_named_objects(&mut b, "countries", "name"));
        assert_eq!(
            b.to_hcl(),
            "countries = [for value in var.countries : {\n  name = value\n}]\n"
        );
        assert!(!string_list_to_named_objects(&mut b, "countries", "name"));
    }
}

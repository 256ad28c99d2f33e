//! Shared modifiers of resource declarations
//!
//! Meta-arguments apply to a declaration as a whole rather than to the
//! resource schema. They are copied onto every block produced from one
//! source declaration.

use tfm_syntax::{builder, Body, Expression, Structure};
use tracing::debug;

/// Meta-argument attributes
pub const META_ATTRIBUTES: &[&str] = &["count", "for_each", "depends_on", "provider"];

/// Meta-argument blocks
pub const META_BLOCKS: &[&str] = &["lifecycle", "timeouts"];

/// Lifecycle block
pub const LIFECYCLE: &str = "lifecycle";

/// Field list inside the lifecycle block
pub const IGNORE_CHANGES: &str = "ignore_changes";

/// Check whether an attribute or block name is a meta-argument
#[inline]
#[must_use]
pub fn is_meta(name: &str) -> bool {
    META_ATTRIBUTES.contains(&name) || META_BLOCKS.contains(&name)
}

/// Copy every meta-argument of `from` that `to` does not already carry
pub fn copy_meta_arguments(from: &Body, to: &mut Body) -> bool {
    let mut changed = false;
    for name in META_ATTRIBUTES {
        if let Some(expr) = from.expr(name) {
            if !to.has_attribute(name) {
                to.set_attribute(name, expr.clone());
                changed = true;
            }
        }
    }
    for name in META_BLOCKS {
        if to.first_block(name).is_some() {
            continue;
        }
        for block in from.blocks_of_type(name) {
            to.push_block(block.clone());
            changed = true;
        }
    }
    changed
}

/// Body without its meta-arguments
#[must_use]
pub fn without_meta_arguments(body: &Body) -> Body {
    body.items()
        .iter()
        .filter(|item| match item {
            Structure::Attribute(a) => !META_ATTRIBUTES.contains(&a.name.as_str()),
            Structure::Block(b) => !META_BLOCKS.contains(&b.ident.as_str()),
            _ => true,
        })
        .cloned()
        .collect()
}

/// How `ignore_changes` entries follow a schema change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreChangesRules {
    legacy_roots: Vec<String>,
    reshaped_roots: Vec<String>,
    renamed_roots: Vec<(String, String)>,
}

impl IgnoreChangesRules {
    /// Create empty rules; every entry is kept
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Roots that no longer exist; every entry under them is dropped
    #[must_use]
    pub fn with_legacy_roots<I, S>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.legacy_roots.extend(roots.into_iter().map(Into::into));
        self
    }

    /// Blocks that became an object or map; only indexed entries
    /// (`settings[0].mode`) are dropped
    #[must_use]
    pub fn with_reshaped_roots<I, S>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reshaped_roots.extend(roots.into_iter().map(Into::into));
        self
    }

    /// Root renamed in place; entries under it are rewritten
    #[must_use]
    pub fn with_rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.renamed_roots.push((from.into(), to.into()));
        self
    }

    fn is_legacy(&self, steps: &[String]) -> bool {
        let Some(root) = steps.first() else {
            return false;
        };
        let indexed = steps.iter().skip(1).any(|s| s.starts_with('['));
        self.legacy_roots.iter().any(|l| l == root)
            || (indexed && self.reshaped_roots.iter().any(|r| r == root))
    }

    fn rename(&self, element: &mut Expression) -> bool {
        let mut changed = false;
        for (from, to) in &self.renamed_roots {
            changed |= element.rename_address(&[from.as_str()], &[to.as_str()]);
        }
        changed
    }
}

/// Bring `ignore_changes` entries in line with the new shape
///
/// Entries under a legacy root are dropped, as are indexed entries under
/// a reshaped root. Entries under a renamed root are rewritten. Everything
/// else is kept, including indexed entries on untouched attributes
/// (`tags["env"]`) and `ignore_changes = all`. An emptied list removes the
/// attribute and an emptied lifecycle block is removed too. Returns the
/// dropped entries.
pub fn filter_ignore_changes(body: &mut Body, rules: &IgnoreChangesRules) -> Vec<String> {
    let Some(lifecycle) = body.first_block_mut(LIFECYCLE) else {
        return Vec::new();
    };
    let Some(elements) = lifecycle
        .body
        .expr(IGNORE_CHANGES)
        .and_then(Expression::tuple_elements)
    else {
        return Vec::new();
    };

    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    let mut renamed = false;
    for mut element in elements {
        let original = element.source();
        let was_renamed = rules.rename(&mut element);
        if element.traversal_steps().is_some_and(|steps| rules.is_legacy(&steps)) {
            dropped.push(original);
        } else {
            renamed |= was_renamed;
            kept.push(element);
        }
    }
    if dropped.is_empty() && !renamed {
        return dropped;
    }

    if kept.is_empty() {
        lifecycle.body.remove_attribute(IGNORE_CHANGES);
    } else {
        lifecycle.body.set_attribute(IGNORE_CHANGES, builder::array(kept));
    }
    if lifecycle.body.is_empty() {
        body.take_first_block(LIFECYCLE);
    }
    debug!(dropped = ?dropped, renamed, "updated ignore_changes entries");
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn body(src: &str) -> Body {
        Body::parse(src).unwrap()
    }

    #[test]
    fn copies_all_modifiers() {
        let source = body(
            "count = 2\nprovider = cloud.alt\ndepends_on = [a.b]\nname = \"x\"\nlifecycle {\n  create_before_destroy = true\n}\ntimeouts {\n  create = \"5m\"\n}\n",
        );
        let mut target = body("zone = \"z\"\n");
        assert!(copy_meta_arguments(&source, &mut target));
        assert_eq!(
            target.to_hcl(),
            "zone = \"z\"\ncount = 2\ndepends_on = [a.b]\nprovider = cloud.alt\nlifecycle {\n  create_before_destroy = true\n}\ntimeouts {\n  create = \"5m\"\n}\n"
        );
        assert!(!copy_meta_arguments(&source, &mut target));
    }

    #[test]
    fn strips_meta_arguments() {
        let stripped = without_meta_arguments(&body("count = 1\nname = \"x\"\nlifecycle {}\n"));
        assert_eq!(stripped.to_hcl(), "name = \"x\"\n");
    }

    #[test]
    fn legacy_ignore_changes_are_dropped() {
        let mut b = body(
            "lifecycle {\n  ignore_changes = [name, rules[0].action, settings.mode]\n  prevent_destroy = true\n}\n",
        );
        let rules = IgnoreChangesRules::new()
            .with_legacy_roots(["settings"])
            .with_reshaped_roots(["rules"]);
        let dropped = filter_ignore_changes(&mut b, &rules);
        assert_eq!(dropped, vec!["rules[0].action", "settings.mode"]);
        assert_eq!(
            b.to_hcl(),
            "lifecycle {\n  ignore_changes = [name]\n  prevent_destroy = true\n}\n"
        );
    }

    #[test]
    fn indexed_entries_on_untouched_attributes_are_kept() {
        let src = "lifecycle {\n  ignore_changes = [tags[\"env\"], rules[0], settings]\n}\n";
        let mut b = body(src);
        let rules = IgnoreChangesRules::new().with_reshaped_roots(["settings"]);
        assert!(filter_ignore_changes(&mut b, &rules).is_empty());
        assert_eq!(b.to_hcl(), src);
    }

    #[test]
    fn renamed_roots_are_rewritten() {
        let mut b = body("lifecycle {\n  ignore_changes = [tiered_caching, name, value_2]\n}\n");
        let rules = IgnoreChangesRules::new().with_rename("tiered_caching", "value");
        assert!(filter_ignore_changes(&mut b, &rules).is_empty());
        assert_eq!(
            b.to_hcl(),
            "lifecycle {\n  ignore_changes = [value, name, value_2]\n}\n"
        );
    }

    #[test]
    fn emptied_lifecycle_is_removed() {
        let mut b = body("name = 1\nlifecycle {\n  ignore_changes = [rules[0]]\n}\n");
        let rules = IgnoreChangesRules::new().with_reshaped_roots(["rules"]);
        assert_eq!(filter_ignore_changes(&mut b, &rules).len(), 1);
        assert_eq!(b.to_hcl(), "name = 1\n");
    }

    #[test]
    fn all_is_kept() {
        let mut b = body("lifecycle {\n  ignore_changes = all\n}\n");
        let rules = IgnoreChangesRules::new().with_legacy_roots(["x"]);
        assert!(filter_ignore_changes(&mut b, &rules).is_empty());
        assert!(b.first_block("lifecycle").is_some());
    }
}

//! One-to-many resource expansion
//!
//! A source type that became several target types is split by its
//! discriminators: the attributes (or blocks) that select a target. The
//! coordinator classifies a declaration, emits one block per selected
//! target and links only the primary target to the old address.
//!
//! # Classification
//!
//! - no discriminator present: [`ExpansionState::DefaultTarget`], the
//!   default target gets a synthesized discriminator value
//! - one present: [`ExpansionState::SingleTarget`]
//! - several present: [`ExpansionState::DualTarget`], the first in
//!   declaration order is primary, the others are new declarations the
//!   operator has to reconcile
//!
//! State instances are classified the same way; the resolved type is
//! recorded in the context.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tfm_rewrite::meta::{self, IgnoreChangesRules};
use tfm_rewrite::collapse_single_block;
use tfm_state::{ensure_field_with_default, remove_fields, rename_field, InstanceSite, ATTRIBUTES};
use tfm_syntax::builder::{self, ObjectKey};
use tfm_syntax::{Block, Body, Expression, Structure};
use tracing::{debug, warn};

use crate::context::MigrationContext;
use crate::migrator::{declaration, TransformResult};

/// Classification of one source declaration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ExpansionState {
    /// Not looked at yet
    #[default]
    Unclassified,
    /// Exactly one discriminator present (target index)
    SingleTarget(usize),
    /// Several discriminators present (target indexes, primary first)
    DualTarget(Vec<usize>),
    /// No discriminator present
    DefaultTarget,
}

impl ExpansionState {
    fn from_present(present: Vec<usize>) -> Self {
        match present.as_slice() {
            [] => Self::DefaultTarget,
            [only] => Self::SingleTarget(*only),
            _ => Self::DualTarget(present),
        }
    }
}

/// One target of a split
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitTarget {
    /// Source attribute or block selecting this target
    pub discriminator: String,
    /// Target resource type
    pub target_type: String,
    /// Name of the discriminator in the target (defaults to the same name)
    #[serde(default)]
    pub attribute: Option<String>,
}

impl SplitTarget {
    /// Create a target selected by `discriminator`
    #[must_use]
    pub fn new(discriminator: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            discriminator: discriminator.into(),
            target_type: target_type.into(),
            attribute: None,
        }
    }

    /// Rename the discriminator in the target
    #[inline]
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>) -> Self {
        self.attribute = Some(name.into());
        self
    }

    /// Discriminator name in the target
    #[inline]
    #[must_use]
    pub fn attribute_name(&self) -> &str {
        self.attribute.as_deref().unwrap_or(&self.discriminator)
    }
}

/// Split rules for one source type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionCoordinator {
    /// Targets in declaration order
    pub targets: Vec<SplitTarget>,
    /// Discriminator of the target used when none is present
    #[serde(default)]
    pub default_target: Option<String>,
    /// Value synthesized for the default target's discriminator
    #[serde(default)]
    pub default_value: Value,
    /// `ignore_changes` roots that only exist in the source shape
    #[serde(default)]
    pub legacy_roots: Vec<String>,
}

impl ExpansionCoordinator {
    /// Create a coordinator for `targets`
    #[must_use]
    pub fn new(targets: Vec<SplitTarget>) -> Self {
        Self {
            targets,
            default_target: None,
            default_value: Value::Null,
            legacy_roots: Vec::new(),
        }
    }

    /// Default target and its synthesized value
    #[inline]
    #[must_use]
    pub fn with_default(mut self, discriminator: impl Into<String>, value: Value) -> Self {
        self.default_target = Some(discriminator.into());
        self.default_value = value;
        self
    }

    /// Extra legacy `ignore_changes` roots
    #[inline]
    #[must_use]
    pub fn with_legacy_roots(mut self, roots: Vec<String>) -> Self {
        self.legacy_roots = roots;
        self
    }

    fn default_index(&self) -> usize {
        self.default_target
            .as_deref()
            .and_then(|d| self.targets.iter().position(|t| t.discriminator == d))
            .unwrap_or(0)
    }

    /// Classify a configuration body
    #[must_use]
    pub fn classify_body(&self, body: &Body) -> ExpansionState {
        let present = self
            .targets
            .iter()
            .enumerate()
            .filter(|(_, t)| {
                body.has_attribute(&t.discriminator) || body.first_block(&t.discriminator).is_some()
            })
            .map(|(i, _)| i)
            .collect();
        ExpansionState::from_present(present)
    }

    /// Classify instance attributes
    #[must_use]
    pub fn classify_attributes(&self, attrs: &Value) -> ExpansionState {
        let present = self
            .targets
            .iter()
            .enumerate()
            .filter(|(_, t)| attrs.get(&t.discriminator).is_some_and(is_set))
            .map(|(i, _)| i)
            .collect();
        ExpansionState::from_present(present)
    }

    /// Chosen targets, primary first, and whether the default is synthesized
    fn chosen(&self, state: &ExpansionState) -> Option<(Vec<usize>, bool)> {
        if self.targets.is_empty() {
            return None;
        }
        match state {
            ExpansionState::Unclassified => None,
            ExpansionState::SingleTarget(i) => Some((vec![*i], false)),
            ExpansionState::DualTarget(all) => Some((all.clone(), false)),
            ExpansionState::DefaultTarget => Some((vec![self.default_index()], true)),
        }
    }

    /// Discriminators of every target but `index`, minus names `index` keeps
    fn foreign_names(&self, index: usize) -> Vec<String> {
        let own = &self.targets[index];
        self.targets
            .iter()
            .enumerate()
            .filter(|(i, t)| {
                *i != index
                    && t.discriminator != own.discriminator
                    && t.discriminator != own.attribute_name()
            })
            .map(|(_, t)| t.discriminator.clone())
            .collect()
    }

    /// Split one declaration block
    pub fn expand_block(&self, ctx: &mut MigrationContext, block: &Block) -> TransformResult {
        let Some(decl) = declaration(block) else {
            return TransformResult::unchanged();
        };
        let state = self.classify_body(&block.body);
        let Some((chosen, synthesized)) = self.chosen(&state) else {
            warn!(address = %decl.address(), "split without targets");
            return TransformResult::unchanged();
        };
        debug!(address = %decl.address(), ?state, "expanding declaration");

        let discriminators: Vec<&str> = self.targets.iter().map(|t| t.discriminator.as_str()).collect();
        let shared: Body = meta::without_meta_arguments(&block.body)
            .items()
            .iter()
            .filter(|item| match item {
                Structure::Attribute(a) => !discriminators.contains(&a.name.as_str()),
                Structure::Block(b) => !discriminators.contains(&b.ident.as_str()),
                _ => true,
            })
            .cloned()
            .collect();

        let mut blocks = Vec::with_capacity(chosen.len() + 1);
        for (position, &index) in chosen.iter().enumerate() {
            let target = &self.targets[index];
            let mut body = shared.clone();
            if synthesized {
                body.set_attribute(target.attribute_name(), expression_from_json(&self.default_value));
                ctx.applied(format!("default {} for {}", target.attribute_name(), target.target_type));
            } else {
                carry_discriminator(&block.body, &mut body, target);
            }
            meta::copy_meta_arguments(&block.body, &mut body);

            let mut rules = IgnoreChangesRules::new()
                .with_legacy_roots(self.legacy_roots.iter().cloned())
                .with_legacy_roots(self.foreign_names(index));
            if target.discriminator != target.attribute_name() {
                rules = rules.with_rename(&target.discriminator, target.attribute_name());
            }
            let dropped = meta::filter_ignore_changes(&mut body, &rules);
            if !dropped.is_empty() {
                ctx.manual_action(format!(
                    "dropped ignore_changes entries {} on {}.{}",
                    dropped.join(", "),
                    target.target_type,
                    decl.name
                ));
            }

            let mut out = Block {
                ident: block.ident.clone(),
                labels: block.labels.clone(),
                body,
            };
            out.set_label(0, target.target_type.clone());
            blocks.push(out);

            if position == 0 {
                ctx.applied(format!("split into {}", target.target_type));
                ctx.record_rename(
                    &decl.steps_with_type(decl.resource_type),
                    &decl.steps_with_type(&target.target_type),
                );
                if !decl.data && ctx.moved_blocks_enabled() {
                    blocks.push(moved_block(decl.resource_type, &target.target_type, decl.name));
                }
            } else {
                ctx.manual_action(format!(
                    "secondary target {}.{} has no prior state, import or reconcile it",
                    target.target_type, decl.name
                ));
            }
        }
        TransformResult::replace(blocks)
    }

    /// Rewrite one state instance for its resolved target
    ///
    /// Returns the instance and the target type, which is also recorded in
    /// the context under the instance address.
    pub fn expand_instance(
        &self,
        ctx: &mut MigrationContext,
        site: &InstanceSite,
        mut instance: Value,
    ) -> (Value, Option<String>) {
        let state = instance
            .get(ATTRIBUTES)
            .map_or(ExpansionState::DefaultTarget, |a| self.classify_attributes(a));
        let Some((chosen, synthesized)) = self.chosen(&state) else {
            return (instance, None);
        };
        let index = chosen[0];
        let target = &self.targets[index];

        if let Some(attrs) = instance.get_mut(ATTRIBUTES) {
            if remove_fields(attrs, &self.foreign_names(index)) {
                ctx.applied("removed foreign discriminators");
            }
            let changed = if synthesized {
                ensure_field_with_default(attrs, target.attribute_name(), &self.default_value)
            } else {
                rename_field(attrs, &target.discriminator, target.attribute_name())
            };
            if changed {
                ctx.applied(format!("discriminator {}", target.attribute_name()));
            }
        }
        if chosen.len() > 1 {
            ctx.manual_action(format!(
                "instance kept as {}, other targets start without state",
                target.target_type
            ));
        }
        ctx.record_instance_type(&site.address(), &target.target_type);
        ctx.applied(format!("resolved type {}", target.target_type));
        (instance, Some(target.target_type.clone()))
    }
}

fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

/// Copy the target's own discriminator from the source body
fn carry_discriminator(source: &Body, body: &mut Body, target: &SplitTarget) {
    if let Some(expr) = source.expr(&target.discriminator) {
        body.set_attribute(target.attribute_name(), expr.clone());
        return;
    }
    for nested in source.blocks_of_type(&target.discriminator) {
        body.push_block(nested.clone());
    }
    if target.attribute.is_some() {
        collapse_single_block(body, &target.discriminator, target.attribute_name());
    }
}

/// `moved { from = <old>.<name>  to = <new>.<name> }`
#[must_use]
pub fn moved_block(old_type: &str, new_type: &str, name: &str) -> Block {
    Block::new("moved")
        .with_attribute("from", Expression::traversal(&[old_type, name]))
        .with_attribute("to", Expression::traversal(&[new_type, name]))
}

/// Literal expression for a JSON value
pub(crate) fn expression_from_json(value: &Value) -> Expression {
    match value {
        Value::Null => Expression::null(),
        Value::Bool(b) => Expression::bool(*b),
        Value::Number(n) => Expression::number(n),
        Value::String(s) => Expression::string(s),
        Value::Array(items) => builder::array(items.iter().map(expression_from_json).collect()),
        Value::Object(map) => builder::object(
            map.iter()
                .map(|(k, v)| (ObjectKey::for_name(k), expression_from_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Outcome;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn argo() -> ExpansionCoordinator {
        ExpansionCoordinator::new(vec![
            SplitTarget::new("smart_routing", "argo_smart_routing").with_attribute("value"),
            SplitTarget::new("tiered_caching", "argo_tiered_caching").with_attribute("value"),
        ])
        .with_default("smart_routing", json!("off"))
    }

    fn block(src: &str) -> Block {
        Body::parse(src).unwrap().blocks().next().unwrap().clone()
    }

    fn render(blocks: &[Block]) -> String {
        blocks
            .iter()
            .map(|b| Body::from_iter([Structure::Block(b.clone())]).to_hcl())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn classification() {
        let split = argo();
        let state = split.classify_body(&block("resource \"argo\" \"a\" {\n  zone_id = \"z\"\n}\n").body);
        assert_eq!(state, ExpansionState::DefaultTarget);
        let state = split.classify_body(
            &block("resource \"argo\" \"a\" {\n  tiered_caching = \"on\"\n}\n").body,
        );
        assert_eq!(state, ExpansionState::SingleTarget(1));
        assert_eq!(
            split.classify_attributes(&json!({"smart_routing": "on", "tiered_caching": "on"})),
            ExpansionState::DualTarget(vec![0, 1])
        );
        assert_eq!(
            split.classify_attributes(&json!({"smart_routing": "", "tiered_caching": null})),
            ExpansionState::DefaultTarget
        );
    }

    #[test]
    fn dual_target_links_primary_only() {
        let mut ctx = MigrationContext::new();
        ctx.begin_resource("argo.main", crate::report::Phase::Config, "argo");
        let source = block(
            "resource \"argo\" \"main\" {\n  zone_id = var.zone\n  smart_routing = \"on\"\n  tiered_caching = \"on\"\n  count = 2\n}\n",
        );
        let result = argo().expand_block(&mut ctx, &source);
        assert!(result.remove_original);
        assert_eq!(
            render(&result.blocks),
            "resource \"argo_smart_routing\" \"main\" {\n  zone_id = var.zone\n  value = \"on\"\n  count = 2\n}\n\nmoved {\n  from = argo.main\n  to = argo_smart_routing.main\n}\n\nresource \"argo_tiered_caching\" \"main\" {\n  zone_id = var.zone\n  value = \"on\"\n  count = 2\n}\n"
        );
        assert_eq!(ctx.renames().len(), 1);
        let report = ctx.into_report();
        assert!(matches!(report.resources()[0].outcome, Outcome::ManualAction(_)));
    }

    #[test]
    fn default_target_is_synthesized() {
        let mut ctx = MigrationContext::new().with_moved_blocks(false);
        let source = block("resource \"argo\" \"main\" {\n  zone_id = \"z\"\n}\n");
        let result = argo().expand_block(&mut ctx, &source);
        assert_eq!(
            render(&result.blocks),
            "resource \"argo_smart_routing\" \"main\" {\n  zone_id = \"z\"\n  value = \"off\"\n}\n"
        );
    }

    #[test]
    fn foreign_ignore_changes_are_dropped() {
        let mut ctx = MigrationContext::new();
        ctx.begin_resource("argo.main", crate::report::Phase::Config, "argo");
        let source = block(
            "resource \"argo\" \"main\" {\n  tiered_caching = \"on\"\n  lifecycle {\n    ignore_changes = [smart_routing]\n  }\n}\n",
        );
        let result = argo().expand_block(&mut ctx, &source);
        assert_eq!(result.blocks.len(), 2);
        assert!(result.blocks[0].body.first_block("lifecycle").is_none());
        let report = ctx.into_report();
        assert!(report.resources()[0].outcome.needs_attention());
    }

    #[test]
    fn own_discriminator_in_ignore_changes_follows_rename() {
        let mut ctx = MigrationContext::new();
        ctx.begin_resource("argo.a", crate::report::Phase::Config, "argo");
        let source = block(
            "resource \"argo\" \"a\" {\n  tiered_caching = \"on\"\n  lifecycle {\n    ignore_changes = [tiered_caching, smart_routing]\n  }\n}\n",
        );
        let result = argo().expand_block(&mut ctx, &source);
        let target = &result.blocks[0];
        assert_eq!(target.label(0), Some("argo_tiered_caching"));
        assert_eq!(target.body.expr("value").unwrap().source(), "\"on\"");
        let lifecycle = target.body.first_block("lifecycle").unwrap();
        assert_eq!(lifecycle.body.expr("ignore_changes").unwrap().source(), "[value]");

        let report = ctx.into_report();
        assert_eq!(
            report.resources()[0].outcome,
            Outcome::ManualAction(
                "dropped ignore_changes entries smart_routing on argo_tiered_caching.a".into()
            )
        );
    }

    #[test]
    fn instance_resolves_type() {
        let mut ctx = MigrationContext::new();
        let site = InstanceSite::new("argo", "main");
        let instance = json!({"attributes": {"zone_id": "z", "tiered_caching": "on", "smart_routing": ""}});
        let (out, ty) = argo().expand_instance(&mut ctx, &site, instance);
        assert_eq!(ty.as_deref(), Some("argo_tiered_caching"));
        assert_eq!(out, json!({"attributes": {"zone_id": "z", "value": "on"}}));
        assert_eq!(ctx.instance_type("argo.main"), Some("argo_tiered_caching"));
    }

    #[test]
    fn json_literals() {
        let expr = expression_from_json(&json!({"enabled": true, "n": -1, "tags": ["a"]}));
        assert_eq!(
            tfm_syntax::print_expression(&expr),
            "{\n  enabled = true\n  n = -1\n  tags = [\"a\"]\n}"
        );
    }
}

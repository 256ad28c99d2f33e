//! Catalog-driven migrators
//!
//! [`DeclarativeMigrator`] runs the generic block and state operations an
//! entry lists, in a fixed order. [`SplitMigrator`] hands a one-to-many
//! type to the [`ExpansionCoordinator`].

use std::borrow::Cow;

use serde_json::Value;
use tfm_rewrite::meta::{self, IgnoreChangesRules};
use tfm_rewrite::{
    apply_conversion, convert_dynamic_block, merge_sibling_blocks, remove_attributes,
    rename_attribute, rename_block, set_default, Preprocessor,
};
use tfm_state::{
    coerce_field_types, collapse_single_element_arrays, convert_numeric_widened,
    ensure_field_with_default, expand_flat_field, keyed_list_to_map, normalize_empty_strings,
    remove_fields, rename_field, segments, FieldType, InstanceSite, StateOutcome, ATTRIBUTES,
};
use tfm_syntax::{Block, Body};
use tracing::{debug, trace};

use crate::catalog::{ConfigRules, ResourceEntry, SplitEntry, StateRules};
use crate::context::MigrationContext;
use crate::error::{CatalogError, Result};
use crate::expansion::{expression_from_json, moved_block, ExpansionCoordinator};
use crate::migrator::{declaration, ResourceMigrator, TransformResult};

const SCHEMA_VERSION: &str = "schema_version";

/// One-to-one migrator built from a [`ResourceEntry`]
#[derive(Debug, Clone)]
pub struct DeclarativeMigrator {
    name: String,
    target_type: String,
    source_types: Vec<String>,
    preprocessor: Preprocessor,
    ignore_changes: IgnoreChangesRules,
    config: ConfigRules,
    state: StateRules,
}

impl DeclarativeMigrator {
    /// Build the migrator for one catalog entry
    ///
    /// # Errors
    /// Returns an error when a preprocess pattern does not compile.
    pub fn from_entry(entry: &ResourceEntry) -> Result<Self> {
        let mut preprocessor = Preprocessor::new();
        for rule in &entry.config.preprocess {
            preprocessor = preprocessor
                .with_rule(&rule.pattern, rule.replacement.clone())
                .map_err(CatalogError::from)?;
        }
        for (from, to) in &entry.config.function_renames {
            preprocessor = preprocessor
                .with_function_rename(from, to)
                .map_err(CatalogError::from)?;
        }
        Ok(Self {
            name: entry.source.clone(),
            target_type: entry.target_type().to_string(),
            source_types: entry.lookup_keys(),
            preprocessor,
            ignore_changes: entry.config.ignore_changes_rules(),
            config: entry.config.clone(),
            state: entry.state.clone(),
        })
    }

    /// Rewrite a block body; returns the `ignore_changes` entries dropped
    fn rewrite_body(&self, ctx: &mut MigrationContext, body: &mut Body) -> Vec<String> {
        let rules = &self.config;
        for (from, to) in &rules.rename_blocks {
            if rename_block(body, from, to) {
                ctx.applied(format!("renamed block {from} to {to}"));
            }
        }
        for spec in &rules.dynamic {
            if convert_dynamic_block(body, &spec.block, spec.attribute_name(), &spec.shape()) {
                ctx.applied(format!("dynamic {} to {}", spec.block, spec.attribute_name()));
            }
        }
        for spec in &rules.merge {
            if merge_sibling_blocks(body, &spec.block, &spec.rule) {
                ctx.applied(format!("merged {} blocks into {}", spec.block, spec.rule.attribute));
            }
        }
        for conversion in &rules.conversions {
            if apply_conversion(body, conversion) {
                ctx.applied(format!("block {} to attribute {}", conversion.block(), conversion.attribute()));
            }
        }
        for spec in &rules.string_lists {
            if tfm_rewrite::string_list_to_named_objects(body, &spec.field, &spec.name_field) {
                ctx.applied(format!("{} to named objects", spec.field));
            }
        }
        for (from, to) in &rules.rename {
            if rename_attribute(body, from, to) {
                ctx.applied(format!("renamed {from} to {to}"));
            }
        }
        if remove_attributes(body, &rules.remove) {
            ctx.applied("removed attributes");
        }
        for (name, value) in &rules.defaults {
            if set_default(body, name, expression_from_json(value)) {
                ctx.applied(format!("default {name}"));
            }
        }
        meta::filter_ignore_changes(body, &self.ignore_changes)
    }

    /// Normalize instance attributes in rule order
    fn normalize(&self, ctx: &mut MigrationContext, attrs: &mut Value, resource_address: &str) {
        let rules = &self.state;

        let mut decoded = false;
        for field in &rules.decode {
            decoded |= expand_flat_field(attrs, field);
        }
        note(ctx, decoded, "decoded flat fields");

        for (from, to) in &rules.rename {
            let changed = rename_field(attrs, from, to);
            note(ctx, changed, &format!("renamed {from} to {to}"));
        }
        let changed = remove_fields(attrs, &rules.remove);
        note(ctx, changed, "removed fields");

        for spec in &rules.keyed_lists {
            let changed = keyed_list_to_map(attrs, &spec.field, &spec.key);
            note(ctx, changed, &format!("{} to map", spec.field));
        }
        for spec in &rules.string_lists {
            let changed = tfm_state::string_list_to_named_objects(attrs, &spec.field, &spec.name_field);
            note(ctx, changed, &format!("{} to named objects", spec.field));
        }

        if rules.collapse {
            let mut exempt = rules.collapse_exempt.clone();
            exempt.extend(
                rules
                    .string_lists
                    .iter()
                    .filter_map(|s| segments(&s.field).last().map(|leaf| (*leaf).to_string())),
            );
            let changed = collapse_single_element_arrays(attrs, &exempt);
            note(ctx, changed, "collapsed single-element arrays");
        }

        let changed = convert_numeric_widened(attrs, &rules.widen, &rules.zero_deletes);
        note(ctx, changed, "widened numbers");

        if !rules.empty_to_null.is_empty() {
            let explicit = ctx.explicit_empty(resource_address);
            let changed = normalize_empty_strings(attrs, &rules.empty_to_null, &explicit);
            note(ctx, changed, "empty strings to null");
        }

        let coerce: Vec<(&str, FieldType)> =
            rules.coerce.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        let changed = coerce_field_types(attrs, &coerce);
        note(ctx, changed, "coerced field types");

        for (path, value) in &rules.defaults {
            let changed = ensure_field_with_default(attrs, path, value);
            note(ctx, changed, &format!("default {path}"));
        }
    }
}

fn note(ctx: &mut MigrationContext, changed: bool, transform: &str) {
    if changed {
        ctx.applied(transform);
    }
}

impl ResourceMigrator for DeclarativeMigrator {
    fn name(&self) -> &str {
        &self.name
    }

    fn resource_type(&self) -> &str {
        &self.target_type
    }

    fn source_types(&self) -> &[String] {
        &self.source_types
    }

    fn preprocess<'a>(&self, text: &'a str) -> Cow<'a, str> {
        self.preprocessor.apply(text)
    }

    fn transform_config(&self, ctx: &mut MigrationContext, block: &Block) -> Result<TransformResult> {
        let Some(decl) = declaration(block) else {
            return Ok(TransformResult::unchanged());
        };

        let mut body = block.body.clone();
        let dropped = self.rewrite_body(ctx, &mut body);
        if !dropped.is_empty() {
            ctx.manual_action(format!(
                "dropped ignore_changes entries {} that no longer exist",
                dropped.join(", ")
            ));
        }

        for attr in body.attributes() {
            if attr.expr.as_string().is_some_and(|s| s.is_empty()) {
                ctx.record_explicit_empty(&decl.address(), &attr.name);
            }
        }

        let renamed = decl.resource_type != self.target_type;
        if !renamed && body == block.body {
            trace!(address = %decl.address(), "configuration already current");
            return Ok(TransformResult::unchanged());
        }

        let mut out = Block {
            ident: block.ident.clone(),
            labels: block.labels.clone(),
            body,
        };
        let mut blocks = Vec::with_capacity(2);
        if renamed {
            out.set_label(0, self.target_type.clone());
            ctx.applied(format!("type {} to {}", decl.resource_type, self.target_type));
            ctx.record_rename(
                &decl.steps_with_type(decl.resource_type),
                &decl.steps_with_type(&self.target_type),
            );
        }
        blocks.push(out);
        if renamed && !decl.data && ctx.moved_blocks_enabled() {
            blocks.push(moved_block(decl.resource_type, &self.target_type, decl.name));
        }
        debug!(address = %decl.address(), migrator = %self.name, "configuration migrated");
        Ok(TransformResult::replace(blocks))
    }

    fn transform_state(
        &self,
        ctx: &mut MigrationContext,
        mut instance: Value,
        site: &InstanceSite,
    ) -> Result<StateOutcome> {
        if self.state.delete {
            ctx.applied("deleted instance");
            return Ok(StateOutcome::Delete);
        }

        if let Some(attrs) = instance.get_mut(ATTRIBUTES) {
            self.normalize(ctx, attrs, &site.resource_address());
        }

        if let (Some(version), Some(map)) = (self.state.schema_version, instance.as_object_mut()) {
            let version = Value::from(version);
            if map.get(SCHEMA_VERSION) != Some(&version) {
                map.insert(SCHEMA_VERSION.to_string(), version);
                ctx.applied("schema version");
            }
        }
        Ok(StateOutcome::Rewritten(instance))
    }
}

/// One-to-many migrator built from a [`SplitEntry`]
#[derive(Debug, Clone)]
pub struct SplitMigrator {
    name: String,
    source_types: Vec<String>,
    coordinator: ExpansionCoordinator,
}

impl SplitMigrator {
    /// Build the migrator for one split entry
    #[must_use]
    pub fn from_entry(entry: &SplitEntry) -> Self {
        Self {
            name: entry.source.clone(),
            source_types: entry.lookup_keys(),
            coordinator: entry.coordinator.clone(),
        }
    }

    /// Split rules
    #[inline]
    #[must_use]
    pub fn coordinator(&self) -> &ExpansionCoordinator {
        &self.coordinator
    }
}

impl ResourceMigrator for SplitMigrator {
    fn name(&self) -> &str {
        &self.name
    }

    fn resource_type(&self) -> &str {
        ""
    }

    fn source_types(&self) -> &[String] {
        &self.source_types
    }

    fn transform_config(&self, ctx: &mut MigrationContext, block: &Block) -> Result<TransformResult> {
        Ok(self.coordinator.expand_block(ctx, block))
    }

    fn transform_state(
        &self,
        ctx: &mut MigrationContext,
        instance: Value,
        site: &InstanceSite,
    ) -> Result<StateOutcome> {
        let (instance, _) = self.coordinator.expand_instance(ctx, site, instance);
        Ok(StateOutcome::Rewritten(instance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::report::{Outcome, Phase};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tfm_syntax::Structure;

    const CATALOG: &str = r#"
[[resource]]
source = "old_record"
target = "new_record"

[resource.config]
function_renames = { lookup_v1 = "lookup" }
rename = { old_ttl = "ttl" }
remove = ["deprecated"]
defaults = { proxied = false }
conversions = [{ shape = "object", block = "settings" }]

[resource.state]
rename = { old_ttl = "ttl" }
remove = ["deprecated"]
collapse = true
empty_to_null = ["comment", "notes"]
coerce = { ttl = "number" }
defaults = { proxied = false }
schema_version = 1

[[resource]]
source = "gone"
state = { delete = true }
"#;

    fn migrators() -> (DeclarativeMigrator, DeclarativeMigrator) {
        let catalog = Catalog::from_toml_str(CATALOG).unwrap();
        (
            DeclarativeMigrator::from_entry(&catalog.resources[0]).unwrap(),
            DeclarativeMigrator::from_entry(&catalog.resources[1]).unwrap(),
        )
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
    fn config_rules_in_order() {
        let (record, _) = migrators();
        let mut ctx = MigrationContext::new();
        ctx.begin_resource("old_record.www", Phase::Config, "old_record");
        let source = block(
            "resource \"old_record\" \"www\" {\n  old_ttl = 300\n  deprecated = true\n  comment = \"\"\n  settings {\n    mode = \"strict\"\n  }\n}\n",
        );
        let result = record.transform_config(&mut ctx, &source).unwrap();
        assert_eq!(
            render(&result.blocks),
            "resource \"new_record\" \"www\" {\n  ttl = 300\n  comment = \"\"\n  settings = {\n    mode = \"strict\"\n  }\n  proxied = false\n}\n\nmoved {\n  from = old_record.www\n  to = new_record.www\n}\n"
        );
        assert_eq!(ctx.explicit_empty("old_record.www"), vec!["comment"]);
        assert_eq!(ctx.renames()[0].to, vec!["new_record", "www"]);
    }

    #[test]
    fn current_config_is_unchanged() {
        let (record, _) = migrators();
        let mut ctx = MigrationContext::new();
        let source = block("resource \"new_record\" \"www\" {\n  ttl = 300\n  proxied = true\n}\n");
        let mut registry_view = record.clone();
        registry_view.target_type = "new_record".to_string();
        assert!(registry_view
            .transform_config(&mut ctx, &source)
            .unwrap()
            .is_unchanged());
    }

    #[test]
    fn legacy_ignore_changes_need_attention() {
        let (record, _) = migrators();
        let mut ctx = MigrationContext::new();
        ctx.begin_resource("old_record.www", Phase::Config, "old_record");
        let source = block(
            "resource \"old_record\" \"www\" {\n  ttl = 1\n  lifecycle {\n    ignore_changes = [deprecated, ttl]\n  }\n}\n",
        );
        let result = record.transform_config(&mut ctx, &source).unwrap();
        let lifecycle = result.blocks[0].body.first_block("lifecycle").unwrap();
        assert_eq!(
            lifecycle.body.expr("ignore_changes").unwrap().source(),
            "[ttl]"
        );
        let report = ctx.into_report();
        assert!(matches!(report.resources()[0].outcome, Outcome::ManualAction(_)));
    }

    #[test]
    fn preprocess_renames_functions() {
        let (record, _) = migrators();
        let text = "x = lookup_v1(var.m, \"k\")\n";
        assert_eq!(record.preprocess(text), "x = lookup(var.m, \"k\")\n");
    }

    #[test]
    fn state_rules_in_order() {
        let (record, _) = migrators();
        let mut ctx = MigrationContext::new();
        ctx.record_explicit_empty("old_record.www", "notes");
        let site = InstanceSite::new("old_record", "www");
        let instance = json!({
            "schema_version": 0,
            "attributes": {
                "old_ttl": "300",
                "deprecated": true,
                "comment": "",
                "notes": "",
                "limits": [{"burst": 10}]
            }
        });
        let out = record.transform_state(&mut ctx, instance, &site).unwrap();
        assert_eq!(
            out,
            StateOutcome::Rewritten(json!({
                "schema_version": 1,
                "attributes": {
                    "ttl": 300,
                    "comment": null,
                    "notes": "",
                    "limits": {"burst": 10},
                    "proxied": false
                }
            }))
        );
    }

    #[test]
    fn state_rules_are_idempotent() {
        let (record, _) = migrators();
        let mut ctx = MigrationContext::new();
        let site = InstanceSite::new("old_record", "www");
        let instance = json!({"attributes": {"old_ttl": 5, "limits": [[{"a": 1}]]}});
        let StateOutcome::Rewritten(once) = record.transform_state(&mut ctx, instance, &site).unwrap()
        else {
            panic!("instance deleted");
        };
        let StateOutcome::Rewritten(twice) =
            record.transform_state(&mut ctx, once.clone(), &site).unwrap()
        else {
            panic!("instance deleted");
        };
        assert_eq!(once, twice);
    }

    #[test]
    fn delete_entry_removes_instances() {
        let (_, gone) = migrators();
        let mut ctx = MigrationContext::new();
        let site = InstanceSite::new("gone", "x");
        let out = gone.transform_state(&mut ctx, json!({"attributes": {}}), &site).unwrap();
        assert_eq!(out, StateOutcome::Delete);
    }
}

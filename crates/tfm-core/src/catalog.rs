//! Declarative resource-mapping catalog
//!
//! A catalog lists, per source type, the rules the generic operations
//! apply. TOML is the primary format, YAML is accepted too.
//!
//! ```toml
//! [[resource]]
//! source = "old_record"
//! target = "new_record"
//!
//! [resource.config]
//! rename = { old_ttl = "ttl" }
//! conversions = [{ shape = "object", block = "settings" }]
//!
//! [resource.state]
//! rename = { old_ttl = "ttl" }
//! collapse = true
//!
//! [[split]]
//! source = "argo"
//! default_target = "smart_routing"
//! default_value = "off"
//! targets = [
//!   { discriminator = "smart_routing", target_type = "argo_smart_routing", attribute = "value" },
//!   { discriminator = "tiered_caching", target_type = "argo_tiered_caching", attribute = "value" },
//! ]
//! ```

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tfm_rewrite::meta::IgnoreChangesRules;
use tfm_rewrite::{Conversion, DynamicShape, MergeRule};
use tfm_state::FieldType;
use tracing::debug;

use crate::error::CatalogError;
use crate::expansion::ExpansionCoordinator;

fn default_name_field() -> String {
    "name".to_string()
}

/// Regex replacement on raw text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRuleSpec {
    /// Regular expression
    pub pattern: String,
    /// Replacement, `$1` capture references allowed
    pub replacement: String,
}

/// Iterator block conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicSpec {
    /// Block type named by the iterator block label
    pub block: String,
    /// Target attribute (defaults to the block type)
    #[serde(default)]
    pub attribute: Option<String>,
    /// Produce a map instead of a list
    #[serde(default)]
    pub map: bool,
    /// Content attribute used as map key
    #[serde(default)]
    pub key_attribute: Option<String>,
}

impl DynamicSpec {
    /// Target attribute name
    #[inline]
    #[must_use]
    pub fn attribute_name(&self) -> &str {
        self.attribute.as_deref().unwrap_or(&self.block)
    }

    /// Comprehension shape
    #[must_use]
    pub fn shape(&self) -> DynamicShape {
        if self.map {
            DynamicShape::Map {
                key_attribute: self.key_attribute.clone(),
            }
        } else {
            DynamicShape::List
        }
    }
}

/// Sibling block merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSpec {
    /// Sibling block type
    pub block: String,
    /// How the siblings fold
    #[serde(flatten)]
    pub rule: MergeRule,
}

/// String list to named objects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringListSpec {
    /// Attribute name (config) or dotted path (state)
    pub field: String,
    /// Key of the wrapped value
    #[serde(default = "default_name_field")]
    pub name_field: String,
}

/// Keyed list to map (state)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyedListSpec {
    /// Dotted path of the list
    pub field: String,
    /// Element field holding the key
    #[serde(default = "default_name_field")]
    pub key: String,
}

/// Configuration rules, applied in the order of the fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigRules {
    /// Regex fixes on raw text
    #[serde(default)]
    pub preprocess: Vec<TextRuleSpec>,
    /// Function renames on raw text
    #[serde(default)]
    pub function_renames: IndexMap<String, String>,
    /// Nested block type renames
    #[serde(default)]
    pub rename_blocks: IndexMap<String, String>,
    /// Iterator blocks to comprehensions
    #[serde(default)]
    pub dynamic: Vec<DynamicSpec>,
    /// Sibling merges
    #[serde(default)]
    pub merge: Vec<MergeSpec>,
    /// Block to attribute conversions
    #[serde(default)]
    pub conversions: Vec<Conversion>,
    /// String lists to named objects
    #[serde(default)]
    pub string_lists: Vec<StringListSpec>,
    /// Attribute renames
    #[serde(default)]
    pub rename: IndexMap<String, String>,
    /// Attribute removals
    #[serde(default)]
    pub remove: Vec<String>,
    /// Defaults for absent attributes
    #[serde(default)]
    pub defaults: IndexMap<String, Value>,
}

impl ConfigRules {
    /// How `ignore_changes` entries follow these rules
    ///
    /// Removed attributes and blocks converted under a new name are
    /// legacy roots. Renames carry over. Blocks that keep their name but
    /// become an object or map lose only their indexed entries.
    #[must_use]
    pub fn ignore_changes_rules(&self) -> IgnoreChangesRules {
        let renamed_away = |c: &&Conversion| c.block() != c.attribute();
        let mut rules = IgnoreChangesRules::new()
            .with_legacy_roots(self.remove.iter().cloned())
            .with_legacy_roots(self.conversions.iter().filter(renamed_away).map(Conversion::block))
            .with_legacy_roots(
                self.merge
                    .iter()
                    .filter(|m| m.block != m.rule.attribute)
                    .map(|m| m.block.clone()),
            )
            .with_reshaped_roots(
                self.conversions
                    .iter()
                    .filter(|c| !renamed_away(c) && !matches!(c, Conversion::Array { .. }))
                    .map(Conversion::block),
            )
            .with_reshaped_roots(
                self.merge
                    .iter()
                    .filter(|m| m.block == m.rule.attribute)
                    .map(|m| m.block.clone()),
            );
        for (from, to) in self.rename.iter().chain(&self.rename_blocks) {
            rules = rules.with_rename(from.clone(), to.clone());
        }
        rules
    }
}

/// State rules, applied in the order of the fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateRules {
    /// Flat fields decoded explicitly (nested paths included)
    #[serde(default)]
    pub decode: Vec<String>,
    /// Field renames on dotted paths
    #[serde(default)]
    pub rename: IndexMap<String, String>,
    /// Field removals
    #[serde(default)]
    pub remove: Vec<String>,
    /// Keyed lists to maps
    #[serde(default)]
    pub keyed_lists: Vec<KeyedListSpec>,
    /// String lists to named objects
    #[serde(default)]
    pub string_lists: Vec<StringListSpec>,
    /// Collapse single-element arrays
    #[serde(default)]
    pub collapse: bool,
    /// Fields that stay lists
    #[serde(default)]
    pub collapse_exempt: Vec<String>,
    /// Integral numbers widened to floats
    #[serde(default)]
    pub widen: Vec<String>,
    /// Widened fields whose zero is removed
    #[serde(default)]
    pub zero_deletes: Vec<String>,
    /// Fields where `""` means unset
    #[serde(default)]
    pub empty_to_null: Vec<String>,
    /// Target JSON types
    #[serde(default)]
    pub coerce: IndexMap<String, FieldType>,
    /// Defaults for absent fields
    #[serde(default)]
    pub defaults: IndexMap<String, Value>,
    /// Instance schema version to record
    #[serde(default)]
    pub schema_version: Option<u64>,
    /// The type no longer exists; remove its instances
    #[serde(default)]
    pub delete: bool,
}

/// One-to-one mapping of a source type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceEntry {
    /// Source resource type
    pub source: String,
    /// Other names handled the same way
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Target type (defaults to the source type)
    #[serde(default)]
    pub target: Option<String>,
    /// Also register `data.<type>` keys
    #[serde(default)]
    pub data_source: bool,
    /// Configuration rules
    #[serde(default)]
    pub config: ConfigRules,
    /// State rules
    #[serde(default)]
    pub state: StateRules,
}

impl ResourceEntry {
    /// Create an entry keeping its type
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            aliases: Vec::new(),
            target: None,
            data_source: false,
            config: ConfigRules::default(),
            state: StateRules::default(),
        }
    }

    /// Rename the type
    #[inline]
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Target type
    #[inline]
    #[must_use]
    pub fn target_type(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.source)
    }

    /// Registry keys of this entry
    #[must_use]
    pub fn lookup_keys(&self) -> Vec<String> {
        lookup_keys(&self.source, &self.aliases, self.data_source)
    }
}

/// One-to-many mapping of a source type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitEntry {
    /// Source resource type
    pub source: String,
    /// Other names handled the same way
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Also register `data.<type>` keys
    #[serde(default)]
    pub data_source: bool,
    /// Targets and defaults
    #[serde(flatten)]
    pub coordinator: ExpansionCoordinator,
}

impl SplitEntry {
    /// Registry keys of this entry
    #[must_use]
    pub fn lookup_keys(&self) -> Vec<String> {
        lookup_keys(&self.source, &self.aliases, self.data_source)
    }
}

fn lookup_keys(source: &str, aliases: &[String], data_source: bool) -> Vec<String> {
    let mut keys: Vec<String> = std::iter::once(source.to_string())
        .chain(aliases.iter().cloned())
        .collect();
    if data_source {
        let data: Vec<String> = keys.iter().map(|k| format!("data.{k}")).collect();
        keys.extend(data);
    }
    keys
}

/// Parsed catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    /// One-to-one entries
    #[serde(default, rename = "resource")]
    pub resources: Vec<ResourceEntry>,
    /// One-to-many entries
    #[serde(default, rename = "split")]
    pub splits: Vec<SplitEntry>,
}

impl Catalog {
    /// Create an empty catalog
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML catalog
    ///
    /// # Errors
    /// Returns [`CatalogError`] for syntax errors and invalid entries.
    pub fn from_toml_str(text: &str) -> Result<Self, CatalogError> {
        let catalog: Self = toml::from_str(text)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Parse and validate a YAML catalog
    ///
    /// # Errors
    /// Returns [`CatalogError`] for syntax errors and invalid entries.
    pub fn from_yaml_str(text: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_yaml::from_str(text)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Add a one-to-one entry
    #[inline]
    #[must_use]
    pub fn with_resource(mut self, entry: ResourceEntry) -> Self {
        self.resources.push(entry);
        self
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len() + self.splits.len()
    }

    /// Check for an empty catalog
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check entries for missing names, empty splits and duplicate keys
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut claim = |keys: Vec<String>| -> Result<(), CatalogError> {
            for key in keys {
                if !seen.insert(key.clone()) {
                    return Err(CatalogError::Duplicate(key));
                }
            }
            Ok(())
        };

        for entry in &self.resources {
            if entry.source.is_empty() {
                return Err(CatalogError::invalid_entry("<unnamed>", "empty source type"));
            }
            if entry.target_type().is_empty() {
                return Err(CatalogError::invalid_entry(&entry.source, "empty target type"));
            }
            claim(entry.lookup_keys())?;
        }
        for split in &self.splits {
            if split.source.is_empty() {
                return Err(CatalogError::invalid_entry("<unnamed>", "empty source type"));
            }
            if split.coordinator.targets.is_empty() {
                return Err(CatalogError::invalid_entry(&split.source, "split without targets"));
            }
            if let Some(default) = &split.coordinator.default_target {
                if !split.coordinator.targets.iter().any(|t| &t.discriminator == default) {
                    return Err(CatalogError::invalid_entry(
                        &split.source,
                        format!("default target {default} is not a discriminator"),
                    ));
                }
            }
            claim(split.lookup_keys())?;
        }
        debug!(
            resources = self.resources.len(),
            splits = self.splits.len(),
            "catalog validated"
        );
        Ok(())
    }
}

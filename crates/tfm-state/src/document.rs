//! State document routing and surgical re-rendering
//!
//! A state text is one of three shapes:
//!
//! - a full state file with a top-level `resources` array
//! - one resource: `{"mode", "type", "name", "instances": [...]}`
//! - one instance: `{"attributes": {...}}` (or legacy `attributes_flat`)
//!
//! Every instance is handed to a visitor. Only resources whose instances
//! changed are re-rendered; other top-level keys and untouched resources are
//! copied as raw JSON text. When nothing changed the input text is returned
//! as is.

use std::fmt::Write as _;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::value::RawValue;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::StateError;
use crate::fields::rename_key;
use crate::flatmap::expand_all_flat;

/// Top-level key of the resource list
pub const RESOURCES: &str = "resources";

/// Resource key of the instance list
pub const INSTANCES: &str = "instances";

/// Instance key of nested attributes
pub const ATTRIBUTES: &str = "attributes";

/// Instance key of legacy flat attributes
pub const ATTRIBUTES_FLAT: &str = "attributes_flat";

/// Detected document shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentShape {
    /// Full state file
    State,
    /// Single resource with instances
    Resource,
    /// Single instance
    Instance,
}

/// Managed resource or data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceMode {
    /// `resource` declaration
    #[default]
    Managed,
    /// `data` declaration
    Data,
}

/// Where an instance sits in the document
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceSite {
    /// Resource mode
    pub mode: ResourceMode,
    /// Resource type as stored
    pub resource_type: String,
    /// Resource name
    pub resource_name: String,
    /// `index_key` of the instance, if any
    pub index_key: Option<Value>,
    /// Position in the instance list
    pub position: usize,
}

impl InstanceSite {
    /// Site of a managed resource's only instance
    #[must_use]
    pub fn new(resource_type: impl Into<String>, resource_name: impl Into<String>) -> Self {
        Self {
            mode: ResourceMode::Managed,
            resource_type: resource_type.into(),
            resource_name: resource_name.into(),
            index_key: None,
            position: 0,
        }
    }

    /// Mark as a data source
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: ResourceMode) -> Self {
        self.mode = mode;
        self
    }

    /// Key used for migrator lookup: `<type>` or `data.<type>`
    #[must_use]
    pub fn lookup_key(&self) -> String {
        match self.mode {
            ResourceMode::Managed => self.resource_type.clone(),
            ResourceMode::Data => format!("data.{}", self.resource_type),
        }
    }

    /// Resource address without instance key
    #[must_use]
    pub fn resource_address(&self) -> String {
        format!("{}.{}", self.lookup_key(), self.resource_name)
    }

    /// Instance address, with `[key]` when the instance has one
    #[must_use]
    pub fn address(&self) -> String {
        let mut address = self.resource_address();
        if let Some(key) = &self.index_key {
            let _ = write!(address, "[{key}]");
        }
        address
    }
}

/// Result of migrating one instance
#[derive(Debug, Clone, PartialEq)]
pub enum StateOutcome {
    /// Instance value to store
    Rewritten(Value),
    /// Remove the instance
    Delete,
}

/// Visitor answer for one instance
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceUpdate {
    /// What happens to the instance
    pub outcome: StateOutcome,
    /// Resource type the instance moves to
    pub resource_type: Option<String>,
}

impl InstanceUpdate {
    /// Store `value`, same resource type
    #[inline]
    #[must_use]
    pub fn rewritten(value: Value) -> Self {
        Self {
            outcome: StateOutcome::Rewritten(value),
            resource_type: None,
        }
    }

    /// Remove the instance
    #[inline]
    #[must_use]
    pub fn delete() -> Self {
        Self {
            outcome: StateOutcome::Delete,
            resource_type: None,
        }
    }

    /// Move the instance to another resource type
    #[inline]
    #[must_use]
    pub fn with_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }
}

impl From<StateOutcome> for InstanceUpdate {
    fn from(outcome: StateOutcome) -> Self {
        Self {
            outcome,
            resource_type: None,
        }
    }
}

/// Detect the shape of a parsed document
#[must_use]
pub fn detect_shape(value: &Value) -> Option<DocumentShape> {
    shape_of_keys(value.as_object()?.keys().map(String::as_str))
}

fn shape_of_keys<'a>(mut keys: impl Iterator<Item = &'a str> + Clone) -> Option<DocumentShape> {
    if keys.clone().any(|k| k == RESOURCES) {
        Some(DocumentShape::State)
    } else if keys.clone().any(|k| k == INSTANCES) {
        Some(DocumentShape::Resource)
    } else if keys.any(|k| k == ATTRIBUTES || k == ATTRIBUTES_FLAT) {
        Some(DocumentShape::Instance)
    } else {
        None
    }
}

/// Decode legacy `attributes_flat` into nested `attributes`
///
/// Returns whether the instance changed.
pub fn prepare_instance(instance: &mut Value) -> bool {
    let Value::Object(map) = instance else {
        return false;
    };
    if map.contains_key(ATTRIBUTES) || !map.contains_key(ATTRIBUTES_FLAT) {
        return false;
    }
    rename_key(map, ATTRIBUTES_FLAT, ATTRIBUTES);
    if let Some(attrs) = map.get_mut(ATTRIBUTES) {
        expand_all_flat(attrs);
    }
    debug!("decoded attributes_flat");
    true
}

enum Rendered<'a> {
    Raw(&'a RawValue),
    Value(Value),
}

/// Routes instances of a state document through a visitor
#[derive(Debug, Clone)]
pub struct DocumentRouter {
    indent: usize,
    site: Option<InstanceSite>,
}

impl Default for DocumentRouter {
    fn default() -> Self {
        Self {
            indent: 2,
            site: None,
        }
    }
}

impl DocumentRouter {
    /// Create a router with two-space indentation
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indentation width of re-rendered JSON
    #[inline]
    #[must_use]
    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    /// Identity of a bare instance document
    #[inline]
    #[must_use]
    pub fn with_site(mut self, site: InstanceSite) -> Self {
        self.site = Some(site);
        self
    }

    /// Rewrite a state text
    ///
    /// Returns `None` when the whole document was deleted (a bare instance
    /// or resource whose instances were all removed).
    ///
    /// # Errors
    /// Returns the visitor's error, or [`StateError`] for invalid JSON, an
    /// unknown shape or a malformed resource.
    pub fn rewrite<E, F>(&self, text: &str, mut visit: F) -> Result<Option<String>, E>
    where
        E: From<StateError>,
        F: FnMut(&InstanceSite, Value) -> Result<InstanceUpdate, E>,
    {
        let top: IndexMap<String, Box<RawValue>> = serde_json::from_str(text).map_err(|e| {
            if e.is_data() {
                StateError::unknown_shape("top-level value is not a JSON object")
            } else {
                StateError::Json(e)
            }
        })?;
        let shape = shape_of_keys(top.keys().map(String::as_str))
            .ok_or_else(|| StateError::unknown_shape("no resources, instances or attributes key"))?;
        debug!(?shape, "routing state document");

        let rendered = match shape {
            DocumentShape::State => self.rewrite_state(text, &top, &mut visit)?,
            DocumentShape::Resource => {
                let resource: Value = serde_json::from_str(text).map_err(StateError::from)?;
                match rewrite_resource(0, &resource, &mut visit)? {
                    None => Some(text.to_string()),
                    Some(mut parts) => match parts.len() {
                        0 => None,
                        1 => Some(self.pretty(&parts.remove(0), 0)),
                        _ => Some(self.pretty(&Value::Array(parts), 0)),
                    },
                }
            }
            DocumentShape::Instance => {
                let site = self.site.clone().ok_or_else(|| {
                    StateError::unknown_shape("bare instance without a resource type")
                })?;
                let original: Value = serde_json::from_str(text).map_err(StateError::from)?;
                let mut instance = original.clone();
                prepare_instance(&mut instance);
                match visit(&site, instance)?.outcome {
                    StateOutcome::Delete => None,
                    StateOutcome::Rewritten(value) if value == original => Some(text.to_string()),
                    StateOutcome::Rewritten(value) => Some(self.pretty(&value, 0)),
                }
            }
        };

        Ok(rendered.map(|out| {
            if out != text && text.ends_with('\n') && !out.ends_with('\n') {
                out + "\n"
            } else {
                out
            }
        }))
    }

    fn rewrite_state<E, F>(
        &self,
        text: &str,
        top: &IndexMap<String, Box<RawValue>>,
        visit: &mut F,
    ) -> Result<Option<String>, E>
    where
        E: From<StateError>,
        F: FnMut(&InstanceSite, Value) -> Result<InstanceUpdate, E>,
    {
        let resources: Vec<Box<RawValue>> = match top.get(RESOURCES) {
            Some(raw) => serde_json::from_str(raw.get()).map_err(StateError::from)?,
            None => Vec::new(),
        };

        let mut changed = false;
        let mut out: Vec<Rendered<'_>> = Vec::with_capacity(resources.len());
        for (index, raw) in resources.iter().enumerate() {
            let resource: Value = serde_json::from_str(raw.get()).map_err(StateError::from)?;
            match rewrite_resource(index, &resource, visit)? {
                None => out.push(Rendered::Raw(raw)),
                Some(parts) => {
                    changed = true;
                    out.extend(parts.into_iter().map(Rendered::Value));
                }
            }
        }
        if !changed {
            trace!("state document unchanged");
            return Ok(Some(text.to_string()));
        }
        Ok(Some(self.render_state(top, &out)))
    }

    fn pad(&self, out: &mut String, level: usize) {
        for _ in 0..level * self.indent {
            out.push(' ');
        }
    }

    /// Pretty JSON whose continuation lines start at `level`
    fn pretty(&self, value: &Value, level: usize) -> String {
        let indent = " ".repeat(self.indent);
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        if value.serialize(&mut serializer).is_err() {
            return value.to_string();
        }
        let text = String::from_utf8_lossy(&buf).into_owned();
        if level == 0 {
            return text;
        }
        let mut prefix = String::from("\n");
        self.pad(&mut prefix, level);
        text.replace('\n', &prefix)
    }

    fn render_state(&self, top: &IndexMap<String, Box<RawValue>>, resources: &[Rendered<'_>]) -> String {
        let mut out = String::from("{\n");
        for (i, (key, raw)) in top.iter().enumerate() {
            self.pad(&mut out, 1);
            out.push_str(&Value::String(key.clone()).to_string());
            out.push_str(": ");
            if key == RESOURCES {
                self.render_resources(&mut out, resources);
            } else {
                out.push_str(raw.get());
            }
            if i + 1 < top.len() {
                out.push(',');
            }
            out.push('\n');
        }
        out.push('}');
        out
    }

    fn render_resources(&self, out: &mut String, resources: &[Rendered<'_>]) {
        if resources.is_empty() {
            out.push_str("[]");
            return;
        }
        out.push_str("[\n");
        for (i, resource) in resources.iter().enumerate() {
            self.pad(out, 2);
            match resource {
                Rendered::Raw(raw) => out.push_str(raw.get()),
                Rendered::Value(value) => out.push_str(&self.pretty(value, 2)),
            }
            if i + 1 < resources.len() {
                out.push(',');
            }
            out.push('\n');
        }
        self.pad(out, 1);
        out.push(']');
    }
}

fn required_str<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    index: usize,
) -> Result<&'a str, StateError> {
    object
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| StateError::invalid_resource(index, format!("missing {key:?}")))
}

/// Visit the instances of one resource
///
/// `None` when nothing changed; otherwise the resource entries that replace
/// it (none when every instance was deleted, several when instances moved
/// to different types).
fn rewrite_resource<E, F>(index: usize, resource: &Value, visit: &mut F) -> Result<Option<Vec<Value>>, E>
where
    E: From<StateError>,
    F: FnMut(&InstanceSite, Value) -> Result<InstanceUpdate, E>,
{
    let object = resource
        .as_object()
        .ok_or_else(|| StateError::invalid_resource(index, "not an object"))?;
    let resource_type = required_str(object, "type", index)?;
    let resource_name = required_str(object, "name", index)?;
    let mode = match object.get("mode").and_then(Value::as_str) {
        Some("data") => ResourceMode::Data,
        _ => ResourceMode::Managed,
    };
    let instances = object
        .get(INSTANCES)
        .and_then(Value::as_array)
        .ok_or_else(|| StateError::invalid_resource(index, "missing \"instances\" list"))?;

    let mut changed = false;
    let mut groups: Vec<(String, Vec<Value>)> = Vec::new();
    for (position, original) in instances.iter().enumerate() {
        let site = InstanceSite {
            mode,
            resource_type: resource_type.to_string(),
            resource_name: resource_name.to_string(),
            index_key: original.get("index_key").cloned(),
            position,
        };
        let mut instance = original.clone();
        prepare_instance(&mut instance);

        let update = visit(&site, instance)?;
        let target_type = update
            .resource_type
            .unwrap_or_else(|| resource_type.to_string());
        let value = match update.outcome {
            StateOutcome::Delete => {
                debug!(address = %site.address(), "instance deleted");
                changed = true;
                continue;
            }
            StateOutcome::Rewritten(value) => value,
        };
        if value != *original || target_type != resource_type {
            changed = true;
        }
        match groups.iter_mut().find(|(t, _)| *t == target_type) {
            Some((_, list)) => list.push(value),
            None => groups.push((target_type, vec![value])),
        }
    }
    if !changed {
        return Ok(None);
    }

    let parts = groups
        .into_iter()
        .map(|(target_type, list)| {
            let mut entry = object.clone();
            if let Some(slot) = entry.get_mut("type") {
                *slot = Value::String(target_type);
            }
            if let Some(slot) = entry.get_mut(INSTANCES) {
                *slot = Value::Array(list);
            }
            Value::Object(entry)
        })
        .collect();
    Ok(Some(parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const STATE: &str = r#"{
  "version": 4,
  "terraform_version": "1.5.7",
  "serial": 12,
  "resources": [
    {
      "mode": "managed",
      "type": "old_record",
      "name": "www",
      "provider": "provider[\"registry.example.io/cloud\"]",
      "instances": [
        {
          "schema_version": 1,
          "attributes": {
            "ttl": 300
          }
        }
      ]
    },
    {
      "mode": "data",
      "type": "zone",
      "name": "main",
      "instances": [
        {
          "attributes": {
            "id": "z"
          }
        }
      ]
    }
  ],
  "check_results": null
}
"#;

    fn unchanged(_: &InstanceSite, v: Value) -> Result<InstanceUpdate, StateError> {
        Ok(InstanceUpdate::rewritten(v))
    }

    #[test]
    fn unchanged_document_is_returned_verbatim() {
        let out = DocumentRouter::new().rewrite(STATE, unchanged).unwrap();
        assert_eq!(out.as_deref(), Some(STATE));
    }

    #[test]
    fn only_changed_resource_is_rendered() {
        let out = DocumentRouter::new()
            .rewrite(STATE, |site: &InstanceSite, mut v: Value| -> Result<_, StateError> {
                if site.lookup_key() == "old_record" {
                    v["attributes"]["ttl"] = json!(60);
                    return Ok(InstanceUpdate::rewritten(v).with_type("new_record"));
                }
                Ok(InstanceUpdate::rewritten(v))
            })
            .unwrap()
            .unwrap();
        let expected = STATE
            .replace("\"old_record\"", "\"new_record\"")
            .replace("\"ttl\": 300", "\"ttl\": 60");
        assert_eq!(out, expected);
    }

    #[test]
    fn deleted_instances_remove_their_resource() {
        let out = DocumentRouter::new()
            .rewrite(STATE, |site: &InstanceSite, v: Value| -> Result<_, StateError> {
                if site.mode == ResourceMode::Data {
                    return Ok(InstanceUpdate::delete());
                }
                Ok(InstanceUpdate::rewritten(v))
            })
            .unwrap()
            .unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["resources"].as_array().unwrap().len(), 1);
        assert_eq!(parsed["check_results"], Value::Null);
        assert!(out.contains("\"terraform_version\": \"1.5.7\""));
    }

    #[test]
    fn instances_split_across_types() {
        let resource = r#"{"mode":"managed","type":"rule","name":"r","instances":[
            {"index_key":0,"attributes":{"kind":"a"}},
            {"index_key":1,"attributes":{"kind":"b"}}]}"#;
        let out = DocumentRouter::new()
            .rewrite(resource, |_: &InstanceSite, v: Value| -> Result<_, StateError> {
                let kind = v["attributes"]["kind"].as_str().unwrap_or_default().to_string();
                Ok(InstanceUpdate::rewritten(v).with_type(format!("rule_{kind}")))
            })
            .unwrap()
            .unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        let types: Vec<&str> = parsed
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["type"].as_str().unwrap())
            .collect();
        assert_eq!(types, vec!["rule_a", "rule_b"]);
    }

    #[test]
    fn bare_instance_with_flat_attributes() {
        let text = r#"{"attributes_flat":{"rules.#":"1","rules.0.action":"block","id":"x"}}"#;
        let mut seen = None;
        let out = DocumentRouter::new()
            .with_site(InstanceSite::new("ruleset", "main"))
            .rewrite(text, |site: &InstanceSite, v: Value| -> Result<_, StateError> {
                seen = Some(site.address());
                Ok(InstanceUpdate::rewritten(v))
            })
            .unwrap()
            .unwrap();
        assert_eq!(seen.as_deref(), Some("ruleset.main"));
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(
            parsed,
            json!({"attributes": {"rules": [{"action": "block"}], "id": "x"}})
        );
    }

    #[test]
    fn unknown_shapes_are_errors() {
        let err = DocumentRouter::new().rewrite("[1]", unchanged).unwrap_err();
        assert!(matches!(err, StateError::UnknownShape(_)));
        let err = DocumentRouter::new().rewrite("{\"x\": 1}", unchanged).unwrap_err();
        assert!(matches!(err, StateError::UnknownShape(_)));
        let err = DocumentRouter::new()
            .rewrite("{\"resources\": [{\"name\": \"n\", \"instances\": []}]}", unchanged)
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidResource { index: 0, .. }));
    }

    #[test]
    fn addresses() {
        let mut site = InstanceSite::new("zone", "main").with_mode(ResourceMode::Data);
        site.index_key = Some(json!("a"));
        assert_eq!(site.lookup_key(), "data.zone");
        assert_eq!(site.address(), "data.zone.main[\"a\"]");
    }
}

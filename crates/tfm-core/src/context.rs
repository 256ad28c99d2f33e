//! Request-scoped side channel between the config and state phases

use indexmap::IndexMap;
use serde_json::Value;
use tracing::trace;

use crate::report::{MigrationReport, Phase, ResourceReport};

const INSTANCE_TYPE: &str = "instance_type";
const EXPLICIT_EMPTY: &str = "explicit_empty";

/// Address rename recorded during the config phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRename {
    /// Old address steps (`["data", "old_type", "name"]`)
    pub from: Vec<String>,
    /// New address steps
    pub to: Vec<String>,
}

/// Mutable scratch space of one migration request
///
/// Created per request and dropped with it. Holds a free-form key/value map
/// for migrators, typed helpers for the facts the engine itself consumes,
/// and the report of the request.
#[derive(Debug)]
pub struct MigrationContext {
    values: IndexMap<String, Value>,
    renames: Vec<AddressRename>,
    emit_moved_blocks: bool,
    current: Option<ResourceReport>,
    report: MigrationReport,
}

impl Default for MigrationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationContext {
    /// Create an empty context
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: IndexMap::new(),
            renames: Vec::new(),
            emit_moved_blocks: true,
            current: None,
            report: MigrationReport::new(),
        }
    }

    /// Set whether migrators emit `moved` markers
    #[inline]
    #[must_use]
    pub fn with_moved_blocks(mut self, enabled: bool) -> Self {
        self.emit_moved_blocks = enabled;
        self
    }

    /// Whether migrators emit `moved` markers
    #[inline]
    #[must_use]
    pub fn moved_blocks_enabled(&self) -> bool {
        self.emit_moved_blocks
    }

    /// Stored value
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Store a value, returning the previous one
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    /// Remove a value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.shift_remove(key)
    }

    /// Check whether a key is set
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Number of stored values
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if no value is stored
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Record the resource type an instance resolved to
    pub fn record_instance_type(&mut self, address: &str, resource_type: &str) {
        trace!(address, resource_type, "instance type recorded");
        self.set(
            format!("{INSTANCE_TYPE}:{address}"),
            Value::String(resource_type.to_string()),
        );
    }

    /// Resource type recorded for an instance
    #[must_use]
    pub fn instance_type(&self, address: &str) -> Option<&str> {
        self.get(&format!("{INSTANCE_TYPE}:{address}"))
            .and_then(Value::as_str)
    }

    /// Record that configuration set `field` to `""` on purpose
    pub fn record_explicit_empty(&mut self, resource_address: &str, field: &str) {
        let key = format!("{EXPLICIT_EMPTY}:{resource_address}");
        let entry = self
            .values
            .entry(key)
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(fields) = entry {
            if !fields.iter().any(|f| f.as_str() == Some(field)) {
                fields.push(Value::String(field.to_string()));
            }
        }
    }

    /// Fields configuration set to `""` for a resource
    #[must_use]
    pub fn explicit_empty(&self, resource_address: &str) -> Vec<String> {
        self.get(&format!("{EXPLICIT_EMPTY}:{resource_address}"))
            .and_then(Value::as_array)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Record an address rename for reference rewriting
    pub fn record_rename(&mut self, from: &[&str], to: &[&str]) {
        let rename = AddressRename {
            from: from.iter().map(|s| (*s).to_string()).collect(),
            to: to.iter().map(|s| (*s).to_string()).collect(),
        };
        if !self.renames.contains(&rename) {
            self.renames.push(rename);
        }
    }

    /// Renames recorded so far, in order
    #[inline]
    #[must_use]
    pub fn renames(&self) -> &[AddressRename] {
        &self.renames
    }

    /// Open the report entry for one resource
    pub(crate) fn begin_resource(&mut self, address: &str, phase: Phase, migrator: &str) {
        self.end_resource();
        self.current = Some(ResourceReport::new(address, phase).with_migrator(migrator));
    }

    /// Close the open report entry
    pub(crate) fn end_resource(&mut self) {
        if let Some(entry) = self.current.take() {
            self.report.push(entry);
        }
    }

    /// Report a resource without a migrator
    pub(crate) fn report_unhandled(&mut self, address: &str, phase: Phase) {
        self.end_resource();
        self.report.push(ResourceReport::unhandled(address, phase));
    }

    /// Note a transform that changed the current resource
    pub fn applied(&mut self, transform: impl Into<String>) {
        let transform: String = transform.into();
        match &mut self.current {
            Some(entry) => entry.applied(transform),
            None => trace!(%transform, "transform outside a resource"),
        }
    }

    /// Note a follow-up for the current resource
    pub fn manual_action(&mut self, reason: impl Into<String>) {
        let reason: String = reason.into();
        match &mut self.current {
            Some(entry) => entry.manual_action(reason),
            None => trace!(%reason, "manual action outside a resource"),
        }
    }

    /// Report collected so far
    #[inline]
    #[must_use]
    pub fn report(&self) -> &MigrationReport {
        &self.report
    }

    /// Finish the request and hand out the report
    #[must_use]
    pub fn into_report(mut self) -> MigrationReport {
        self.end_resource();
        self.report
    }
}

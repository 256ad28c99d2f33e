//! Testing utilities for the TFM workspace
//!
//! Shared fixture catalog, engine helpers and sample documents.

#![allow(missing_docs)]

use std::sync::Arc;

use serde_json::Value;
use tfm_core::{Catalog, MigrateConfig, MigrationEngine, MigrationSession, MigratorRegistry};
use tfm_syntax::Body;

/// Catalog exercising every rule kind on a fictional `example` provider
pub const FIXTURE_CATALOG: &str = r#"
[[resource]]
source = "example_record"
target = "example_dns_record"
data_source = true

[resource.config]
function_renames = { lookup_v1 = "lookup" }
rename = { value = "content" }
conversions = [{ shape = "object", block = "data" }]

[resource.state]
rename = { value = "content" }
collapse = true
empty_to_null = ["comment"]
coerce = { ttl = "number", proxied = "bool" }
schema_version = 0

[[resource]]
source = "example_ruleset"

[resource.config]
dynamic = [{ block = "rules" }]
conversions = [
  { shape = "array", block = "rules", nested = [
    { shape = "object", block = "action_parameters", nested = [
      { shape = "map", block = "headers", key = "name" },
    ] },
    { shape = "object", block = "ratelimit" },
  ] },
]

[resource.state]
decode = ["rules"]
collapse = true
collapse_exempt = ["rules"]
keyed_lists = [{ field = "rules.*.action_parameters.*.headers" }]
widen = ["rules.*.ratelimit.*.period"]

[[resource]]
source = "example_transform"

[resource.config]
conversions = [{ shape = "map", block = "headers", key = "name" }]

[resource.state]
keyed_lists = [{ field = "headers" }]

[[resource]]
source = "example_access_policy"

[resource.config]
merge = [{ block = "include", attribute = "include", slot_attribute = "kind", value_field = "values", list_field = "ids", wildcard_flag = "everyone" }]
string_lists = [{ field = "approvers", name_field = "email" }]
defaults = { session_duration = "24h" }

[resource.state]
string_lists = [{ field = "approvers", name_field = "email" }]
defaults = { session_duration = "24h" }
collapse = true

[[resource]]
source = "example_legacy_monitor"
state = { delete = true }

[[split]]
source = "example_argo"
default_target = "smart_routing"
default_value = "off"
legacy_roots = ["legacy_mode"]
targets = [
  { discriminator = "smart_routing", target_type = "example_argo_smart_routing", attribute = "value" },
  { discriminator = "tiered_caching", target_type = "example_argo_tiered_caching", attribute = "value" },
]
"#;

pub fn fixture_catalog() -> Catalog {
    Catalog::from_toml_str(FIXTURE_CATALOG).unwrap()
}

pub fn fixture_registry() -> Arc<MigratorRegistry> {
    Arc::new(MigratorRegistry::from_catalog(&fixture_catalog()).unwrap())
}

pub fn fixture_engine() -> MigrationEngine {
    fixture_engine_with(MigrateConfig::default())
}

pub fn fixture_engine_with(config: MigrateConfig) -> MigrationEngine {
    MigrationEngine::new(fixture_registry(), config)
}

pub fn fixture_session() -> MigrationSession {
    fixture_engine().session()
}

/// Full state document with one resource per fixture entry
pub fn sample_state() -> String {
    r#"{
  "version": 4,
  "terraform_version": "1.5.7",
  "serial": 12,
  "lineage": "3f1c2b1e-0000-4000-8000-000000000000",
  "outputs": {},
  "resources": [
    {
      "mode": "managed",
      "type": "example_record",
      "name": "www",
      "provider": "provider[\"registry.example.io/example/example\"]",
      "instances": [
        {
          "schema_version": 3,
          "attributes": {"id": "r1", "value": "1.2.3.4", "ttl": "300", "proxied": "true", "comment": "", "data": []}
        }
      ]
    },
    {
      "mode": "managed",
      "type": "unknown_thing",
      "name": "x",
      "provider": "provider[\"registry.example.io/example/example\"]",
      "instances": [{"schema_version": 0, "attributes": {"id": "u1"}}]
    },
    {
      "mode": "managed",
      "type": "example_legacy_monitor",
      "name": "old",
      "provider": "provider[\"registry.example.io/example/example\"]",
      "instances": [{"schema_version": 0, "attributes": {"id": "m1"}}]
    }
  ]
}
"#
    .to_string()
}

/// Configuration matching [`sample_state`]
pub const SAMPLE_CONFIG: &str = r#"resource "example_record" "www" {
  zone_id = var.zone_id
  value   = "1.2.3.4"
  ttl     = 300
}

resource "unknown_thing" "x" {
  name = "x"
}

output "record_id" {
  value = example_record.www.id
}
"#;

pub fn parse_json(text: &str) -> Value {
    serde_json::from_str(text).unwrap()
}

/// Parse and reprint, for comparing against canonical output
pub fn reprint(src: &str) -> String {
    Body::parse(src).unwrap().to_hcl()
}

//! Migration engine
//!
//! Moves infrastructure-as-code configuration and state from one provider
//! schema version to the next:
//! - Looks up a migrator per resource type in a [`MigratorRegistry`]
//! - Rewrites configuration blocks and state instances with the generic
//!   operations of `tfm-rewrite` and `tfm-state`
//! - Splits one-to-many types through the [`ExpansionCoordinator`]
//! - Carries facts from the configuration phase to the state phase in a
//!   [`MigrationContext`]
//! - Reports every resource as transformed, unchanged, needing manual
//!   action or unhandled
//!
//! Migrators are mostly declared in a [`Catalog`] (TOML or YAML);
//! hand-written ones implement [`ResourceMigrator`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tfm_core::prelude::*;
//!
//! let catalog = Catalog::from_toml_str(r#"
//! [[resource]]
//! source = "record"
//! [resource.state]
//! rename = { value = "content" }
//! "#).unwrap();
//! let registry = Arc::new(MigratorRegistry::from_catalog(&catalog).unwrap());
//! let mut session = MigrationEngine::new(registry, MigrateConfig::default()).session();
//!
//! let state = r#"{"version":4,"resources":[{"mode":"managed","type":"record","name":"a","instances":[{"attributes":{"value":"x"}}]}]}"#;
//! let out = session.migrate_state(state).unwrap().unwrap();
//! assert!(out.contains("\"content\": \"x\""));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod catalog;
mod config;
mod context;
mod declarative;
mod engine;
mod error;
mod expansion;
mod migrator;
mod registry;
mod report;

// Re-exports
pub use catalog::{
    Catalog, ConfigRules, DynamicSpec, KeyedListSpec, MergeSpec, ResourceEntry, SplitEntry,
    StateRules, StringListSpec, TextRuleSpec,
};
pub use config::MigrateConfig;
pub use context::{AddressRename, MigrationContext};
pub use declarative::{DeclarativeMigrator, SplitMigrator};
pub use engine::{MigrationEngine, MigrationSession};
pub use error::{CatalogError, MigrationError, Result};
pub use expansion::{moved_block, ExpansionCoordinator, ExpansionState, SplitTarget};
pub use migrator::{declaration, Declaration, ResourceMigrator, TransformResult};
pub use registry::MigratorRegistry;
pub use report::{MigrationReport, Outcome, Phase, ReportSummary, ResourceReport};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running migrations
    pub use crate::{
        Catalog, MigrateConfig, MigrationContext, MigrationEngine, MigrationReport,
        MigratorRegistry, Outcome, Phase, ResourceMigrator, TransformResult,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const CATALOG: &str = r#"
[[resource]]
source = "record"

[resource.config]
conversions = [{ shape = "object", block = "settings" }]

[resource.state]
collapse = true

[[split]]
source = "argo"
default_target = "smart_routing"
default_value = "off"
targets = [
  { discriminator = "smart_routing", target_type = "argo_smart_routing", attribute = "value" },
  { discriminator = "tiered_caching", target_type = "argo_tiered_caching", attribute = "value" },
]
"#;

    fn session() -> MigrationSession {
        let catalog = Catalog::from_toml_str(CATALOG).unwrap();
        let registry = Arc::new(MigratorRegistry::from_catalog(&catalog).unwrap());
        MigrationEngine::new(registry, MigrateConfig::default()).session()
    }

    #[test]
    fn config_then_state_in_one_session() {
        let mut session = session();
        let config = "resource \"argo\" \"main\" {\n  zone_id = \"z\"\n  tiered_caching = \"on\"\n}\n";
        let out = session.migrate_config(config).unwrap();
        assert!(out.starts_with("resource \"argo_tiered_caching\" \"main\" {"));

        let state = r#"{"version":4,"resources":[{"mode":"managed","type":"argo","name":"main","instances":[{"attributes":{"zone_id":"z","tiered_caching":"on"}}]}]}"#;
        let out = session.migrate_state(state).unwrap().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["resources"][0]["type"], "argo_tiered_caching");
        assert_eq!(
            parsed["resources"][0]["instances"][0]["attributes"],
            serde_json::json!({"zone_id": "z", "value": "on"})
        );

        let report = session.finish();
        assert_eq!(report.len(), 2);
        assert_eq!(report.summary().transformed, 2);
    }

    #[test]
    fn second_pass_changes_nothing() {
        let mut session = session();
        let config = "resource \"record\" \"a\" {\n  settings {\n    mode = \"strict\"\n  }\n}\n";
        let once = session.migrate_config(config).unwrap();
        let twice = session.migrate_config(&once).unwrap();
        assert_eq!(once, twice);
    }
}

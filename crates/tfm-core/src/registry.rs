//! Migrator registry
//!
//! Provides [`MigratorRegistry`], the type → migrator dispatch table.
//! Registration happens once at start-up; lookups may run concurrently
//! afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::declarative::{DeclarativeMigrator, SplitMigrator};
use crate::error::Result;
use crate::migrator::ResourceMigrator;

#[derive(Default)]
struct RegistryInner {
    by_type: HashMap<String, Arc<dyn ResourceMigrator>>,
    ordered: Vec<Arc<dyn ResourceMigrator>>,
}

/// Ordered registry of resource migrators
#[derive(Default)]
pub struct MigratorRegistry {
    inner: RwLock<RegistryInner>,
}

impl fmt::Debug for MigratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("MigratorRegistry")
            .field("migrators", &inner.ordered.len())
            .field("keys", &inner.by_type.len())
            .finish()
    }
}

impl MigratorRegistry {
    /// Create an empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a catalog
    ///
    /// # Errors
    /// Returns an error when an entry's preprocess rules do not compile.
    pub fn from_catalog(catalog: &Catalog) -> Result<Self> {
        let registry = Self::new();
        for entry in &catalog.resources {
            registry.register(Arc::new(DeclarativeMigrator::from_entry(entry)?));
        }
        for split in &catalog.splits {
            registry.register(Arc::new(SplitMigrator::from_entry(split)));
        }
        Ok(registry)
    }

    /// Register a migrator under each of its source types
    pub fn register(&self, migrator: Arc<dyn ResourceMigrator>) {
        let mut inner = self.inner.write();
        for key in migrator.source_types() {
            if inner.by_type.contains_key(key) {
                warn!(key = %key, migrator = migrator.name(), "type registered twice, last wins");
            }
            inner.by_type.insert(key.clone(), Arc::clone(&migrator));
        }
        debug!(
            migrator = migrator.name(),
            types = ?migrator.source_types(),
            "migrator registered"
        );
        inner.ordered.push(migrator);
    }

    /// Bind `alias` to the migrator registered for `existing`
    ///
    /// Returns `false` when `existing` is unknown.
    pub fn register_alias(&self, alias: &str, existing: &str) -> bool {
        let mut inner = self.inner.write();
        let Some(migrator) = inner.by_type.get(existing).cloned() else {
            return false;
        };
        debug!(alias, existing, "alias registered");
        inner.by_type.insert(alias.to_string(), migrator);
        true
    }

    /// Migrator for a lookup key
    ///
    /// Exact registration first, then the first migrator in registration
    /// order whose [`ResourceMigrator::can_handle`] accepts the key.
    #[must_use]
    pub fn find(&self, resource_type: &str) -> Option<Arc<dyn ResourceMigrator>> {
        let inner = self.inner.read();
        if let Some(migrator) = inner.by_type.get(resource_type) {
            return Some(Arc::clone(migrator));
        }
        inner
            .ordered
            .iter()
            .find(|m| m.can_handle(resource_type))
            .cloned()
    }

    /// All migrators in registration order
    #[must_use]
    pub fn all(&self) -> Vec<Arc<dyn ResourceMigrator>> {
        self.inner.read().ordered.clone()
    }

    /// Check for an exact registration
    #[inline]
    #[must_use]
    pub fn contains(&self, resource_type: &str) -> bool {
        self.inner.read().by_type.contains_key(resource_type)
    }

    /// Number of registered migrators
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().ordered.len()
    }

    /// Check if nothing is registered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().ordered.is_empty()
    }
}

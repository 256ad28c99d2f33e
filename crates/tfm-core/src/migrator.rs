//! Migrator capability
//!
//! One implementation per resource type or family. Migrators are built and
//! registered once, then shared read-only; request state lives in the
//! [`MigrationContext`] passed to every call.

use std::borrow::Cow;
use std::fmt;

use serde_json::Value;
use tfm_state::{InstanceSite, StateOutcome};
use tfm_syntax::Block;

use crate::context::MigrationContext;
use crate::error::Result;

/// Output of migrating one configuration block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformResult {
    /// Blocks to splice in, in order
    pub blocks: Vec<Block>,
    /// Drop the source block
    pub remove_original: bool,
}

impl TransformResult {
    /// Keep the source block as is
    #[inline]
    #[must_use]
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// Replace the source block with `blocks`
    #[inline]
    #[must_use]
    pub fn replace(blocks: Vec<Block>) -> Self {
        Self {
            blocks,
            remove_original: true,
        }
    }

    /// Check whether the document is left alone
    #[inline]
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.blocks.is_empty() && !self.remove_original
    }
}

/// Migrates one resource type (or family) between schema versions
pub trait ResourceMigrator: Send + Sync + fmt::Debug {
    /// Name used in logs and reports
    fn name(&self) -> &str;

    /// Canonical target type; empty for one-to-many splitters
    fn resource_type(&self) -> &str;

    /// Lookup keys this migrator is registered under
    ///
    /// Data sources use `data.<type>`.
    fn source_types(&self) -> &[String];

    /// Fallback predicate for types without an exact registration
    fn can_handle(&self, resource_type: &str) -> bool {
        self.source_types().iter().any(|t| t == resource_type)
    }

    /// Lexical fixes on the raw configuration text, before parsing
    fn preprocess<'a>(&self, text: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(text)
    }

    /// Migrate one `resource` or `data` block
    ///
    /// # Errors
    /// Returns an error only when the block cannot be migrated at all.
    fn transform_config(&self, ctx: &mut MigrationContext, block: &Block) -> Result<TransformResult>;

    /// Migrate one state instance
    ///
    /// # Errors
    /// Returns an error only when the instance cannot be migrated at all.
    fn transform_state(
        &self,
        ctx: &mut MigrationContext,
        instance: Value,
        site: &InstanceSite,
    ) -> Result<StateOutcome>;
}

/// Labels of a `resource "<type>" "<name>"` or `data` block
#[must_use]
pub fn declaration(block: &Block) -> Option<Declaration<'_>> {
    let data = match block.ident.as_str() {
        "resource" => false,
        "data" => true,
        _ => return None,
    };
    Some(Declaration {
        data,
        resource_type: block.label(0)?,
        name: block.label(1)?,
    })
}

/// Identity of a declaration block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Declaration<'a> {
    /// `data` block
    pub data: bool,
    /// First label
    pub resource_type: &'a str,
    /// Second label
    pub name: &'a str,
}

impl Declaration<'_> {
    /// Registry key: `<type>` or `data.<type>`
    #[must_use]
    pub fn lookup_key(&self) -> String {
        if self.data {
            format!("data.{}", self.resource_type)
        } else {
            self.resource_type.to_string()
        }
    }

    /// Address as written in references
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}.{}", self.lookup_key(), self.name)
    }

    /// Address steps with another type
    #[must_use]
    pub fn steps_with_type<'b>(&'b self, resource_type: &'b str) -> Vec<&'b str> {
        let mut steps = Vec::with_capacity(3);
        if self.data {
            steps.push("data");
        }
        steps.push(resource_type);
        steps.push(self.name);
        steps
    }
}

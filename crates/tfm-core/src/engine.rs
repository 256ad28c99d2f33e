//! Migration engine and sessions
//!
//! The engine pairs a shared registry with settings. Each request runs in
//! a [`MigrationSession`], which owns the request's [`MigrationContext`].
//! Configuration goes first so the state phase sees the facts it
//! recorded; the report is collected across both phases.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tfm_core::{Catalog, MigrateConfig, MigrationEngine, MigratorRegistry};
//!
//! let catalog = Catalog::from_toml_str(
//!     "[[resource]]\nsource = \"old\"\ntarget = \"new\"\n",
//! ).unwrap();
//! let registry = Arc::new(MigratorRegistry::from_catalog(&catalog).unwrap());
//! let engine = MigrationEngine::new(registry, MigrateConfig::default().with_moved_blocks(false));
//!
//! let mut session = engine.session();
//! let out = session
//!     .migrate_config("resource \"old\" \"a\" {\n  x = 1\n}\n")
//!     .unwrap();
//! assert_eq!(out, "resource \"new\" \"a\" {\n  x = 1\n}\n");
//! assert_eq!(session.finish().len(), 1);
//! ```

use std::borrow::Cow;
use std::sync::Arc;

use serde_json::Value;
use tfm_state::{DocumentRouter, InstanceSite, InstanceUpdate, StateOutcome};
use tfm_syntax::{Block, Body, Expression, Structure};
use tracing::{debug, info, warn};

use crate::config::MigrateConfig;
use crate::context::MigrationContext;
use crate::error::{MigrationError, Result};
use crate::migrator::{declaration, ResourceMigrator, TransformResult};
use crate::registry::MigratorRegistry;
use crate::report::{MigrationReport, Phase};

const MOVED: &str = "moved";

/// Shared registry plus settings
#[derive(Debug, Clone)]
pub struct MigrationEngine {
    registry: Arc<MigratorRegistry>,
    config: MigrateConfig,
}

impl MigrationEngine {
    /// Create an engine
    #[must_use]
    pub fn new(registry: Arc<MigratorRegistry>, config: MigrateConfig) -> Self {
        Self { registry, config }
    }

    /// Registry in use
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &MigratorRegistry {
        &self.registry
    }

    /// Settings in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &MigrateConfig {
        &self.config
    }

    /// Start a request
    #[must_use]
    pub fn session(&self) -> MigrationSession {
        MigrationSession {
            registry: Arc::clone(&self.registry),
            ctx: MigrationContext::new().with_moved_blocks(self.config.emit_moved_blocks),
            config: self.config.clone(),
        }
    }
}

/// One migration request
#[derive(Debug)]
pub struct MigrationSession {
    registry: Arc<MigratorRegistry>,
    config: MigrateConfig,
    ctx: MigrationContext,
}

impl MigrationSession {
    /// Request context
    #[inline]
    #[must_use]
    pub fn context(&self) -> &MigrationContext {
        &self.ctx
    }

    /// Mutable request context, for seeding facts
    #[inline]
    pub fn context_mut(&mut self) -> &mut MigrationContext {
        &mut self.ctx
    }

    /// Report collected so far
    #[inline]
    #[must_use]
    pub fn report(&self) -> &MigrationReport {
        self.ctx.report()
    }

    /// End the request and hand out the report
    #[must_use]
    pub fn finish(self) -> MigrationReport {
        let report = self.ctx.into_report();
        info!(summary = %report.summary(), "migration finished");
        report
    }

    /// Migrate one configuration file
    ///
    /// Declarations without a migrator are kept as they are and reported.
    /// When nothing changes the input is returned byte for byte.
    ///
    /// # Errors
    /// Returns [`MigrationError::Parse`] when the text does not parse.
    pub fn migrate_config(&mut self, text: &str) -> Result<String> {
        let source = if self.config.preprocess {
            self.preprocess(text)
        } else {
            Cow::Borrowed(text)
        };
        let preprocessed = matches!(source, Cow::Owned(_));
        let mut body = Body::parse(&source)?;

        let items = std::mem::take(body.items_mut());
        let mut out = Vec::with_capacity(items.len());
        let mut changed = false;
        for item in items {
            let result = match &item {
                Structure::Block(block) => match declaration(block) {
                    Some(decl) => {
                        let address = decl.address();
                        match self.registry.find(&decl.lookup_key()) {
                            Some(migrator) => {
                                self.transform_block(migrator.as_ref(), &address, block)
                            }
                            None => {
                                debug!(%address, "no migrator, declaration kept");
                                self.ctx.report_unhandled(&address, Phase::Config);
                                TransformResult::unchanged()
                            }
                        }
                    }
                    None => TransformResult::unchanged(),
                },
                _ => TransformResult::unchanged(),
            };

            if result.is_unchanged() {
                out.push(item);
                continue;
            }
            changed = true;
            let keep_original = !result.remove_original;
            if keep_original {
                out.push(item);
            }
            for (i, block) in result.blocks.into_iter().enumerate() {
                if i > 0 || keep_original {
                    out.push(Structure::BlankLine);
                }
                out.push(Structure::Block(block));
            }
        }
        *body.items_mut() = out;
        if changed {
            body.tidy_blank_lines();
        }

        let rewritten = if self.config.rewrite_references {
            self.rewrite_references(&mut body)
        } else {
            0
        };
        if rewritten > 0 {
            debug!(rewritten, "references rewritten");
        }

        if !changed && rewritten == 0 && !preprocessed {
            return Ok(text.to_string());
        }
        Ok(body.to_hcl())
    }

    /// Migrate a state document: full state, one resource or one instance
    /// with its type given by the document
    ///
    /// Returns `None` when the whole document was deleted.
    ///
    /// # Errors
    /// Returns [`MigrationError::State`] for text that is not a state document.
    pub fn migrate_state(&mut self, text: &str) -> Result<Option<String>> {
        let router = DocumentRouter::new().with_indent(self.config.state_indent);
        self.route(&router, text)
    }

    /// Migrate a bare instance document of a known resource
    ///
    /// # Errors
    /// Returns [`MigrationError::State`] for text that is not an instance.
    pub fn migrate_instance(
        &mut self,
        text: &str,
        resource_type: &str,
        resource_name: &str,
    ) -> Result<Option<String>> {
        let router = DocumentRouter::new()
            .with_indent(self.config.state_indent)
            .with_site(InstanceSite::new(resource_type, resource_name));
        self.route(&router, text)
    }

    fn preprocess<'t>(&self, text: &'t str) -> Cow<'t, str> {
        let mut out = Cow::Borrowed(text);
        for migrator in self.registry.all() {
            let fixed = match migrator.preprocess(&out) {
                Cow::Owned(fixed) => Some(fixed),
                Cow::Borrowed(_) => None,
            };
            if let Some(fixed) = fixed {
                debug!(migrator = migrator.name(), "text preprocessed");
                out = Cow::Owned(fixed);
            }
        }
        out
    }

    fn transform_block(
        &mut self,
        migrator: &dyn ResourceMigrator,
        address: &str,
        block: &Block,
    ) -> TransformResult {
        self.ctx.begin_resource(address, Phase::Config, migrator.name());
        let result = match migrator.transform_config(&mut self.ctx, block) {
            Ok(result) => result,
            Err(err) => {
                warn!(%address, migrator = migrator.name(), error = %err, "migration failed, block kept");
                self.ctx.manual_action(format!("migration failed: {err}"));
                TransformResult::unchanged()
            }
        };
        self.ctx.end_resource();
        result
    }

    /// Rewrite references to renamed addresses, `moved` blocks excepted
    fn rewrite_references(&self, body: &mut Body) -> usize {
        let renames: Vec<(Vec<&str>, Vec<&str>)> = self
            .ctx
            .renames()
            .iter()
            .map(|r| {
                (
                    r.from.iter().map(String::as_str).collect(),
                    r.to.iter().map(String::as_str).collect(),
                )
            })
            .collect();
        if renames.is_empty() {
            return 0;
        }

        let mut rewritten = 0usize;
        let mut visit = |expr: &mut Expression| {
            for (from, to) in &renames {
                if expr.rename_address(from, to) {
                    rewritten += 1;
                }
            }
        };
        for item in body.items_mut() {
            match item {
                Structure::Block(block) if block.ident == MOVED => {}
                Structure::Block(block) => block.body.visit_expressions_mut(&mut visit),
                Structure::Attribute(attr) => visit(&mut attr.expr),
                Structure::Comment(_) | Structure::BlankLine => {}
            }
        }
        rewritten
    }

    fn route(&mut self, router: &DocumentRouter, text: &str) -> Result<Option<String>> {
        let registry = Arc::clone(&self.registry);
        let ctx = &mut self.ctx;
        router.rewrite(text, |site: &InstanceSite, instance: Value| {
            let address = site.address();
            let Some(migrator) = registry.find(&site.lookup_key()) else {
                ctx.report_unhandled(&address, Phase::State);
                return Ok::<_, MigrationError>(InstanceUpdate::rewritten(instance));
            };

            ctx.begin_resource(&address, Phase::State, migrator.name());
            let outcome = match migrator.transform_state(ctx, instance.clone(), site) {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(%address, migrator = migrator.name(), error = %err, "migration failed, instance kept");
                    ctx.manual_action(format!("migration failed: {err}"));
                    StateOutcome::Rewritten(instance)
                }
            };

            let resolved = ctx.instance_type(&address).map(str::to_string).or_else(|| {
                let target = migrator.resource_type();
                (!target.is_empty()).then(|| target.to_string())
            });
            let mut update = InstanceUpdate::from(outcome);
            if let Some(target) = resolved.filter(|t| *t != site.resource_type) {
                update = update.with_type(target);
            }
            ctx.end_resource();
            Ok(update)
        })
    }
}

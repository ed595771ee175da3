//! CK-009: Engine, the validated registry and cookbook callers work through.
//!
//! Building an engine instantiates every configured candidate once, so a bad
//! recipe name, a rejected parameter block or a product mismatch fails here
//! rather than in the middle of a resolution.

use super::cookbook::{default_config, validate_config, Cookbook, CookbookConfig};
use super::error::{EngineError, PlanError};
use super::executor;
use super::fieldset::FieldSet;
use super::planner::Resolution;
use super::registry::Registry;
use super::resolver::Resolver;
use super::types::ExecutionReport;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Immutable resolution context shared by any number of sessions.
#[derive(Debug, Clone)]
pub struct Engine {
    registry: Arc<Registry>,
    cookbook: Cookbook,
}

/// Result of `Engine::derive`: what was planned, what ran, what is missing.
#[derive(Debug)]
pub struct DeriveReport {
    /// The session; keep it to run TL/AD against the same recipe instances.
    pub resolution: Resolution,
    pub execution: ExecutionReport,
}

impl DeriveReport {
    /// Requested outputs now present in the field set.
    pub fn produced(&self, fields: &FieldSet) -> Vec<String> {
        self.resolution
            .resolved
            .iter()
            .filter(|v| fields.has(v))
            .cloned()
            .collect()
    }

    pub fn unresolved(&self) -> &IndexMap<String, PlanError> {
        &self.resolution.failures
    }

    pub fn is_success(&self) -> bool {
        self.resolution.is_complete() && self.execution.is_success()
    }
}

impl Engine {
    /// Validate `config` against `registry` and build the engine. Returns the
    /// first problem found; use [`validate_config`] to list all of them.
    pub fn new(registry: Arc<Registry>, config: &CookbookConfig) -> Result<Self, EngineError> {
        if let Some(err) = validate_config(config, &registry).into_iter().next() {
            return Err(err);
        }
        let cookbook = Cookbook::from_config(config)?;
        debug!(
            products = cookbook.len(),
            recipes = registry.len(),
            "engine ready"
        );
        Ok(Self { registry, cookbook })
    }

    /// Built-in catalogue with the default cookbook.
    pub fn with_defaults() -> Result<Self, EngineError> {
        Self::new(Arc::new(Registry::builtin()), &default_config())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn cookbook(&self) -> &Cookbook {
        &self.cookbook
    }

    /// Plan `targets` against the variables present in `fields`.
    pub fn resolve<S: AsRef<str>>(&self, targets: &[S], fields: &FieldSet) -> Resolution {
        self.resolve_with(targets, fields.names())
    }

    /// Plan `targets` against an explicit set of available variables.
    pub fn resolve_with<S, I, V>(&self, targets: &[S], available: I) -> Resolution
    where
        S: AsRef<str>,
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Resolver::new(&self.registry, &self.cookbook, available).resolve_all(targets)
    }

    /// Plan `targets` from `fields` and run the plan forward once.
    ///
    /// Unresolvable outputs are reported and skipped; everything that can be
    /// produced still is.
    pub fn derive<S: AsRef<str>>(&self, targets: &[S], fields: &mut FieldSet) -> DeriveReport {
        let mut resolution = self.resolve(targets, fields);
        let execution = executor::execute_nl(&mut resolution.plan, fields);
        info!(
            planned = resolution.plan.len(),
            executed = execution.executed.len(),
            unresolved = resolution.failures.len(),
            "derive finished"
        );
        DeriveReport {
            resolution,
            execution,
        }
    }
}

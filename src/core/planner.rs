//! CK-008: Execution plans. A plan holds the ordered recipe instances a resolution
//! produced, plus the per-session bookkeeping the executor needs.

use super::error::PlanError;
use super::recipe::Recipe;
use super::types::RecipeDescriptor;
use crate::provenance::hasher;
use indexmap::IndexMap;
use std::collections::HashSet;

/// One recipe instance in a plan.
pub struct PlanStep {
    pub(crate) recipe: Box<dyn Recipe>,
    pub(crate) set_up: bool,
}

impl PlanStep {
    pub fn new(recipe: Box<dyn Recipe>) -> Self {
        Self {
            recipe,
            set_up: false,
        }
    }

    pub fn recipe(&self) -> &dyn Recipe {
        self.recipe.as_ref()
    }

    pub fn name(&self) -> &str {
        self.recipe.name()
    }

    pub fn product(&self) -> &str {
        self.recipe.product()
    }

    /// Whether setup already ran in this session.
    pub fn is_set_up(&self) -> bool {
        self.set_up
    }
}

impl std::fmt::Debug for PlanStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanStep")
            .field("recipe", &self.recipe.name())
            .field("product", &self.recipe.product())
            .field("set_up", &self.set_up)
            .finish()
    }
}

/// Ordered, dependency-respecting sequence of recipe instances.
#[derive(Debug, Default)]
pub struct Plan {
    steps: Vec<PlanStep>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub(crate) fn steps_mut(&mut self) -> &mut [PlanStep] {
        &mut self.steps
    }

    pub(crate) fn extend(&mut self, steps: Vec<PlanStep>) {
        self.steps.extend(steps);
    }

    /// Recipe names in execution order.
    pub fn recipe_names(&self) -> Vec<&str> {
        self.steps.iter().map(PlanStep::name).collect()
    }

    /// Products in execution order.
    pub fn products(&self) -> Vec<&str> {
        self.steps.iter().map(PlanStep::product).collect()
    }

    pub fn descriptors(&self) -> Vec<RecipeDescriptor> {
        self.steps.iter().map(|s| s.recipe.descriptor()).collect()
    }

    /// BLAKE3 fingerprint of the ordered `(recipe, product)` pairs.
    pub fn fingerprint(&self) -> String {
        let joined = self
            .steps
            .iter()
            .map(|s| format!("{}\u{1f}{}", s.name(), s.product()))
            .collect::<Vec<_>>()
            .join("\0");
        hasher::hash_string(&joined)
    }

    /// Check that every ingredient is either in `available` or produced by an
    /// earlier step, and that no product is produced twice.
    pub fn check_order<'a>(&self, available: impl IntoIterator<Item = &'a str>) -> Result<(), String> {
        let mut known: HashSet<&str> = HashSet::new();
        for name in available {
            known.insert(name);
        }
        let mut produced: HashSet<&str> = HashSet::new();
        for (i, step) in self.steps.iter().enumerate() {
            for ingredient in step.recipe.ingredients() {
                if !known.contains(ingredient.as_str()) {
                    return Err(format!(
                        "step {} ({}) needs '{}' before it is available",
                        i,
                        step.name(),
                        ingredient
                    ));
                }
            }
            if !produced.insert(step.product()) {
                return Err(format!("product '{}' is produced twice", step.product()));
            }
            known.insert(step.product());
        }
        Ok(())
    }
}

/// Result of resolving a set of requested outputs against one available set.
///
/// Holds the session's recipe instances; keep it to run TL/AD repeatedly
/// against the same reference state.
#[derive(Debug, Default)]
pub struct Resolution {
    pub plan: Plan,
    /// Requested outputs that can be produced (or were already available).
    pub resolved: Vec<String>,
    /// Requested outputs that cannot, with diagnostics.
    pub failures: IndexMap<String, PlanError>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

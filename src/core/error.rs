//! CK-002: Error types for the registry, cookbook, planner and executor.
//!
//! Planning failures (`PlanError`) keep the full attempt tree so a caller can
//! reconstruct why a variable could not be produced without re-running the
//! resolution. Everything else surfaces as an `EngineError`.

use super::types::Mode;
use thiserror::Error;

/// Engine-level failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("unknown recipe '{name}'")]
    UnknownRecipe { name: String },

    #[error("recipe '{name}' is already registered")]
    DuplicateRecipe { name: String },

    #[error("invalid configuration for recipe '{recipe}': {message}")]
    InvalidRecipeConfig { recipe: String, message: String },

    #[error("cookbook configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("recipe '{recipe}' (product '{product}') does not support {mode} execution")]
    CapabilityMismatch {
        recipe: String,
        product: String,
        mode: Mode,
    },

    #[error("setup of recipe '{recipe}' (product '{product}') failed: {message}")]
    Setup {
        recipe: String,
        product: String,
        message: String,
    },

    #[error("{mode} execution of recipe '{recipe}' (product '{product}') failed: {message}")]
    Execute {
        recipe: String,
        product: String,
        mode: Mode,
        message: String,
    },
}

impl EngineError {
    /// Name of the recipe the failure is attributed to, if any.
    pub fn recipe(&self) -> Option<&str> {
        match self {
            Self::UnknownRecipe { name } | Self::DuplicateRecipe { name } => Some(name),
            Self::InvalidRecipeConfig { recipe, .. }
            | Self::CapabilityMismatch { recipe, .. }
            | Self::Setup { recipe, .. }
            | Self::Execute { recipe, .. } => Some(recipe),
            Self::Config(_) | Self::Plan(_) => None,
        }
    }
}

/// Why a variable could not be planned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    /// No candidate recipe chain could be satisfied.
    #[error("cannot resolve '{variable}': {}", describe_attempts(.attempts))]
    Unresolvable {
        variable: String,
        attempts: Vec<Attempt>,
    },

    /// Every candidate ran back into a variable already being resolved.
    #[error("dependency cycle while resolving '{variable}': {}", .chain.join(" -> "))]
    Cycle { variable: String, chain: Vec<String> },
}

/// One candidate recipe tried for a product, and why it was abandoned.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub candidate: String,
    pub failure: AttemptFailure,
}

/// Reason a candidate was abandoned.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    /// The registry could not build the candidate.
    Instantiation(String),
    /// One of the candidate's ingredients could not be resolved.
    Ingredient {
        ingredient: String,
        cause: Box<PlanError>,
    },
}

impl PlanError {
    /// The variable this failure is reported for.
    pub fn variable(&self) -> &str {
        match self {
            Self::Unresolvable { variable, .. } | Self::Cycle { variable, .. } => variable,
        }
    }

    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle { .. })
    }

    /// True if a cycle appears anywhere in the attempt tree.
    pub fn involves_cycle(&self) -> bool {
        match self {
            Self::Cycle { .. } => true,
            Self::Unresolvable { attempts, .. } => attempts.iter().any(|a| match &a.failure {
                AttemptFailure::Ingredient { cause, .. } => cause.involves_cycle(),
                AttemptFailure::Instantiation(_) => false,
            }),
        }
    }

    /// Leaf variables that have no recipe and are not available, in the order
    /// they were first met while walking the attempt tree.
    pub fn missing_leaves(&self) -> Vec<String> {
        let mut leaves = Vec::new();
        collect_leaves(self, &mut leaves);
        leaves
    }
}

fn collect_leaves(err: &PlanError, leaves: &mut Vec<String>) {
    if let PlanError::Unresolvable { variable, attempts } = err {
        if attempts.is_empty() {
            if !leaves.contains(variable) {
                leaves.push(variable.clone());
            }
            return;
        }
        for attempt in attempts {
            if let AttemptFailure::Ingredient { cause, .. } = &attempt.failure {
                collect_leaves(cause, leaves);
            }
        }
    }
}

fn describe_attempts(attempts: &[Attempt]) -> String {
    if attempts.is_empty() {
        return "no recipe produces it and it is not available".to_string();
    }
    attempts
        .iter()
        .map(|a| match &a.failure {
            AttemptFailure::Instantiation(msg) => {
                format!("{} could not be built ({})", a.candidate, msg)
            }
            AttemptFailure::Ingredient { ingredient, cause } => match cause.as_ref() {
                PlanError::Cycle { chain, .. } => {
                    format!("{} needs '{}' (cycle {})", a.candidate, ingredient, chain.join(" -> "))
                }
                PlanError::Unresolvable { .. } => format!(
                    "{} needs '{}' (missing {})",
                    a.candidate,
                    ingredient,
                    cause.missing_leaves().join(", ")
                ),
            },
        })
        .collect::<Vec<_>>()
        .join("; ")
}

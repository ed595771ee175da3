//! CK-001: Shared types for execution modes, recipe descriptors, execution
//! events and reports.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Execution modes
// ============================================================================

/// Which entry point of a recipe to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Nonlinear forward transform.
    Forward,
    /// Linearised forward propagation of an increment.
    TangentLinear,
    /// Transpose of the tangent linear, run in reverse plan order.
    Adjoint,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "NL"),
            Self::TangentLinear => write!(f, "TL"),
            Self::Adjoint => write!(f, "AD"),
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nl" | "forward" => Ok(Self::Forward),
            "tl" | "tangent_linear" | "tangent-linear" => Ok(Self::TangentLinear),
            "ad" | "adjoint" => Ok(Self::Adjoint),
            other => Err(format!("unknown execution mode '{}'", other)),
        }
    }
}

// ============================================================================
// Recipe descriptors
// ============================================================================

/// Entry points and setup requirement a recipe advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub has_setup: bool,
    pub nl: bool,
    pub tl: bool,
    pub ad: bool,
}

impl Capabilities {
    /// Forward only, no setup.
    pub const NL_ONLY: Self = Self {
        has_setup: false,
        nl: true,
        tl: false,
        ad: false,
    };

    /// Forward, tangent linear and adjoint, no setup.
    pub const LINEARISED: Self = Self {
        has_setup: false,
        nl: true,
        tl: true,
        ad: true,
    };

    pub fn supports(&self, mode: Mode) -> bool {
        match mode {
            Mode::Forward => self.nl,
            Mode::TangentLinear => self.tl,
            Mode::Adjoint => self.ad,
        }
    }

    pub fn with_setup(mut self) -> Self {
        self.has_setup = true;
        self
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut modes = Vec::new();
        if self.nl {
            modes.push("NL");
        }
        if self.tl {
            modes.push("TL");
        }
        if self.ad {
            modes.push("AD");
        }
        write!(f, "{}", modes.join("/"))?;
        if self.has_setup {
            write!(f, " +setup")?;
        }
        Ok(())
    }
}

/// Static description of a configured recipe instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeDescriptor {
    pub name: String,
    pub product: String,
    pub ingredients: Vec<String>,
    pub capabilities: Capabilities,
}

// ============================================================================
// Execution events
// ============================================================================

/// Provenance event emitted by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    RunStarted {
        run_id: String,
        mode: Mode,
        steps: usize,
        fingerprint: String,
    },
    RecipeStarted {
        recipe: String,
        product: String,
        mode: Mode,
    },
    RecipeCompleted {
        recipe: String,
        product: String,
        duration_seconds: f64,
        hash: String,
    },
    RecipeFailed {
        recipe: String,
        product: String,
        error: String,
    },
    RunCompleted {
        run_id: String,
        executed: usize,
        failed: usize,
        total_seconds: f64,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: ExecutionEvent,
}

// ============================================================================
// Execution report
// ============================================================================

/// Outcome of running a plan once in one mode.
///
/// On failure `executed` still lists the recipes that ran before it; their
/// writes to the field set are kept.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub run_id: String,
    pub mode: Mode,
    /// Recipe names in the order they ran.
    pub executed: Vec<String>,
    pub failure: Option<super::error::EngineError>,
    pub events: Vec<TimestampedEvent>,
    pub total_duration: std::time::Duration,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

//! CK-012: Executor. Runs a plan in one mode against a field set.
//!
//! Every step is checked for the requested mode before anything runs. Steps
//! then run in plan order (NL, TL) or reverse plan order (AD); setup runs once
//! per session. The first failure stops the run; writes made by earlier
//! recipes are kept and the report names the recipes that completed.

use super::error::EngineError;
use super::fieldset::{FieldSet, FunctionSpace};
use super::planner::{Plan, PlanStep};
use super::types::{ExecutionEvent, ExecutionReport, Mode, TimestampedEvent};
use crate::provenance::{eventlog, hasher};
use std::time::Instant;
use tracing::{debug, warn};

/// The field set a run writes to, plus the reference state for linearised modes.
enum Target<'a> {
    Nonlinear(&'a mut FieldSet),
    Tangent {
        increments: &'a mut FieldSet,
        reference: &'a FieldSet,
    },
    Adjoint {
        sensitivities: &'a mut FieldSet,
        reference: &'a FieldSet,
    },
}

impl Target<'_> {
    fn mode(&self) -> Mode {
        match self {
            Self::Nonlinear(_) => Mode::Forward,
            Self::Tangent { .. } => Mode::TangentLinear,
            Self::Adjoint { .. } => Mode::Adjoint,
        }
    }

    /// State handed to `setup`: the live fields in NL, the reference otherwise.
    fn setup_source(&self) -> &FieldSet {
        match self {
            Self::Nonlinear(fields) => &**fields,
            Self::Tangent { reference, .. } | Self::Adjoint { reference, .. } => *reference,
        }
    }
}

/// Run the nonlinear transform of every step in plan order.
pub fn execute_nl(plan: &mut Plan, fields: &mut FieldSet) -> ExecutionReport {
    run(plan, Target::Nonlinear(fields))
}

/// Propagate increments through the plan in plan order.
pub fn execute_tl(plan: &mut Plan, increments: &mut FieldSet, reference: &FieldSet) -> ExecutionReport {
    run(
        plan,
        Target::Tangent {
            increments,
            reference,
        },
    )
}

/// Propagate sensitivities backward through the plan in reverse plan order.
pub fn execute_ad(
    plan: &mut Plan,
    sensitivities: &mut FieldSet,
    reference: &FieldSet,
) -> ExecutionReport {
    run(
        plan,
        Target::Adjoint {
            sensitivities,
            reference,
        },
    )
}

/// Fail on the first step that does not support `mode`.
pub fn check_capabilities(plan: &Plan, mode: Mode) -> Result<(), EngineError> {
    for step in plan.steps() {
        if !step.recipe().capabilities().supports(mode) {
            return Err(EngineError::CapabilityMismatch {
                recipe: step.name().to_string(),
                product: step.product().to_string(),
                mode,
            });
        }
    }
    Ok(())
}

fn run(plan: &mut Plan, mut target: Target<'_>) -> ExecutionReport {
    let start = Instant::now();
    let mode = target.mode();
    let run_id = eventlog::generate_run_id();
    let mut events: Vec<TimestampedEvent> = vec![eventlog::stamp(ExecutionEvent::RunStarted {
        run_id: run_id.clone(),
        mode,
        steps: plan.len(),
        fingerprint: plan.fingerprint(),
    })];
    let mut executed: Vec<String> = Vec::new();
    let mut failure: Option<EngineError> = None;

    debug!(%run_id, %mode, steps = plan.len(), "run started");

    if let Err(err) = check_capabilities(plan, mode) {
        warn!(%run_id, error = %err, "capability check failed");
        if let EngineError::CapabilityMismatch {
            recipe, product, ..
        } = &err
        {
            events.push(eventlog::stamp(ExecutionEvent::RecipeFailed {
                recipe: recipe.clone(),
                product: product.clone(),
                error: err.to_string(),
            }));
        }
        failure = Some(err);
    } else {
        let mut order: Vec<usize> = (0..plan.len()).collect();
        if mode == Mode::Adjoint {
            order.reverse();
        }

        for index in order {
            let step = &mut plan.steps_mut()[index];
            let (recipe, product) = (step.name().to_string(), step.product().to_string());
            events.push(eventlog::stamp(ExecutionEvent::RecipeStarted {
                recipe: recipe.clone(),
                product: product.clone(),
                mode,
            }));

            let step_start = Instant::now();
            match run_step(step, &mut target) {
                Ok(hash) => {
                    let duration = step_start.elapsed().as_secs_f64();
                    debug!(%recipe, %product, %mode, duration, "recipe completed");
                    events.push(eventlog::stamp(ExecutionEvent::RecipeCompleted {
                        recipe: recipe.clone(),
                        product,
                        duration_seconds: duration,
                        hash,
                    }));
                    executed.push(recipe);
                }
                Err(err) => {
                    warn!(%recipe, %product, %mode, error = %err, "recipe failed, stopping run");
                    events.push(eventlog::stamp(ExecutionEvent::RecipeFailed {
                        recipe,
                        product,
                        error: err.to_string(),
                    }));
                    failure = Some(err);
                    break;
                }
            }
        }
    }

    let total_duration = start.elapsed();
    events.push(eventlog::stamp(ExecutionEvent::RunCompleted {
        run_id: run_id.clone(),
        executed: executed.len(),
        failed: usize::from(failure.is_some()),
        total_seconds: total_duration.as_secs_f64(),
    }));

    ExecutionReport {
        run_id,
        mode,
        executed,
        failure,
        events,
        total_duration,
    }
}

/// Run one step: setup if still pending, size missing outputs, then the
/// entry point for the target's mode. Returns a hash of what was written.
fn run_step(step: &mut PlanStep, target: &mut Target<'_>) -> Result<String, EngineError> {
    let mode = target.mode();
    let exec_err = |step: &PlanStep, message: String| EngineError::Execute {
        recipe: step.name().to_string(),
        product: step.product().to_string(),
        mode,
        message,
    };

    if step.recipe.requires_setup() && !step.set_up {
        step.recipe
            .setup(target.setup_source())
            .map_err(|message| EngineError::Setup {
                recipe: step.name().to_string(),
                product: step.product().to_string(),
                message,
            })?;
        step.set_up = true;
        debug!(recipe = step.name(), "setup complete");
    }

    match target {
        Target::Nonlinear(fields) => {
            ensure_product(step, fields, None).map_err(|m| exec_err(step, m))?;
            step.recipe
                .execute_nl(fields)
                .map_err(|m| exec_err(step, m))?;
            hasher::hash_field(fields, step.product()).map_err(|m| exec_err(step, m))
        }
        Target::Tangent {
            increments,
            reference,
        } => {
            ensure_product(step, increments, Some(*reference)).map_err(|m| exec_err(step, m))?;
            step.recipe
                .execute_tl(increments, reference)
                .map_err(|m| exec_err(step, m))?;
            hasher::hash_field(increments, step.product()).map_err(|m| exec_err(step, m))
        }
        Target::Adjoint {
            sensitivities,
            reference,
        } => {
            ensure_product(step, sensitivities, Some(*reference))
                .map_err(|m| exec_err(step, m))?;
            for ingredient in step.recipe.ingredients() {
                if !sensitivities.has(ingredient) {
                    let (levels, space) = shape_of(reference, ingredient)
                        .map_err(|m| exec_err(step, m))?
                        .ok_or_else(|| {
                            exec_err(
                                step,
                                format!("no reference field for ingredient '{}'", ingredient),
                            )
                        })?;
                    sensitivities.create(ingredient, levels, space);
                }
            }
            step.recipe
                .execute_ad(sensitivities, reference)
                .map_err(|m| exec_err(step, m))?;
            let hashes = step
                .recipe
                .ingredients()
                .iter()
                .map(|i| hasher::hash_field(sensitivities, i))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|m| exec_err(step, m))?;
            let refs: Vec<&str> = hashes.iter().map(String::as_str).collect();
            Ok(hasher::composite_hash(&refs))
        }
    }
}

/// Create the step's product in `out` if it is missing. Linearised modes take
/// the shape from the reference product when there is one.
fn ensure_product(
    step: &PlanStep,
    out: &mut FieldSet,
    reference: Option<&FieldSet>,
) -> Result<(), String> {
    let product = step.product();
    if out.has(product) {
        return Ok(());
    }
    if let Some(Some((levels, space))) = reference.map(|r| shape_of(r, product)).transpose()? {
        out.create(product, levels, space);
        return Ok(());
    }
    let sizing = reference.unwrap_or(&*out);
    let levels = step.recipe.product_levels(sizing)?;
    let space = step.recipe.product_function_space(sizing)?;
    out.create(product, levels, space);
    Ok(())
}

fn shape_of(fields: &FieldSet, name: &str) -> Result<Option<(usize, FunctionSpace)>, String> {
    if !fields.has(name) {
        return Ok(None);
    }
    Ok(Some((fields.levels(name)?, fields.function_space(name)?.clone())))
}

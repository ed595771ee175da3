//! CK-007: Recipe resolution. Turns requested products into a plan.
//!
//! Depth-first search over the cookbook with an explicit frame stack:
//! each frame resolves one product by trying its candidates in priority
//! order, descending into every ingredient that is not yet available.
//! A candidate whose ingredient chain fails is abandoned together with the
//! recipes it had tentatively planned, and the next candidate is tried.
//!
//! Products become available the moment their recipe is committed to the
//! plan. The session keeps a single available set; each candidate records
//! the products it added so abandoning it removes exactly those. Failures
//! that do not involve a cycle are memoised for the session, so an
//! unsatisfiable variable is explored at most once.

use super::cookbook::Cookbook;
use super::error::{Attempt, AttemptFailure, PlanError};
use super::planner::{PlanStep, Resolution};
use super::recipe::Recipe;
use super::registry::Registry;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace, warn};

/// One resolution session: a growing available set and a failure memo.
pub struct Resolver<'a> {
    registry: &'a Registry,
    cookbook: &'a Cookbook,
    available: HashSet<String>,
    failed: HashMap<String, PlanError>,
}

/// A product being resolved.
struct Frame {
    product: String,
    candidates: Vec<String>,
    next_candidate: usize,
    active: Option<Candidate>,
    attempts: Vec<Attempt>,
}

/// The candidate recipe a frame is currently trying.
struct Candidate {
    name: String,
    recipe: Box<dyn Recipe>,
    ingredients: Vec<String>,
    next_ingredient: usize,
    /// Products this candidate (and its sub-resolutions) made available.
    added: Vec<String>,
    steps: Vec<PlanStep>,
}

enum Outcome {
    Resolved {
        steps: Vec<PlanStep>,
        added: Vec<String>,
    },
    Failed(PlanError),
}

enum Action {
    Descend(String),
    Finish(Outcome),
}

impl Frame {
    fn absorb(&mut self, outcome: Outcome, available: &mut HashSet<String>) {
        match outcome {
            Outcome::Resolved { steps, added } => {
                if let Some(cand) = self.active.as_mut() {
                    cand.steps.extend(steps);
                    cand.added.extend(added);
                }
            }
            Outcome::Failed(cause) => self.reject(cause, available),
        }
    }

    /// Abandon the active candidate because one of its ingredients failed,
    /// withdrawing everything it made available.
    fn reject(&mut self, cause: PlanError, available: &mut HashSet<String>) {
        if let Some(cand) = self.active.take() {
            for product in &cand.added {
                available.remove(product);
            }
            debug!(
                product = %self.product,
                candidate = %cand.name,
                ingredient = cause.variable(),
                "abandoning candidate"
            );
            self.attempts.push(Attempt {
                candidate: cand.name,
                failure: AttemptFailure::Ingredient {
                    ingredient: cause.variable().to_string(),
                    cause: Box::new(cause),
                },
            });
        }
    }

    /// Failure reported once every candidate is exhausted.
    fn failure(&mut self) -> PlanError {
        let attempts = std::mem::take(&mut self.attempts);
        let chains: Vec<&Vec<String>> = attempts
            .iter()
            .filter_map(|a| match &a.failure {
                AttemptFailure::Ingredient { cause, .. } => match cause.as_ref() {
                    PlanError::Cycle { chain, .. } => Some(chain),
                    PlanError::Unresolvable { .. } => None,
                },
                AttemptFailure::Instantiation(_) => None,
            })
            .collect();
        // Only a pure cycle when every candidate ran into one.
        if !chains.is_empty() && chains.len() == attempts.len() {
            let chain = chains[0].clone();
            return PlanError::Cycle {
                variable: self.product.clone(),
                chain,
            };
        }
        PlanError::Unresolvable {
            variable: self.product.clone(),
            attempts,
        }
    }
}

impl<'a> Resolver<'a> {
    pub fn new<I, S>(registry: &'a Registry, cookbook: &'a Cookbook, available: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            registry,
            cookbook,
            available: available.into_iter().map(Into::into).collect(),
            failed: HashMap::new(),
        }
    }

    pub fn is_available(&self, variable: &str) -> bool {
        self.available.contains(variable)
    }

    /// Variables available so far, including products planned in this session.
    pub fn available(&self) -> &HashSet<String> {
        &self.available
    }

    /// Resolve one product. Returns the steps to append to the session's plan
    /// (empty if the product is already available).
    pub fn resolve(&mut self, target: &str) -> Result<Vec<PlanStep>, PlanError> {
        if self.available.contains(target) {
            trace!(variable = target, "already available");
            return Ok(Vec::new());
        }

        let root = self.open(target)?;
        let mut stack = vec![root];
        let mut path = vec![target.to_string()];
        let mut on_path: HashSet<String> = HashSet::from([target.to_string()]);
        let mut pending: Option<Outcome> = None;

        while let Some(frame) = stack.last_mut() {
            if let Some(outcome) = pending.take() {
                frame.absorb(outcome, &mut self.available);
            }

            match self.advance(frame, &path, &on_path) {
                Action::Descend(ingredient) => {
                    match self.open(&ingredient) {
                        Ok(child) => {
                            trace!(variable = %ingredient, depth = path.len(), "descending");
                            on_path.insert(ingredient.clone());
                            path.push(ingredient);
                            stack.push(child);
                        }
                        Err(cause) => pending = Some(Outcome::Failed(cause)),
                    }
                }
                Action::Finish(outcome) => {
                    stack.pop();
                    if let Some(done) = path.pop() {
                        on_path.remove(&done);
                    }
                    if let Outcome::Failed(ref err) = outcome {
                        if !err.involves_cycle() {
                            self.failed.insert(err.variable().to_string(), err.clone());
                        }
                    }
                    if stack.is_empty() {
                        return match outcome {
                            Outcome::Resolved { steps, .. } => Ok(steps),
                            Outcome::Failed(err) => Err(err),
                        };
                    }
                    pending = Some(outcome);
                }
            }
        }

        // The root frame always finishes through `Action::Finish` above.
        Err(PlanError::Unresolvable {
            variable: target.to_string(),
            attempts: Vec::new(),
        })
    }

    /// Resolve several products into one shared plan. Later requests reuse the
    /// products of earlier ones; repeated requests are resolved once.
    pub fn resolve_all<S: AsRef<str>>(mut self, targets: &[S]) -> Resolution {
        let mut resolution = Resolution::default();
        for target in targets {
            let target = target.as_ref();
            if resolution.resolved.iter().any(|r| r == target)
                || resolution.failures.contains_key(target)
            {
                continue;
            }
            match self.resolve(target) {
                Ok(steps) => {
                    debug!(variable = target, steps = steps.len(), "resolved");
                    resolution.plan.extend(steps);
                    resolution.resolved.push(target.to_string());
                }
                Err(err) => {
                    warn!(variable = target, error = %err, "unresolved");
                    resolution.failures.insert(target.to_string(), err);
                }
            }
        }
        resolution
    }

    /// Start resolving `product`, or fail straight away if it has
    /// no recipe or already failed in this session.
    fn open(&mut self, product: &str) -> Result<Frame, PlanError> {
        if let Some(err) = self.failed.get(product) {
            trace!(variable = product, "memoised failure");
            return Err(err.clone());
        }
        let candidates = self.cookbook.candidates_for(product);
        if candidates.is_empty() {
            let err = PlanError::Unresolvable {
                variable: product.to_string(),
                attempts: Vec::new(),
            };
            self.failed.insert(product.to_string(), err.clone());
            return Err(err);
        }
        Ok(Frame {
            product: product.to_string(),
            candidates: candidates.to_vec(),
            next_candidate: 0,
            active: None,
            attempts: Vec::new(),
        })
    }

    fn instantiate(&self, name: &str, product: &str) -> Result<Box<dyn Recipe>, String> {
        let recipe = self
            .registry
            .create(name, &self.cookbook.params_for(name))
            .map_err(|e| e.to_string())?;
        if recipe.product() != product {
            return Err(format!(
                "recipe produces '{}', not '{}'",
                recipe.product(),
                product
            ));
        }
        Ok(recipe)
    }

    /// Move the frame forward until it needs a child resolved or is done.
    fn advance(&mut self, frame: &mut Frame, path: &[String], on_path: &HashSet<String>) -> Action {
        loop {
            if frame.active.is_none() {
                let Some(name) = frame.candidates.get(frame.next_candidate).cloned() else {
                    return Action::Finish(Outcome::Failed(frame.failure()));
                };
                frame.next_candidate += 1;
                match self.instantiate(&name, &frame.product) {
                    Ok(recipe) => {
                        trace!(product = %frame.product, candidate = %name, "trying candidate");
                        frame.active = Some(Candidate {
                            ingredients: recipe.ingredients().to_vec(),
                            name,
                            recipe,
                            next_ingredient: 0,
                            added: Vec::new(),
                            steps: Vec::new(),
                        });
                    }
                    Err(message) => {
                        debug!(product = %frame.product, candidate = %name, %message, "candidate not built");
                        frame.attempts.push(Attempt {
                            candidate: name,
                            failure: AttemptFailure::Instantiation(message),
                        });
                        continue;
                    }
                }
            }

            let missing = match frame.active.as_mut() {
                Some(cand) => {
                    while cand
                        .ingredients
                        .get(cand.next_ingredient)
                        .is_some_and(|i| self.available.contains(i))
                    {
                        cand.next_ingredient += 1;
                    }
                    cand.ingredients.get(cand.next_ingredient).cloned()
                }
                None => continue,
            };

            match missing {
                None => {
                    let Some(cand) = frame.active.take() else {
                        continue;
                    };
                    let Candidate {
                        name,
                        recipe,
                        mut added,
                        mut steps,
                        ..
                    } = cand;
                    debug!(product = %frame.product, candidate = %name, "candidate satisfied");
                    self.available.insert(recipe.product().to_string());
                    added.push(recipe.product().to_string());
                    steps.push(PlanStep::new(recipe));
                    return Action::Finish(Outcome::Resolved { steps, added });
                }
                Some(ingredient) if on_path.contains(&ingredient) => {
                    let start = path.iter().position(|p| *p == ingredient).unwrap_or(0);
                    let mut chain = path[start..].to_vec();
                    chain.push(ingredient.clone());
                    debug!(variable = %ingredient, chain = %chain.join(" -> "), "cycle");
                    frame.reject(
                        PlanError::Cycle {
                            variable: ingredient,
                            chain,
                        },
                        &mut self.available,
                    );
                }
                Some(ingredient) => return Action::Descend(ingredient),
            }
        }
    }
}

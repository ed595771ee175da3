//! CK-004: Recipe registry mapping names to constructors.
//!
//! A registry is filled before any engine is built and only read afterwards.
//! Engines hold it behind an `Arc`, so several sessions can look recipes up
//! concurrently without locking.

use super::error::EngineError;
use super::recipe::{Recipe, RecipeParams};
use super::types::RecipeDescriptor;
use std::collections::BTreeMap;

/// Builds a configured recipe from its parameter block.
pub type RecipeMaker =
    Box<dyn Fn(&RecipeParams) -> Result<Box<dyn Recipe>, String> + Send + Sync>;

/// Catalogue of recipe constructors keyed by recipe name.
#[derive(Default)]
pub struct Registry {
    makers: BTreeMap<String, RecipeMaker>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("recipes", &self.makers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every recipe shipped with the crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        crate::recipes::register_builtin(&mut registry);
        registry
    }

    /// Associate `name` with a constructor. Names are unique.
    pub fn register<F>(&mut self, name: &str, maker: F) -> Result<(), EngineError>
    where
        F: Fn(&RecipeParams) -> Result<Box<dyn Recipe>, String> + Send + Sync + 'static,
    {
        if self.makers.contains_key(name) {
            return Err(EngineError::DuplicateRecipe {
                name: name.to_string(),
            });
        }
        self.makers.insert(name.to_string(), Box::new(maker));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.makers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.makers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.makers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.makers.is_empty()
    }

    /// Build a configured instance of `name`.
    ///
    /// Fails if the name is unknown, the constructor rejects the parameters,
    /// or the instance lists its own product among its ingredients.
    pub fn create(&self, name: &str, params: &RecipeParams) -> Result<Box<dyn Recipe>, EngineError> {
        let maker = self
            .makers
            .get(name)
            .ok_or_else(|| EngineError::UnknownRecipe {
                name: name.to_string(),
            })?;
        let recipe = maker(params).map_err(|message| EngineError::InvalidRecipeConfig {
            recipe: name.to_string(),
            message,
        })?;
        if recipe.ingredients().iter().any(|i| i == recipe.product()) {
            return Err(EngineError::InvalidRecipeConfig {
                recipe: name.to_string(),
                message: format!("product '{}' is listed as its own ingredient", recipe.product()),
            });
        }
        Ok(recipe)
    }

    /// Descriptor of `name` built with default parameters.
    pub fn describe(&self, name: &str) -> Result<RecipeDescriptor, EngineError> {
        Ok(self.create(name, &RecipeParams::new(name))?.descriptor())
    }
}

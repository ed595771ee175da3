//! CK-003: The recipe plugin contract and recipe parameter blocks.
//!
//! A recipe turns a fixed list of ingredient variables into one product
//! variable. Every recipe runs forward (NL); linearised recipes also provide
//! tangent-linear and adjoint entry points and advertise them through
//! [`Recipe::capabilities`].

use super::fieldset::{FieldSet, FunctionSpace};
use super::types::{Capabilities, RecipeDescriptor};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A configured transformation unit.
pub trait Recipe: Send {
    fn name(&self) -> &str;

    fn product(&self) -> &str;

    fn ingredients(&self) -> &[String];

    /// Entry points this instance supports. Defaults to forward only.
    fn capabilities(&self) -> Capabilities {
        if self.requires_setup() {
            Capabilities::NL_ONLY.with_setup()
        } else {
            Capabilities::NL_ONLY
        }
    }

    fn requires_setup(&self) -> bool {
        false
    }

    /// One-time setup, run before the first execution in a session.
    fn setup(&mut self, _fields: &FieldSet) -> Result<(), String> {
        Ok(())
    }

    /// Number of levels of the product. Defaults to the first ingredient's.
    fn product_levels(&self, fields: &FieldSet) -> Result<usize, String> {
        let first = self
            .ingredients()
            .first()
            .ok_or_else(|| format!("recipe '{}' has no ingredient to size from", self.name()))?;
        fields.levels(first)
    }

    /// Function space of the product. Defaults to the first ingredient's.
    fn product_function_space(&self, fields: &FieldSet) -> Result<FunctionSpace, String> {
        let first = self
            .ingredients()
            .first()
            .ok_or_else(|| format!("recipe '{}' has no ingredient to size from", self.name()))?;
        fields.function_space(first).cloned()
    }

    /// Forward transform. The product field already exists when called.
    fn execute_nl(&mut self, fields: &mut FieldSet) -> Result<(), String>;

    /// Tangent linear: propagate ingredient increments into the product increment.
    fn execute_tl(&mut self, _increments: &mut FieldSet, _reference: &FieldSet) -> Result<(), String> {
        Err(format!("recipe '{}' has no tangent linear", self.name()))
    }

    /// Adjoint: accumulate the product sensitivity into the ingredient
    /// sensitivities, then zero the product sensitivity.
    fn execute_ad(&mut self, _sensitivities: &mut FieldSet, _reference: &FieldSet) -> Result<(), String> {
        Err(format!("recipe '{}' has no adjoint", self.name()))
    }

    fn descriptor(&self) -> RecipeDescriptor {
        RecipeDescriptor {
            name: self.name().to_string(),
            product: self.product().to_string(),
            ingredients: self.ingredients().to_vec(),
            capabilities: self.capabilities(),
        }
    }
}

impl std::fmt::Debug for dyn Recipe + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recipe")
            .field("name", &self.name())
            .field("product", &self.product())
            .finish()
    }
}

/// Caller-supplied parameter block for one recipe.
///
/// In configuration the block is keyed by `recipe name`; every other key is a
/// recipe-specific parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipeParams {
    #[serde(rename = "recipe name")]
    pub recipe_name: String,

    #[serde(flatten)]
    pub values: IndexMap<String, serde_yaml_ng::Value>,
}

impl RecipeParams {
    pub fn new(recipe_name: impl Into<String>) -> Self {
        Self {
            recipe_name: recipe_name.into(),
            values: IndexMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<serde_yaml_ng::Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_yaml_ng::Value> {
        self.values.get(key)
    }

    /// Numeric parameter with a default when absent.
    pub fn f64_or(&self, key: &str, default: f64) -> Result<f64, String> {
        match self.values.get(key) {
            None => Ok(default),
            Some(v) => v
                .as_f64()
                .ok_or_else(|| format!("parameter '{}' must be a number", key)),
        }
    }

    /// Boolean parameter with a default when absent.
    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, String> {
        match self.values.get(key) {
            None => Ok(default),
            Some(v) => v
                .as_bool()
                .ok_or_else(|| format!("parameter '{}' must be a boolean", key)),
        }
    }

    /// Reject keys outside `allowed`.
    pub fn expect_keys(&self, allowed: &[&str]) -> Result<(), String> {
        for key in self.values.keys() {
            if !allowed.contains(&key.as_str()) {
                return Err(format!(
                    "unknown parameter '{}' (allowed: {})",
                    key,
                    if allowed.is_empty() {
                        "none".to_string()
                    } else {
                        allowed.join(", ")
                    }
                ));
            }
        }
        Ok(())
    }
}

//! CK-006: Cookbook configuration and candidate lookup.
//!
//! The cookbook maps a product variable to an ordered list of candidate recipe
//! names. Earlier candidates are preferred; later ones are fallbacks.
//!
//! Each product may appear only once. A second entry for the same product is
//! rejected rather than silently overriding the first, both when parsing YAML
//! and when inserting entries programmatically.

use super::error::EngineError;
use super::recipe::RecipeParams;
use super::registry::Registry;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// Default cookbook written by `cocina init`.
pub const DEFAULT_COOKBOOK_YAML: &str = r#"# cocina cookbook: product -> candidate recipes, in priority order
cookbook:
  potential_temperature: [TempToPTemp]
  virtual_temperature: [TempToVTemp]
  air_temperature: [AirTemperature_A]

# Optional per-recipe parameter overrides
recipe parameters: []
"#;

/// Cookbook configuration as read from YAML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CookbookConfig {
    /// Product -> candidate recipe names (order-preserving, unique products)
    #[serde(default, deserialize_with = "unique_entries")]
    pub cookbook: IndexMap<String, Vec<String>>,

    /// Per-recipe parameter overrides
    #[serde(rename = "recipe parameters", default)]
    pub recipe_params: Vec<RecipeParams>,
}

fn unique_entries<'de, D>(deserializer: D) -> Result<IndexMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    struct EntriesVisitor;

    impl<'de> serde::de::Visitor<'de> for EntriesVisitor {
        type Value = IndexMap<String, Vec<String>>;

        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("a mapping from product name to a list of recipe names")
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(IndexMap::new())
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: serde::de::MapAccess<'de>,
        {
            let mut entries = IndexMap::new();
            while let Some((product, candidates)) = map.next_entry::<String, Vec<String>>()? {
                if entries.contains_key(&product) {
                    return Err(serde::de::Error::custom(format!(
                        "duplicate cookbook entry for product '{}'",
                        product
                    )));
                }
                entries.insert(product, candidates);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_any(EntriesVisitor)
}

/// Parse a cookbook file from disk.
pub fn parse_config_file(path: &Path) -> Result<CookbookConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_config(&content)
}

/// Parse a cookbook from a YAML string.
pub fn parse_config(yaml: &str) -> Result<CookbookConfig, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// The cookbook used when the caller supplies none.
pub fn default_config() -> CookbookConfig {
    let mut cookbook = IndexMap::new();
    cookbook.insert("potential_temperature".to_string(), vec!["TempToPTemp".to_string()]);
    cookbook.insert("virtual_temperature".to_string(), vec!["TempToVTemp".to_string()]);
    cookbook.insert("air_temperature".to_string(), vec!["AirTemperature_A".to_string()]);
    CookbookConfig {
        cookbook,
        recipe_params: Vec::new(),
    }
}

/// Validate a config against a registry. Returns every problem found
/// (empty = valid).
///
/// Each candidate is built once with its parameter block, so constructor
/// rejections and product mismatches surface here rather than mid-plan.
pub fn validate_config(config: &CookbookConfig, registry: &Registry) -> Vec<EngineError> {
    let mut errors = Vec::new();

    let mut seen_params: Vec<&str> = Vec::new();
    for params in &config.recipe_params {
        if seen_params.contains(&params.recipe_name.as_str()) {
            errors.push(EngineError::Config(format!(
                "duplicate parameter block for recipe '{}'",
                params.recipe_name
            )));
            continue;
        }
        seen_params.push(&params.recipe_name);
        // Candidates are built with their block below; build the rest here.
        let is_candidate = config
            .cookbook
            .values()
            .any(|candidates| candidates.contains(&params.recipe_name));
        if !is_candidate {
            if let Err(e) = registry.create(&params.recipe_name, params) {
                errors.push(e);
            }
        }
    }

    for (product, candidates) in &config.cookbook {
        if product.trim().is_empty() {
            errors.push(EngineError::Config("cookbook entry with empty product name".to_string()));
        }
        if candidates.is_empty() {
            errors.push(EngineError::Config(format!(
                "cookbook entry '{}' has no candidate recipes",
                product
            )));
        }
        for (i, name) in candidates.iter().enumerate() {
            if candidates[..i].contains(name) {
                errors.push(EngineError::Config(format!(
                    "cookbook entry '{}' lists recipe '{}' twice",
                    product, name
                )));
                continue;
            }
            let params = params_in(config, name);
            match registry.create(name, &params) {
                Ok(recipe) if recipe.product() != product => {
                    errors.push(EngineError::Config(format!(
                        "recipe '{}' produces '{}', not '{}'",
                        name,
                        recipe.product(),
                        product
                    )));
                }
                Ok(_) => {}
                Err(e) => errors.push(e),
            }
        }
    }

    errors
}

fn params_in(config: &CookbookConfig, recipe: &str) -> RecipeParams {
    config
        .recipe_params
        .iter()
        .find(|p| p.recipe_name == recipe)
        .cloned()
        .unwrap_or_else(|| RecipeParams::new(recipe))
}

/// Immutable product -> candidates lookup with parameter overrides.
#[derive(Debug, Clone, Default)]
pub struct Cookbook {
    entries: IndexMap<String, Vec<String>>,
    params: IndexMap<String, RecipeParams>,
}

impl Cookbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a parsed config. Structural problems (empty candidate lists,
    /// duplicate parameter blocks) are rejected; registry checks live in
    /// [`validate_config`].
    pub fn from_config(config: &CookbookConfig) -> Result<Self, EngineError> {
        let mut book = Self::new();
        for (product, candidates) in &config.cookbook {
            book.insert(product, candidates.clone())?;
        }
        for params in &config.recipe_params {
            if book.params.contains_key(&params.recipe_name) {
                return Err(EngineError::Config(format!(
                    "duplicate parameter block for recipe '{}'",
                    params.recipe_name
                )));
            }
            book.params.insert(params.recipe_name.clone(), params.clone());
        }
        Ok(book)
    }

    /// Add an entry. Rejects duplicates and empty candidate lists.
    pub fn insert(&mut self, product: &str, candidates: Vec<String>) -> Result<(), EngineError> {
        if candidates.is_empty() {
            return Err(EngineError::Config(format!(
                "cookbook entry '{}' has no candidate recipes",
                product
            )));
        }
        if self.entries.contains_key(product) {
            return Err(EngineError::Config(format!(
                "duplicate cookbook entry for product '{}'",
                product
            )));
        }
        self.entries.insert(product.to_string(), candidates);
        Ok(())
    }

    /// Candidates for `product` in priority order; empty when the product has
    /// no recipe and must already be available.
    pub fn candidates_for(&self, product: &str) -> &[String] {
        self.entries.get(product).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Parameter block for `recipe`, or an empty one.
    pub fn params_for(&self, recipe: &str) -> RecipeParams {
        self.params
            .get(recipe)
            .cloned()
            .unwrap_or_else(|| RecipeParams::new(recipe))
    }

    pub fn products(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

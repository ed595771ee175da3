//! Test doubles shared by the core unit tests.

use super::fieldset::FieldSet;
use super::recipe::{Recipe, RecipeParams};
use super::registry::Registry;
use super::types::Capabilities;
use std::sync::{Arc, Mutex};

/// Shared record of `"<mode>:<recipe>"` calls.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Linear stub: `product = scale * sum(ingredients)` in every mode.
pub struct StubRecipe {
    name: String,
    product: String,
    ingredients: Vec<String>,
    scale: f64,
    caps: Capabilities,
    log: Option<CallLog>,
    fail_on: Option<&'static str>,
}

impl StubRecipe {
    pub fn new(name: &str, product: &str, ingredients: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            product: product.to_string(),
            ingredients: ingredients.iter().map(|s| s.to_string()).collect(),
            scale: 1.0,
            caps: Capabilities::LINEARISED,
            log: None,
            fail_on: None,
        }
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn caps(mut self, caps: Capabilities) -> Self {
        self.caps = caps;
        self
    }

    pub fn log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Fail the entry point whose mode label ("NL", "TL", "AD", "setup") matches.
    pub fn fail_on(mut self, label: &'static str) -> Self {
        self.fail_on = Some(label);
        self
    }

    fn record(&self, label: &str) -> Result<(), String> {
        if let Some(log) = &self.log {
            if let Ok(mut calls) = log.lock() {
                calls.push(format!("{}:{}", label, self.name));
            }
        }
        if self.fail_on == Some(label) {
            return Err(format!("{} forced failure in {}", label, self.name));
        }
        Ok(())
    }

    fn forward(&self, fields: &mut FieldSet) -> Result<(), String> {
        let ingredients = self.ingredients.clone();
        let scale = self.scale;
        fields.with_values_mut(&self.product, |out, rest| {
            for v in out.iter_mut() {
                *v = 0.0;
            }
            for name in &ingredients {
                let x = rest.values(name)?;
                for (o, xi) in out.iter_mut().zip(x) {
                    *o += scale * xi;
                }
            }
            Ok(())
        })?
    }
}

impl Recipe for StubRecipe {
    fn name(&self) -> &str {
        &self.name
    }

    fn product(&self) -> &str {
        &self.product
    }

    fn ingredients(&self) -> &[String] {
        &self.ingredients
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
    }

    fn requires_setup(&self) -> bool {
        self.caps.has_setup
    }

    fn setup(&mut self, _fields: &FieldSet) -> Result<(), String> {
        self.record("setup")
    }

    fn product_levels(&self, fields: &FieldSet) -> Result<usize, String> {
        match self.ingredients.first() {
            Some(first) => fields.levels(first),
            None => Ok(1),
        }
    }

    fn product_function_space(
        &self,
        fields: &FieldSet,
    ) -> Result<crate::core::fieldset::FunctionSpace, String> {
        match self.ingredients.first() {
            Some(first) => fields.function_space(first).cloned(),
            None => Ok(crate::core::fieldset::FunctionSpace::new("nodes", 1)),
        }
    }

    fn execute_nl(&mut self, fields: &mut FieldSet) -> Result<(), String> {
        self.record("NL")?;
        self.forward(fields)
    }

    fn execute_tl(&mut self, increments: &mut FieldSet, _reference: &FieldSet) -> Result<(), String> {
        self.record("TL")?;
        self.forward(increments)
    }

    fn execute_ad(&mut self, sensitivities: &mut FieldSet, _reference: &FieldSet) -> Result<(), String> {
        self.record("AD")?;
        let dy = sensitivities.values(&self.product)?.to_vec();
        for name in &self.ingredients {
            let dx = sensitivities.values_mut(name)?;
            for (d, y) in dx.iter_mut().zip(&dy) {
                *d += self.scale * y;
            }
        }
        for v in sensitivities.values_mut(&self.product)? {
            *v = 0.0;
        }
        Ok(())
    }
}

/// Constructor for a plain stub named after its parameter block.
pub fn stub_maker(
    product: &str,
    ingredients: &[&str],
) -> impl Fn(&RecipeParams) -> Result<Box<dyn Recipe>, String> + Send + Sync + 'static {
    let product = product.to_string();
    let ingredients: Vec<String> = ingredients.iter().map(|s| s.to_string()).collect();
    move |params: &RecipeParams| {
        let refs: Vec<&str> = ingredients.iter().map(String::as_str).collect();
        Ok(Box::new(StubRecipe::new(&params.recipe_name, &product, &refs)) as Box<dyn Recipe>)
    }
}

/// Registry of stubs from `(name, product, ingredients)` rows, plus a
/// per-name instantiation counter.
pub fn stub_registry(rows: &[(&str, &str, &[&str])]) -> (Registry, Arc<Mutex<Vec<String>>>) {
    let created: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let mut registry = Registry::new();
    for (name, product, ingredients) in rows {
        let inner = stub_maker(product, ingredients);
        let created = Arc::clone(&created);
        registry
            .register(name, move |params: &RecipeParams| {
                if let Ok(mut c) = created.lock() {
                    c.push(params.recipe_name.clone());
                }
                inner(params)
            })
            .expect("unique stub names");
    }
    (registry, created)
}

/// How many times `name` appears in an instantiation log.
pub fn count(created: &Arc<Mutex<Vec<String>>>, name: &str) -> usize {
    created
        .lock()
        .map(|c| c.iter().filter(|n| n.as_str() == name).count())
        .unwrap_or(0)
}

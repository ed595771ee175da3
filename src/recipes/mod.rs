//! Built-in recipe catalogue.
//!
//! Each recipe is a leaf kernel over point-major field values. The engine
//! never looks inside them; they only have to honour the [`Recipe`] contract.

pub mod moisture;
pub mod pressure;
pub mod temperature;

use crate::core::fieldset::FieldSet;
use crate::core::recipe::{Recipe, RecipeParams};
use crate::core::registry::Registry;
use tracing::warn;

/// A recipe shipped with the crate, buildable from a parameter block.
pub trait Builtin: Recipe + Sized + 'static {
    const NAME: &'static str;
    const PRODUCT: &'static str;

    fn from_params(params: &RecipeParams) -> Result<Self, String>;
}

fn build<R: Builtin>(params: &RecipeParams) -> Result<Box<dyn Recipe>, String> {
    Ok(Box::new(R::from_params(params)?))
}

type MakeFn = fn(&RecipeParams) -> Result<Box<dyn Recipe>, String>;

/// Name and constructor of every built-in recipe.
pub fn catalogue() -> Vec<(&'static str, MakeFn)> {
    vec![
        (pressure::AirPressureToKappa::NAME, build::<pressure::AirPressureToKappa> as MakeFn),
        (pressure::PressureToDelP::NAME, build::<pressure::PressureToDelP> as MakeFn),
        (temperature::AirTemperature::NAME, build::<temperature::AirTemperature> as MakeFn),
        (temperature::TempToPTemp::NAME, build::<temperature::TempToPTemp> as MakeFn),
        (temperature::TempToVTemp::NAME, build::<temperature::TempToVTemp> as MakeFn),
        (moisture::TotalMassMoistAir::NAME, build::<moisture::TotalMassMoistAir> as MakeFn),
        (moisture::SpecificHumidity::NAME, build::<moisture::SpecificHumidity> as MakeFn),
        (moisture::RelativeHumidity::NAME, build::<moisture::RelativeHumidity> as MakeFn),
    ]
}

/// Add the catalogue to `registry`. Names already taken keep their existing
/// constructor.
pub fn register_builtin(registry: &mut Registry) {
    for (name, make) in catalogue() {
        if let Err(err) = registry.register(name, make) {
            warn!(recipe = name, error = %err, "built-in recipe not registered");
        }
    }
}

pub(crate) fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Parameter that must be a positive number.
pub(crate) fn positive(params: &RecipeParams, key: &str, default: f64) -> Result<f64, String> {
    let value = params.f64_or(key, default)?;
    if !value.is_finite() || value <= 0.0 {
        return Err(format!("parameter '{}' must be positive, got {}", key, value));
    }
    Ok(value)
}

/// Write `f(inputs at i)` into every value of `product`. All inputs must have
/// the product's shape.
pub(crate) fn pointwise<F>(
    fields: &mut FieldSet,
    product: &str,
    inputs: &[&str],
    f: F,
) -> Result<(), String>
where
    F: Fn(&[f64]) -> Result<f64, String>,
{
    fields.with_values_mut(product, |out, rest| {
        let columns = inputs
            .iter()
            .map(|name| rest.values(name))
            .collect::<Result<Vec<_>, _>>()?;
        for (name, column) in inputs.iter().zip(&columns) {
            if column.len() != out.len() {
                return Err(format!(
                    "shape mismatch: '{}' has {} values, '{}' has {}",
                    name,
                    column.len(),
                    product,
                    out.len()
                ));
            }
        }
        let mut args = vec![0.0; columns.len()];
        for (i, o) in out.iter_mut().enumerate() {
            for (a, column) in args.iter_mut().zip(&columns) {
                *a = column[i];
            }
            *o = f(&args)?;
        }
        Ok(())
    })?
}

/// Fail unless every named column has `len` values.
pub(crate) fn check_lengths(len: usize, columns: &[(&str, &[f64])]) -> Result<(), String> {
    for (name, column) in columns {
        if column.len() != len {
            return Err(format!(
                "shape mismatch: '{}' has {} values, expected {}",
                name,
                column.len(),
                len
            ));
        }
    }
    Ok(())
}

/// `ingredient += weight(i) * product_sensitivity[i]` over every value.
pub(crate) fn accumulate<F>(
    sensitivities: &mut FieldSet,
    ingredient: &str,
    product_sens: &[f64],
    weight: F,
) -> Result<(), String>
where
    F: Fn(usize) -> f64,
{
    let dx = sensitivities.values_mut(ingredient)?;
    if dx.len() != product_sens.len() {
        return Err(format!(
            "shape mismatch: sensitivity of '{}' has {} values, expected {}",
            ingredient,
            dx.len(),
            product_sens.len()
        ));
    }
    for (i, (d, y)) in dx.iter_mut().zip(product_sens).enumerate() {
        *d += weight(i) * y;
    }
    Ok(())
}

/// Take the product sensitivity out of the set, leaving zeros behind.
///
/// The reference columns and the ingredient sensitivities must all match the
/// product sensitivity's length; on mismatch nothing is modified.
pub(crate) fn consume(
    sensitivities: &mut FieldSet,
    product: &str,
    reference: &[(&str, &[f64])],
    ingredients: &[&str],
) -> Result<Vec<f64>, String> {
    let len = sensitivities.values(product)?.len();
    check_lengths(len, reference)?;
    for name in ingredients {
        check_lengths(len, &[(*name, sensitivities.values(name)?)])?;
    }
    let dy = sensitivities.values_mut(product)?;
    let taken = dy.to_vec();
    dy.iter_mut().for_each(|v| *v = 0.0);
    Ok(taken)
}


/// Finite-difference and dot-product checks shared by the linearised recipes.
#[cfg(test)]
pub(crate) mod linear_checks {
    use crate::core::fieldset::FieldSet;
    use crate::core::recipe::Recipe;

    fn dot(a: &FieldSet, b: &FieldSet, names: &[String]) -> f64 {
        names
            .iter()
            .map(|n| {
                a.values(n)
                    .unwrap()
                    .iter()
                    .zip(b.values(n).unwrap())
                    .map(|(x, y)| x * y)
                    .sum::<f64>()
            })
            .sum()
    }

    /// `<TL dx, dy> == <dx, AD dy>` for the given increments.
    pub fn assert_adjoint(
        recipe: &mut dyn Recipe,
        reference: &FieldSet,
        dx: &FieldSet,
        dy: &FieldSet,
    ) {
        let product = vec![recipe.product().to_string()];
        let ingredients = recipe.ingredients().to_vec();

        let mut tl = dx.clone();
        let levels = recipe.product_levels(reference).unwrap();
        let space = recipe.product_function_space(reference).unwrap();
        tl.create(&product[0], levels, space);
        recipe.execute_tl(&mut tl, reference).unwrap();
        let lhs = dot(&tl, dy, &product);

        let mut ad = dy.clone();
        for name in &ingredients {
            let field = reference.get(name).unwrap();
            ad.create(name, field.levels, field.function_space.clone());
        }
        recipe.execute_ad(&mut ad, reference).unwrap();
        let rhs = dot(dx, &ad, &ingredients);

        assert!(
            (lhs - rhs).abs() <= 1e-10 * lhs.abs().max(1.0),
            "adjoint test failed: {lhs} vs {rhs}"
        );
        assert!(ad.values(&product[0]).unwrap().iter().all(|v| *v == 0.0));
    }

    /// TL matches a centred finite difference of NL along `dx`.
    pub fn assert_tangent(recipe: &mut dyn Recipe, reference: &FieldSet, dx: &FieldSet) {
        let product = recipe.product().to_string();
        let levels = recipe.product_levels(reference).unwrap();
        let space = recipe.product_function_space(reference).unwrap();
        let eps = 1e-6;
        let perturbed = |sign: f64, recipe: &mut dyn Recipe| {
            let mut state = reference.clone();
            state.create(&product, levels, space.clone());
            for name in recipe.ingredients().to_vec() {
                let d = dx.values(&name).unwrap().to_vec();
                for (v, di) in state.values_mut(&name).unwrap().iter_mut().zip(d) {
                    *v += sign * eps * di;
                }
            }
            recipe.execute_nl(&mut state).unwrap();
            state.values(&product).unwrap().to_vec()
        };
        let plus = perturbed(1.0, recipe);
        let minus = perturbed(-1.0, recipe);

        let mut tl = dx.clone();
        tl.create(&product, levels, space);
        recipe.execute_tl(&mut tl, reference).unwrap();

        for ((p, m), t) in plus.iter().zip(&minus).zip(tl.values(&product).unwrap()) {
            let fd = (p - m) / (2.0 * eps);
            assert!(
                (fd - t).abs() <= 1e-5 * fd.abs().max(1.0),
                "tangent mismatch: fd {fd} vs tl {t}"
            );
        }
    }
}

//! Pressure recipes.

use super::{consume, names, pointwise, positive, Builtin};
use crate::core::fieldset::{FieldSet, FunctionSpace};
use crate::core::recipe::{Recipe, RecipeParams};
use crate::core::types::Capabilities;

/// Default `R_d / c_p` for dry air.
pub const KAPPA: f64 = 0.285_714_285_714_285_7;

/// `air_pressure_to_kappa = air_pressure ^ kappa`. Forward only.
#[derive(Debug)]
pub struct AirPressureToKappa {
    ingredients: Vec<String>,
    kappa: f64,
}

impl AirPressureToKappa {
    pub fn kappa(&self) -> f64 {
        self.kappa
    }
}

impl Builtin for AirPressureToKappa {
    const NAME: &'static str = "AirPressureToKappa_A";
    const PRODUCT: &'static str = "air_pressure_to_kappa";

    fn from_params(params: &RecipeParams) -> Result<Self, String> {
        params.expect_keys(&["kappa"])?;
        Ok(Self {
            ingredients: names(&["air_pressure"]),
            kappa: positive(params, "kappa", KAPPA)?,
        })
    }
}

impl Recipe for AirPressureToKappa {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn product(&self) -> &str {
        Self::PRODUCT
    }

    fn ingredients(&self) -> &[String] {
        &self.ingredients
    }

    fn execute_nl(&mut self, fields: &mut FieldSet) -> Result<(), String> {
        let kappa = self.kappa;
        pointwise(fields, Self::PRODUCT, &["air_pressure"], |x| Ok(x[0].powf(kappa)))
    }
}

/// `air_pressure_thickness` from interface pressures: `dp[l] = p[l+1] - p[l]`.
/// The product has one level fewer than `air_pressure_levels`.
#[derive(Debug)]
pub struct PressureToDelP {
    ingredients: Vec<String>,
}

const LEVELS: &str = "air_pressure_levels";

impl Builtin for PressureToDelP {
    const NAME: &'static str = "PressureToDelP";
    const PRODUCT: &'static str = "air_pressure_thickness";

    fn from_params(params: &RecipeParams) -> Result<Self, String> {
        params.expect_keys(&[])?;
        Ok(Self {
            ingredients: names(&[LEVELS]),
        })
    }
}

/// `out[p, l] = x[p, l+1] - x[p, l]` for every point and layer.
fn differences(x: &[f64], interfaces: usize, out: &mut [f64]) -> Result<(), String> {
    let layers = interfaces - 1;
    if out.len() * interfaces != x.len() * layers {
        return Err(format!(
            "shape mismatch: {} interface values cannot give {} layer values",
            x.len(),
            out.len()
        ));
    }
    for (col_in, col_out) in x.chunks(interfaces).zip(out.chunks_mut(layers)) {
        for (l, o) in col_out.iter_mut().enumerate() {
            *o = col_in[l + 1] - col_in[l];
        }
    }
    Ok(())
}

fn interfaces(fields: &FieldSet) -> Result<usize, String> {
    let levels = fields.levels(LEVELS)?;
    if levels < 2 {
        return Err(format!("'{}' needs at least 2 levels, has {}", LEVELS, levels));
    }
    Ok(levels)
}

impl PressureToDelP {
    fn forward(&self, fields: &mut FieldSet) -> Result<(), String> {
        let n = interfaces(fields)?;
        fields.with_values_mut(Self::PRODUCT, |out, rest| {
            differences(rest.values(LEVELS)?, n, out)
        })?
    }
}

impl Recipe for PressureToDelP {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn product(&self) -> &str {
        Self::PRODUCT
    }

    fn ingredients(&self) -> &[String] {
        &self.ingredients
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::LINEARISED
    }

    fn product_levels(&self, fields: &FieldSet) -> Result<usize, String> {
        Ok(interfaces(fields)? - 1)
    }

    fn product_function_space(&self, fields: &FieldSet) -> Result<FunctionSpace, String> {
        fields.function_space(LEVELS).cloned()
    }

    fn execute_nl(&mut self, fields: &mut FieldSet) -> Result<(), String> {
        self.forward(fields)
    }

    fn execute_tl(&mut self, increments: &mut FieldSet, _reference: &FieldSet) -> Result<(), String> {
        self.forward(increments)
    }

    fn execute_ad(&mut self, sensitivities: &mut FieldSet, _reference: &FieldSet) -> Result<(), String> {
        let n = interfaces(sensitivities)?;
        let layers = n - 1;
        let (nx, ny) = (
            sensitivities.values(LEVELS)?.len(),
            sensitivities.values(Self::PRODUCT)?.len(),
        );
        if nx * layers != ny * n {
            return Err(format!(
                "shape mismatch: {} interface sensitivities for {} layer sensitivities",
                nx, ny
            ));
        }
        let dy = consume(sensitivities, Self::PRODUCT, &[], &[])?;
        let dx = sensitivities.values_mut(LEVELS)?;
        for (col_x, col_y) in dx.chunks_mut(n).zip(dy.chunks(layers)) {
            for (l, y) in col_y.iter().enumerate() {
                col_x[l + 1] += y;
                col_x[l] -= y;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipes::linear_checks::{assert_adjoint, assert_tangent};

    fn space() -> FunctionSpace {
        FunctionSpace::new("nodes", 2)
    }

    #[test]
    fn test_ck010_kappa_default_and_override() {
        let r = AirPressureToKappa::from_params(&RecipeParams::new("AirPressureToKappa_A")).unwrap();
        assert!((r.kappa() - 2.0 / 7.0).abs() < 1e-15);
        let p = RecipeParams::new("AirPressureToKappa_A").with("kappa", 0.3);
        assert_eq!(AirPressureToKappa::from_params(&p).unwrap().kappa(), 0.3);
    }

    #[test]
    fn test_ck010_kappa_rejects_bad_params() {
        let p = RecipeParams::new("AirPressureToKappa_A").with("kapa", 0.3);
        assert!(AirPressureToKappa::from_params(&p).unwrap_err().contains("unknown parameter"));
        let p = RecipeParams::new("AirPressureToKappa_A").with("kappa", 0.0);
        assert!(AirPressureToKappa::from_params(&p).is_err());
    }

    #[test]
    fn test_ck010_kappa_nl() {
        let p = RecipeParams::new("AirPressureToKappa_A").with("kappa", 0.5);
        let mut r = AirPressureToKappa::from_params(&p).unwrap();
        let mut fields = FieldSet::from_columns(
            &space(),
            &[("air_pressure", 1, vec![4.0, 9.0]), ("air_pressure_to_kappa", 1, vec![0.0; 2])],
        );
        r.execute_nl(&mut fields).unwrap();
        assert_eq!(fields.values("air_pressure_to_kappa").unwrap(), &[2.0, 3.0]);
        assert!(!r.capabilities().tl);
        assert!(r.execute_tl(&mut fields.clone(), &fields).is_err());
    }

    fn levels_field() -> FieldSet {
        // two points, three interfaces each
        FieldSet::from_columns(
            &space(),
            &[(LEVELS, 3, vec![100.0, 300.0, 600.0, 50.0, 60.0, 80.0])],
        )
    }

    #[test]
    fn test_ck010_delp_shape_and_values() {
        let mut r = PressureToDelP::from_params(&RecipeParams::new("PressureToDelP")).unwrap();
        let mut fields = levels_field();
        assert_eq!(r.product_levels(&fields).unwrap(), 2);
        fields.create("air_pressure_thickness", 2, space());
        r.execute_nl(&mut fields).unwrap();
        assert_eq!(
            fields.values("air_pressure_thickness").unwrap(),
            &[200.0, 300.0, 10.0, 20.0]
        );
    }

    #[test]
    fn test_ck010_delp_needs_two_levels() {
        let r = PressureToDelP::from_params(&RecipeParams::new("PressureToDelP")).unwrap();
        let fields = FieldSet::from_columns(&space(), &[(LEVELS, 1, vec![1.0, 2.0])]);
        assert!(r.product_levels(&fields).unwrap_err().contains("at least 2"));
    }

    #[test]
    fn test_ck010_delp_adjoint_shape_error_keeps_sensitivity() {
        let mut r = PressureToDelP::from_params(&RecipeParams::new("PressureToDelP")).unwrap();
        let mut sens = levels_field();
        sens.insert(
            "air_pressure_thickness",
            crate::core::fieldset::Field::zeros(FunctionSpace::new("nodes", 3), 2),
        );
        sens.values_mut("air_pressure_thickness").unwrap()[0] = 4.0;
        let reference = sens.clone();
        assert!(r.execute_ad(&mut sens, &reference).unwrap_err().contains("shape mismatch"));
        assert_eq!(sens.values("air_pressure_thickness").unwrap()[0], 4.0);
    }

    #[test]
    fn test_ck010_delp_linear() {
        let mut r = PressureToDelP::from_params(&RecipeParams::new("PressureToDelP")).unwrap();
        let reference = levels_field();
        let dx = FieldSet::from_columns(&space(), &[(LEVELS, 3, vec![1.0, -2.0, 0.5, 3.0, 0.0, 1.5])]);
        let dy = FieldSet::from_columns(
            &space(),
            &[("air_pressure_thickness", 2, vec![0.3, -1.0, 2.0, 0.7])],
        );
        assert_tangent(&mut r, &reference, &dx);
        assert_adjoint(&mut r, &reference, &dx, &dy);
    }
}

//! Temperature recipes.

use super::pressure::KAPPA;
use super::{accumulate, check_lengths, consume, names, pointwise, positive, Builtin};
use crate::core::fieldset::FieldSet;
use crate::core::recipe::{Recipe, RecipeParams};
use crate::core::types::Capabilities;

/// Reference pressure for potential temperature, Pa.
pub const P_ZERO: f64 = 100_000.0;
/// Gas constant of dry air, J kg-1 K-1.
pub const RD: f64 = 287.04;
/// Gas constant of water vapour, J kg-1 K-1.
pub const RV: f64 = 461.50;

const THETA: &str = "potential_temperature";
const EXNER: &str = "exner";
const TEMP: &str = "air_temperature";
const PSURF: &str = "surface_pressure";
const Q: &str = "specific_humidity";

// ---------------------------------------------------------------------------

/// `air_temperature = potential_temperature * exner`.
#[derive(Debug)]
pub struct AirTemperature {
    ingredients: Vec<String>,
}

impl Builtin for AirTemperature {
    const NAME: &'static str = "AirTemperature_A";
    const PRODUCT: &'static str = TEMP;

    fn from_params(params: &RecipeParams) -> Result<Self, String> {
        params.expect_keys(&[])?;
        Ok(Self {
            ingredients: names(&[THETA, EXNER]),
        })
    }
}

impl Recipe for AirTemperature {
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

    fn execute_nl(&mut self, fields: &mut FieldSet) -> Result<(), String> {
        pointwise(fields, TEMP, &[THETA, EXNER], |x| Ok(x[0] * x[1]))
    }

    fn execute_tl(&mut self, increments: &mut FieldSet, reference: &FieldSet) -> Result<(), String> {
        let theta = reference.values(THETA)?;
        let exner = reference.values(EXNER)?;
        increments.with_values_mut(TEMP, |dt, inc| {
            let (dtheta, dexner) = (inc.values(THETA)?, inc.values(EXNER)?);
            check_lengths(
                dt.len(),
                &[(THETA, theta), (EXNER, exner), (THETA, dtheta), (EXNER, dexner)],
            )?;
            for (i, out) in dt.iter_mut().enumerate() {
                *out = dtheta[i] * exner[i] + theta[i] * dexner[i];
            }
            Ok(())
        })?
    }

    fn execute_ad(&mut self, sensitivities: &mut FieldSet, reference: &FieldSet) -> Result<(), String> {
        let theta = reference.values(THETA)?;
        let exner = reference.values(EXNER)?;
        let dt = consume(sensitivities, TEMP, &[(THETA, theta), (EXNER, exner)], &[THETA, EXNER])?;
        accumulate(sensitivities, THETA, &dt, |i| exner[i])?;
        accumulate(sensitivities, EXNER, &dt, |i| theta[i])
    }
}

// ---------------------------------------------------------------------------

/// `potential_temperature = T * (p0 / ps) ^ kappa`, with the single-level
/// surface pressure applied to every level of its column. Forward only.
#[derive(Debug)]
pub struct TempToPTemp {
    ingredients: Vec<String>,
    kappa: f64,
    p0: f64,
}

impl Builtin for TempToPTemp {
    const NAME: &'static str = "TempToPTemp";
    const PRODUCT: &'static str = THETA;

    fn from_params(params: &RecipeParams) -> Result<Self, String> {
        params.expect_keys(&["kappa", "p0"])?;
        Ok(Self {
            ingredients: names(&[TEMP, PSURF]),
            kappa: positive(params, "kappa", KAPPA)?,
            p0: positive(params, "p0", P_ZERO)?,
        })
    }
}

impl Recipe for TempToPTemp {
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
        let (kappa, p0) = (self.kappa, self.p0);
        let levels = fields.levels(TEMP)?;
        fields.with_values_mut(THETA, |theta, rest| {
            let t = rest.values(TEMP)?;
            let ps = rest.values(PSURF)?;
            if t.len() != theta.len() || ps.len() * levels != t.len() {
                return Err(format!(
                    "shape mismatch: '{}' {} values, '{}' {} values, '{}' {} values",
                    TEMP,
                    t.len(),
                    PSURF,
                    ps.len(),
                    THETA,
                    theta.len()
                ));
            }
            for (point, &p) in ps.iter().enumerate() {
                if p <= 0.0 {
                    return Err(format!("non-positive {} {} at point {}", PSURF, p, point));
                }
                let factor = (p0 / p).powf(kappa);
                let col = point * levels..(point + 1) * levels;
                for (out, ti) in theta[col.clone()].iter_mut().zip(&t[col]) {
                    *out = ti * factor;
                }
            }
            Ok(())
        })?
    }
}

// ---------------------------------------------------------------------------

/// `virtual_temperature = T * (1 + (Rv/Rd - 1) q)`.
#[derive(Debug)]
pub struct TempToVTemp {
    ingredients: Vec<String>,
}

const VTEMP: &str = "virtual_temperature";

fn vapour_factor() -> f64 {
    RV / RD - 1.0
}

impl Builtin for TempToVTemp {
    const NAME: &'static str = "TempToVTemp";
    const PRODUCT: &'static str = VTEMP;

    fn from_params(params: &RecipeParams) -> Result<Self, String> {
        params.expect_keys(&[])?;
        Ok(Self {
            ingredients: names(&[TEMP, Q]),
        })
    }
}

impl Recipe for TempToVTemp {
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

    fn execute_nl(&mut self, fields: &mut FieldSet) -> Result<(), String> {
        let c = vapour_factor();
        pointwise(fields, VTEMP, &[TEMP, Q], |x| Ok(x[0] * (1.0 + c * x[1])))
    }

    fn execute_tl(&mut self, increments: &mut FieldSet, reference: &FieldSet) -> Result<(), String> {
        let c = vapour_factor();
        let t = reference.values(TEMP)?;
        let q = reference.values(Q)?;
        increments.with_values_mut(VTEMP, |dtv, inc| {
            let (dt, dq) = (inc.values(TEMP)?, inc.values(Q)?);
            check_lengths(dtv.len(), &[(TEMP, t), (Q, q), (TEMP, dt), (Q, dq)])?;
            for (i, out) in dtv.iter_mut().enumerate() {
                *out = dt[i] * (1.0 + c * q[i]) + t[i] * c * dq[i];
            }
            Ok(())
        })?
    }

    fn execute_ad(&mut self, sensitivities: &mut FieldSet, reference: &FieldSet) -> Result<(), String> {
        let c = vapour_factor();
        let t = reference.values(TEMP)?;
        let q = reference.values(Q)?;
        let dtv = consume(sensitivities, VTEMP, &[(TEMP, t), (Q, q)], &[TEMP, Q])?;
        accumulate(sensitivities, TEMP, &dtv, |i| 1.0 + c * q[i])?;
        accumulate(sensitivities, Q, &dtv, |i| t[i] * c)
    }
}

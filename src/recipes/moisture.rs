//! Moisture recipes: total mass of moist air, specific and relative humidity.

use super::{accumulate, consume, names, pointwise, Builtin};
use crate::core::fieldset::FieldSet;
use crate::core::recipe::{Recipe, RecipeParams};
use crate::core::types::Capabilities;
use tracing::debug;

const M_T: &str = "m_t";
const MIXING: [&str; 4] = ["m_v", "m_ci", "m_cl", "m_r"];
const Q: &str = "specific_humidity";
const QSAT: &str = "qsat";
const RH: &str = "relative_humidity";

/// `m_t = 1 + m_v + m_ci + m_cl + m_r`.
#[derive(Debug)]
pub struct TotalMassMoistAir {
    ingredients: Vec<String>,
}

impl Builtin for TotalMassMoistAir {
    const NAME: &'static str = "TotalMassMoistAir";
    const PRODUCT: &'static str = M_T;

    fn from_params(params: &RecipeParams) -> Result<Self, String> {
        params.expect_keys(&[])?;
        Ok(Self {
            ingredients: names(&MIXING),
        })
    }
}

impl Recipe for TotalMassMoistAir {
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
        pointwise(fields, M_T, &MIXING, |x| Ok(1.0 + x.iter().sum::<f64>()))
    }

    fn execute_tl(&mut self, increments: &mut FieldSet, _reference: &FieldSet) -> Result<(), String> {
        pointwise(increments, M_T, &MIXING, |x| Ok(x.iter().sum()))
    }

    fn execute_ad(&mut self, sensitivities: &mut FieldSet, _reference: &FieldSet) -> Result<(), String> {
        let dmt = consume(sensitivities, M_T, &[], &MIXING)?;
        for name in MIXING {
            accumulate(sensitivities, name, &dmt, |_| 1.0)?;
        }
        Ok(())
    }
}

/// `specific_humidity = m_v / m_t`. Forward only.
#[derive(Debug)]
pub struct SpecificHumidity {
    ingredients: Vec<String>,
}

impl Builtin for SpecificHumidity {
    const NAME: &'static str = "SpecificHumidity_A";
    const PRODUCT: &'static str = Q;

    fn from_params(params: &RecipeParams) -> Result<Self, String> {
        params.expect_keys(&[])?;
        Ok(Self {
            ingredients: names(&["m_v", M_T]),
        })
    }
}

impl Recipe for SpecificHumidity {
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
        pointwise(fields, Q, &["m_v", M_T], |x| {
            if x[1] == 0.0 {
                return Err(format!("'{}' is zero", M_T));
            }
            Ok(x[0] / x[1])
        })
    }
}

/// `relative_humidity = max(100 q / qsat, 0)`, optionally capped at 100.
///
/// The cap comes from the product field's `cap_super_sat` metadata when the
/// caller supplies it, otherwise from the `cap_super_sat` parameter. It is
/// read once, at setup.
#[derive(Debug)]
pub struct RelativeHumidity {
    ingredients: Vec<String>,
    cap_param: bool,
    cap_super_sat: bool,
}

impl RelativeHumidity {
    pub fn caps_super_saturation(&self) -> bool {
        self.cap_super_sat
    }
}

impl Builtin for RelativeHumidity {
    const NAME: &'static str = "RelativeHumidity_A";
    const PRODUCT: &'static str = RH;

    fn from_params(params: &RecipeParams) -> Result<Self, String> {
        params.expect_keys(&["cap_super_sat"])?;
        let cap = params.bool_or("cap_super_sat", false)?;
        Ok(Self {
            ingredients: names(&[Q, QSAT]),
            cap_param: cap,
            cap_super_sat: cap,
        })
    }
}

impl Recipe for RelativeHumidity {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn product(&self) -> &str {
        Self::PRODUCT
    }

    fn ingredients(&self) -> &[String] {
        &self.ingredients
    }

    fn requires_setup(&self) -> bool {
        true
    }

    fn setup(&mut self, fields: &FieldSet) -> Result<(), String> {
        self.cap_super_sat = match fields.metadata(RH, "cap_super_sat") {
            None => self.cap_param,
            Some(value) => value
                .as_bool()
                .ok_or_else(|| format!("metadata 'cap_super_sat' of '{}' must be a boolean", RH))?,
        };
        debug!(cap_super_sat = self.cap_super_sat, "relative humidity setup");
        Ok(())
    }

    fn execute_nl(&mut self, fields: &mut FieldSet) -> Result<(), String> {
        let cap = self.cap_super_sat;
        pointwise(fields, RH, &[Q, QSAT], |x| {
            let rh = (x[0] / x[1] * 100.0).max(0.0);
            Ok(if cap { rh.min(100.0) } else { rh })
        })
    }
}

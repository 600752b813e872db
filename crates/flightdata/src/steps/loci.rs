//! Loss-of-control index.
//!
//! Combines the stall probability with a coordination index built from yaw
//! rate, roll and true airspeed.

use super::columns::{HDG, LOCI, PRO_SPIN_FORCE, ROLL, STALL_PROB, TAS_FTMIN, YAW_RATE};
use super::{ProcessStep, StepContext};
use crate::airframes::CESSNA_172S;
use crate::builder::FlightBuilder;
use crate::error::Result;
use crate::meta::Airframe;
use crate::series::NumericSeries;

/// Coordination value mapped to a full pro-spin index.
pub const PROSPIN_LIM: f64 = 4.0;
/// Degrees to radians.
pub const COMP_CONV: f64 = std::f64::consts::PI / 180.0;
const GRAVITY_FT_S2: f64 = 32.2;

/// Writes `Coordination Index` and `LOC-I Index`; Cessna 172S only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LossOfControl;

impl ProcessStep for LossOfControl {
    fn name(&self) -> &'static str {
        "loss_of_control"
    }

    fn required_numeric(&self) -> Vec<&str> {
        vec![HDG, ROLL, TAS_FTMIN, STALL_PROB]
    }

    fn outputs(&self) -> Vec<&str> {
        vec![YAW_RATE, PRO_SPIN_FORCE, LOCI]
    }

    fn airframe_is_valid(&self, airframe: &Airframe) -> bool {
        airframe.name == CESSNA_172S
    }

    fn compute(&self, builder: &FlightBuilder, _ctx: &StepContext) -> Result<()> {
        let hdg = builder.require_numeric(HDG)?;
        let roll = builder.require_numeric(ROLL)?;
        let tas = builder.require_numeric(TAS_FTMIN)?;
        let stall = builder.require_numeric(STALL_PROB)?;
        let len = hdg.len();

        let yaw_rate = NumericSeries::computed(YAW_RATE, "degrees", len, |i| {
            let delta = if i == 0 { 0.0 } else { hdg.get(i) - hdg.get(i - 1) };
            yaw_rate_from_delta(delta)
        })
        .temporary();

        let pro_spin = NumericSeries::computed(PRO_SPIN_FORCE, "index", len, |i| {
            coordination_index(yaw_rate.get(i), roll.get(i), tas.get(i))
        });

        let loci = NumericSeries::computed(LOCI, "index", len, |i| {
            stall.get(i) * pro_spin.get(i) / 100.0
        });

        builder.add_numeric(yaw_rate);
        builder.add_numeric(pro_spin);
        builder.add_numeric(loci);
        Ok(())
    }
}

/// Smallest angle between two headings `delta` degrees apart.
#[must_use]
pub fn yaw_rate_from_delta(delta: f64) -> f64 {
    180.0 - (180.0 - delta.abs() % 360.0).abs()
}

/// Coordination (pro-spin) index, 0 to 100.
#[must_use]
pub fn coordination_index(yaw_rate: f64, roll: f64, tas_ft_min: f64) -> f64 {
    let roll_comp = roll * COMP_CONV;
    let yaw_comp = yaw_rate * COMP_CONV;
    let vr_comp = (tas_ft_min / 60.0) * yaw_comp;
    let ct_comp = roll_comp.sin() * GRAVITY_FT_S2;
    let cord_comp = (ct_comp - vr_comp).abs() * 100.0;
    (cord_comp / PROSPIN_LIM).min(100.0)
}

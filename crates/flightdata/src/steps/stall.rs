//! Stall probability from a simple angle-of-attack estimate.

use std::f64::consts::PI;

use super::columns::{
    ALT_B, AOA_SIMPLE, BARO_A, CAS, IAS, OAT, PITCH, STALL_PROB, TAS_FTMIN, VSPD_CALCULATED,
};
use super::{ProcessStep, StepContext};
use crate::airframes::CESSNA_172S;
use crate::builder::FlightBuilder;
use crate::error::Result;
use crate::series::NumericSeries;

/// Standard sea-level pressure in inches of mercury.
pub const STD_PRESS_INHG: f64 = 29.92;
/// Critical angle of attack in degrees.
pub const AOA_CRIT: f64 = 15.0;
/// Samples either side of `i` in the vertical speed regression.
pub const VSI_LAG_DIFF: usize = 1;
const FPM_CONV: f64 = 60.0;
const KNOTS_TO_FT_MIN: f64 = 6076.0 / 60.0;

/// Writes `Stall Index` plus the transient airspeed, vertical speed and
/// angle-of-attack columns the loss-of-control step reuses.
///
/// `Stall Index` is a percentage on a 0 to 100 scale, not a 0 to 1
/// probability.
#[derive(Debug, Clone, Copy, Default)]
pub struct StallIndex;

impl ProcessStep for StallIndex {
    fn name(&self) -> &'static str {
        "stall_index"
    }

    fn required_numeric(&self) -> Vec<&str> {
        vec![PITCH, IAS, BARO_A, OAT, ALT_B]
    }

    fn outputs(&self) -> Vec<&str> {
        vec![STALL_PROB, TAS_FTMIN, VSPD_CALCULATED, CAS, AOA_SIMPLE]
    }

    fn compute(&self, builder: &FlightBuilder, _ctx: &StepContext) -> Result<()> {
        let ias = builder.require_numeric(IAS)?;
        let pitch = builder.require_numeric(PITCH)?;
        let baro = builder.require_numeric(BARO_A)?;
        let oat = builder.require_numeric(OAT)?;
        let alt_b = builder.require_numeric(ALT_B)?;
        let len = ias.len();

        let airspeed = if builder.airframe_name() == CESSNA_172S {
            let cas = NumericSeries::computed(CAS, "knots", len, |i| calibrated_airspeed(ias.get(i)))
                .temporary();
            builder.add_numeric(cas.clone());
            cas
        } else {
            (*ias).clone()
        };

        let vspd = NumericSeries::computed(VSPD_CALCULATED, "ft/min", len, |i| {
            vspd_regression(alt_b.values(), i)
        })
        .temporary();

        let density: Vec<f64> = (0..len)
            .map(|i| density_ratio(baro.get(i), oat.get(i)))
            .collect();

        let tas = NumericSeries::computed(TAS_FTMIN, "ft/min", len, |i| {
            airspeed.get(i) * density[i].powf(-0.5) * KNOTS_TO_FT_MIN
        })
        .temporary();

        let aoa = NumericSeries::computed(AOA_SIMPLE, "degrees", len, |i| {
            let vspd_geo = vspd.get(i) * density[i].powf(-0.5);
            let flight_path = (vspd_geo / tas.get(i)).asin() * (180.0 / PI);
            let value = pitch.get(i) - flight_path;
            if value.is_nan() {
                0.0
            } else {
                value
            }
        })
        .temporary();

        let stall = NumericSeries::computed(STALL_PROB, "index", len, |i| {
            stall_probability(aoa.get(i))
        });

        builder.add_numeric(vspd);
        builder.add_numeric(tas);
        builder.add_numeric(aoa);
        builder.add_numeric(stall);
        Ok(())
    }
}

/// Cessna 172S position-error correction below 70 knots.
#[must_use]
pub fn calibrated_airspeed(ias: f64) -> f64 {
    if ias < 70.0 {
        0.7 * ias + 20.667
    } else {
        ias
    }
}

/// Air density relative to standard atmosphere.
#[must_use]
pub fn density_ratio(baro_inhg: f64, oat_c: f64) -> f64 {
    let pressure_ratio = baro_inhg / STD_PRESS_INHG;
    let temp_ratio = (273.0 + oat_c) / 288.0;
    pressure_ratio / temp_ratio
}

/// Vertical speed in ft/min at `index` from a least-squares line through the
/// neighboring barometric altitudes. `NaN` at either end.
#[must_use]
pub fn vspd_regression(alt_b: &[f64], index: usize) -> f64 {
    if index < VSI_LAG_DIFF || index + VSI_LAG_DIFF >= alt_b.len() {
        return f64::NAN;
    }
    let window = &alt_b[index - VSI_LAG_DIFF..=index + VSI_LAG_DIFF];
    #[allow(clippy::cast_precision_loss)]
    let n = window.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = window.iter().sum::<f64>() / n;

    let (mut num, mut den) = (0.0, 0.0);
    for (x, y) in window.iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let chi = x as f64 - x_mean;
        num += chi * (y - y_mean);
        den += chi * chi;
    }
    num / den * FPM_CONV
}

/// Stall probability (0 to 100) for an angle of attack in degrees.
#[must_use]
pub fn stall_probability(aoa: f64) -> f64 {
    ((aoa / AOA_CRIT).abs() * 100.0).min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::builder;

    fn flight(airframe: &str, ias: f64, pitch: f64) -> FlightBuilder {
        let n = 5;
        builder(
            airframe,
            vec![
                NumericSeries::with_values(IAS, "knots", vec![ias; n]),
                NumericSeries::with_values(PITCH, "degrees", vec![pitch; n]),
                NumericSeries::with_values(BARO_A, "inches Hg", vec![STD_PRESS_INHG; n]),
                NumericSeries::with_values(OAT, "deg C", vec![15.0; n]),
                NumericSeries::with_values(ALT_B, "ft", vec![3000.0; n]),
            ],
        )
    }

    #[test]
    fn test_calibrated_airspeed() {
        assert!((calibrated_airspeed(60.0) - 62.667).abs() < 1e-9);
        assert!((calibrated_airspeed(90.0) - 90.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_standard_day_density_is_one() {
        assert!((density_ratio(STD_PRESS_INHG, 15.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_vspd_regression() {
        let alt = [1000.0, 1010.0, 1030.0, 1040.0];
        assert!(vspd_regression(&alt, 0).is_nan());
        assert!((vspd_regression(&alt, 1) - 900.0).abs() < 1e-9);
        assert!(vspd_regression(&alt, 3).is_nan());
    }

    #[test]
    fn test_stall_probability_is_bounded() {
        assert!((stall_probability(7.5) - 50.0).abs() < 1e-9);
        assert!((stall_probability(-30.0) - 100.0).abs() < f64::EPSILON);
        assert!(stall_probability(0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_level_flight() {
        let ctx = StepContext::in_memory().expect("ctx");
        let b = flight("Cirrus SR22", 100.0, 3.0);
        StallIndex.compute(&b, &ctx).expect("compute");

        let stall = b.numeric(STALL_PROB).expect("stall");
        assert_eq!(stall.len(), 5);
        assert!(!stall.is_temporary());
        // Level flight: angle of attack equals pitch.
        assert!((stall.get(2) - 20.0).abs() < 1e-9);
        // Regression is undefined at the ends, so AOA falls back to 0.
        assert!(stall.get(0).abs() < f64::EPSILON);

        let tas = b.numeric(TAS_FTMIN).expect("tas");
        assert!(tas.is_temporary());
        assert!((tas.get(2) - 100.0 * KNOTS_TO_FT_MIN).abs() < 1e-9);
        assert!(b.numeric(CAS).is_none());
    }

    #[test]
    fn test_cessna_172s_uses_cas() {
        let ctx = StepContext::in_memory().expect("ctx");
        let b = flight(CESSNA_172S, 60.0, 0.0);
        StallIndex.compute(&b, &ctx).expect("compute");

        let cas = b.numeric(CAS).expect("cas");
        assert!(cas.is_temporary());
        assert!((cas.get(0) - 62.667).abs() < 1e-9);
        let tas = b.numeric(TAS_FTMIN).expect("tas");
        assert!((tas.get(0) - 62.667 * KNOTS_TO_FT_MIN).abs() < 1e-9);
    }
}

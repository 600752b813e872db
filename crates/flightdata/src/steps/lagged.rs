//! Ten-sample backward difference of MSL altitude.

use super::columns::{ALT_MSL, ALT_MSL_LAG_DIFF};
use super::{ProcessStep, StepContext};
use crate::builder::FlightBuilder;
use crate::error::Result;
use crate::meta::Airframe;
use crate::series::NumericSeries;

/// Samples between the two altitudes being differenced.
pub const LAG: usize = 10;

/// Writes `AltMSL Lag Diff`: `AltMSL[i] - AltMSL[i - 10]`, zero for the first
/// ten samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaggedAltitude;

impl ProcessStep for LaggedAltitude {
    fn name(&self) -> &'static str {
        "lagged_altitude"
    }

    fn required_numeric(&self) -> Vec<&str> {
        vec![ALT_MSL]
    }

    fn outputs(&self) -> Vec<&str> {
        vec![ALT_MSL_LAG_DIFF]
    }

    fn airframe_is_valid(&self, airframe: &Airframe) -> bool {
        !airframe.kind.is_uas()
    }

    fn compute(&self, builder: &FlightBuilder, _ctx: &StepContext) -> Result<()> {
        let msl = builder.require_numeric(ALT_MSL)?;
        let lagged = msl.lag(LAG);
        let diff = NumericSeries::computed(ALT_MSL_LAG_DIFF, "ft msl", msl.len(), |i| {
            if i < LAG {
                0.0
            } else {
                msl.get(i) - lagged.get(i)
            }
        });
        builder.add_numeric(diff);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::{builder, uas_builder};
    use crate::steps::applicable;

    #[test]
    fn test_lag_difference() {
        let ctx = StepContext::in_memory().expect("ctx");
        let values: Vec<f64> = (0..15).map(|i| f64::from(i) * 2.0).collect();
        let b = builder("Cessna 172S", vec![NumericSeries::with_values(ALT_MSL, "ft", values)]);

        LaggedAltitude.compute(&b, &ctx).expect("compute");
        let diff = b.numeric(ALT_MSL_LAG_DIFF).expect("diff");
        assert_eq!(diff.len(), 15);
        assert!(diff.values()[..LAG].iter().all(|v| *v == 0.0));
        assert!((diff.get(10) - 20.0).abs() < f64::EPSILON);
        assert!((diff.get(14) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_not_applicable_to_uas() {
        let ctx = StepContext::in_memory().expect("ctx");
        let b = uas_builder(vec![NumericSeries::with_values(ALT_MSL, "ft", vec![1.0])]);
        assert!(!applicable(&LaggedAltitude, &b, &ctx));
    }
}

//! Total fuel on board.

use super::columns::TOTAL_FUEL;
use super::{ProcessStep, StepContext};
use crate::builder::FlightBuilder;
use crate::error::{Error, Result};
use crate::meta::Airframe;
use crate::series::NumericSeries;

/// Every numeric column with this prefix is a fuel tank.
pub const FUEL_PREFIX: &str = "FQty";

/// Sums the fuel quantity columns sample by sample.
#[derive(Debug, Clone, Default)]
pub struct TotalFuel {
    tanks: Vec<String>,
}

impl TotalFuel {
    /// Sum over the named tank columns.
    #[must_use]
    pub fn new(tanks: Vec<String>) -> Self {
        Self { tanks }
    }
}

impl ProcessStep for TotalFuel {
    fn name(&self) -> &'static str {
        "total_fuel"
    }

    fn required_numeric(&self) -> Vec<&str> {
        self.tanks.iter().map(String::as_str).collect()
    }

    fn outputs(&self) -> Vec<&str> {
        vec![TOTAL_FUEL]
    }

    fn airframe_is_valid(&self, airframe: &Airframe) -> bool {
        !airframe.kind.is_uas()
    }

    fn is_available(&self, _ctx: &StepContext) -> bool {
        !self.tanks.is_empty()
    }

    fn compute(&self, builder: &FlightBuilder, _ctx: &StepContext) -> Result<()> {
        if self.tanks.is_empty() {
            return Err(Error::malformed("no fuel quantity columns to total"));
        }

        let mut total: Option<Vec<f64>> = None;
        let mut unit = String::new();
        for tank in &self.tanks {
            let series = builder.require_numeric(tank)?;
            match total.as_mut() {
                None => {
                    unit = series.data_type().to_string();
                    total = Some(series.values().to_vec());
                }
                Some(sum) => {
                    for (acc, v) in sum.iter_mut().zip(series.values()) {
                        *acc += v;
                    }
                }
            }
        }

        builder.add_numeric(NumericSeries::with_values(
            TOTAL_FUEL,
            unit,
            total.unwrap_or_default(),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::applicable;
    use crate::steps::testing::{builder, uas_builder};

    #[test]
    fn test_sums_tanks() {
        let ctx = StepContext::in_memory().expect("ctx");
        let b = builder(
            "Cessna 172S",
            vec![
                NumericSeries::with_values("FQtyL", "gals", vec![10.0, 9.5]),
                NumericSeries::with_values("FQtyR", "gals", vec![12.0, 11.0]),
            ],
        );
        let step = TotalFuel::new(vec!["FQtyL".into(), "FQtyR".into()]);
        step.compute(&b, &ctx).expect("compute");

        let total = b.numeric(TOTAL_FUEL).expect("total");
        assert_eq!(total.values(), &[22.0, 20.5]);
        assert_eq!(total.data_type(), "gals");
    }

    #[test]
    fn test_missing_tank_propagates_nan() {
        let ctx = StepContext::in_memory().expect("ctx");
        let b = builder(
            "Cessna 172S",
            vec![
                NumericSeries::with_values("FQtyL", "gals", vec![10.0, f64::NAN]),
                NumericSeries::with_values("FQtyR", "gals", vec![12.0, 11.0]),
            ],
        );
        TotalFuel::new(vec!["FQtyL".into(), "FQtyR".into()])
            .compute(&b, &ctx)
            .expect("compute");
        assert!(b.numeric(TOTAL_FUEL).expect("total").get(1).is_nan());
    }

    #[test]
    fn test_no_tanks_is_malformed() {
        let ctx = StepContext::in_memory().expect("ctx");
        let b = builder("Cessna 172S", Vec::new());
        let err = TotalFuel::default().compute(&b, &ctx).expect_err("no tanks");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_not_applicable_to_uas() {
        let ctx = StepContext::in_memory().expect("ctx");
        let b = uas_builder(vec![NumericSeries::with_values("FQtyL", "gals", vec![1.0])]);
        assert!(!applicable(&TotalFuel::new(vec!["FQtyL".into()]), &b, &ctx));
    }
}

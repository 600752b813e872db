//! Airport visits.

use tracing::debug;

use super::columns::{
    AIRPORT_DISTANCE, ALT_AGL, E1_RPM, GND_SPD, NEAREST_AIRPORT, NEAREST_RUNWAY, RUNWAY_DISTANCE,
};
use super::{ProcessStep, StepContext};
use crate::builder::FlightBuilder;
use crate::error::Result;
use crate::itinerary::{Itinerary, LegSample};
use crate::meta::ProcessingStatus;

/// Placeholder output so the step has a graph identity; never written.
pub const ITINERARY_MARKER: &str = "_itinerary";

/// Walks the proximity columns and records one leg per airport visited.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComputeItinerary;

impl ProcessStep for ComputeItinerary {
    fn name(&self) -> &'static str {
        "itinerary"
    }

    fn required_numeric(&self) -> Vec<&str> {
        vec![ALT_AGL, AIRPORT_DISTANCE, RUNWAY_DISTANCE, GND_SPD, E1_RPM]
    }

    fn required_text(&self) -> Vec<&str> {
        vec![NEAREST_AIRPORT, NEAREST_RUNWAY]
    }

    fn outputs(&self) -> Vec<&str> {
        vec![ITINERARY_MARKER]
    }

    fn compute(&self, builder: &FlightBuilder, ctx: &StepContext) -> Result<()> {
        let agl = builder.require_numeric(ALT_AGL)?;
        let airport_distance = builder.require_numeric(AIRPORT_DISTANCE)?;
        let runway_distance = builder.require_numeric(RUNWAY_DISTANCE)?;
        let ground_speed = builder.require_numeric(GND_SPD)?;
        let rpm = builder.require_numeric(E1_RPM)?;
        let airports = builder.require_text(NEAREST_AIRPORT)?;
        let runways = builder.require_text(NEAREST_RUNWAY)?;

        let has_runway_info = |airport: &str| {
            ctx.airports
                .as_ref()
                .is_some_and(|dir| dir.has_runway_info(airport))
        };
        let mut legs = Vec::new();
        let mut close = |mut leg: Itinerary| {
            leg.select_best_runway();
            if leg.was_approach(has_runway_info(leg.airport())) {
                legs.push(leg);
            }
        };

        let mut current: Option<Itinerary> = None;
        for i in 0..airports.len() {
            let airport = airports.get(i);
            let sample = LegSample {
                index: i,
                runway: runways.get(i),
                altitude_agl: agl.get(i),
                airport_distance: airport_distance.get(i),
                runway_distance: runway_distance.get(i),
                ground_speed: ground_speed.get(i),
                rpm: rpm.get(i),
            };

            if airport.is_empty() {
                if let Some(leg) = current.take() {
                    close(leg);
                }
                continue;
            }

            match current.as_mut() {
                Some(leg) if leg.airport() == airport => leg.update(&sample),
                _ => {
                    let previous = current.replace(Itinerary::open(airport, &sample));
                    if let Some(leg) = previous {
                        close(leg);
                    }
                }
            }
        }
        if let Some(leg) = current.take() {
            close(leg);
        }

        for leg in &mut legs {
            leg.determine_type();
        }
        debug!(legs = legs.len(), "computed itinerary");
        if legs.is_empty() {
            builder.update_status(ProcessingStatus::NO_AIRPORT);
        }
        builder.set_itinerary(legs);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::itinerary::LegType;
    use crate::series::{NumericSeries, TextSeries};
    use crate::steps::proximity::testing::OneAirport;
    use crate::steps::testing::builder_with_text;

    /// Taxi out and climb away from KMSP, cruise, then fly past KXYZ high.
    fn departure() -> FlightBuilder {
        let n = 60;
        let mut airport = vec!["KMSP".to_string(); 40];
        airport.extend(vec![String::new(); 10]);
        airport.extend(vec!["KXYZ".to_string(); 10]);
        let runway: Vec<String> = (0..n)
            .map(|i| if i < 20 { "12L".to_string() } else { String::new() })
            .collect();
        let agl: Vec<f64> = (0..n)
            .map(|i| if i < 25 { 0.0 } else { i as f64 * 20.0 })
            .collect();
        let gnd: Vec<f64> = (0..n).map(|i| if i < 5 { 5.0 } else { 60.0 }).collect();
        let rwy_dist: Vec<f64> = (0..n)
            .map(|i| if i < 20 { 50.0 } else { f64::NAN })
            .collect();
        let apt_dist: Vec<f64> = (0..n).map(|i| i as f64 * 100.0).collect();

        builder_with_text(
            "Cessna 172S",
            vec![
                NumericSeries::with_values(ALT_AGL, "ft", agl),
                NumericSeries::with_values(AIRPORT_DISTANCE, "ft", apt_dist),
                NumericSeries::with_values(RUNWAY_DISTANCE, "ft", rwy_dist),
                NumericSeries::with_values(GND_SPD, "knots", gnd),
                NumericSeries::with_values(E1_RPM, "rpm", vec![2400.0; n]),
            ],
            vec![
                TextSeries::with_values(NEAREST_AIRPORT, "IATA Code", airport),
                TextSeries::with_values(NEAREST_RUNWAY, "IATA Code", runway),
            ],
        )
    }

    #[test]
    fn test_takeoff_leg_recorded() {
        let ctx = StepContext::in_memory()
            .expect("ctx")
            .with_airports(Arc::new(OneAirport { runway_info: true }));
        let b = departure();
        ComputeItinerary.compute(&b, &ctx).expect("compute");

        let flight = b.build().expect("build");
        // KXYZ never saw a runway and has runway info, so it was a fly-by.
        assert_eq!(flight.itinerary.len(), 1);
        let leg = &flight.itinerary[0];
        assert_eq!(leg.airport(), "KMSP");
        assert_eq!(leg.runway(), Some("12L"));
        assert_eq!(leg.leg_type(), LegType::Takeoff);
        assert!(!flight.meta.status.contains(ProcessingStatus::NO_AIRPORT));
    }

    #[test]
    fn test_no_legs_sets_status() {
        let ctx = StepContext::in_memory().expect("ctx");
        let b = builder_with_text(
            "Cessna 172S",
            [ALT_AGL, AIRPORT_DISTANCE, RUNWAY_DISTANCE, GND_SPD, E1_RPM]
                .iter()
                .map(|c| NumericSeries::with_values(*c, "x", vec![0.0; 3]))
                .collect(),
            vec![
                TextSeries::with_values(NEAREST_AIRPORT, "x", vec![String::new(); 3]),
                TextSeries::with_values(NEAREST_RUNWAY, "x", vec![String::new(); 3]),
            ],
        );
        ComputeItinerary.compute(&b, &ctx).expect("compute");
        assert!(b.meta().status.contains(ProcessingStatus::NO_AIRPORT));
    }
}

//! Nearest airport and runway per sample.

use std::fmt;

use super::columns::{
    AIRPORT_DISTANCE, ALT_AGL, LATITUDE, LONGITUDE, NEAREST_AIRPORT, NEAREST_RUNWAY,
    RUNWAY_DISTANCE,
};
use super::{ProcessStep, StepContext};
use crate::builder::FlightBuilder;
use crate::error::{Error, Result};
use crate::series::{NumericSeries, TextSeries};

/// Above this height (ft) no airport is considered near.
pub const MAX_AGL_FT: f64 = 2000.0;

/// What an [`AirportDirectory`] found near a position.
#[derive(Debug, Clone, PartialEq)]
pub struct Proximity {
    /// Airport identifier.
    pub airport: String,
    /// Distance to the airport in feet.
    pub airport_distance: f64,
    /// Nearest runway and its distance in feet, when one is close enough.
    pub runway: Option<(String, f64)>,
}

/// Airport and runway geometry.
pub trait AirportDirectory: Send + Sync + fmt::Debug {
    /// The nearest airport within the directory's search radius.
    fn nearest(&self, latitude: f64, longitude: f64) -> Option<Proximity>;

    /// Whether runway positions are known for `airport`.
    fn has_runway_info(&self, airport: &str) -> bool;
}

/// Writes the nearest airport and runway columns. Needs an airport directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct AirportProximity;

impl ProcessStep for AirportProximity {
    fn name(&self) -> &'static str {
        "airport_proximity"
    }

    fn required_numeric(&self) -> Vec<&str> {
        vec![LATITUDE, LONGITUDE, ALT_AGL]
    }

    fn outputs(&self) -> Vec<&str> {
        vec![NEAREST_AIRPORT, AIRPORT_DISTANCE, NEAREST_RUNWAY, RUNWAY_DISTANCE]
    }

    fn is_available(&self, ctx: &StepContext) -> bool {
        ctx.airports.is_some()
    }

    fn compute(&self, builder: &FlightBuilder, ctx: &StepContext) -> Result<()> {
        let airports = ctx
            .airports
            .as_ref()
            .ok_or_else(|| Error::malformed("no airport directory is configured"))?;
        let latitude = builder.require_numeric(LATITUDE)?;
        let longitude = builder.require_numeric(LONGITUDE)?;
        let agl = builder.require_numeric(ALT_AGL)?;

        let mut nearest_airport = TextSeries::new(NEAREST_AIRPORT, "IATA Code");
        let mut airport_distance = NumericSeries::new(AIRPORT_DISTANCE, "ft");
        let mut nearest_runway = TextSeries::new(NEAREST_RUNWAY, "IATA Code");
        let mut runway_distance = NumericSeries::new(RUNWAY_DISTANCE, "ft");

        for i in 0..latitude.len() {
            let (lat, lon, height) = (latitude.get(i), longitude.get(i), agl.get(i));
            let found = if lat.is_nan() || lon.is_nan() || height.is_nan() || height > MAX_AGL_FT {
                None
            } else {
                airports.nearest(lat, lon)
            };

            match found {
                Some(p) => {
                    nearest_airport.push(p.airport);
                    airport_distance.push(p.airport_distance);
                    match p.runway {
                        Some((runway, distance)) => {
                            nearest_runway.push(runway);
                            runway_distance.push(distance);
                        }
                        None => {
                            nearest_runway.push("");
                            runway_distance.push(f64::NAN);
                        }
                    }
                }
                None => {
                    nearest_airport.push("");
                    airport_distance.push(f64::NAN);
                    nearest_runway.push("");
                    runway_distance.push(f64::NAN);
                }
            }
        }

        builder.add_text(nearest_airport);
        builder.add_numeric(airport_distance);
        builder.add_text(nearest_runway);
        builder.add_numeric(runway_distance);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{AirportDirectory, Proximity};

    /// One airport at latitude 44 with a runway on its centerline, roughly
    /// 364,000 ft per degree.
    #[derive(Debug, Default)]
    pub struct OneAirport {
        pub runway_info: bool,
    }

    impl AirportDirectory for OneAirport {
        fn nearest(&self, latitude: f64, _longitude: f64) -> Option<Proximity> {
            let distance = (latitude - 44.0).abs() * 364_000.0;
            (distance <= 10_000.0).then(|| Proximity {
                airport: "KMSP".to_string(),
                airport_distance: distance,
                runway: (self.runway_info && distance <= 100.0)
                    .then(|| ("12L".to_string(), distance)),
            })
        }

        fn has_runway_info(&self, _airport: &str) -> bool {
            self.runway_info
        }
    }
}

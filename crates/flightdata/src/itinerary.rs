//! Airport visits.
//!
//! An [`Itinerary`] leg accumulates samples while one airport stays nearest
//! to the aircraft, then classifies what happened there.

use std::collections::HashMap;

use serde::Serialize;

/// RPM at or above which the engine is considered at takeoff power.
const TAKEOFF_RPM: f64 = 2100.0;
/// Ground speed window (knots) for a takeoff roll.
const TAKEOFF_MIN_GND_SPD: f64 = 14.5;
const TAKEOFF_MAX_GND_SPD: f64 = 80.0;
/// Samples the takeoff criteria must hold.
const TAKEOFF_SUSTAIN: u32 = 15;
/// AGL (ft) at or below which the aircraft is on the ground.
const GROUNDED_AGL: f64 = 5.0;
/// AGL (ft) above which the aircraft is airborne.
const AIRBORNE_AGL: f64 = 6.0;

/// What happened during one airport visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegType {
    /// Departed from the airport.
    Takeoff,
    /// Landed and stayed.
    Landing,
    /// Touched down and took off again.
    TouchAndGo,
    /// Approached without touching down.
    GoAround,
}

impl std::fmt::Display for LegType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Takeoff => write!(f, "takeoff"),
            Self::Landing => write!(f, "landing"),
            Self::TouchAndGo => write!(f, "touch_and_go"),
            Self::GoAround => write!(f, "go_around"),
        }
    }
}

/// One sample seen while near an airport.
#[derive(Debug, Clone, Copy)]
pub struct LegSample<'a> {
    /// Sample index in the flight.
    pub index: usize,
    /// Nearest runway, empty when none.
    pub runway: &'a str,
    /// Altitude above ground (ft).
    pub altitude_agl: f64,
    /// Distance to the airport (ft).
    pub airport_distance: f64,
    /// Distance to the runway (ft).
    pub runway_distance: f64,
    /// Ground speed (knots).
    pub ground_speed: f64,
    /// Engine RPM.
    pub rpm: f64,
}

/// One airport visit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Itinerary {
    airport: String,
    runway: Option<String>,
    #[serde(skip)]
    runway_counts: HashMap<String, u32>,
    min_altitude: f64,
    min_altitude_index: Option<usize>,
    min_airport_distance: f64,
    min_runway_distance: f64,
    start_of_approach: Option<usize>,
    end_of_approach: Option<usize>,
    start_of_takeoff: Option<usize>,
    end_of_takeoff: Option<usize>,
    final_index: usize,
    #[serde(skip)]
    takeoff_counter: u32,
    leg_type: LegType,
}

impl Itinerary {
    /// Open a leg at `airport` with its first sample.
    #[must_use]
    pub fn open(airport: impl Into<String>, sample: &LegSample<'_>) -> Self {
        let mut leg = Self {
            airport: airport.into(),
            runway: None,
            runway_counts: HashMap::new(),
            min_altitude: f64::MAX,
            min_altitude_index: None,
            min_airport_distance: f64::MAX,
            min_runway_distance: f64::MAX,
            start_of_approach: None,
            end_of_approach: None,
            start_of_takeoff: None,
            end_of_takeoff: None,
            final_index: sample.index,
            takeoff_counter: 0,
            leg_type: LegType::GoAround,
        };
        leg.update(sample);
        leg
    }

    /// Extend the leg with another sample.
    pub fn update(&mut self, sample: &LegSample<'_>) {
        self.final_index = sample.index;

        if sample.rpm >= TAKEOFF_RPM
            && sample.ground_speed > TAKEOFF_MIN_GND_SPD
            && sample.ground_speed < TAKEOFF_MAX_GND_SPD
        {
            if self.start_of_takeoff.is_none() {
                self.start_of_takeoff = Some(sample.index);
            } else if self.takeoff_counter >= TAKEOFF_SUSTAIN {
                self.end_of_takeoff = Some(sample.index);
            }
            self.takeoff_counter += 1;
        } else {
            self.takeoff_counter = 0;
            if self.end_of_takeoff.is_none() {
                self.start_of_takeoff = None;
            }
        }

        let agl = sample.altitude_agl;
        if !agl.is_nan() {
            if self.min_altitude > agl {
                self.min_altitude = agl;
                self.min_altitude_index = Some(sample.index);
            }
            if agl <= GROUNDED_AGL {
                if self.start_of_approach.is_some() {
                    self.end_of_approach = Some(sample.index);
                }
            } else if agl > AIRBORNE_AGL && self.start_of_approach.is_none() {
                self.start_of_approach = Some(sample.index);
            }
        }

        if !sample.airport_distance.is_nan() {
            self.min_airport_distance = self.min_airport_distance.min(sample.airport_distance);
        }
        if !sample.runway_distance.is_nan() {
            self.min_runway_distance = self.min_runway_distance.min(sample.runway_distance);
        }

        if !sample.runway.is_empty() {
            *self
                .runway_counts
                .entry(sample.runway.to_string())
                .or_insert(0) += 1;
        }
    }

    /// Pick the runway seen most often. Ties go to the lexically first name.
    pub fn select_best_runway(&mut self) {
        self.runway = self
            .runway_counts
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(name, _)| name.clone());
    }

    /// Whether the visit was a real approach rather than a fly-by.
    ///
    /// `has_runway_info` says whether the airport's runways are known.
    #[must_use]
    pub fn was_approach(&self, has_runway_info: bool) -> bool {
        if self.min_runway_distance < f64::MAX {
            true
        } else if has_runway_info {
            false
        } else {
            // Small fields without runway data: within 1000 ft and below 200 ft AGL.
            self.min_airport_distance <= 1000.0 && self.min_altitude <= 200.0
        }
    }

    /// Classify the leg.
    pub fn determine_type(&mut self) {
        let approach_time = match (self.start_of_approach, self.end_of_approach) {
            (Some(start), Some(end)) => end.saturating_sub(start),
            _ => 0,
        };
        let runway_time = match (self.start_of_takeoff, self.end_of_approach) {
            (Some(takeoff), Some(end)) => takeoff.saturating_sub(end),
            _ => 0,
        };

        self.leg_type = if self.start_of_takeoff.is_some()
            && (self.end_of_approach.is_none() || approach_time < 10)
        {
            LegType::Takeoff
        } else if self.end_of_takeoff.is_none() && self.end_of_approach.is_some() {
            LegType::Landing
        } else if runway_time >= 5 {
            LegType::TouchAndGo
        } else {
            self.end_of_approach = Some(self.final_index);
            LegType::GoAround
        };
    }

    /// Airport identifier.
    #[must_use]
    pub fn airport(&self) -> &str {
        &self.airport
    }

    /// Selected runway, once [`select_best_runway`](Self::select_best_runway) ran.
    #[must_use]
    pub fn runway(&self) -> Option<&str> {
        self.runway.as_deref()
    }

    /// Leg classification.
    #[must_use]
    pub fn leg_type(&self) -> LegType {
        self.leg_type
    }

    /// Lowest AGL seen and where.
    #[must_use]
    pub fn min_altitude(&self) -> Option<(usize, f64)> {
        self.min_altitude_index.map(|i| (i, self.min_altitude))
    }

    /// Closest distance to the airport (ft).
    #[must_use]
    pub fn min_airport_distance(&self) -> f64 {
        self.min_airport_distance
    }

    /// Closest distance to a runway (ft).
    #[must_use]
    pub fn min_runway_distance(&self) -> f64 {
        self.min_runway_distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(index: usize, runway: &str, agl: f64, rpm: f64, gnd_spd: f64) -> LegSample<'_> {
        LegSample {
            index,
            runway,
            altitude_agl: agl,
            airport_distance: 500.0,
            runway_distance: f64::NAN,
            ground_speed: gnd_spd,
            rpm,
        }
    }

    #[test]
    fn test_best_runway_is_most_frequent() {
        let mut leg = Itinerary::open("KGFK", &sample(1, "17R", 100.0, 0.0, 0.0));
        leg.update(&sample(2, "35L", 90.0, 0.0, 0.0));
        leg.update(&sample(3, "35L", 80.0, 0.0, 0.0));
        leg.select_best_runway();
        assert_eq!(leg.runway(), Some("35L"));
        assert_eq!(leg.min_altitude(), Some((3, 80.0)));
    }

    #[test]
    fn test_was_approach_without_runway_info() {
        let mut leg = Itinerary::open("0D8", &sample(1, "", 150.0, 0.0, 0.0));
        assert!(leg.was_approach(false));
        assert!(!leg.was_approach(true));
        leg.update(&LegSample {
            runway_distance: 50.0,
            ..sample(2, "", 150.0, 0.0, 0.0)
        });
        assert!(leg.was_approach(true));
    }

    #[test]
    fn test_sustained_takeoff_is_takeoff() {
        let mut leg = Itinerary::open("KGFK", &sample(0, "", 0.0, 2400.0, 20.0));
        for i in 1..20 {
            leg.update(&sample(i, "", 0.0, 2400.0, 40.0));
        }
        leg.determine_type();
        assert_eq!(leg.leg_type(), LegType::Takeoff);
    }

    #[test]
    fn test_landing() {
        let mut leg = Itinerary::open("KGFK", &sample(0, "", 500.0, 1800.0, 90.0));
        for i in 1..30 {
            leg.update(&sample(i, "", 500.0 - 20.0 * i as f64, 1800.0, 70.0));
        }
        leg.determine_type();
        assert_eq!(leg.leg_type(), LegType::Landing);
    }

    #[test]
    fn test_fly_over_is_go_around() {
        let mut leg = Itinerary::open("KGFK", &sample(0, "", 800.0, 2300.0, 110.0));
        leg.update(&sample(1, "", 790.0, 2300.0, 110.0));
        leg.determine_type();
        assert_eq!(leg.leg_type(), LegType::GoAround);
        assert_eq!(leg.leg_type().to_string(), "go_around");
    }
}

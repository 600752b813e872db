//! Process steps.
//!
//! A flight is finished by a set of small, independent steps. Each step names
//! the columns it reads and the columns it writes; the dependency graph in
//! [`crate::graph`] wires them together by those names and runs them in
//! parallel. A step only ever writes the columns it declares, and it may
//! update flight metadata it owns (start and end time, itinerary), nothing
//! else.

pub mod agl;
pub mod divergence;
pub mod fuel;
pub mod itinerary;
pub mod lagged;
pub mod loci;
pub mod proximity;
pub mod stall;
pub mod start_end;

use std::collections::BTreeSet;
use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::Connection;

use crate::airframes::SCAN_EAGLE;
use crate::builder::FlightBuilder;
use crate::error::Result;
use crate::meta::Airframe;
use crate::storage::{self, SeriesKind};
use crate::terrain::TerrainCache;

pub use agl::AltitudeAboveGround;
pub use divergence::Divergence;
pub use fuel::TotalFuel;
pub use itinerary::ComputeItinerary;
pub use lagged::LaggedAltitude;
pub use loci::LossOfControl;
pub use proximity::{AirportDirectory, AirportProximity, Proximity};
pub use stall::StallIndex;
pub use start_end::{ScanEagleStartEndTime, StartEndTime};

/// Column names shared by more than one step.
pub mod columns {
    /// Altitude above ground level.
    pub const ALT_AGL: &str = "AltAGL";
    /// Altitude above mean sea level.
    pub const ALT_MSL: &str = "AltMSL";
    /// Barometric altitude.
    pub const ALT_B: &str = "AltB";
    /// Ten-sample backward difference of `AltMSL`.
    pub const ALT_MSL_LAG_DIFF: &str = "AltMSL Lag Diff";
    /// Latitude in degrees.
    pub const LATITUDE: &str = "Latitude";
    /// Longitude in degrees.
    pub const LONGITUDE: &str = "Longitude";
    /// Ground speed in knots.
    pub const GND_SPD: &str = "GndSpd";
    /// Engine 1 RPM.
    pub const E1_RPM: &str = "E1 RPM";
    /// Sum of every fuel quantity column.
    pub const TOTAL_FUEL: &str = "Total Fuel";
    /// Heading.
    pub const HDG: &str = "HDG";
    /// Roll.
    pub const ROLL: &str = "Roll";
    /// Pitch.
    pub const PITCH: &str = "Pitch";
    /// Indicated airspeed.
    pub const IAS: &str = "IAS";
    /// Barometer setting.
    pub const BARO_A: &str = "BaroA";
    /// Outside air temperature.
    pub const OAT: &str = "OAT";
    /// Calibrated airspeed.
    pub const CAS: &str = "CAS";
    /// Vertical speed from a regression over barometric altitude.
    pub const VSPD_CALCULATED: &str = "VSpd Calculated";
    /// Angle of attack from pitch and flight path angle.
    pub const AOA_SIMPLE: &str = "AOASimple";
    /// True airspeed in feet per minute.
    pub const TAS_FTMIN: &str = "True Airspeed(ft/min)";
    /// Stall probability, 0 to 100.
    pub const STALL_PROB: &str = "Stall Index";
    /// Heading change per sample.
    pub const YAW_RATE: &str = "Yaw Rate";
    /// Coordination (pro-spin) index, 0 to 100.
    pub const PRO_SPIN_FORCE: &str = "Coordination Index";
    /// Loss-of-control probability, 0 to 100.
    pub const LOCI: &str = "LOC-I Index";
    /// Local date.
    pub const LCL_DATE: &str = "Lcl Date";
    /// Local time.
    pub const LCL_TIME: &str = "Lcl Time";
    /// UTC offset of the local columns.
    pub const UTC_OFFSET: &str = "UTCOfst";
    /// GPS time of day in ScanEagle logs.
    pub const DID_GPS_TIME: &str = "DID_GPS_TIME";
    /// Nearest airport identifier.
    pub const NEAREST_AIRPORT: &str = "NearestAirport";
    /// Distance to the nearest airport in feet.
    pub const AIRPORT_DISTANCE: &str = "AirportDistance";
    /// Nearest runway name.
    pub const NEAREST_RUNWAY: &str = "NearestRunway";
    /// Distance to the nearest runway in feet.
    pub const RUNWAY_DISTANCE: &str = "RunwayDistance";
}

/// Shared collaborators handed to every step.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Terrain tiles for altitude above ground.
    pub terrain: Option<Arc<TerrainCache>>,
    /// Airport and runway lookups.
    pub airports: Option<Arc<dyn AirportDirectory>>,
    catalog: Arc<Mutex<Connection>>,
}

impl StepContext {
    /// Create a context over an open series catalog.
    #[must_use]
    pub fn new(catalog: Arc<Mutex<Connection>>) -> Self {
        Self {
            terrain: None,
            airports: None,
            catalog,
        }
    }

    /// Create a context backed by a private in-memory catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Arc::new(Mutex::new(storage::open_catalog_in_memory()?))))
    }

    /// Attach a terrain cache.
    #[must_use]
    pub fn with_terrain(mut self, terrain: Arc<TerrainCache>) -> Self {
        self.terrain = Some(terrain);
        self
    }

    /// Attach an airport directory.
    #[must_use]
    pub fn with_airports(mut self, airports: Arc<dyn AirportDirectory>) -> Self {
        self.airports = Some(airports);
        self
    }

    /// Record the name and unit of a derived series in the catalog.
    ///
    /// The catalog connection is shared by every flight, so it is only ever
    /// touched under its lock.
    ///
    /// # Errors
    ///
    /// Returns a database error if the insert fails.
    pub fn register_series(&self, name: &str, data_type: &str, kind: SeriesKind) -> Result<()> {
        let conn = self.catalog.lock().unwrap_or_else(PoisonError::into_inner);
        storage::register_series_name(&conn, name, data_type, kind)
    }
}

/// One unit of derived-column computation.
pub trait ProcessStep: Send + Sync + fmt::Debug {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Numeric columns read by [`compute`](Self::compute).
    fn required_numeric(&self) -> Vec<&str>;

    /// Text columns read by [`compute`](Self::compute).
    fn required_text(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Every column this step reads; used to wire graph edges.
    fn required_columns(&self) -> Vec<&str> {
        let mut all = self.required_numeric();
        all.extend(self.required_text());
        all
    }

    /// Columns written by [`compute`](Self::compute).
    fn outputs(&self) -> Vec<&str>;

    /// A disabled mandatory step fails the whole flight.
    fn is_mandatory(&self) -> bool {
        false
    }

    /// Whether this step makes sense for the airframe.
    fn airframe_is_valid(&self, _airframe: &Airframe) -> bool {
        true
    }

    /// Whether the step has what it needs beyond columns, such as a
    /// configured collaborator.
    fn is_available(&self, _ctx: &StepContext) -> bool {
        true
    }

    /// Compute the outputs and write them into the builder.
    ///
    /// # Errors
    ///
    /// A malformed-flight error disables the steps that depend on this one;
    /// a fatal error aborts the flight.
    fn compute(&self, builder: &FlightBuilder, ctx: &StepContext) -> Result<()>;
}

/// Whether `step` can run: valid airframe, collaborators present, and every
/// required column on the builder.
#[must_use]
pub fn applicable(step: &dyn ProcessStep, builder: &FlightBuilder, ctx: &StepContext) -> bool {
    let airframe = builder.meta().airframe;
    if !step.airframe_is_valid(&airframe) || !step.is_available(ctx) {
        return false;
    }
    let numeric = builder.numeric_names();
    let text = builder.text_names();
    step.required_numeric().iter().all(|c| numeric.contains(*c))
        && step.required_text().iter().all(|c| text.contains(*c))
}

/// Human-readable reason `step` is or is not applicable.
#[must_use]
pub fn explain_applicability(
    step: &dyn ProcessStep,
    builder: &FlightBuilder,
    ctx: &StepContext,
) -> String {
    if applicable(step, builder, ctx) {
        return format!(
            "Step '{}' is applicable: all required columns are present and the airframe is valid",
            step.name()
        );
    }

    let mut reason = format!(
        "Step '{}' cannot be applied for the following reason(s):\n",
        step.name()
    );
    let airframe = builder.meta().airframe;
    if !step.airframe_is_valid(&airframe) {
        let _ = writeln!(reason, "  - airframe '{}' is not valid for this step", airframe.name);
    }
    if !step.is_available(ctx) {
        let _ = writeln!(reason, "  - its collaborators or inputs are not configured");
    }
    for column in step.required_text() {
        if builder.text(column).is_none() {
            let _ = writeln!(reason, "  - the required text column '{column}' is not available");
        }
    }
    for column in step.required_numeric() {
        if builder.numeric(column).is_none() {
            let _ = writeln!(reason, "  - the required numeric column '{column}' is not available");
        }
    }
    reason
}

/// Whether the parser already supplied every output of `step`.
#[must_use]
pub fn already_satisfied(step: &dyn ProcessStep, builder: &FlightBuilder) -> bool {
    let outputs = step.outputs();
    !outputs.is_empty() && outputs.iter().all(|c| builder.has_column(c))
}

/// The standard step set for one flight.
///
/// Some steps size their column contract from what the parser produced (fuel
/// tanks) or from the airframe (divergence groups), so the set is built per
/// builder.
#[must_use]
pub fn default_steps(builder: &FlightBuilder) -> Vec<Arc<dyn ProcessStep>> {
    let airframe = builder.meta().airframe;
    let fuel_tanks: BTreeSet<String> = builder
        .numeric_names()
        .into_iter()
        .filter(|name| name.starts_with(fuel::FUEL_PREFIX))
        .collect();

    let start_end: Arc<dyn ProcessStep> = if airframe.name == SCAN_EAGLE {
        Arc::new(ScanEagleStartEndTime)
    } else {
        Arc::new(StartEndTime)
    };

    vec![
        start_end,
        Arc::new(AltitudeAboveGround),
        Arc::new(LaggedAltitude),
        Arc::new(TotalFuel::new(fuel_tanks.into_iter().collect())),
        Arc::new(Divergence::for_airframe(&airframe.name)),
        Arc::new(StallIndex),
        Arc::new(LossOfControl),
        Arc::new(AirportProximity),
        Arc::new(ComputeItinerary),
    ]
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::builder::FlightBuilder;
    use crate::meta::{Airframe, AirframeKind, FlightMeta};
    use crate::series::{NumericSeries, TextSeries};

    /// A builder for `airframe` with the given numeric columns.
    pub fn builder(airframe: &str, numeric: Vec<NumericSeries>) -> FlightBuilder {
        builder_with_text(airframe, numeric, Vec::new())
    }

    pub fn builder_with_text(
        airframe: &str,
        numeric: Vec<NumericSeries>,
        text: Vec<TextSeries>,
    ) -> FlightBuilder {
        let meta = FlightMeta {
            airframe: Airframe::new(airframe, AirframeKind::FixedWing),
            ..FlightMeta::default()
        };
        FlightBuilder::new(meta, numeric, text)
    }

    pub fn uas_builder(numeric: Vec<NumericSeries>) -> FlightBuilder {
        let meta = FlightMeta {
            airframe: Airframe::new("ScanEagle", AirframeKind::UasFixedWing),
            ..FlightMeta::default()
        };
        FlightBuilder::new(meta, numeric, Vec::new())
    }
}

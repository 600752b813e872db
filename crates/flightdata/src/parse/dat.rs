//! DJI binary telemetry.
//!
//! The binary format is turned into a row table by an external
//! [`BinaryDecoder`]; this module types the columns, rebuilds position and
//! local time, and emits the converted table as a derived file.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use tracing::{debug, info, warn};

use super::csv::split_fields;
use super::{detect_date_time_format, file_stem, DerivedFile, FileParser, ParseContext, ParseOutput};
use crate::airframes::DJI;
use crate::builder::FlightBuilder;
use crate::error::{Error, Result};
use crate::meta::{Airframe, AirframeKind, ProcessingStatus};
use crate::series::{NumericSeries, TextSeries};

/// Attribute carrying the flight controller serial number.
const SERIAL_ATTRIBUTE: &str = "mcID(SN)";

/// Unit labels keyed by the keyword that selects them. The longest keyword
/// contained in a column name wins.
const UNIT_KEYWORDS: &[(&str, &str)] = &[
    ("accel", "m/s^2"),
    ("gyro", "deg/s"),
    ("Gyro", "deg/s"),
    ("vel", "m/s"),
    ("Velocity", "m/s"),
    ("mag", "A/m"),
    ("Longitude", "degrees"),
    ("Latitude", "degrees"),
    ("roll", "degrees"),
    ("pitch", "degrees"),
    ("yaw", "degrees"),
    ("directionOfTravel", "degrees"),
    ("distance", "ft"),
    ("GPS-H", "ft"),
    ("Alti", "ft"),
    ("temperature", "Celsius"),
    ("barometer", "atm"),
    ("Long", "degrees"),
    ("Lat", "degrees"),
    ("height", "ft"),
    ("DOP", "DOP Value"),
    ("Date", "Date"),
    ("Time", "Time"),
    ("sAcc", "cm/s"),
];

/// A decoded binary log: column names plus raw rows.
///
/// Recorder attributes ride along as `key|value` cells in the last column of
/// arbitrary rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedTable {
    /// Column names.
    pub headers: Vec<String>,
    /// Rows of raw cells.
    pub rows: Vec<Vec<String>>,
}

impl DecodedTable {
    /// Read a comma-separated table whose first line holds the column names.
    #[must_use]
    pub fn from_csv(text: &str) -> Self {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let headers = lines
            .next()
            .map(|l| split_fields(l).into_iter().map(|h| h.trim().to_string()).collect())
            .unwrap_or_default();
        Self {
            headers,
            rows: lines.map(split_fields).collect(),
        }
    }

    /// Render back to comma-separated text.
    #[must_use]
    pub fn to_csv(&self) -> String {
        let mut out = self.headers.join(",");
        out.push('\n');
        for row in &self.rows {
            out.push_str(&row.join(","));
            out.push('\n');
        }
        out
    }

    /// The `key|value` attribute side channel.
    #[must_use]
    pub fn attributes(&self) -> HashMap<String, String> {
        self.rows
            .iter()
            .filter_map(|row| row.last())
            .filter_map(|cell| cell.split_once('|'))
            .filter(|(key, value)| !key.trim().is_empty() && !value.trim().is_empty())
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect()
    }

    /// Every cell of column `j`, blank where a row is short.
    fn column_cells(&self, j: usize) -> Vec<&str> {
        self.rows
            .iter()
            .map(|row| row.get(j).map_or("", String::as_str))
            .collect()
    }
}

/// Converts a manufacturer binary log into a row table.
pub trait BinaryDecoder: Send + Sync + std::fmt::Debug {
    /// Decode `bytes` read from `filename`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] when the bytes are not a log this decoder
    /// understands.
    fn decode(&self, filename: &str, bytes: &[u8]) -> Result<DecodedTable>;
}

/// Parser for `.dat` logs.
#[derive(Debug, Clone)]
pub struct DatParser {
    decoder: Arc<dyn BinaryDecoder>,
}

impl DatParser {
    /// Parser that decodes with `decoder`.
    #[must_use]
    pub fn new(decoder: Arc<dyn BinaryDecoder>) -> Self {
        Self { decoder }
    }
}

impl FileParser for DatParser {
    fn name(&self) -> &'static str {
        "dat"
    }

    fn parse(&self, filename: &str, bytes: &[u8], ctx: &ParseContext) -> Result<ParseOutput> {
        let table = self.decoder.decode(filename, bytes)?;
        let derived = DerivedFile {
            name: format!("{}.csv", file_stem(filename)),
            bytes: table.to_csv().into_bytes(),
        };

        let attributes = table.attributes();
        let serial = attributes.get(SERIAL_ATTRIBUTE).ok_or_else(|| {
            info!(file = filename, "binary log carries no serial number");
            Error::fatal("No DJI serial number provided in binary.")
        })?;

        let mut numeric = HashMap::new();
        let mut text = HashMap::new();
        for (j, name) in table.headers.iter().enumerate() {
            let cells = table.column_cells(j);
            match classify_column(name) {
                ColumnKind::Numeric(unit) => {
                    numeric.insert(name.clone(), NumericSeries::from_cells(name.as_str(), unit, &cells));
                }
                ColumnKind::Text(unit) => {
                    text.insert(name.clone(), TextSeries::from_cells(name.as_str(), unit, &cells));
                }
            }
        }

        add_position_columns(&mut numeric)?;

        let start = gps_start_time(&numeric).or_else(|| {
            attributes
                .get("dateTime")
                .and_then(|value| reference_start_time(value))
        });
        let has_local_time = match (start, numeric.get("offsetTime")) {
            (Some(start), Some(offsets)) => {
                for series in local_time_columns(start, offsets) {
                    text.insert(series.name().to_string(), series);
                }
                true
            }
            _ => false,
        };

        numeric.retain(|name, series| {
            let keep = series.valid_count() > 0;
            if !keep {
                debug!(column = %name, "dropping empty column");
            }
            keep
        });
        text.retain(|_, series| series.valid_count() > 0);

        let mut meta = ctx.template_meta(filename);
        meta.md5_hash = blake3::hash(bytes).to_hex().to_string();
        meta.system_id.clone_from(serial);
        meta.airframe = Airframe::new(
            attributes
                .get("ACType")
                .map_or_else(|| DJI.to_string(), |ac| format!("{DJI} {ac}")),
            AirframeKind::UasRotorcraft,
        );

        let builder = FlightBuilder::new(
            meta,
            numeric.into_values().collect(),
            text.into_values().collect(),
        );
        if !has_local_time {
            warn!(file = filename, "could not establish start time for binary log");
            builder.add_warning(Error::malformed(
                "Could not determine the start date and time of the flight",
            ));
            builder.update_status(ProcessingStatus::NO_START_TIME);
        }

        Ok(ParseOutput {
            flights: vec![builder],
            derived_files: vec![derived],
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Numeric(&'static str),
    Text(&'static str),
}

/// Type a decoded column by its category prefix (`CATEGORY(n):TYPE:SUB`).
fn classify_column(name: &str) -> ColumnKind {
    let category = name.split(':').next().unwrap_or(name);
    let category = category.split('(').next().unwrap_or(category);

    let kind = match category {
        "IMU_ATTI" | "IMUEX" => imu_kind(name),
        "GPS" => gps_kind(name),
        "Battery" | "SMART_BATT" => Some(ColumnKind::Numeric(battery_unit(name))),
        "Motor" | "MotorCtrl" => motor_kind(name),
        "RC" => rc_kind(name),
        "AirComp" => air_comp_unit(name).map(ColumnKind::Numeric),
        "General" => Some(ColumnKind::Numeric("ft")),
        "Controller" => Some(ColumnKind::Numeric("level")),
        _ => misc_kind(name),
    };

    kind.unwrap_or_else(|| {
        warn!(column = name, "unknown data type");
        if category == name {
            ColumnKind::Text("N/A")
        } else {
            ColumnKind::Numeric("number")
        }
    })
}

/// Unit whose keyword is the longest one `name` contains.
fn best_unit_match(name: &str) -> Option<&'static str> {
    UNIT_KEYWORDS
        .iter()
        .filter(|(keyword, _)| name.contains(keyword))
        .max_by_key(|(keyword, _)| keyword.len())
        .map(|(_, unit)| *unit)
}

fn imu_kind(name: &str) -> Option<ColumnKind> {
    match best_unit_match(name) {
        Some(unit) => Some(ColumnKind::Numeric(unit)),
        None if name.contains("err") => Some(ColumnKind::Text("error")),
        None if name.contains("num") => Some(ColumnKind::Numeric("number")),
        None => None,
    }
}

fn gps_kind(name: &str) -> Option<ColumnKind> {
    if name.contains("dateTimeStamp") {
        return Some(ColumnKind::Text("yyyy-mm-ddThh:mm:ssZ"));
    }
    match best_unit_match(name) {
        Some(unit) => Some(ColumnKind::Numeric(unit)),
        None if name.contains("num") => Some(ColumnKind::Numeric("number")),
        None => None,
    }
}

fn battery_unit(name: &str) -> &'static str {
    let lower = name.to_lowercase();
    [
        ("volt", "Voltage"),
        ("watts", "Watts"),
        ("current", "Amps"),
        ("cap", "Capacity"),
        ("temp", "Celsius"),
        ("%", "Percentage"),
        ("time", "seconds"),
        ("status", "Battery Status"),
    ]
    .iter()
    .find(|(keyword, _)| lower.contains(keyword))
    .map_or_else(
        || {
            warn!(column = name, "unknown battery data type");
            "number"
        },
        |(_, unit)| *unit,
    )
}

fn motor_kind(name: &str) -> Option<ColumnKind> {
    if name.contains("lowVoltage") {
        return Some(ColumnKind::Text("Low Voltage"));
    }
    if name.contains("status") || name.contains("Status") {
        return Some(ColumnKind::Text("Motor Status"));
    }
    [
        ("V_out", "Voltage"),
        ("Volts", "Voltage"),
        ("Speed", "m/s"),
        ("Current", "Amps"),
        ("PPMrecv", "RC Stop Command"),
        ("Temp", "Celsius"),
        ("Hz", "Hz"),
        ("PWM", "PWM Reading"),
    ]
    .iter()
    .find(|(keyword, _)| name.contains(keyword))
    .map(|(_, unit)| ColumnKind::Numeric(*unit))
}

fn rc_kind(name: &str) -> Option<ColumnKind> {
    if name == "RC:ModeSwitch" {
        return Some(ColumnKind::Text("Mode"));
    }
    ["Aileron", "Elevator", "Rudder", "Throttle"]
        .into_iter()
        .find(|axis| name.contains(axis))
        .map(ColumnKind::Numeric)
}

fn air_comp_unit(name: &str) -> Option<&'static str> {
    if name.contains("AirSpeed") {
        Some("knots")
    } else if name.contains("Alti") {
        Some("ft")
    } else if name.contains("Vel") {
        Some("k/h")
    } else {
        None
    }
}

fn misc_kind(name: &str) -> Option<ColumnKind> {
    Some(match name {
        "Tick#" => ColumnKind::Numeric("tick"),
        "offsetTime" | "flightTime" => ColumnKind::Numeric("seconds"),
        "gpsHealth" => ColumnKind::Numeric("GPS Health"),
        "flyCState" => ColumnKind::Text("C State"),
        "flycCommand" => ColumnKind::Text("Command"),
        "flightAction" => ColumnKind::Text("Action"),
        "nonGPSCause" => ColumnKind::Text("GPS Cause"),
        "connectedToRC" => ColumnKind::Text("Connection"),
        "gpsUsed" | "visionUsed" => ColumnKind::Text("boolean"),
        "Attribute|Value" => ColumnKind::Text("Key-Value Pair"),
        _ => return None,
    })
}

/// Copy the raw GPS columns into `Latitude`, `Longitude` and `AltMSL`.
fn add_position_columns(numeric: &mut HashMap<String, NumericSeries>) -> Result<()> {
    let (Some(lon), Some(lat)) = (numeric.get("GPS(0):Long"), numeric.get("GPS(0):Lat")) else {
        warn!("binary log has no GPS(0):Long or GPS(0):Lat column");
        return Err(Error::fatal("No GPS data found in binary."));
    };

    let longitude = NumericSeries::with_values("Longitude", "degrees", lon.values().to_vec());
    let latitude = NumericSeries::with_values("Latitude", "degrees", lat.values().to_vec());
    let altitude = numeric
        .get("GPS(0):heightMSL")
        .map(|h| NumericSeries::with_values("AltMSL", "ft", h.values().to_vec()));

    numeric.insert("Longitude".to_string(), longitude);
    numeric.insert("Latitude".to_string(), latitude);
    if let Some(altitude) = altitude {
        numeric.insert("AltMSL".to_string(), altitude);
    }
    Ok(())
}

/// Recording start from the first populated GPS date/time sample, moved back
/// by that sample's clock offset.
#[allow(clippy::cast_possible_truncation)]
fn gps_start_time(numeric: &HashMap<String, NumericSeries>) -> Option<NaiveDateTime> {
    let dates = numeric.get("GPS(0):Date")?;
    let times = numeric.get("GPS(0):Time")?;
    let offsets = numeric.get("offsetTime");

    (0..dates.len().min(times.len())).find_map(|i| {
        let (date, time) = (dates.get(i), times.get(i));
        if date.is_nan() || time.is_nan() || date == 0.0 || time == 0.0 {
            return None;
        }
        let (date, time) = (date as u32, time as u32);
        let stamp = NaiveDate::from_ymd_opt(
            i32::try_from(date / 10_000).ok()?,
            (date / 100) % 100,
            date % 100,
        )?
        .and_hms_opt(time / 10_000, (time / 100) % 100, time % 100)?;
        let offset = offsets.map_or(0.0, |o| o.get(i));
        Some(stamp - millis(offset))
    })
}

/// Recording start from the `dateTime` attribute (`yyyy-M-d H:m:s`).
fn reference_start_time(value: &str) -> Option<NaiveDateTime> {
    let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
    let format = detect_date_time_format(&value)?;
    NaiveDateTime::parse_from_str(&value, format).ok()
}

#[allow(clippy::cast_possible_truncation)]
fn millis(seconds: f64) -> Duration {
    if seconds.is_finite() {
        Duration::milliseconds((seconds * 1000.0) as i64)
    } else {
        Duration::zero()
    }
}

/// UTC local-time columns for each clock offset.
fn local_time_columns(start: NaiveDateTime, offsets: &NumericSeries) -> [TextSeries; 3] {
    let mut dates = TextSeries::new("Lcl Date", "yyyy-mm-dd");
    let mut times = TextSeries::new("Lcl Time", "hh:mm:ss");
    let mut utc_offsets = TextSeries::new("UTCOfst", "hh:mm");

    for &offset in offsets.values() {
        if offset.is_finite() {
            let stamp = start + millis(offset);
            dates.push(stamp.format("%Y-%m-%d").to_string());
            times.push(stamp.format("%H:%M:%S").to_string());
            utc_offsets.push("+00:00");
        } else {
            dates.push("");
            times.push("");
            utc_offsets.push("");
        }
    }
    [dates, times, utc_offsets]
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Decoder that reads bytes that are already a converted table.
    #[derive(Debug, Default)]
    pub struct TableDecoder;

    impl BinaryDecoder for TableDecoder {
        fn decode(&self, filename: &str, bytes: &[u8]) -> Result<DecodedTable> {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| Error::decode(filename, e.to_string()))?;
            Ok(DecodedTable::from_csv(text))
        }
    }
}

//! Parrot drone JSON recordings.

use chrono::{DateTime, Duration, FixedOffset};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::{content_hash, FileParser, ParseContext, ParseOutput};
use crate::builder::FlightBuilder;
use crate::error::{Error, Result};
use crate::meta::{Airframe, AirframeKind};
use crate::series::{NumericSeries, TextSeries};
use crate::timezone::format_offset;

const METERS_TO_FEET: f64 = 3.280_84;

/// Layouts of the recording `date` field (`2024-01-05T101500+0100`).
const DATE_FORMATS: &[&str] = &["%Y-%m-%dT%H%M%S%z", "%Y-%m-%dT%H%M%S%:z", "%Y-%m-%dT%H%M%S%#z"];

#[derive(Debug, Deserialize)]
struct Recording {
    date: String,
    details_headers: Vec<String>,
    details_data: Vec<Vec<Value>>,
    #[serde(default)]
    serial_number: Option<String>,
    #[serde(default)]
    controller_model: Option<String>,
}

impl Recording {
    fn column(&self, name: &str) -> Result<Vec<f64>> {
        let index = self
            .details_headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| Error::fatal(format!("JSON flight file has no '{name}' column")))?;
        Ok(self
            .details_data
            .iter()
            .map(|row| row.get(index).and_then(Value::as_f64).unwrap_or(f64::NAN))
            .collect())
    }
}

/// Parser for `.json` recordings.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParser;

impl FileParser for JsonParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn parse(&self, filename: &str, bytes: &[u8], ctx: &ParseContext) -> Result<ParseOutput> {
        let recording: Recording = serde_json::from_slice(bytes)?;
        let start = parse_recording_date(&recording.date)?;

        let times = recording.column("time")?;
        let duration = match (times.first(), times.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        };
        #[allow(clippy::cast_precision_loss)]
        let min_duration = ctx.parsing.json_min_duration_secs as f64;
        if duration.is_nan() || duration < min_duration {
            return Err(Error::fatal(
                "Flight file was less than 3 minutes long, ignoring.",
            ));
        }

        let mut invalid_positions = 0;
        let latitude = bounded(recording.column("product_gps_latitude")?, 90.0, &mut invalid_positions);
        let longitude = bounded(recording.column("product_gps_longitude")?, 180.0, &mut invalid_positions);
        let altitude: Vec<f64> = recording
            .column("altitude")?
            .into_iter()
            .map(|m| m * METERS_TO_FEET)
            .collect();
        let speed = recording.column("speed")?;

        let offset = *start.offset();
        let stamps: Vec<Option<DateTime<FixedOffset>>> = times
            .iter()
            .map(|&t| t.is_finite().then(|| start + seconds(t)))
            .collect();
        let text_column = |name: &str, unit: &str, f: &dyn Fn(&DateTime<FixedOffset>) -> String| {
            TextSeries::with_values(
                name,
                unit,
                stamps.iter().map(|s| s.as_ref().map(f).unwrap_or_default()).collect(),
            )
        };
        let text = vec![
            text_column("Lcl Date", "yyyy-mm-dd", &|s| s.format("%Y-%m-%d").to_string()),
            text_column("Lcl Time", "hh:mm:ss", &|s| s.format("%H:%M:%S").to_string()),
            text_column("UTCOfst", "hh:mm", &|_| format_offset(offset)),
        ];
        let numeric = vec![
            NumericSeries::with_values("Latitude", "degrees", latitude),
            NumericSeries::with_values("Longitude", "degrees", longitude),
            NumericSeries::with_values("AltAGL", "ft", altitude),
            NumericSeries::with_values("GndSpd", "knots", speed),
            NumericSeries::with_values("Time", "seconds", times),
        ];

        let mut meta = ctx.template_meta(filename);
        meta.md5_hash = content_hash([filename]);
        meta.system_id = recording.serial_number.clone().unwrap_or_default();
        meta.suggested_tail_number.clone_from(&recording.serial_number);
        meta.airframe = Airframe::new(
            recording
                .controller_model
                .clone()
                .unwrap_or_else(|| "Unknown".to_string()),
            AirframeKind::UasRotorcraft,
        );

        info!(file = filename, samples = recording.details_data.len(), "parsed JSON recording");
        let builder = FlightBuilder::new(meta, numeric, text);
        if invalid_positions > 0 {
            warn!(file = filename, invalid_positions, "out-of-range coordinates");
            builder.add_warning(Error::malformed(format!(
                "{invalid_positions} coordinates were out of range"
            )));
        }
        Ok(ParseOutput::flights(vec![builder]))
    }
}

/// Replace values outside `[-limit, limit]` with `NaN`, counting them.
fn bounded(values: Vec<f64>, limit: f64, invalid: &mut usize) -> Vec<f64> {
    values
        .into_iter()
        .map(|v| {
            if v.abs() > limit {
                *invalid += 1;
                f64::NAN
            } else {
                v
            }
        })
        .collect()
}

#[allow(clippy::cast_possible_truncation)]
fn seconds(value: f64) -> Duration {
    Duration::milliseconds((value * 1000.0).round() as i64)
}

fn parse_recording_date(value: &str) -> Result<DateTime<FixedOffset>> {
    let value = value.trim();
    let normalized = value.strip_suffix('Z').map(|v| format!("{v}+0000"));
    let value = normalized.as_deref().unwrap_or(value);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(value, fmt).ok())
        .ok_or_else(|| Error::fatal(format!("Could not parse date from JSON file: '{value}'")))
}

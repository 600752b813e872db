//! Flight start and end time.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};

use super::columns::{DID_GPS_TIME, LCL_DATE, LCL_TIME, UTC_OFFSET};
use super::{ProcessStep, StepContext};
use crate::airframes::SCAN_EAGLE;
use crate::builder::FlightBuilder;
use crate::error::{Error, Result};
use crate::meta::{Airframe, ProcessingStatus};
use crate::parse::{detect_date_time_format, join_date_time};

const META_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

/// Sets the flight's start and end time from the first and last fully
/// populated local date, time and offset rows.
///
/// Mandatory: a flight without a usable time span is rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct StartEndTime;

impl ProcessStep for StartEndTime {
    fn name(&self) -> &'static str {
        "start_end_time"
    }

    fn required_numeric(&self) -> Vec<&str> {
        Vec::new()
    }

    fn required_text(&self) -> Vec<&str> {
        vec![LCL_DATE, LCL_TIME, UTC_OFFSET]
    }

    fn outputs(&self) -> Vec<&str> {
        Vec::new()
    }

    fn is_mandatory(&self) -> bool {
        true
    }

    fn airframe_is_valid(&self, airframe: &Airframe) -> bool {
        airframe.name != SCAN_EAGLE
    }

    fn compute(&self, builder: &FlightBuilder, _ctx: &StepContext) -> Result<()> {
        let dates = builder.require_text(LCL_DATE)?;
        let times = builder.require_text(LCL_TIME)?;
        let offsets = builder.require_text(UTC_OFFSET)?;

        let stamp_at = |i: usize| -> Option<DateTime<FixedOffset>> {
            let (date, time, offset) = (dates.get(i), times.get(i), offsets.get(i));
            if date.trim().is_empty() || time.trim().is_empty() || offset.trim().is_empty() {
                return None;
            }
            let joined = join_date_time(date, time);
            let format = detect_date_time_format(&joined)?;
            let naive = NaiveDateTime::parse_from_str(&joined, format).ok()?;
            let offset: FixedOffset = offset.trim().parse().ok()?;
            naive.and_local_timezone(offset).single()
        };

        let len = dates.len().min(times.len()).min(offsets.len());
        let start = (0..len).find_map(stamp_at);
        let end = (0..len).rev().find_map(stamp_at);

        let (Some(start), Some(end)) = (start, end) else {
            builder.update_status(ProcessingStatus::NO_START_TIME | ProcessingStatus::NO_END_TIME);
            return Err(Error::malformed(
                "Date, Time or UTC offset columns were all null! Cannot set start/end times.",
            ));
        };

        if start > end {
            return Err(Error::malformed(format!(
                "Start time of flight ({start}) is after end time ({end})"
            )));
        }

        builder.update_meta(|meta| {
            meta.start_datetime = Some(start.format(META_FORMAT).to_string());
            meta.end_datetime = Some(end.format(META_FORMAT).to_string());
        });
        Ok(())
    }
}

/// Start and end time for ScanEagle logs.
///
/// These logs have no local date columns. The parser takes the date from the
/// file name; this step normalizes it to `YYYY-MM-DD` and, when a
/// `DID_GPS_TIME` column is present, appends its first and last non-blank
/// values.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanEagleStartEndTime;

impl ProcessStep for ScanEagleStartEndTime {
    fn name(&self) -> &'static str {
        "scan_eagle_start_end_time"
    }

    fn required_numeric(&self) -> Vec<&str> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<&str> {
        Vec::new()
    }

    fn is_mandatory(&self) -> bool {
        true
    }

    fn airframe_is_valid(&self, airframe: &Airframe) -> bool {
        airframe.name == SCAN_EAGLE
    }

    fn compute(&self, builder: &FlightBuilder, _ctx: &StepContext) -> Result<()> {
        let meta = builder.meta();
        let Some(raw) = meta.start_datetime.as_deref().map(str::trim).filter(|d| !d.is_empty())
        else {
            builder.update_status(ProcessingStatus::NO_START_TIME | ProcessingStatus::NO_END_TIME);
            return Err(Error::malformed(
                "ScanEagle flight has no date in its file name! Cannot set start/end times.",
            ));
        };
        let date = NaiveDate::parse_from_str(raw, "%Y%m%d")
            .map_or_else(|_| raw.to_string(), |d| d.format("%Y-%m-%d").to_string());

        let (start, end) = match builder.text(DID_GPS_TIME) {
            Some(times) => {
                let stamps: Vec<&str> = times
                    .values()
                    .iter()
                    .map(|t| t.trim())
                    .filter(|t| !t.is_empty())
                    .collect();
                match (stamps.first(), stamps.last()) {
                    (Some(first), Some(last)) => {
                        (format!("{date} {first}"), format!("{date} {last}"))
                    }
                    _ => (date.clone(), date),
                }
            }
            None => (date.clone(), date),
        };

        builder.update_meta(|meta| {
            meta.start_datetime = Some(start);
            meta.end_datetime = Some(end);
        });
        Ok(())
    }
}

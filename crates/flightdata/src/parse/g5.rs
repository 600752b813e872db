//! Garmin G5 and G3X logs.
//!
//! These share the delimited layout but log UTC only. Local date, time and
//! offset columns are synthesized from UTC plus position, and rows with no
//! position are dropped since their offset cannot be known.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use tracing::debug;

use super::csv::{DelimitedTable, HeaderMeta};
use super::{detect_date_time_format, join_date_time, ParseContext, ParseOutput};
use crate::error::{Error, Result};
use crate::series::parse_cell;
use crate::timezone::format_offset;

static G5_PART_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"006-B2304-\d\d").expect("valid regex"));
static G3X_PART_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"006-B1727-[A-Za-z\d]{2}").expect("valid regex"));
static SHORT_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}$").expect("valid regex"));

const REQUIRED_COLUMNS: &[&str] = &["UTC Date", "UTC Time", "Latitude", "Longitude"];

/// UTC columns come first so splitting works before local time exists.
const G5_TIME_COLUMNS: &[(&str, &str)] = &[("UTC Date", "UTC Time"), ("Lcl Date", "Lcl Time")];

/// Whether a delimited log came from a G5 or G3X.
pub(super) fn is_g5(
    filename: &str,
    info_line: &str,
    attributes: &HashMap<String, String>,
    first_row: Option<&Vec<String>>,
) -> bool {
    if filename.contains("G5")
        || G5_PART_NUMBER.is_match(info_line)
        || G3X_PART_NUMBER.is_match(info_line)
    {
        return true;
    }

    attributes.contains_key("serial_number")
        && !attributes.contains_key("system_id")
        && !attributes.contains_key("airframe_name")
        && first_row.is_some_and(|row| row.iter().any(|cell| SHORT_DATE.is_match(cell.trim())))
}

/// Parse a G5/G3X table.
///
/// # Errors
///
/// Fails fatally when a required UTC or position column is missing, or the
/// row counts are corrupt.
pub(super) fn parse(
    filename: &str,
    table: DelimitedTable,
    attributes: &HashMap<String, String>,
    ctx: &ParseContext,
) -> Result<ParseOutput> {
    for column in REQUIRED_COLUMNS {
        if table.column(column).is_none() {
            return Err(Error::fatal(format!(
                "G5 file is missing required column '{column}'"
            )));
        }
    }

    let header = HeaderMeta::from_attributes(attributes, filename, ctx)?;
    let mut table = table.validated()?;
    drop_rows_without_position(&mut table);
    if table.rows.is_empty() {
        return Err(Error::fatal("G5 file has no rows with a position"));
    }

    if table.column("Lcl Date").is_none() {
        synthesize_local_time(&mut table, ctx);
    }

    table.into_output(filename, &header, ctx, G5_TIME_COLUMNS, |builder| {
        builder.with_alias("AltAGL", &["Altitude Above Ground Level"])
    })
}

fn drop_rows_without_position(table: &mut DelimitedTable) {
    let (Some(lat), Some(lon)) = (table.column("Latitude"), table.column("Longitude")) else {
        return;
    };
    let before = table.rows.len();
    table
        .rows
        .retain(|row| !row[lat].trim().is_empty() && !row[lon].trim().is_empty());
    debug!(dropped = before - table.rows.len(), "dropped rows without position");
}

/// Add `Lcl Date`, `Lcl Time` and `UTCOfst` from UTC time and position.
fn synthesize_local_time(table: &mut DelimitedTable, ctx: &ParseContext) {
    let (Some(date), Some(time), Some(lat), Some(lon)) = (
        table.column("UTC Date"),
        table.column("UTC Time"),
        table.column("Latitude"),
        table.column("Longitude"),
    ) else {
        return;
    };

    let stamps: Vec<String> = table
        .rows
        .iter()
        .map(|row| join_date_time(&row[date], &row[time]))
        .collect();
    let format = stamps.iter().find_map(|s| detect_date_time_format(s));

    let mut local_dates = Vec::with_capacity(stamps.len());
    let mut local_times = Vec::with_capacity(stamps.len());
    let mut offsets = Vec::with_capacity(stamps.len());

    for (row, stamp) in table.rows.iter().zip(&stamps) {
        let parsed = format.and_then(|f| NaiveDateTime::parse_from_str(stamp, f).ok());
        if let Some(utc) = parsed {
            let offset = ctx
                .timezone
                .offset_at(parse_cell(&row[lat]), parse_cell(&row[lon]), utc);
            let local = utc + offset;
            local_dates.push(local.format("%Y-%m-%d").to_string());
            local_times.push(local.format("%H:%M:%S").to_string());
            offsets.push(format_offset(offset));
        } else {
            local_dates.push(String::new());
            local_times.push(String::new());
            offsets.push(String::new());
        }
    }

    table.push_column("Lcl Date", "yyy-mm-dd", local_dates);
    table.push_column("Lcl Time", "hh:mm:ss", local_times);
    table.push_column("UTCOfst", "hh:mm", offsets);
}

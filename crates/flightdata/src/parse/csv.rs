//! Delimited-text recorder logs.
//!
//! Garmin-style logs carry three header lines: a `#`-prefixed line of
//! `key=value` recorder attributes, a `#`-prefixed line of units and the
//! column names. ScanEagle logs (`DID_` first line) carry only column names
//! and take their metadata from the file name.

use std::collections::HashMap;
use std::ops::Range;

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use super::{
    content_hash, detect_date_time_format, file_stem, g5, join_date_time, DerivedFile,
    FileParser, ParseContext, ParseOutput,
};
use crate::airframes::{SCAN_EAGLE, UNKNOWN_AIRFRAME};
use crate::builder::FlightBuilder;
use crate::error::{Error, Result};
use crate::meta::{Airframe, AirframeKind, FlightMeta};
use crate::series::{is_numeric_cell, NumericSeries, TextSeries};

/// Rows whose field count mismatches the header that a file may carry.
const MAX_INVALID_ROWS: usize = 2;

/// Parser for `.csv` recorder logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvParser;

impl FileParser for CsvParser {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn parse(&self, filename: &str, bytes: &[u8], ctx: &ParseContext) -> Result<ParseOutput> {
        let text = String::from_utf8_lossy(bytes);
        let mut lines = text.lines();

        let first = lines
            .next()
            .map(|l| l.trim_start_matches('\u{feff}'))
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| Error::fatal("The flight file was empty."))?;

        if first.starts_with("DID_") {
            info!(file = filename, "parsing ScanEagle log");
            return parse_scan_eagle(filename, first, lines, ctx);
        }

        if !first.starts_with('#') && !first.starts_with('{') {
            return Err(Error::fatal(
                "First line of the flight file should begin with a '#' and contain flight recorder information.",
            ));
        }

        let units_line = lines.next().ok_or_else(premature_end)?;
        let header_line = lines.next().ok_or_else(premature_end)?;
        let attributes = parse_attributes(first)?;
        let rows: Vec<Vec<String>> = lines
            .filter(|l| !l.trim().is_empty())
            .map(split_fields)
            .collect();

        let table = DelimitedTable {
            info_line: first.to_string(),
            units: parse_units(units_line),
            headers: parse_headers(header_line),
            rows,
        };

        if g5::is_g5(filename, first, &attributes, table.rows.first()) {
            info!(file = filename, "parsing G5/G3X log");
            return g5::parse(filename, table, &attributes, ctx);
        }

        debug!(file = filename, columns = table.headers.len(), "parsing delimited log");
        let header = HeaderMeta::from_attributes(&attributes, filename, ctx)?;
        let table = table.validated()?;
        table.into_output(filename, &header, ctx, TIME_COLUMNS, |b| b)
    }
}

/// Date/time column pairs tried when splitting, in order.
pub(super) const TIME_COLUMNS: &[(&str, &str)] =
    &[("Lcl Date", "Lcl Time"), ("UTC Date", "UTC Time")];

fn premature_end() -> Error {
    Error::fatal("Stream ended prematurely -- cannot process file.")
}

/// The decoded body of a delimited log.
#[derive(Debug, Clone)]
pub(super) struct DelimitedTable {
    pub info_line: String,
    pub units: Vec<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DelimitedTable {
    /// Position of a named column.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Append a column, filling each row from `cells`.
    pub fn push_column(&mut self, name: &str, unit: &str, cells: Vec<String>) {
        self.headers.push(name.to_string());
        self.units.push(unit.to_string());
        for (row, cell) in self.rows.iter_mut().zip(cells) {
            row.push(cell);
        }
    }

    /// Drop rows whose field count disagrees with the header.
    ///
    /// # Errors
    ///
    /// Fails fatally when no row is valid or more than two are not.
    pub fn validated(mut self) -> Result<Self> {
        let expected = self.headers.len();
        let total = self.rows.len();
        self.rows.retain(|row| row.len() == expected);
        let invalid = total - self.rows.len();

        if self.rows.is_empty() || invalid > MAX_INVALID_ROWS {
            return Err(Error::fatal(
                "Flight has 0 rows, or consecutive malformed rows -- there is a serious problem with the file format.",
            ));
        }
        if invalid > 0 {
            warn!(invalid, "discarded rows with the wrong number of fields");
        }
        Ok(self)
    }

    /// Row ranges separated by time gaps longer than `gap_secs`.
    ///
    /// Uses the first pair in `time_columns` present in the table; with none
    /// the whole table is one segment.
    pub fn segments(&self, time_columns: &[(&str, &str)], gap_secs: u64) -> Vec<Range<usize>> {
        let Some((date, time)) = time_columns
            .iter()
            .find_map(|(d, t)| Some((self.column(d)?, self.column(t)?)))
        else {
            return vec![0..self.rows.len()];
        };

        let stamps: Vec<String> = self
            .rows
            .iter()
            .map(|row| join_date_time(&row[date], &row[time]))
            .collect();
        let Some(format) = stamps.iter().find_map(|s| detect_date_time_format(s)) else {
            warn!("no recognizable date/time in file, keeping it as one flight");
            return vec![0..self.rows.len()];
        };

        split_indices(&stamps, format, gap_secs)
    }

    /// Turn the table into one builder per time segment.
    ///
    /// `decorate` lets a format attach column aliases to every builder.
    pub fn into_output(
        self,
        filename: &str,
        header: &HeaderMeta,
        ctx: &ParseContext,
        time_columns: &[(&str, &str)],
        decorate: impl Fn(FlightBuilder) -> FlightBuilder,
    ) -> Result<ParseOutput> {
        let segments = self.segments(time_columns, ctx.parsing.csv_split_gap_secs);
        let split = segments.len() > 1;
        if split {
            info!(file = filename, segments = segments.len(), "split file on time gaps");
        }

        let stem = file_stem(filename);
        let mut output = ParseOutput::default();
        for (i, range) in segments.into_iter().enumerate() {
            let rows = &self.rows[range];
            let mut meta = header.meta.clone();
            meta.md5_hash = content_hash(rows.iter().flatten().map(String::as_str));

            if split {
                let name = format!("{stem}_{i}.csv");
                output.derived_files.push(DerivedFile {
                    name: name.clone(),
                    bytes: self.render(rows).into_bytes(),
                });
                meta.filename = name;
            }

            let builder = decorate(self.segment_builder(meta, rows));
            for message in &header.warnings {
                builder.add_warning(Error::malformed(message.clone()));
            }
            output.flights.push(builder);
        }
        Ok(output)
    }

    /// One builder over `rows`, typing each column by its first non-empty cell.
    fn segment_builder(&self, meta: FlightMeta, rows: &[Vec<String>]) -> FlightBuilder {
        let mut numeric = Vec::new();
        let mut text = Vec::new();

        for (j, name) in self.headers.iter().enumerate() {
            let cells: Vec<&str> = rows.iter().map(|r| r[j].as_str()).collect();
            let unit = self.units.get(j).map_or("", String::as_str);
            let is_numeric = cells
                .iter()
                .find(|c| !c.trim().is_empty())
                .is_some_and(|c| is_numeric_cell(c));
            if is_numeric {
                numeric.push(NumericSeries::from_cells(name.as_str(), unit, &cells));
            } else {
                text.push(TextSeries::from_cells(name.as_str(), unit, &cells));
            }
        }

        FlightBuilder::new(meta, numeric, text)
    }

    /// Serialize the header lines and `rows` back to delimited text.
    fn render(&self, rows: &[Vec<String>]) -> String {
        let mut out = String::new();
        out.push_str(&self.info_line);
        out.push('\n');
        out.push('#');
        out.push_str(&join_fields(&self.units));
        out.push('\n');
        out.push_str(&join_fields(&self.headers));
        out.push('\n');
        for row in rows {
            out.push_str(&join_fields(row));
            out.push('\n');
        }
        out
    }
}

/// Indices where a new flight starts, as ranges over `stamps`.
///
/// Rows whose stamp does not parse never start a segment.
fn split_indices(stamps: &[String], format: &str, gap_secs: u64) -> Vec<Range<usize>> {
    let gap_ms = i64::try_from(gap_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
    let mut starts = vec![0];
    let mut last: Option<NaiveDateTime> = None;

    for (i, stamp) in stamps.iter().enumerate() {
        let Ok(current) = NaiveDateTime::parse_from_str(stamp, format) else {
            debug!(row = i, stamp = %stamp, "skipping unparsable timestamp");
            continue;
        };
        if let Some(previous) = last {
            if (current - previous).num_milliseconds().abs() > gap_ms {
                starts.push(i);
            }
        }
        last = Some(current);
    }

    let mut ranges = Vec::with_capacity(starts.len());
    for (k, &start) in starts.iter().enumerate() {
        let end = starts.get(k + 1).copied().unwrap_or(stamps.len());
        ranges.push(start..end);
    }
    ranges
}

/// Metadata from the attribute line, shared by every segment.
#[derive(Debug, Clone)]
pub(super) struct HeaderMeta {
    pub meta: FlightMeta,
    /// Problems to attach to every flight from this file.
    pub warnings: Vec<String>,
}

impl HeaderMeta {
    /// Resolve airframe and system id from recorder attributes.
    ///
    /// # Errors
    ///
    /// Fails fatally for airframes of unknown category.
    pub fn from_attributes(
        attributes: &HashMap<String, String>,
        filename: &str,
        ctx: &ParseContext,
    ) -> Result<Self> {
        let mut meta = ctx.template_meta(filename);
        let mut warnings = Vec::new();

        match attributes.get("airframe_name") {
            Some(name) => meta.airframe = ctx.airframes.resolve(name)?,
            None => {
                warn!(file = filename, "airframe_name is missing, using placeholder airframe");
                warnings.push(format!(
                    "airframe_name missing from header, using '{UNKNOWN_AIRFRAME}'"
                ));
                meta.airframe = Airframe::new(UNKNOWN_AIRFRAME, AirframeKind::FixedWing);
            }
        }

        meta.system_id = if let Some(id) = attributes.get("system_id") {
            id.clone()
        } else if let Some(serial) = attributes.get("serial_number") {
            warn!(file = filename, serial = %serial, "system_id is missing, using serial_number");
            warnings.push("system_id missing from header, using serial_number".to_string());
            serial.clone()
        } else {
            warn!(file = filename, "system_id and serial_number are missing");
            warnings.push("system_id missing from header".to_string());
            "Unknown".to_string()
        };

        Ok(Self { meta, warnings })
    }
}

/// Parse the `key=value` recorder attribute line.
///
/// The leading token (`#airframe_info` and similar) is skipped.
///
/// # Errors
///
/// Fails fatally when a pair has no `=`.
pub(super) fn parse_attributes(line: &str) -> Result<HashMap<String, String>> {
    let line = line.replace('"', "");
    let mut values = HashMap::new();
    for part in line.split(',').skip(1) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (key, value) = part.split_once('=').ok_or_else(|| {
            Error::fatal("Flight information line was not properly formed with key value pairs.")
        })?;
        values.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(values)
}

/// Units from the second header line, keeping only parenthesized content.
fn parse_units(line: &str) -> Vec<String> {
    let line = line.strip_prefix('#').unwrap_or(line);
    split_fields(line)
        .into_iter()
        .map(|unit| unit_inside_parentheses(unit.trim()).to_string())
        .collect()
}

fn parse_headers(line: &str) -> Vec<String> {
    split_fields(line)
        .into_iter()
        .enumerate()
        .map(|(j, name)| {
            let name = name.trim();
            if name.is_empty() {
                format!("Unnamed Column {j}")
            } else {
                name.to_string()
            }
        })
        .collect()
}

/// `"Latitude (deg)"` gives `deg`; text without parentheses passes through.
pub(super) fn unit_inside_parentheses(input: &str) -> &str {
    input
        .split_once('(')
        .and_then(|(_, rest)| rest.split_once(')'))
        .map(|(inner, _)| inner)
        .filter(|inner| !inner.is_empty())
        .unwrap_or(input)
}

/// Split one line on commas, honouring double-quoted fields.
pub(super) fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

fn join_fields(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| {
            if f.contains(',') || f.contains('"') {
                format!("\"{}\"", f.replace('"', "\"\""))
            } else {
                f.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// ScanEagle logs: column names on line one, metadata in the file name
/// (`<date>_<id>_...`).
fn parse_scan_eagle<'a>(
    filename: &str,
    header_line: &str,
    lines: impl Iterator<Item = &'a str>,
    ctx: &ParseContext,
) -> Result<ParseOutput> {
    let stem = file_stem(filename);
    let mut parts = stem.split('_');
    let (Some(date), Some(id)) = (parts.next(), parts.next()) else {
        return Err(Error::fatal(format!(
            "ScanEagle file name '{filename}' does not carry a date and id"
        )));
    };
    let tail = format!("N{id}ND");

    let mut meta = ctx.template_meta(filename);
    meta.start_datetime = Some(date.to_string());
    meta.end_datetime = Some(date.to_string());
    meta.suggested_tail_number = Some(tail.clone());
    meta.system_id = tail;
    meta.airframe = Airframe::new(SCAN_EAGLE, AirframeKind::UasFixedWing);

    let headers: Vec<String> = split_fields(header_line)
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();
    let table = DelimitedTable {
        info_line: header_line.to_string(),
        units: vec!["none".to_string(); headers.len()],
        headers,
        rows: lines
            .filter(|l| !l.trim().is_empty())
            .map(split_fields)
            .collect(),
    }
    .validated()?;

    meta.md5_hash = content_hash(table.rows.iter().flatten().map(String::as_str));
    Ok(ParseOutput::flights(vec![table.segment_builder(meta, &table.rows)]))
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// A G1000-style log with `rows` one-second samples, and `gap_after`
    /// rows followed by a 600 s pause.
    pub fn g1000_log(rows: usize, gap_after: Option<usize>) -> String {
        let mut out = String::from(
            "#airframe_info, log_version=\"1.00\", airframe_name=\"Cessna 172S\", system_id=\"N123\"\n\
             #yyy-mm-dd, hh:mm:ss, hh:mm, degrees, degrees, ft Baro, kt\n\
             Lcl Date, Lcl Time, UTCOfst, Latitude, Longitude, AltMSL, IAS\n",
        );
        let mut seconds = 0u32;
        for i in 0..rows {
            if gap_after == Some(i) {
                seconds += 600;
            }
            out.push_str(&format!(
                "2024-01-05, {:02}:{:02}:{:02}, -06:00, 44.{:02}, -93.5, {}, 90\n",
                10 + seconds / 3600,
                (seconds / 60) % 60,
                seconds % 60,
                i,
                1000 + i
            ));
            seconds += 1;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::testing::context;

    #[test]
    fn test_single_flight() {
        let log = fixtures::g1000_log(12, None);
        let out = CsvParser
            .parse("log_240105.csv", log.as_bytes(), &context())
            .expect("parses");
        assert_eq!(out.flights.len(), 1);
        assert!(out.derived_files.is_empty());

        let flight = &out.flights[0];
        assert_eq!(flight.len(), 12);
        let meta = flight.meta();
        assert_eq!(meta.system_id, "N123");
        assert_eq!(meta.airframe.name, "Cessna 172S");
        assert_eq!(meta.filename, "log_240105.csv");
        assert_eq!(meta.fleet_id, 1);
        assert!(flight.numeric("AltMSL").is_some());
        assert!(flight.text("Lcl Date").is_some());
        assert_eq!(flight.numeric("AltMSL").expect("alt").data_type(), "ft Baro");
    }

    #[test]
    fn test_split_on_gap_yields_ten_and_ten() {
        let log = fixtures::g1000_log(20, Some(10));
        let out = CsvParser
            .parse("log_240105.csv", log.as_bytes(), &context())
            .expect("parses");
        assert_eq!(out.flights.len(), 2);
        assert_eq!(out.flights[0].len(), 10);
        assert_eq!(out.flights[1].len(), 10);

        let second = out.flights[1].numeric("AltMSL").expect("alt");
        assert!((second.get(0) - 1010.0).abs() < f64::EPSILON);

        assert_eq!(out.derived_files.len(), 2);
        assert_eq!(out.derived_files[0].name, "log_240105_0.csv");
        assert_eq!(out.flights[1].meta().filename, "log_240105_1.csv");
        let derived = String::from_utf8(out.derived_files[1].bytes.clone()).expect("utf8");
        assert_eq!(derived.lines().count(), 3 + 10);
        assert_ne!(out.flights[0].meta().md5_hash, out.flights[1].meta().md5_hash);
    }

    #[test]
    fn test_one_gap_gives_two_segments_at_gap() {
        let table = DelimitedTable {
            info_line: String::new(),
            units: vec![String::new(); 2],
            headers: vec!["Lcl Date".into(), "Lcl Time".into()],
            rows: ["10:00:00", "10:00:01", "10:07:00", "10:07:01", "10:07:02"]
                .iter()
                .map(|t| vec!["2024-01-05".to_string(), (*t).to_string()])
                .collect(),
        };
        assert_eq!(table.segments(TIME_COLUMNS, 300), vec![0..2, 2..5]);
    }

    #[test]
    fn test_unparsable_rows_never_split() {
        let stamps: Vec<String> = ["2024-01-05 10:00:00", "garbage", "2024-01-05 10:00:02"]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(split_indices(&stamps, "%Y-%m-%d %H:%M:%S", 300), vec![0..3]);
    }

    #[test]
    fn test_no_time_columns_is_one_segment() {
        let log = "#airframe_info, airframe_name=Cessna 172S, system_id=X\n#ft, kt\nAltMSL, IAS\n1,2\n3,4\n";
        let out = CsvParser
            .parse("x.csv", log.as_bytes(), &context())
            .expect("parses");
        assert_eq!(out.flights.len(), 1);
        assert_eq!(out.flights[0].len(), 2);
    }

    #[test]
    fn test_bad_first_line_is_fatal() {
        let err = CsvParser
            .parse("x.csv", b"garbage\n#u\nA\n1\n", &context())
            .expect_err("bad sigil");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("should begin with a '#'"));
    }

    #[test]
    fn test_empty_file_is_fatal() {
        assert!(CsvParser.parse("x.csv", b"", &context()).is_err());
    }

    #[test]
    fn test_malformed_key_value_is_fatal() {
        let log = "#airframe_info, airframe_name=Cessna 172S, broken\n#u\nA\n1\n";
        let err = CsvParser
            .parse("x.csv", log.as_bytes(), &context())
            .expect_err("broken pair");
        assert!(err.to_string().contains("key value pairs"));
    }

    #[test]
    fn test_unknown_airframe_is_fatal() {
        let log = "#airframe_info, airframe_name=Sopwith Camel, system_id=X\n#u\nA\n1\n";
        let err = CsvParser
            .parse("x.csv", log.as_bytes(), &context())
            .expect_err("unknown airframe");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_missing_airframe_and_system_id_warn() {
        let log = "#airframe_info, serial_number=SN9\n#u,u\nA,B\n1,2\n";
        let out = CsvParser
            .parse("x.csv", log.as_bytes(), &context())
            .expect("parses with warnings");
        let flight = &out.flights[0];
        let meta = flight.meta();
        assert_eq!(meta.airframe.name, UNKNOWN_AIRFRAME);
        assert_eq!(meta.system_id, "SN9");
        assert_eq!(flight.warning_count(), 2);
        assert!(meta.status.is_warning());
    }

    #[test]
    fn test_row_count_corruption() {
        let header = "#airframe_info, airframe_name=Cessna 172S, system_id=X\n#u,u\nA,B\n";
        let two_bad = format!("{header}1,2\n3\n4\n5,6\n");
        let out = CsvParser
            .parse("x.csv", two_bad.as_bytes(), &context())
            .expect("two bad rows tolerated");
        assert_eq!(out.flights[0].len(), 2);

        let three_bad = format!("{header}1,2\n3\n4\n5\n");
        assert!(CsvParser.parse("x.csv", three_bad.as_bytes(), &context()).is_err());

        let none_valid = format!("{header}3\n");
        assert!(CsvParser.parse("x.csv", none_valid.as_bytes(), &context()).is_err());
    }

    #[test]
    fn test_column_typing_uses_first_non_empty_cell() {
        let log = "#airframe_info, airframe_name=Cessna 172S, system_id=X\n#u,u\nA,B\n,x\n5,y\n";
        let out = CsvParser
            .parse("x.csv", log.as_bytes(), &context())
            .expect("parses");
        let flight = &out.flights[0];
        let a = flight.numeric("A").expect("numeric");
        assert!(a.get(0).is_nan());
        assert!((a.get(1) - 5.0).abs() < f64::EPSILON);
        assert_eq!(flight.text("B").expect("text").get(1), "y");
    }

    #[test]
    fn test_scan_eagle_metadata_from_filename() {
        let log = "DID_1, Time, Alt\n1, 2, 3\n4, 5, 6\n";
        let out = CsvParser
            .parse("20190403_42_telemetry.csv", log.as_bytes(), &context())
            .expect("parses");
        let meta = out.flights[0].meta();
        assert_eq!(meta.start_datetime.as_deref(), Some("20190403"));
        assert_eq!(meta.suggested_tail_number.as_deref(), Some("N42ND"));
        assert_eq!(meta.system_id, "N42ND");
        assert_eq!(meta.airframe.kind, AirframeKind::UasFixedWing);
        assert_eq!(out.flights[0].numeric("Alt").expect("alt").data_type(), "none");
    }

    #[test]
    fn test_split_fields_quotes() {
        assert_eq!(split_fields(r#"a,"b,c","d""e""#), vec!["a", "b,c", "d\"e"]);
        assert_eq!(split_fields("a,,b"), vec!["a", "", "b"]);
    }

    #[test]
    fn test_unit_inside_parentheses() {
        assert_eq!(unit_inside_parentheses("UTC Date (yyyy-mm-dd)"), "yyyy-mm-dd");
        assert_eq!(unit_inside_parentheses("ft Baro"), "ft Baro");
    }
}

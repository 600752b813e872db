//! Format parsers.
//!
//! Each recorder format has a [`FileParser`] that turns raw bytes into one or
//! more [`FlightBuilder`]s. Parsers are looked up by file extension through a
//! [`ParserRegistry`] built for each pipeline run.
//!
//! A small set of structural problems (bad header, missing mandatory columns,
//! unknown airframe, corrupt row counts) are fatal and reject the file; any
//! other problem is attached to the flight as a warning.

pub mod csv;
pub mod dat;
pub mod g5;
pub mod gpx;
pub mod json;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::airframes::AirframeRegistry;
use crate::builder::FlightBuilder;
use crate::config::ParsingConfig;
use crate::error::{Error, Result};
use crate::meta::FlightMeta;
use crate::timezone::{NauticalTimezone, TimezoneLookup};

pub use csv::CsvParser;
pub use dat::{BinaryDecoder, DatParser, DecodedTable};
pub use gpx::GpxParser;
pub use json::JsonParser;

/// A file produced while parsing, stored beside the original upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedFile {
    /// File name within the derived upload.
    pub name: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// Everything a parser produced for one input file.
#[derive(Debug, Default)]
pub struct ParseOutput {
    /// One builder per flight found in the file.
    pub flights: Vec<FlightBuilder>,
    /// Files to hand to the derived-file sink.
    pub derived_files: Vec<DerivedFile>,
}

impl ParseOutput {
    /// Output holding just `flights`.
    #[must_use]
    pub fn flights(flights: Vec<FlightBuilder>) -> Self {
        Self {
            flights,
            derived_files: Vec::new(),
        }
    }
}

/// Upload-level context shared by every parser call.
#[derive(Debug, Clone)]
pub struct ParseContext {
    /// Owning fleet.
    pub fleet_id: i64,
    /// User who uploaded the archive.
    pub uploader_id: i64,
    /// Upload the entries came from.
    pub upload_id: i64,
    /// Airframe alias and category tables.
    pub airframes: Arc<AirframeRegistry>,
    /// Local-offset lookup for UTC-only recorders.
    pub timezone: Arc<dyn TimezoneLookup>,
    /// Parser thresholds.
    pub parsing: ParsingConfig,
}

impl Default for ParseContext {
    fn default() -> Self {
        Self {
            fleet_id: 0,
            uploader_id: 0,
            upload_id: 0,
            airframes: Arc::new(AirframeRegistry::default()),
            timezone: Arc::new(NauticalTimezone),
            parsing: ParsingConfig::default(),
        }
    }
}

impl ParseContext {
    /// Metadata template carrying the upload identifiers.
    #[must_use]
    pub fn template_meta(&self, filename: &str) -> FlightMeta {
        FlightMeta {
            fleet_id: self.fleet_id,
            uploader_id: self.uploader_id,
            upload_id: self.upload_id,
            filename: filename.to_string(),
            ..FlightMeta::default()
        }
    }
}

/// Parses one recorder file format.
pub trait FileParser: Send + Sync + std::fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Parse `bytes` read from `filename`.
    ///
    /// # Errors
    ///
    /// Returns a fatal error when the file cannot yield any flight.
    fn parse(&self, filename: &str, bytes: &[u8], ctx: &ParseContext) -> Result<ParseOutput>;
}

/// Parsers keyed by lowercase file extension.
#[derive(Debug, Clone, Default)]
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn FileParser>>,
}

impl ParserRegistry {
    /// Registry with no parsers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the delimited-text, GPX and JSON parsers, plus the
    /// binary parser when a decoder is available.
    #[must_use]
    pub fn with_defaults(decoder: Option<Arc<dyn BinaryDecoder>>) -> Self {
        let mut registry = Self::new();
        registry.register("csv", Arc::new(CsvParser));
        registry.register("gpx", Arc::new(GpxParser));
        registry.register("json", Arc::new(JsonParser));
        if let Some(decoder) = decoder {
            registry.register("dat", Arc::new(DatParser::new(decoder)));
        }
        registry
    }

    /// Register `parser` for `extension`, replacing any previous one.
    pub fn register(&mut self, extension: &str, parser: Arc<dyn FileParser>) {
        self.parsers.insert(extension.to_ascii_lowercase(), parser);
    }

    /// Parser for `filename`'s extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownFileType`] when no parser is registered.
    pub fn parser_for(&self, filename: &str) -> Result<Arc<dyn FileParser>> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        self.parsers
            .get(&extension)
            .cloned()
            .ok_or(Error::UnknownFileType { extension })
    }
}

/// Hex BLAKE3 digest over a sequence of text parts, concatenated.
#[must_use]
pub fn content_hash<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// `name` without directories or extension.
#[must_use]
pub fn file_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
        .to_string()
}

/// Date-time layouts recorders use, tried in order.
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m-%d-%Y %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S%.f",
];

/// Join a date and time cell into one normalized string.
#[must_use]
pub fn join_date_time(date: &str, time: &str) -> String {
    format!("{} {}", date.trim(), time.trim())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First known layout that parses `value`.
#[must_use]
pub fn detect_date_time_format(value: &str) -> Option<&'static str> {
    DATE_TIME_FORMATS
        .iter()
        .copied()
        .find(|fmt| NaiveDateTime::parse_from_str(value, fmt).is_ok())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Context with default tables and thresholds.
    pub fn context() -> ParseContext {
        ParseContext {
            fleet_id: 1,
            uploader_id: 2,
            upload_id: 3,
            ..ParseContext::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_dispatch_by_extension() {
        let registry = ParserRegistry::with_defaults(None);
        assert_eq!(registry.parser_for("a/b/log.CSV").expect("csv").name(), "csv");
        assert_eq!(registry.parser_for("track.gpx").expect("gpx").name(), "gpx");
        assert_eq!(registry.parser_for("drone.json").expect("json").name(), "json");
    }

    #[test]
    fn test_registry_unknown_extension() {
        let registry = ParserRegistry::with_defaults(None);
        let err = registry.parser_for("FLY001.DAT").expect_err("no decoder");
        assert_eq!(
            err.to_string(),
            "Unknown file type 'dat' contained in zip file."
        );
        assert!(matches!(
            registry.parser_for("notes"),
            Err(Error::UnknownFileType { .. })
        ));
    }

    #[test]
    fn test_content_hash_identity() {
        let a = content_hash(["1", "2", "3"]);
        let b = content_hash(["1", "2", "3"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_hash(["1", "2", "4"]));
    }

    #[test]
    fn test_template_meta() {
        let meta = testing::context().template_meta("log.csv");
        assert_eq!(meta.fleet_id, 1);
        assert_eq!(meta.uploader_id, 2);
        assert_eq!(meta.upload_id, 3);
        assert_eq!(meta.filename, "log.csv");
    }

    #[test]
    fn test_detect_date_time_format() {
        assert_eq!(
            detect_date_time_format("2024-01-05 10:00:00"),
            Some("%Y-%m-%d %H:%M:%S")
        );
        assert_eq!(
            detect_date_time_format("1/5/2024 10:00:00"),
            Some("%m/%d/%Y %H:%M:%S")
        );
        assert_eq!(
            detect_date_time_format("2024/1/5 9:05:00"),
            Some("%Y/%m/%d %H:%M:%S")
        );
        assert_eq!(detect_date_time_format("yesterday"), None);
    }

    #[test]
    fn test_join_date_time_normalizes_whitespace() {
        assert_eq!(join_date_time(" 2024-01-05 ", "  10:00:00"), "2024-01-05 10:00:00");
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("dir/log_240105.csv"), "log_240105");
        assert_eq!(file_stem("plain"), "plain");
    }
}

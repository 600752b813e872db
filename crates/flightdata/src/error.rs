//! Error types for flightdata.
//!
//! This module defines all error types used throughout the flightdata crate.
//! Every variant belongs to one of three severities (see [`Severity`]): fatal
//! conditions abort a whole file or flight, recoverable conditions degrade a
//! flight to "warning" status, and infrastructure conditions abort only the
//! file that triggered them.

use std::path::PathBuf;
use thiserror::Error;

/// How an error affects the flight or file that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Aborts the whole file or flight; no partial flight is emitted.
    Fatal,
    /// The flight is still emitted, tagged with a warning.
    Recoverable,
    /// Connection or I/O failure; aborts the current file only.
    Infrastructure,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fatal => write!(f, "fatal"),
            Self::Recoverable => write!(f, "recoverable"),
            Self::Infrastructure => write!(f, "infrastructure"),
        }
    }
}

/// The main error type for flightdata operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Flight File Errors ===
    /// The file is structurally unusable and must be rejected.
    #[error("fatal flight file error: {message}")]
    FatalFlightFile {
        /// Description of what went wrong.
        message: String,
    },

    /// A data-quality problem that degrades, but does not abort, a flight.
    #[error("malformed flight file: {message}")]
    MalformedFlightFile {
        /// Description of what went wrong.
        message: String,
    },

    /// No parser is registered for the file's extension.
    #[error("Unknown file type '{extension}' contained in zip file.")]
    UnknownFileType {
        /// The lowercase extension that was not recognized.
        extension: String,
    },

    /// The external binary decoder could not convert a file.
    #[error("failed to decode binary file '{filename}': {message}")]
    Decode {
        /// Name of the file being decoded.
        filename: String,
        /// Description of what went wrong.
        message: String,
    },

    /// XML could not be read.
    #[error("XML error: {0}")]
    Xml(String),

    // === Terrain Errors ===
    /// No elevation data exists for the requested coordinate.
    #[error("terrain unavailable at ({lat}, {lon}): {reason}")]
    TerrainUnavailable {
        /// Requested latitude.
        lat: f64,
        /// Requested longitude.
        lon: f64,
        /// Why the lookup failed.
        reason: String,
    },

    // === Dependency Graph Errors ===
    /// Two steps claim ownership of the same output column.
    #[error("steps '{first}' and '{second}' both produce column '{column}'")]
    DuplicateOutputColumn {
        /// The contested column.
        column: String,
        /// The step registered first.
        first: String,
        /// The step that tried to claim the column again.
        second: String,
    },

    /// The step graph contains a cycle.
    #[error("dependency cycle detected among steps: {}", .steps.join(", "))]
    DependencyCycle {
        /// Steps that could not be ordered.
        steps: Vec<String>,
    },

    /// A mandatory step depends on a step that is allowed to be skipped.
    #[error("mandatory step '{mandatory}' requires optional step '{optional}'")]
    OptionalDependency {
        /// The mandatory consumer.
        mandatory: String,
        /// The optional producer.
        optional: String,
    },

    /// Processing a flight produced one or more fatal errors.
    #[error("flight processing failed: {}", join_messages(.errors))]
    FlightFailed {
        /// Every fatal error collected while running the step graph.
        errors: Vec<Error>,
    },

    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for flightdata operations.
pub type Result<T> = std::result::Result<T, Error>;

fn join_messages(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Self::Xml(err.to_string())
    }
}

impl Error {
    /// Create a new fatal flight-file error.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::FatalFlightFile {
            message: message.into(),
        }
    }

    /// Create a new recoverable malformed-flight error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedFlightFile {
            message: message.into(),
        }
    }

    /// Create a terrain unavailable error.
    #[must_use]
    pub fn terrain_unavailable(lat: f64, lon: f64, reason: impl Into<String>) -> Self {
        Self::TerrainUnavailable {
            lat,
            lon,
            reason: reason.into(),
        }
    }

    /// Create a binary decoder error.
    #[must_use]
    pub fn decode(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Classify this error.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::MalformedFlightFile { .. } | Self::TerrainUnavailable { .. } => {
                Severity::Recoverable
            }
            Self::DatabaseOpen { .. }
            | Self::DatabaseQuery(_)
            | Self::DatabaseMigration { .. }
            | Self::Io(_)
            | Self::DirectoryCreate { .. }
            | Self::Internal(_) => Severity::Infrastructure,
            _ => Severity::Fatal,
        }
    }

    /// Check if this error aborts the flight or file that raised it.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.severity() != Severity::Recoverable
    }

    /// Check if this error only degrades the flight to warning status.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.severity() == Severity::Recoverable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::fatal("header line was empty");
        assert_eq!(
            err.to_string(),
            "fatal flight file error: header line was empty"
        );

        let err = Error::malformed("missing column");
        assert_eq!(err.to_string(), "malformed flight file: missing column");
    }

    #[test]
    fn test_unknown_file_type_display() {
        let err = Error::UnknownFileType {
            extension: "bin".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unknown file type 'bin' contained in zip file."
        );
    }

    #[test]
    fn test_severity_classification() {
        assert_eq!(Error::fatal("x").severity(), Severity::Fatal);
        assert_eq!(Error::malformed("x").severity(), Severity::Recoverable);
        assert_eq!(
            Error::terrain_unavailable(91.0, 0.0, "out of range").severity(),
            Severity::Recoverable
        );
        assert_eq!(Error::internal("x").severity(), Severity::Infrastructure);
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(Error::from(io_err).severity(), Severity::Infrastructure);
    }

    #[test]
    fn test_is_fatal_and_recoverable() {
        assert!(Error::fatal("x").is_fatal());
        assert!(!Error::fatal("x").is_recoverable());
        assert!(Error::malformed("x").is_recoverable());
        assert!(!Error::malformed("x").is_fatal());
        assert!(Error::internal("x").is_fatal());
    }

    #[test]
    fn test_duplicate_output_display() {
        let err = Error::DuplicateOutputColumn {
            column: "AltAGL".to_string(),
            first: "ComputeAltAGL".to_string(),
            second: "OtherStep".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("AltAGL"));
        assert!(msg.contains("ComputeAltAGL"));
        assert!(msg.contains("OtherStep"));
    }

    #[test]
    fn test_cycle_display() {
        let err = Error::DependencyCycle {
            steps: vec!["A".to_string(), "B".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "dependency cycle detected among steps: A, B"
        );
    }

    #[test]
    fn test_flight_failed_joins_messages() {
        let err = Error::FlightFailed {
            errors: vec![Error::fatal("one"), Error::fatal("two")],
        };
        let msg = err.to_string();
        assert!(msg.contains("one"));
        assert!(msg.contains("two"));
        assert!(msg.contains("; "));
    }

    #[test]
    fn test_terrain_unavailable_display() {
        let err = Error::terrain_unavailable(91.0, -93.0, "latitude out of range");
        let msg = err.to_string();
        assert!(msg.contains("91"));
        assert!(msg.contains("latitude out of range"));
    }

    #[test]
    fn test_decode_error_display() {
        let err = Error::decode("flight.DAT", "truncated record");
        let msg = err.to_string();
        assert!(msg.contains("flight.DAT"));
        assert!(msg.contains("truncated record"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
            assert_eq!(err.severity(), Severity::Fatal);
        }
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "max_tiles must be greater than 0".to_string(),
        };
        assert!(err.to_string().contains("max_tiles"));
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Fatal.to_string(), "fatal");
        assert_eq!(Severity::Recoverable.to_string(), "recoverable");
        assert_eq!(Severity::Infrastructure.to_string(), "infrastructure");
    }
}

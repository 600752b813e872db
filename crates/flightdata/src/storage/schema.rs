//! `SQLite` schema definitions for flightdata.
//!
//! Flights, their series, itinerary legs and warnings, plus the catalog of
//! series names steps register while processing.

/// SQL statement to create the flights table.
pub const CREATE_FLIGHTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS flights (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fleet_id INTEGER NOT NULL,
    uploader_id INTEGER NOT NULL,
    upload_id INTEGER NOT NULL,
    system_id TEXT NOT NULL,
    suggested_tail_number TEXT,
    airframe_name TEXT NOT NULL,
    airframe_type TEXT NOT NULL,
    start_time TEXT,
    end_time TEXT,
    filename TEXT NOT NULL,
    md5_hash TEXT NOT NULL UNIQUE,
    status INTEGER NOT NULL,
    number_rows INTEGER NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)
";

/// SQL statement to create an index on `upload_id`.
pub const CREATE_UPLOAD_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_flights_upload ON flights(upload_id)
";

/// SQL statement to create the catalog of series names.
pub const CREATE_SERIES_NAMES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS series_names (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    data_type TEXT NOT NULL,
    UNIQUE (name, kind)
)
";

/// SQL statement to create the numeric series table.
///
/// Samples are little-endian `f64`s so `NaN` survives the round trip.
pub const CREATE_DOUBLE_SERIES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS double_series (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    flight_id INTEGER NOT NULL REFERENCES flights(id) ON DELETE CASCADE,
    name_id INTEGER NOT NULL REFERENCES series_names(id),
    data_type TEXT NOT NULL,
    length INTEGER NOT NULL,
    valid_length INTEGER NOT NULL,
    min REAL,
    avg REAL,
    max REAL,
    data BLOB NOT NULL
)
";

/// SQL statement to create the text series table.
pub const CREATE_STRING_SERIES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS string_series (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    flight_id INTEGER NOT NULL REFERENCES flights(id) ON DELETE CASCADE,
    name_id INTEGER NOT NULL REFERENCES series_names(id),
    data_type TEXT NOT NULL,
    length INTEGER NOT NULL,
    valid_length INTEGER NOT NULL,
    data TEXT NOT NULL
)
";

/// SQL statement to create an index on series by flight.
pub const CREATE_SERIES_FLIGHT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_double_series_flight ON double_series(flight_id)
";

/// SQL statement to create the itinerary table.
pub const CREATE_ITINERARY_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS itinerary (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    flight_id INTEGER NOT NULL REFERENCES flights(id) ON DELETE CASCADE,
    leg_order INTEGER NOT NULL,
    airport TEXT NOT NULL,
    runway TEXT,
    leg_type TEXT NOT NULL,
    min_altitude REAL,
    min_altitude_index INTEGER,
    min_airport_distance REAL,
    min_runway_distance REAL
)
";

/// SQL statement to create the flight warnings table.
pub const CREATE_WARNINGS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS flight_warnings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    flight_id INTEGER NOT NULL REFERENCES flights(id) ON DELETE CASCADE,
    message TEXT NOT NULL
)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_FLIGHTS_TABLE,
    CREATE_UPLOAD_INDEX,
    CREATE_SERIES_NAMES_TABLE,
    CREATE_DOUBLE_SERIES_TABLE,
    CREATE_STRING_SERIES_TABLE,
    CREATE_SERIES_FLIGHT_INDEX,
    CREATE_ITINERARY_TABLE,
    CREATE_WARNINGS_TABLE,
    CREATE_METADATA_TABLE,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_not_empty() {
        assert!(!SCHEMA_STATEMENTS.is_empty());
        for stmt in SCHEMA_STATEMENTS {
            assert!(!stmt.is_empty());
        }
    }

    #[test]
    fn test_flights_table_deduplicates_by_hash() {
        assert!(CREATE_FLIGHTS_TABLE.contains("md5_hash TEXT NOT NULL UNIQUE"));
        assert!(CREATE_FLIGHTS_TABLE.contains("status INTEGER NOT NULL"));
    }

    #[test]
    fn test_series_names_unique_per_kind() {
        assert!(CREATE_SERIES_NAMES_TABLE.contains("UNIQUE (name, kind)"));
    }
}

//! Storage layer for flightdata.
//!
//! This module provides `SQLite`-based persistent storage for processed
//! flights and the shared catalog of series names. Flights are deduplicated
//! by their content hash.

pub mod derived;
pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::builder::Flight;
use crate::error::{Error, Result};
use crate::series::{NumericSeries, TextSeries};

pub use derived::{DerivedFileSink, DirectorySink};

/// Which series table a name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SeriesKind {
    /// Stored in `double_series`.
    Numeric,
    /// Stored in `string_series`.
    Text,
}

impl SeriesKind {
    /// Value stored in the `kind` column.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Text => "text",
        }
    }
}

impl std::fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record a series name in the catalog. Registering a name twice is a no-op.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn register_series_name(
    conn: &Connection,
    name: &str,
    data_type: &str,
    kind: SeriesKind,
) -> Result<()> {
    series_name_id(conn, name, data_type, kind).map(|_| ())
}

fn series_name_id(conn: &Connection, name: &str, data_type: &str, kind: SeriesKind) -> Result<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO series_names (name, kind, data_type) VALUES (?1, ?2, ?3)",
        params![name, kind.as_str(), data_type],
    )?;
    let id = conn.query_row(
        "SELECT id FROM series_names WHERE name = ?1 AND kind = ?2",
        params![name, kind.as_str()],
        |row| row.get(0),
    )?;
    Ok(id)
}

/// Open a fresh in-memory database with the full schema, for use as a
/// standalone series catalog.
///
/// # Errors
///
/// Returns an error if the in-memory database cannot be created.
pub fn open_catalog_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
        path: PathBuf::from(":memory:"),
        source,
    })?;
    migrations::initialize_schema(&conn)?;
    Ok(conn)
}

/// Destination for processed flights.
#[async_trait]
pub trait FlightStore: Send + Sync + std::fmt::Debug {
    /// Persist `flights` under `upload_id`, returning one database id per
    /// flight in order.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error if the store cannot be written.
    async fn store(&self, upload_id: i64, flights: &[Flight]) -> Result<Vec<i64>>;
}

/// Flight store backed by a `SQLite` database.
///
/// The connection doubles as the series-name catalog, so a step context built
/// from [`SqliteStore::catalog`] registers names in the same database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    /// Path to the database file.
    path: PathBuf,
    /// Shared database connection.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a flight database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;
        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Arc::new(Mutex::new(open_catalog_in_memory()?)),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shared connection for registering series names.
    #[must_use]
    pub fn catalog(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    /// Insert one flight from `upload_id` with its series, itinerary and
    /// warnings.
    ///
    /// A flight whose hash is already stored is not inserted again; the
    /// existing id is returned instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn insert_flight(&self, upload_id: i64, flight: &Flight) -> Result<i64> {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(id) = flight_id_by_hash(&conn, &flight.meta.md5_hash)? {
            debug!(
                "Skipping duplicate flight {} with hash {}",
                flight.meta.filename, flight.meta.md5_hash
            );
            return Ok(id);
        }

        let tx = conn.transaction()?;
        let meta = &flight.meta;
        tx.execute(
            r"
            INSERT INTO flights (
                fleet_id, uploader_id, upload_id, system_id, suggested_tail_number,
                airframe_name, airframe_type, start_time, end_time, filename,
                md5_hash, status, number_rows
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ",
            params![
                meta.fleet_id,
                meta.uploader_id,
                upload_id,
                meta.system_id,
                meta.suggested_tail_number,
                meta.airframe.name,
                meta.airframe.kind.to_string(),
                meta.start_datetime,
                meta.end_datetime,
                meta.filename,
                meta.md5_hash,
                meta.status.bits(),
                i64::try_from(flight.sample_count()).unwrap_or(i64::MAX),
            ],
        )?;
        let flight_id = tx.last_insert_rowid();

        for series in flight.numeric.values() {
            insert_numeric(&tx, flight_id, series)?;
        }
        for series in flight.text.values() {
            insert_text(&tx, flight_id, series)?;
        }
        for (order, leg) in flight.itinerary.iter().enumerate() {
            let (min_index, min_altitude) = leg.min_altitude().unzip();
            tx.execute(
                r"
                INSERT INTO itinerary (
                    flight_id, leg_order, airport, runway, leg_type, min_altitude,
                    min_altitude_index, min_airport_distance, min_runway_distance
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ",
                params![
                    flight_id,
                    i64::try_from(order).unwrap_or(i64::MAX),
                    leg.airport(),
                    leg.runway(),
                    leg.leg_type().to_string(),
                    min_altitude,
                    min_index.and_then(|i| i64::try_from(i).ok()),
                    finite(leg.min_airport_distance()),
                    finite(leg.min_runway_distance()),
                ],
            )?;
        }
        for warning in &flight.warnings {
            tx.execute(
                "INSERT INTO flight_warnings (flight_id, message) VALUES (?1, ?2)",
                params![flight_id, warning.to_string()],
            )?;
        }
        tx.commit()?;

        debug!(
            "Inserted flight {} with id {} ({} numeric, {} text series)",
            meta.filename,
            flight_id,
            flight.numeric.len(),
            flight.text.len()
        );
        Ok(flight_id)
    }

    /// Look up a stored flight by content hash.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn flight_id_by_hash(&self, hash: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        flight_id_by_hash(&conn, hash)
    }

    /// Number of stored flights.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn flight_count(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let count = conn.query_row("SELECT COUNT(*) FROM flights", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Load one stored numeric series.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the stored blob is
    /// not a whole number of samples.
    pub fn load_numeric(&self, flight_id: i64, name: &str) -> Result<Option<NumericSeries>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let row: Option<(String, Vec<u8>)> = conn
            .query_row(
                r"
                SELECT s.data_type, s.data FROM double_series s
                JOIN series_names n ON n.id = s.name_id
                WHERE s.flight_id = ?1 AND n.name = ?2
                ",
                params![flight_id, name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(data_type, blob)| {
            Ok::<_, Error>(NumericSeries::with_values(
                name,
                data_type,
                decode_samples(&blob)?,
            ))
        })
        .transpose()
    }

    /// Messages of the warnings stored for a flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn warnings(&self, flight_id: i64) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt =
            conn.prepare("SELECT message FROM flight_warnings WHERE flight_id = ?1 ORDER BY id")?;
        let messages = stmt
            .query_map([flight_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(messages)
    }
}

#[async_trait]
impl FlightStore for SqliteStore {
    async fn store(&self, upload_id: i64, flights: &[Flight]) -> Result<Vec<i64>> {
        info!("Storing {} flights from upload {}", flights.len(), upload_id);
        flights
            .iter()
            .map(|flight| self.insert_flight(upload_id, flight))
            .collect()
    }
}

fn flight_id_by_hash(conn: &Connection, hash: &str) -> Result<Option<i64>> {
    let id = conn
        .query_row("SELECT id FROM flights WHERE md5_hash = ?1", [hash], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(id)
}

fn insert_numeric(conn: &Connection, flight_id: i64, series: &NumericSeries) -> Result<()> {
    let name_id = series_name_id(conn, series.name(), series.data_type(), SeriesKind::Numeric)?;
    conn.execute(
        r"
        INSERT INTO double_series (
            flight_id, name_id, data_type, length, valid_length, min, avg, max, data
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ",
        params![
            flight_id,
            name_id,
            series.data_type(),
            i64::try_from(series.len()).unwrap_or(i64::MAX),
            i64::try_from(series.valid_count()).unwrap_or(i64::MAX),
            series.min(),
            series.avg(),
            series.max(),
            encode_samples(series.values()),
        ],
    )?;
    Ok(())
}

fn insert_text(conn: &Connection, flight_id: i64, series: &TextSeries) -> Result<()> {
    let name_id = series_name_id(conn, series.name(), series.data_type(), SeriesKind::Text)?;
    conn.execute(
        r"
        INSERT INTO string_series (flight_id, name_id, data_type, length, valid_length, data)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ",
        params![
            flight_id,
            name_id,
            series.data_type(),
            i64::try_from(series.len()).unwrap_or(i64::MAX),
            i64::try_from(series.valid_count()).unwrap_or(i64::MAX),
            serde_json::to_string(series.values())?,
        ],
    )?;
    Ok(())
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn encode_samples(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_samples(blob: &[u8]) -> Result<Vec<f64>> {
    if blob.len() % 8 != 0 {
        return Err(Error::internal(format!(
            "series blob of {} bytes is not a whole number of samples",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(8)
        .map(|chunk| {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(chunk);
            f64::from_le_bytes(bytes)
        })
        .collect())
}

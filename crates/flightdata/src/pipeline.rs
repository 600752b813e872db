//! Upload processing.
//!
//! A [`Pipeline`] takes the entries of one upload, parses each with the
//! parser registered for its extension, runs the step graph over every flight
//! found, and hands the finished flights to the configured store. Entries are
//! processed independently on a bounded pool; a failure in one never affects
//! another.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn, Instrument};

use crate::builder::{Flight, FlightBuilder};
use crate::error::{Error, Result};
use crate::graph::DependencyGraph;
use crate::logging::flight_span;
use crate::parse::{ParseContext, ParserRegistry};
use crate::steps::{default_steps, StepContext};
use crate::storage::{DerivedFileSink, FlightStore};

/// Directory some archivers add beside the real entries.
const MAC_METADATA_DIR: &str = "__MACOSX";

/// One file from an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry name, possibly with directories.
    pub name: String,
    /// Entry contents.
    pub bytes: Vec<u8>,
}

impl ArchiveEntry {
    /// Create an entry.
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Summary of one processed flight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlightSummary {
    /// File (or derived segment) the flight came from.
    pub filename: String,
    /// Deduplication hash.
    pub hash: String,
    /// Airframe name.
    pub airframe: String,
    /// Samples per column.
    pub samples: usize,
    /// Start time, when known.
    pub start: Option<String>,
    /// End time, when known.
    pub end: Option<String>,
    /// Warning messages.
    pub warnings: Vec<String>,
    /// Database id, when stored.
    pub id: Option<i64>,
}

/// What a run produced, in a form fit for printing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    /// Flights without warnings.
    pub valid_flights: usize,
    /// Flights with at least one warning.
    pub warning_flights: usize,
    /// Error message per failed file.
    pub errors: BTreeMap<String, String>,
    /// Number of derived files written.
    pub derived_files: usize,
    /// Every flight produced.
    pub flights: Vec<FlightSummary>,
}

/// Everything a run produced.
#[derive(Debug, Default)]
pub struct RunOutcome {
    /// Finished flights, in entry order.
    pub flights: Vec<Flight>,
    /// Database id per flight, parallel to `flights` when a store is set.
    pub flight_ids: Vec<Option<i64>>,
    /// Error per failed file or flight segment.
    pub errors: BTreeMap<String, Error>,
    /// Number of derived files written.
    pub derived_files: usize,
}

impl RunOutcome {
    /// Summarize the outcome.
    #[must_use]
    pub fn report(&self) -> RunReport {
        let warning_flights = self.flights.iter().filter(|f| f.is_warning()).count();
        RunReport {
            valid_flights: self.flights.len() - warning_flights,
            warning_flights,
            errors: self
                .errors
                .iter()
                .map(|(file, e)| (file.clone(), e.to_string()))
                .collect(),
            derived_files: self.derived_files,
            flights: self
                .flights
                .iter()
                .enumerate()
                .map(|(i, flight)| FlightSummary {
                    filename: flight.meta.filename.clone(),
                    hash: flight.meta.md5_hash.clone(),
                    airframe: flight.meta.airframe.name.clone(),
                    samples: flight.sample_count(),
                    start: flight.meta.start_datetime.clone(),
                    end: flight.meta.end_datetime.clone(),
                    warnings: flight.warnings.iter().map(ToString::to_string).collect(),
                    id: self.flight_ids.get(i).copied().flatten(),
                })
                .collect(),
        }
    }
}

/// Result of processing one entry.
#[derive(Debug, Default)]
struct EntryOutcome {
    flights: Vec<Flight>,
    flight_ids: Vec<Option<i64>>,
    errors: Vec<(String, Error)>,
    derived_files: usize,
}

impl EntryOutcome {
    fn failed(name: &str, error: Error) -> Self {
        Self {
            errors: vec![(name.to_string(), error)],
            ..Self::default()
        }
    }
}

/// Processes the entries of one upload.
#[derive(Debug, Clone)]
pub struct Pipeline {
    parsers: ParserRegistry,
    parse_ctx: ParseContext,
    step_ctx: StepContext,
    parallelism: usize,
    step_parallelism: usize,
    store: Option<Arc<dyn FlightStore>>,
    sink: Option<Arc<dyn DerivedFileSink>>,
}

impl Pipeline {
    /// Pipeline with one worker for files and one for steps.
    #[must_use]
    pub fn new(parsers: ParserRegistry, parse_ctx: ParseContext, step_ctx: StepContext) -> Self {
        Self {
            parsers,
            parse_ctx,
            step_ctx,
            parallelism: 1,
            step_parallelism: 1,
            store: None,
            sink: None,
        }
    }

    /// Set how many files and how many steps run at once.
    #[must_use]
    pub fn with_parallelism(mut self, files: usize, steps: usize) -> Self {
        self.parallelism = files.max(1);
        self.step_parallelism = steps.max(1);
        self
    }

    /// Store finished flights in `store`.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn FlightStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Send derived files to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn DerivedFileSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Read the files under `path` (or `path` itself) as entries, sorted by
    /// name. Directories and archiver metadata are skipped.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if a file or directory cannot be read.
    pub fn entries_from_dir(path: impl AsRef<Path>) -> Result<Vec<ArchiveEntry>> {
        let path = path.as_ref();
        if path.is_file() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Ok(vec![ArchiveEntry::new(name, std::fs::read(path)?)]);
        }

        let mut entries = Vec::new();
        let mut pending = vec![path.to_path_buf()];
        while let Some(dir) = pending.pop() {
            for item in std::fs::read_dir(&dir)? {
                let item = item?;
                let item_path = item.path();
                if item.file_name() == MAC_METADATA_DIR {
                    debug!("Skipping {}", item_path.display());
                    continue;
                }
                if item.file_type()?.is_dir() {
                    pending.push(item_path);
                    continue;
                }
                let name = item_path
                    .strip_prefix(path)
                    .unwrap_or(&item_path)
                    .to_string_lossy()
                    .replace('\\', "/");
                entries.push(ArchiveEntry::new(name, std::fs::read(&item_path)?));
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Process every entry.
    ///
    /// Per-file failures are collected in the outcome rather than returned.
    ///
    /// # Errors
    ///
    /// Returns an error only if the worker pool itself fails.
    pub async fn run(&self, entries: Vec<ArchiveEntry>) -> Result<RunOutcome> {
        info!(
            entries = entries.len(),
            parallelism = self.parallelism,
            upload = self.parse_ctx.upload_id,
            "processing upload"
        );

        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let mut workers: JoinSet<(usize, EntryOutcome)> = JoinSet::new();
        for (order, entry) in entries.into_iter().enumerate() {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| Error::internal(format!("file semaphore closed: {e}")))?;
            let pipeline = self.clone();
            let span = flight_span(&entry.name);
            workers.spawn(
                async move {
                    let _permit = permit;
                    (order, pipeline.process_entry(entry).await)
                }
                .instrument(span),
            );
        }

        let mut finished = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(result) => finished.push(result),
                Err(e) => {
                    workers.abort_all();
                    return Err(Error::internal(format!("file worker failed: {e}")));
                }
            }
        }
        finished.sort_by_key(|(order, _)| *order);

        let mut outcome = RunOutcome::default();
        for (_, entry) in finished {
            outcome.flights.extend(entry.flights);
            outcome.flight_ids.extend(entry.flight_ids);
            outcome.errors.extend(entry.errors);
            outcome.derived_files += entry.derived_files;
        }

        info!(
            flights = outcome.flights.len(),
            failed = outcome.errors.len(),
            derived = outcome.derived_files,
            "upload processed"
        );
        Ok(outcome)
    }

    async fn process_entry(&self, entry: ArchiveEntry) -> EntryOutcome {
        let ArchiveEntry { name, bytes } = entry;
        let parser = match self.parsers.parser_for(&name) {
            Ok(parser) => parser,
            Err(e) => {
                warn!(file = %name, error = %e, "no parser for file");
                return EntryOutcome::failed(&name, e);
            }
        };

        debug!(file = %name, parser = parser.name(), "parsing");
        let ctx = self.parse_ctx.clone();
        let file = name.clone();
        let parsed = tokio::task::spawn_blocking(move || parser.parse(&file, &bytes, &ctx))
            .await
            .unwrap_or_else(|e| Err(Error::internal(format!("parser panicked: {e}"))));
        let output = match parsed {
            Ok(output) => output,
            Err(e) => {
                warn!(file = %name, error = %e, "file rejected");
                return EntryOutcome::failed(&name, e);
            }
        };

        let mut outcome = EntryOutcome::default();
        if let Some(sink) = &self.sink {
            for derived in &output.derived_files {
                if let Err(e) = sink.write(&derived.name, &derived.bytes).await {
                    error!(file = %name, derived = %derived.name, error = %e, "derived file not written");
                    return EntryOutcome::failed(&name, e);
                }
                outcome.derived_files += 1;
            }
        }

        for builder in output.flights {
            let segment = builder.meta().filename;
            match self.process_flight(builder).await {
                Ok(flight) => outcome.flights.push(flight),
                Err(e) => {
                    warn!(file = %segment, error = %e, "flight rejected");
                    outcome.errors.push((segment, e));
                }
            }
        }

        outcome.flight_ids = vec![None; outcome.flights.len()];
        if let Some(store) = &self.store {
            if !outcome.flights.is_empty() {
                match store.store(self.parse_ctx.upload_id, &outcome.flights).await {
                    Ok(ids) => outcome.flight_ids = ids.into_iter().map(Some).collect(),
                    Err(e) => {
                        error!(file = %name, error = %e, "flights not stored");
                        return EntryOutcome::failed(&name, e);
                    }
                }
            }
        }
        outcome
    }

    /// Run the default steps over one flight and finish it.
    async fn process_flight(&self, builder: FlightBuilder) -> Result<Flight> {
        let graph = DependencyGraph::new(default_steps(&builder))?;
        let builder = Arc::new(builder);
        graph
            .execute(Arc::clone(&builder), self.step_ctx.clone(), self.step_parallelism)
            .await?;
        Arc::try_unwrap(builder)
            .map_err(|_| Error::internal("flight builder still shared after processing"))?
            .build()
    }
}

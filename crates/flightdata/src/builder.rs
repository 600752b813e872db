//! Flight builder.
//!
//! A [`FlightBuilder`] is the mutable bag of columns a parser produces and the
//! step graph fills in. Steps run on separate workers and share one builder,
//! so all state sits behind locks. Each output column has exactly one
//! producing step (checked when the graph is built), which means concurrent
//! writers never touch the same key.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::error::{Error, Result};
use crate::itinerary::Itinerary;
use crate::meta::{FlightMeta, ProcessingStatus};
use crate::series::{NumericSeries, TextSeries};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Unvalidated, in-progress flight.
#[derive(Debug)]
pub struct FlightBuilder {
    meta: RwLock<FlightMeta>,
    numeric: RwLock<HashMap<String, Arc<NumericSeries>>>,
    text: RwLock<HashMap<String, Arc<TextSeries>>>,
    aliases: HashMap<String, Vec<String>>,
    warnings: Mutex<Vec<Error>>,
    itinerary: Mutex<Vec<Itinerary>>,
}

impl FlightBuilder {
    /// Create a builder from parsed columns.
    #[must_use]
    pub fn new(
        meta: FlightMeta,
        numeric: Vec<NumericSeries>,
        text: Vec<TextSeries>,
    ) -> Self {
        Self {
            meta: RwLock::new(meta),
            numeric: RwLock::new(
                numeric
                    .into_iter()
                    .map(|s| (s.name().to_string(), Arc::new(s)))
                    .collect(),
            ),
            text: RwLock::new(
                text.into_iter()
                    .map(|s| (s.name().to_string(), Arc::new(s)))
                    .collect(),
            ),
            aliases: HashMap::new(),
            warnings: Mutex::new(Vec::new()),
            itinerary: Mutex::new(Vec::new()),
        }
    }

    /// Let `canonical` also be found under any of `raw_names`.
    #[must_use]
    pub fn with_alias(mut self, canonical: &str, raw_names: &[&str]) -> Self {
        self.aliases.insert(
            canonical.to_string(),
            raw_names.iter().map(ToString::to_string).collect(),
        );
        self
    }

    /// Snapshot of the flight metadata.
    #[must_use]
    pub fn meta(&self) -> FlightMeta {
        read(&self.meta).clone()
    }

    /// Airframe name, for step applicability checks.
    #[must_use]
    pub fn airframe_name(&self) -> String {
        read(&self.meta).airframe.name.clone()
    }

    /// Apply `f` to the metadata under the write lock.
    pub fn update_meta(&self, f: impl FnOnce(&mut FlightMeta)) {
        f(&mut write(&self.meta));
    }

    /// OR `status` into the processing status.
    pub fn update_status(&self, status: ProcessingStatus) {
        write(&self.meta).status |= status;
    }

    /// Add or replace a numeric column under its own name.
    pub fn add_numeric(&self, series: NumericSeries) {
        debug!(column = series.name(), len = series.len(), "adding numeric column");
        write(&self.numeric).insert(series.name().to_string(), Arc::new(series));
    }

    /// Add or replace a text column under its own name.
    pub fn add_text(&self, series: TextSeries) {
        debug!(column = series.name(), len = series.len(), "adding text column");
        write(&self.text).insert(series.name().to_string(), Arc::new(series));
    }

    /// Look up a numeric column by name or alias.
    #[must_use]
    pub fn numeric(&self, name: &str) -> Option<Arc<NumericSeries>> {
        lookup(&read(&self.numeric), &self.aliases, name)
    }

    /// Look up a text column by name or alias.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<Arc<TextSeries>> {
        lookup(&read(&self.text), &self.aliases, name)
    }

    /// Look up a numeric column the caller has already checked exists.
    ///
    /// # Errors
    ///
    /// Returns a malformed-flight error if the column is missing.
    pub fn require_numeric(&self, name: &str) -> Result<Arc<NumericSeries>> {
        self.numeric(name).ok_or_else(|| {
            Error::malformed(format!("Cannot process flight: missing column '{name}'"))
        })
    }

    /// Look up a text column the caller has already checked exists.
    ///
    /// # Errors
    ///
    /// Returns a malformed-flight error if the column is missing.
    pub fn require_text(&self, name: &str) -> Result<Arc<TextSeries>> {
        self.text(name).ok_or_else(|| {
            Error::malformed(format!("Cannot process flight: missing column '{name}'"))
        })
    }

    /// Names of all numeric columns, including alias names that resolve.
    #[must_use]
    pub fn numeric_names(&self) -> HashSet<String> {
        key_set(&read(&self.numeric), &self.aliases)
    }

    /// Names of all text columns, including alias names that resolve.
    #[must_use]
    pub fn text_names(&self) -> HashSet<String> {
        key_set(&read(&self.text), &self.aliases)
    }

    /// Whether a column of either kind exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.numeric(name).is_some() || self.text(name).is_some()
    }

    /// Number of samples, taken from the longest column.
    #[must_use]
    pub fn len(&self) -> usize {
        let numeric = read(&self.numeric).values().map(|s| s.len()).max();
        let text = read(&self.text).values().map(|s| s.len()).max();
        numeric.max(text).unwrap_or(0)
    }

    /// Whether the builder has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a recoverable problem and mark the flight as a warning.
    pub fn add_warning(&self, error: Error) {
        debug!(%error, "flight warning");
        lock(&self.warnings).push(error);
        self.update_status(ProcessingStatus::WARNING);
    }

    /// Number of recorded warnings.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        lock(&self.warnings).len()
    }

    /// Replace the itinerary.
    pub fn set_itinerary(&self, itinerary: Vec<Itinerary>) {
        *lock(&self.itinerary) = itinerary;
    }

    /// Close the builder into an immutable flight.
    ///
    /// Temporary columns are dropped.
    ///
    /// # Errors
    ///
    /// Returns a fatal error if the remaining columns disagree on length.
    pub fn build(self) -> Result<Flight> {
        let meta = self.meta.into_inner().unwrap_or_else(PoisonError::into_inner);
        let numeric: BTreeMap<String, NumericSeries> = self
            .numeric
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .filter(|(_, s)| !s.is_temporary())
            .map(|(k, s)| (k, Arc::unwrap_or_clone(s)))
            .collect();
        let text: BTreeMap<String, TextSeries> = self
            .text
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .filter(|(_, s)| !s.is_temporary())
            .map(|(k, s)| (k, Arc::unwrap_or_clone(s)))
            .collect();

        let mut lengths = numeric
            .iter()
            .map(|(k, s)| (k, s.len()))
            .chain(text.iter().map(|(k, s)| (k, s.len())));
        if let Some((first_name, expected)) = lengths.next() {
            if let Some((name, len)) = lengths.find(|(_, len)| *len != expected) {
                return Err(Error::fatal(format!(
                    "column '{name}' has {len} samples but '{first_name}' has {expected}"
                )));
            }
        }

        Ok(Flight {
            meta,
            numeric,
            text,
            itinerary: self
                .itinerary
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner),
            warnings: self
                .warnings
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner),
        })
    }
}

fn lookup<T>(
    map: &HashMap<String, Arc<T>>,
    aliases: &HashMap<String, Vec<String>>,
    name: &str,
) -> Option<Arc<T>> {
    map.get(name).cloned().or_else(|| {
        aliases
            .get(name)?
            .iter()
            .find_map(|alias| map.get(alias).cloned())
    })
}

fn key_set<T>(
    map: &HashMap<String, Arc<T>>,
    aliases: &HashMap<String, Vec<String>>,
) -> HashSet<String> {
    let mut keys: HashSet<String> = map.keys().cloned().collect();
    for (canonical, raw_names) in aliases {
        if raw_names.iter().any(|raw| map.contains_key(raw)) {
            keys.insert(canonical.clone());
        }
    }
    keys
}

/// A fully processed flight.
#[derive(Debug)]
pub struct Flight {
    /// Flight metadata.
    pub meta: FlightMeta,
    /// Persistent numeric columns by name.
    pub numeric: BTreeMap<String, NumericSeries>,
    /// Persistent text columns by name.
    pub text: BTreeMap<String, TextSeries>,
    /// Airport visits.
    pub itinerary: Vec<Itinerary>,
    /// Recoverable problems found while processing.
    pub warnings: Vec<Error>,
}

impl Flight {
    /// Number of samples shared by every column.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.numeric
            .values()
            .map(NumericSeries::len)
            .chain(self.text.values().map(TextSeries::len))
            .next()
            .unwrap_or(0)
    }

    /// Whether any warning was recorded.
    #[must_use]
    pub fn is_warning(&self) -> bool {
        self.meta.status.is_warning()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> FlightBuilder {
        FlightBuilder::new(
            FlightMeta::default(),
            vec![NumericSeries::with_values("AltMSL", "ft", vec![1.0, 2.0, 3.0])],
            vec![TextSeries::with_values(
                "Lcl Date",
                "yyyy-mm-dd",
                vec!["a".into(), "b".into(), "c".into()],
            )],
        )
    }

    #[test]
    fn test_add_and_lookup() {
        let b = builder();
        assert!(b.numeric("AltMSL").is_some());
        assert!(b.text("Lcl Date").is_some());
        assert!(b.numeric("Lcl Date").is_none());
        b.add_numeric(NumericSeries::with_values("AltAGL", "ft agl", vec![0.0; 3]));
        assert!(b.has_column("AltAGL"));
        assert_eq!(b.len(), 3);
    }

    #[test]
    fn test_alias_lookup_and_names() {
        let b = FlightBuilder::new(
            FlightMeta::default(),
            vec![NumericSeries::with_values(
                "Altitude Above Ground Level",
                "ft",
                vec![1.0],
            )],
            vec![],
        )
        .with_alias("AltAGL", &["Altitude Above Ground Level"]);
        assert!(b.numeric("AltAGL").is_some());
        assert!(b.numeric_names().contains("AltAGL"));
    }

    #[test]
    fn test_require_missing_is_malformed() {
        let b = builder();
        let err = b.require_numeric("E1 RPM").expect_err("missing");
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_warning_sets_status() {
        let b = builder();
        b.add_warning(Error::malformed("terrain miss"));
        assert_eq!(b.warning_count(), 1);
        assert!(b.meta().status.contains(ProcessingStatus::WARNING));
    }

    #[test]
    fn test_build_drops_temporary_columns() {
        let b = builder();
        b.add_numeric(NumericSeries::with_values("scratch", "none", vec![0.0; 3]).temporary());
        let flight = b.build().expect("lengths agree");
        assert!(!flight.numeric.contains_key("scratch"));
        assert_eq!(flight.sample_count(), 3);
    }

    #[test]
    fn test_build_rejects_length_mismatch() {
        let b = builder();
        b.add_numeric(NumericSeries::with_values("short", "none", vec![0.0]));
        let err = b.build().expect_err("mismatch");
        assert!(err.is_fatal());
    }
}

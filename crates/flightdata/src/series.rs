//! Columnar time series.
//!
//! A flight is a bag of named columns, one value per recorder sample. Numeric
//! columns mark missing samples with `NaN`; text columns use the empty string.

use serde::Serialize;

/// A named, unit-tagged sequence of numeric samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSeries {
    name: String,
    data_type: String,
    values: Vec<f64>,
    temporary: bool,
}

impl NumericSeries {
    /// Create an empty series.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self::with_values(name, data_type, Vec::new())
    }

    /// Create a series from existing values.
    #[must_use]
    pub fn with_values(
        name: impl Into<String>,
        data_type: impl Into<String>,
        values: Vec<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            values,
            temporary: false,
        }
    }

    /// Build a series as a pure function of the sample index.
    #[must_use]
    pub fn computed(
        name: impl Into<String>,
        data_type: impl Into<String>,
        len: usize,
        f: impl Fn(usize) -> f64,
    ) -> Self {
        Self::with_values(name, data_type, (0..len).map(f).collect())
    }

    /// Parse raw cells; anything that is not a number becomes `NaN`.
    #[must_use]
    pub fn from_cells<S: AsRef<str>>(
        name: impl Into<String>,
        data_type: impl Into<String>,
        cells: &[S],
    ) -> Self {
        let values = cells.iter().map(|c| parse_cell(c.as_ref())).collect();
        Self::with_values(name, data_type, values)
    }

    /// Mark this series as an intermediate that is never persisted.
    #[must_use]
    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    /// Whether this series is an intermediate.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unit label.
    #[must_use]
    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the series has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The sample at `index`, or `NaN` past the end.
    #[must_use]
    pub fn get(&self, index: usize) -> f64 {
        self.values.get(index).copied().unwrap_or(f64::NAN)
    }

    /// All samples.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Append a sample.
    pub fn push(&mut self, value: f64) {
        self.values.push(value);
    }

    /// Copy of the samples in `[from, to)`, clamped to the series length.
    #[must_use]
    pub fn sub_series(&self, from: usize, to: usize) -> Self {
        let to = to.min(self.values.len());
        let from = from.min(to);
        Self {
            name: self.name.clone(),
            data_type: self.data_type.clone(),
            values: self.values[from..to].to_vec(),
            temporary: self.temporary,
        }
    }

    /// Series whose sample `i` is this series' sample `i - n`.
    ///
    /// The first `n` samples are `NaN`. The result is temporary.
    #[must_use]
    pub fn lag(&self, n: usize) -> Self {
        let name = format!("{}_lag", self.name);
        Self::computed(name, self.data_type.clone(), self.len(), |i| {
            if i >= n {
                self.values[i - n]
            } else {
                f64::NAN
            }
        })
        .temporary()
    }

    /// Series whose sample `i` is this series' sample `i + n`.
    ///
    /// The last `n` samples are `NaN`. The result is temporary.
    #[must_use]
    pub fn lead(&self, n: usize) -> Self {
        let name = format!("{}_lead", self.name);
        let len = self.len();
        Self::computed(name, self.data_type.clone(), len, |i| {
            if i + n < len {
                self.values[i + n]
            } else {
                f64::NAN
            }
        })
        .temporary()
    }

    /// Number of non-`NaN` samples.
    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_nan()).count()
    }

    /// Smallest non-`NaN` sample.
    #[must_use]
    pub fn min(&self) -> Option<f64> {
        self.valid().reduce(f64::min)
    }

    /// Largest non-`NaN` sample.
    #[must_use]
    pub fn max(&self) -> Option<f64> {
        self.valid().reduce(f64::max)
    }

    /// Mean of the non-`NaN` samples.
    #[must_use]
    pub fn avg(&self) -> Option<f64> {
        let count = self.valid_count();
        if count == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        Some(self.valid().sum::<f64>() / count as f64)
    }

    fn valid(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied().filter(|v| !v.is_nan())
    }
}

/// A named sequence of text samples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSeries {
    name: String,
    data_type: String,
    values: Vec<String>,
    temporary: bool,
}

impl TextSeries {
    /// Create an empty series.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self::with_values(name, data_type, Vec::new())
    }

    /// Create a series from existing values.
    #[must_use]
    pub fn with_values(
        name: impl Into<String>,
        data_type: impl Into<String>,
        values: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            values,
            temporary: false,
        }
    }

    /// Build from raw cells, trimming surrounding whitespace.
    #[must_use]
    pub fn from_cells<S: AsRef<str>>(
        name: impl Into<String>,
        data_type: impl Into<String>,
        cells: &[S],
    ) -> Self {
        let values = cells.iter().map(|c| c.as_ref().trim().to_string()).collect();
        Self::with_values(name, data_type, values)
    }

    /// Mark this series as an intermediate that is never persisted.
    #[must_use]
    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    /// Whether this series is an intermediate.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unit label.
    #[must_use]
    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the series has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The sample at `index`, or `""` past the end.
    #[must_use]
    pub fn get(&self, index: usize) -> &str {
        self.values.get(index).map_or("", String::as_str)
    }

    /// All samples.
    #[must_use]
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Append a sample.
    pub fn push(&mut self, value: impl Into<String>) {
        self.values.push(value.into());
    }

    /// Copy of the samples in `[from, to)`, clamped to the series length.
    #[must_use]
    pub fn sub_series(&self, from: usize, to: usize) -> Self {
        let to = to.min(self.values.len());
        let from = from.min(to);
        Self {
            name: self.name.clone(),
            data_type: self.data_type.clone(),
            values: self.values[from..to].to_vec(),
            temporary: self.temporary,
        }
    }

    /// Number of non-empty samples.
    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_empty()).count()
    }
}

/// Parse one recorder cell into a sample value.
#[must_use]
pub fn parse_cell(cell: &str) -> f64 {
    cell.trim().parse::<f64>().unwrap_or(f64::NAN)
}

/// Whether a cell holds a number.
#[must_use]
pub fn is_numeric_cell(cell: &str) -> bool {
    cell.trim().parse::<f64>().is_ok()
}

use crate::core::error::{AlignmentError, ConfigError};
use crate::core::series::SeriesId;
use crate::engine::normalize::NormalizationMode;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt::Display;

/// Non-fatal note attached to a dataset: the data is still usable but partial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Annotation {
    ProviderFailure { series: SeriesId, reason: String },
    NonPositiveUnderLog { series: SeriesId, count: usize },
    ZeroAnchor { series: SeriesId },
}

impl Display for Annotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Annotation::ProviderFailure { series, reason } => {
                write!(f, "{series}: not loaded ({reason})")
            }
            Annotation::NonPositiveUnderLog { series, count } => {
                write!(f, "{series}: {count} non-positive value(s) dropped under log scale")
            }
            Annotation::ZeroAnchor { series } => {
                write!(f, "{series}: first value is zero, cannot rebase to 100")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub id: SeriesId,
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn new(id: impl Into<SeriesId>, values: Vec<Option<f64>>) -> Self {
        Self {
            id: id.into(),
            values,
        }
    }

    /// Position and value of the first present observation.
    pub fn first_valid(&self) -> Option<(usize, f64)> {
        self.values
            .iter()
            .enumerate()
            .find_map(|(i, v)| v.map(|v| (i, v)))
    }

    pub fn last_valid(&self) -> Option<(usize, f64)> {
        self.values
            .iter()
            .enumerate()
            .rev()
            .find_map(|(i, v)| v.map(|v| (i, v)))
    }

    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

/// Columns sharing one strictly increasing date index.
///
/// Every column has exactly one value slot per date; `None` marks a missing value.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedDataset {
    dates: Vec<NaiveDate>,
    columns: Vec<Column>,
    mode: NormalizationMode,
    annotations: Vec<Annotation>,
}

impl AlignedDataset {
    pub fn new(
        dates: Vec<NaiveDate>,
        columns: Vec<Column>,
        mode: NormalizationMode,
    ) -> Result<Self, AlignmentError> {
        if let Some(pair) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(AlignmentError::Schema {
                reason: format!("date index not strictly increasing at {}", pair[1]),
            });
        }
        let mut seen = HashSet::new();
        for column in &columns {
            if column.values.len() != dates.len() {
                return Err(AlignmentError::Schema {
                    reason: format!(
                        "column {} has {} values for {} dates",
                        column.id,
                        column.values.len(),
                        dates.len()
                    ),
                });
            }
            if !seen.insert(&column.id) {
                return Err(AlignmentError::Schema {
                    reason: format!("duplicate column {}", column.id),
                });
            }
        }
        Ok(Self {
            dates,
            columns,
            mode,
            annotations: Vec::new(),
        })
    }

    /// Rebuilds a dataset over the same index with transformed columns. Callers keep column
    /// lengths intact.
    pub(crate) fn derive(&self, columns: Vec<Column>, mode: NormalizationMode) -> Self {
        debug_assert!(columns.iter().all(|c| c.values.len() == self.dates.len()));
        Self {
            dates: self.dates.clone(),
            columns,
            mode,
            annotations: self.annotations.clone(),
        }
    }

    /// Builds a dataset over a new index the caller derived from a valid one (resampling).
    pub(crate) fn resampled(
        &self,
        dates: Vec<NaiveDate>,
        columns: Vec<Column>,
        mode: NormalizationMode,
    ) -> Self {
        debug_assert!(dates.windows(2).all(|w| w[0] < w[1]));
        debug_assert!(columns.iter().all(|c| c.values.len() == dates.len()));
        Self {
            dates,
            columns,
            mode,
            annotations: self.annotations.clone(),
        }
    }

    pub fn with_annotations(mut self, annotations: impl IntoIterator<Item = Annotation>) -> Self {
        for annotation in annotations {
            if !self.annotations.contains(&annotation) {
                self.annotations.push(annotation);
            }
        }
        self
    }

    /// Returns a copy with `column` appended.
    pub fn with_column(&self, column: Column) -> Result<Self, AlignmentError> {
        let mut columns = self.columns.clone();
        columns.push(column);
        let dataset = Self::new(self.dates.clone(), columns, self.mode)?;
        Ok(dataset.with_annotations(self.annotations.iter().cloned()))
    }

    /// Returns a copy restricted to `ids`, in that order.
    pub fn select(&self, ids: &[SeriesId]) -> Result<Self, ConfigError> {
        let columns = ids
            .iter()
            .map(|id| {
                self.column(id)
                    .cloned()
                    .ok_or_else(|| ConfigError::UnknownSeries {
                        name: id.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.derive(columns, self.mode))
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, id: &SeriesId) -> Option<&Column> {
        self.columns.iter().find(|c| &c.id == id)
    }

    pub fn require(&self, id: &SeriesId) -> Result<&Column, ConfigError> {
        self.column(id).ok_or_else(|| ConfigError::UnknownSeries {
            name: id.to_string(),
        })
    }

    pub fn ids(&self) -> Vec<SeriesId> {
        self.columns.iter().map(|c| c.id.clone()).collect()
    }

    pub fn mode(&self) -> NormalizationMode {
        self.mode
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// True when a requested series failed to load and is absent from the columns.
    pub fn is_partial(&self) -> bool {
        self.annotations
            .iter()
            .any(|a| matches!(a, Annotation::ProviderFailure { .. }))
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Index of the grid date closest to `date`; the earlier date wins a tie.
    pub fn nearest_index(&self, date: NaiveDate) -> Option<usize> {
        if self.dates.is_empty() {
            return None;
        }
        let idx = self.dates.partition_point(|d| *d < date);
        if idx == 0 {
            return Some(0);
        }
        if idx == self.dates.len() {
            return Some(idx - 1);
        }
        let before = (date - self.dates[idx - 1]).num_days();
        let after = (self.dates[idx] - date).num_days();
        Some(if after < before { idx } else { idx - 1 })
    }
}

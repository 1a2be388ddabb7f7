//! Correlation analytics: monthly-return matrix, rolling windows and the driver sensitivity map.

use crate::core::error::{ConfigError, EngineError};
use crate::core::series::SeriesId;
use crate::engine::dataset::{AlignedDataset, Column};
use crate::engine::normalize::{NormalizationMode, percent_change};
use crate::engine::stats::{complete_pairs, pearson, pearson_pairwise};
use chrono::{Datelike, Months, NaiveDate};
use serde::Serialize;
use tracing::debug;

fn month_end(date: NaiveDate) -> NaiveDate {
    date.with_day(1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date)
}

/// Resamples to calendar month ends (last valid value of each month) and takes the monthly
/// percent change of every column.
pub fn monthly_returns(dataset: &AlignedDataset) -> AlignedDataset {
    let dates = dataset.dates();
    let mut buckets: Vec<(NaiveDate, std::ops::Range<usize>)> = Vec::new();
    let mut start = 0;
    for i in 1..=dates.len() {
        let boundary = i == dates.len()
            || (dates[i].year(), dates[i].month()) != (dates[start].year(), dates[start].month());
        if boundary {
            buckets.push((month_end(dates[start]), start..i));
            start = i;
        }
    }

    let columns = dataset
        .columns()
        .iter()
        .map(|column| {
            let month_values: Vec<Option<f64>> = buckets
                .iter()
                .map(|(_, range)| column.values[range.clone()].iter().rev().find_map(|v| *v))
                .collect();
            Column::new(column.id.clone(), percent_change(&month_values))
        })
        .collect();

    let month_dates = buckets.into_iter().map(|(d, _)| d).collect();
    dataset.resampled(month_dates, columns, NormalizationMode::PercentChange)
}

/// Symmetric Pearson matrix; `None` marks an undefined coefficient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub ids: Vec<SeriesId>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn get(&self, a: &SeriesId, b: &SeriesId) -> Option<f64> {
        let i = self.ids.iter().position(|id| id == a)?;
        let j = self.ids.iter().position(|id| id == b)?;
        self.values[i][j]
    }
}

/// Correlation of monthly returns for every pair of columns.
///
/// The diagonal is exactly 1.0 for each series with at least two monthly returns.
pub fn correlation_matrix(dataset: &AlignedDataset) -> CorrelationMatrix {
    let returns = monthly_returns(dataset);
    let columns = returns.columns();
    let n = columns.len();
    let mut values = vec![vec![None; n]; n];
    for i in 0..n {
        if columns[i].valid_count() >= 2 {
            values[i][i] = Some(1.0);
        }
        for j in (i + 1)..n {
            let r = pearson_pairwise(&columns[i].values, &columns[j].values).map(|(r, _)| r);
            values[i][j] = r;
            values[j][i] = r;
        }
    }
    debug!(series = n, months = returns.len(), "Computed correlation matrix");
    CorrelationMatrix {
        ids: returns.ids(),
        values,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollingCorrelation {
    pub a: SeriesId,
    pub b: SeriesId,
    pub window: usize,
    /// Only positions where the window yields a defined coefficient.
    pub points: Vec<(NaiveDate, f64)>,
}

pub fn validate_window(window: usize, len: usize) -> Result<(), ConfigError> {
    if window == 0 {
        return Err(ConfigError::ZeroWindow);
    }
    if window >= len {
        return Err(ConfigError::WindowTooLarge { window, len });
    }
    Ok(())
}

/// Pearson correlation of `a` and `b` over each trailing window of `window` grid periods.
pub fn rolling_correlation(
    dataset: &AlignedDataset,
    a: &SeriesId,
    b: &SeriesId,
    window: usize,
) -> Result<RollingCorrelation, EngineError> {
    validate_window(window, dataset.len())?;
    let xs = &dataset.require(a)?.values;
    let ys = &dataset.require(b)?.values;

    let points = (window - 1..dataset.len())
        .filter_map(|t| {
            let lo = t + 1 - window;
            let (x, y) = complete_pairs(&xs[lo..=t], &ys[lo..=t]);
            pearson(&x, &y).map(|r| (dataset.dates()[t], r))
        })
        .collect::<Vec<_>>();

    debug!(%a, %b, window, points = points.len(), "Computed rolling correlation");
    Ok(RollingCorrelation {
        a: a.clone(),
        b: b.clone(),
        window,
        points,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityRow {
    pub asset: SeriesId,
    /// One coefficient per driver, in driver order.
    pub vector: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityMap {
    pub drivers: Vec<SeriesId>,
    pub rows: Vec<SensitivityRow>,
}

/// Signed monthly-return correlation of each asset against each driver present in the dataset.
pub fn sensitivity_map(
    dataset: &AlignedDataset,
    assets: &[SeriesId],
    drivers: &[SeriesId],
) -> Result<SensitivityMap, ConfigError> {
    for asset in assets {
        dataset.require(asset)?;
    }
    let drivers: Vec<SeriesId> = drivers
        .iter()
        .filter(|d| dataset.column(d).is_some())
        .cloned()
        .collect();

    let returns = monthly_returns(dataset);
    let mut rows = Vec::with_capacity(assets.len());
    for asset in assets {
        let asset_returns = &returns.require(asset)?.values;
        let mut vector = Vec::with_capacity(drivers.len());
        for driver in &drivers {
            let driver_returns = &returns.require(driver)?.values;
            vector.push(pearson_pairwise(asset_returns, driver_returns).map(|(r, _)| r));
        }
        rows.push(SensitivityRow {
            asset: asset.clone(),
            vector,
        });
    }
    Ok(SensitivityMap { drivers, rows })
}

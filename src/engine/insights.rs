//! Derived views over a raw dataset: the real-return leaderboard, the purchasing-power
//! calculator and easy-money regimes.

use crate::core::error::ConfigError;
use crate::core::series::SeriesId;
use crate::engine::dataset::{AlignedDataset, Column};
use chrono::NaiveDate;
use rust_decimal::{Decimal, prelude::*};
use rust_finprim::rate::cagr;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

pub const DEFAULT_REGIME_LOOKBACK: usize = 252;
pub const DEFAULT_REGIME_THRESHOLD: f64 = 0.05;
/// Current growth above this reads as easy money.
pub const CURRENT_EASY_MONEY_THRESHOLD: f64 = 0.02;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub asset: SeriesId,
    /// Last valid value over first valid value, minus one.
    pub total_return: f64,
    /// Total return minus the reference's total return.
    pub real_return: f64,
    pub beat_reference: bool,
    /// Annualized over the observed span; `None` when the span or the prices do not allow it.
    pub cagr: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leaderboard {
    pub reference: SeriesId,
    pub reference_return: f64,
    pub entries: Vec<LeaderboardEntry>,
}

/// Last valid value over first valid value, minus one.
pub fn total_return(column: &Column) -> Option<f64> {
    let (_, first) = column.first_valid()?;
    let (_, last) = column.last_valid()?;
    if first == 0.0 {
        return None;
    }
    Some(last / first - 1.0)
}

/// Compound annual growth from `begin` to `end` over `days` calendar days.
pub fn cagr_over(begin: f64, end: f64, days: i64) -> Option<f64> {
    if begin <= 0.0 || end <= 0.0 || days <= 0 {
        return None;
    }
    let n_years = Decimal::from_f64(days as f64 / 365.0)?;
    let begin_bal = Decimal::from_f64(begin)?;
    let end_bal = Decimal::from_f64(end)?;
    if n_years.is_zero() {
        return None;
    }
    let rate = cagr(begin_bal, end_bal, n_years);
    debug!("cagr: {begin_bal}, {end_bal}, {n_years} = {rate}");
    rate.to_f64()
}

fn annualized(dataset: &AlignedDataset, column: &Column) -> Option<f64> {
    let (start_idx, begin) = column.first_valid()?;
    let (end_idx, end) = column.last_valid()?;
    let days = (dataset.dates()[end_idx] - dataset.dates()[start_idx]).num_days();
    cagr_over(begin, end, days)
}

/// Ranks `assets` by how much they out-grew `reference` over the dataset window.
pub fn leaderboard(
    dataset: &AlignedDataset,
    reference: &SeriesId,
    assets: &[SeriesId],
) -> Result<Leaderboard, ConfigError> {
    let reference_return = total_return(dataset.require(reference)?).unwrap_or(0.0);
    let mut entries = Vec::with_capacity(assets.len());
    for asset in assets {
        let column = dataset.require(asset)?;
        let Some(total) = total_return(column) else {
            continue;
        };
        let real = total - reference_return;
        entries.push(LeaderboardEntry {
            asset: asset.clone(),
            total_return: total,
            real_return: real,
            beat_reference: real > 0.0,
            cagr: annualized(dataset, column),
        });
    }
    entries.sort_by(|a, b| {
        b.real_return
            .partial_cmp(&a.real_return)
            .unwrap_or(Ordering::Equal)
    });
    Ok(Leaderboard {
        reference: reference.clone(),
        reference_return,
        entries,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchasingPowerRow {
    pub series: SeriesId,
    pub start_value: f64,
    pub end_value: f64,
    /// End value over start value.
    pub factor: f64,
    /// What the amount buys today, in base-date money.
    pub current_value: f64,
    pub change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchasingPower {
    pub amount: f64,
    /// Grid date nearest to the requested base date.
    pub base_date: NaiveDate,
    pub rows: Vec<PurchasingPowerRow>,
}

pub fn purchasing_power(
    dataset: &AlignedDataset,
    amount: f64,
    base_date: NaiveDate,
) -> Option<PurchasingPower> {
    let idx = dataset.nearest_index(base_date)?;
    let rows = dataset
        .columns()
        .iter()
        .filter_map(|column| {
            let start_value = column.values[idx]?;
            let (_, end_value) = column.last_valid()?;
            if start_value == 0.0 || end_value == 0.0 {
                return None;
            }
            let factor = end_value / start_value;
            Some(PurchasingPowerRow {
                series: column.id.clone(),
                start_value,
                end_value,
                factor,
                current_value: amount / factor,
                change: 1.0 / factor - 1.0,
            })
        })
        .collect();
    Some(PurchasingPower {
        amount,
        base_date: dataset.dates()[idx],
        rows,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimePhase {
    EasyMoney,
    Tightening,
}

impl std::fmt::Display for RegimePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RegimePhase::EasyMoney => "Easy Money",
            RegimePhase::Tightening => "Tightening",
        })
    }
}

/// Contiguous stretch where growth stayed above the threshold. `end` is the first date it did
/// not, or the last grid date for a regime still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegimeSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegimeReport {
    pub series: SeriesId,
    /// Periods actually used for the growth computation.
    pub lookback: usize,
    pub threshold: f64,
    pub spans: Vec<RegimeSpan>,
    pub current_growth: Option<f64>,
    pub current: RegimePhase,
}

/// Growth of `values` over `periods` grid positions.
pub fn growth(values: &[Option<f64>], periods: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|t| {
            let prev = values[t.checked_sub(periods)?]?;
            let curr = values[t]?;
            (prev != 0.0).then(|| curr / prev - 1.0)
        })
        .collect()
}

/// Finds easy-money regimes of `series`: spans where its growth over `lookback` periods exceeds
/// `threshold`. Datasets not longer than `lookback` fall back to a tenth of their length.
pub fn regimes(
    dataset: &AlignedDataset,
    series: &SeriesId,
    lookback: usize,
    threshold: f64,
) -> Result<RegimeReport, ConfigError> {
    if lookback == 0 {
        return Err(ConfigError::ZeroWindow);
    }
    let values = &dataset.require(series)?.values;
    let periods = if values.len() > lookback {
        lookback
    } else {
        (values.len() / 10).max(1)
    };
    let growth = growth(values, periods);

    let mut spans = Vec::new();
    let mut open: Option<NaiveDate> = None;
    for (date, g) in dataset.dates().iter().zip(&growth) {
        let Some(g) = g else { continue };
        match (*g > threshold, open) {
            (true, None) => open = Some(*date),
            (false, Some(start)) => {
                spans.push(RegimeSpan { start, end: *date });
                open = None;
            }
            _ => {}
        }
    }
    if let (Some(start), Some(end)) = (open, dataset.dates().last()) {
        spans.push(RegimeSpan { start, end: *end });
    }

    let current_growth = growth.iter().rev().find_map(|g| *g);
    let current = match current_growth {
        Some(g) if g > CURRENT_EASY_MONEY_THRESHOLD => RegimePhase::EasyMoney,
        _ => RegimePhase::Tightening,
    };
    debug!(%series, periods, spans = spans.len(), %current, "Classified regimes");
    Ok(RegimeReport {
        series: series.clone(),
        lookback: periods,
        threshold,
        spans,
        current_growth,
        current,
    })
}

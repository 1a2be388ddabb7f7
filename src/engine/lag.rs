//! Lead/lag shifting and scanning.
//!
//! Shifting series B by `k` periods compares A[t] with B[t - k]; a positive `k` means B lags A.

use crate::core::error::ConfigError;
use crate::core::series::SeriesId;
use crate::engine::dataset::{AlignedDataset, Column};
use crate::engine::stats::pearson;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Coefficients closer than this count as tied.
const TIE_EPSILON: f64 = 1e-12;

/// A base dataset plus integer period offsets per column.
///
/// Offsets compose arithmetically and the base is never touched, so shifting by `k` and then by
/// `-k` gives back exactly the base alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftedDataset {
    base: AlignedDataset,
    offsets: BTreeMap<SeriesId, i64>,
}

impl ShiftedDataset {
    pub fn new(base: AlignedDataset) -> Self {
        Self {
            base,
            offsets: BTreeMap::new(),
        }
    }

    /// Shifts every column except `reference` by `k` periods.
    pub fn others(base: AlignedDataset, reference: &SeriesId, k: i64) -> Self {
        let ids = base.ids();
        ids.iter()
            .filter(|id| *id != reference)
            .fold(Self::new(base), |shifted, id| shifted.shifted_unchecked(id, k))
    }

    /// Adds `k` to the offset of `id`; the resulting offset must stay within the grid.
    pub fn shift(&self, id: &SeriesId, k: i64) -> Result<Self, ConfigError> {
        self.base.require(id)?;
        check_lag(self.offset(id).saturating_add(k), self.base.len())?;
        Ok(self.shifted_unchecked(id, k))
    }

    fn shifted_unchecked(&self, id: &SeriesId, k: i64) -> Self {
        let mut offsets = self.offsets.clone();
        let total = offsets.get(id).copied().unwrap_or(0).saturating_add(k);
        if total == 0 {
            offsets.remove(id);
        } else {
            offsets.insert(id.clone(), total);
        }
        Self {
            base: self.base.clone(),
            offsets,
        }
    }

    pub fn offset(&self, id: &SeriesId) -> i64 {
        self.offsets.get(id).copied().unwrap_or(0)
    }

    pub fn base(&self) -> &AlignedDataset {
        &self.base
    }

    /// Applies the offsets on the base grid; positions shifted in from outside it are missing.
    pub fn materialize(&self) -> AlignedDataset {
        if self.offsets.is_empty() {
            return self.base.clone();
        }
        let columns = self
            .base
            .columns()
            .iter()
            .map(|column| match self.offsets.get(&column.id) {
                Some(k) => Column::new(column.id.clone(), shift_values(&column.values, *k)),
                None => column.clone(),
            })
            .collect();
        self.base.derive(columns, self.base.mode())
    }
}

/// `out[t] = values[t - k]`, missing where `t - k` falls off the grid.
pub fn shift_values(values: &[Option<f64>], k: i64) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|t| {
            i64::try_from(t)
                .ok()
                .and_then(|t| t.checked_sub(k))
                .and_then(|src| usize::try_from(src).ok())
                .and_then(|src| values.get(src).copied().flatten())
        })
        .collect()
}

/// Rejects an offset larger in magnitude than a grid of `len` periods.
pub fn check_lag(lag: i64, len: usize) -> Result<(), ConfigError> {
    if lag.unsigned_abs() > len as u64 {
        return Err(ConfigError::LagOutOfRange { lag, len });
    }
    Ok(())
}

/// Inclusive bounds of a lag scan, in grid periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LagRange {
    pub min: i64,
    pub max: i64,
}

impl LagRange {
    pub fn new(min: i64, max: i64) -> Result<Self, ConfigError> {
        if min > max {
            return Err(ConfigError::InvalidLagRange { min, max });
        }
        Ok(Self { min, max })
    }
}

impl Default for LagRange {
    fn default() -> Self {
        Self { min: -24, max: 24 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LagPoint {
    pub k: i64,
    pub correlation: Option<f64>,
    /// Number of overlapping observations behind the coefficient.
    pub n: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LagScan {
    pub a: SeriesId,
    pub b: SeriesId,
    pub results: Vec<LagPoint>,
    pub best: Option<LagPoint>,
}

/// Correlates `a` with `b` shifted by every `k` in `range`. Neither bound may reach past the
/// length of `dataset`.
///
/// The best lag maximizes |correlation|; ties go to the smaller |k|, then to the negative k.
pub fn scan_lags(
    dataset: &AlignedDataset,
    a: &SeriesId,
    b: &SeriesId,
    range: LagRange,
) -> Result<LagScan, ConfigError> {
    let range = LagRange::new(range.min, range.max)?;
    check_lag(range.min, dataset.len())?;
    check_lag(range.max, dataset.len())?;
    let xs = &dataset.require(a)?.values;
    let ys = &dataset.require(b)?.values;

    let results: Vec<LagPoint> = (range.min..=range.max)
        .map(|k| {
            let (x, y): (Vec<f64>, Vec<f64>) = xs
                .iter()
                .zip(shift_values(ys, k))
                .filter_map(|(x, y)| Some(((*x)?, y?)))
                .unzip();
            LagPoint {
                k,
                correlation: pearson(&x, &y),
                n: x.len(),
            }
        })
        .collect();

    let mut preference: Vec<&LagPoint> = results.iter().collect();
    preference.sort_by_key(|p| (p.k.abs(), p.k));
    let best = preference
        .into_iter()
        .filter(|p| p.correlation.is_some())
        .fold(None::<LagPoint>, |best, p| match (best, p.correlation) {
            (Some(b), Some(r)) if r.abs() <= b.correlation.map_or(0.0, f64::abs) + TIE_EPSILON => {
                Some(b)
            }
            _ => Some(*p),
        });

    debug!(%a, %b, ?range, best = ?best.map(|p| p.k), "Scanned lags");
    Ok(LagScan {
        a: a.clone(),
        b: b.clone(),
        results,
        best,
    })
}

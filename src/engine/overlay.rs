//! Technical overlays: simple moving average and Bollinger bands.

use crate::core::error::ConfigError;
use crate::core::series::SeriesId;
use crate::engine::correlation::validate_window;
use crate::engine::dataset::AlignedDataset;
use crate::engine::stats::{mean, sample_std};
use serde::Serialize;

pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Trailing windows of `window` values, `None` unless every value in the window is present.
fn full_windows(values: &[Option<f64>], window: usize) -> impl Iterator<Item = Option<Vec<f64>>> + '_ {
    (0..values.len()).map(move |t| {
        if window == 0 || t + 1 < window {
            return None;
        }
        values[t + 1 - window..=t].iter().copied().collect()
    })
}

pub fn sma(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    full_windows(values, window)
        .map(|w| w.and_then(|w| mean(&w)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bands {
    pub middle: Vec<Option<f64>>,
    pub upper: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

/// SMA ± `multiplier` sample standard deviations over the same trailing window.
pub fn bollinger(
    values: &[Option<f64>],
    window: usize,
    multiplier: f64,
) -> Result<Bands, ConfigError> {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return Err(ConfigError::InvalidMultiplier { value: multiplier });
    }
    if window == 0 {
        return Err(ConfigError::ZeroWindow);
    }
    let mut bands = Bands {
        middle: Vec::with_capacity(values.len()),
        upper: Vec::with_capacity(values.len()),
        lower: Vec::with_capacity(values.len()),
    };
    for w in full_windows(values, window) {
        let middle = w.as_deref().and_then(mean);
        let spread = w.as_deref().and_then(sample_std).map(|s| s * multiplier);
        let (upper, lower) = match (middle, spread) {
            (Some(m), Some(s)) => (Some(m + s), Some(m - s)),
            _ => (None, None),
        };
        bands.middle.push(middle);
        bands.upper.push(upper);
        bands.lower.push(lower);
    }
    Ok(bands)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    pub id: SeriesId,
    pub window: usize,
    pub multiplier: f64,
    pub bands: Bands,
}

/// Bollinger overlay for every column of `dataset`.
pub fn overlays(
    dataset: &AlignedDataset,
    window: usize,
    multiplier: f64,
) -> Result<Vec<Overlay>, ConfigError> {
    validate_window(window, dataset.len())?;
    dataset
        .columns()
        .iter()
        .map(|column| {
            Ok(Overlay {
                id: column.id.clone(),
                window,
                multiplier,
                bands: bollinger(&column.values, window, multiplier)?,
            })
        })
        .collect()
}

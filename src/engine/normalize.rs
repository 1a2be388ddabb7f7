//! Normalization modes applied column by column to a raw aligned dataset.

use crate::core::error::ConfigError;
use crate::engine::dataset::{AlignedDataset, Annotation, Column};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMode {
    Raw,
    /// Rebased so each column's first valid value inside the window is 100.
    #[default]
    Index100,
    /// Period-over-period change as a fraction; the first point is missing.
    PercentChange,
    /// Natural log; non-positive points become missing.
    Log,
}

impl Display for NormalizationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                NormalizationMode::Raw => "Raw Data",
                NormalizationMode::Index100 => "Index=100",
                NormalizationMode::PercentChange => "% Change",
                NormalizationMode::Log => "Log Scale",
            }
        )
    }
}

impl FromStr for NormalizationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace([' ', '_', '-'], "").as_str() {
            "raw" | "rawdata" => Ok(NormalizationMode::Raw),
            "index100" | "index=100" | "index" => Ok(NormalizationMode::Index100),
            "percentchange" | "%change" | "pct" | "percent" => Ok(NormalizationMode::PercentChange),
            "log" | "logscale" => Ok(NormalizationMode::Log),
            _ => Err(anyhow::anyhow!("Invalid normalization mode: {}", s)),
        }
    }
}

/// Applies `mode` to a raw dataset.
///
/// Re-applying the mode a dataset is already in returns it unchanged. Chaining two different
/// non-raw modes is rejected.
pub fn normalize(
    dataset: &AlignedDataset,
    mode: NormalizationMode,
) -> Result<AlignedDataset, ConfigError> {
    if dataset.mode() == mode {
        return Ok(dataset.clone());
    }
    if dataset.mode() != NormalizationMode::Raw {
        return Err(ConfigError::ModeMismatch {
            from: dataset.mode().to_string(),
            to: mode.to_string(),
        });
    }

    let mut annotations = Vec::new();
    let columns = dataset
        .columns()
        .iter()
        .map(|column| {
            let values = match mode {
                NormalizationMode::Raw => column.values.clone(),
                NormalizationMode::Index100 => match index100(&column.values) {
                    Some(values) => values,
                    None => {
                        annotations.push(Annotation::ZeroAnchor {
                            series: column.id.clone(),
                        });
                        vec![None; column.values.len()]
                    }
                },
                NormalizationMode::PercentChange => percent_change(&column.values),
                NormalizationMode::Log => {
                    let (values, clipped) = log(&column.values);
                    if clipped > 0 {
                        warn!(series = %column.id, clipped, "Clipped non-positive values under log scale");
                        annotations.push(Annotation::NonPositiveUnderLog {
                            series: column.id.clone(),
                            count: clipped,
                        });
                    }
                    values
                }
            };
            Column::new(column.id.clone(), values)
        })
        .collect();

    debug!(%mode, columns = dataset.columns().len(), "Normalized dataset");
    Ok(dataset.derive(columns, mode).with_annotations(annotations))
}

/// Rebases to the first valid value. `None` when that anchor is zero.
pub fn index100(values: &[Option<f64>]) -> Option<Vec<Option<f64>>> {
    let Some(anchor) = values.iter().flatten().next().copied() else {
        return Some(values.to_vec());
    };
    if anchor == 0.0 {
        return None;
    }
    Some(values.iter().map(|v| v.map(|v| v / anchor * 100.0)).collect())
}

pub fn percent_change(values: &[Option<f64>]) -> Vec<Option<f64>> {
    std::iter::once(None)
        .chain(values.windows(2).map(|w| match (w[0], w[1]) {
            (Some(prev), Some(curr)) if prev != 0.0 => Some((curr - prev) / prev),
            _ => None,
        }))
        .take(values.len())
        .collect()
}

/// Natural log with non-positive points clipped to missing; also returns how many were clipped.
pub fn log(values: &[Option<f64>]) -> (Vec<Option<f64>>, usize) {
    let mut clipped = 0;
    let logged = values
        .iter()
        .map(|v| match v {
            Some(v) if *v > 0.0 => Some(v.ln()),
            Some(_) => {
                clipped += 1;
                None
            }
            None => None,
        })
        .collect();
    (logged, clipped)
}

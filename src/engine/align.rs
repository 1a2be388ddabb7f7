//! Puts series of different frequencies on one common date index.
//!
//! The index is the union of native observation dates inside the requested range. Each series
//! is filled onto it from its own history, so a monthly metric carries its last print across the
//! daily grid without inventing daily variance. Positions before a series' first observation
//! stay missing.

use crate::core::error::AlignmentError;
use crate::core::range::DateRange;
use crate::core::series::{Point, Series};
use crate::engine::dataset::{AlignedDataset, Column};
use crate::engine::normalize::NormalizationMode;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeSet;
use tracing::debug;

/// How a series is filled onto grid dates where it has no native observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillPolicy {
    /// Carry the last observation forward.
    #[default]
    Forward,
    /// Interpolate linearly in calendar days between observations; forward fill after the last.
    Linear,
}

pub fn align<S: Borrow<Series>>(
    series: &[S],
    range: DateRange,
    policy: FillPolicy,
) -> Result<AlignedDataset, AlignmentError> {
    if series.is_empty() {
        return Err(AlignmentError::EmptySelection);
    }

    let dates: Vec<NaiveDate> = series
        .iter()
        .flat_map(|s| s.borrow().slice(range).points.iter().map(|p| p.date))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if dates.is_empty() {
        return Err(AlignmentError::EmptySelection);
    }

    let mut columns = Vec::with_capacity(series.len());
    let mut latest_start: Option<(NaiveDate, &Series)> = None;
    let mut earliest_end: Option<(NaiveDate, &Series)> = None;

    for s in series {
        let s = s.borrow();
        let values = project(s, &dates, policy);
        let column = Column::new(s.id().clone(), values);

        let Some((first_idx, _)) = column.first_valid() else {
            return Err(AlignmentError::NoOverlap {
                reason: format!("{} has no observations before {}", s.id(), range.end),
            });
        };
        let span_start = dates[first_idx];
        let last_native = s
            .points()
            .iter()
            .rev()
            .find(|p| p.date < range.end)
            .map_or(span_start, |p| p.date);
        let span_end = last_native.max(span_start);

        if latest_start.is_none_or(|(d, _)| span_start > d) {
            latest_start = Some((span_start, s));
        }
        if earliest_end.is_none_or(|(d, _)| span_end < d) {
            earliest_end = Some((span_end, s));
        }
        columns.push(column);
    }

    if let (Some((start, late)), Some((end, early))) = (latest_start, earliest_end) {
        if start > end {
            return Err(AlignmentError::NoOverlap {
                reason: format!(
                    "{} starts on {} but {} ends on {}",
                    late.id(),
                    start,
                    early.id(),
                    end
                ),
            });
        }
    }

    debug!(
        series = columns.len(),
        dates = dates.len(),
        %range,
        ?policy,
        "Aligned dataset"
    );
    AlignedDataset::new(dates, columns, NormalizationMode::Raw)
}

/// Fills `series` onto an existing sorted date index.
pub fn project(series: &Series, dates: &[NaiveDate], policy: FillPolicy) -> Vec<Option<f64>> {
    let points = series.points();
    let mut next = 0usize;
    dates
        .iter()
        .map(|date| {
            while next < points.len() && points[next].date <= *date {
                next += 1;
            }
            let prev = next.checked_sub(1).map(|i| points[i])?;
            match policy {
                FillPolicy::Forward => Some(prev.value),
                FillPolicy::Linear => Some(interpolate(prev, points.get(next).copied(), *date)),
            }
        })
        .collect()
}

fn interpolate(prev: Point, next: Option<Point>, date: NaiveDate) -> f64 {
    match next {
        Some(next) if prev.date != date => {
            let span = (next.date - prev.date).num_days() as f64;
            let offset = (date - prev.date).num_days() as f64;
            prev.value + (next.value - prev.value) * offset / span
        }
        _ => prev.value,
    }
}

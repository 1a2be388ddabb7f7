//! Flat records handed to a renderer (tables, charts or JSON output).

use crate::core::series::SeriesId;
use crate::engine::correlation::{CorrelationMatrix, SensitivityMap};
use crate::engine::dataset::AlignedDataset;
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimePoint {
    pub x: NaiveDate,
    pub y: f64,
    pub series: SeriesId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixCell {
    pub row: SeriesId,
    pub col: SeriesId,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityRecord {
    pub asset: SeriesId,
    /// One coefficient per driver, in the order of `SensitivityTable::drivers`.
    pub vector: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensitivityTable {
    pub drivers: Vec<SeriesId>,
    pub rows: Vec<SensitivityRecord>,
}

/// One point per present value, series by series. Missing values are omitted.
pub fn time_points(dataset: &AlignedDataset) -> Vec<TimePoint> {
    dataset
        .columns()
        .iter()
        .flat_map(|column| {
            dataset
                .dates()
                .iter()
                .zip(&column.values)
                .filter_map(|(date, value)| {
                    value.map(|y| TimePoint {
                        x: *date,
                        y,
                        series: column.id.clone(),
                    })
                })
        })
        .collect()
}

pub fn matrix_cells(matrix: &CorrelationMatrix) -> Vec<MatrixCell> {
    matrix
        .ids
        .iter()
        .enumerate()
        .flat_map(|(i, row)| {
            matrix.ids.iter().enumerate().map(move |(j, col)| MatrixCell {
                row: row.clone(),
                col: col.clone(),
                value: matrix.values[i][j],
            })
        })
        .collect()
}

pub fn sensitivity_table(map: &SensitivityMap) -> SensitivityTable {
    SensitivityTable {
        drivers: map.drivers.clone(),
        rows: map
            .rows
            .iter()
            .map(|row| SensitivityRecord {
                asset: row.asset.clone(),
                vector: row.vector.clone(),
            })
            .collect(),
    }
}

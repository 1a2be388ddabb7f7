//! Tabular CSV export of an aligned dataset.
//!
//! Layout: a `date` column followed by one column per series, ISO dates, missing values as empty
//! fields. Floats use Rust's shortest round-trip formatting, so a re-parse is lossless.

use crate::core::series::SeriesId;
use crate::engine::dataset::{AlignedDataset, Column};
use crate::engine::normalize::NormalizationMode;
use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use tracing::debug;

const DATE_HEADER: &str = "date";

pub fn to_csv(dataset: &AlignedDataset) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec![DATE_HEADER.to_string()];
    header.extend(dataset.columns().iter().map(|c| c.id.to_string()));
    writer.write_record(&header)?;

    for (i, date) in dataset.dates().iter().enumerate() {
        let mut record = vec![date.format("%Y-%m-%d").to_string()];
        record.extend(
            dataset
                .columns()
                .iter()
                .map(|c| c.values[i].map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }

    let bytes = writer.into_inner().context("Failed to flush CSV writer")?;
    debug!(rows = dataset.len(), bytes = bytes.len(), "Exported dataset to CSV");
    Ok(bytes)
}

/// Parses CSV written by [`to_csv`] back into a dataset tagged with `mode`.
pub fn from_csv(bytes: &[u8], mode: NormalizationMode) -> Result<AlignedDataset> {
    let mut reader = csv::Reader::from_reader(bytes);
    let headers = reader.headers().context("Missing CSV header")?.clone();
    if headers.get(0) != Some(DATE_HEADER) {
        bail!("First CSV column must be '{}'", DATE_HEADER);
    }

    let ids: Vec<SeriesId> = headers.iter().skip(1).map(SeriesId::from).collect();
    let mut dates = Vec::new();
    let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); ids.len()];

    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read CSV row {}", row + 1))?;
        let date = record.get(0).unwrap_or_default();
        dates.push(
            NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .with_context(|| format!("Invalid date '{}' on row {}", date, row + 1))?,
        );
        for (col, slot) in values.iter_mut().enumerate() {
            let field = record.get(col + 1).unwrap_or_default();
            slot.push(if field.is_empty() {
                None
            } else {
                Some(field.parse::<f64>().with_context(|| {
                    format!("Invalid value '{}' for {} on row {}", field, ids[col], row + 1)
                })?)
            });
        }
    }

    let columns = ids
        .into_iter()
        .zip(values)
        .map(|(id, values)| Column::new(id, values))
        .collect();
    Ok(AlignedDataset::new(dates, columns, mode)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::series::tests::date;

    fn dataset() -> AlignedDataset {
        AlignedDataset::new(
            vec![date("2024-01-31"), date("2024-02-29"), date("2024-03-31")],
            vec![
                Column::new("M2 Money Supply", vec![Some(20800.1), None, Some(0.1 + 0.2)]),
                Column::new("S&P 500", vec![None, Some(4845.65), Some(-1e-7)]),
            ],
            NormalizationMode::Raw,
        )
        .unwrap()
    }

    #[test]
    fn test_layout() {
        let text = String::from_utf8(to_csv(&dataset()).unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "date,M2 Money Supply,S&P 500");
        assert_eq!(lines[1], "2024-01-31,20800.1,");
        assert_eq!(lines[2], "2024-02-29,,4845.65");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_reparse_is_lossless() {
        let original = dataset();
        let parsed = from_csv(&to_csv(&original).unwrap(), NormalizationMode::Raw).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_rejects_foreign_csv() {
        assert!(from_csv(b"day,A\n2024-01-01,1\n", NormalizationMode::Raw).is_err());
        assert!(from_csv(b"date,A\n2024-01-01,abc\n", NormalizationMode::Raw).is_err());
    }
}

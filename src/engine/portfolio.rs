//! Weighted baskets and real-return denomination.

use crate::core::error::{AlignmentError, ConfigError, EngineError};
use crate::core::series::{Category, Frequency, Point, Series, SeriesId, SeriesSpec, Source};
use crate::engine::dataset::{AlignedDataset, Column};
use crate::engine::normalize::{NormalizationMode, index100};
use serde::Serialize;
use tracing::debug;

pub const DEFAULT_PORTFOLIO_NAME: &str = "Custom Portfolio";

/// Weights whose net sum is this small relative to their gross sum count as summing to zero.
pub const WEIGHT_SUM_EPSILON: f64 = 1e-9;

/// Asset weights normalized to sum to one, plus an optional denominator for real returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Basket {
    name: SeriesId,
    weights: Vec<(SeriesId, f64)>,
    denominator: Option<SeriesId>,
}

impl Basket {
    /// Validates and normalizes raw weights. Repeated assets have their weights summed.
    pub fn new(
        weights: impl IntoIterator<Item = (SeriesId, f64)>,
        denominator: Option<SeriesId>,
    ) -> Result<Self, ConfigError> {
        let mut merged: Vec<(SeriesId, f64)> = Vec::new();
        for (asset, weight) in weights {
            if !weight.is_finite() {
                return Err(ConfigError::InvalidWeight {
                    asset: asset.to_string(),
                });
            }
            match merged.iter_mut().find(|(id, _)| *id == asset) {
                Some((_, w)) => *w += weight,
                None => merged.push((asset, weight)),
            }
        }
        if merged.is_empty() {
            return Err(ConfigError::EmptyBasket);
        }
        let total: f64 = merged.iter().map(|(_, w)| w).sum();
        let gross: f64 = merged.iter().map(|(_, w)| w.abs()).sum();
        // Offsetting weights rarely cancel to exactly zero in floating point
        if !total.is_finite() || gross == 0.0 || total.abs() <= WEIGHT_SUM_EPSILON * gross {
            return Err(ConfigError::ZeroWeightSum);
        }
        for (_, w) in merged.iter_mut() {
            *w /= total;
        }
        Ok(Self {
            name: SeriesId::new(DEFAULT_PORTFOLIO_NAME),
            weights: merged,
            denominator,
        })
    }

    pub fn with_name(mut self, name: impl Into<SeriesId>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &SeriesId {
        &self.name
    }

    /// Normalized weights, in insertion order.
    pub fn weights(&self) -> &[(SeriesId, f64)] {
        &self.weights
    }

    pub fn denominator(&self) -> Option<&SeriesId> {
        self.denominator.as_ref()
    }

    pub fn assets(&self) -> Vec<SeriesId> {
        self.weights.iter().map(|(id, _)| id.clone()).collect()
    }
}

fn rebase(dataset: &AlignedDataset, values: &[Option<f64>]) -> Result<Vec<Option<f64>>, ConfigError> {
    match dataset.mode() {
        NormalizationMode::Raw | NormalizationMode::Index100 => {
            Ok(index100(values).unwrap_or_else(|| vec![None; values.len()]))
        }
        other => Err(ConfigError::ModeMismatch {
            from: other.to_string(),
            to: NormalizationMode::Index100.to_string(),
        }),
    }
}

/// Weighted sum of each asset's Index100 values, on dates where every asset is present.
pub fn composite_values(
    basket: &Basket,
    dataset: &AlignedDataset,
) -> Result<Vec<Option<f64>>, ConfigError> {
    let mut composite = vec![Some(0.0); dataset.len()];
    for (asset, weight) in &basket.weights {
        let rebased = rebase(dataset, &dataset.require(asset)?.values)?;
        for (acc, value) in composite.iter_mut().zip(rebased) {
            *acc = match (*acc, value) {
                (Some(sum), Some(v)) => Some(sum + weight * v),
                _ => None,
            };
        }
    }
    Ok(composite)
}

/// Simulates `basket` over `dataset` and returns the composite as a series of its own.
pub fn simulate(basket: &Basket, dataset: &AlignedDataset) -> Result<Series, EngineError> {
    let values = composite_values(basket, dataset)?;
    let spec = SeriesSpec {
        id: basket.name.clone(),
        symbol: basket.name.to_string(),
        source: Source::Derived,
        category: Category::Asset,
        frequency: Frequency::Daily,
        unit: Some("index".to_string()),
    };
    let series = Series::new(
        spec,
        dataset
            .dates()
            .iter()
            .zip(values)
            .filter_map(|(date, v)| v.map(|v| Point::new(*date, v)))
            .collect(),
    )?;
    debug!(basket = %basket.name, points = series.len(), "Simulated basket");
    Ok(series)
}

/// Appends the composite to `dataset` as a column named after the basket.
pub fn composite_column(basket: &Basket, dataset: &AlignedDataset) -> Result<AlignedDataset, EngineError> {
    let values = composite_values(basket, dataset)?;
    Ok(dataset.with_column(Column::new(basket.name.clone(), values))?)
}

fn ratio(numerator: &[Option<f64>], denominator: &[Option<f64>]) -> Vec<Option<f64>> {
    numerator
        .iter()
        .zip(denominator)
        .map(|(n, d)| match (n, d) {
            (Some(n), Some(d)) if *d != 0.0 => Some(n / d),
            _ => None,
        })
        .collect()
}

/// `id` expressed in units of `denominator`: both rebased to Index100, then divided per date.
pub fn denominated(
    dataset: &AlignedDataset,
    id: &SeriesId,
    denominator: &SeriesId,
) -> Result<Column, EngineError> {
    let numerator = rebase(dataset, &dataset.require(id)?.values)?;
    let denominator = rebase(dataset, &dataset.require(denominator)?.values)?;
    Ok(Column::new(id.clone(), ratio(&numerator, &denominator)))
}

/// Re-expresses every column of a raw dataset in units of `denominator`.
///
/// The denominator comes as values on the dataset's grid so it need not be one of its columns.
/// The result is raw data and can be normalized like any other dataset.
pub fn denominate_dataset(
    dataset: &AlignedDataset,
    denominator: &[Option<f64>],
) -> Result<AlignedDataset, EngineError> {
    if denominator.len() != dataset.len() {
        return Err(AlignmentError::Schema {
            reason: format!(
                "denominator has {} values for {} dates",
                denominator.len(),
                dataset.len()
            ),
        }
        .into());
    }
    let base = rebase(dataset, denominator)?;
    let columns = dataset
        .columns()
        .iter()
        .map(|column| {
            let rebased = rebase(dataset, &column.values)?;
            Ok(Column::new(column.id.clone(), ratio(&rebased, &base)))
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;
    Ok(dataset.derive(columns, NormalizationMode::Raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::series::tests::date;
    use crate::engine::normalize::normalize;
    use approx::assert_relative_eq;
    use chrono::Duration;

    fn dataset(columns: Vec<Column>) -> AlignedDataset {
        let len = columns[0].values.len();
        let dates = (0..len)
            .map(|i| date("2024-01-01") + Duration::days(i as i64))
            .collect();
        AlignedDataset::new(dates, columns, NormalizationMode::Raw).unwrap()
    }

    fn weights(pairs: &[(&str, f64)]) -> Vec<(SeriesId, f64)> {
        pairs.iter().map(|(id, w)| (SeriesId::from(*id), *w)).collect()
    }

    #[test]
    fn test_single_asset_equals_its_index100() {
        let ds = dataset(vec![Column::new(
            "Gold",
            vec![None, Some(1800.0), Some(1900.0), Some(2100.0)],
        )]);
        let basket = Basket::new(weights(&[("Gold", 3.0)]), None).unwrap();
        let composite = composite_values(&basket, &ds).unwrap();
        let indexed = normalize(&ds, NormalizationMode::Index100).unwrap();
        assert_eq!(composite, indexed.column(&"Gold".into()).unwrap().values);

        let series = simulate(&basket, &ds).unwrap();
        assert_eq!(series.len(), 3);
        assert_eq!(series.points()[0].value, 100.0);
        assert_eq!(series.id(), &SeriesId::from(DEFAULT_PORTFOLIO_NAME));
    }

    #[test]
    fn test_equal_returns_combine_linearly() {
        let ds = dataset(vec![
            Column::new("AssetX", vec![Some(50.0), Some(55.0)]),
            Column::new("AssetY", vec![Some(2000.0), Some(2200.0)]),
        ]);
        let basket = Basket::new(weights(&[("AssetX", 0.6), ("AssetY", 0.4)]), None).unwrap();
        let series = simulate(&basket, &ds).unwrap();
        let first = series.points()[0].value;
        let last = series.points()[1].value;
        assert_relative_eq!(last / first - 1.0, 0.10, epsilon = 1e-12);
    }

    #[test]
    fn test_weights_are_normalized() {
        let basket = Basket::new(weights(&[("A", 50.0), ("B", 50.0), ("A", 100.0)]), None).unwrap();
        assert_eq!(
            basket.weights(),
            &[(SeriesId::from("A"), 0.75), (SeriesId::from("B"), 0.25)]
        );
    }

    #[test]
    fn test_invalid_baskets() {
        assert_eq!(Basket::new(vec![], None).unwrap_err(), ConfigError::EmptyBasket);
        assert_eq!(
            Basket::new(weights(&[("A", 1.0), ("B", -1.0)]), None).unwrap_err(),
            ConfigError::ZeroWeightSum
        );
        assert!(matches!(
            Basket::new(weights(&[("A", f64::INFINITY)]), None),
            Err(ConfigError::InvalidWeight { .. })
        ));
        assert_eq!(
            Basket::new(weights(&[("A", 0.0), ("B", 0.0)]), None).unwrap_err(),
            ConfigError::ZeroWeightSum
        );
    }

    #[test]
    fn test_offsetting_weights_with_rounding_residue() {
        // 0.1 + 0.2 - 0.3 leaves about 5.5e-17 rather than zero
        assert_ne!(0.1 + 0.2 - 0.3, 0.0);
        assert_eq!(
            Basket::new(weights(&[("A", 0.1), ("B", 0.2), ("C", -0.3)]), None).unwrap_err(),
            ConfigError::ZeroWeightSum
        );

        // A small but genuine net exposure is still accepted
        let basket = Basket::new(weights(&[("A", 0.1), ("B", -0.09)]), None).unwrap();
        assert_relative_eq!(basket.weights()[0].1, 10.0, epsilon = 1e-9);
        assert_relative_eq!(basket.weights()[1].1, -9.0, epsilon = 1e-9);
    }

    #[test]
    fn test_composite_missing_until_every_asset_present() {
        let ds = dataset(vec![
            Column::new("Gold", vec![Some(10.0), Some(11.0), Some(12.0)]),
            Column::new("Bitcoin", vec![None, Some(1.0), Some(2.0)]),
        ]);
        let basket = Basket::new(weights(&[("Gold", 1.0), ("Bitcoin", 1.0)]), None).unwrap();
        let out = composite_column(&basket, &ds).unwrap();
        let values = &out.column(&DEFAULT_PORTFOLIO_NAME.into()).unwrap().values;
        assert_eq!(values[0], None);
        assert_relative_eq!(values[1].unwrap(), 0.5 * 110.0 + 0.5 * 100.0);

        let unknown = Basket::new(weights(&[("Silver", 1.0)]), None).unwrap();
        assert!(matches!(
            simulate(&unknown, &ds),
            Err(EngineError::Config(ConfigError::UnknownSeries { .. }))
        ));
    }

    #[test]
    fn test_denominated_propagates_missing_and_zero() {
        let ds = dataset(vec![
            Column::new("S&P 500", vec![Some(100.0), Some(200.0), Some(300.0), Some(400.0)]),
            Column::new("Gold", vec![Some(10.0), None, Some(0.0), Some(20.0)]),
        ]);
        let real = denominated(&ds, &"S&P 500".into(), &"Gold".into()).unwrap();
        assert_eq!(real.values[0], Some(1.0));
        assert_eq!(real.values[1], None);
        assert_eq!(real.values[2], None);
        assert_relative_eq!(real.values[3].unwrap(), 2.0);
    }

    #[test]
    fn test_denominate_dataset() {
        let ds = dataset(vec![
            Column::new("Bitcoin", vec![Some(5.0), Some(10.0)]),
            Column::new("Silver", vec![Some(20.0), Some(20.0)]),
        ]);
        let gold = vec![Some(1000.0), Some(2000.0)];
        let out = denominate_dataset(&ds, &gold).unwrap();
        assert_eq!(out.mode(), NormalizationMode::Raw);
        assert_eq!(out.column(&"Bitcoin".into()).unwrap().values, vec![Some(1.0), Some(1.0)]);
        assert_eq!(out.column(&"Silver".into()).unwrap().values, vec![Some(1.0), Some(0.5)]);

        assert!(matches!(
            denominate_dataset(&ds, &[Some(1.0)]),
            Err(EngineError::Alignment(AlignmentError::Schema { .. }))
        ));
    }
}

//! In-memory holder of raw fetched series.
//!
//! Every series is fetched once at its maximum available history and published into a
//! write-once cache, so narrowing or widening the date range later never goes back to the
//! provider.

use crate::core::cache::Cache;
use crate::core::error::ProviderError;
use crate::core::provider::SeriesProvider;
use crate::core::range::DateRange;
use crate::core::series::{Series, SeriesSpec, SeriesView};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct SeriesStore {
    provider: Arc<dyn SeriesProvider>,
    cache: Cache<SeriesSpec, Series>,
}

impl SeriesStore {
    pub fn new(provider: Arc<dyn SeriesProvider>) -> Self {
        Self {
            provider,
            cache: Cache::new(),
        }
    }

    /// Returns the full history of `spec`, fetching it on first use.
    ///
    /// Failures are handed back as-is and not remembered, so a later request tries again.
    pub async fn get(&self, spec: &SeriesSpec) -> Result<Arc<Series>, ProviderError> {
        if let Some(series) = self.cache.get(spec).await {
            return Ok(series);
        }
        debug!(series = %spec.id, symbol = %spec.symbol, source = %spec.source, "Fetching max history");
        match self.provider.fetch(spec).await {
            Ok(series) => Ok(self.cache.publish(spec.clone(), series).await),
            Err(e) => {
                warn!(series = %spec.id, error = %e, "Failed to load series");
                Err(e)
            }
        }
    }

    /// Read-only window over `[range.start, range.end)` of an already loaded series.
    pub fn slice<'a>(&self, series: &'a Series, range: DateRange) -> SeriesView<'a> {
        series.slice(range)
    }

    /// Loads `specs` concurrently ahead of first use. `on_loaded` runs once per spec as each
    /// fetch settles.
    pub async fn prefetch<F>(
        &self,
        specs: &[SeriesSpec],
        on_loaded: F,
    ) -> Vec<(SeriesSpec, Result<Arc<Series>, ProviderError>)>
    where
        F: Fn(&SeriesSpec) + Sync,
    {
        let on_loaded = &on_loaded;
        let futures = specs.iter().map(|spec| async move {
            let result = self.get(spec).await;
            on_loaded(spec);
            (spec.clone(), result)
        });
        join_all(futures).await
    }

    pub async fn loaded(&self) -> usize {
        self.cache.len().await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::core::series::Point;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves canned series by symbol and counts fetches.
    #[derive(Default)]
    pub(crate) struct MockProvider {
        pub(crate) points: HashMap<String, Vec<Point>>,
        pub(crate) failures: HashMap<String, ProviderError>,
        pub(crate) calls: AtomicUsize,
    }

    impl MockProvider {
        pub(crate) fn with_series(mut self, symbol: &str, points: Vec<Point>) -> Self {
            self.points.insert(symbol.to_string(), points);
            self
        }

        pub(crate) fn with_failure(mut self, symbol: &str, error: ProviderError) -> Self {
            self.failures.insert(symbol.to_string(), error);
            self
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SeriesProvider for MockProvider {
        async fn fetch(&self, spec: &SeriesSpec) -> Result<Series, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(error) = self.failures.get(&spec.symbol) {
                return Err(error.clone());
            }
            match self.points.get(&spec.symbol) {
                Some(points) => Series::new(spec.clone(), points.clone()),
                None => Err(ProviderError::SymbolNotFound {
                    symbol: spec.symbol.clone(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MockProvider;
    use super::*;
    use crate::core::series::tests::{date, spec};
    use crate::core::series::{Category, Frequency, Point};

    fn points(days: &[(&str, f64)]) -> Vec<Point> {
        days.iter().map(|(d, v)| Point::new(date(d), *v)).collect()
    }

    fn gold() -> SeriesSpec {
        spec("Gold", Category::Asset, Frequency::Daily)
    }

    #[tokio::test]
    async fn test_fetches_once_at_max_history() {
        let provider = Arc::new(MockProvider::default().with_series(
            "GOLD",
            points(&[("2000-01-03", 280.0), ("2024-01-02", 2060.0)]),
        ));
        let store = SeriesStore::new(provider.clone());

        let first = store.get(&gold()).await.unwrap();
        let again = store.get(&gold()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(provider.calls(), 1);

        let narrow = DateRange::new(date("2020-01-01"), date("2025-01-01")).unwrap();
        let view = store.slice(&first, narrow);
        assert_eq!(view.len(), 1);
        assert_eq!(first.len(), 2);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let provider = Arc::new(MockProvider::default().with_failure(
            "GOLD",
            ProviderError::RateLimited {
                symbol: "GOLD".to_string(),
            },
        ));
        let store = SeriesStore::new(provider.clone());

        assert!(matches!(
            store.get(&gold()).await,
            Err(ProviderError::RateLimited { .. })
        ));
        assert!(store.get(&gold()).await.is_err());
        assert_eq!(provider.calls(), 2);
        assert_eq!(store.loaded().await, 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_prefetch_reports_each_spec() {
        let provider = Arc::new(
            MockProvider::default()
                .with_series("GOLD", points(&[("2024-01-02", 2060.0)]))
                .with_series("M2", points(&[("2024-01-01", 20800.0)])),
        );
        let store = SeriesStore::new(provider.clone());
        let specs = vec![
            gold(),
            spec("M2", Category::Macro, Frequency::Monthly),
            spec("Nope", Category::Asset, Frequency::Daily),
        ];

        let seen = std::sync::atomic::AtomicUsize::new(0);
        let results = store
            .prefetch(&specs, |_| {
                seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            })
            .await;

        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 3);
        assert_eq!(results.len(), 3);
        assert!(results[0].1.is_ok());
        assert!(matches!(
            results[2].1,
            Err(ProviderError::SymbolNotFound { .. })
        ));
        assert_eq!(store.loaded().await, 2);

        store.get(&gold()).await.unwrap();
        assert_eq!(provider.calls(), 3);
    }
}

//! Request orchestration: fetch, align, normalize and analyze.
//!
//! Every stage result is published into a cache keyed by the content of its inputs (series set,
//! range preset, fill policy, shift, mode, window and so on), so toggling a control back to an
//! earlier value is a cache hit. Datasets missing a series because its fetch failed are handed
//! out but never published; the next request retries the fetch.

use crate::core::cache::Cache;
use crate::core::config::{AnalysisConfig, AppConfig};
use crate::core::error::{AlignmentError, ConfigError, EngineError};
use crate::core::range::RangePreset;
use crate::core::series::{Category, Series, SeriesId, SeriesSpec};
use crate::engine::align::{FillPolicy, align, project};
use crate::engine::correlation::{
    CorrelationMatrix, RollingCorrelation, SensitivityMap, correlation_matrix, monthly_returns,
    rolling_correlation, sensitivity_map,
};
use crate::engine::dataset::{AlignedDataset, Annotation};
use crate::engine::events::{MacroEvent, events_in};
use crate::engine::insights::{
    Leaderboard, PurchasingPower, RegimeReport, leaderboard, purchasing_power, regimes,
};
use crate::engine::lag::{LagRange, LagScan, ShiftedDataset, check_lag, scan_lags};
use crate::engine::normalize::{NormalizationMode, normalize};
use crate::engine::overlay::{Overlay, overlays};
use crate::engine::portfolio::{Basket, denominate_dataset, simulate};
use crate::engine::stats::{Regression, complete_pairs, regression};
use crate::providers::SourceRouter;
use crate::store::SeriesStore;
use chrono::NaiveDate;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, info};

/// What the user is looking at: a series selection over a date range in one mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnalysisRequest {
    /// Selected series; the first one is the reference for `shift`.
    pub series: Vec<SeriesId>,
    pub range: RangePreset,
    pub mode: NormalizationMode,
    pub window: usize,
    /// Grid periods every column except the reference is shifted by.
    pub shift: i64,
    /// Express every column in units of this series.
    pub denominator: Option<SeriesId>,
}

impl AnalysisRequest {
    pub fn new(series: Vec<SeriesId>) -> Self {
        let defaults = AnalysisConfig::default();
        Self {
            series,
            range: defaults.range,
            mode: defaults.mode,
            window: defaults.window,
            shift: 0,
            denominator: None,
        }
    }

    /// Copy with `extra` appended where not already selected.
    pub fn including(&self, extra: &[SeriesId]) -> Self {
        let mut request = self.clone();
        for id in extra {
            if !request.series.contains(id) {
                request.series.push(id.clone());
            }
        }
        request
    }

    pub fn unshifted(&self) -> Self {
        Self {
            shift: 0,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetKey {
    pub series: Vec<SeriesId>,
    pub range: RangePreset,
    pub fill: FillPolicy,
    pub shift: i64,
    pub denominator: Option<SeriesId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ViewKey {
    pub dataset: DatasetKey,
    pub mode: NormalizationMode,
}

/// Parameters of one analytic beyond its dataset. Floats are keyed by their bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AnalyticKind {
    Matrix,
    Rolling {
        a: SeriesId,
        b: SeriesId,
        window: usize,
    },
    Lag {
        a: SeriesId,
        b: SeriesId,
        range: LagRange,
    },
    Overlay {
        mode: NormalizationMode,
        window: usize,
        multiplier: u64,
    },
    Sensitivity {
        assets: Vec<SeriesId>,
        drivers: Vec<SeriesId>,
    },
    Regression {
        x: SeriesId,
        y: SeriesId,
    },
    Portfolio {
        name: SeriesId,
        weights: Vec<(SeriesId, u64)>,
    },
    Leaderboard {
        reference: SeriesId,
    },
    Regimes {
        series: SeriesId,
        lookback: usize,
        threshold: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnalyticKey {
    pub dataset: DatasetKey,
    pub kind: AnalyticKind,
}

async fn memoize<K, V, E, F>(
    cache: &Cache<K, V>,
    key: K,
    publish: bool,
    compute: F,
) -> Result<Arc<V>, E>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
    F: FnOnce() -> Result<V, E>,
{
    if publish {
        cache.get_or_try_publish(key, compute).await
    } else {
        compute().map(Arc::new)
    }
}

fn new_cache<K, V>(capacity: Option<usize>) -> Cache<K, V>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    match capacity {
        Some(capacity) => Cache::with_capacity(capacity),
        None => Cache::new(),
    }
}

pub struct Session {
    store: SeriesStore,
    catalog: Vec<SeriesSpec>,
    settings: AnalysisConfig,
    datasets: Cache<DatasetKey, AlignedDataset>,
    views: Cache<ViewKey, AlignedDataset>,
    matrices: Cache<AnalyticKey, CorrelationMatrix>,
    rolling: Cache<AnalyticKey, RollingCorrelation>,
    lags: Cache<AnalyticKey, LagScan>,
    overlays: Cache<AnalyticKey, Vec<Overlay>>,
    sensitivities: Cache<AnalyticKey, SensitivityMap>,
    regressions: Cache<AnalyticKey, Option<Regression>>,
    portfolios: Cache<AnalyticKey, Series>,
    leaderboards: Cache<AnalyticKey, Leaderboard>,
    regimes: Cache<AnalyticKey, RegimeReport>,
}

impl Session {
    pub fn new(store: SeriesStore, catalog: Vec<SeriesSpec>, settings: AnalysisConfig) -> Self {
        let capacity = settings.cache_capacity;
        Self {
            store,
            catalog,
            settings,
            datasets: new_cache(capacity),
            views: new_cache(capacity),
            matrices: new_cache(capacity),
            rolling: new_cache(capacity),
            lags: new_cache(capacity),
            overlays: new_cache(capacity),
            sensitivities: new_cache(capacity),
            regressions: new_cache(capacity),
            portfolios: new_cache(capacity),
            leaderboards: new_cache(capacity),
            regimes: new_cache(capacity),
        }
    }

    /// Session fetching through the providers configured in `config`.
    pub fn from_config(config: &AppConfig) -> Self {
        let router = SourceRouter::from_config(&config.providers);
        let store = SeriesStore::new(Arc::new(router));
        let mut config = config.clone();
        config.canonicalize();
        Self::new(store, config.series, config.analysis)
    }

    pub fn settings(&self) -> &AnalysisConfig {
        &self.settings
    }

    pub fn catalog(&self) -> &[SeriesSpec] {
        &self.catalog
    }

    /// A request over `series` carrying the configured range, mode and window.
    pub fn request(&self, series: Vec<SeriesId>) -> AnalysisRequest {
        AnalysisRequest {
            series,
            range: self.settings.range,
            mode: self.settings.mode,
            window: self.settings.window,
            shift: 0,
            denominator: None,
        }
    }

    pub fn spec(&self, id: &SeriesId) -> Result<&SeriesSpec, ConfigError> {
        self.catalog
            .iter()
            .find(|s| &s.id == id)
            .ok_or_else(|| ConfigError::UnknownSeries {
                name: id.to_string(),
            })
    }

    fn specs(&self, ids: &[SeriesId]) -> Result<Vec<SeriesSpec>, ConfigError> {
        ids.iter().map(|id| self.spec(id).cloned()).collect()
    }

    fn dataset_key(&self, request: &AnalysisRequest) -> DatasetKey {
        DatasetKey {
            series: request.series.clone(),
            range: request.range,
            fill: self.settings.fill,
            shift: request.shift,
            denominator: request.denominator.clone(),
        }
    }

    fn analytic_key(&self, request: &AnalysisRequest, kind: AnalyticKind) -> AnalyticKey {
        AnalyticKey {
            dataset: self.dataset_key(request),
            kind,
        }
    }

    /// Loads `ids` concurrently ahead of use; returns how many loaded.
    pub async fn prefetch<F>(&self, ids: &[SeriesId], on_loaded: F) -> Result<usize, ConfigError>
    where
        F: Fn(&SeriesSpec) + Sync,
    {
        let specs = self.specs(ids)?;
        let results = self.store.prefetch(&specs, on_loaded).await;
        Ok(results.iter().filter(|(_, r)| r.is_ok()).count())
    }

    /// Raw aligned dataset for `request`, denominated and shifted as requested.
    ///
    /// Series that fail to load are left out and reported as annotations. The call fails only
    /// when nothing loads, or when the denominator does not.
    pub async fn dataset(
        &self,
        request: &AnalysisRequest,
    ) -> Result<Arc<AlignedDataset>, EngineError> {
        let key = self.dataset_key(request);
        if let Some(hit) = self.datasets.get(&key).await {
            return Ok(hit);
        }
        if request.series.is_empty() {
            return Err(AlignmentError::EmptySelection.into());
        }
        let specs = self.specs(&request.series)?;
        let denominator = request
            .denominator
            .as_ref()
            .map(|id| self.spec(id).cloned())
            .transpose()?;

        let mut loaded = Vec::with_capacity(specs.len());
        let mut failures = Vec::new();
        let mut first_error = None;
        for (spec, result) in self.store.prefetch(&specs, |_| {}).await {
            match result {
                Ok(series) => loaded.push(series),
                Err(e) => {
                    failures.push(Annotation::ProviderFailure {
                        series: spec.id.clone(),
                        reason: e.to_string(),
                    });
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error.filter(|_| loaded.is_empty()) {
            return Err(e.into());
        }

        let earliest = loaded.iter().filter_map(|s| s.first_date()).min();
        let latest = loaded.iter().filter_map(|s| s.last_date()).max();
        let (Some(earliest), Some(latest)) = (earliest, latest) else {
            return Err(AlignmentError::EmptySelection.into());
        };
        let range = request.range.resolve(earliest, latest)?;
        let mut dataset = align(&loaded, range, self.settings.fill)?;

        if let Some(spec) = denominator {
            let series = self.store.get(&spec).await?;
            let values = project(&series, dataset.dates(), self.settings.fill);
            dataset = denominate_dataset(&dataset, &values)?;
        }
        if request.shift != 0 {
            check_lag(request.shift, dataset.len())?;
            if let Some(reference) = dataset.columns().first().map(|c| c.id.clone()) {
                dataset = ShiftedDataset::others(dataset, &reference, request.shift).materialize();
            }
        }

        let dataset = dataset.with_annotations(failures);
        info!(
            series = dataset.columns().len(),
            dates = dataset.len(),
            %range,
            partial = dataset.is_partial(),
            "Built dataset"
        );
        if dataset.is_partial() {
            return Ok(Arc::new(dataset));
        }
        Ok(self.datasets.publish(key, dataset).await)
    }

    async fn normalized(
        &self,
        request: &AnalysisRequest,
        dataset: &AlignedDataset,
        mode: NormalizationMode,
    ) -> Result<Arc<AlignedDataset>, EngineError> {
        let key = ViewKey {
            dataset: self.dataset_key(request),
            mode,
        };
        Ok(memoize(&self.views, key, !dataset.is_partial(), || {
            normalize(dataset, mode)
        })
        .await?)
    }

    /// The request's dataset in the request's normalization mode.
    pub async fn view(&self, request: &AnalysisRequest) -> Result<Arc<AlignedDataset>, EngineError> {
        let dataset = self.dataset(request).await?;
        self.normalized(request, &dataset, request.mode).await
    }

    pub async fn correlation_matrix(
        &self,
        request: &AnalysisRequest,
    ) -> Result<Arc<CorrelationMatrix>, EngineError> {
        let dataset = self.dataset(request).await?;
        let key = self.analytic_key(request, AnalyticKind::Matrix);
        memoize(&self.matrices, key, !dataset.is_partial(), || {
            Ok(correlation_matrix(&dataset))
        })
        .await
    }

    /// Rolling correlation of period-over-period changes over `request.window` grid periods.
    pub async fn rolling_correlation(
        &self,
        request: &AnalysisRequest,
        a: &SeriesId,
        b: &SeriesId,
    ) -> Result<Arc<RollingCorrelation>, EngineError> {
        let dataset = self.dataset(request).await?;
        let changes = self
            .normalized(request, &dataset, NormalizationMode::PercentChange)
            .await?;
        let key = self.analytic_key(
            request,
            AnalyticKind::Rolling {
                a: a.clone(),
                b: b.clone(),
                window: request.window,
            },
        );
        memoize(&self.rolling, key, !dataset.is_partial(), || {
            rolling_correlation(&changes, a, b, request.window)
        })
        .await
    }

    /// Lead/lag scan of monthly returns; `k` counts months. The request's own shift is ignored.
    pub async fn lag_scan(
        &self,
        request: &AnalysisRequest,
        a: &SeriesId,
        b: &SeriesId,
        range: LagRange,
    ) -> Result<Arc<LagScan>, EngineError> {
        let request = request.unshifted();
        let dataset = self.dataset(&request).await?;
        let key = self.analytic_key(
            &request,
            AnalyticKind::Lag {
                a: a.clone(),
                b: b.clone(),
                range,
            },
        );
        Ok(memoize(&self.lags, key, !dataset.is_partial(), || {
            scan_lags(&monthly_returns(&dataset), a, b, range)
        })
        .await?)
    }

    /// SMA and Bollinger bands of every column of the request's view.
    pub async fn overlays(
        &self,
        request: &AnalysisRequest,
        multiplier: f64,
    ) -> Result<Arc<Vec<Overlay>>, EngineError> {
        let view = self.view(request).await?;
        let key = self.analytic_key(
            request,
            AnalyticKind::Overlay {
                mode: request.mode,
                window: request.window,
                multiplier: multiplier.to_bits(),
            },
        );
        Ok(memoize(&self.overlays, key, !view.is_partial(), || {
            overlays(&view, request.window, multiplier)
        })
        .await?)
    }

    /// Correlates each selected asset with each configured macro driver.
    ///
    /// Drivers are loaded alongside the selection; ones missing from the catalog or failing to
    /// load drop out of the map.
    pub async fn sensitivity(
        &self,
        request: &AnalysisRequest,
    ) -> Result<Arc<SensitivityMap>, EngineError> {
        let drivers: Vec<SeriesId> = self
            .settings
            .drivers
            .iter()
            .filter(|d| self.spec(d).is_ok())
            .cloned()
            .collect();
        let assets: Vec<SeriesId> = request
            .series
            .iter()
            .filter(|id| !drivers.contains(id))
            .filter(|id| matches!(self.spec(id), Ok(spec) if spec.category == Category::Asset))
            .cloned()
            .collect();

        let request = request.including(&drivers);
        let dataset = self.dataset(&request).await?;
        let assets: Vec<SeriesId> = assets
            .into_iter()
            .filter(|id| dataset.column(id).is_some())
            .collect();
        let key = self.analytic_key(
            &request,
            AnalyticKind::Sensitivity {
                assets: assets.clone(),
                drivers: drivers.clone(),
            },
        );
        Ok(memoize(&self.sensitivities, key, !dataset.is_partial(), || {
            sensitivity_map(&dataset, &assets, &drivers)
        })
        .await?)
    }

    /// OLS of `y` monthly returns on `x` monthly returns.
    pub async fn regression(
        &self,
        request: &AnalysisRequest,
        x: &SeriesId,
        y: &SeriesId,
    ) -> Result<Option<Regression>, EngineError> {
        let request = request.including(&[x.clone(), y.clone()]);
        let dataset = self.dataset(&request).await?;
        let key = self.analytic_key(
            &request,
            AnalyticKind::Regression {
                x: x.clone(),
                y: y.clone(),
            },
        );
        let fit = memoize(&self.regressions, key, !dataset.is_partial(), || {
            let returns = monthly_returns(&dataset);
            let (xs, ys) = complete_pairs(&returns.require(x)?.values, &returns.require(y)?.values);
            Ok::<_, ConfigError>(regression(&xs, &ys))
        })
        .await?;
        Ok(*fit)
    }

    /// Simulates `basket` over the request's range.
    pub async fn portfolio(
        &self,
        request: &AnalysisRequest,
        basket: &Basket,
    ) -> Result<Arc<Series>, EngineError> {
        let request = AnalysisRequest {
            series: basket.assets(),
            denominator: basket.denominator().cloned(),
            shift: 0,
            ..request.clone()
        };
        let dataset = self.dataset(&request).await?;
        let key = self.analytic_key(
            &request,
            AnalyticKind::Portfolio {
                name: basket.name().clone(),
                weights: basket
                    .weights()
                    .iter()
                    .map(|(id, w)| (id.clone(), w.to_bits()))
                    .collect(),
            },
        );
        memoize(&self.portfolios, key, !dataset.is_partial(), || {
            simulate(basket, &dataset)
        })
        .await
    }

    /// Ranks every other selected series by growth in excess of `reference`.
    pub async fn leaderboard(
        &self,
        request: &AnalysisRequest,
        reference: &SeriesId,
    ) -> Result<Arc<Leaderboard>, EngineError> {
        let request = request.unshifted().including(std::slice::from_ref(reference));
        let dataset = self.dataset(&request).await?;
        let assets: Vec<SeriesId> = dataset
            .ids()
            .into_iter()
            .filter(|id| id != reference)
            .collect();
        let key = self.analytic_key(
            &request,
            AnalyticKind::Leaderboard {
                reference: reference.clone(),
            },
        );
        Ok(memoize(&self.leaderboards, key, !dataset.is_partial(), || {
            leaderboard(&dataset, reference, &assets)
        })
        .await?)
    }

    /// What `amount` held at `base_date` buys at the end of the window, per series.
    pub async fn purchasing_power(
        &self,
        request: &AnalysisRequest,
        amount: f64,
        base_date: NaiveDate,
    ) -> Result<Option<PurchasingPower>, EngineError> {
        let dataset = self.dataset(&request.unshifted()).await?;
        Ok(purchasing_power(&dataset, amount, base_date))
    }

    /// Configured events falling inside the dates the request's dataset covers.
    pub async fn events(&self, request: &AnalysisRequest) -> Result<Vec<MacroEvent>, EngineError> {
        let dataset = self.dataset(request).await?;
        let dates = dataset.dates();
        Ok(match (dates.first(), dates.last()) {
            (Some(first), Some(last)) => events_in(&self.settings.events, *first, *last),
            _ => Vec::new(),
        })
    }

    /// Easy-money regimes of the configured regime series, fetched even when not selected.
    pub async fn regimes(&self, request: &AnalysisRequest) -> Result<Arc<RegimeReport>, EngineError> {
        let settings = &self.settings.regime;
        let request = request
            .unshifted()
            .including(std::slice::from_ref(&settings.series));
        let dataset = self.dataset(&request).await?;
        let key = self.analytic_key(
            &request,
            AnalyticKind::Regimes {
                series: settings.series.clone(),
                lookback: settings.lookback,
                threshold: settings.threshold.to_bits(),
            },
        );
        debug!(series = %settings.series, "Computing regimes");
        Ok(memoize(&self.regimes, key, !dataset.is_partial(), || {
            regimes(&dataset, &settings.series, settings.lookback, settings.threshold)
        })
        .await?)
    }
}

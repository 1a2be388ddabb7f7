use crate::core::error::ConfigError;
use crate::core::range::RangePreset;
use crate::core::series::{SeriesId, SeriesSpec};
use crate::engine::align::FillPolicy;
use crate::engine::events::{MacroEvent, default_events};
use crate::engine::insights::{DEFAULT_REGIME_LOOKBACK, DEFAULT_REGIME_THRESHOLD};
use crate::engine::lag::LagRange;
use crate::engine::normalize::NormalizationMode;
use crate::engine::overlay::DEFAULT_MULTIPLIER;
use crate::engine::portfolio::Basket;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FredProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

fn default_retries() -> usize {
    2
}

fn default_retry_delay_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProvidersConfig {
    pub fred: Option<FredProviderConfig>,
    pub yahoo: Option<YahooProviderConfig>,
    #[serde(default = "default_retries")]
    pub retries: usize,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            fred: Some(FredProviderConfig {
                base_url: "https://fred.stlouisfed.org".to_string(),
            }),
            yahoo: Some(YahooProviderConfig {
                base_url: "https://query1.finance.yahoo.com".to_string(),
            }),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RegimeConfig {
    pub series: SeriesId,
    pub lookback: usize,
    pub threshold: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            series: SeriesId::new("M2 Money Supply"),
            lookback: DEFAULT_REGIME_LOOKBACK,
            threshold: DEFAULT_REGIME_THRESHOLD,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub range: RangePreset,
    pub mode: NormalizationMode,
    pub window: usize,
    pub bollinger_multiplier: f64,
    pub lag_range: LagRange,
    pub fill: FillPolicy,
    /// Macro drivers the sensitivity map correlates every asset against.
    pub drivers: Vec<SeriesId>,
    pub regime: RegimeConfig,
    /// Dated markers shown alongside comparisons that span them.
    pub events: Vec<MacroEvent>,
    /// Maximum entries per derived-result cache; unbounded when absent.
    pub cache_capacity: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            range: RangePreset::default(),
            mode: NormalizationMode::default(),
            window: 12,
            bollinger_multiplier: DEFAULT_MULTIPLIER,
            lag_range: LagRange::default(),
            fill: FillPolicy::default(),
            drivers: [
                "M2 Money Supply",
                "CPI (Inflation)",
                "US Dollar Index",
                "Yield Curve (10Y-2Y)",
            ]
            .into_iter()
            .map(SeriesId::new)
            .collect(),
            regime: RegimeConfig::default(),
            events: default_events(),
            cache_capacity: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BasketConfig {
    pub name: String,
    pub weights: BTreeMap<SeriesId, f64>,
    #[serde(default)]
    pub denominator: Option<SeriesId>,
}

impl BasketConfig {
    /// Builds the basket with every member resolved to its identity in `catalog`.
    pub fn to_basket(&self, catalog: &[SeriesSpec]) -> Result<Basket, ConfigError> {
        Ok(Basket::new(
            self.weights
                .iter()
                .map(|(id, w)| (canonical_id(catalog, id), *w)),
            self.denominator.as_ref().map(|d| canonical_id(catalog, d)),
        )?
        .with_name(self.name.as_str()))
    }
}

/// Named preset view.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StoryConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub references: Vec<SeriesId>,
    #[serde(default)]
    pub assets: Vec<SeriesId>,
    #[serde(default)]
    pub range: Option<RangePreset>,
    #[serde(default)]
    pub mode: Option<NormalizationMode>,
    #[serde(default)]
    pub denominator: Option<SeriesId>,
}

impl StoryConfig {
    /// References first, then assets.
    pub fn series(&self) -> Vec<SeriesId> {
        self.references.iter().chain(&self.assets).cloned().collect()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub series: Vec<SeriesSpec>,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub baskets: Vec<BasketConfig>,
    #[serde(default)]
    pub stories: Vec<StoryConfig>,
}

/// Catalog entry for `name`: by name, then by provider symbol, ignoring case.
fn find_spec<'a>(catalog: &'a [SeriesSpec], name: &str) -> Option<&'a SeriesSpec> {
    let wanted = name.trim();
    catalog
        .iter()
        .find(|s| s.id.as_str().eq_ignore_ascii_case(wanted))
        .or_else(|| catalog.iter().find(|s| s.symbol.eq_ignore_ascii_case(wanted)))
}

/// Catalog identity of `id`, or `id` unchanged when the catalog does not know it.
pub fn canonical_id(catalog: &[SeriesSpec], id: &SeriesId) -> SeriesId {
    find_spec(catalog, id.as_str()).map_or_else(|| id.clone(), |s| s.id.clone())
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "xasset", "xasset")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))?;
        config.canonicalize();
        debug!(series = config.series.len(), "Successfully loaded config");
        Ok(config)
    }

    /// Rejects settings no analysis could run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let analysis = &self.analysis;
        if analysis.window == 0 || analysis.regime.lookback == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if !analysis.bollinger_multiplier.is_finite() || analysis.bollinger_multiplier <= 0.0 {
            return Err(ConfigError::InvalidMultiplier {
                value: analysis.bollinger_multiplier,
            });
        }
        LagRange::new(analysis.lag_range.min, analysis.lag_range.max)?;

        for basket in &self.baskets {
            basket.to_basket(&self.series)?;
            for id in basket.weights.keys().chain(&basket.denominator) {
                self.series_spec(id.as_str())?;
            }
        }
        for story in &self.stories {
            for id in story.series().iter().chain(&story.denominator) {
                self.series_spec(id.as_str())?;
            }
        }
        Ok(())
    }

    /// Looks a series up by catalog name or provider symbol, ignoring case.
    pub fn series_spec(&self, name: &str) -> Result<&SeriesSpec, ConfigError> {
        find_spec(&self.series, name).ok_or_else(|| ConfigError::UnknownSeries {
            name: name.to_string(),
        })
    }

    pub fn canonical_id(&self, id: &SeriesId) -> SeriesId {
        canonical_id(&self.series, id)
    }

    /// Rewrites every series reference (basket members and denominators, story series, drivers
    /// and the regime series) to the catalog name it resolves to. Unknown references are kept
    /// as written; `validate` reports the ones that matter.
    pub fn canonicalize(&mut self) {
        let catalog = &self.series;
        for basket in &mut self.baskets {
            let mut weights = BTreeMap::new();
            for (id, w) in std::mem::take(&mut basket.weights) {
                *weights.entry(canonical_id(catalog, &id)).or_insert(0.0) += w;
            }
            basket.weights = weights;
            if let Some(d) = basket.denominator.as_mut() {
                *d = canonical_id(catalog, d);
            }
        }
        for story in &mut self.stories {
            for id in story
                .references
                .iter_mut()
                .chain(story.assets.iter_mut())
                .chain(story.denominator.iter_mut())
            {
                *id = canonical_id(catalog, id);
            }
        }
        let analysis = &mut self.analysis;
        for driver in &mut analysis.drivers {
            *driver = canonical_id(catalog, driver);
        }
        analysis.regime.series = canonical_id(catalog, &analysis.regime.series);
    }

    pub fn basket(&self, name: &str) -> Result<Basket, ConfigError> {
        self.baskets
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| ConfigError::UnknownBasket {
                name: name.to_string(),
            })?
            .to_basket(&self.series)
    }

    pub fn story(&self, name: &str) -> Result<&StoryConfig, ConfigError> {
        self.stories
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| ConfigError::UnknownStory {
                name: name.to_string(),
            })
    }
}

pub mod fred;
pub mod util;
pub mod yahoo_finance;

use crate::core::config::ProvidersConfig;
use crate::core::error::ProviderError;
use crate::core::provider::SeriesProvider;
use crate::core::series::{Series, SeriesSpec, Source};
use async_trait::async_trait;
use fred::FredProvider;
use yahoo_finance::YahooFinanceProvider;

/// Dispatches each fetch to the provider configured for the spec's source.
pub struct SourceRouter {
    fred: Option<FredProvider>,
    yahoo: Option<YahooFinanceProvider>,
}

impl SourceRouter {
    pub fn from_config(config: &ProvidersConfig) -> Self {
        Self {
            fred: config
                .fred
                .as_ref()
                .map(|p| FredProvider::new(&p.base_url, config.retries, config.retry_delay_ms)),
            yahoo: config.yahoo.as_ref().map(|p| {
                YahooFinanceProvider::new(&p.base_url, config.retries, config.retry_delay_ms)
            }),
        }
    }
}

#[async_trait]
impl SeriesProvider for SourceRouter {
    async fn fetch(&self, spec: &SeriesSpec) -> Result<Series, ProviderError> {
        let provider: &dyn SeriesProvider = match (spec.source, &self.fred, &self.yahoo) {
            (Source::Fred, Some(fred), _) => fred,
            (Source::Yahoo, _, Some(yahoo)) => yahoo,
            (source, _, _) => {
                return Err(ProviderError::unavailable(
                    &spec.symbol,
                    format!("no provider configured for {source}"),
                ));
            }
        };
        provider.fetch(spec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::YahooProviderConfig;
    use crate::core::series::tests::spec;
    use crate::core::series::{Category, Frequency};

    #[tokio::test]
    async fn test_unconfigured_source_is_unavailable() {
        let config = ProvidersConfig {
            fred: None,
            yahoo: Some(YahooProviderConfig {
                base_url: "http://127.0.0.1:9".to_string(),
            }),
            retries: 0,
            retry_delay_ms: 0,
        };
        let router = SourceRouter::from_config(&config);

        let err = router
            .fetch(&spec("M2", Category::Macro, Frequency::Monthly))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "provider unavailable for M2: no provider configured for FRED"
        );

        let mut derived = spec("Custom Portfolio", Category::Asset, Frequency::Daily);
        derived.source = Source::Derived;
        assert!(matches!(
            router.fetch(&derived).await,
            Err(ProviderError::ProviderUnavailable { .. })
        ));
    }
}

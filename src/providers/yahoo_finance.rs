use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::error::ProviderError;
use crate::core::provider::SeriesProvider;
use crate::core::series::{Series, SeriesSpec};
use crate::providers::util::get_text;

/// Daily bars for the whole listed history of a Yahoo Finance symbol.
pub struct YahooFinanceProvider {
    base_url: String,
    retries: usize,
    retry_delay_ms: u64,
}

impl YahooFinanceProvider {
    pub fn new(base_url: &str, retries: usize, retry_delay_ms: u64) -> Self {
        YahooFinanceProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            retries,
            retry_delay_ms,
        }
    }
}

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

#[derive(Deserialize, Debug)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Deserialize, Debug)]
struct AdjClose {
    adjclose: Option<Vec<Option<f64>>>,
}

fn to_date(ts: i64) -> Option<NaiveDate> {
    Utc.timestamp_opt(ts, 0).single().map(|dt| dt.date_naive())
}

/// Turns a chart response into a series, preferring adjusted closes over raw closes.
fn parse_chart(spec: &SeriesSpec, body: &str) -> Result<Series, ProviderError> {
    let symbol = spec.symbol.as_str();
    let data: YahooChartResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::malformed(symbol, format!("failed to parse JSON: {e}")))?;

    let item = data
        .chart
        .result
        .and_then(|items| items.into_iter().next())
        .ok_or_else(|| ProviderError::malformed(symbol, "no chart data in response"))?;
    let timestamps = item
        .timestamp
        .ok_or_else(|| ProviderError::malformed(symbol, "no timestamps in response"))?;
    let indicators = item
        .indicators
        .ok_or_else(|| ProviderError::malformed(symbol, "no indicators in response"))?;

    let adjusted = indicators
        .adjclose
        .into_iter()
        .next()
        .and_then(|a| a.adjclose);
    let closes = adjusted
        .or_else(|| indicators.quote.into_iter().next().and_then(|q| q.close))
        .ok_or_else(|| ProviderError::malformed(symbol, "no close prices in response"))?;

    let observations = timestamps
        .iter()
        .zip(closes)
        .filter_map(|(ts, close)| Some((to_date(*ts)?, close?)));
    let series = Series::from_observations(spec.clone(), observations);
    if series.is_empty() {
        return Err(ProviderError::malformed(symbol, "no observations"));
    }
    Ok(series)
}

#[async_trait]
impl SeriesProvider for YahooFinanceProvider {
    #[instrument(
        name = "YahooSeriesFetch",
        skip(self),
        fields(symbol = %spec.symbol)
    )]
    async fn fetch(&self, spec: &SeriesSpec) -> Result<Series, ProviderError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, spec.symbol);
        let body = get_text(
            &url,
            &[("interval", "1d"), ("range", "max")],
            &spec.symbol,
            self.retries,
            self.retry_delay_ms,
        )
        .await?;
        let series = parse_chart(spec, &body)?;
        debug!(points = series.len(), first = ?series.first_date(), last = ?series.last_date(), "Parsed Yahoo chart");
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::series::tests::{date, spec};
    use crate::core::series::{Category, Frequency};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn bitcoin() -> SeriesSpec {
        let mut spec = spec("Bitcoin", Category::Asset, Frequency::Daily);
        spec.symbol = "BTC-USD".to_string();
        spec
    }

    pub async fn create_mock_server(symbol: &str, mock_response: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        let request_path = format!("/v8/finance/chart/{symbol}");

        Mock::given(method("GET"))
            .and(path(request_path))
            .and(query_param("range", "max"))
            .respond_with(ResponseTemplate::new(200).set_body_string(mock_response))
            .mount(&mock_server)
            .await;

        mock_server
    }

    // 2024-01-02, 2024-01-03, 2024-01-04 at 00:00 UTC
    const TS: [i64; 3] = [1704153600, 1704240000, 1704326400];

    #[tokio::test]
    async fn test_prefers_adjusted_close() {
        let mock_response = format!(
            r#"{{
                "chart": {{
                    "result": [{{
                        "timestamp": [{}, {}, {}],
                        "indicators": {{
                            "quote": [{{ "close": [10.0, 11.0, 12.0] }}],
                            "adjclose": [{{ "adjclose": [9.5, null, 11.5] }}]
                        }}
                    }}]
                }}
            }}"#,
            TS[0], TS[1], TS[2]
        );
        let server = create_mock_server("BTC-USD", &mock_response).await;
        let provider = YahooFinanceProvider::new(&server.uri(), 0, 0);

        let series = provider.fetch(&bitcoin()).await.unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.first_date(), Some(date("2024-01-02")));
        assert_eq!(series.last_date(), Some(date("2024-01-04")));
        assert_eq!(series.points()[1].value, 11.5);
    }

    #[tokio::test]
    async fn test_falls_back_to_close() {
        let mock_response = format!(
            r#"{{
                "chart": {{
                    "result": [{{
                        "timestamp": [{}, {}],
                        "indicators": {{ "quote": [{{ "close": [10.0, 11.0] }}] }}
                    }}]
                }}
            }}"#,
            TS[0], TS[1]
        );
        let server = create_mock_server("BTC-USD", &mock_response).await;
        let provider = YahooFinanceProvider::new(&server.uri(), 0, 0);

        let series = provider.fetch(&bitcoin()).await.unwrap();
        assert_eq!(series.points()[0].value, 10.0);
        assert_eq!(series.points()[1].value, 11.0);
    }

    #[tokio::test]
    async fn test_no_chart_result() {
        let server = create_mock_server("BTC-USD", r#"{"chart": {"result": []}}"#).await;
        let provider = YahooFinanceProvider::new(&server.uri(), 0, 0);

        let result = provider.fetch(&bitcoin()).await;
        assert_eq!(
            result.unwrap_err().to_string(),
            "malformed data for BTC-USD: no chart data in response"
        );
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let server = create_mock_server("BTC-USD", r#"{"chart": {"results": "#).await;
        let provider = YahooFinanceProvider::new(&server.uri(), 0, 0);

        let err = provider.fetch(&bitcoin()).await.unwrap_err();
        assert!(err.to_string().contains("failed to parse JSON"));
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/NOPE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let provider = YahooFinanceProvider::new(&server.uri(), 0, 0);

        let mut spec = bitcoin();
        spec.symbol = "NOPE".to_string();
        let err = provider.fetch(&spec).await.unwrap_err();
        assert!(matches!(err, ProviderError::SymbolNotFound { .. }));
    }
}

use crate::core::error::ProviderError;
use crate::core::provider::SeriesProvider;
use crate::core::series::{Series, SeriesSpec};
use crate::providers::util::get_text;
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, instrument};

/// Downloads the full history of a FRED series as CSV from the public graph endpoint.
pub struct FredProvider {
    base_url: String,
    retries: usize,
    retry_delay_ms: u64,
}

impl FredProvider {
    pub fn new(base_url: &str, retries: usize, retry_delay_ms: u64) -> Self {
        FredProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            retries,
            retry_delay_ms,
        }
    }
}

/// Parses `fredgraph.csv` output. The date column is `observation_date` (older exports use
/// `DATE`); `.` marks a missing observation and is skipped.
pub fn parse_csv(spec: &SeriesSpec, body: &str) -> Result<Series, ProviderError> {
    let symbol = spec.symbol.as_str();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| ProviderError::malformed(symbol, e))?
        .clone();

    let date_idx = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("observation_date") || h.eq_ignore_ascii_case("DATE"))
        .ok_or_else(|| ProviderError::malformed(symbol, "no date column in CSV header"))?;
    let value_idx = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(symbol))
        .or_else(|| (0..headers.len()).find(|i| *i != date_idx))
        .ok_or_else(|| ProviderError::malformed(symbol, "no value column in CSV header"))?;

    let mut observations = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ProviderError::malformed(symbol, e))?;
        let (Some(date), Some(value)) = (record.get(date_idx), record.get(value_idx)) else {
            continue;
        };
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| ProviderError::malformed(symbol, format!("bad date '{date}': {e}")))?;
        if let Ok(value) = value.parse::<f64>() {
            observations.push((date, value));
        }
    }

    let series = Series::from_observations(spec.clone(), observations);
    if series.is_empty() {
        return Err(ProviderError::malformed(symbol, "no observations"));
    }
    Ok(series)
}

#[async_trait]
impl SeriesProvider for FredProvider {
    #[instrument(
        name = "FredSeriesFetch",
        skip(self),
        fields(symbol = %spec.symbol)
    )]
    async fn fetch(&self, spec: &SeriesSpec) -> Result<Series, ProviderError> {
        let url = format!("{}/graph/fredgraph.csv", self.base_url);
        let body = get_text(
            &url,
            &[("id", spec.symbol.as_str())],
            &spec.symbol,
            self.retries,
            self.retry_delay_ms,
        )
        .await?;
        let series = parse_csv(spec, &body)?;
        debug!(points = series.len(), first = ?series.first_date(), last = ?series.last_date(), "Parsed FRED series");
        Ok(series)
    }
}

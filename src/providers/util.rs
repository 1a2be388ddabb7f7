use crate::core::error::ProviderError;
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

pub const USER_AGENT: &str = "xasset/1.0";

/// Retries an async operation with configurable attempts and delays
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `delay_ms`: Milliseconds between retry attempts
///
/// # Returns
/// Either the successful result or the error after all attempts
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    retries: usize,
    delay_ms: u64,
) -> Result<T, reqwest::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, reqwest::Error>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt > retries {
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt, retries, err
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// Maps an HTTP status to the provider error a caller should see, `None` for success.
pub fn status_error(status: StatusCode, symbol: &str) -> Option<ProviderError> {
    match status {
        s if s.is_success() => None,
        StatusCode::NOT_FOUND => Some(ProviderError::SymbolNotFound {
            symbol: symbol.to_string(),
        }),
        StatusCode::TOO_MANY_REQUESTS => Some(ProviderError::RateLimited {
            symbol: symbol.to_string(),
        }),
        s => Some(ProviderError::unavailable(symbol, format!("HTTP {s}"))),
    }
}

/// GETs `url` with transport retries and returns the body of a successful response.
pub async fn get_text(
    url: &str,
    query: &[(&str, &str)],
    symbol: &str,
    retries: usize,
    delay_ms: u64,
) -> Result<String, ProviderError> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ProviderError::unavailable(symbol, e))?;

    debug!(url, ?query, "Requesting series data");
    let response = with_retry(|| client.get(url).query(query).send(), retries, delay_ms)
        .await
        .map_err(|e| ProviderError::unavailable(symbol, format!("request to {url} failed: {e}")))?;

    if let Some(err) = status_error(response.status(), symbol) {
        return Err(err);
    }
    response
        .text()
        .await
        .map_err(|e| ProviderError::unavailable(symbol, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_error(StatusCode::OK, "X"), None);
        assert!(matches!(
            status_error(StatusCode::NOT_FOUND, "X"),
            Some(ProviderError::SymbolNotFound { .. })
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "X"),
            Some(ProviderError::RateLimited { .. })
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "X"),
            Some(ProviderError::ProviderUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_text_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .expect(1)
            .mount(&server)
            .await;

        let body = get_text(&format!("{}/data", server.uri()), &[], "X", 2, 0)
            .await
            .unwrap();
        assert_eq!(body, "hello");
    }

    #[tokio::test]
    async fn test_get_text_does_not_retry_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;

        let err = get_text(&format!("{}/data", server.uri()), &[], "X", 3, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_transport_errors_are_unavailable() {
        // Nothing listens on port 9 locally.
        let err = get_text("http://127.0.0.1:9/data", &[], "X", 1, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ProviderUnavailable { .. }));
    }
}

//! Fetch collaborator abstraction

use crate::core::error::ProviderError;
use crate::core::series::{Series, SeriesSpec};
use async_trait::async_trait;

/// Fetches the full available history of one series.
///
/// Implementations own retry, authentication and rate limiting; whatever error they return is
/// final for that symbol in the current request.
#[async_trait]
pub trait SeriesProvider: Send + Sync {
    async fn fetch(&self, spec: &SeriesSpec) -> Result<Series, ProviderError>;
}

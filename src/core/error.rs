//! Error taxonomy for the engine.
//!
//! Every class is scoped to the single requested analytic: callers report it next to whatever
//! else is still computable and carry on.

use chrono::NaiveDate;
use thiserror::Error;

/// Failure reported by a fetch collaborator for one symbol. Never retried by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("provider unavailable for {symbol}: {reason}")]
    ProviderUnavailable { symbol: String, reason: String },
    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },
    #[error("rate limited while fetching {symbol}")]
    RateLimited { symbol: String },
    #[error("malformed data for {symbol}: {reason}")]
    MalformedData { symbol: String, reason: String },
}

impl ProviderError {
    pub fn unavailable(symbol: &str, reason: impl ToString) -> Self {
        Self::ProviderUnavailable {
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(symbol: &str, reason: impl ToString) -> Self {
        Self::MalformedData {
            symbol: symbol.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// The requested series cannot be put on a common timeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlignmentError {
    #[error("no series selected or no observations inside the requested range")]
    EmptySelection,
    #[error("selected series do not overlap: {reason}")]
    NoOverlap { reason: String },
    #[error("invalid dataset schema: {reason}")]
    Schema { reason: String },
}

/// A request parameter rejected at the boundary, before any computation starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("window length must be a positive integer")]
    ZeroWindow,
    #[error("window length {window} must be smaller than the dataset length {len}")]
    WindowTooLarge { window: usize, len: usize },
    #[error("basket has no assets")]
    EmptyBasket,
    #[error("basket weights sum to zero")]
    ZeroWeightSum,
    #[error("weight for {asset} is not a finite number")]
    InvalidWeight { asset: String },
    #[error("unknown series: {name}")]
    UnknownSeries { name: String },
    #[error("invalid date range: {start} is not before {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error("bollinger multiplier must be a positive number, got {value}")]
    InvalidMultiplier { value: f64 },
    #[error("lag range minimum {min} exceeds maximum {max}")]
    InvalidLagRange { min: i64, max: i64 },
    #[error("lag of {lag} periods reaches past the {len} periods of data")]
    LagOutOfRange { lag: i64, len: usize },
    #[error("cannot normalize a {from} dataset into {to}; start from raw data")]
    ModeMismatch { from: String, to: String },
    #[error("unknown basket: {name}")]
    UnknownBasket { name: String },
    #[error("unknown story: {name}")]
    UnknownStory { name: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Alignment(#[from] AlignmentError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

//! Core domain abstractions and ambient concerns

pub mod cache;
pub mod config;
pub mod error;
pub mod log;
pub mod provider;
pub mod range;
pub mod series;

// Re-export main types for cleaner imports
pub use error::{AlignmentError, ConfigError, EngineError, EngineResult, ProviderError};
pub use provider::SeriesProvider;
pub use series::{Series, SeriesId, SeriesSpec};

//! Date-range presets and the half-open ranges they resolve to.

use crate::core::error::ConfigError;
use anyhow::Result;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Half-open date interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ConfigError> {
        if start >= end {
            return Err(ConfigError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Range covering `start..=end_inclusive`.
    pub fn from_inclusive(start: NaiveDate, end_inclusive: NaiveDate) -> Result<Self, ConfigError> {
        if start > end_inclusive {
            return Err(ConfigError::InvalidRange {
                start,
                end: end_inclusive,
            });
        }
        Self::new(start, end_inclusive + Duration::days(1))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }
}

impl Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RangePreset {
    OneYear,
    FiveYears,
    TenYears,
    TwentyYears,
    Max,
    /// Both ends inclusive, as typed by the user.
    Custom {
        start: NaiveDate,
        end: NaiveDate,
    },
}

impl Display for RangePreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RangePreset::OneYear => write!(f, "1Y"),
            RangePreset::FiveYears => write!(f, "5Y"),
            RangePreset::TenYears => write!(f, "10Y"),
            RangePreset::TwentyYears => write!(f, "20Y"),
            RangePreset::Max => write!(f, "MAX"),
            RangePreset::Custom { start, end } => write!(f, "{start}..{end}"),
        }
    }
}

impl RangePreset {
    pub fn to_duration(&self) -> Option<Duration> {
        match self {
            RangePreset::OneYear => Some(Duration::days(365)),
            RangePreset::FiveYears => Some(Duration::days(365 * 5)),
            RangePreset::TenYears => Some(Duration::days(365 * 10)),
            RangePreset::TwentyYears => Some(Duration::days(365 * 20)),
            RangePreset::Max | RangePreset::Custom { .. } => None,
        }
    }

    /// Resolves the preset against the history actually available.
    ///
    /// Relative presets count back from `latest`, the most recent observation across the
    /// selected series, and include it.
    pub fn resolve(&self, earliest: NaiveDate, latest: NaiveDate) -> Result<DateRange, ConfigError> {
        match self {
            RangePreset::Custom { start, end } => DateRange::from_inclusive(*start, *end),
            RangePreset::Max => DateRange::from_inclusive(earliest, latest),
            _ => {
                let lookback = self.to_duration().unwrap_or_default();
                DateRange::from_inclusive(latest - lookback, latest)
            }
        }
    }
}

impl FromStr for RangePreset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some((start, end)) = trimmed.split_once("..") {
            let start = NaiveDate::parse_from_str(start.trim(), "%Y-%m-%d")
                .map_err(|e| anyhow::anyhow!("Invalid range start '{}': {}", start, e))?;
            let end = NaiveDate::parse_from_str(end.trim(), "%Y-%m-%d")
                .map_err(|e| anyhow::anyhow!("Invalid range end '{}': {}", end, e))?;
            if start > end {
                anyhow::bail!("Invalid range: {} is after {}", start, end);
            }
            return Ok(RangePreset::Custom { start, end });
        }
        match trimmed.to_uppercase().as_str() {
            "1Y" => Ok(RangePreset::OneYear),
            "5Y" => Ok(RangePreset::FiveYears),
            "10Y" => Ok(RangePreset::TenYears),
            "20Y" => Ok(RangePreset::TwentyYears),
            "MAX" => Ok(RangePreset::Max),
            _ => Err(anyhow::anyhow!("Invalid range preset: {}", s)),
        }
    }
}

impl TryFrom<String> for RangePreset {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RangePreset> for String {
    fn from(value: RangePreset) -> Self {
        value.to_string()
    }
}

impl Default for RangePreset {
    fn default() -> Self {
        RangePreset::TenYears
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::series::tests::date;

    #[test]
    fn test_parse_presets() {
        assert_eq!("1y".parse::<RangePreset>().unwrap(), RangePreset::OneYear);
        assert_eq!("MAX".parse::<RangePreset>().unwrap(), RangePreset::Max);
        assert_eq!(
            "2006-01-01..2013-01-01".parse::<RangePreset>().unwrap(),
            RangePreset::Custom {
                start: date("2006-01-01"),
                end: date("2013-01-01"),
            }
        );
        assert!("3Y".parse::<RangePreset>().is_err());
        assert!("2013-01-01..2006-01-01".parse::<RangePreset>().is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for preset in [
            RangePreset::OneYear,
            RangePreset::TwentyYears,
            RangePreset::Max,
            RangePreset::Custom {
                start: date("2020-01-01"),
                end: date("2024-01-01"),
            },
        ] {
            assert_eq!(preset.to_string().parse::<RangePreset>().unwrap(), preset);
        }
    }

    #[test]
    fn test_resolve_relative_to_latest() {
        let range = RangePreset::OneYear
            .resolve(date("1990-01-01"), date("2024-06-30"))
            .unwrap();
        assert_eq!(range.start, date("2023-07-01"));
        assert_eq!(range.end, date("2024-07-01"));
        assert!(range.contains(date("2024-06-30")));

        let max = RangePreset::Max
            .resolve(date("1990-01-01"), date("2024-06-30"))
            .unwrap();
        assert_eq!(max.start, date("1990-01-01"));
    }

    #[test]
    fn test_custom_end_is_inclusive() {
        let range = RangePreset::Custom {
            start: date("2020-01-01"),
            end: date("2020-01-31"),
        }
        .resolve(date("1990-01-01"), date("2024-06-30"))
        .unwrap();
        assert!(range.contains(date("2020-01-31")));
        assert!(!range.contains(date("2020-02-01")));
    }

    #[test]
    fn test_invalid_range_rejected() {
        let err = DateRange::new(date("2020-01-02"), date("2020-01-01")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRange { .. }));
    }

    #[test]
    fn test_serde_as_string() {
        let preset: RangePreset = serde_yaml::from_str("\"5Y\"").unwrap();
        assert_eq!(preset, RangePreset::FiveYears);
        assert_eq!(serde_yaml::to_string(&preset).unwrap().trim(), "5Y");
    }
}

//! Series identity and the immutable observation container.

use crate::core::error::ProviderError;
use crate::core::range::DateRange;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Identity of a series inside a session: the catalog display name ("M2 Money Supply", "Gold").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesId(String);

impl SeriesId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SeriesId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SeriesId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SeriesId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Fred,
    Yahoo,
    /// Computed inside the engine (portfolio composites); never fetched.
    Derived,
}

impl Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Source::Fred => "FRED",
            Source::Yahoo => "Yahoo Finance",
            Source::Derived => "Derived",
        })
    }
}

/// Semantic role of a series: a macro reference metric or a tradable asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Macro,
    Asset,
}

impl Category {
    /// Returns display name and emoji for the category
    pub fn display_info(&self) -> (&'static str, &'static str) {
        match self {
            Category::Macro => ("Macro", "🏦"),
            Category::Asset => ("Asset", "📈"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

impl From<&str> for Frequency {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "d" | "daily" => Frequency::Daily,
            "w" | "weekly" => Frequency::Weekly,
            "q" | "quarterly" => Frequency::Quarterly,
            _ => Frequency::Monthly,
        }
    }
}

/// Catalog entry describing where a series comes from and what it measures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesSpec {
    #[serde(rename = "name")]
    pub id: SeriesId,
    pub symbol: String,
    pub source: Source,
    pub category: Category,
    pub frequency: Frequency,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub date: NaiveDate,
    pub value: f64,
}

impl Point {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Raw fetched series. Dates are strictly increasing and every value is finite.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    spec: SeriesSpec,
    points: Vec<Point>,
}

impl Series {
    pub fn new(spec: SeriesSpec, points: Vec<Point>) -> Result<Self, ProviderError> {
        if let Some(bad) = points.iter().find(|p| !p.value.is_finite()) {
            return Err(ProviderError::malformed(
                &spec.symbol,
                format!("non-finite value on {}", bad.date),
            ));
        }
        if let Some(pair) = points.windows(2).find(|w| w[0].date >= w[1].date) {
            return Err(ProviderError::malformed(
                &spec.symbol,
                format!("dates not strictly increasing at {}", pair[1].date),
            ));
        }
        Ok(Self { spec, points })
    }

    /// Builds a series from raw provider observations in any order.
    ///
    /// Non-finite values are dropped. When several observations share a date, the one that
    /// came last in the input wins.
    pub fn from_observations(
        spec: SeriesSpec,
        observations: impl IntoIterator<Item = (NaiveDate, f64)>,
    ) -> Self {
        let mut points: Vec<Point> = observations
            .into_iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(d, v)| Point::new(d, v))
            .collect();
        // Stable sort keeps input order among equal dates, so the last one is the latest.
        points.sort_by_key(|p| p.date);
        let mut deduped: Vec<Point> = Vec::with_capacity(points.len());
        for point in points {
            match deduped.last_mut() {
                Some(last) if last.date == point.date => *last = point,
                _ => deduped.push(point),
            }
        }
        Self {
            spec,
            points: deduped,
        }
    }

    pub fn spec(&self) -> &SeriesSpec {
        &self.spec
    }

    pub fn id(&self) -> &SeriesId {
        &self.spec.id
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// Last observation on or before `date`.
    pub fn value_at_or_before(&self, date: NaiveDate) -> Option<f64> {
        let idx = self.points.partition_point(|p| p.date <= date);
        idx.checked_sub(1).map(|i| self.points[i].value)
    }

    /// Read-only view restricted to `[range.start, range.end)`.
    pub fn slice(&self, range: DateRange) -> SeriesView<'_> {
        let lo = self.points.partition_point(|p| p.date < range.start);
        let hi = self.points.partition_point(|p| p.date < range.end);
        SeriesView {
            spec: &self.spec,
            points: &self.points[lo..hi.max(lo)],
        }
    }
}

/// Borrowed window over a [`Series`].
#[derive(Debug, Clone, Copy)]
pub struct SeriesView<'a> {
    pub spec: &'a SeriesSpec,
    pub points: &'a [Point],
}

impl SeriesView<'_> {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    pub(crate) fn spec(name: &str, category: Category, frequency: Frequency) -> SeriesSpec {
        SeriesSpec {
            id: SeriesId::new(name),
            symbol: name.to_uppercase(),
            source: match category {
                Category::Macro => Source::Fred,
                Category::Asset => Source::Yahoo,
            },
            category,
            frequency,
            unit: None,
        }
    }

    pub(crate) fn series(name: &str, points: &[(&str, f64)]) -> Series {
        Series::new(
            spec(name, Category::Asset, Frequency::Daily),
            points.iter().map(|(d, v)| Point::new(date(d), *v)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_unordered_dates() {
        let result = Series::new(
            spec("Gold", Category::Asset, Frequency::Daily),
            vec![
                Point::new(date("2024-01-02"), 1.0),
                Point::new(date("2024-01-02"), 2.0),
            ],
        );
        assert!(matches!(result, Err(ProviderError::MalformedData { .. })));
    }

    #[test]
    fn test_from_observations_sorts_and_latest_wins() {
        let s = Series::from_observations(
            spec("M2", Category::Macro, Frequency::Monthly),
            vec![
                (date("2024-02-01"), 20.0),
                (date("2024-01-01"), 10.0),
                (date("2024-02-01"), 21.0),
                (date("2024-03-01"), f64::NAN),
            ],
        );
        assert_eq!(s.len(), 2);
        assert_eq!(s.points()[0], Point::new(date("2024-01-01"), 10.0));
        assert_eq!(s.points()[1], Point::new(date("2024-02-01"), 21.0));
    }

    #[test]
    fn test_slice_is_half_open() {
        let s = series(
            "Gold",
            &[("2024-01-01", 1.0), ("2024-01-02", 2.0), ("2024-01-03", 3.0)],
        );
        let view = s.slice(DateRange::new(date("2024-01-02"), date("2024-01-03")).unwrap());
        assert_eq!(view.len(), 1);
        assert_eq!(view.points[0].value, 2.0);

        let empty = s.slice(DateRange::new(date("2025-01-01"), date("2025-02-01")).unwrap());
        assert!(empty.is_empty());
    }

    #[test]
    fn test_value_at_or_before() {
        let s = series("Gold", &[("2024-01-01", 1.0), ("2024-01-05", 5.0)]);
        assert_eq!(s.value_at_or_before(date("2023-12-31")), None);
        assert_eq!(s.value_at_or_before(date("2024-01-04")), Some(1.0));
        assert_eq!(s.value_at_or_before(date("2024-01-05")), Some(5.0));
    }
}

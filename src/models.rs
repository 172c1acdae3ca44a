use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive year window shown on the chart. Always `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub const DEFAULT: YearRange = YearRange {
        start: 1960,
        end: 2023,
    };

    /// Build a range, swapping reversed bounds.
    pub fn new(start: i32, end: i32) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    pub fn to_query_param(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }
}

impl Default for YearRange {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// One observation of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub year: i32,
    pub value: f64,
}

impl Point {
    pub fn new(year: i32, value: f64) -> Self {
        Self { year, value }
    }
}

/// Opaque series identifier. The empty id means "not assigned yet".
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesId(String);

impl SeriesId {
    /// Fresh random id, e.g. `series_5f0c…`.
    pub fn fresh() -> Self {
        Self(format!("series_{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn unassigned() -> Self {
        Self(String::new())
    }

    pub fn is_unassigned(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SeriesId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SeriesId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An active indicator line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub id: SeriesId,
    pub indicator_id: String,
    pub display_name: String,
    pub color: String,
    /// Strictly increasing by year.
    pub points: Vec<Point>,
}

impl Series {
    /// Candidate without an id; the store assigns one on insertion.
    pub fn new(
        indicator_id: impl Into<String>,
        display_name: impl Into<String>,
        color: impl Into<String>,
        points: Vec<Point>,
    ) -> Self {
        Self {
            id: SeriesId::unassigned(),
            indicator_id: indicator_id.into(),
            display_name: display_name.into(),
            color: color.into(),
            points,
        }
    }

    pub fn with_id(mut self, id: SeriesId) -> Self {
        self.id = id;
        self
    }

    /// The persisted projection of this series.
    pub fn to_ref(&self) -> IndicatorRef {
        IndicatorRef {
            indicator_id: self.indicator_id.clone(),
            color: self.color.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// What the URL remembers about a series: everything but its id and data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndicatorRef {
    pub indicator_id: String,
    pub color: String,
    pub display_name: String,
}

/// Catalog country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub id: String,
    pub name: String,
}

/// Catalog indicator candidate returned by search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicator {
    pub id: String,
    pub name: String,
    pub source_note: String,
}

/// Metadata section returned by the API (position 0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub page: u32,
    pub pages: u32,
    /// Some responses encode `per_page` as a string, others as a number.
    /// Accept both and normalize to `u32`.
    #[serde(deserialize_with = "de_per_page")]
    pub per_page: u32,
    pub total: u32,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Count {
    Number(u64),
    Text(String),
}

/// `per_page` as either `50` or `"50"`.
fn de_per_page<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    match Count::deserialize(deserializer)? {
        Count::Number(n) => u32::try_from(n).map_err(D::Error::custom),
        Count::Text(s) => s.trim().parse().map_err(D::Error::custom),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeName {
    pub id: String,
    pub value: String,
}

/// Raw observation from `country/{c}/indicator/{i}` (position 1 array).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub indicator: CodeName,
    pub country: CodeName,
    pub date: String,
    pub value: Option<f64>,
}

impl Entry {
    /// `None` when the value is null or the date is not a plain year.
    pub fn to_point(&self) -> Option<Point> {
        let year = self.date.trim().parse::<i32>().ok()?;
        let value = self.value.filter(|v| v.is_finite())?;
        Some(Point { year, value })
    }
}

/// Raw entry from the `country` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryEntry {
    pub id: String,
    #[serde(rename = "iso2Code")]
    pub iso2_code: String,
    pub name: String,
}

impl From<CountryEntry> for Country {
    fn from(e: CountryEntry) -> Self {
        Self {
            id: e.iso2_code,
            name: e.name,
        }
    }
}

/// Raw entry from the `indicator` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorEntry {
    pub id: String,
    #[serde(alias = "value")]
    pub name: String,
    #[serde(rename = "sourceNote", default)]
    pub source_note: Option<String>,
}

impl From<IndicatorEntry> for Indicator {
    fn from(e: IndicatorEntry) -> Self {
        Self {
            id: e.id,
            name: e.name,
            source_note: e.source_note.unwrap_or_default(),
        }
    }
}

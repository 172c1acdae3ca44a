//! Chart data merging: a full outer join of all series over year.

use crate::models::{Series, SeriesId};
use serde::Serialize;
use std::collections::BTreeMap;

/// One chart row: a year plus the value of every series observed that year.
///
/// Serializes flat, e.g. `{"year":2000,"series_a":10.0}`; a series without a
/// point for the year has no key at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartRow {
    pub year: i32,
    #[serde(flatten)]
    pub values: BTreeMap<SeriesId, f64>,
}

impl ChartRow {
    pub fn get(&self, id: &SeriesId) -> Option<f64> {
        self.values.get(id).copied()
    }
}

/// Merge series into rows sorted ascending by year, one per distinct year.
///
/// Output depends only on the series' ids and points, never on hash order.
pub fn merge(series: &[Series]) -> Vec<ChartRow> {
    let mut by_year: BTreeMap<i32, BTreeMap<SeriesId, f64>> = BTreeMap::new();
    for s in series {
        for p in &s.points {
            by_year
                .entry(p.year)
                .or_default()
                .entry(s.id.clone())
                .or_insert(p.value);
        }
    }
    by_year
        .into_iter()
        .map(|(year, values)| ChartRow { year, values })
        .collect()
}

//! Query-string codec for deep links.
//!
//! ```text
//! country=DE&source=World%20Bank&range=1960-2023&series=SP.POP.TOTL~%234472C4~Population%252C%2520total
//! ```
//!
//! `series` is a comma-joined list of `indicatorId~color~name` tuples where the
//! name is percent-encoded on its own before the whole value is encoded again
//! as a query parameter. Decoding never fails; each field falls back to its
//! default independently.

use crate::config::{DEFAULT_SOURCE, DashboardConfig};
use crate::models::{IndicatorRef, YearRange};
use crate::palette;
use crate::store::DashboardState;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

const FIELD_SEP: char = '~';
const SERIES_SEP: char = ',';

/// Display names: unreserved characters stay, `~` and `,` are always escaped.
const NAME_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Query values: `~` and `,` stay readable, everything structural is escaped.
const VALUE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b',');

/// The subset of dashboard state recovered from a query string.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedState {
    pub country: String,
    pub source: String,
    pub range: YearRange,
    /// `None` when the query carried no series at all.
    pub series: Option<Vec<IndicatorRef>>,
}

pub fn encode(state: &DashboardState) -> String {
    let mut params: Vec<(&str, String)> = Vec::new();
    if !state.country.is_empty() {
        params.push(("country", state.country.clone()));
    }
    params.push(("source", state.source.clone()));
    params.push(("range", state.visible_range.to_query_param()));
    if !state.series.is_empty() {
        let joined = state
            .series
            .iter()
            .map(|s| {
                format!(
                    "{}{sep}{}{sep}{}",
                    s.indicator_id,
                    s.color,
                    utf8_percent_encode(&s.display_name, NAME_SET),
                    sep = FIELD_SEP
                )
            })
            .collect::<Vec<_>>()
            .join(",");
        params.push(("series", joined));
    }
    params
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, utf8_percent_encode(&v, VALUE_SET)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Decode with the built-in defaults (source "World Bank", range 1960-2023).
pub fn decode(query: &str) -> DecodedState {
    decode_with(query, &DashboardConfig::default())
}

/// Decode, falling back to the configured defaults.
pub fn decode_with(query: &str, defaults: &DashboardConfig) -> DecodedState {
    let params = parse_query(query);
    let get = |key: &str| {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };

    // A present but empty `source` is kept; only a missing one falls back.
    let source = match get("source") {
        Some(s) => s.to_string(),
        None if defaults.default_source.is_empty() => DEFAULT_SOURCE.to_string(),
        None => defaults.default_source.clone(),
    };

    DecodedState {
        country: get("country").unwrap_or_default().to_string(),
        source,
        range: get("range")
            .and_then(parse_range)
            .unwrap_or(defaults.default_range),
        series: get("series").and_then(parse_series),
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(k), decode_component(v))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    percent_decode_str(&raw.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

/// `"<start>-<end>"`; anything else (including a reversed range) is rejected whole.
/// The separator is the first `-` after the first character, so a negative
/// start year survives.
fn parse_range(raw: &str) -> Option<YearRange> {
    let raw = raw.trim();
    let split = raw.get(1..)?.find('-')? + 1;
    let (a, b) = (&raw[..split], &raw[split + 1..]);
    let start = a.trim().parse::<i32>().ok()?;
    let end = b.trim().parse::<i32>().ok()?;
    (start <= end).then_some(YearRange { start, end })
}

fn parse_series(raw: &str) -> Option<Vec<IndicatorRef>> {
    if raw.trim().is_empty() {
        return None;
    }
    let refs: Vec<IndicatorRef> = raw
        .split(SERIES_SEP)
        .filter_map(|tuple| {
            let mut fields = tuple.splitn(3, FIELD_SEP);
            let indicator_id = fields.next()?.trim();
            if indicator_id.is_empty() {
                return None;
            }
            let color = fields.next().map(str::trim).unwrap_or_default();
            // Only a missing name falls back to the id; an empty one stays empty.
            let name = fields
                .next()
                .map(|n| percent_decode_str(n).decode_utf8_lossy().into_owned())
                .unwrap_or_else(|| indicator_id.to_string());
            Some((indicator_id.to_string(), color.to_string(), name))
        })
        .enumerate()
        .map(|(idx, (indicator_id, color, display_name))| IndicatorRef {
            color: if color.is_empty() {
                palette::color_for_index(idx).to_string()
            } else {
                color
            },
            indicator_id,
            display_name,
        })
        .collect();
    Some(refs)
}

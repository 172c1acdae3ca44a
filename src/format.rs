//! Small formatting helpers for whatever renders the chart.

use crate::models::Country;

/// Longest label (in chars) shown on an axis before truncation.
pub const MAX_LABEL_CHARS: usize = 20;

/// Compact axis tick: `1.5T`, `2.0B`, `3.2M`, `4.0k`, or a rounded integer.
pub fn format_axis_value(v: f64) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    let abs = v.abs();
    if abs >= 1.0e12 {
        format!("{:.1}T", v / 1.0e12)
    } else if abs >= 1.0e9 {
        format!("{:.1}B", v / 1.0e9)
    } else if abs >= 1.0e6 {
        format!("{:.1}M", v / 1.0e6)
    } else if abs >= 1.0e3 {
        format!("{:.1}k", v / 1.0e3)
    } else {
        format!("{:.0}", v)
    }
}

/// Cut long series names down to [`MAX_LABEL_CHARS`], ending in `...`.
pub fn truncate_label(text: &str) -> String {
    if text.chars().count() <= MAX_LABEL_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_LABEL_CHARS - 3).collect();
    out.push_str("...");
    out
}

/// Catalog name of a country, or the id itself when unknown.
pub fn country_display_name<'a>(countries: &'a [Country], id: &'a str) -> &'a str {
    countries
        .iter()
        .find(|c| c.id == id)
        .map(|c| c.name.as_str())
        .unwrap_or(id)
}

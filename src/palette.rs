//! Series color assignment.

use crate::models::Series;

/// Microsoft Office (2013+) chart series palette.
/// Order: Blue, Orange, Gray, Gold, Light Blue, Green, Dark Blue, Dark Orange, Dark Gray, Brownish Gold.
pub const OFFICE10: [&str; 10] = [
    "#4472C4", "#ED7D31", "#A5A5A5", "#FFC000", "#5B9BD5", "#70AD47", "#264478", "#9E480E",
    "#636363", "#997300",
];

/// Color for the `idx`-th series of a freshly built set.
#[inline]
pub fn color_for_index(idx: usize) -> &'static str {
    OFFICE10[idx % OFFICE10.len()]
}

/// First palette color no live series uses. When every color is taken the
/// sequence wraps around by series count.
pub fn next_color(series: &[Series]) -> &'static str {
    OFFICE10
        .iter()
        .copied()
        .find(|c| !series.iter().any(|s| s.color.eq_ignore_ascii_case(c)))
        .unwrap_or_else(|| color_for_index(series.len()))
}

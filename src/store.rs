//! The series store: authoritative dashboard state plus change notification.
//!
//! Mutators are synchronous and never perform I/O. Each one reports whether it
//! changed anything; a change pushes exactly one [`Commit`] to every
//! subscriber, carrying the re-merged chart rows and (once initialized) the
//! re-encoded query string.

use crate::config::{DEFAULT_SOURCE, DashboardConfig};
use crate::merge::{ChartRow, merge};
use crate::models::{Series, SeriesId, YearRange};
use crate::url;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Whole-session snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardState {
    /// Selected country id, empty when nothing is selected.
    pub country: String,
    /// Advisory data source label.
    pub source: String,
    pub visible_range: YearRange,
    /// Insertion-ordered, ids unique.
    pub series: Vec<Series>,
    /// Set once the first load cycle has committed.
    pub initialized: bool,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            country: String::new(),
            source: DEFAULT_SOURCE.to_string(),
            visible_range: YearRange::DEFAULT,
            series: Vec::new(),
            initialized: false,
        }
    }
}

impl DashboardState {
    pub fn from_config(cfg: &DashboardConfig) -> Self {
        Self {
            source: cfg.default_source.clone(),
            visible_range: cfg.default_range,
            ..Self::default()
        }
    }
}

/// Legend/axis information for one series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub id: SeriesId,
    pub indicator_id: String,
    pub display_name: String,
    pub color: String,
}

impl From<&Series> for LegendEntry {
    fn from(s: &Series) -> Self {
        Self {
            id: s.id.clone(),
            indicator_id: s.indicator_id.clone(),
            display_name: s.display_name.clone(),
            color: s.color.clone(),
        }
    }
}

/// What the presentation layer receives after every state change.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub country: String,
    pub source: String,
    pub visible_range: YearRange,
    pub legend: Vec<LegendEntry>,
    pub rows: Vec<ChartRow>,
    /// Encoded query string; `None` until the first load cycle has committed
    /// so the URL is not overwritten while it is still being read.
    pub query: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Commit callback. Runs synchronously inside the mutation and must not
/// re-enter the store.
pub type Subscriber = Box<dyn Fn(&Commit) + Send + Sync>;

pub struct SeriesStore {
    state: DashboardState,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl Default for SeriesStore {
    fn default() -> Self {
        Self::new(DashboardState::default())
    }
}

impl fmt::Debug for SeriesStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeriesStore")
            .field("state", &self.state)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl SeriesStore {
    pub fn new(mut state: DashboardState) -> Self {
        state.visible_range = YearRange::new(state.visible_range.start, state.visible_range.end);
        let mut taken = HashSet::new();
        for s in &mut state.series {
            assign_unique_id(&mut s.id, &mut taken);
        }
        Self {
            state,
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn series(&self) -> &[Series] {
        &self.state.series
    }

    pub fn contains(&self, id: &SeriesId) -> bool {
        self.state.series.iter().any(|s| &s.id == id)
    }

    pub fn set_country(&mut self, country: impl Into<String>) -> bool {
        let country = country.into();
        if self.state.country == country {
            return false;
        }
        self.state.country = country;
        self.notify();
        true
    }

    pub fn set_source(&mut self, source: impl Into<String>) -> bool {
        let source = source.into();
        if self.state.source == source {
            return false;
        }
        self.state.source = source;
        self.notify();
        true
    }

    /// Reversed bounds are swapped.
    pub fn set_visible_range(&mut self, start: i32, end: i32) -> bool {
        let range = YearRange::new(start, end);
        if self.state.visible_range == range {
            return false;
        }
        self.state.visible_range = range;
        self.notify();
        true
    }

    /// Brush/zoom callback of the chart.
    pub fn brush(&mut self, start: i32, end: i32) -> bool {
        self.set_visible_range(start, end)
    }

    /// Append at the end. A missing or already-live id is replaced by a fresh one.
    pub fn append_series(&mut self, mut series: Series) -> SeriesId {
        let mut taken: HashSet<SeriesId> = self.state.series.iter().map(|s| s.id.clone()).collect();
        assign_unique_id(&mut series.id, &mut taken);
        let id = series.id.clone();
        self.state.series.push(series);
        self.notify();
        id
    }

    /// No-op when the id is absent.
    pub fn remove_series(&mut self, id: &SeriesId) -> bool {
        let before = self.state.series.len();
        self.state.series.retain(|s| &s.id != id);
        if self.state.series.len() == before {
            return false;
        }
        self.notify();
        true
    }

    /// Swap in a whole new collection, repairing missing or duplicated ids.
    pub fn replace_all_series(&mut self, mut series: Vec<Series>) -> bool {
        let mut taken = HashSet::new();
        for s in &mut series {
            assign_unique_id(&mut s.id, &mut taken);
        }
        if self.state.series == series {
            return false;
        }
        self.state.series = series;
        self.notify();
        true
    }

    /// Commit the first load cycle: series and the `initialized` flag in one notification.
    pub(crate) fn complete_initialization(&mut self, mut series: Vec<Series>) {
        let mut taken = HashSet::new();
        for s in &mut series {
            assign_unique_id(&mut s.id, &mut taken);
        }
        self.state.series = series;
        self.state.initialized = true;
        self.notify();
    }

    /// Current rows, legend, and query string without waiting for a change.
    pub fn view(&self) -> Commit {
        Commit {
            country: self.state.country.clone(),
            source: self.state.source.clone(),
            visible_range: self.state.visible_range,
            legend: self.state.series.iter().map(LegendEntry::from).collect(),
            rows: merge(&self.state.series),
            query: self.state.initialized.then(|| url::encode(&self.state)),
        }
    }

    pub fn subscribe(&mut self, subscriber: Subscriber) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, subscriber));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    fn notify(&self) {
        if self.subscribers.is_empty() {
            return;
        }
        let commit = self.view();
        for (_, subscriber) in &self.subscribers {
            subscriber(&commit);
        }
    }
}

fn assign_unique_id(id: &mut SeriesId, taken: &mut HashSet<SeriesId>) {
    while id.is_unassigned() || taken.contains(id) {
        *id = SeriesId::fresh();
    }
    taken.insert(id.clone());
}

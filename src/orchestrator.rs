//! Load orchestration: turns country picks and add requests into fetches and
//! commits them into the [`SeriesStore`].
//!
//! Every cycle captures the selection epoch when it starts. Picking a country
//! (or starting the initial load) bumps the epoch, so a cycle that finishes
//! after a newer selection finds a different epoch and discards its results.
//! Fetches inside one cycle run concurrently and are committed together
//! under a single lock, so a partial cycle is never visible.
//!
//! The store lock is never held across a fetch.

use crate::api::DataSource;
use crate::config::{DashboardConfig, EmptyPolicy};
use crate::error::AddError;
use crate::models::{Country, Indicator, IndicatorRef, Point, Series, SeriesId};
use crate::palette;
use crate::store::{Commit, DashboardState, SeriesStore, Subscriber, SubscriptionId};
use crate::url::DecodedState;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Indicators loaded when a country is picked and nothing else is requested.
pub const DEFAULT_INDICATORS: [(&str, &str); 10] = [
    ("NY.GDP.MKTP.CD", "GDP (current US$)"),
    ("NY.GDP.MKTP.KD.ZG", "GDP growth (annual %)"),
    ("SP.POP.TOTL", "Population, total"),
    ("FP.CPI.TOTL.ZG", "Inflation, consumer prices (annual %)"),
    ("SL.UEM.TOTL.ZS", "Unemployment, total (% of total labor force)"),
    ("SP.DYN.LE00.IN", "Life expectancy at birth, total (years)"),
    ("MS.MIL.XPND.GD.ZS", "Military expenditure (% of GDP)"),
    ("EN.ATM.CO2E.PC", "CO2 emissions (metric tons per capita)"),
    ("VC.IHR.PSRC.P5", "Intentional homicides (per 100,000 people)"),
    ("EG.ELC.ACCS.ZS", "Access to electricity (% of population)"),
];

pub fn default_indicator_refs() -> Vec<IndicatorRef> {
    DEFAULT_INDICATORS
        .iter()
        .enumerate()
        .map(|(idx, (id, name))| IndicatorRef {
            indicator_id: id.to_string(),
            color: palette::color_for_index(idx).to_string(),
            display_name: name.to_string(),
        })
        .collect()
}

/// How a load cycle ended. Every cycle ends in exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Results were committed; `dropped` series came back without data.
    Committed { loaded: usize, dropped: usize },
    /// No country is selected; all series were removed without fetching.
    Cleared,
    /// A newer selection started while this cycle was fetching.
    Superseded,
    /// The selection did not change, so nothing was reloaded.
    Unchanged,
    /// The country was recorded; the pending initial load will pick it up.
    Deferred,
    /// Initialization had already run.
    AlreadyInitialized,
}

/// One series a cycle intends to load. An unassigned id means a new series.
#[derive(Debug, Clone)]
struct Planned {
    id: SeriesId,
    reference: IndicatorRef,
}

impl Planned {
    fn fresh(reference: IndicatorRef) -> Self {
        Self {
            id: SeriesId::unassigned(),
            reference,
        }
    }

    fn preserve(series: &Series) -> Self {
        Self {
            id: series.id.clone(),
            reference: series.to_ref(),
        }
    }
}

#[derive(Debug)]
struct Shared {
    store: SeriesStore,
    epoch: u64,
    init_started: bool,
    /// Series list decoded from the URL, consumed by the initial load.
    initial_series: Option<Vec<IndicatorRef>>,
}

impl Shared {
    fn begin(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }
}

pub struct Orchestrator<S> {
    source: Arc<S>,
    shared: Arc<Mutex<Shared>>,
    empty_policy: EmptyPolicy,
}

impl<S> Clone for Orchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            shared: Arc::clone(&self.shared),
            empty_policy: self.empty_policy,
        }
    }
}

impl<S: DataSource> Orchestrator<S> {
    /// Fresh session with no URL state.
    pub fn new(source: S, cfg: &DashboardConfig) -> Self {
        Self::with_store(
            source,
            SeriesStore::new(DashboardState::from_config(cfg)),
            None,
            cfg.empty_policy,
        )
    }

    /// Session restored from a decoded query string.
    pub fn restore(source: S, decoded: DecodedState, cfg: &DashboardConfig) -> Self {
        let state = DashboardState {
            country: decoded.country,
            source: decoded.source,
            visible_range: decoded.range,
            ..DashboardState::default()
        };
        Self::with_store(
            source,
            SeriesStore::new(state),
            decoded.series,
            cfg.empty_policy,
        )
    }

    fn with_store(
        source: S,
        store: SeriesStore,
        initial_series: Option<Vec<IndicatorRef>>,
        empty_policy: EmptyPolicy,
    ) -> Self {
        Self {
            source: Arc::new(source),
            shared: Arc::new(Mutex::new(Shared {
                store,
                epoch: 0,
                init_started: false,
                initial_series,
            })),
            empty_policy,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// First load cycle: the URL's series list if it had one, otherwise the
    /// default indicators when a country is already selected.
    ///
    /// Runs once. If the country changes while the fetches are pending, the
    /// load is re-planned for the new country, so `initialized` is always set
    /// when this returns a commit.
    pub async fn initialize(&self) -> CycleOutcome {
        let initial = {
            let mut shared = self.shared.lock().await;
            if shared.init_started {
                return CycleOutcome::AlreadyInitialized;
            }
            shared.init_started = true;
            shared.initial_series.take()
        };

        loop {
            let (token, country, plan) = {
                let mut shared = self.shared.lock().await;
                let token = shared.begin();
                let country = shared.store.state().country.clone();
                let plan: Vec<Planned> = match &initial {
                    Some(refs) => refs.iter().cloned().map(Planned::fresh).collect(),
                    None if !country.is_empty() => default_indicator_refs()
                        .into_iter()
                        .map(Planned::fresh)
                        .collect(),
                    None => Vec::new(),
                };
                (token, country, plan)
            };
            log::debug!(
                "initial load #{token}: {} series for {:?}",
                plan.len(),
                country
            );

            let loaded = if country.is_empty() {
                Vec::new()
            } else {
                self.fetch_all(&country, plan).await
            };

            let mut shared = self.shared.lock().await;
            if shared.epoch != token {
                log::debug!("initial load #{token} outdated by a country change, re-planning");
                continue;
            }
            let (series, loaded, dropped) = assemble(loaded, shared.store.series(), |_| true);
            shared.store.complete_initialization(series);
            log::debug!("initial load #{token} committed {loaded} series, dropped {dropped}");
            return CycleOutcome::Committed { loaded, dropped };
        }
    }

    /// Select a country and reload the active series for it.
    ///
    /// Ids, colors and names survive the reload; series without data for the
    /// new country are dropped. An empty country clears all series.
    pub async fn change_country(&self, country: impl Into<String>) -> CycleOutcome {
        let country = country.into();
        let (token, plan) = {
            let mut shared = self.shared.lock().await;
            let changed = shared.store.set_country(country.clone());
            if !shared.store.state().initialized {
                if changed {
                    shared.begin();
                }
                return CycleOutcome::Deferred;
            }
            if !changed {
                return CycleOutcome::Unchanged;
            }
            let token = shared.begin();

            if country.is_empty() {
                shared.store.replace_all_series(Vec::new());
                log::debug!("country cleared, series removed");
                return CycleOutcome::Cleared;
            }

            let current = shared.store.series();
            let plan: Vec<Planned> = if !current.is_empty() {
                current.iter().map(Planned::preserve).collect()
            } else {
                match self.empty_policy {
                    EmptyPolicy::LoadDefaults => default_indicator_refs()
                        .into_iter()
                        .map(Planned::fresh)
                        .collect(),
                    EmptyPolicy::KeepEmpty => {
                        return CycleOutcome::Committed {
                            loaded: 0,
                            dropped: 0,
                        };
                    }
                }
            };
            (token, plan)
        };
        log::debug!("reload #{token}: {} series for {:?}", plan.len(), country);

        let loaded = self.fetch_all(&country, plan).await;

        let mut shared = self.shared.lock().await;
        if shared.epoch != token {
            log::debug!("reload #{token} for {:?} superseded, discarding", country);
            return CycleOutcome::Superseded;
        }
        let store = &shared.store;
        // Series the user removed while the reload was in flight stay removed.
        let (series, loaded, dropped) = assemble(loaded, store.series(), |p| {
            p.id.is_unassigned() || store.contains(&p.id)
        });
        shared.store.replace_all_series(series);
        log::debug!("reload #{token} committed {loaded} series, dropped {dropped}");
        CycleOutcome::Committed { loaded, dropped }
    }

    /// Fetch one catalog indicator for the current country and append it.
    ///
    /// Nothing changes when no country is selected, the fetch is empty, or the
    /// selection moved on while the fetch was pending.
    pub async fn add_series(&self, indicator: &Indicator) -> Result<SeriesId, AddError> {
        let (token, country) = {
            let shared = self.shared.lock().await;
            (shared.epoch, shared.store.state().country.clone())
        };
        if country.is_empty() {
            return Err(AddError::NoCountrySelected);
        }

        let points = self.source.fetch_series(&country, &indicator.id).await;
        if points.is_empty() {
            log::info!("no data for {} in {}", indicator.id, country);
            return Err(AddError::NoData {
                indicator: indicator.id.clone(),
                country,
            });
        }

        let mut shared = self.shared.lock().await;
        if shared.epoch != token {
            return Err(AddError::Superseded {
                indicator: indicator.id.clone(),
            });
        }
        let color = palette::next_color(shared.store.series()).to_string();
        let series = Series::new(indicator.id.clone(), indicator.name.clone(), color, points);
        Ok(shared.store.append_series(series))
    }

    pub async fn remove_series(&self, id: &SeriesId) -> bool {
        self.shared.lock().await.store.remove_series(id)
    }

    pub async fn set_source(&self, source: impl Into<String>) -> bool {
        self.shared.lock().await.store.set_source(source)
    }

    pub async fn set_visible_range(&self, start: i32, end: i32) -> bool {
        self.shared.lock().await.store.set_visible_range(start, end)
    }

    /// Chart brush callback.
    pub async fn brush(&self, start: i32, end: i32) -> bool {
        self.shared.lock().await.store.brush(start, end)
    }

    pub async fn subscribe(&self, subscriber: Subscriber) -> SubscriptionId {
        self.shared.lock().await.store.subscribe(subscriber)
    }

    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.lock().await.store.unsubscribe(id)
    }

    pub async fn state(&self) -> DashboardState {
        self.shared.lock().await.store.state().clone()
    }

    pub async fn view(&self) -> Commit {
        self.shared.lock().await.store.view()
    }

    pub async fn list_countries(&self) -> Vec<Country> {
        self.source.list_countries().await
    }

    pub async fn search_indicators(&self, query: &str) -> Vec<Indicator> {
        self.source.search_indicators(query).await
    }

    async fn fetch_all(&self, country: &str, plan: Vec<Planned>) -> Vec<(Planned, Vec<Point>)> {
        let source = &self.source;
        join_all(plan.into_iter().map(|p| async move {
            let points = source.fetch_series(country, &p.reference.indicator_id).await;
            (p, points)
        }))
        .await
    }
}

/// Build the committed collection in plan order, dropping empty fetches and
/// anything `keep` rejects. Live series the cycle did not plan (added while it
/// was fetching) follow in their current order. Returns the series, how many
/// of them this cycle loaded, and how many it dropped for lack of data.
fn assemble(
    loaded: Vec<(Planned, Vec<Point>)>,
    live: &[Series],
    keep: impl Fn(&Planned) -> bool,
) -> (Vec<Series>, usize, usize) {
    let planned: HashSet<&SeriesId> = loaded.iter().map(|(p, _)| &p.id).collect();
    let unplanned: Vec<Series> = live
        .iter()
        .filter(|s| !planned.contains(&s.id))
        .cloned()
        .collect();
    let mut dropped = 0;
    let mut series: Vec<Series> = loaded
        .into_iter()
        .filter(|(p, _)| keep(p))
        .filter_map(|(p, points)| {
            if points.is_empty() {
                dropped += 1;
                return None;
            }
            let r = p.reference;
            Some(Series::new(r.indicator_id, r.display_name, r.color, points).with_id(p.id))
        })
        .collect();
    let loaded = series.len();
    series.extend(unplanned);
    (series, loaded, dropped)
}

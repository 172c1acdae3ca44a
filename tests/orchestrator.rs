//! Load orchestration against an in-memory data source.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use wbdash::api::{DataSource, filter_indicators};
use wbdash::config::{DashboardConfig, EmptyPolicy};
use wbdash::models::{Country, Indicator, Point};
use wbdash::palette::OFFICE10;
use wbdash::store::Commit;
use wbdash::{AddError, CycleOutcome, Orchestrator, url};

#[derive(Default)]
struct FakeSource {
    data: HashMap<(String, String), Vec<Point>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
    calls: AtomicUsize,
}

impl FakeSource {
    fn with(mut self, country: &str, indicator: &str, points: &[(i32, f64)]) -> Self {
        self.data.insert(
            (country.to_string(), indicator.to_string()),
            points.iter().map(|&(y, v)| Point::new(y, v)).collect(),
        );
        self
    }

    /// Hold every fetch for `country` until the returned gate gets permits.
    fn gate(&self, country: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.gates
            .lock()
            .unwrap()
            .insert(country.to_string(), Arc::clone(&gate));
        gate
    }

    /// Hold only the `country`/`indicator` fetch.
    fn gate_one(&self, country: &str, indicator: &str) -> Arc<Semaphore> {
        self.gate(&format!("{country}/{indicator}"))
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for FakeSource {
    async fn list_countries(&self) -> Vec<Country> {
        vec![Country {
            id: "DE".into(),
            name: "Germany".into(),
        }]
    }

    async fn search_indicators(&self, query: &str) -> Vec<Indicator> {
        let catalog = vec![indicator("SP.POP.TOTL", "Population, total")];
        filter_indicators(catalog, query, 20)
    }

    async fn fetch_series(&self, country: &str, indicator: &str) -> Vec<Point> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = {
            let gates = self.gates.lock().unwrap();
            gates
                .get(country)
                .or_else(|| gates.get(&format!("{country}/{indicator}")))
                .cloned()
        };
        if let Some(gate) = gate {
            let _permit = gate.acquire().await;
        }
        self.data
            .get(&(country.to_string(), indicator.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

fn indicator(id: &str, name: &str) -> Indicator {
    Indicator {
        id: id.into(),
        name: name.into(),
        source_note: String::new(),
    }
}

fn restore(source: FakeSource, query: &str) -> Orchestrator<FakeSource> {
    Orchestrator::restore(source, url::decode(query), &DashboardConfig::default())
}

async fn ready(source: FakeSource, query: &str) -> Orchestrator<FakeSource> {
    let dash = restore(source, query);
    assert!(matches!(dash.initialize().await, CycleOutcome::Committed { .. }));
    dash
}

async fn wait_for_country(dash: &Orchestrator<FakeSource>, country: &str) {
    while dash.state().await.country != country {
        tokio::task::yield_now().await;
    }
}

async fn record(dash: &Orchestrator<FakeSource>) -> Arc<Mutex<Vec<Commit>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    dash.subscribe(Box::new(move |c: &Commit| sink.lock().unwrap().push(c.clone())))
        .await;
    seen
}

const TWO_SERIES: &str = "country=DE&series=A~%23111111~Alpha,B~%23222222~Beta";

#[tokio::test]
async fn initialize_loads_url_series_and_drops_empty_ones() {
    let source = FakeSource::default().with("DE", "A", &[(2000, 1.0), (2001, 2.0)]);
    let dash = restore(source, TWO_SERIES);

    let outcome = dash.initialize().await;
    assert_eq!(outcome, CycleOutcome::Committed { loaded: 1, dropped: 1 });

    let state = dash.state().await;
    assert!(state.initialized);
    assert_eq!(state.series.len(), 1);
    assert_eq!(state.series[0].indicator_id, "A");
    assert_eq!(state.series[0].color, "#111111");
    assert_eq!(state.series[0].display_name, "Alpha");
    assert_eq!(dash.source().calls(), 2);
}

#[tokio::test]
async fn initialize_with_country_only_loads_default_indicators() {
    let source = FakeSource::default()
        .with("DE", "NY.GDP.MKTP.CD", &[(2000, 1.0)])
        .with("DE", "SP.POP.TOTL", &[(2000, 80.0)]);
    let dash = restore(source, "country=DE");

    let outcome = dash.initialize().await;
    assert_eq!(outcome, CycleOutcome::Committed { loaded: 2, dropped: 8 });
    assert_eq!(dash.source().calls(), 10);

    let state = dash.state().await;
    assert_eq!(state.series[0].indicator_id, "NY.GDP.MKTP.CD");
    assert_eq!(state.series[0].color, OFFICE10[0]);
    assert_eq!(state.series[1].indicator_id, "SP.POP.TOTL");
    assert_eq!(state.series[1].color, OFFICE10[2]);
}

#[tokio::test]
async fn initialize_without_country_fetches_nothing() {
    let dash = restore(FakeSource::default(), "series=A~%23111111~Alpha");
    assert_eq!(
        dash.initialize().await,
        CycleOutcome::Committed { loaded: 0, dropped: 0 }
    );
    assert_eq!(dash.source().calls(), 0);
    let state = dash.state().await;
    assert!(state.initialized);
    assert!(state.series.is_empty());
}

#[tokio::test]
async fn initialize_runs_once() {
    let dash = ready(FakeSource::default(), "").await;
    assert_eq!(dash.initialize().await, CycleOutcome::AlreadyInitialized);
}

#[tokio::test]
async fn url_write_back_starts_with_the_initial_commit() {
    let source = FakeSource::default().with("DE", "A", &[(2000, 1.0)]);
    let dash = restore(source, TWO_SERIES);
    let seen = record(&dash).await;

    dash.set_visible_range(1990, 2000).await;
    assert_eq!(seen.lock().unwrap()[0].query, None);

    dash.initialize().await;
    let commits = seen.lock().unwrap();
    assert_eq!(commits.len(), 2);
    assert_eq!(
        commits[1].query.as_deref(),
        Some("country=DE&source=World%20Bank&range=1990-2000&series=A~%23111111~Alpha")
    );
}

#[tokio::test]
async fn country_change_keeps_identity_and_drops_empty_series() {
    let source = FakeSource::default()
        .with("DE", "A", &[(2000, 1.0)])
        .with("DE", "B", &[(2000, 2.0)])
        .with("FR", "A", &[(2000, 10.0), (2001, 11.0)]);
    let dash = ready(source, TWO_SERIES).await;
    let before = dash.state().await.series;

    let outcome = dash.change_country("FR").await;
    assert_eq!(outcome, CycleOutcome::Committed { loaded: 1, dropped: 1 });

    let after = dash.state().await.series;
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, before[0].id);
    assert_eq!(after[0].color, before[0].color);
    assert_eq!(after[0].display_name, before[0].display_name);
    assert_eq!(after[0].points, vec![Point::new(2000, 10.0), Point::new(2001, 11.0)]);
}

#[tokio::test]
async fn same_country_does_not_reload() {
    let source = FakeSource::default().with("DE", "A", &[(2000, 1.0)]);
    let dash = ready(source, TWO_SERIES).await;
    let calls = dash.source().calls();
    assert_eq!(dash.change_country("DE").await, CycleOutcome::Unchanged);
    assert_eq!(dash.source().calls(), calls);
}

#[tokio::test]
async fn country_change_from_empty_loads_defaults() {
    let source = FakeSource::default().with("FR", "SP.POP.TOTL", &[(2000, 67.0)]);
    let dash = ready(source, "").await;

    let outcome = dash.change_country("FR").await;
    assert_eq!(outcome, CycleOutcome::Committed { loaded: 1, dropped: 9 });
    let state = dash.state().await;
    assert_eq!(state.series[0].display_name, "Population, total");
}

#[tokio::test]
async fn keep_empty_policy_skips_default_load() {
    let cfg = DashboardConfig {
        empty_policy: EmptyPolicy::KeepEmpty,
        ..DashboardConfig::default()
    };
    let dash = Orchestrator::new(FakeSource::default(), &cfg);
    dash.initialize().await;

    assert_eq!(
        dash.change_country("FR").await,
        CycleOutcome::Committed { loaded: 0, dropped: 0 }
    );
    assert_eq!(dash.source().calls(), 0);
    assert_eq!(dash.state().await.country, "FR");
}

#[tokio::test]
async fn clearing_the_country_removes_all_series_without_fetching() {
    let source = FakeSource::default().with("DE", "A", &[(2000, 1.0)]);
    let dash = ready(source, TWO_SERIES).await;
    let calls = dash.source().calls();

    assert_eq!(dash.change_country("").await, CycleOutcome::Cleared);
    assert!(dash.state().await.series.is_empty());
    assert_eq!(dash.source().calls(), calls);
}

#[tokio::test]
async fn add_without_data_changes_nothing() {
    let source = FakeSource::default().with("DE", "A", &[(2000, 1.0)]);
    let dash = ready(source, TWO_SERIES).await;
    let before = dash.state().await;
    let seen = record(&dash).await;

    let err = dash
        .add_series(&indicator("EMPTY", "Nothing here"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AddError::NoData {
            indicator: "EMPTY".into(),
            country: "DE".into()
        }
    );
    assert_eq!(dash.state().await, before);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn add_requires_a_country() {
    let dash = ready(FakeSource::default(), "").await;
    let err = dash.add_series(&indicator("A", "Alpha")).await.unwrap_err();
    assert_eq!(err, AddError::NoCountrySelected);
    assert_eq!(err.to_string(), "Please select a country first.");
    assert_eq!(dash.source().calls(), 0);
}

#[tokio::test]
async fn add_appends_with_fresh_id_and_next_free_color() {
    let source = FakeSource::default()
        .with("DE", "A", &[(2000, 1.0)])
        .with("DE", "SP.POP.TOTL", &[(1999, 80.0), (2000, 81.0)]);
    let dash = ready(source, "country=DE&series=A~%234472C4~Alpha").await;

    let found = dash.search_indicators("population").await;
    let id = dash.add_series(&found[0]).await.unwrap();

    let state = dash.state().await;
    assert_eq!(state.series.len(), 2);
    assert_eq!(state.series[1].id, id);
    assert_ne!(state.series[0].id, id);
    assert_eq!(state.series[1].color, OFFICE10[1]);
    assert_eq!(state.series[1].display_name, "Population, total");

    let rows = dash.view().await.rows;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].year, 1999);
    assert_eq!(rows[0].get(&state.series[0].id), None);
}

#[tokio::test]
async fn newer_country_change_wins_over_a_slower_older_one() {
    let source = FakeSource::default()
        .with("DE", "A", &[(2000, 1.0)])
        .with("AA", "A", &[(2000, 100.0)])
        .with("BB", "A", &[(2000, 200.0)]);
    let dash = ready(source, "country=DE&series=A~%23111111~Alpha").await;
    let gate_a = dash.source().gate("AA");
    let gate_b = dash.source().gate("BB");

    let first = tokio::spawn({
        let dash = dash.clone();
        async move { dash.change_country("AA").await }
    });
    wait_for_country(&dash, "AA").await;
    let second = tokio::spawn({
        let dash = dash.clone();
        async move { dash.change_country("BB").await }
    });
    wait_for_country(&dash, "BB").await;

    gate_b.add_permits(16);
    assert_eq!(
        second.await.unwrap(),
        CycleOutcome::Committed { loaded: 1, dropped: 0 }
    );
    gate_a.add_permits(16);
    assert_eq!(first.await.unwrap(), CycleOutcome::Superseded);

    let state = dash.state().await;
    assert_eq!(state.country, "BB");
    assert_eq!(state.series.len(), 1);
    assert_eq!(state.series[0].points, vec![Point::new(2000, 200.0)]);
}

#[tokio::test]
async fn add_is_discarded_when_the_country_changes_underneath() {
    let source = FakeSource::default()
        .with("DE", "A", &[(2000, 1.0)])
        .with("DE", "B", &[(2000, 2.0)])
        .with("FR", "A", &[(2000, 3.0)]);
    let dash = ready(source, "country=DE&series=A~%23111111~Alpha").await;
    let gate_de = dash.source().gate("DE");

    let add = tokio::spawn({
        let dash = dash.clone();
        async move { dash.add_series(&indicator("B", "Beta")).await }
    });
    while dash.source().calls() < 2 {
        tokio::task::yield_now().await;
    }
    assert_eq!(
        dash.change_country("FR").await,
        CycleOutcome::Committed { loaded: 1, dropped: 0 }
    );
    gate_de.add_permits(16);

    assert_eq!(
        add.await.unwrap(),
        Err(AddError::Superseded {
            indicator: "B".into()
        })
    );
    let state = dash.state().await;
    assert_eq!(state.series.len(), 1);
    assert_eq!(state.series[0].points, vec![Point::new(2000, 3.0)]);
}

#[tokio::test]
async fn removal_during_reload_sticks() {
    let source = FakeSource::default()
        .with("DE", "A", &[(2000, 1.0)])
        .with("DE", "B", &[(2000, 2.0)])
        .with("FR", "A", &[(2000, 3.0)])
        .with("FR", "B", &[(2000, 4.0)]);
    let dash = ready(source, TWO_SERIES).await;
    let removed = dash.state().await.series[1].id.clone();
    let gate_fr = dash.source().gate("FR");

    let reload = tokio::spawn({
        let dash = dash.clone();
        async move { dash.change_country("FR").await }
    });
    wait_for_country(&dash, "FR").await;
    assert!(dash.remove_series(&removed).await);
    gate_fr.add_permits(16);
    reload.await.unwrap();

    let state = dash.state().await;
    assert_eq!(state.series.len(), 1);
    assert_eq!(state.series[0].indicator_id, "A");
    assert_eq!(state.series[0].points, vec![Point::new(2000, 3.0)]);
}

#[tokio::test]
async fn add_during_reload_survives_the_reload_commit() {
    let source = FakeSource::default()
        .with("DE", "A", &[(2000, 1.0)])
        .with("FR", "A", &[(2000, 3.0)])
        .with("FR", "B", &[(2000, 4.0)]);
    let dash = ready(source, "country=DE&series=A~%23111111~Alpha").await;
    let kept = dash.state().await.series[0].id.clone();
    let gate = dash.source().gate_one("FR", "A");

    let reload = tokio::spawn({
        let dash = dash.clone();
        async move { dash.change_country("FR").await }
    });
    wait_for_country(&dash, "FR").await;
    let added = dash.add_series(&indicator("B", "Beta")).await.unwrap();
    gate.add_permits(16);
    assert_eq!(
        reload.await.unwrap(),
        CycleOutcome::Committed { loaded: 1, dropped: 0 }
    );

    let state = dash.state().await;
    let ids: Vec<_> = state.series.iter().map(|s| s.id.clone()).collect();
    assert_eq!(ids, vec![kept, added]);
    assert_eq!(state.series[0].points, vec![Point::new(2000, 3.0)]);
    assert_eq!(state.series[1].indicator_id, "B");
    assert_eq!(state.series[1].points, vec![Point::new(2000, 4.0)]);
}

#[tokio::test]
async fn add_during_initial_load_survives_initialization() {
    let source = FakeSource::default()
        .with("DE", "A", &[(2000, 1.0)])
        .with("DE", "B", &[(2000, 2.0)]);
    let dash = restore(source, "country=DE&series=A~%23111111~Alpha");
    let gate = dash.source().gate_one("DE", "A");

    let init = tokio::spawn({
        let dash = dash.clone();
        async move { dash.initialize().await }
    });
    while dash.source().calls() < 1 {
        tokio::task::yield_now().await;
    }
    let added = dash.add_series(&indicator("B", "Beta")).await.unwrap();
    gate.add_permits(16);
    assert_eq!(
        init.await.unwrap(),
        CycleOutcome::Committed { loaded: 1, dropped: 0 }
    );

    let state = dash.state().await;
    assert!(state.initialized);
    assert_eq!(state.series.len(), 2);
    assert_eq!(state.series[0].indicator_id, "A");
    assert_eq!(state.series[1].id, added);
}

#[tokio::test]
async fn country_picked_during_initial_load_is_honoured() {
    let source = FakeSource::default()
        .with("DE", "A", &[(2000, 1.0)])
        .with("FR", "A", &[(2000, 5.0)]);
    let dash = restore(source, "country=DE&series=A~%23111111~Alpha");
    let gate_de = dash.source().gate("DE");

    let init = tokio::spawn({
        let dash = dash.clone();
        async move { dash.initialize().await }
    });
    while dash.source().calls() < 1 {
        tokio::task::yield_now().await;
    }
    assert_eq!(dash.change_country("FR").await, CycleOutcome::Deferred);
    gate_de.add_permits(16);

    assert_eq!(
        init.await.unwrap(),
        CycleOutcome::Committed { loaded: 1, dropped: 0 }
    );
    let state = dash.state().await;
    assert!(state.initialized);
    assert_eq!(state.country, "FR");
    assert_eq!(state.series[0].points, vec![Point::new(2000, 5.0)]);
}

#[tokio::test]
async fn brush_updates_visible_range() {
    let dash = ready(FakeSource::default(), "range=1960-2023").await;
    assert!(dash.brush(1980, 1990).await);
    assert!(!dash.brush(1980, 1990).await);
    let view = dash.view().await;
    assert_eq!(view.visible_range.start, 1980);
    assert!(view.query.unwrap().contains("range=1980-1990"));
}

//! wbdash
//!
//! State synchronization for a multi-indicator World Bank dashboard: pick a
//! country, add indicators, and keep the active series, the shareable query
//! string and the merged chart table consistent while data loads in the
//! background. Pairs with the `wbdash` CLI.
//!
//! ### Features
//! - Async World Bank client behind a [`DataSource`] trait (countries, indicator search, series)
//! - [`SeriesStore`] with on-commit notifications for a chart front end
//! - URL codec for deep links (`country`, `source`, `range`, `series`)
//! - Load orchestration that discards results of outdated selections
//! - Full outer join of all series over year for multi-axis line charts
//!
//! ### Example
//! ```no_run
//! use wbdash::{Orchestrator, WorldBankClient, config::Config, url};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let cfg = Config::default();
//! let decoded = url::decode("country=DE&range=1990-2020");
//! let dash = Orchestrator::restore(WorldBankClient::default(), decoded, &cfg.dashboard);
//! dash.initialize().await;
//! let view = dash.view().await;
//! println!("{} rows, share link: ?{}", view.rows.len(), view.query.unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod format;
pub mod merge;
pub mod models;
pub mod orchestrator;
pub mod palette;
pub mod storage;
pub mod store;
pub mod url;

pub use api::{DataSource, WorldBankClient};
pub use error::AddError;
pub use merge::{ChartRow, merge};
pub use models::{Country, Indicator, IndicatorRef, Point, Series, SeriesId, YearRange};
pub use orchestrator::{CycleOutcome, Orchestrator};
pub use store::{Commit, DashboardState, SeriesStore};

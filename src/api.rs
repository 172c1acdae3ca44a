//! Async client for the **World Bank Indicators API (v2)** and the
//! [`DataSource`] seam the dashboard core consumes.
//!
//! ### Notes
//! - The API answers with a `[Meta, [row, ...]]` envelope, or `[{"message": ...}]` on error.
//!   A query without data comes back as `[Meta, null]`.
//! - The API sometimes serializes `per_page` as a **string**; we accept both string/number.
//! - Transient failures (5xx / network) are retried with a short backoff. Anything that still
//!   fails is logged and degraded to an empty result on the [`DataSource`] surface; the
//!   `try_*` methods expose the underlying error instead.
//!
//! Typical usage:
//! ```no_run
//! # use wbdash::api::{DataSource, WorldBankClient};
//! # async fn demo() {
//! let client = WorldBankClient::default();
//! let points = client.fetch_series("DE", "SP.POP.TOTL").await;
//! # }
//! ```
use crate::config::ApiConfig;
use crate::models::{Country, CountryEntry, Entry, Indicator, IndicatorEntry, Meta, Point};
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};
use reqwest::Client as HttpClient;
use reqwest::redirect::Policy;
use serde_json::Value;
use std::time::Duration;

/// Everything the dashboard core needs from a statistics provider.
///
/// Implementations never fail: transport errors and missing data both come
/// back as empty collections.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Catalog of selectable countries.
    async fn list_countries(&self) -> Vec<Country>;

    /// Ranked indicator candidates for a free-text query. An empty query
    /// returns the head of the catalog.
    async fn search_indicators(&self, query: &str) -> Vec<Indicator>;

    /// Observations for one country/indicator pair, sorted ascending by year,
    /// without null values or duplicate years.
    async fn fetch_series(&self, country: &str, indicator: &str) -> Vec<Point>;
}

/// Countries that the catalog lists but the indicator endpoints reject.
const EXCLUDED_COUNTRIES: &[&str] = &["XK"];

// Allow -, _, . unescaped in codes (common for indicator ids)
const SAFE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

fn enc(code: &str) -> String {
    percent_encoding::utf8_percent_encode(code.trim(), SAFE).to_string()
}

#[derive(Debug, Clone)]
pub struct WorldBankClient {
    pub base_url: String,
    search_limit: usize,
    catalog_page_size: u32,
    http: HttpClient,
}

impl Default for WorldBankClient {
    fn default() -> Self {
        Self::from_config(&ApiConfig::default()).expect("reqwest client build")
    }
}

impl WorldBankClient {
    pub fn from_config(cfg: &ApiConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(cfg.timeout())
            .connect_timeout(cfg.connect_timeout())
            .redirect(Policy::limited(5))
            .user_agent(concat!("wbdash/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self {
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            search_limit: cfg.search_limit,
            catalog_page_size: cfg.catalog_page_size,
            http,
        })
    }

    /// GET with a small retry for transient failures (5xx / network errors).
    async fn get_json(&self, url: &str) -> Result<Value> {
        let mut last_err: Option<anyhow::Error> = None;
        for backoff_ms in [100u64, 300, 700] {
            match self.http.get(url).send().await {
                Ok(r) if r.status().is_success() => {
                    return r.json().await.context("decode json");
                }
                Ok(r) if r.status().is_server_error() => {
                    last_err = Some(anyhow!("HTTP {}", r.status()));
                }
                Ok(r) => bail!("request failed with HTTP {}", r.status()),
                Err(e) => last_err = Some(e.into()),
            }
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        }
        bail!("network error: {:?}", last_err);
    }

    pub async fn try_list_countries(&self) -> Result<Vec<Country>> {
        let url = format!("{}/country?format=json&per_page=300", self.base_url);
        let v = self.get_json(&url).await.with_context(|| format!("GET {}", url))?;
        parse_countries(&v)
    }

    /// Download the catalog slice and filter it locally.
    pub async fn try_search_indicators(&self, query: &str) -> Result<Vec<Indicator>> {
        let url = format!(
            "{}/indicator?format=json&source=2&per_page={}",
            self.base_url, self.catalog_page_size
        );
        let v = self.get_json(&url).await.with_context(|| format!("GET {}", url))?;
        let catalog = parse_indicators(&v)?;
        Ok(filter_indicators(catalog, query, self.search_limit))
    }

    /// Fetch every page of observations for one country/indicator pair.
    pub async fn try_fetch_series(&self, country: &str, indicator: &str) -> Result<Vec<Point>> {
        if country.trim().is_empty() || indicator.trim().is_empty() {
            return Ok(Vec::new());
        }
        let url = format!(
            "{}/country/{}/indicator/{}?format=json&per_page=1000",
            self.base_url,
            enc(country),
            enc(indicator)
        );

        // Safety cap to avoid pathological jobs
        let max_pages = 100u32;

        let mut page = 1u32;
        let mut out: Vec<Point> = Vec::new();
        loop {
            if page > max_pages {
                bail!("page limit exceeded ({})", max_pages);
            }
            let page_url = format!("{}&page={}", url, page);
            let v = self
                .get_json(&page_url)
                .await
                .with_context(|| format!("GET {}", page_url))?;
            let (meta, points) = parse_series_page(&v)?;
            out.extend(points);
            if page >= meta.pages {
                break;
            }
            page += 1;
        }
        Ok(normalize_points(out))
    }
}

#[async_trait]
impl DataSource for WorldBankClient {
    async fn list_countries(&self) -> Vec<Country> {
        self.try_list_countries().await.unwrap_or_else(|e| {
            log::warn!("listing countries failed: {:#}", e);
            Vec::new()
        })
    }

    async fn search_indicators(&self, query: &str) -> Vec<Indicator> {
        self.try_search_indicators(query).await.unwrap_or_else(|e| {
            log::warn!("indicator search for {:?} failed: {:#}", query, e);
            Vec::new()
        })
    }

    async fn fetch_series(&self, country: &str, indicator: &str) -> Vec<Point> {
        self.try_fetch_series(country, indicator)
            .await
            .unwrap_or_else(|e| {
                log::warn!("fetching {} for {} failed: {:#}", indicator, country, e);
                Vec::new()
            })
    }
}

static NULL: Value = Value::Null;

/// Split the `[Meta, rows]` envelope. Rows are `Value::Null` when the API has no data.
fn envelope(v: &Value) -> Result<(&Value, &Value)> {
    let arr = v
        .as_array()
        .ok_or_else(|| anyhow!("unexpected response shape: not a top-level array"))?;
    let head = arr
        .first()
        .ok_or_else(|| anyhow!("unexpected response: empty array"))?;
    // If first element has "message", surface API error.
    if head.get("message").is_some() {
        bail!("world bank api error: {}", head);
    }
    Ok((head, arr.get(1).unwrap_or(&NULL)))
}

fn rows<T: serde::de::DeserializeOwned>(rows: &Value, what: &str) -> Result<Vec<T>> {
    if rows.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(rows.clone()).with_context(|| format!("parse {}", what))
}

/// Parse one page of observations, dropping null values and non-year dates.
pub fn parse_series_page(v: &Value) -> Result<(Meta, Vec<Point>)> {
    let (head, body) = envelope(v)?;
    let meta: Meta = serde_json::from_value(head.clone()).context("parse meta")?;
    let entries: Vec<Entry> = rows(body, "entries")?;
    Ok((meta, entries.iter().filter_map(Entry::to_point).collect()))
}

pub fn parse_countries(v: &Value) -> Result<Vec<Country>> {
    let (_, body) = envelope(v)?;
    let entries: Vec<CountryEntry> = rows(body, "countries")?;
    Ok(entries
        .into_iter()
        .map(Country::from)
        .filter(|c| !c.id.is_empty() && !EXCLUDED_COUNTRIES.contains(&c.id.as_str()))
        .collect())
}

pub fn parse_indicators(v: &Value) -> Result<Vec<Indicator>> {
    let (_, body) = envelope(v)?;
    let entries: Vec<IndicatorEntry> = rows(body, "indicators")?;
    Ok(entries.into_iter().map(Indicator::from).collect())
}

/// Sort ascending by year and keep the first point of any duplicated year.
pub fn normalize_points(mut points: Vec<Point>) -> Vec<Point> {
    points.sort_by_key(|p| p.year);
    points.dedup_by_key(|p| p.year);
    points
}

/// Case-insensitive substring match on id and name, capped at `limit`.
/// An empty query returns the first `limit` catalog entries.
pub fn filter_indicators(catalog: Vec<Indicator>, query: &str, limit: usize) -> Vec<Indicator> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return catalog.into_iter().take(limit).collect();
    }
    catalog
        .into_iter()
        .filter(|i| i.name.to_lowercase().contains(&needle) || i.id.to_lowercase().contains(&needle))
        .take(limit)
        .collect()
}

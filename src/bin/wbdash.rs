use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use wbdash::config::Config;
use wbdash::format::{format_axis_value, truncate_label};
use wbdash::{Indicator, Orchestrator, WorldBankClient, storage, url};

#[derive(Parser, Debug)]
#[command(
    name = "wbdash",
    version,
    about = "Drive a World Bank indicator dashboard from its shareable query string"
)]
struct Cli {
    /// Path to a TOML config file (default: <config dir>/wbdash/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List selectable countries.
    Countries,
    /// Search the indicator catalog.
    Search {
        /// Free-text query; omit to list the head of the catalog.
        query: Option<String>,
    },
    /// Load a dashboard state, apply edits, and print the resulting share link.
    View(ViewArgs),
}

#[derive(ValueEnum, Clone, Debug)]
enum OutFormat {
    Csv,
    Json,
}

#[derive(Args, Debug)]
struct ViewArgs {
    /// Query string to start from (e.g. "country=DE&range=1990-2020").
    #[arg(long, default_value = "")]
    state: String,
    /// Switch to this country after the initial load (ISO2 code; "" clears).
    #[arg(short, long)]
    country: Option<String>,
    /// Indicator ids to add (repeatable).
    #[arg(short, long)]
    add: Vec<String>,
    /// Indicator ids to remove (repeatable).
    #[arg(short, long)]
    remove: Vec<String>,
    /// Visible range as START-END.
    #[arg(long)]
    range: Option<String>,
    /// Data source label.
    #[arg(long)]
    source: Option<String>,
    /// Save merged rows to file (format inferred by --format or extension).
    #[arg(long)]
    out: Option<PathBuf>,
    /// Output format (csv or json). If omitted, inferred from --out extension.
    #[arg(long, value_enum)]
    format: Option<OutFormat>,
}

/// `START-END`; the separator is the first `-` after the first character.
fn parse_range(s: &str) -> Option<(i32, i32)> {
    let s = s.trim();
    let split = s.get(1..)?.find('-')? + 1;
    Some((s[..split].trim().parse().ok()?, s[split + 1..].trim().parse().ok()?))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = Config::resolve(cli.config.as_deref())?;
    let client = WorldBankClient::from_config(&config.api)?;
    match cli.cmd {
        Command::Countries => cmd_countries(client).await,
        Command::Search { query } => cmd_search(client, query.as_deref().unwrap_or("")).await,
        Command::View(args) => cmd_view(client, &config, args).await,
    }
}

async fn cmd_countries(client: WorldBankClient) -> Result<()> {
    let countries = client.try_list_countries().await?;
    for c in countries {
        println!("{:<4} {}", c.id, c.name);
    }
    Ok(())
}

async fn cmd_search(client: WorldBankClient, query: &str) -> Result<()> {
    let hits = client.try_search_indicators(query).await?;
    if hits.is_empty() {
        eprintln!("No indicators match {:?}", query);
    }
    for i in hits {
        println!("{:<24} {}", i.id, i.name);
    }
    Ok(())
}

async fn cmd_view(client: WorldBankClient, config: &Config, args: ViewArgs) -> Result<()> {
    let range = match args.range.as_deref() {
        Some(s) => Some(
            parse_range(s).ok_or_else(|| anyhow::anyhow!("invalid --range, expected START-END"))?,
        ),
        None => None,
    };

    let decoded = url::decode_with(&args.state, &config.dashboard);
    let dash = Orchestrator::restore(client, decoded, &config.dashboard);
    log::info!("initial load: {:?}", dash.initialize().await);

    if let Some(country) = args.country {
        log::info!("country change: {:?}", dash.change_country(country).await);
    }

    for id in &args.add {
        let indicator = resolve_indicator(&dash, id).await;
        match dash.add_series(&indicator).await {
            Ok(series_id) => log::info!("added {} as {}", id, series_id),
            Err(e) => eprintln!("warning: {}", e),
        }
    }

    for id in &args.remove {
        let state = dash.state().await;
        let matching: Vec<_> = state
            .series
            .iter()
            .filter(|s| &s.indicator_id == id)
            .map(|s| s.id.clone())
            .collect();
        if matching.is_empty() {
            eprintln!("warning: {} is not an active series", id);
        }
        for series_id in matching {
            dash.remove_series(&series_id).await;
        }
    }

    if let Some(source) = args.source {
        dash.set_source(source).await;
    }
    if let Some((start, end)) = range {
        dash.set_visible_range(start, end).await;
    }

    let state = dash.state().await;
    let view = dash.view().await;
    println!(
        "Country: {}",
        if state.country.is_empty() { "(none)" } else { state.country.as_str() }
    );
    println!("Source:  {}", state.source);
    println!("Range:   {}", state.visible_range.to_query_param());
    println!("Series:  {}", state.series.len());
    for s in &state.series {
        let last = s
            .points
            .last()
            .map(|p| format!("{} = {}", p.year, format_axis_value(p.value)))
            .unwrap_or_default();
        println!(
            "  {}  {:<20} {:<24} {:>3} pts  latest {}",
            s.color,
            truncate_label(&s.display_name),
            s.indicator_id,
            s.points.len(),
            last
        );
    }
    println!("?{}", view.query.unwrap_or_default());

    if let Some(path) = args.out.as_ref() {
        let fmt = match args.format {
            Some(OutFormat::Csv) => "csv",
            Some(OutFormat::Json) => "json",
            None => path.extension().and_then(|e| e.to_str()).unwrap_or("csv"),
        }
        .to_ascii_lowercase();
        match fmt.as_str() {
            "csv" => storage::save_csv(&view.rows, &view.legend, path)?,
            "json" => storage::save_json(&view.rows, path)?,
            other => bail!("unsupported format: {}", other),
        }
        eprintln!("Saved {} rows to {}", view.rows.len(), path.display());
    }

    Ok(())
}

/// Catalog entry for an exact id, or a bare entry named after the id.
async fn resolve_indicator(dash: &Orchestrator<WorldBankClient>, id: &str) -> Indicator {
    dash.search_indicators(id)
        .await
        .into_iter()
        .find(|i| i.id.eq_ignore_ascii_case(id))
        .unwrap_or_else(|| Indicator {
            id: id.to_string(),
            name: id.to_string(),
            source_note: String::new(),
        })
}

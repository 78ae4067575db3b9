//! SendLens: email performance analytics over ESP CSV exports.
//!
//! Loads campaign, flow and subscriber exports, resolves a date range, and
//! prints action notes, a period summary, one module's guidance, or the full
//! JSON export to stdout.

mod ingest;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sendlens_analytics::action_notes::{build_action_notes, guidance_for};
use sendlens_analytics::metrics::compare_periods;
use sendlens_analytics::opportunities::build_opportunity_summary;
use sendlens_analytics::{build_export, AnalysisContext, ModuleKey};
use sendlens_core::{AnalyticsConfig, Dataset, DateRangeSelector, RangePreset};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "sendlens")]
#[command(about = "Email campaign and flow analytics with actionable guidance")]
#[command(version)]
struct Cli {
    /// Campaign export CSV
    #[arg(long, global = true, env = "SENDLENS_CAMPAIGNS")]
    campaigns: Option<PathBuf>,

    /// Flow email export CSV
    #[arg(long, global = true, env = "SENDLENS_FLOWS")]
    flows: Option<PathBuf>,

    /// Subscriber profile export CSV
    #[arg(long, global = true, env = "SENDLENS_SUBSCRIBERS")]
    subscribers: Option<PathBuf>,

    /// Range preset: 7d, 14d, 30d, 60d, 90d, 120d, 180d, 365d, 730d, all
    #[arg(long, global = true, default_value = "90d")]
    range: String,

    /// Custom range start (YYYY-MM-DD); requires --to
    #[arg(long, global = true, requires = "to")]
    from: Option<String>,

    /// Custom range end (YYYY-MM-DD); requires --from
    #[arg(long, global = true, requires = "from")]
    to: Option<String>,

    /// Override the conservative factor applied to estimated gains
    #[arg(long, global = true)]
    conservative_factor: Option<f64>,

    /// Override the minimum monthly gain worth reporting
    #[arg(long, global = true)]
    min_monthly_gain: Option<f64>,

    /// Pretty-print JSON output
    #[arg(long, global = true, default_value_t = false)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// One action note per analysis module
    Notes,
    /// Current vs previous period metrics and the opportunity summary
    Summary,
    /// Full guidance result for a single module
    Guidance {
        /// send-frequency, audience-size, campaign-day-of-week, campaign-gaps,
        /// send-volume, flow-steps or list-health
        #[arg(long)]
        module: String,
    },
    /// Everything above packaged as one JSON document
    Export,
}

#[derive(Serialize)]
struct SummaryOutput<T: Serialize, U: Serialize> {
    comparison: T,
    opportunities: U,
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}

fn parse_module(raw: &str) -> anyhow::Result<ModuleKey> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .with_context(|| format!("unknown module '{raw}'"))
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays valid JSON.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sendlens=info,sendlens_analytics=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AnalyticsConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AnalyticsConfig::default()
    });
    if let Some(factor) = cli.conservative_factor {
        config.guidance.conservative_factor = factor;
    }
    if let Some(floor) = cli.min_monthly_gain {
        config.guidance.min_monthly_gain = floor;
    }

    let campaigns = match &cli.campaigns {
        Some(path) => ingest::load_campaigns(path)?,
        None => Vec::new(),
    };
    let flow_emails = match &cli.flows {
        Some(path) => ingest::load_flow_emails(path)?,
        None => Vec::new(),
    };
    let subscribers = match &cli.subscribers {
        Some(path) => ingest::load_subscribers(path)?,
        None => Vec::new(),
    };
    let dataset = Dataset::new(campaigns, flow_emails, subscribers);
    if dataset.is_empty() {
        warn!("No campaign or flow sends loaded; every module will report insufficient data");
    }

    let selector = match (cli.from, cli.to) {
        (Some(from), Some(to)) => DateRangeSelector::custom(from, to),
        _ => DateRangeSelector::preset(cli.range.parse::<RangePreset>()?),
    };
    let range = dataset
        .resolve_range(&selector)
        .context("could not resolve the date range")?;

    info!(
        range = %range,
        campaigns = dataset.campaigns().len(),
        flow_emails = dataset.flow_emails().len(),
        subscribers = dataset.subscribers().len(),
        "Dataset loaded"
    );

    let ctx = AnalysisContext::new(&dataset, range, &config);

    match cli.command {
        Command::Notes => print_json(&build_action_notes(&ctx), cli.pretty)?,
        Command::Summary => {
            let sends = ctx
                .dataset
                .campaigns()
                .iter()
                .chain(ctx.dataset.flow_emails())
                .collect::<Vec<_>>();
            let output = SummaryOutput {
                comparison: compare_periods(&sends, &ctx.range),
                opportunities: build_opportunity_summary(&ctx),
            };
            print_json(&output, cli.pretty)?;
        }
        Command::Guidance { module } => {
            let module = parse_module(&module)?;
            print_json(&guidance_for(module, &ctx), cli.pretty)?;
        }
        Command::Export => {
            let export = build_export(&ctx);
            if cli.pretty {
                println!("{}", export.to_json_pretty()?);
            } else {
                print_json(&export, false)?;
            }
        }
    }

    Ok(())
}

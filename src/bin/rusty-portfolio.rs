//! rusty-portfolio CLI - reconstruct portfolios from transaction files
//!
//! ## Example Usage
//!
//! ```bash
//! # Portfolio at a point in time
//! rusty-portfolio snapshot -t trades.csv --at 2024-06-30T21:00:00Z
//!
//! # Same, as JSON, with corporate actions and FX rates
//! rusty-portfolio snapshot -t trades.csv -a actions.csv -r rates.csv --at 2024-06-30T21:00:00Z --json
//!
//! # Walk every event
//! rusty-portfolio timeline -t trades.csv
//!
//! # Next automatic event after the last transaction
//! rusty-portfolio peek -t trades.csv -a actions.csv
//! ```

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rusty_portfolio::prelude::*;
use rusty_portfolio::sources::{InMemoryCorporateActions, InMemoryRates};
use rusty_portfolio::transaction::load_transactions_file;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// rusty-portfolio: point-in-time portfolio reconstruction
#[derive(Parser)]
#[command(name = "rusty-portfolio")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Point-in-time portfolio reconstruction", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path (default: ~/.rusty-portfolio/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Inputs {
    /// Transactions CSV
    #[arg(short = 't', long)]
    transactions: PathBuf,

    /// Corporate actions CSV
    #[arg(short = 'a', long)]
    actions: Option<PathBuf>,

    /// USD rates CSV
    #[arg(short = 'r', long)]
    rates: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the portfolio at a point in time
    Snapshot {
        #[command(flatten)]
        inputs: Inputs,

        /// Query time (RFC 3339); defaults to the last transaction
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Walk every event of the timeline
    Timeline {
        #[command(flatten)]
        inputs: Inputs,

        /// Only events at or after this time
        #[arg(long)]
        from: Option<DateTime<Utc>>,
    },

    /// Report the next automatic event after the last transaction
    Peek {
        #[command(flatten)]
        inputs: Inputs,
    },
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    if let Some(path) = path {
        return EngineConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()));
    }
    if let Some(home) = dirs::home_dir() {
        let default_config = home.join(".rusty-portfolio").join("config.toml");
        if default_config.exists() {
            match EngineConfig::from_toml_file(&default_config) {
                Ok(config) => return Ok(config),
                Err(e) => eprintln!("{} Failed to parse config: {}", "Warning:".yellow(), e),
            }
        }
    }
    Ok(EngineConfig::default())
}

fn build_engine(config: EngineConfig, inputs: &Inputs) -> Result<(PortfolioEngine, Option<Timestamp>)> {
    let mut collaborators = Collaborators::default();
    if let Some(path) = &inputs.actions {
        let mut actions = InMemoryCorporateActions::new();
        let count = actions
            .load_from_file(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        log::info!("Loaded {} corporate actions", count);
        collaborators = collaborators.with_corporate_actions(Arc::new(actions));
    }
    if let Some(path) = &inputs.rates {
        let mut rates = InMemoryRates::new();
        let count = rates
            .load_from_file(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        log::info!("Loaded {} rates", count);
        collaborators = collaborators.with_rates(Arc::new(rates));
    }

    let mut transactions = load_transactions_file(&inputs.transactions)
        .with_context(|| format!("Failed to read {}", inputs.transactions.display()))?;
    let mut engine = PortfolioEngine::new(config, collaborators);
    engine.ordering().sort_batch(&mut transactions);
    let last = transactions.last().map(|txn| txn.time);

    let progress = ProgressBar::new(transactions.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} transactions")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    for txn in transactions {
        engine.ingest(txn)?;
        progress.inc(1);
    }
    progress.finish_and_clear();
    Ok((engine, last))
}

fn print_snapshot(snapshot: &Snapshot) {
    println!("{} {}", "Portfolio at".bold(), snapshot.time.to_string().cyan());
    if !snapshot.usd_only {
        println!("{}", "  (multi-currency)".dimmed());
    }
    println!(
        "  {}",
        format!("{:<28} {:>16} {:>12} {:>14}", "Asset", "Volume", "Avg price", "Deposit").bold()
    );
    for item in &snapshot.items {
        let name = format!("{:<28}", item.asset.to_string());
        let name = if item.is_consolidated() {
            name.yellow()
        } else if item.is_cash {
            name.green()
        } else {
            name.normal()
        };
        let volume = format!("{:>16.4}", item.volume);
        let volume = if item.volume.is_nan() {
            volume.red()
        } else {
            volume.normal()
        };
        println!(
            "  {} {} {:>12.4} {:>14.2}",
            name, volume, item.average_price, item.deposit
        );
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Snapshot { inputs, at, json } => {
            let (mut engine, last) = build_engine(config, &inputs)?;
            let time = at.or(last).unwrap_or_else(Utc::now);
            let snapshot = engine.portfolio_at(time)?;
            if json {
                println!("{}", snapshot.to_json()?);
            } else {
                print_snapshot(&snapshot);
            }
        }
        Commands::Timeline { inputs, from } => {
            let (mut engine, _) = build_engine(config.with_retain_history(true), &inputs)?;
            engine.finish()?;
            let timeline = engine.timeline()?;
            let start = from.unwrap_or(DateTime::<Utc>::MIN_UTC);
            for handle in engine.events_from(start, false)? {
                let Some(event) = handle.event().and_then(|index| timeline.event(index)) else {
                    continue;
                };
                let asset = timeline
                    .asset(event.asset_slot)
                    .map(ToString::to_string)
                    .unwrap_or_default();
                let live = handle.with_index(|index| index.live_count())?;
                println!(
                    "{} {} {:<28} {} live",
                    event.time.to_string().cyan(),
                    format!("{:<12}", format!("{:?}", event.kind)).bold(),
                    asset,
                    live
                );
            }
        }
        Commands::Peek { inputs } => {
            let (mut engine, _) = build_engine(config, &inputs)?;
            match engine.peek_next()? {
                Some(preview) => println!(
                    "{} {:?} of {} at {}",
                    "Next:".bold(),
                    preview.kind,
                    preview.asset,
                    preview.time.to_string().cyan()
                ),
                None => println!("{}", "No forthcoming events".dimmed()),
            }
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

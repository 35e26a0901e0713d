//! ZAP CLI: one subcommand per pipeline step, plus the full daily run.
//!
//! Commands:
//! - `fetch-market` / `fetch-economic`: bring the history tables up to a day
//! - `market-stats` / `economic-stats` / `ta`: derive feature tables
//! - `gap-count` / `trim`: count and remove leading incomplete rows
//! - `find-dates` / `prune-dates`: align economic tables to market dates
//! - `batch`: join everything into the batch table
//! - `run`: all of the above in order, statistics and TA in parallel
//! - `status`: what is on disk

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use zap_core::calendar::parse_day_arg;
use zap_core::data::LogProgress;
use zap_runner::steps::{self, FetchSummary};
use zap_runner::{
    run, DeriveSummary, PipelineConfig, PoolReport, Providers, DEFAULT_CONFIG_FILE,
};

#[derive(Parser)]
#[command(
    name = "zap",
    about = "ZAP: incremental market and economic series pipeline"
)]
struct Cli {
    /// Pipeline config file. A missing file means defaults.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Data directory, overriding the config.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Print step summaries as JSON.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch market data up to (not including) a day and merge it in.
    FetchMarket {
        /// End day (YYYY-MM-DD, exclusive). Defaults to today.
        #[arg(long)]
        day: Option<String>,
    },
    /// Fetch economic series up to (not including) a day and merge them in.
    FetchEconomic {
        /// End day (YYYY-MM-DD, exclusive). Defaults to today.
        #[arg(long)]
        day: Option<String>,
    },
    /// Rolling statistics over the market table.
    MarketStats,
    /// Rolling statistics over the economic table.
    EconomicStats,
    /// Technical indicators over the market table.
    Ta,
    /// Count the TA table's leading incomplete rows into the side file.
    GapCount,
    /// Remove the counted leading rows from the derived market tables.
    Trim,
    /// Write the market table's dates to the side file.
    FindDates,
    /// Keep only the listed dates in the economic derived tables.
    PruneDates,
    /// Join all tables into the batch table.
    Batch,
    /// Run every step in order.
    Run {
        /// End day for both fetches (YYYY-MM-DD, exclusive). Defaults to today.
        #[arg(long)]
        day: Option<String>,
    },
    /// Show which tables exist and what they hold.
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = PipelineConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    tracing::debug!(
        data_dir = %config.data_dir.display(),
        tickers = %config.tickers.display(),
        "config loaded"
    );
    let json = cli.json;

    let result = match cli.command {
        Commands::FetchMarket { day } => run_fetch_market(&config, day, json),
        Commands::FetchEconomic { day } => run_fetch_economic(&config, day, json),
        Commands::MarketStats => print_derive(steps::run_market_stats(&config)?, json),
        Commands::EconomicStats => print_derive(steps::run_economic_stats(&config)?, json),
        Commands::Ta => print_derive(steps::run_technical_analysis(&config)?, json),
        Commands::GapCount => {
            let count = steps::run_gap_count(&config)?;
            emit(json, &count, || {
                println!(
                    "{count} leading row(s) with missing values -> {}",
                    config.gap_count_path().display()
                )
            })
        }
        Commands::Trim => print_pool("trim", steps::run_trim(&config)?, json),
        Commands::FindDates => {
            let count = steps::run_find_dates(&config)?;
            emit(json, &count, || {
                println!("{count} date(s) -> {}", config.found_dates_path().display())
            })
        }
        Commands::PruneDates => print_pool("prune-dates", steps::run_prune_dates(&config)?, json),
        Commands::Batch => {
            let summary = steps::run_batch(&config)?;
            emit(json, &summary, || {
                println!(
                    "{}: {} rows x {} columns from {} inputs",
                    summary.file,
                    summary.rows,
                    summary.columns,
                    summary.inputs.len()
                );
                for c in &summary.unknown_drops {
                    println!("  not dropped (absent): {c}");
                }
            })
        }
        Commands::Run { day } => run_pipeline(&config, day, json),
        Commands::Status => run_status(&config, json),
    };
    if let Some(invalid) = result.as_ref().err().and_then(|e| e.downcast_ref::<InvalidDay>()) {
        println!("{invalid}");
        std::process::exit(2);
    }
    result
}

/// A `--day` that is not a calendar date; reported on stdout.
#[derive(Debug, thiserror::Error)]
#[error("invalid --day '{raw}', expected YYYY-MM-DD")]
struct InvalidDay {
    raw: String,
}

/// `--day` if given, else today.
fn resolve_day(day: Option<String>) -> Result<NaiveDate> {
    match day {
        Some(raw) => match parse_day_arg(&raw) {
            Ok(date) => Ok(date),
            Err(_) => Err(InvalidDay { raw }.into()),
        },
        None => Ok(chrono::Local::now().date_naive()),
    }
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce()) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        text();
    }
    Ok(())
}

fn print_fetch(summary: &FetchSummary, json: bool) -> Result<()> {
    emit(json, summary, || {
        if summary.up_to_date {
            println!("{}: already up to date", summary.file);
            return;
        }
        println!(
            "{}: [{}, {}) fetched {}, empty {}, skipped {}, +{} rows ({} total)",
            summary.file,
            summary.window.start,
            summary.window.end,
            summary.fetched.len(),
            summary.empty.len(),
            summary.skipped.len(),
            summary.rows_added,
            summary.total_rows
        );
        for t in &summary.skipped {
            println!("  skipped: {t}");
        }
        if summary.aborted {
            println!("  provider stopped accepting requests; run again later");
        }
    })
}

fn run_fetch_market(config: &PipelineConfig, day: Option<String>, json: bool) -> Result<()> {
    let day = resolve_day(day)?;
    let tickers = steps::load_tickers(config)?;
    let provider = steps::market_provider(config)?;
    let summary = steps::fetch_market(config, &tickers, &provider, day, &LogProgress)?;
    print_fetch(&summary, json)?;
    if summary.fetched.is_empty() && !summary.skipped.is_empty() {
        bail!("no market identifier could be fetched");
    }
    Ok(())
}

fn run_fetch_economic(config: &PipelineConfig, day: Option<String>, json: bool) -> Result<()> {
    let day = resolve_day(day)?;
    let tickers = steps::load_tickers(config)?;
    let provider = steps::economic_provider(config)?;
    let summary = steps::fetch_economic(config, &tickers, &provider, day, &LogProgress)?;
    print_fetch(&summary, json)?;
    if summary.fetched.is_empty() && !summary.skipped.is_empty() {
        bail!("no economic series could be fetched");
    }
    Ok(())
}

fn print_derive(summary: DeriveSummary, json: bool) -> Result<()> {
    emit(json, &summary, || {
        println!(
            "{}: {} rows x {} columns ({} series)",
            summary.file,
            summary.rows,
            summary.columns,
            summary.computed.len()
        );
        for s in &summary.skipped {
            println!("  skipped: {s}");
        }
    })
}

fn print_pool(step: &str, report: PoolReport, json: bool) -> Result<()> {
    emit(json, &report.summary(), || {
        for (file, rows) in &report.succeeded {
            println!("{file}: {rows} row(s) removed");
        }
        for (file, err) in &report.failed {
            println!("{file}: FAILED: {err}");
        }
    })?;
    if !report.is_success() {
        bail!("{step} failed for {} file(s)", report.failed.len());
    }
    Ok(())
}

fn run_pipeline(config: &PipelineConfig, day: Option<String>, json: bool) -> Result<()> {
    let day = resolve_day(day)?;
    // Resolve everything that can fail on configuration before any write.
    let tickers = steps::load_tickers(config)?;
    let market = steps::market_provider(config)?;
    let economic = steps::economic_provider(config)?;
    let providers = Providers {
        market: &market,
        economic: &economic,
        progress: &LogProgress,
    };

    let report = run(config, &tickers, &providers, day);
    emit(json, &report, || {
        println!();
        println!("=== Run {day} ===");
        for s in &report.steps {
            let mark = if s.ok { "ok" } else { "FAILED" };
            println!("{:<16} {:<7} {}", s.step, mark, s.detail);
        }
        println!();
    })?;
    if !report.is_success() {
        bail!("{} step(s) failed", report.failed().len());
    }
    Ok(())
}

fn run_status(config: &PipelineConfig, json: bool) -> Result<()> {
    let status = steps::status(config);
    emit(json, &status, || {
        println!("Data directory: {}", status.data_dir.display());
        println!();
        println!(
            "{:<22} {:<25} {:>8} {:>8}  {}",
            "File", "Date Range", "Rows", "Columns", "Written"
        );
        println!("{}", "-".repeat(86));
        for t in &status.tables {
            match (&t.meta, t.exists) {
                (Some(m), _) => {
                    let range = match (m.first_date, m.last_date) {
                        (Some(a), Some(b)) => format!("{a} to {b}"),
                        _ => "(empty)".into(),
                    };
                    println!(
                        "{:<22} {:<25} {:>8} {:>8}  {}",
                        t.file,
                        range,
                        m.rows,
                        m.columns,
                        m.written_at.format("%Y-%m-%d %H:%M")
                    );
                }
                (None, true) => println!("{:<22} (no metadata)", t.file),
                (None, false) => println!("{:<22} (missing)", t.file),
            }
        }
        println!();
        match status.gap_count {
            Some(n) => println!("Gap count:   {n}"),
            None => println!("Gap count:   (none)"),
        }
        match status.found_dates {
            Some(n) => println!("Found dates: {n}"),
            None => println!("Found dates: (none)"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_day_parses() {
        let day = resolve_day(Some("2024-06-03".into())).unwrap();
        assert_eq!(day, NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
    }

    #[test]
    fn malformed_day_is_an_invalid_day_error() {
        for raw in ["2024-13-01", "06/03/2024", "yesterday"] {
            let err = resolve_day(Some(raw.into())).unwrap_err();
            let invalid = err.downcast_ref::<InvalidDay>().expect("InvalidDay");
            assert_eq!(invalid.to_string(), format!("invalid --day '{raw}', expected YYYY-MM-DD"));
        }
    }

    #[test]
    fn cli_accepts_day_on_fetch_and_run() {
        let cli = Cli::try_parse_from(["zap", "run", "--day", "2024-06-03"]).unwrap();
        assert!(matches!(cli.command, Commands::Run { day: Some(ref d) } if d == "2024-06-03"));
        let cli = Cli::try_parse_from(["zap", "--json", "fetch-market"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::FetchMarket { day: None }));
    }
}

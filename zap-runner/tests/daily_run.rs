//! Full daily run against scripted providers.
//!
//! Tests:
//! 1. A first run writes every table, trims the derived market tables, and
//!    builds a batch whose rows are the trimmed TA dates
//! 2. Re-running on the same day fetches nothing and reproduces the batch
//! 3. A later day appends only the new dates
//! 4. A dead economic provider fails the economic steps but not the market side
//! 5. A failed statistics write leaves the earlier, already trimmed table alone

use chrono::{Datelike, NaiveDate};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use zap_core::calendar::business_days;
use zap_core::data::{
    DataError, DataProvider, DataSource, FetchResult, Observation, RetryPolicy, SilentProgress,
    TickerConfig,
};
use zap_core::merge::FetchWindow;
use zap_core::prune::{leading_gap_count, read_gap_count};
use zap_core::table::ColumnKey;
use zap_runner::{run, PipelineConfig, Providers};

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn epoch() -> NaiveDate {
    d("2024-01-01")
}

fn offset(date: NaiveDate) -> f64 {
    (date - epoch()).num_days() as f64
}

/// Business-day OHLCV bars that depend only on the date.
struct ScriptedMarket {
    calls: AtomicUsize,
}

impl DataProvider for ScriptedMarket {
    fn name(&self) -> &str {
        "scripted-market"
    }

    fn fetch(&self, ticker: &str, window: FetchWindow) -> Result<FetchResult, DataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let base = if ticker == "SPY" { 470.0 } else { 400.0 };
        let observations = business_days(window.start, window.end)
            .into_iter()
            .map(|date| {
                let t = offset(date);
                let close = base + 10.0 * (t / 5.0).sin() + 0.2 * t;
                let open = close - 0.8 * (t / 3.0).cos();
                let high = open.max(close) + 1.0 + 0.3 * t.sin().abs();
                let low = open.min(close) - 1.0 - 0.2 * t.cos().abs();
                let volume = 1.0e6 + 1.0e5 * (t / 7.0).sin();
                Observation {
                    date,
                    values: [open, high, low, close, close, volume].map(Some).to_vec(),
                }
            })
            .collect();
        Ok(FetchResult {
            ticker: ticker.to_string(),
            columns: ["Open", "High", "Low", "Close", "Adj Close", "Volume"]
                .iter()
                .map(|a| ColumnKey::new(ticker, *a))
                .collect(),
            observations,
            source: DataSource::Scripted,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// A daily rate and a monthly rate, or nothing at all when `dead`.
struct ScriptedEconomy {
    dead: bool,
}

impl DataProvider for ScriptedEconomy {
    fn name(&self) -> &str {
        "scripted-economy"
    }

    fn fetch(&self, ticker: &str, window: FetchWindow) -> Result<FetchResult, DataError> {
        if self.dead {
            return Err(DataError::NetworkUnreachable("connection refused".into()));
        }
        let observations = match ticker {
            "DGS10" => business_days(window.start, window.end)
                .into_iter()
                .map(|date| Observation {
                    date,
                    values: vec![Some(4.0 + 0.1 * (offset(date) / 9.0).sin())],
                })
                .collect(),
            "UNRATE" => window
                .start
                .iter_days()
                .take_while(|date| *date < window.end)
                .filter(|date| date.day() == 1)
                .map(|date| Observation {
                    date,
                    values: vec![Some(3.7 + 0.1 * date.month() as f64)],
                })
                .collect(),
            other => {
                return Err(DataError::SymbolNotFound {
                    ticker: other.to_string(),
                })
            }
        };
        Ok(FetchResult {
            ticker: ticker.to_string(),
            columns: vec![ColumnKey::bare(ticker)],
            observations,
            source: DataSource::Scripted,
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

fn setup(dir: &Path) -> (PipelineConfig, TickerConfig) {
    let tickers_path = dir.join("tickers.toml");
    std::fs::write(
        &tickers_path,
        r#"
[market_data]
SPY = "S&P 500 ETF"
QQQ = "Nasdaq 100 ETF"

[economic_data]
DGS10 = "10-Year Treasury"
UNRATE = "Unemployment rate"
"#,
    )
    .unwrap();

    let mut config = PipelineConfig {
        data_dir: dir.join("data"),
        tickers: tickers_path,
        epoch: epoch(),
        threads: 2,
        retry: RetryPolicy::immediate(2),
        ..Default::default()
    };
    config.stats.benchmark = "SPY".into();
    let tickers = TickerConfig::from_file(&config.tickers).unwrap();
    (config, tickers)
}

#[test]
fn first_run_builds_trimmed_batch() {
    let dir = tempfile::tempdir().unwrap();
    let (config, tickers) = setup(dir.path());
    let market = ScriptedMarket {
        calls: AtomicUsize::new(0),
    };
    let economy = ScriptedEconomy { dead: false };
    let providers = Providers {
        market: &market,
        economic: &economy,
        progress: &SilentProgress,
    };

    let report = run(&config, &tickers, &providers, d("2024-06-15"));
    assert!(report.is_success(), "failed steps: {:?}", report.failed());
    let steps: Vec<&str> = report.steps.iter().map(|s| s.step).collect();
    assert_eq!(
        steps,
        vec![
            "fetch-market",
            "market-stats",
            "ta",
            "gap-count",
            "trim",
            "find-dates",
            "fetch-economic",
            "economic-stats",
            "prune-dates",
            "batch",
        ]
    );

    let store = config.store();
    let market_data = store.load_required(&config.files.market_data).unwrap();
    let ta = store.load_required(&config.files.ta_data).unwrap();
    let market_stats = store.load_required(&config.files.market_stats).unwrap();
    let econ_stats = store.load_required(&config.files.economic_stats).unwrap();
    let batch = store.load_required(&config.files.batch).unwrap();

    // The fetched history is never trimmed.
    assert_eq!(market_data.first_date(), Some(epoch()));
    assert_eq!(market_data.len(), business_days(epoch(), d("2024-06-15")).len());

    let trimmed = read_gap_count(&config.gap_count_path()).unwrap();
    assert!(trimmed > 0);
    assert_eq!(ta.len(), market_data.len() - trimmed);
    assert_eq!(market_stats.len(), market_data.len() - trimmed);
    assert_eq!(leading_gap_count(&ta), 0);

    // Economic stats only keep market dates.
    let market_dates = market_data.dates();
    assert!(econ_stats.dates().iter().all(|d| market_dates.contains(d)));

    assert_eq!(batch.dates(), ta.dates());
    assert!(batch.column_index("SPY_Close").is_some());
    assert!(batch.column_index("SPY_ADXR_14").is_some());
    assert!(batch.column_index("QQQ_MACD_signal").is_some());
    assert!(batch.column_index("DGS10").is_some());
    assert!(batch.column_index("UNRATE").is_some());
    assert!(batch.get(0, "SPY_ADXR_14").is_some());
    assert!(batch.get(0, "DGS10").is_some());
    assert!(batch.is_sorted_unique());
}

#[test]
fn same_day_rerun_reproduces_batch() {
    let dir = tempfile::tempdir().unwrap();
    let (config, tickers) = setup(dir.path());
    let market = ScriptedMarket {
        calls: AtomicUsize::new(0),
    };
    let economy = ScriptedEconomy { dead: false };
    let providers = Providers {
        market: &market,
        economic: &economy,
        progress: &SilentProgress,
    };

    let first = run(&config, &tickers, &providers, d("2024-06-15"));
    assert!(first.is_success(), "{:?}", first.failed());
    let calls = market.calls.load(Ordering::SeqCst);
    let batch = config.store().load_required(&config.files.batch).unwrap();

    let second = run(&config, &tickers, &providers, d("2024-06-15"));
    assert!(second.is_success(), "{:?}", second.failed());
    assert_eq!(market.calls.load(Ordering::SeqCst), calls);
    assert_eq!(second.steps[0].detail, format!("{} up to date", config.files.market_data));
    assert_eq!(config.store().load_required(&config.files.batch).unwrap(), batch);
}

#[test]
fn later_day_appends_new_dates() {
    let dir = tempfile::tempdir().unwrap();
    let (config, tickers) = setup(dir.path());
    let market = ScriptedMarket {
        calls: AtomicUsize::new(0),
    };
    let economy = ScriptedEconomy { dead: false };
    let providers = Providers {
        market: &market,
        economic: &economy,
        progress: &SilentProgress,
    };

    assert!(run(&config, &tickers, &providers, d("2024-06-01")).is_success());
    let before = config.store().load_required(&config.files.market_data).unwrap();
    assert!(run(&config, &tickers, &providers, d("2024-06-15")).is_success());
    let after = config.store().load_required(&config.files.market_data).unwrap();

    assert_eq!(after.len(), before.len() + business_days(d("2024-06-01"), d("2024-06-15")).len());
    assert!(after.is_sorted_unique());
    assert_eq!(after.last_date(), Some(d("2024-06-14")));
    for (i, row) in before.rows().iter().enumerate() {
        assert_eq!(&after.rows()[i], row);
    }
}

#[test]
fn dead_economic_provider_spares_market_side() {
    let dir = tempfile::tempdir().unwrap();
    let (config, tickers) = setup(dir.path());
    let market = ScriptedMarket {
        calls: AtomicUsize::new(0),
    };
    let economy = ScriptedEconomy { dead: true };
    let providers = Providers {
        market: &market,
        economic: &economy,
        progress: &SilentProgress,
    };

    let report = run(&config, &tickers, &providers, d("2024-06-15"));
    assert!(!report.is_success());
    let failed: Vec<&str> = report.failed().iter().map(|s| s.step).collect();
    assert_eq!(failed, vec!["economic-stats", "prune-dates", "batch"]);

    let store = config.store();
    assert!(store.path(&config.files.ta_data).exists());
    assert!(store.path(&config.files.market_stats).exists());
    assert!(!store.path(&config.files.economic_data).exists());
    assert!(!store.path(&config.files.batch).exists());
}

#[test]
fn failed_stats_write_keeps_trimmed_table() {
    let dir = tempfile::tempdir().unwrap();
    let (config, tickers) = setup(dir.path());
    let market = ScriptedMarket {
        calls: AtomicUsize::new(0),
    };
    let economy = ScriptedEconomy { dead: false };
    let providers = Providers {
        market: &market,
        economic: &economy,
        progress: &SilentProgress,
    };

    assert!(run(&config, &tickers, &providers, d("2024-06-15")).is_success());
    let store = config.store();
    let stats_before = store.load_required(&config.files.market_stats).unwrap();
    let ta_before = store.load_required(&config.files.ta_data).unwrap();

    // The store writes through `<file>.tmp`; a directory there makes the
    // next statistics write fail.
    let stats_path = store.path(&config.files.market_stats);
    let mut blocker = stats_path.clone().into_os_string();
    blocker.push(".tmp");
    std::fs::create_dir(&blocker).unwrap();

    let report = run(&config, &tickers, &providers, d("2024-06-15"));
    let failed: Vec<&str> = report.failed().iter().map(|s| s.step).collect();
    assert_eq!(failed, vec!["market-stats"]);

    let stats_after = store.load_required(&config.files.market_stats).unwrap();
    assert_eq!(stats_after.len(), stats_before.len());
    assert_eq!(stats_after, stats_before);
    // The rewritten TA table is trimmed as usual.
    assert_eq!(store.load_required(&config.files.ta_data).unwrap(), ta_before);
}

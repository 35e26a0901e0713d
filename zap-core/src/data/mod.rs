//! Data layer: upstream providers, retry and circuit breaking, ticker
//! configuration, and table persistence.

pub mod circuit_breaker;
pub mod fred;
pub mod provider;
pub mod retry;
pub mod store;
pub mod tickers;
pub mod yahoo;

pub use circuit_breaker::CircuitBreaker;
pub use fred::FredProvider;
pub use provider::{
    DataError, DataProvider, DataSource, FetchProgress, FetchResult, LogProgress, Observation,
    SilentProgress,
};
pub use retry::RetryPolicy;
pub use store::{
    read_meta, read_table, write_table, StoreError, TableFormat, TableMeta, TableStatus, TableStore,
};
pub use tickers::{TickerConfig, TickerConfigError, TickerGroup};
pub use yahoo::YahooProvider;

//! ZAP Runner: the pipeline steps wired to files, and the daily run.
//!
//! This crate builds on `zap-core` to provide:
//! - Pipeline configuration (`zap.toml`) with defaults for every field
//! - One function per step: fetch, statistics, TA, pruning, batch, status
//! - The fork-join daily run over those steps
//! - A rayon fan-out for per-file transforms
//! - Batch assembly by date

pub mod batch;
pub mod config;
pub mod pipeline;
pub mod pool;
pub mod steps;

pub use batch::{assemble, BatchError};
pub use config::{ConfigError, PipelineConfig, DEFAULT_CONFIG_FILE};
pub use pipeline::{run, Providers, RunReport, StepRecord};
pub use pool::{for_each_file, PoolReport, PoolSummary};
pub use steps::{BatchSummary, DeriveSummary, FetchSummary, StatusReport, StepError};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_is_send_sync() {
        assert_send::<PipelineConfig>();
        assert_sync::<PipelineConfig>();
    }

    #[test]
    fn step_results_cross_threads() {
        assert_send::<StepError>();
        assert_send::<DeriveSummary>();
        assert_send::<PoolReport>();
        assert_send::<RunReport>();
    }
}

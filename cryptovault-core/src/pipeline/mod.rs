//! The three pipeline stages and the orchestrator that runs them in order.
//!
//! 1. [`acquire`]: validated, volume-ranked symbol universe.
//! 2. [`gaps`]: per-symbol full-vs-incremental verdict from the local logs.
//! 3. [`download`]: page klines, normalise, merge into the logs.

pub mod acquire;
pub mod download;
pub mod gaps;
pub mod progress;
pub mod run;

pub use acquire::{acquire_symbols, validate_universe, Exclusion};
pub use download::{
    download_and_merge, fetch_candles, merge_new_records, normalize_kline, start_time_for,
    DownloadReport, MergePlan, SymbolError, SymbolOutcome,
};
pub use gaps::{detect_gaps, GapMap};
pub use progress::{DownloadProgress, LogProgress, NoProgress};
pub use run::{run_pipeline, run_pipeline_at, PipelineReport};

use crate::config::ConfigError;
use crate::exchange::ExchangeError;
use crate::metadata::MetadataError;
use thiserror::Error;

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("symbol acquisition failed: {0}")]
    Acquisition(#[from] ExchangeError),

    #[error("failed to save symbol metadata: {0}")]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

//! End-to-end pipeline run.

use super::acquire::acquire_symbols;
use super::download::{download_and_merge, DownloadReport};
use super::gaps::detect_gaps;
use super::progress::DownloadProgress;
use super::PipelineError;
use crate::config::PipelineConfig;
use crate::exchange::MarketDataSource;
use crate::metadata::save_snapshot;
use crate::store::SymbolLogStore;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tracing::info;

/// Outcome of one full run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Symbols kept by stage 1.
    pub symbols: usize,
    pub excluded: usize,
    pub full_downloads: usize,
    pub incremental: usize,
    pub download: DownloadReport,
    pub elapsed: Duration,
}

/// Run all three stages against the current time.
pub fn run_pipeline(
    config: &PipelineConfig,
    source: &dyn MarketDataSource,
    store: &dyn SymbolLogStore,
    progress: &dyn DownloadProgress,
) -> Result<PipelineReport, PipelineError> {
    run_pipeline_at(config, source, store, progress, Utc::now())
}

/// Run all three stages with a fixed notion of "now".
///
/// Only stage 1 and the metadata snapshot can fail the run; stage 2 and 3
/// problems are per-symbol and end up in the report.
pub fn run_pipeline_at(
    config: &PipelineConfig,
    source: &dyn MarketDataSource,
    store: &dyn SymbolLogStore,
    progress: &dyn DownloadProgress,
    now: DateTime<Utc>,
) -> Result<PipelineReport, PipelineError> {
    config.validate()?;
    let started = Instant::now();

    banner("Stage 1: symbol acquisition & validation");
    let (symbols, metadata) = acquire_symbols(source, config, now)?;
    save_snapshot(&config.paths.metadata_file, &metadata)?;
    info!(path = %config.paths.metadata_file.display(), "saved symbol metadata");

    banner("Stage 2: gap detection");
    let gaps = detect_gaps(&symbols, store);
    let full_downloads = gaps.values().filter(|g| g.requires_full_download).count();

    banner("Stage 3: download & merge");
    let download = download_and_merge(&symbols, &gaps, source, store, config, now, progress);

    let elapsed = started.elapsed();
    info!(
        symbols = symbols.len(),
        records_stored = download.records_stored,
        errors = download.errors.len(),
        elapsed_secs = elapsed.as_secs_f64(),
        "pipeline complete"
    );

    Ok(PipelineReport {
        symbols: symbols.len(),
        excluded: metadata.excluded,
        full_downloads,
        incremental: gaps.len() - full_downloads,
        download,
        elapsed,
    })
}

fn banner(stage: &str) {
    info!("{}", "=".repeat(60));
    info!("{stage}");
    info!("{}", "=".repeat(60));
}

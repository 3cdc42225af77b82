//! Progress callbacks for the stage 3 download loop.

use super::download::{SymbolError, SymbolOutcome};
use tracing::{debug, info, warn};

/// Progress callback for batch downloads.
pub trait DownloadProgress: Send {
    /// Called before a symbol is fetched.
    fn on_start(&self, symbol: &str, index: usize, total: usize);

    /// Called when a symbol has been fetched and merged, or has failed.
    fn on_complete(
        &self,
        symbol: &str,
        index: usize,
        total: usize,
        result: &Result<SymbolOutcome, SymbolError>,
    );

    /// Called once after the last symbol.
    fn on_batch_complete(&self, updated: usize, failed: usize, total: usize);
}

/// Reports progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl DownloadProgress for LogProgress {
    fn on_start(&self, symbol: &str, index: usize, total: usize) {
        debug!(%symbol, "[{}/{}] fetching", index + 1, total);
    }

    fn on_complete(
        &self,
        symbol: &str,
        _index: usize,
        _total: usize,
        result: &Result<SymbolOutcome, SymbolError>,
    ) {
        match result {
            Ok(outcome) if outcome.stored > 0 => {
                debug!(%symbol, stored = outcome.stored, "updated")
            }
            Ok(_) => debug!(%symbol, "up to date"),
            Err(e) => warn!(%symbol, error = %e, "download failed"),
        }
    }

    fn on_batch_complete(&self, updated: usize, failed: usize, total: usize) {
        info!(updated, failed, total, "download batch complete");
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl DownloadProgress for NoProgress {
    fn on_start(&self, _symbol: &str, _index: usize, _total: usize) {}

    fn on_complete(
        &self,
        _symbol: &str,
        _index: usize,
        _total: usize,
        _result: &Result<SymbolOutcome, SymbolError>,
    ) {
    }

    fn on_batch_complete(&self, _updated: usize, _failed: usize, _total: usize) {}
}

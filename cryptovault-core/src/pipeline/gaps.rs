//! Stage 2: gap detection.
//!
//! Looks at the tail of every symbol log and decides whether stage 3 should
//! continue after the newest stored day or fetch the full history window.

use crate::domain::{GapInfo, LogState};
use crate::store::{SymbolLogStore, TailRecord};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Ticker → gap verdict, consumed by stage 3 within the same run.
pub type GapMap = BTreeMap<String, GapInfo>;

const PROGRESS_EVERY: usize = 100;

/// Classify every symbol's log. Never fails as a whole: a log that cannot be
/// read falls back to a full download.
pub fn detect_gaps(symbols: &[String], store: &dyn SymbolLogStore) -> GapMap {
    let total = symbols.len();
    let mut gaps = GapMap::new();

    for (i, symbol) in symbols.iter().enumerate() {
        gaps.insert(symbol.clone(), classify(symbol, store));

        if (i + 1) % PROGRESS_EVERY == 0 {
            info!(processed = i + 1, total, "gap detection progress");
        }
    }

    let full = gaps.values().filter(|g| g.requires_full_download).count();
    info!(
        symbols = total,
        full_downloads = full,
        incremental = total - full,
        "gap detection complete"
    );
    gaps
}

fn classify(symbol: &str, store: &dyn SymbolLogStore) -> GapInfo {
    if !store.exists(symbol) {
        return GapInfo::missing();
    }

    match store.read_last_record(symbol) {
        Ok(TailRecord::Record(candle)) => GapInfo::continue_after(candle.date),
        Ok(TailRecord::Missing) => GapInfo::missing(),
        Ok(TailRecord::Empty) => {
            warn!(%symbol, "log is empty, scheduling full download");
            GapInfo::needs_backfill(LogState::Empty)
        }
        Ok(TailRecord::Corrupt { reason }) => {
            warn!(%symbol, %reason, "last record is corrupt, scheduling full download");
            GapInfo::needs_backfill(LogState::Corrupt { reason })
        }
        Err(e) => {
            warn!(%symbol, error = %e, "log is unreadable, scheduling full download");
            GapInfo::needs_backfill(LogState::Unreadable {
                reason: e.to_string(),
            })
        }
    }
}

//! Gap metadata — stage 2's per-symbol verdict.

use chrono::NaiveDate;

/// What gap detection found on disk for one symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogState {
    /// No log file yet.
    Missing,
    /// File exists but holds no lines.
    Empty,
    /// The last line could not be parsed as a candle.
    Corrupt { reason: String },
    /// The file could not be read at all.
    Unreadable { reason: String },
    /// The last line parsed cleanly.
    Present,
}

/// Per-symbol decision consumed by stage 3 within the same run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapInfo {
    pub last_available_date: Option<NaiveDate>,
    pub requires_full_download: bool,
    pub file_exists: bool,
    pub state: LogState,
}

impl GapInfo {
    pub fn missing() -> Self {
        Self {
            last_available_date: None,
            requires_full_download: true,
            file_exists: false,
            state: LogState::Missing,
        }
    }

    /// File exists but cannot be continued from; fetch the whole window again.
    pub fn needs_backfill(state: LogState) -> Self {
        Self {
            last_available_date: None,
            requires_full_download: true,
            file_exists: true,
            state,
        }
    }

    pub fn continue_after(last: NaiveDate) -> Self {
        Self {
            last_available_date: Some(last),
            requires_full_download: false,
            file_exists: true,
            state: LogState::Present,
        }
    }
}

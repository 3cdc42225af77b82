//! Candle — the persisted unit of a per-symbol log.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily OHLCV observation, stored as a single JSON line.
///
/// `volume` is denominated in the quote asset. `timestamp` is the candle's
/// open time in epoch seconds and `date` is that instant's UTC calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timestamp: i64,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub number_of_trades: u64,
}

impl Candle {
    /// Encode as one log line (no trailing newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim_end())
    }
}

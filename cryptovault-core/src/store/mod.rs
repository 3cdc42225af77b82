//! Symbol log store: the durable per-symbol candle history.
//!
//! Each symbol owns one append-only log of candle records. The stages talk to
//! the `SymbolLogStore` trait only, so the flat-file backend can be swapped
//! for another without touching stage logic.

pub mod jsonl;
pub mod memory;

pub use jsonl::{JsonlStore, LogSummary};
pub use memory::MemoryStore;

use crate::domain::Candle;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no log stored for symbol '{symbol}'")]
    NotFound { symbol: String },

    #[error("invalid symbol name '{0}'")]
    InvalidSymbol(String),

    #[error("I/O error on log for {symbol}: {source}")]
    Io {
        symbol: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What the last line of a log holds.
#[derive(Debug, Clone, PartialEq)]
pub enum TailRecord {
    Missing,
    Empty,
    Corrupt { reason: String },
    Record(Candle),
}

/// Storage interface for per-symbol candle logs.
pub trait SymbolLogStore {
    fn exists(&self, symbol: &str) -> bool;

    /// Inspect the newest record without loading the whole log.
    fn read_last_record(&self, symbol: &str) -> Result<TailRecord, StoreError>;

    /// Every parsable record, in log order.
    fn read_all(&self, symbol: &str) -> Result<Vec<Candle>, StoreError>;

    /// Append records to the end of an existing log (creating it if absent).
    /// Returns the number of records written.
    fn append(&self, symbol: &str, records: &[Candle]) -> Result<usize, StoreError>;

    /// Write a brand-new log holding exactly `records`.
    fn create(&self, symbol: &str, records: &[Candle]) -> Result<usize, StoreError>;

    /// Dates already present in the log; empty when there is no log.
    fn existing_dates(&self, symbol: &str) -> Result<BTreeSet<NaiveDate>, StoreError> {
        if !self.exists(symbol) {
            return Ok(BTreeSet::new());
        }
        Ok(self.read_all(symbol)?.into_iter().map(|c| c.date).collect())
    }
}

/// Classify a raw last line.
pub(crate) fn parse_tail(line: Option<&str>) -> TailRecord {
    match line {
        None => TailRecord::Empty,
        Some(line) => match Candle::from_line(line) {
            Ok(candle) => TailRecord::Record(candle),
            Err(e) => TailRecord::Corrupt {
                reason: e.to_string(),
            },
        },
    }
}

//! In-memory symbol log store.
//!
//! Keeps raw lines rather than parsed candles so it behaves like the file
//! backend, corrupt lines included.

use super::{parse_tail, StoreError, SymbolLogStore, TailRecord};
use crate::domain::Candle;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct MemoryStore {
    logs: Mutex<BTreeMap<String, Vec<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a log with raw lines.
    pub fn insert_lines(&self, symbol: &str, lines: Vec<String>) {
        self.logs().insert(symbol.to_string(), lines);
    }

    /// Raw lines of a log, if any.
    pub fn lines(&self, symbol: &str) -> Option<Vec<String>> {
        self.logs().get(symbol).cloned()
    }

    fn logs(&self) -> MutexGuard<'_, BTreeMap<String, Vec<String>>> {
        self.logs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn encode(records: &[Candle]) -> Result<Vec<String>, StoreError> {
    records
        .iter()
        .map(|r| r.to_line().map_err(StoreError::from))
        .collect()
}

impl SymbolLogStore for MemoryStore {
    fn exists(&self, symbol: &str) -> bool {
        self.logs().contains_key(symbol)
    }

    fn read_last_record(&self, symbol: &str) -> Result<TailRecord, StoreError> {
        let logs = self.logs();
        let Some(lines) = logs.get(symbol) else {
            return Ok(TailRecord::Missing);
        };
        let last = lines.iter().rev().find(|l| !l.trim().is_empty());
        Ok(parse_tail(last.map(String::as_str)))
    }

    fn read_all(&self, symbol: &str) -> Result<Vec<Candle>, StoreError> {
        let logs = self.logs();
        let lines = logs.get(symbol).ok_or_else(|| StoreError::NotFound {
            symbol: symbol.to_string(),
        })?;
        Ok(lines
            .iter()
            .filter_map(|l| Candle::from_line(l).ok())
            .collect())
    }

    fn append(&self, symbol: &str, records: &[Candle]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let encoded = encode(records)?;
        self.logs()
            .entry(symbol.to_string())
            .or_default()
            .extend(encoded);
        Ok(records.len())
    }

    fn create(&self, symbol: &str, records: &[Candle]) -> Result<usize, StoreError> {
        let encoded = encode(records)?;
        self.logs().insert(symbol.to_string(), encoded);
        Ok(records.len())
    }
}

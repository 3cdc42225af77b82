//! Validated symbol universe.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

/// A symbol that passed every validation rule in stage 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    /// 24h traded volume denominated in the quote asset.
    #[serde(rename = "volume_24h_usdt")]
    pub quote_volume_24h: f64,
    pub last_price: f64,
    #[serde(deserialize_with = "utc_timestamp")]
    pub validation_timestamp: DateTime<Utc>,
}

/// Snapshot of one run's symbol universe, overwritten every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMetadata {
    #[serde(rename = "total_symbols_extracted")]
    pub kept: usize,
    #[serde(rename = "total_symbols_excluded")]
    pub excluded: usize,
    #[serde(deserialize_with = "utc_timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Kept symbols, highest quote volume first.
    pub symbols: Vec<SymbolRecord>,
}

impl SymbolMetadata {
    pub fn tickers(&self) -> Vec<String> {
        self.symbols.iter().map(|s| s.symbol.clone()).collect()
    }
}

/// RFC 3339, or an offset-less ISO 8601 timestamp read as UTC.
fn utc_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| de::Error::custom(format!("invalid timestamp '{raw}': {e}")))
}

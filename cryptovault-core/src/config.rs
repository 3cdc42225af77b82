//! Pipeline configuration.
//!
//! Every knob the three stages need lives here and is passed in explicitly,
//! so each stage can be exercised with overridden values. Defaults match the
//! production constants; a TOML file can override any subset of them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Longest accepted backfill window, in days.
pub const MAX_HISTORY_DAYS: i64 = 36_500;

/// Largest accepted `http.backoff_factor`, in seconds.
pub const MAX_BACKOFF_FACTOR: f64 = 60.0;

/// Ceiling on any single backoff sleep.
pub const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(300);

/// Errors raised while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Base URL of the exchange REST API (no trailing slash).
    pub api_base_url: String,
    /// How many symbols to keep after ranking by 24h quote volume.
    pub top_n_symbols: usize,
    /// Quote assets a symbol must be priced in to be kept.
    pub accepted_quote_assets: BTreeSet<String>,
    /// Lookback window for a full historical backfill.
    pub history_days: i64,
    /// Candles requested per kline page (exchange maximum is 1000).
    pub kline_page_limit: u16,
    /// Pause between symbols in stage 3.
    pub rate_limit_delay_ms: u64,
    /// How many per-symbol errors the end-of-run summary prints.
    pub max_reported_errors: usize,
    pub http: HttpConfig,
    pub paths: PathsConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.binance.com/api/v3".into(),
            top_n_symbols: 100,
            accepted_quote_assets: ["USDT", "BUSD", "USDC"]
                .into_iter()
                .map(String::from)
                .collect(),
            history_days: 3650,
            kline_page_limit: 1000,
            rate_limit_delay_ms: 50,
            max_reported_errors: 5,
            http: HttpConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a TOML file and validate it.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a configuration from a TOML string and validate it.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_n_symbols == 0 {
            return Err(ConfigError::Invalid("top_n_symbols must be at least 1".into()));
        }
        if self.accepted_quote_assets.is_empty() {
            return Err(ConfigError::Invalid(
                "accepted_quote_assets must not be empty".into(),
            ));
        }
        if !(1..=MAX_HISTORY_DAYS).contains(&self.history_days) {
            return Err(ConfigError::Invalid(format!(
                "history_days must be within 1..={MAX_HISTORY_DAYS}, got {}",
                self.history_days
            )));
        }
        if !(1..=1000).contains(&self.kline_page_limit) {
            return Err(ConfigError::Invalid(format!(
                "kline_page_limit must be within 1..=1000, got {}",
                self.kline_page_limit
            )));
        }
        self.http.validate()
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }

    pub fn is_accepted_quote(&self, quote_asset: &str) -> bool {
        self.accepted_quote_assets.contains(quote_asset)
    }
}

/// Transport settings for the retrying HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Additional attempts after the first failed one.
    pub max_retries: u32,
    /// Base of the exponential backoff, in seconds.
    pub backoff_factor: f64,
    /// HTTP statuses treated as transient.
    pub retry_statuses: Vec<u16>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_retries: 3,
            backoff_factor: 0.3,
            retry_statuses: vec![500, 502, 503, 504],
        }
    }
}

impl HttpConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("http.timeout_secs must be positive".into()));
        }
        if !(0.0..=MAX_BACKOFF_FACTOR).contains(&self.backoff_factor) {
            return Err(ConfigError::Invalid(format!(
                "http.backoff_factor must be within 0..={MAX_BACKOFF_FACTOR}, got {}",
                self.backoff_factor
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Sleep before retry number `retry` (1-based): `backoff_factor * 2^(retry-1)`
    /// seconds, capped at [`MAX_BACKOFF_DELAY`].
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exp = 2f64.powi(retry.saturating_sub(1).min(30) as i32);
        Duration::try_from_secs_f64(self.backoff_factor * exp)
            .map_or(MAX_BACKOFF_DELAY, |d| d.min(MAX_BACKOFF_DELAY))
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }
}

/// On-disk layout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    /// One `<TICKER>.jsonl` log per symbol.
    pub symbols_dir: PathBuf,
    /// Snapshot of the latest validated symbol universe.
    pub metadata_file: PathBuf,
    /// Per-run log files.
    pub logs_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self::under(PathBuf::from("data"))
    }
}

impl PathsConfig {
    fn under(data_dir: PathBuf) -> Self {
        Self {
            symbols_dir: data_dir.join("cryptocurrencies"),
            metadata_file: data_dir.join("metadata").join("exchange_symbols.json"),
            data_dir,
            logs_dir: PathBuf::from("logs"),
        }
    }

    /// Re-root the symbol logs and metadata snapshot under `data_dir`.
    /// The logs directory is left untouched.
    pub fn with_data_dir(&self, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: self.logs_dir.clone(),
            ..Self::under(data_dir.into())
        }
    }
}

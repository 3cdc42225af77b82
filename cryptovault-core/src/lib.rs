//! CryptoVault Core — symbol universe, gap detection, candle download, append-only logs.
//!
//! This crate contains the whole batch pipeline:
//! - Domain types (candles, symbol records, gap verdicts)
//! - Configuration loaded from TOML with production defaults
//! - Exchange access behind the `MarketDataSource` trait, with a retrying
//!   Binance REST client
//! - Per-symbol candle logs behind the `SymbolLogStore` trait
//! - The three stages and the orchestrator that runs them

pub mod config;
pub mod domain;
pub mod exchange;
pub mod metadata;
pub mod pipeline;
pub mod store;

pub use config::{ConfigError, PipelineConfig};
pub use pipeline::{run_pipeline, PipelineError, PipelineReport};

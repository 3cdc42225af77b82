//! Exchange access: the market data trait, wire types, and the Binance client.
//!
//! `MarketDataSource` is the seam between the pipeline stages and the
//! network. Stages only see the trait, so tests drive them with in-process
//! fakes and the production binary plugs in `BinanceClient`.

pub mod binance;
pub mod http;
pub mod types;

pub use binance::BinanceClient;
pub use http::RetryingClient;
pub use types::{ExchangeInfo, RawKline, SymbolInfo, Ticker24h};

use thiserror::Error;

/// Errors from exchange requests.
///
/// Transient failures have already been retried by the time one of these
/// reaches a caller.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
}

/// Source of exchange metadata, 24h statistics and klines.
pub trait MarketDataSource {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Full exchange symbol metadata.
    fn exchange_info(&self) -> Result<ExchangeInfo, ExchangeError>;

    /// 24h rolling statistics for every symbol.
    fn ticker_24h(&self) -> Result<Vec<Ticker24h>, ExchangeError>;

    /// One page of klines opening at or after `start_time_ms`, oldest first.
    fn klines(
        &self,
        symbol: &str,
        interval: &str,
        start_time_ms: i64,
        limit: u16,
    ) -> Result<Vec<RawKline>, ExchangeError>;
}

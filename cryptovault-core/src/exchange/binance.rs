//! Binance spot REST (v3) market data source.

use super::http::RetryingClient;
use super::types::{ExchangeInfo, RawKline, Ticker24h};
use super::{ExchangeError, MarketDataSource};
use crate::config::PipelineConfig;

pub struct BinanceClient {
    http: RetryingClient,
    base_url: String,
}

impl BinanceClient {
    pub fn new(http: RetryingClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Client configured from the pipeline's HTTP settings and base URL.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ExchangeError> {
        let http = RetryingClient::new(config.http.clone())?;
        Ok(Self::new(http, config.api_base_url.clone()))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl MarketDataSource for BinanceClient {
    fn name(&self) -> &str {
        "binance"
    }

    fn exchange_info(&self) -> Result<ExchangeInfo, ExchangeError> {
        self.http.get_json(&self.endpoint("/exchangeInfo"), &[])
    }

    fn ticker_24h(&self) -> Result<Vec<Ticker24h>, ExchangeError> {
        self.http.get_json(&self.endpoint("/ticker/24hr"), &[])
    }

    fn klines(
        &self,
        symbol: &str,
        interval: &str,
        start_time_ms: i64,
        limit: u16,
    ) -> Result<Vec<RawKline>, ExchangeError> {
        let query = [
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("startTime", start_time_ms.to_string()),
            ("limit", limit.to_string()),
        ];
        self.http.get_json(&self.endpoint("/klines"), &query)
    }
}

//! Stage 1: symbol acquisition and validation.
//!
//! Pulls exchange metadata and 24h statistics, keeps tradeable symbols quoted
//! in an accepted currency with a positive last price, ranks them by 24h
//! quote volume and keeps the top N.

use crate::config::PipelineConfig;
use crate::domain::{SymbolMetadata, SymbolRecord};
use crate::exchange::{ExchangeError, ExchangeInfo, MarketDataSource, SymbolInfo, Ticker24h};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info};

/// Why a symbol was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    QuoteAsset,
    NotTrading,
    InvalidPrice,
}

/// Fetch and validate the symbol universe.
///
/// Any network or decode failure aborts the stage; there is no partial result.
pub fn acquire_symbols(
    source: &dyn MarketDataSource,
    config: &PipelineConfig,
    now: DateTime<Utc>,
) -> Result<(Vec<String>, SymbolMetadata), ExchangeError> {
    let started = Instant::now();

    info!(source = source.name(), "fetching exchange information");
    let exchange_info = source.exchange_info()?;

    info!("retrieving 24-hour statistics for volume ranking");
    let tickers = source.ticker_24h()?;

    let metadata = validate_universe(&exchange_info, &tickers, config, now);
    info!(
        kept = metadata.kept,
        excluded = metadata.excluded,
        elapsed_secs = started.elapsed().as_secs_f64(),
        "symbol acquisition complete"
    );

    Ok((metadata.tickers(), metadata))
}

/// Apply the validation rules and the top-N cut to already fetched responses.
///
/// Symbols without a 24h statistics entry are skipped without being counted
/// as excluded.
pub fn validate_universe(
    exchange_info: &ExchangeInfo,
    tickers: &[Ticker24h],
    config: &PipelineConfig,
    now: DateTime<Utc>,
) -> SymbolMetadata {
    let stats: HashMap<&str, &Ticker24h> =
        tickers.iter().map(|t| (t.symbol.as_str(), t)).collect();

    let mut kept = Vec::new();
    let mut excluded = 0;

    for info in &exchange_info.symbols {
        let Some(ticker) = stats.get(info.symbol.as_str()) else {
            continue;
        };

        let last_price = match check_symbol(info, ticker, config) {
            Ok(price) => price,
            Err(reason) => {
                debug!(symbol = %info.symbol, ?reason, "excluded");
                excluded += 1;
                continue;
            }
        };

        kept.push(SymbolRecord {
            symbol: info.symbol.clone(),
            base_asset: info.base_asset.clone(),
            quote_asset: info.quote_asset.clone(),
            quote_volume_24h: ticker.quote_volume.unwrap_or(0.0),
            last_price,
            validation_timestamp: now,
        });
    }

    // Stable sort: equal volumes keep exchange order.
    kept.sort_by(|a, b| b.quote_volume_24h.total_cmp(&a.quote_volume_24h));
    kept.truncate(config.top_n_symbols);

    SymbolMetadata {
        kept: kept.len(),
        excluded,
        timestamp: now,
        symbols: kept,
    }
}

fn check_symbol(
    info: &SymbolInfo,
    ticker: &Ticker24h,
    config: &PipelineConfig,
) -> Result<f64, Exclusion> {
    if !config.is_accepted_quote(&info.quote_asset) {
        return Err(Exclusion::QuoteAsset);
    }
    if !info.is_trading() {
        return Err(Exclusion::NotTrading);
    }
    match ticker.last_price {
        Some(price) if price > 0.0 => Ok(price),
        _ => Err(Exclusion::InvalidPrice),
    }
}

//! Stage 3: download and merge.
//!
//! For each symbol, pages daily klines from the start computed out of its gap
//! verdict, normalises them into candles and merges them into the symbol's
//! log so that no date is stored twice. Symbols are processed one at a time
//! and a failure on one never stops the others.

use super::gaps::GapMap;
use super::progress::DownloadProgress;
use crate::config::PipelineConfig;
use crate::domain::{Candle, GapInfo};
use crate::exchange::{ExchangeError, MarketDataSource, RawKline};
use crate::store::{StoreError, SymbolLogStore};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::collections::BTreeSet;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info};

/// Candle interval requested from the exchange.
pub const KLINE_INTERVAL: &str = "1d";

const DAY_MS: i64 = 86_400_000;
const PROGRESS_EVERY: usize = 50;

/// Failure while updating one symbol. Recorded and skipped, never fatal.
#[derive(Debug, Error)]
pub enum SymbolError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("kline open time {open_time_ms} is out of range")]
    InvalidKline { open_time_ms: i64 },

    #[error("no gap information for symbol")]
    MissingGapInfo,

    #[error("history window of {history_days} days reaches outside the supported date range")]
    StartOutOfRange { history_days: i64 },
}

/// What happened to one symbol that was updated without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SymbolOutcome {
    /// Candles received from the exchange.
    pub downloaded: usize,
    /// Candles actually written to the log.
    pub stored: usize,
}

/// Counters and errors for a whole stage 3 batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub symbols_total: usize,
    /// Symbols that had at least one new record written.
    pub symbols_updated: usize,
    /// Symbols processed without error but with nothing new to store.
    pub symbols_up_to_date: usize,
    pub records_downloaded: usize,
    pub records_stored: usize,
    /// One `"Symbol <S>: <error>"` entry per failed symbol, in processing order.
    pub errors: Vec<String>,
}

impl DownloadReport {
    pub fn symbols_failed(&self) -> usize {
        self.errors.len()
    }
}

/// Result of merging a fetched batch against an existing log.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    /// Records to append, oldest first.
    pub records: Vec<Candle>,
    /// Fetched records dropped because their date was already present.
    pub duplicates: usize,
    /// Fetched records dropped because they predate the log's newest record.
    pub stale: usize,
}

/// First instant stage 3 should fetch from for a symbol.
///
/// Full downloads reach back `history_days` from `now`; incremental ones
/// start at 00:00 UTC of the day after the newest stored record. A window
/// that does not fit in the calendar is an error, not a panic.
pub fn start_time_for(
    gap: &GapInfo,
    now: DateTime<Utc>,
    history_days: i64,
) -> Result<DateTime<Utc>, SymbolError> {
    let full_window = Duration::try_days(history_days)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or(SymbolError::StartOutOfRange { history_days });

    if gap.requires_full_download {
        return full_window;
    }
    match gap
        .last_available_date
        .and_then(|d| d.succ_opt())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        Some(dt) => Ok(Utc.from_utc_datetime(&dt)),
        None => full_window,
    }
}

/// Page daily klines from `start` up to `now`.
///
/// Each page starts one day after the last candle of the previous page.
/// Stops on an empty page, once the cursor passes `now`, or if the cursor
/// would not move forward.
pub fn fetch_candles(
    source: &dyn MarketDataSource,
    symbol: &str,
    start: DateTime<Utc>,
    now: DateTime<Utc>,
    page_limit: u16,
) -> Result<Vec<Candle>, SymbolError> {
    let end_ms = now.timestamp_millis();
    let mut cursor = start.timestamp_millis();
    let mut candles = Vec::new();

    while cursor <= end_ms {
        let page = source.klines(symbol, KLINE_INTERVAL, cursor, page_limit)?;
        let Some(last) = page.last() else {
            break;
        };
        let next = last.open_time_ms.saturating_add(DAY_MS);

        for kline in &page {
            candles.push(normalize_kline(symbol, kline)?);
        }
        debug!(%symbol, page = page.len(), total = candles.len(), "kline page");

        if next <= cursor {
            break;
        }
        cursor = next;
    }

    Ok(candles)
}

/// Convert one exchange kline into a stored candle.
pub fn normalize_kline(symbol: &str, kline: &RawKline) -> Result<Candle, SymbolError> {
    let open_time = DateTime::<Utc>::from_timestamp_millis(kline.open_time_ms).ok_or(
        SymbolError::InvalidKline {
            open_time_ms: kline.open_time_ms,
        },
    )?;

    Ok(Candle {
        symbol: symbol.to_string(),
        timestamp: kline.open_time_ms.div_euclid(1000),
        date: open_time.date_naive(),
        open: kline.open,
        high: kline.high,
        low: kline.low,
        close: kline.close,
        volume: kline.quote_volume,
        number_of_trades: kline.number_of_trades,
    })
}

/// Drop repeated dates within a batch, keeping the first occurrence and the
/// received order. Returns the kept records and how many were dropped.
pub fn dedupe_batch(fetched: Vec<Candle>) -> (Vec<Candle>, usize) {
    let before = fetched.len();
    let mut seen = BTreeSet::new();
    let kept: Vec<Candle> = fetched
        .into_iter()
        .filter(|c| seen.insert(c.date))
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

/// Decide which fetched records may be appended to a log holding `existing`.
///
/// The result holds no date from `existing`, no date twice, and nothing older
/// than the newest existing date, so the log stays in non-decreasing order.
pub fn merge_new_records(existing: &BTreeSet<NaiveDate>, mut fetched: Vec<Candle>) -> MergePlan {
    fetched.sort_by_key(|c| c.date);
    let (batch, mut duplicates) = dedupe_batch(fetched);
    let newest = existing.last().copied();

    let mut stale = 0;
    let mut records = Vec::with_capacity(batch.len());
    for candle in batch {
        if existing.contains(&candle.date) {
            duplicates += 1;
        } else if newest.is_some_and(|n| candle.date < n) {
            stale += 1;
        } else {
            records.push(candle);
        }
    }

    MergePlan {
        records,
        duplicates,
        stale,
    }
}

/// Fetch and merge every symbol in order.
///
/// Per-symbol failures are logged, recorded in the report and skipped. The
/// rate-limit pause is taken between symbols.
pub fn download_and_merge(
    symbols: &[String],
    gaps: &GapMap,
    source: &dyn MarketDataSource,
    store: &dyn SymbolLogStore,
    config: &PipelineConfig,
    now: DateTime<Utc>,
    progress: &dyn DownloadProgress,
) -> DownloadReport {
    let started = Instant::now();
    let total = symbols.len();
    let mut report = DownloadReport {
        symbols_total: total,
        ..DownloadReport::default()
    };

    for (i, symbol) in symbols.iter().enumerate() {
        if i > 0 && !config.rate_limit_delay().is_zero() {
            std::thread::sleep(config.rate_limit_delay());
        }

        progress.on_start(symbol, i, total);
        let result = match gaps.get(symbol) {
            Some(gap) => update_symbol(symbol, gap, source, store, config, now),
            None => Err(SymbolError::MissingGapInfo),
        };
        progress.on_complete(symbol, i, total, &result);

        match result {
            Ok(outcome) => {
                report.records_downloaded += outcome.downloaded;
                report.records_stored += outcome.stored;
                if outcome.stored > 0 {
                    report.symbols_updated += 1;
                } else {
                    report.symbols_up_to_date += 1;
                }
            }
            Err(e) => {
                error!(%symbol, error = %e, "failed to update symbol");
                report.errors.push(format!("Symbol {symbol}: {e}"));
            }
        }

        if (i + 1) % PROGRESS_EVERY == 0 {
            info!(
                processed = i + 1,
                total,
                records_stored = report.records_stored,
                "download progress"
            );
        }
    }

    progress.on_batch_complete(report.symbols_updated, report.symbols_failed(), total);

    info!(
        updated = report.symbols_updated,
        up_to_date = report.symbols_up_to_date,
        failed = report.symbols_failed(),
        records_downloaded = report.records_downloaded,
        records_stored = report.records_stored,
        elapsed_secs = started.elapsed().as_secs_f64(),
        "download and merge complete"
    );
    for message in report.errors.iter().take(config.max_reported_errors) {
        error!("{message}");
    }
    if report.errors.len() > config.max_reported_errors {
        error!(
            "... and {} more errors",
            report.errors.len() - config.max_reported_errors
        );
    }

    report
}

fn update_symbol(
    symbol: &str,
    gap: &GapInfo,
    source: &dyn MarketDataSource,
    store: &dyn SymbolLogStore,
    config: &PipelineConfig,
    now: DateTime<Utc>,
) -> Result<SymbolOutcome, SymbolError> {
    let start = start_time_for(gap, now, config.history_days)?;
    let fetched = fetch_candles(source, symbol, start, now, config.kline_page_limit)?;
    let downloaded = fetched.len();
    if fetched.is_empty() {
        return Ok(SymbolOutcome::default());
    }

    let stored = if store.exists(symbol) {
        let existing = store.existing_dates(symbol)?;
        let plan = merge_new_records(&existing, fetched);
        if plan.duplicates > 0 || plan.stale > 0 {
            debug!(
                %symbol,
                duplicates = plan.duplicates,
                stale = plan.stale,
                "dropped already stored records"
            );
        }
        store.append(symbol, &plan.records)?
    } else {
        let (records, dropped) = dedupe_batch(fetched);
        if dropped > 0 {
            debug!(%symbol, dropped, "dropped repeated dates in batch");
        }
        store.create(symbol, &records)?
    };

    Ok(SymbolOutcome { downloaded, stored })
}

//! End-to-end pipeline tests against an in-process exchange and temp directories.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use cryptovault_core::domain::{Candle, GapInfo};
use cryptovault_core::exchange::{
    ExchangeError, ExchangeInfo, MarketDataSource, RawKline, SymbolInfo, Ticker24h,
};
use cryptovault_core::metadata::load_snapshot;
use cryptovault_core::pipeline::{
    acquire_symbols, detect_gaps, download_and_merge, run_pipeline_at, NoProgress, PipelineError,
};
use cryptovault_core::store::{JsonlStore, SymbolLogStore};
use cryptovault_core::PipelineConfig;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::sync::Mutex;
use tempfile::TempDir;

const DAY_MS: i64 = 86_400_000;

// ── Fake exchange ────────────────────────────────────────────────────

#[derive(Default)]
struct FakeExchange {
    symbols: Vec<SymbolInfo>,
    tickers: Vec<Ticker24h>,
    /// Inclusive range of daily candles each symbol has, as UTC midnights.
    history: HashMap<String, (DateTime<Utc>, DateTime<Utc>)>,
    failing_klines: HashSet<String>,
    exchange_down: bool,
    kline_calls: Mutex<Vec<(String, i64)>>,
}

impl FakeExchange {
    fn listing(&mut self, symbol: &str, quote: &str, status: &str, price: f64, volume: f64) {
        self.symbols.push(SymbolInfo {
            symbol: symbol.into(),
            status: status.into(),
            base_asset: symbol.trim_end_matches(quote).into(),
            quote_asset: quote.into(),
        });
        self.tickers.push(Ticker24h {
            symbol: symbol.into(),
            last_price: Some(price),
            quote_volume: Some(volume),
        });
    }

    fn with_history(&mut self, symbol: &str, first: DateTime<Utc>, last: DateTime<Utc>) {
        self.history.insert(symbol.into(), (first, last));
    }
}

impl MarketDataSource for FakeExchange {
    fn name(&self) -> &str {
        "fake"
    }

    fn exchange_info(&self) -> Result<ExchangeInfo, ExchangeError> {
        if self.exchange_down {
            return Err(ExchangeError::NetworkUnreachable("connection refused".into()));
        }
        Ok(ExchangeInfo {
            symbols: self.symbols.clone(),
        })
    }

    fn ticker_24h(&self) -> Result<Vec<Ticker24h>, ExchangeError> {
        Ok(self.tickers.clone())
    }

    fn klines(
        &self,
        symbol: &str,
        _interval: &str,
        start_time_ms: i64,
        limit: u16,
    ) -> Result<Vec<RawKline>, ExchangeError> {
        self.kline_calls
            .lock()
            .unwrap()
            .push((symbol.to_string(), start_time_ms));
        if self.failing_klines.contains(symbol) {
            return Err(ExchangeError::RetriesExhausted {
                attempts: 4,
                last: "HTTP 503".into(),
            });
        }
        let Some((first, last)) = self.history.get(symbol) else {
            return Ok(Vec::new());
        };

        let mut t = start_time_ms.max(first.timestamp_millis());
        t = (t + DAY_MS - 1).div_euclid(DAY_MS) * DAY_MS;
        let mut page = Vec::new();
        while t <= last.timestamp_millis() && page.len() < limit as usize {
            let price = 100.0 + (t / DAY_MS % 17) as f64;
            page.push(RawKline {
                open_time_ms: t,
                open: price,
                high: price + 2.0,
                low: price - 2.0,
                close: price + 1.0,
                quote_volume: price * 1_000.0,
                number_of_trades: (t / DAY_MS % 1000) as u64,
            });
            t += DAY_MS;
        }
        Ok(page)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn test_config(dir: &TempDir) -> PipelineConfig {
    let mut config = PipelineConfig {
        history_days: 10,
        rate_limit_delay_ms: 0,
        ..PipelineConfig::default()
    };
    config.paths = config.paths.with_data_dir(dir.path());
    config
}

fn three_symbol_exchange() -> FakeExchange {
    let mut fake = FakeExchange::default();
    for (symbol, volume) in [("AAAUSDT", 3.0e9), ("BBBUSDT", 2.0e9), ("CCCUSDT", 1.0e9)] {
        fake.listing(symbol, "USDT", "TRADING", 10.0, volume);
        fake.with_history(symbol, utc(2024, 1, 1), utc(2024, 1, 10));
    }
    fake
}

fn log_dates(store: &JsonlStore, symbol: &str) -> Vec<NaiveDate> {
    store
        .read_all(symbol)
        .unwrap()
        .into_iter()
        .map(|c| c.date)
        .collect()
}

fn assert_unique_and_sorted(dates: &[NaiveDate]) {
    let unique: BTreeSet<_> = dates.iter().collect();
    assert_eq!(unique.len(), dates.len(), "duplicate dates: {dates:?}");
    assert!(dates.windows(2).all(|w| w[0] <= w[1]), "unsorted: {dates:?}");
}

// ── Stage 1 ──────────────────────────────────────────────────────────

#[test]
fn foreign_quote_asset_is_never_kept() {
    let mut fake = FakeExchange::default();
    fake.listing("BTCUSDT", "USDT", "TRADING", 68_000.0, 1.0e9);
    fake.listing("FOOXYZ", "XYZ", "TRADING", 3.0, 9.0e12);
    fake.listing("BARXYZ", "XYZ", "TRADING", 1.0, 8.0e12);

    let (tickers, meta) =
        acquire_symbols(&fake, &PipelineConfig::default(), utc(2025, 1, 1)).unwrap();
    assert_eq!(tickers, vec!["BTCUSDT"]);
    assert!(meta.symbols.iter().all(|s| s.quote_asset != "XYZ"));
    assert_eq!(meta.excluded, 2);
}

#[test]
fn keeps_top_hundred_by_volume() {
    let mut fake = FakeExchange::default();
    for i in 0..150 {
        fake.listing(&format!("S{i:03}USDT"), "USDT", "TRADING", 1.0, (i + 1) as f64 * 1_000.0);
    }

    let (tickers, meta) =
        acquire_symbols(&fake, &PipelineConfig::default(), utc(2025, 1, 1)).unwrap();
    assert_eq!(tickers.len(), 100);
    assert_eq!(meta.kept, 100);
    assert_eq!(tickers[0], "S149USDT");
    assert_eq!(tickers[99], "S050USDT");
    assert!(meta
        .symbols
        .windows(2)
        .all(|w| w[0].quote_volume_24h > w[1].quote_volume_24h));
}

#[test]
fn stage_one_failure_aborts_the_run() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let mut fake = three_symbol_exchange();
    fake.exchange_down = true;
    let store = JsonlStore::new(&config.paths.symbols_dir);

    let err = run_pipeline_at(&config, &fake, &store, &NoProgress, utc(2024, 1, 10)).unwrap_err();
    assert!(matches!(err, PipelineError::Acquisition(_)));
    assert!(!config.paths.metadata_file.exists());
    assert!(store.symbols().unwrap().is_empty());
}

// ── Stage 2 ──────────────────────────────────────────────────────────

#[test]
fn gap_classification_from_disk() {
    let dir = TempDir::new().unwrap();
    let store = JsonlStore::new(dir.path());
    let candle = Candle {
        symbol: "BTCUSDT".into(),
        timestamp: 1_704_412_800,
        date: date("2024-01-05"),
        open: 1.0,
        high: 1.0,
        low: 1.0,
        close: 1.0,
        volume: 1.0,
        number_of_trades: 1,
    };
    store.create("BTCUSDT", &[candle]).unwrap();

    let gaps = detect_gaps(&["BTCUSDT".to_string(), "NEWUSDT".to_string()], &store);

    let btc = &gaps["BTCUSDT"];
    assert!(!btc.requires_full_download);
    assert!(btc.file_exists);
    assert_eq!(btc.last_available_date, Some(date("2024-01-05")));

    let new = &gaps["NEWUSDT"];
    assert!(new.requires_full_download);
    assert!(!new.file_exists);
    assert_eq!(new.last_available_date, None);
}

// ── Full runs ────────────────────────────────────────────────────────

#[test]
fn first_run_backfills_and_writes_snapshot() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let fake = three_symbol_exchange();
    let store = JsonlStore::new(&config.paths.symbols_dir);

    let report = run_pipeline_at(&config, &fake, &store, &NoProgress, utc(2024, 1, 10)).unwrap();
    assert_eq!(report.symbols, 3);
    assert_eq!(report.full_downloads, 3);
    assert_eq!(report.incremental, 0);
    assert_eq!(report.download.symbols_updated, 3);
    assert_eq!(report.download.records_stored, 30);
    assert!(report.download.errors.is_empty());

    let snapshot = load_snapshot(&config.paths.metadata_file).unwrap();
    assert_eq!(snapshot.tickers(), vec!["AAAUSDT", "BBBUSDT", "CCCUSDT"]);

    let dates = log_dates(&store, "AAAUSDT");
    assert_eq!(dates.first(), Some(&date("2024-01-01")));
    assert_eq!(dates.last(), Some(&date("2024-01-10")));
    assert_unique_and_sorted(&dates);
}

#[test]
fn rerun_without_new_candles_leaves_logs_byte_identical() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let fake = three_symbol_exchange();
    let store = JsonlStore::new(&config.paths.symbols_dir);
    let now = utc(2024, 1, 10) + Duration::hours(6);

    run_pipeline_at(&config, &fake, &store, &NoProgress, now).unwrap();
    let before: Vec<Vec<u8>> = ["AAAUSDT", "BBBUSDT", "CCCUSDT"]
        .iter()
        .map(|s| fs::read(store.log_path(s).unwrap()).unwrap())
        .collect();
    let hash_before = store.summary("AAAUSDT").unwrap().content_hash;

    let report = run_pipeline_at(&config, &fake, &store, &NoProgress, now).unwrap();
    assert_eq!(report.incremental, 3);
    assert_eq!(report.download.records_stored, 0);
    assert_eq!(report.download.symbols_up_to_date, 3);

    let after: Vec<Vec<u8>> = ["AAAUSDT", "BBBUSDT", "CCCUSDT"]
        .iter()
        .map(|s| fs::read(store.log_path(s).unwrap()).unwrap())
        .collect();
    assert_eq!(before, after);
    assert_eq!(store.summary("AAAUSDT").unwrap().content_hash, hash_before);
}

#[test]
fn later_run_appends_only_missing_days() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let mut fake = three_symbol_exchange();
    let store = JsonlStore::new(&config.paths.symbols_dir);

    run_pipeline_at(&config, &fake, &store, &NoProgress, utc(2024, 1, 10)).unwrap();

    for symbol in ["AAAUSDT", "BBBUSDT", "CCCUSDT"] {
        fake.with_history(symbol, utc(2024, 1, 1), utc(2024, 1, 13));
    }
    fake.kline_calls.lock().unwrap().clear();
    let report = run_pipeline_at(&config, &fake, &store, &NoProgress, utc(2024, 1, 13)).unwrap();

    assert_eq!(report.incremental, 3);
    assert_eq!(report.download.records_downloaded, 9);
    assert_eq!(report.download.records_stored, 9);

    let first_call = fake.kline_calls.lock().unwrap()[0].clone();
    assert_eq!(first_call, ("AAAUSDT".to_string(), utc(2024, 1, 11).timestamp_millis()));

    let dates = log_dates(&store, "AAAUSDT");
    assert_eq!(dates.len(), 13);
    assert_unique_and_sorted(&dates);
}

#[test]
fn one_failing_symbol_does_not_stop_the_others() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let mut fake = three_symbol_exchange();
    fake.failing_klines.insert("BBBUSDT".into());
    let store = JsonlStore::new(&config.paths.symbols_dir);

    let report = run_pipeline_at(&config, &fake, &store, &NoProgress, utc(2024, 1, 10)).unwrap();
    assert_eq!(report.download.errors.len(), 1);
    assert!(report.download.errors[0].starts_with("Symbol BBBUSDT: "));
    assert_eq!(report.download.symbols_updated, 2);

    assert_eq!(log_dates(&store, "AAAUSDT").len(), 10);
    assert_eq!(log_dates(&store, "CCCUSDT").len(), 10);
    assert!(!store.exists("BBBUSDT"));
}

#[test]
fn corrupt_tail_triggers_full_download_without_duplicates() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let mut fake = three_symbol_exchange();
    fake.with_history("AAAUSDT", utc(2024, 1, 1), utc(2024, 1, 5));
    let store = JsonlStore::new(&config.paths.symbols_dir);

    run_pipeline_at(&config, &fake, &store, &NoProgress, utc(2024, 1, 5)).unwrap();
    assert_eq!(log_dates(&store, "AAAUSDT").len(), 5);
    fake.with_history("AAAUSDT", utc(2024, 1, 1), utc(2024, 1, 10));
    let path = store.log_path("AAAUSDT").unwrap();
    let mut raw = fs::read_to_string(&path).unwrap();
    raw.push_str("{\"symbol\":\"AAAUSDT\",\"timest");
    fs::write(&path, raw).unwrap();

    let gaps = detect_gaps(&["AAAUSDT".to_string()], &store);
    assert!(gaps["AAAUSDT"].requires_full_download);
    assert!(gaps["AAAUSDT"].file_exists);

    let report = download_and_merge(
        &["AAAUSDT".to_string()],
        &gaps,
        &fake,
        &store,
        &config,
        utc(2024, 1, 10),
        &NoProgress,
    );
    assert!(report.errors.is_empty());
    assert_eq!(report.records_stored, 5);

    let dates = log_dates(&store, "AAAUSDT");
    assert_eq!(dates.len(), 10);
    assert_unique_and_sorted(&dates);
}

#[test]
fn missing_gap_entry_is_reported_per_symbol() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let fake = three_symbol_exchange();
    let store = JsonlStore::new(&config.paths.symbols_dir);

    let mut gaps = detect_gaps(&["AAAUSDT".to_string()], &store);
    gaps.insert("CCCUSDT".into(), GapInfo::missing());
    let report = download_and_merge(
        &["AAAUSDT".to_string(), "BBBUSDT".to_string(), "CCCUSDT".to_string()],
        &gaps,
        &fake,
        &store,
        &config,
        utc(2024, 1, 10),
        &NoProgress,
    );
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("BBBUSDT"));
    assert_eq!(report.symbols_updated, 2);
}

//! CryptoVault CLI — pipeline runs and stored log inspection.
//!
//! Commands:
//! - `run` — symbol acquisition, gap detection, download & merge
//! - `status` — per-symbol log overview
//! - `history` — most recent candles of one symbol as JSON lines
//! - `symbols` — symbol universe from the last run's metadata snapshot

mod logging;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cryptovault_core::exchange::BinanceClient;
use cryptovault_core::metadata::load_snapshot;
use cryptovault_core::pipeline::{run_pipeline, LogProgress, PipelineReport};
use cryptovault_core::store::{JsonlStore, SymbolLogStore};
use cryptovault_core::PipelineConfig;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "cryptovault",
    about = "CryptoVault CLI — incremental daily candle history for top exchange symbols"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline against the exchange.
    Run {
        /// Path to a TOML config file. Defaults to built-in settings.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of symbols to keep after volume ranking.
        #[arg(long)]
        top_n: Option<usize>,

        /// Data directory (symbol logs and metadata live underneath).
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Log filter, e.g. `debug` or `cryptovault_core=trace`. Overrides RUST_LOG.
        #[arg(long)]
        log_level: Option<String>,
    },
    /// Report record counts, date ranges and sizes of stored logs.
    Status {
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Print the most recent candles of one symbol as JSON lines.
    History {
        /// Symbol, e.g. BTCUSDT.
        symbol: String,

        /// Number of candles to print.
        #[arg(long, default_value_t = 50)]
        limit: usize,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// List the symbol universe from the last run, highest volume first.
    Symbols {
        /// Only show the first N symbols.
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            top_n,
            data_dir,
            log_level,
        } => {
            let mut config = load_config(config.as_deref(), data_dir)?;
            if let Some(n) = top_n {
                config.top_n_symbols = n;
            }
            config.validate()?;
            run_cmd(&config, log_level.as_deref())
        }
        Commands::Status { config, data_dir } => {
            logging::init_console_logging();
            run_status(&load_config(config.as_deref(), data_dir)?)
        }
        Commands::History {
            symbol,
            limit,
            config,
            data_dir,
        } => {
            logging::init_console_logging();
            run_history(&load_config(config.as_deref(), data_dir)?, &symbol, limit)
        }
        Commands::Symbols {
            limit,
            config,
            data_dir,
        } => {
            logging::init_console_logging();
            run_symbols(&load_config(config.as_deref(), data_dir)?, limit)
        }
    }
}

fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> Result<PipelineConfig> {
    let mut config = match path {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = data_dir {
        config.paths = config.paths.with_data_dir(dir);
    }
    Ok(config)
}

fn run_cmd(config: &PipelineConfig, log_level: Option<&str>) -> Result<()> {
    let log_path = logging::init_run_logging(log_level, &config.paths.logs_dir)?;
    info!(log_file = %log_path.display(), "CryptoVault pipeline starting");

    let client = BinanceClient::from_config(config)?;
    let store = JsonlStore::new(&config.paths.symbols_dir);
    let report = run_pipeline(config, &client, &store, &LogProgress)?;

    print_summary(&report);
    Ok(())
}

fn run_status(config: &PipelineConfig) -> Result<()> {
    let store = JsonlStore::new(&config.paths.symbols_dir);
    let symbols = store.symbols()?;
    if symbols.is_empty() {
        println!("No symbol logs in {}", store.dir().display());
        return Ok(());
    }

    let mut total_size = 0u64;
    let mut total_records = 0usize;
    let mut rows = Vec::with_capacity(symbols.len());
    for symbol in &symbols {
        let summary = store.summary(symbol)?;
        total_size += summary.size_bytes;
        total_records += summary.records;
        rows.push(summary);
    }

    println!("Logs: {}", store.dir().display());
    println!("Symbols: {}", rows.len());
    println!("Records: {total_records}");
    println!("Total size: {}", format_size(total_size));
    println!();
    println!(
        "{:<14} {:>8} {:<25} {:>10}  {}",
        "Symbol", "Records", "Date Range", "Size", "BLAKE3"
    );
    println!("{}", "-".repeat(80));
    for row in &rows {
        let range = match (row.first_date, row.last_date) {
            (Some(first), Some(last)) => format!("{first} to {last}"),
            _ => "(empty)".to_string(),
        };
        println!(
            "{:<14} {:>8} {:<25} {:>10}  {}",
            row.symbol,
            row.records,
            range,
            format_size(row.size_bytes),
            &row.content_hash[..16]
        );
    }

    Ok(())
}

fn run_history(config: &PipelineConfig, symbol: &str, limit: usize) -> Result<()> {
    let store = JsonlStore::new(&config.paths.symbols_dir);
    let symbol = symbol.to_uppercase();
    if !store.exists(&symbol) {
        bail!("no data for symbol {symbol} in {}", store.dir().display());
    }
    for candle in store.tail(&symbol, limit)? {
        println!("{}", candle.to_line()?);
    }
    Ok(())
}

fn run_symbols(config: &PipelineConfig, limit: Option<usize>) -> Result<()> {
    let path = &config.paths.metadata_file;
    let mut metadata = load_snapshot(path)
        .with_context(|| format!("no symbol snapshot at {}; run the pipeline first", path.display()))?;
    metadata
        .symbols
        .sort_by(|a, b| b.quote_volume_24h.total_cmp(&a.quote_volume_24h));

    println!(
        "Snapshot: {} ({} kept, {} excluded)",
        metadata.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        metadata.kept,
        metadata.excluded
    );
    println!();
    println!(
        "{:>4} {:<14} {:<8} {:>16} {:>20}",
        "#", "Symbol", "Quote", "Last Price", "24h Quote Volume"
    );
    println!("{}", "-".repeat(66));
    let shown = limit.unwrap_or(metadata.symbols.len());
    for (i, s) in metadata.symbols.iter().take(shown).enumerate() {
        println!(
            "{:>4} {:<14} {:<8} {:>16} {:>20.2}",
            i + 1,
            s.symbol,
            s.quote_asset,
            s.last_price,
            s.quote_volume_24h
        );
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn print_summary(report: &PipelineReport) {
    let download = &report.download;
    println!();
    println!("=== Pipeline Summary ===");
    println!("Symbols:          {} ({} excluded)", report.symbols, report.excluded);
    println!(
        "Gap verdicts:     {} full, {} incremental",
        report.full_downloads, report.incremental
    );
    println!("Updated:          {}", download.symbols_updated);
    println!("Up to date:       {}", download.symbols_up_to_date);
    println!("Failed:           {}", download.symbols_failed());
    println!("Records fetched:  {}", download.records_downloaded);
    println!("Records stored:   {}", download.records_stored);
    println!("Elapsed:          {:.1}s", report.elapsed.as_secs_f64());
    for err in &download.errors {
        println!("WARNING: {err}");
    }
    println!();
}

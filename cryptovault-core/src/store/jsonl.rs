//! Newline-delimited JSON log files.
//!
//! Layout: `{dir}/{SYMBOL}.jsonl`, one candle per line.
//!
//! - New logs are written to `.tmp` and renamed into place.
//! - Appends go through `O_APPEND` and never rewrite existing bytes.
//! - Tail reads seek from the end instead of scanning the whole file.
//! - Readers skip blank lines; unparsable lines are skipped with a warning.

use super::{parse_tail, StoreError, SymbolLogStore, TailRecord};
use crate::domain::Candle;
use chrono::NaiveDate;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

const TAIL_CHUNK: u64 = 8 * 1024;

/// Flat-file symbol log store.
#[derive(Debug, Clone)]
pub struct JsonlStore {
    dir: PathBuf,
}

impl JsonlStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{dir}/{SYMBOL}.jsonl`
    pub fn log_path(&self, symbol: &str) -> Result<PathBuf, StoreError> {
        let valid = !symbol.is_empty()
            && symbol
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidSymbol(symbol.to_string()));
        }
        Ok(self.dir.join(format!("{symbol}.jsonl")))
    }

    /// Last `n` parsable records, oldest first.
    pub fn tail(&self, symbol: &str, n: usize) -> Result<Vec<Candle>, StoreError> {
        let path = self.existing_path(symbol)?;
        let lines = read_tail_lines(&path, n).map_err(|e| io_err(symbol, e))?;
        Ok(parse_lines(symbol, lines.iter().map(String::as_str)))
    }

    /// Symbols that have a log in this store, sorted.
    pub fn symbols(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err("*", e)),
        };

        let mut symbols = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_err("*", e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                symbols.push(stem.to_string());
            }
        }
        symbols.sort();
        Ok(symbols)
    }

    /// Record count, date range, size and content hash of one log.
    pub fn summary(&self, symbol: &str) -> Result<LogSummary, StoreError> {
        let path = self.existing_path(symbol)?;
        let bytes = fs::read(&path).map_err(|e| io_err(symbol, e))?;
        let text = String::from_utf8_lossy(&bytes);
        let records = parse_lines(symbol, text.lines());

        Ok(LogSummary {
            symbol: symbol.to_string(),
            records: records.len(),
            first_date: records.first().map(|c| c.date),
            last_date: records.last().map(|c| c.date),
            size_bytes: bytes.len() as u64,
            content_hash: blake3::hash(&bytes).to_hex().to_string(),
        })
    }

    fn existing_path(&self, symbol: &str) -> Result<PathBuf, StoreError> {
        let path = self.log_path(symbol)?;
        if !path.exists() {
            return Err(StoreError::NotFound {
                symbol: symbol.to_string(),
            });
        }
        Ok(path)
    }

    fn ensure_dir(&self, symbol: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| io_err(symbol, e))
    }
}

impl SymbolLogStore for JsonlStore {
    fn exists(&self, symbol: &str) -> bool {
        self.log_path(symbol).map(|p| p.is_file()).unwrap_or(false)
    }

    fn read_last_record(&self, symbol: &str) -> Result<TailRecord, StoreError> {
        let path = self.log_path(symbol)?;
        if !path.exists() {
            return Ok(TailRecord::Missing);
        }
        let lines = read_tail_lines(&path, 1).map_err(|e| io_err(symbol, e))?;
        Ok(parse_tail(lines.last().map(String::as_str)))
    }

    fn read_all(&self, symbol: &str) -> Result<Vec<Candle>, StoreError> {
        let path = self.existing_path(symbol)?;
        let file = File::open(&path).map_err(|e| io_err(symbol, e))?;
        let mut lines = Vec::new();
        for line in BufReader::new(file).lines() {
            lines.push(line.map_err(|e| io_err(symbol, e))?);
        }
        Ok(parse_lines(symbol, lines.iter().map(String::as_str)))
    }

    fn append(&self, symbol: &str, records: &[Candle]) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }
        let path = self.log_path(symbol)?;
        self.ensure_dir(symbol)?;

        let mut payload = String::new();
        if needs_leading_newline(&path).map_err(|e| io_err(symbol, e))? {
            payload.push('\n');
        }
        encode_into(&mut payload, records)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_err(symbol, e))?;
        file.write_all(payload.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| io_err(symbol, e))?;
        Ok(records.len())
    }

    fn create(&self, symbol: &str, records: &[Candle]) -> Result<usize, StoreError> {
        let path = self.log_path(symbol)?;
        self.ensure_dir(symbol)?;

        let mut payload = String::new();
        encode_into(&mut payload, records)?;

        let tmp_path = path.with_extension("jsonl.tmp");
        fs::write(&tmp_path, payload.as_bytes()).map_err(|e| io_err(symbol, e))?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            io_err(symbol, e)
        })?;
        Ok(records.len())
    }
}

/// Overview of one stored log.
#[derive(Debug, Clone, Serialize)]
pub struct LogSummary {
    pub symbol: String,
    pub records: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub size_bytes: u64,
    /// BLAKE3 of the raw file bytes.
    pub content_hash: String,
}

fn io_err(symbol: &str, source: io::Error) -> StoreError {
    StoreError::Io {
        symbol: symbol.to_string(),
        source,
    }
}

fn encode_into(buf: &mut String, records: &[Candle]) -> Result<(), StoreError> {
    for record in records {
        buf.push_str(&record.to_line()?);
        buf.push('\n');
    }
    Ok(())
}

fn parse_lines<'a>(symbol: &str, lines: impl Iterator<Item = &'a str>) -> Vec<Candle> {
    let mut out = Vec::new();
    for (i, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match Candle::from_line(line) {
            Ok(candle) => out.push(candle),
            Err(e) => warn!(symbol, line = i + 1, error = %e, "skipping unparsable log line"),
        }
    }
    out
}

/// True when the file has content that does not end in a newline.
fn needs_leading_newline(path: &Path) -> io::Result<bool> {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Last `n` non-blank lines of a file, oldest first, reading backwards in chunks.
fn read_tail_lines(path: &Path, n: usize) -> io::Result<Vec<String>> {
    if n == 0 {
        return Ok(Vec::new());
    }
    let mut file = File::open(path)?;
    let mut pos = file.metadata()?.len();
    let mut buf: Vec<u8> = Vec::new();

    loop {
        let step = TAIL_CHUNK.min(pos);
        pos -= step;
        file.seek(SeekFrom::Start(pos))?;
        let mut chunk = vec![0u8; step as usize];
        file.read_exact(&mut chunk)?;
        chunk.extend_from_slice(&buf);
        buf = chunk;

        let text = String::from_utf8_lossy(&buf);
        let mut segments = text.split('\n');
        if pos > 0 {
            // The first segment may start mid-line.
            segments.next();
        }
        let complete: Vec<&str> = segments.filter(|l| !l.trim().is_empty()).collect();

        if complete.len() >= n || pos == 0 {
            let skip = complete.len().saturating_sub(n);
            return Ok(complete[skip..].iter().map(|l| l.to_string()).collect());
        }
    }
}

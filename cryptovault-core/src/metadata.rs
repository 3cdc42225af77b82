//! Symbol universe snapshot on disk.
//!
//! One pretty-printed JSON file, replaced atomically on every run.

use crate::domain::SymbolMetadata;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("metadata JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn io_err(path: &Path, source: std::io::Error) -> MetadataError {
    MetadataError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Write the snapshot, creating the parent directory if needed.
pub fn save_snapshot(path: &Path, metadata: &SymbolMetadata) -> Result<(), MetadataError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }

    let json = serde_json::to_string_pretty(metadata)?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, json).map_err(|e| io_err(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        io_err(path, e)
    })
}

pub fn load_snapshot(path: &Path) -> Result<SymbolMetadata, MetadataError> {
    let content = fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    Ok(serde_json::from_str(&content)?)
}

//! JSON archive of digest runs.
//!
//! When an archive directory is configured, every successful digest run is
//! written next to its siblings from the same day:
//! ```text
//! archive_dir/
//! └── 2025-05-06/
//!     ├── 073000.json
//!     └── 190012.json
//! ```
//!
//! The archive is a convenience for later inspection; callers log write
//! failures and carry on.

use crate::feeds::SourceFailure;
use crate::models::Buckets;
use crate::summarizer::{Route, SectionKey};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{error, info, instrument};

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive I/O failed at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize archive: {0}")]
    Json(#[from] serde_json::Error),
}

/// What one digest run produced.
#[derive(Debug, Serialize)]
pub struct RunArchive<'a> {
    pub generated_at: String,
    pub route: Route,
    pub degraded: &'a [SectionKey],
    pub failures: &'a [SourceFailure],
    pub buckets: &'a Buckets,
    pub digest: &'a str,
}

/// Write `record` to `{dir}/{YYYY-MM-DD}/{HHMMSS}.json`.
///
/// # Arguments
///
/// * `record` - The run to serialize
/// * `dir` - Base archive directory
/// * `now` - Timestamp that determines the file location
///
/// # Returns
///
/// The path of the written file.
#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub async fn write_archive(record: &RunArchive<'_>, dir: &Path, now: DateTime<Local>) -> Result<PathBuf, ArchiveError> {
    let json = serde_json::to_string_pretty(record)?;

    let day_dir = dir.join(now.format("%Y-%m-%d").to_string());
    if let Err(e) = fs::create_dir_all(&day_dir).await {
        error!(dir = %day_dir.display(), error = %e, "Failed to create archive dir");
        return Err(ArchiveError::Io {
            path: day_dir.display().to_string(),
            source: e,
        });
    }

    let path = day_dir.join(format!("{}.json", now.format("%H%M%S")));
    fs::write(&path, json).await.map_err(|source| ArchiveError::Io {
        path: path.display().to_string(),
        source,
    })?;
    info!(path = %path.display(), "Wrote run archive");
    Ok(path)
}

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use super::metadata::{FileMetadata, MetadataReader};
use crate::db::MediaKind;
use crate::error::ExtractError;
use crate::pool::{PoolError, WorkerPool};

/// Size and modified time of a file, as seen by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size_bytes: i64,
    /// Milliseconds since the Unix epoch.
    pub modified_time: i64,
}

impl FileStat {
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let modified_time = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Ok(Self {
            size_bytes: meta.len() as i64,
            modified_time,
        })
    }
}

/// Runs stat and metadata reads off the caller's thread and stops waiting
/// once the timeout passes. An abandoned read keeps its worker until it
/// returns on its own.
pub struct MetadataExtractor {
    pool: WorkerPool,
    reader: Arc<dyn MetadataReader>,
}

impl MetadataExtractor {
    pub fn new(workers: usize, reader: Arc<dyn MetadataReader>) -> Result<Self> {
        Ok(Self {
            pool: WorkerPool::new("extract", workers)?,
            reader,
        })
    }

    pub fn stat(&self, path: &Path, timeout: Duration) -> Result<FileStat, ExtractError> {
        let owned = path.to_path_buf();
        self.pool
            .run_with_timeout(timeout, move || FileStat::of(&owned))
            .map_err(pool_error)?
            .map_err(ExtractError::from)
    }

    pub fn extract(
        &self,
        path: &Path,
        kind: MediaKind,
        timeout: Duration,
    ) -> Result<FileMetadata, ExtractError> {
        let reader = Arc::clone(&self.reader);
        let owned: PathBuf = path.to_path_buf();
        self.pool
            .run_with_timeout(timeout, move || reader.read(&owned, kind))
            .map_err(pool_error)?
    }
}

fn pool_error(err: PoolError) -> ExtractError {
    match err {
        PoolError::TimedOut => ExtractError::Timeout,
        PoolError::Panicked => ExtractError::Decode("extraction worker panicked".to_string()),
    }
}

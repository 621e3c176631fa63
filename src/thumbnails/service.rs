use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{Bitmap, MemoryCache, PersistentCache};
use crate::config::ThumbnailConfig;
use crate::db::Database;
use crate::deadline::Deadline;
use crate::decoder::DecodeBackend;
use crate::pool::WorkerPool;
use crate::scanner::FileStat;

/// Heights thumbnails are generated and cached at.
pub const SIZE_CLASSES: [u32; 7] = [32, 64, 128, 256, 512, 1024, 2048];

/// Source modified times closer than this count as unchanged.
const MTIME_TOLERANCE_MS: i64 = 1;

/// Smallest size class that is at least `height`, clamped to the largest.
pub fn size_class(height: u32) -> u32 {
    SIZE_CLASSES
        .iter()
        .copied()
        .find(|&class| class >= height)
        .unwrap_or(SIZE_CLASSES[SIZE_CLASSES.len() - 1])
}

/// Absolute canonical form of `path`, used for every read of the source.
/// Works for paths that no longer exist so that deleted files can still be
/// invalidated.
pub fn canonical_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| resolve_missing(path))
}

/// Cache key for an already canonical path, case-folded where the
/// filesystem is usually case-insensitive. Never used to open files.
pub fn cache_key(canonical: &Path) -> String {
    let key = canonical.to_string_lossy().to_string();
    if cfg!(any(target_os = "windows", target_os = "macos")) {
        key.to_lowercase()
    } else {
        key
    }
}

/// Cache key for `path`.
pub fn normalize_path(path: &Path) -> String {
    cache_key(&canonical_path(path))
}

fn resolve_missing(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|p| p.join(name))
            .unwrap_or(absolute),
        _ => absolute,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub placeholders: u64,
}

#[derive(Default)]
struct Counters {
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
    placeholders: AtomicU64,
}

/// Two-tier thumbnail cache in front of a decoder.
///
/// Constructed and owned by the caller; share it behind an `Arc`. Lookups
/// go L1, then L2 (when a store is attached), then a decode on the
/// service's worker pool bounded by the request's timeout. `get` never
/// fails: anything that goes wrong yields a placeholder.
pub struct ThumbnailService {
    config: ThumbnailConfig,
    memory: MemoryCache,
    persistent: Option<PersistentCache>,
    decoder: Arc<dyn DecodeBackend>,
    pool: WorkerPool,
    counters: Counters,
}

impl ThumbnailService {
    pub fn new(
        config: ThumbnailConfig,
        decoder: Arc<dyn DecodeBackend>,
        store: Option<Arc<Database>>,
    ) -> Result<Self> {
        let pool = WorkerPool::new("thumb", config.decode_workers)?;
        Ok(Self {
            memory: MemoryCache::new(config.memory_capacity),
            persistent: store.map(|db| PersistentCache::new(db, config.jpeg_quality)),
            decoder,
            pool,
            counters: Counters::default(),
            config,
        })
    }

    pub fn config(&self) -> &ThumbnailConfig {
        &self.config
    }

    /// Thumbnail of `path` at the size class covering `target_height`.
    pub fn get(&self, path: &Path, target_height: u32, timeout: Duration) -> Bitmap {
        let deadline = Deadline::after(timeout);
        let class = size_class(target_height);
        let source = canonical_path(path);
        let key = cache_key(&source);

        let mtime = match FileStat::of(&source) {
            Ok(stat) => stat.modified_time,
            Err(_) => {
                tracing::debug!("Thumbnail source {:?} is gone", path);
                return self.placeholder(class);
            }
        };

        if let Some(bitmap) = self.memory.get(&key, class, mtime, MTIME_TOLERANCE_MS) {
            self.counters.l1_hits.fetch_add(1, Ordering::Relaxed);
            return bitmap;
        }

        if let Some(persistent) = &self.persistent {
            match persistent.get(&key, class, mtime, MTIME_TOLERANCE_MS) {
                Ok(Some(bitmap)) => {
                    self.counters.l2_hits.fetch_add(1, Ordering::Relaxed);
                    self.memory.insert(&key, class, bitmap.clone(), mtime);
                    return bitmap;
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Persistent thumbnail lookup failed for {}: {}", key, e),
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let Some(bitmap) = self.decode(source, class, deadline) else {
            return self.placeholder(class);
        };

        self.memory.insert(&key, class, bitmap.clone(), mtime);
        if let Some(persistent) = &self.persistent {
            if let Err(e) = persistent.put(&key, class, mtime, &bitmap) {
                tracing::warn!("Failed to persist thumbnail for {}: {}", key, e);
            }
        }
        bitmap
    }

    /// [`Self::get`] with the configured decode timeout.
    pub fn get_thumbnail(&self, path: &str, height: u32) -> Bitmap {
        self.get(Path::new(path), height, self.config.decode_timeout())
    }

    fn decode(&self, source: PathBuf, class: u32, deadline: Deadline) -> Option<Bitmap> {
        let decoder = Arc::clone(&self.decoder);
        let job_path = source.clone();
        match self.pool.run_with_timeout(deadline.remaining(), move || {
            decoder.decode(&job_path, class, &deadline)
        }) {
            Ok(Some(image)) => Some(Bitmap::from(image)),
            Ok(None) => {
                tracing::debug!("No decoder produced a thumbnail for {:?}", source);
                None
            }
            Err(e) => {
                tracing::debug!("Thumbnail decode for {:?} abandoned: {}", source, e);
                None
            }
        }
    }

    fn placeholder(&self, class: u32) -> Bitmap {
        self.counters.placeholders.fetch_add(1, Ordering::Relaxed);
        Bitmap::placeholder(class)
    }

    /// Forget every cached size of `path` in both tiers.
    pub fn invalidate(&self, path: &Path) {
        let key = normalize_path(path);
        let removed = self.memory.remove_path(&key);
        if let Some(persistent) = &self.persistent {
            if let Err(e) = persistent.remove(&key) {
                tracing::warn!("Failed to invalidate persisted thumbnails for {}: {}", key, e);
            }
        }
        tracing::debug!("Invalidated {} ({} in memory)", key, removed);
    }

    /// Drop persisted thumbnails not accessed within `max_age_days`.
    pub fn purge_stale(&self, max_age_days: u32) -> Result<usize> {
        match &self.persistent {
            Some(persistent) => persistent.purge_older_than(max_age_days),
            None => Ok(0),
        }
    }

    /// Empty L1 and purge all of L2.
    pub fn clear_all(&self) -> Result<()> {
        self.memory.clear();
        if let Some(persistent) = &self.persistent {
            let removed = persistent.clear()?;
            tracing::info!("Cleared {} persisted thumbnails", removed);
        }
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            l1_hits: self.counters.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.counters.l2_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            placeholders: self.counters.placeholders.load(Ordering::Relaxed),
        }
    }

    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }
}

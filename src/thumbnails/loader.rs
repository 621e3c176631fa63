use anyhow::Result;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use super::{Bitmap, ThumbnailService};
use crate::cancel::CancelToken;
use crate::pool::WorkerPool;

/// Smallest height a preview phase decodes at.
const MIN_PREVIEW_HEIGHT: u32 = 32;

#[derive(Debug, Clone)]
pub enum ThumbnailEvent {
    /// Fast low-resolution first pass for a grid cell.
    Preview { cell: usize, bitmap: Bitmap },
    /// Final thumbnail at the requested height.
    Full { cell: usize, bitmap: Bitmap },
}

/// Loads grid thumbnails in the background, emitting a preview and then the
/// full-size bitmap for every requested cell.
pub struct ThumbnailLoader {
    service: Arc<ThumbnailService>,
    pool: WorkerPool,
    tx: Sender<ThumbnailEvent>,
    preview_timeout: Duration,
    full_timeout: Duration,
}

impl ThumbnailLoader {
    pub fn new(
        service: Arc<ThumbnailService>,
        workers: usize,
    ) -> Result<(Self, Receiver<ThumbnailEvent>)> {
        let (tx, rx) = mpsc::channel();
        let preview_timeout = service.config().preview_timeout();
        let full_timeout = service.config().decode_timeout();
        let loader = Self {
            service,
            pool: WorkerPool::new("grid", workers)?,
            tx,
            preview_timeout,
            full_timeout,
        };
        Ok((loader, rx))
    }

    pub fn preview_height(height: u32) -> u32 {
        (height / 4).max(MIN_PREVIEW_HEIGHT)
    }

    /// Queue both phases for `cell`. Returns `false` without dispatching
    /// anything when `cancel` is already set; the full phase is also skipped
    /// if cancellation arrives after the preview.
    pub fn request(&self, cell: usize, path: PathBuf, height: u32, cancel: &CancelToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }

        let service = Arc::clone(&self.service);
        let tx = self.tx.clone();
        let cancel = cancel.clone();
        let preview_timeout = self.preview_timeout;
        let full_timeout = self.full_timeout;

        self.pool.spawn(move || {
            let bitmap = service.get(&path, Self::preview_height(height), preview_timeout);
            if tx.send(ThumbnailEvent::Preview { cell, bitmap }).is_err() {
                return;
            }
            if cancel.is_cancelled() {
                tracing::trace!("Skipping full thumbnail for cell {}", cell);
                return;
            }
            let bitmap = service.get(&path, height, full_timeout);
            let _ = tx.send(ThumbnailEvent::Full { cell, bitmap });
        });
        true
    }
}

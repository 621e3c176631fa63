//! Thumbnail service: L1 memory LRU, L2 persistent cache, then the decoder.

pub mod loader;
pub mod memory;
pub mod persistent;
pub mod service;

use image::{DynamicImage, Rgba, RgbaImage};
use std::sync::Arc;

pub use loader::{ThumbnailEvent, ThumbnailLoader};
pub use memory::MemoryCache;
pub use persistent::PersistentCache;
pub use service::{
    cache_key, canonical_path, normalize_path, size_class, CacheStats, ThumbnailService,
    SIZE_CLASSES,
};

const PLACEHOLDER_GRAY: Rgba<u8> = Rgba([128, 128, 128, 255]);

/// Decoded pixels handed to callers. Cloning shares the buffer.
#[derive(Debug, Clone)]
pub struct Bitmap {
    image: Arc<RgbaImage>,
    placeholder: bool,
}

impl Bitmap {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
            placeholder: false,
        }
    }

    /// Neutral gray square returned when no thumbnail could be produced.
    /// Callers pass a size class so the side stays bounded.
    pub fn placeholder(height: u32) -> Self {
        let side = height.max(1);
        Self {
            image: Arc::new(RgbaImage::from_pixel(side, side, PLACEHOLDER_GRAY)),
            placeholder: true,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn shares_buffer_with(&self, other: &Bitmap) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

impl From<DynamicImage> for Bitmap {
    fn from(image: DynamicImage) -> Self {
        Self::new(image.into_rgba8())
    }
}

use anyhow::Result;
use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use std::sync::Arc;

use super::Bitmap;
use crate::db::{CachedThumbnail, Database};

const SECS_PER_DAY: i64 = 86_400;

/// Thumbnails stored in the `thumb_cache` table. Shared by every process
/// that opens the same store. Opaque bitmaps are stored as JPEG, anything
/// with transparency as PNG so a hit matches the decoded pixels.
pub struct PersistentCache {
    db: Arc<Database>,
    jpeg_quality: u8,
}

impl PersistentCache {
    pub fn new(db: Arc<Database>, jpeg_quality: u8) -> Self {
        Self {
            db,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    /// Cached bitmap for `(path, size_class)` if it was made from a file
    /// with the same modified time. Refreshes `last_access` on a hit.
    pub fn get(
        &self,
        path: &str,
        size_class: u32,
        current_mtime: i64,
        tolerance_ms: i64,
    ) -> Result<Option<Bitmap>> {
        let Some(record) = self.db.get_cached_thumbnail(path, size_class)? else {
            return Ok(None);
        };
        if (record.source_mtime - current_mtime).abs() > tolerance_ms {
            return Ok(None);
        }

        let image = image::load_from_memory(&record.encoded_bytes)?;

        if let Err(e) = self
            .db
            .touch_cached_thumbnail(path, size_class, Utc::now().timestamp())
        {
            tracing::debug!("Failed to refresh access time for {}: {}", path, e);
        }
        Ok(Some(Bitmap::from(image)))
    }

    pub fn put(
        &self,
        path: &str,
        size_class: u32,
        source_mtime: i64,
        bitmap: &Bitmap,
    ) -> Result<()> {
        let encoded_bytes = self.encode(bitmap)?;
        self.db.put_cached_thumbnail(&CachedThumbnail {
            path: path.to_string(),
            size_class,
            source_mtime,
            encoded_bytes,
            last_access: Utc::now().timestamp(),
        })
    }

    fn encode(&self, bitmap: &Bitmap) -> Result<Vec<u8>> {
        let image = bitmap.image();
        let mut buf = Vec::new();
        if image.pixels().any(|p| p.0[3] < u8::MAX) {
            PngEncoder::new(&mut buf).write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgba8,
            )?;
        } else {
            let rgb = DynamicImage::ImageRgba8(image.clone()).into_rgb8();
            JpegEncoder::new_with_quality(&mut buf, self.jpeg_quality).encode_image(&rgb)?;
        }
        Ok(buf)
    }

    pub fn remove(&self, path: &str) -> Result<usize> {
        self.db.delete_cached_thumbnails(path)
    }

    /// Drop rows not accessed within `max_age_days`. Zero drops everything.
    pub fn purge_older_than(&self, max_age_days: u32) -> Result<usize> {
        if max_age_days == 0 {
            return self.clear();
        }
        let cutoff = Utc::now().timestamp() - i64::from(max_age_days) * SECS_PER_DAY;
        self.db.purge_cached_thumbnails_before(cutoff)
    }

    pub fn clear(&self) -> Result<usize> {
        self.db.purge_all_cached_thumbnails()
    }
}

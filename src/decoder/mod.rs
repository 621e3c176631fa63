//! Decoder adapter.
//!
//! Two interchangeable backends sit behind [`DecodeBackend`]: a fast
//! [`NativeDecoder`] for the common web/camera formats and a slower
//! [`CompatDecoder`] that copes with TIFF variants, animated containers,
//! unusual color modes and camera RAW files with embedded previews. The
//! [`DecoderAdapter`] picks one per file and falls back transparently, so
//! callers never learn which backend served them.

mod compat;
mod native;

use image::DynamicImage;
use std::path::Path;

pub use compat::CompatDecoder;
pub use native::NativeDecoder;

use crate::deadline::Deadline;

/// "Decode the file at `path` to pixels no taller than `target_height`,
/// within `deadline`." `None` means the backend could not (or ran out of
/// time).
pub trait DecodeBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn decode(&self, path: &Path, target_height: u32, deadline: &Deadline) -> Option<DynamicImage>;
}

/// Families the native backend handles unreliably (compression variants,
/// layered documents, RAW containers). These never touch it.
const COMPAT_ONLY_EXTENSIONS: &[&str] = &[
    "tif", "tiff", "psd", "psb", "xcf", "cr2", "cr3", "nef", "arw", "dng", "orf", "rw2", "raf",
    "raw",
];

pub struct DecoderAdapter {
    native: Box<dyn DecodeBackend>,
    compat: Box<dyn DecodeBackend>,
}

impl DecoderAdapter {
    pub fn new() -> Self {
        Self::with_backends(Box::new(NativeDecoder), Box::new(CompatDecoder))
    }

    pub fn with_backends(native: Box<dyn DecodeBackend>, compat: Box<dyn DecodeBackend>) -> Self {
        Self { native, compat }
    }

    pub fn routes_to_compat(path: &Path) -> bool {
        path.extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .is_some_and(|ext| COMPAT_ONLY_EXTENSIONS.contains(&ext.as_str()))
    }
}

impl Default for DecoderAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeBackend for DecoderAdapter {
    fn name(&self) -> &'static str {
        "adapter"
    }

    fn decode(&self, path: &Path, target_height: u32, deadline: &Deadline) -> Option<DynamicImage> {
        if Self::routes_to_compat(path) {
            return self.compat.decode(path, target_height, deadline);
        }

        if let Some(image) = self.native.decode(path, target_height, deadline) {
            return Some(image);
        }

        if deadline.expired() {
            tracing::debug!("Deadline expired decoding {:?}", path);
            return None;
        }

        tracing::debug!(
            "{} decoder failed for {:?}, trying {}",
            self.native.name(),
            path,
            self.compat.name()
        );
        self.compat.decode(path, target_height, deadline)
    }
}

/// Width and height for an aspect-preserving downscale to `target_height`,
/// or `None` when the image is already small enough (never upscale).
pub(crate) fn scaled_dimensions(width: u32, height: u32, target_height: u32) -> Option<(u32, u32)> {
    if height == 0 || height <= target_height {
        return None;
    }
    let scaled_width = (u64::from(width) * u64::from(target_height) / u64::from(height)).max(1);
    Some((scaled_width as u32, target_height.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{write_jpeg, write_png};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::tempdir;

    struct Counting {
        calls: Arc<AtomicUsize>,
        succeed: bool,
    }

    impl DecodeBackend for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn decode(&self, _: &Path, target_height: u32, _: &Deadline) -> Option<DynamicImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.succeed
                .then(|| DynamicImage::new_rgb8(target_height, target_height))
        }
    }

    fn counting_adapter(native_ok: bool) -> (DecoderAdapter, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let native_calls = Arc::new(AtomicUsize::new(0));
        let compat_calls = Arc::new(AtomicUsize::new(0));
        let adapter = DecoderAdapter::with_backends(
            Box::new(Counting {
                calls: native_calls.clone(),
                succeed: native_ok,
            }),
            Box::new(Counting {
                calls: compat_calls.clone(),
                succeed: true,
            }),
        );
        (adapter, native_calls, compat_calls)
    }

    #[test]
    fn test_compat_only_families_skip_native() {
        let (adapter, native, compat) = counting_adapter(true);
        let deadline = Deadline::after(Duration::from_secs(5));

        assert!(adapter.decode(Path::new("/x/scan.TIFF"), 64, &deadline).is_some());
        assert!(adapter.decode(Path::new("/x/raw.nef"), 64, &deadline).is_some());
        assert_eq!(native.load(Ordering::SeqCst), 0);
        assert_eq!(compat.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_native_first_then_fallback() {
        let (adapter, native, compat) = counting_adapter(true);
        let deadline = Deadline::after(Duration::from_secs(5));
        assert!(adapter.decode(Path::new("/x/a.jpg"), 64, &deadline).is_some());
        assert_eq!(native.load(Ordering::SeqCst), 1);
        assert_eq!(compat.load(Ordering::SeqCst), 0);

        let (adapter, native, compat) = counting_adapter(false);
        assert!(adapter.decode(Path::new("/x/a.jpg"), 64, &deadline).is_some());
        assert_eq!(native.load(Ordering::SeqCst), 1);
        assert_eq!(compat.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_real_backends_scale_to_target() {
        let dir = tempdir().unwrap();
        let jpeg = dir.path().join("wide.jpg");
        let png = dir.path().join("tall.png");
        write_jpeg(&jpeg, 400, 200);
        write_png(&png, 100, 300);

        let adapter = DecoderAdapter::new();
        let deadline = Deadline::after(Duration::from_secs(10));

        let decoded = adapter.decode(&jpeg, 100, &deadline).unwrap();
        assert_eq!(decoded.height(), 100);
        assert_eq!(decoded.width(), 200);

        let decoded = adapter.decode(&png, 150, &deadline).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (50, 150));
    }

    #[test]
    fn test_mislabelled_file_falls_back_transparently() {
        let dir = tempdir().unwrap();
        let tiff = dir.path().join("scan.tif");
        image::RgbImage::from_pixel(60, 40, image::Rgb([10, 200, 30]))
            .save(&tiff)
            .unwrap();
        let mislabelled = dir.path().join("scan.jpg");
        std::fs::rename(&tiff, &mislabelled).unwrap();

        let decoded = DecoderAdapter::new()
            .decode(&mislabelled, 20, &Deadline::after(Duration::from_secs(10)))
            .unwrap();
        assert_eq!(decoded.height(), 20);
    }

    #[test]
    fn test_garbage_and_missing_files_yield_none() {
        let dir = tempdir().unwrap();
        let garbage = dir.path().join("broken.jpg");
        std::fs::write(&garbage, b"definitely not an image").unwrap();
        let deadline = Deadline::after(Duration::from_secs(5));

        let adapter = DecoderAdapter::new();
        assert!(adapter.decode(&garbage, 64, &deadline).is_none());
        assert!(adapter.decode(&dir.path().join("gone.png"), 64, &deadline).is_none());
    }

    #[test]
    fn test_scaled_dimensions() {
        assert_eq!(scaled_dimensions(400, 200, 100), Some((200, 100)));
        assert_eq!(scaled_dimensions(10, 1000, 100), Some((1, 100)));
        assert_eq!(scaled_dimensions(400, 200, 200), None);
        assert_eq!(scaled_dimensions(400, 0, 200), None);
    }
}

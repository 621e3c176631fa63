use image::codecs::gif::GifDecoder;
use image::imageops::FilterType;
use image::{AnimationDecoder, DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;

use super::{scaled_dimensions, DecodeBackend};
use crate::deadline::Deadline;

/// Upper bound on embedded JPEG candidates probed per container.
const MAX_EMBEDDED_CANDIDATES: usize = 16;

const JPEG_SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Slow path that accepts almost anything.
///
/// Reads the whole file, decodes by content rather than extension, takes
/// the first frame of animated containers, and for containers the `image`
/// crate cannot parse (camera RAW, layered documents) falls back to the
/// largest JPEG preview embedded in the file.
pub struct CompatDecoder;

impl DecodeBackend for CompatDecoder {
    fn name(&self) -> &'static str {
        "compat"
    }

    fn decode(&self, path: &Path, target_height: u32, deadline: &Deadline) -> Option<DynamicImage> {
        let bytes = std::fs::read(path).ok()?;
        if deadline.expired() {
            return None;
        }

        let image = match decode_container(&bytes) {
            Some(image) => image,
            None => {
                tracing::debug!("No direct decode for {:?}, probing embedded previews", path);
                largest_embedded_jpeg(&bytes, deadline)?
            }
        };
        if deadline.expired() {
            return None;
        }

        let image = normalize_color(image);
        if deadline.expired() {
            return None;
        }

        Some(match scaled_dimensions(image.width(), image.height(), target_height) {
            Some((width, height)) => image.resize_exact(width, height, FilterType::Triangle),
            None => image,
        })
    }
}

fn decode_container(bytes: &[u8]) -> Option<DynamicImage> {
    let format = image::guess_format(bytes).ok()?;
    match format {
        ImageFormat::Gif => first_gif_frame(bytes),
        _ => image::load_from_memory_with_format(bytes, format).ok(),
    }
}

fn first_gif_frame(bytes: &[u8]) -> Option<DynamicImage> {
    let decoder = GifDecoder::new(Cursor::new(bytes)).ok()?;
    let frame = decoder.into_frames().next()?.ok()?;
    Some(DynamicImage::ImageRgba8(frame.into_buffer()))
}

/// Collapse palette, grayscale, 16-bit and float layouts onto 8-bit RGB or
/// RGBA so every backend hands out the same pixel shapes.
fn normalize_color(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image,
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Offsets of every JPEG start-of-image marker in `bytes`.
fn jpeg_offsets(bytes: &[u8]) -> Vec<usize> {
    bytes
        .windows(JPEG_SOI.len())
        .enumerate()
        .filter(|(_, window)| *window == JPEG_SOI)
        .map(|(offset, _)| offset)
        .take(MAX_EMBEDDED_CANDIDATES)
        .collect()
}

fn largest_embedded_jpeg(bytes: &[u8], deadline: &Deadline) -> Option<DynamicImage> {
    let mut best: Option<(u64, usize)> = None;

    for offset in jpeg_offsets(bytes) {
        if deadline.expired() {
            return None;
        }
        let reader = ImageReader::with_format(Cursor::new(&bytes[offset..]), ImageFormat::Jpeg);
        let Ok((width, height)) = reader.into_dimensions() else {
            continue;
        };
        let area = u64::from(width) * u64::from(height);
        if best.map_or(true, |(best_area, _)| area > best_area) {
            best = Some((area, offset));
        }
    }

    let (_, offset) = best?;
    image::load_from_memory_with_format(&bytes[offset..], ImageFormat::Jpeg).ok()
}

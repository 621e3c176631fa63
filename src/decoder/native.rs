use image::{DynamicImage, ImageFormat, ImageReader};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::{scaled_dimensions, DecodeBackend};
use crate::deadline::Deadline;

const NATIVE_FORMATS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::WebP,
    ImageFormat::Bmp,
];

/// Fast path for mainstream formats.
///
/// JPEGs carrying an EXIF preview at least as tall as the target are served
/// from that preview without touching the main image data.
pub struct NativeDecoder;

impl DecodeBackend for NativeDecoder {
    fn name(&self) -> &'static str {
        "native"
    }

    fn decode(&self, path: &Path, target_height: u32, deadline: &Deadline) -> Option<DynamicImage> {
        let reader = ImageReader::open(path).ok()?.with_guessed_format().ok()?;
        let format = reader.format()?;
        if !NATIVE_FORMATS.contains(&format) {
            return None;
        }

        if format == ImageFormat::Jpeg {
            if let Some(preview) = embedded_preview(path, target_height) {
                return Some(downscale(preview, target_height));
            }
        }

        if deadline.expired() {
            return None;
        }
        let image = reader.decode().ok()?;

        if deadline.expired() {
            return None;
        }
        Some(downscale(image, target_height))
    }
}

fn downscale(image: DynamicImage, target_height: u32) -> DynamicImage {
    match scaled_dimensions(image.width(), image.height(), target_height) {
        Some((width, height)) => image.thumbnail(width, height),
        None => image,
    }
}

/// The JPEG thumbnail stored in IFD1 of the EXIF block, if it is tall
/// enough to serve `target_height`.
fn embedded_preview(path: &Path, target_height: u32) -> Option<DynamicImage> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;

    let offset = exif
        .get_field(exif::Tag::JPEGInterchangeFormat, exif::In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;
    let length = exif
        .get_field(exif::Tag::JPEGInterchangeFormatLength, exif::In::THUMBNAIL)?
        .value
        .get_uint(0)? as usize;

    let bytes = exif.buf().get(offset..offset.checked_add(length)?)?;
    let preview = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg).ok()?;

    (preview.height() >= target_height).then_some(preview)
}

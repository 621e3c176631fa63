use chrono::NaiveDateTime;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::db::MediaKind;
use crate::error::ExtractError;

/// What a successful extraction knows about a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// `YYYY-MM-DD HH:MM:SS`.
    pub capture_time: Option<String>,
}

/// Reads dimensions and capture time from one file. Implementations may
/// block for as long as the underlying decoder does; callers bound them
/// through [`super::MetadataExtractor`].
pub trait MetadataReader: Send + Sync {
    fn read(&self, path: &Path, kind: MediaKind) -> Result<FileMetadata, ExtractError>;
}

/// Header-only dimensions plus the EXIF capture timestamp.
pub struct ExifMetadataReader;

/// Containers `image` cannot size but `kamadak-exif` can read.
const EXIF_ONLY_EXTENSIONS: [&str; 2] = ["heic", "heif"];

const CAPTURE_TAGS: [exif::Tag; 3] = [
    exif::Tag::DateTimeOriginal,
    exif::Tag::DateTimeDigitized,
    exif::Tag::DateTime,
];

impl MetadataReader for ExifMetadataReader {
    fn read(&self, path: &Path, kind: MediaKind) -> Result<FileMetadata, ExtractError> {
        if kind == MediaKind::Video {
            // No container parser; the file is indexed without dimensions.
            std::fs::metadata(path)?;
            return Ok(FileMetadata::default());
        }

        if is_exif_only(path) {
            std::fs::metadata(path)?;
            return Ok(FileMetadata {
                capture_time: read_capture_time(path),
                ..FileMetadata::default()
            });
        }

        let (width, height) = image::ImageReader::open(path)?
            .with_guessed_format()?
            .into_dimensions()?;

        Ok(FileMetadata {
            width: Some(width),
            height: Some(height),
            capture_time: read_capture_time(path),
        })
    }
}

fn is_exif_only(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| EXIF_ONLY_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

fn read_capture_time(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut bufreader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut bufreader).ok()?;

    CAPTURE_TAGS.iter().find_map(|tag| {
        let field = exif.get_field(*tag, exif::In::PRIMARY)?;
        match field.value {
            exif::Value::Ascii(ref parts) => parts
                .first()
                .and_then(|raw| normalize_capture_time(&String::from_utf8_lossy(raw))),
            _ => None,
        }
    })
}

/// Canonicalize an EXIF-style (`2023:07:14 09:30:00`) or ISO-style
/// timestamp to `YYYY-MM-DD HH:MM:SS`.
pub fn normalize_capture_time(raw: &str) -> Option<String> {
    let raw = raw.trim().trim_end_matches('\0');
    ["%Y:%m:%d %H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

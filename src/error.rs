//! Error taxonomy.
//!
//! Per-file and per-request failures ([`ExtractError`]) are absorbed by the
//! scanner and the thumbnail service and turned into data: null fields,
//! failure counters, placeholder bitmaps. Only [`MediaError`] variants that
//! describe systemic problems ever reach a caller, wrapped in
//! `anyhow::Error` so they can be recovered with `downcast_ref`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("scan root does not exist or is not a directory: {0}")]
    RootMissing(PathBuf),

    #[error("unknown project id {0}")]
    UnknownProject(i64),

    #[error("folder {0} still has child folders or files")]
    FolderNotEmpty(i64),

    #[error("{path} is outside the project root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },
}

impl MediaError {
    /// Wrap a lower-level store failure so callers can tell it apart from
    /// per-item problems.
    pub fn store(err: impl std::fmt::Display) -> Self {
        MediaError::StoreUnavailable(err.to_string())
    }
}

/// Outcome of a failed stat or metadata extraction for a single file.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("file vanished before it could be read")]
    NotFound,

    #[error("extraction exceeded its deadline")]
    Timeout,

    #[error("{0}")]
    Decode(String),
}

impl From<std::io::Error> for ExtractError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            ExtractError::NotFound
        } else {
            ExtractError::Decode(err.to_string())
        }
    }
}

impl From<image::ImageError> for ExtractError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(io) => io.into(),
            other => ExtractError::Decode(other.to_string()),
        }
    }
}

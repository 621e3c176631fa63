use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub thumbnails: ThumbnailConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,

    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,

    /// Directory names that are pruned from the walk wherever they appear.
    #[serde(default = "default_ignore_folders")]
    pub ignore_folders: Vec<String>,

    /// Rows buffered before a write to the store.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Stat/extraction worker threads (capped at 8).
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Per-file metadata extraction deadline.
    #[serde(default = "default_file_timeout_ms")]
    pub file_timeout_ms: u64,

    /// Deadline used when backfilling records that timed out during a scan.
    #[serde(default = "default_backfill_timeout_ms")]
    pub backfill_timeout_ms: u64,

    /// Failed extractions allowed before a file is marked exhausted.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl ScannerConfig {
    pub fn file_timeout(&self) -> Duration {
        Duration::from_millis(self.file_timeout_ms)
    }

    pub fn backfill_timeout(&self) -> Duration {
        Duration::from_millis(self.backfill_timeout_ms)
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            image_extensions: default_image_extensions(),
            video_extensions: default_video_extensions(),
            ignore_folders: default_ignore_folders(),
            batch_size: default_batch_size(),
            workers: default_workers(),
            file_timeout_ms: default_file_timeout_ms(),
            backfill_timeout_ms: default_backfill_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    /// L1 capacity in entries.
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,

    #[serde(default = "default_thumb_height")]
    pub default_height: u32,

    #[serde(default = "default_decode_timeout_ms")]
    pub decode_timeout_ms: u64,

    /// Deadline for the low-resolution first phase of a grid request.
    #[serde(default = "default_preview_timeout_ms")]
    pub preview_timeout_ms: u64,

    #[serde(default = "default_workers")]
    pub decode_workers: usize,

    /// JPEG quality for bitmaps stored in the persistent cache.
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Age after which maintenance purges persistent cache rows.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,
}

impl ThumbnailConfig {
    pub fn decode_timeout(&self) -> Duration {
        Duration::from_millis(self.decode_timeout_ms)
    }

    pub fn preview_timeout(&self) -> Duration {
        Duration::from_millis(self.preview_timeout_ms)
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            memory_capacity: default_memory_capacity(),
            default_height: default_thumb_height(),
            decode_timeout_ms: default_decode_timeout_ms(),
            preview_timeout_ms: default_preview_timeout_ms(),
            decode_workers: default_workers(),
            jpeg_quality: default_jpeg_quality(),
            max_age_days: default_max_age_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Roots rescanned on every daemon pass.
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mediadex")
        .join("mediadex.db")
}

fn default_image_extensions() -> Vec<String> {
    [
        "jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff", "heic", "heif", "psd", "cr2",
        "cr3", "nef", "arw", "dng", "orf", "rw2", "raf",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_video_extensions() -> Vec<String> {
    ["mp4", "mov", "m4v", "avi", "mkv", "mts", "3gp", "webm"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_ignore_folders() -> Vec<String> {
    ["@eaDir", ".thumbnails", ".Trash", "$RECYCLE.BIN", "node_modules", ".git"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_batch_size() -> usize {
    200
}

fn default_workers() -> usize {
    4
}

fn default_file_timeout_ms() -> u64 {
    5_000
}

fn default_backfill_timeout_ms() -> u64 {
    20_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_memory_capacity() -> usize {
    500
}

fn default_thumb_height() -> u32 {
    200
}

fn default_decode_timeout_ms() -> u64 {
    3_000
}

fn default_preview_timeout_ms() -> u64 {
    8_000
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_max_age_days() -> u32 {
    30
}

fn default_poll_interval_secs() -> u64 {
    900
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            scanner: ScannerConfig::default(),
            thumbnails: ThumbnailConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }
}

impl Config {
    /// Load from the default location, honouring `MEDIADEX_CONFIG`.
    /// A missing file is created with defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {:?}", path))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {:?}", path))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.database.path
    }

    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("MEDIADEX_CONFIG") {
            return PathBuf::from(path);
        }

        Self::config_dir().join("config.toml")
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mediadex")
    }
}

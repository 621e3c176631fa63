//! Scan engine: walk a root, detect changes, extract metadata under a
//! per-file deadline and persist rows in batches.

pub mod discovery;
pub mod extract;
pub mod metadata;

use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::config::ScannerConfig;
use crate::db::{Database, KnownFile, NewMediaFile, ProcessingStatus, Project};
use crate::deadline::Deadline;
use crate::error::{ExtractError, MediaError};
use crate::folders::FolderIndex;

pub use discovery::{discover_media, DiscoveredFile, Discovery, MediaFilter};
pub use extract::{FileStat, MetadataExtractor};
pub use metadata::{ExifMetadataReader, FileMetadata, MetadataReader};

/// Files processed between two progress reports at most.
const PROGRESS_EVERY_FILES: usize = 10;

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub root: PathBuf,
    /// Scan into this project; `None` gets or creates the project for `root`.
    pub project_id: Option<i64>,
    /// Skip files whose modified time matches the stored record.
    pub incremental: bool,
    /// Directory names pruned in addition to the configured ones.
    pub ignore: HashSet<String>,
}

impl ScanRequest {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            project_id: None,
            incremental: true,
            ignore: HashSet::new(),
        }
    }

    pub fn full(mut self) -> Self {
        self.incremental = false;
        self
    }

    pub fn in_project(mut self, project_id: i64) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn ignoring(mut self, name: impl Into<String>) -> Self {
        self.ignore.insert(name.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub project_id: i64,
    pub folders_found: usize,
    /// Rows written as `success` or `pending`.
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub files_failed: usize,
    /// Subset of `files_indexed` whose extraction timed out.
    pub files_pending: usize,
    /// Files that disappeared between discovery and stat.
    pub files_missing: usize,
    pub interrupted: bool,
}

impl ScanSummary {
    pub fn files_written(&self) -> usize {
        self.files_indexed + self.files_failed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub attempted: usize,
    pub completed: usize,
    pub failed: usize,
    pub still_pending: usize,
    pub interrupted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanProgress {
    pub percent: u8,
    pub message: String,
}

/// Receives throttled progress reports from a scan.
pub trait ProgressSink {
    fn report(&mut self, percent: u8, message: &str);
}

impl<F: FnMut(u8, &str)> ProgressSink for F {
    fn report(&mut self, percent: u8, message: &str) {
        self(percent, message)
    }
}

impl ProgressSink for mpsc::Sender<ScanProgress> {
    fn report(&mut self, percent: u8, message: &str) {
        // A dropped receiver just means nobody is watching.
        let _ = self.send(ScanProgress {
            percent,
            message: message.to_string(),
        });
    }
}

/// Notified after a scan that wrote records, so folder and date views can
/// be rebuilt.
pub trait ScanListener: Send + Sync {
    fn on_scan_complete(&self, project_id: i64, summary: &ScanSummary);
}

struct Throttle {
    total: usize,
    last_step: usize,
}

impl Throttle {
    fn new(total: usize) -> Self {
        Self { total, last_step: 0 }
    }

    fn percent(&self, done: usize) -> u8 {
        if self.total == 0 {
            100
        } else {
            (done * 100 / self.total).min(100) as u8
        }
    }

    /// Percent to report after `done` files, if a report is due.
    fn tick(&mut self, done: usize) -> Option<u8> {
        let percent = self.percent(done);
        let step = usize::from(percent) / 10;
        if done % PROGRESS_EVERY_FILES == 0 || step > self.last_step {
            self.last_step = step;
            Some(percent)
        } else {
            None
        }
    }
}

pub struct Scanner {
    config: ScannerConfig,
    filter: MediaFilter,
    extractor: MetadataExtractor,
    listeners: Vec<Arc<dyn ScanListener>>,
}

impl Scanner {
    pub fn new(config: ScannerConfig, reader: Arc<dyn MetadataReader>) -> Result<Self> {
        let filter = MediaFilter::new(&config.image_extensions, &config.video_extensions);
        let extractor = MetadataExtractor::new(config.workers, reader)?;
        Ok(Self {
            config,
            filter,
            extractor,
            listeners: Vec::new(),
        })
    }

    /// Scanner backed by [`ExifMetadataReader`].
    pub fn with_exif(config: ScannerConfig) -> Result<Self> {
        Self::new(config, Arc::new(ExifMetadataReader))
    }

    pub fn with_listener(mut self, listener: Arc<dyn ScanListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    fn resolve_project(
        &self,
        db: &Database,
        request: &ScanRequest,
        root: &Path,
    ) -> Result<Project> {
        match request.project_id {
            Some(id) => Ok(db
                .get_project(id)
                .map_err(MediaError::store)?
                .ok_or(MediaError::UnknownProject(id))?),
            None => Ok(db.get_or_create_project(root).map_err(MediaError::store)?),
        }
    }

    /// Scan `request.root` into the store.
    ///
    /// Per-file problems become data (`failed` or `pending` rows); only a
    /// missing root, an unknown project or an unusable store abort the
    /// scan. On cancellation the rows gathered so far are flushed and the
    /// summary comes back with `interrupted` set.
    pub fn scan(
        &self,
        db: &Database,
        request: &ScanRequest,
        progress: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ScanSummary> {
        if !request.root.is_dir() {
            return Err(MediaError::RootMissing(request.root.clone()).into());
        }
        let root = request
            .root
            .canonicalize()
            .with_context(|| format!("Failed to resolve {:?}", request.root))?;

        let project = self.resolve_project(db, request, &root)?;
        tracing::info!(
            "Scanning {:?} into project {} ({})",
            root,
            project.id,
            if request.incremental { "incremental" } else { "full" }
        );

        let ignore: HashSet<String> = self
            .config
            .ignore_folders
            .iter()
            .chain(request.ignore.iter())
            .cloned()
            .collect();
        let discovery = discover_media(&root, &self.filter, &ignore);
        let total = discovery.files.len();
        progress.report(0, &format!("Found {} media files", total));

        let known = if request.incremental {
            db.known_modified_times(project.id).map_err(MediaError::store)?
        } else {
            Default::default()
        };

        let mut summary = ScanSummary {
            project_id: project.id,
            folders_found: discovery.folders_found,
            ..Default::default()
        };
        let mut folders = FolderIndex::new(db, project.id, &root);
        let mut batch: Vec<NewMediaFile> = Vec::with_capacity(self.config.batch_size);
        let mut throttle = Throttle::new(total);
        let timeout = self.config.file_timeout();

        for (index, file) in discovery.files.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!("Scan of {:?} cancelled after {} of {} files", root, index, total);
                summary.interrupted = true;
                break;
            }

            let row = self.process_file(file, &known, &mut folders, &mut summary, timeout)?;
            if let Some(row) = row {
                batch.push(row);
                if batch.len() >= self.config.batch_size {
                    self.flush(db, project.id, &mut batch)?;
                }
            }

            if let Some(percent) = throttle.tick(index + 1) {
                progress.report(percent, &format!("Scanned {} of {}", index + 1, total));
            }
        }

        self.flush(db, project.id, &mut batch)?;
        tracing::debug!("{} folders ensured under {:?}", folders.ensured_count(), root);

        if summary.interrupted {
            let done = summary.files_written() + summary.files_skipped + summary.files_missing;
            progress.report(throttle.percent(done), "Scan cancelled");
        } else {
            progress.report(100, "Scan complete");
        }
        tracing::info!(
            "Scan of {:?} finished: {} indexed, {} skipped, {} failed, {} pending",
            root,
            summary.files_indexed,
            summary.files_skipped,
            summary.files_failed,
            summary.files_pending
        );

        if summary.files_written() > 0 {
            for listener in &self.listeners {
                listener.on_scan_complete(project.id, &summary);
            }
        }

        Ok(summary)
    }

    /// Stat, change-check and extract one file. `None` means no row is
    /// written (unchanged or vanished).
    fn process_file(
        &self,
        file: &DiscoveredFile,
        known: &HashMap<String, KnownFile>,
        folders: &mut FolderIndex<'_>,
        summary: &mut ScanSummary,
        timeout: Duration,
    ) -> Result<Option<NewMediaFile>> {
        let path_str = file.path.to_string_lossy().to_string();

        let deadline = Deadline::after(timeout);
        let (stat, stat_status) = match self.extractor.stat(&file.path, deadline.remaining()) {
            Ok(stat) => (stat, None),
            Err(ExtractError::NotFound) => {
                tracing::debug!("{:?} vanished before stat", file.path);
                summary.files_missing += 1;
                return Ok(None);
            }
            Err(ExtractError::Timeout) => (unknown_stat(), Some(ProcessingStatus::Pending)),
            Err(ExtractError::Decode(reason)) => {
                if known.get(&path_str).map(|k| k.status) == Some(ProcessingStatus::Exhausted) {
                    tracing::debug!("Still cannot stat {:?}, retries exhausted", file.path);
                    summary.files_skipped += 1;
                    return Ok(None);
                }
                tracing::warn!("Failed to stat {:?}: {}", file.path, reason);
                (unknown_stat(), Some(ProcessingStatus::Failed))
            }
        };

        let unchanged = known
            .get(&path_str)
            .is_some_and(|k| k.modified_time == stat.modified_time);
        if stat_status.is_none() && unchanged {
            summary.files_skipped += 1;
            return Ok(None);
        }

        let dir = file.path.parent().unwrap_or(&file.path);
        let folder_id = folders.ensure(dir).map_err(MediaError::store)?;

        let (metadata, status) = match stat_status {
            Some(status) => (FileMetadata::default(), status),
            None => match self.extract_within(file, &deadline) {
                Ok(metadata) => (metadata, ProcessingStatus::Success),
                Err(ExtractError::Timeout) => {
                    tracing::debug!("{:?} used up its {:?} budget", file.path, timeout);
                    (FileMetadata::default(), ProcessingStatus::Pending)
                }
                Err(ExtractError::NotFound) => {
                    summary.files_missing += 1;
                    return Ok(None);
                }
                Err(ExtractError::Decode(reason)) => {
                    tracing::warn!("Failed to read {:?}: {}", file.path, reason);
                    (FileMetadata::default(), ProcessingStatus::Failed)
                }
            },
        };

        match status {
            ProcessingStatus::Success => summary.files_indexed += 1,
            ProcessingStatus::Pending => {
                summary.files_indexed += 1;
                summary.files_pending += 1;
            }
            ProcessingStatus::Failed | ProcessingStatus::Exhausted => summary.files_failed += 1,
        }

        Ok(Some(NewMediaFile {
            folder_id,
            path: path_str,
            kind: file.kind,
            size_bytes: stat.size_bytes,
            modified_time: stat.modified_time,
            width: metadata.width,
            height: metadata.height,
            capture_time: metadata.capture_time,
            status,
        }))
    }

    /// Extraction gets whatever the stat left of the file's budget.
    fn extract_within(
        &self,
        file: &DiscoveredFile,
        deadline: &Deadline,
    ) -> Result<FileMetadata, ExtractError> {
        if deadline.expired() {
            return Err(ExtractError::Timeout);
        }
        self.extractor
            .extract(&file.path, file.kind, deadline.remaining())
    }

    fn flush(&self, db: &Database, project_id: i64, batch: &mut Vec<NewMediaFile>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let written = db
            .upsert_media_files(project_id, batch, self.config.max_retries)
            .map_err(MediaError::store)?;
        tracing::debug!("Flushed {} rows for project {}", written, project_id);
        batch.clear();
        Ok(())
    }

    /// Retry extraction for rows a scan left `pending`, with the longer
    /// backfill deadline. Oldest rows go first.
    pub fn backfill_pending(
        &self,
        db: &Database,
        project_id: i64,
        limit: usize,
        cancel: &CancelToken,
    ) -> Result<BackfillSummary> {
        let pending = db
            .pending_media_files(project_id, limit)
            .map_err(MediaError::store)?;
        let timeout = self.config.backfill_timeout();
        let mut summary = BackfillSummary::default();

        for file in pending {
            if cancel.is_cancelled() {
                summary.interrupted = true;
                break;
            }
            summary.attempted += 1;

            let path = PathBuf::from(&file.path);
            let (metadata, status) = match self.extractor.extract(&path, file.kind, timeout) {
                Ok(metadata) => (metadata, ProcessingStatus::Success),
                Err(ExtractError::Timeout) => (FileMetadata::default(), ProcessingStatus::Pending),
                Err(e) => {
                    tracing::warn!("Backfill of {:?} failed: {}", path, e);
                    (FileMetadata::default(), ProcessingStatus::Failed)
                }
            };

            match status {
                ProcessingStatus::Success => summary.completed += 1,
                ProcessingStatus::Pending => summary.still_pending += 1,
                _ => summary.failed += 1,
            }

            db.update_media_metadata(
                file.id,
                metadata.width,
                metadata.height,
                metadata.capture_time.as_deref(),
                status,
                self.config.max_retries,
            )
            .map_err(MediaError::store)?;
        }

        tracing::info!(
            "Backfill for project {}: {} completed, {} failed, {} still pending",
            project_id,
            summary.completed,
            summary.failed,
            summary.still_pending
        );
        Ok(summary)
    }
}

/// Stand-in for a file whose stat did not complete. A zero modified time
/// never matches a real one, so the next scan looks at the file again.
fn unknown_stat() -> FileStat {
    FileStat {
        size_bytes: 0,
        modified_time: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MediaKind;
    use crate::test_support::{set_mtime, write_jpeg, write_jpeg_with_capture_time};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::{Instant, SystemTime};
    use tempfile::tempdir;

    fn store() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn config() -> ScannerConfig {
        ScannerConfig::default()
    }

    fn quiet() -> impl FnMut(u8, &str) {
        |_, _| {}
    }

    fn scan(scanner: &Scanner, db: &Database, request: &ScanRequest) -> ScanSummary {
        scanner
            .scan(db, request, &mut quiet(), &CancelToken::new())
            .unwrap()
    }

    /// Three good JPEGs and one corrupt one in a flat root.
    fn fixture_tree(root: &Path) {
        write_jpeg(&root.join("a.jpg"), 40, 30);
        write_jpeg(&root.join("b.jpg"), 30, 40);
        write_jpeg_with_capture_time(&root.join("c.jpg"), 16, 16, "2020:02:29 12:00:00");
        std::fs::write(root.join("broken.jpg"), b"\xFF\xD8 not a jpeg").unwrap();
    }

    struct Hanging;

    impl MetadataReader for Hanging {
        fn read(&self, _: &Path, _: MediaKind) -> Result<FileMetadata, ExtractError> {
            std::thread::sleep(Duration::from_secs(2));
            Ok(FileMetadata::default())
        }
    }

    /// Cancels `token` once `after` reads have happened.
    struct CancelAfter {
        reads: AtomicUsize,
        after: usize,
        token: CancelToken,
    }

    impl MetadataReader for CancelAfter {
        fn read(&self, _: &Path, _: MediaKind) -> Result<FileMetadata, ExtractError> {
            if self.reads.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
                self.token.cancel();
            }
            Ok(FileMetadata::default())
        }
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(i64, usize)>>,
    }

    impl ScanListener for Recorder {
        fn on_scan_complete(&self, project_id: i64, summary: &ScanSummary) {
            self.calls
                .lock()
                .unwrap()
                .push((project_id, summary.files_written()));
        }
    }

    #[test]
    fn test_fresh_scan() {
        let dir = tempdir().unwrap();
        fixture_tree(dir.path());
        let db = store();
        let scanner = Scanner::with_exif(config()).unwrap();

        let summary = scan(&scanner, &db, &ScanRequest::new(dir.path()));

        assert_eq!(summary.folders_found, 1);
        assert_eq!(summary.files_indexed, 3);
        assert_eq!(summary.files_failed, 1);
        assert_eq!(summary.files_skipped, 0);
        assert!(!summary.interrupted);

        let root = dir.path().canonicalize().unwrap();
        let c = db
            .get_media_file(summary.project_id, &root.join("c.jpg").to_string_lossy())
            .unwrap()
            .unwrap();
        assert_eq!(c.processing_status, ProcessingStatus::Success);
        assert_eq!(c.capture_time.as_deref(), Some("2020-02-29 12:00:00"));
        assert_eq!((c.width, c.height), (Some(16), Some(16)));

        let broken = db
            .get_media_file(summary.project_id, &root.join("broken.jpg").to_string_lossy())
            .unwrap()
            .unwrap();
        assert_eq!(broken.processing_status, ProcessingStatus::Failed);
        assert_eq!(broken.failure_count, 1);
        assert_eq!(broken.width, None);

        // Every file hangs off the root folder node.
        let root_node = db
            .get_folder_by_path(summary.project_id, &root.to_string_lossy())
            .unwrap()
            .unwrap();
        assert_eq!(root_node.parent_id, None);
        assert_eq!(db.media_files_in_folder(root_node.id).unwrap().len(), 4);
        assert_eq!(
            db.capture_date_counts(summary.project_id).unwrap(),
            vec![("2020-02-29".to_string(), 1)]
        );
    }

    #[test]
    fn test_incremental_rescan_is_idempotent() {
        let dir = tempdir().unwrap();
        fixture_tree(dir.path());
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        write_jpeg(&dir.path().join("nested/d.jpg"), 8, 8);
        let db = store();
        let scanner = Scanner::with_exif(config()).unwrap();
        let request = ScanRequest::new(dir.path());

        let first = scan(&scanner, &db, &request);
        let second = scan(&scanner, &db, &request);

        assert_eq!(first.project_id, second.project_id);
        assert_eq!(second.files_skipped, 4);
        assert_eq!(second.files_indexed, 0);
        // The failed file is retried, not skipped.
        assert_eq!(second.files_failed, 1);
        assert_eq!(db.count_media_files(first.project_id).unwrap(), 5);
        assert_eq!(db.count_folders(first.project_id).unwrap(), 2);
    }

    #[test]
    fn test_modified_file_is_rescanned_and_full_scan_ignores_mtimes() {
        let dir = tempdir().unwrap();
        write_jpeg(&dir.path().join("a.jpg"), 10, 10);
        write_jpeg(&dir.path().join("b.jpg"), 10, 10);
        let db = store();
        let scanner = Scanner::with_exif(config()).unwrap();

        scan(&scanner, &db, &ScanRequest::new(dir.path()));

        write_jpeg(&dir.path().join("a.jpg"), 20, 12);
        set_mtime(
            &dir.path().join("a.jpg"),
            SystemTime::now() + Duration::from_secs(60),
        );
        let summary = scan(&scanner, &db, &ScanRequest::new(dir.path()));
        assert_eq!((summary.files_indexed, summary.files_skipped), (1, 1));

        let root = dir.path().canonicalize().unwrap();
        let a = db
            .get_media_file(summary.project_id, &root.join("a.jpg").to_string_lossy())
            .unwrap()
            .unwrap();
        assert_eq!(a.width, Some(20));

        let full = scan(&scanner, &db, &ScanRequest::new(dir.path()).full());
        assert_eq!((full.files_indexed, full.files_skipped), (2, 0));
        assert_eq!(db.count_media_files(summary.project_id).unwrap(), 2);
    }

    #[test]
    fn test_cancellation_flushes_partial_batch() {
        let dir = tempdir().unwrap();
        for i in 0..200 {
            std::fs::write(dir.path().join(format!("img{:03}.jpg", i)), b"x").unwrap();
        }
        let db = store();
        let cancel = CancelToken::new();
        let reader = Arc::new(CancelAfter {
            reads: AtomicUsize::new(0),
            after: 50,
            token: cancel.clone(),
        });
        let scanner = Scanner::new(config(), reader).unwrap();

        let summary = scanner
            .scan(&db, &ScanRequest::new(dir.path()), &mut quiet(), &cancel)
            .unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.files_indexed, 50);
        assert_eq!(db.count_media_files(summary.project_id).unwrap(), 50);
    }

    #[test]
    fn test_hanging_reader_leaves_pending_rows_then_backfill() {
        let dir = tempdir().unwrap();
        write_jpeg(&dir.path().join("slow1.jpg"), 12, 6);
        write_jpeg(&dir.path().join("slow2.jpg"), 12, 6);
        let db = store();
        let mut cfg = config();
        cfg.file_timeout_ms = 100;
        let scanner = Scanner::new(cfg.clone(), Arc::new(Hanging)).unwrap();

        let started = Instant::now();
        let summary = scan(&scanner, &db, &ScanRequest::new(dir.path()));
        assert!(started.elapsed() < Duration::from_millis(1500));
        assert_eq!(summary.files_indexed, 2);
        assert_eq!(summary.files_pending, 2);
        assert_eq!(
            db.count_media_files_with_status(summary.project_id, ProcessingStatus::Pending)
                .unwrap(),
            2
        );

        let backfiller = Scanner::with_exif(cfg).unwrap();
        let backfill = backfiller
            .backfill_pending(&db, summary.project_id, 10, &CancelToken::new())
            .unwrap();
        assert_eq!(backfill.attempted, 2);
        assert_eq!(backfill.completed, 2);
        let files = db.media_files(summary.project_id).unwrap();
        assert!(files
            .iter()
            .all(|f| f.processing_status == ProcessingStatus::Success && f.width == Some(12)));
    }

    #[test]
    fn test_retry_ceiling_marks_file_exhausted() {
        let dir = tempdir().unwrap();
        let broken = dir.path().join("broken.jpg");
        std::fs::write(&broken, b"\xFF\xD8 junk").unwrap();
        let db = store();
        let mut cfg = config();
        cfg.max_retries = 2;
        let scanner = Scanner::with_exif(cfg).unwrap();
        let request = ScanRequest::new(dir.path());

        assert_eq!(scan(&scanner, &db, &request).files_failed, 1);
        assert_eq!(scan(&scanner, &db, &request).files_failed, 1);

        let third = scan(&scanner, &db, &request);
        assert_eq!((third.files_failed, third.files_skipped), (0, 1));

        let path = broken.canonicalize().unwrap();
        let record = db
            .get_media_file(third.project_id, &path.to_string_lossy())
            .unwrap()
            .unwrap();
        assert_eq!(record.processing_status, ProcessingStatus::Exhausted);
        assert_eq!(record.failure_count, 2);

        // A changed file gets a fresh attempt.
        set_mtime(&broken, SystemTime::now() + Duration::from_secs(120));
        assert_eq!(scan(&scanner, &db, &request).files_failed, 1);
    }

    #[test]
    fn test_spent_budget_skips_extraction() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        write_jpeg(&path, 8, 8);
        let reader = Arc::new(CancelAfter {
            reads: AtomicUsize::new(0),
            after: usize::MAX,
            token: CancelToken::new(),
        });
        let scanner = Scanner::new(config(), reader.clone()).unwrap();
        let file = DiscoveredFile {
            path,
            kind: MediaKind::Image,
        };

        let spent = Deadline::after(Duration::ZERO);
        assert_eq!(scanner.extract_within(&file, &spent), Err(ExtractError::Timeout));
        assert_eq!(reader.reads.load(Ordering::SeqCst), 0);

        let fresh = Deadline::after(Duration::from_secs(5));
        assert!(scanner.extract_within(&file, &fresh).is_ok());
        assert_eq!(reader.reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unstattable_file_stops_at_retry_ceiling() {
        let dir = tempdir().unwrap();
        write_jpeg(&dir.path().join("a.jpg"), 8, 8);
        let root = dir.path().canonicalize().unwrap();
        let db = store();
        let project = db.get_or_create_project(&root).unwrap().id;
        let scanner = Scanner::with_exif(config()).unwrap();
        let mut folders = FolderIndex::new(&db, project, &root);

        // Stat below a regular file fails with something other than NotFound.
        let file = DiscoveredFile {
            path: root.join("a.jpg").join("b.jpg"),
            kind: MediaKind::Image,
        };
        let timeout = Duration::from_secs(5);

        let mut summary = ScanSummary::default();
        let row = scanner
            .process_file(&file, &HashMap::new(), &mut folders, &mut summary, timeout)
            .unwrap()
            .unwrap();
        assert_eq!(row.status, ProcessingStatus::Failed);
        assert_eq!(summary.files_failed, 1);
        db.upsert_media_files(project, &[row], 1).unwrap();

        let known = db.known_modified_times(project).unwrap();
        let key = file.path.to_string_lossy().to_string();
        assert_eq!(known[&key].status, ProcessingStatus::Exhausted);

        let mut summary = ScanSummary::default();
        let again = scanner
            .process_file(&file, &known, &mut folders, &mut summary, timeout)
            .unwrap();
        assert!(again.is_none());
        assert_eq!((summary.files_failed, summary.files_skipped), (0, 1));
    }

    #[test]
    fn test_fatal_errors() {
        let db = store();
        let scanner = Scanner::with_exif(config()).unwrap();

        let err = scanner
            .scan(
                &db,
                &ScanRequest::new("/definitely/not/here"),
                &mut quiet(),
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MediaError>(),
            Some(MediaError::RootMissing(_))
        ));

        let dir = tempdir().unwrap();
        let err = scanner
            .scan(
                &db,
                &ScanRequest::new(dir.path()).in_project(999),
                &mut quiet(),
                &CancelToken::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MediaError>(),
            Some(MediaError::UnknownProject(999))
        ));
    }

    #[test]
    fn test_request_ignore_and_listener() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("skip-me")).unwrap();
        write_jpeg(&dir.path().join("skip-me/a.jpg"), 8, 8);
        write_jpeg(&dir.path().join("b.jpg"), 8, 8);
        let db = store();
        let recorder = Arc::new(Recorder::default());
        let scanner = Scanner::with_exif(config())
            .unwrap()
            .with_listener(recorder.clone());

        let summary = scan(&scanner, &db, &ScanRequest::new(dir.path()).ignoring("skip-me"));
        assert_eq!(summary.files_indexed, 1);
        assert_eq!(summary.folders_found, 1);

        // Nothing new: the listener is not called again.
        scan(&scanner, &db, &ScanRequest::new(dir.path()).ignoring("skip-me"));
        assert_eq!(*recorder.calls.lock().unwrap(), vec![(summary.project_id, 1)]);
    }

    #[test]
    fn test_progress_is_throttled_and_reaches_100() {
        let dir = tempdir().unwrap();
        for i in 0..25 {
            std::fs::write(dir.path().join(format!("f{:02}.mp4", i)), b"v").unwrap();
        }
        let db = store();
        let scanner = Scanner::with_exif(config()).unwrap();
        let (tx, rx) = mpsc::channel();
        let mut sink = tx;

        let summary = scanner
            .scan(&db, &ScanRequest::new(dir.path()), &mut sink, &CancelToken::new())
            .unwrap();
        drop(sink);
        assert_eq!(summary.files_indexed, 25);

        let reports: Vec<ScanProgress> = rx.iter().collect();
        assert!(reports.len() < 25);
        assert_eq!(reports.last().map(|r| r.percent), Some(100));
        assert!(reports.windows(2).all(|w| w[0].percent <= w[1].percent));
    }

    #[test]
    fn test_throttle_cadence() {
        let mut throttle = Throttle::new(1000);
        assert_eq!(throttle.tick(1), None);
        assert_eq!(throttle.tick(10), Some(1));
        assert_eq!(throttle.tick(11), None);

        let mut small = Throttle::new(5);
        assert_eq!(small.tick(1), Some(20));
        assert_eq!(small.tick(2), Some(40));
    }
}

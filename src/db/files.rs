use anyhow::Result;
use std::collections::HashMap;

use super::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

/// Extraction state of a media file record.
///
/// `Exhausted` is terminal for an unchanged file: it is reached when a
/// `Failed` record hits the retry ceiling and is only left again when the
/// file's modified time changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingStatus {
    Pending,
    Success,
    Failed,
    Exhausted,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Success => "success",
            ProcessingStatus::Failed => "failed",
            ProcessingStatus::Exhausted => "exhausted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProcessingStatus::Pending),
            "success" => Some(ProcessingStatus::Success),
            "failed" => Some(ProcessingStatus::Failed),
            "exhausted" => Some(ProcessingStatus::Exhausted),
            _ => None,
        }
    }
}

/// A stored media file record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub id: i64,
    pub project_id: i64,
    pub folder_id: i64,
    pub path: String,
    pub kind: MediaKind,
    pub size_bytes: i64,
    pub modified_time: i64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub capture_time: Option<String>,
    pub processing_status: ProcessingStatus,
    pub failure_count: u32,
    pub updated_at: String,
}

/// A row produced by a scan, written with [`Database::upsert_media_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMediaFile {
    pub folder_id: i64,
    pub path: String,
    pub kind: MediaKind,
    pub size_bytes: i64,
    pub modified_time: i64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub capture_time: Option<String>,
    pub status: ProcessingStatus,
}

const MEDIA_FILE_COLUMNS: &str = "id, project_id, folder_id, path, kind, size_bytes, \
     modified_time, width, height, capture_time, processing_status, failure_count, updated_at";

/// What a rescan needs to know about an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownFile {
    pub modified_time: i64,
    pub status: ProcessingStatus,
}

fn media_file_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MediaFile> {
    let kind: String = row.get(4)?;
    let status: String = row.get(10)?;
    Ok(MediaFile {
        id: row.get(0)?,
        project_id: row.get(1)?,
        folder_id: row.get(2)?,
        path: row.get(3)?,
        kind: MediaKind::parse(&kind).unwrap_or(MediaKind::Image),
        size_bytes: row.get(5)?,
        modified_time: row.get(6)?,
        width: row.get(7)?,
        height: row.get(8)?,
        capture_time: row.get(9)?,
        processing_status: ProcessingStatus::parse(&status).unwrap_or(ProcessingStatus::Pending),
        failure_count: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

/// Insert-or-update on `(project_id, path)`.
///
/// Right-hand sides of the update see the row as it was before the
/// statement, so `media_files.failure_count` is the previous count.
const UPSERT_MEDIA_FILE: &str = r#"
INSERT INTO media_files (
    project_id, folder_id, path, kind, size_bytes, modified_time,
    width, height, capture_time, processing_status, failure_count, updated_at
) VALUES (
    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9,
    CASE WHEN ?10 = 'failed' AND ?11 <= 1 THEN 'exhausted' ELSE ?10 END,
    CASE WHEN ?10 = 'failed' THEN 1 ELSE 0 END,
    CURRENT_TIMESTAMP
)
ON CONFLICT (project_id, path) DO UPDATE SET
    folder_id = excluded.folder_id,
    kind = excluded.kind,
    size_bytes = excluded.size_bytes,
    modified_time = excluded.modified_time,
    width = excluded.width,
    height = excluded.height,
    capture_time = excluded.capture_time,
    processing_status = CASE
        WHEN ?10 = 'failed' AND media_files.failure_count + 1 >= ?11 THEN 'exhausted'
        ELSE ?10
    END,
    failure_count = CASE WHEN ?10 = 'failed' THEN media_files.failure_count + 1 ELSE 0 END,
    updated_at = CURRENT_TIMESTAMP
"#;

impl Database {
    /// Every record an incremental scan may skip, keyed by path. Retriable
    /// `failed` records are left out so they get another attempt.
    pub fn known_modified_times(&self, project_id: i64) -> Result<HashMap<String, KnownFile>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT path, modified_time, processing_status FROM media_files
             WHERE project_id = ? AND processing_status != 'failed'",
        )?;
        let map = stmt
            .query_map([project_id], |row| {
                let status: String = row.get(2)?;
                Ok((
                    row.get::<_, String>(0)?,
                    KnownFile {
                        modified_time: row.get(1)?,
                        status: ProcessingStatus::parse(&status)
                            .unwrap_or(ProcessingStatus::Pending),
                    },
                ))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        Ok(map)
    }

    /// Write a batch in one transaction. Returns the number of rows written.
    ///
    /// `Failed` rows bump `failure_count` and become `Exhausted` once it
    /// reaches `max_retries`; any other status resets the count.
    pub fn upsert_media_files(
        &self,
        project_id: i64,
        rows: &[NewMediaFile],
        max_retries: u32,
    ) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_MEDIA_FILE)?;
            for row in rows {
                stmt.execute(rusqlite::params![
                    project_id,
                    row.folder_id,
                    row.path,
                    row.kind.as_str(),
                    row.size_bytes,
                    row.modified_time,
                    row.width,
                    row.height,
                    row.capture_time,
                    row.status.as_str(),
                    max_retries,
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    /// Record the outcome of a later extraction attempt on an existing row,
    /// with the same failure accounting as the upsert.
    pub fn update_media_metadata(
        &self,
        file_id: i64,
        width: Option<u32>,
        height: Option<u32>,
        capture_time: Option<&str>,
        status: ProcessingStatus,
        max_retries: u32,
    ) -> Result<()> {
        self.conn().execute(
            r#"
            UPDATE media_files SET
                width = COALESCE(?2, width),
                height = COALESCE(?3, height),
                capture_time = COALESCE(?4, capture_time),
                processing_status = CASE
                    WHEN ?5 = 'failed' AND failure_count + 1 >= ?6 THEN 'exhausted'
                    ELSE ?5
                END,
                failure_count = CASE WHEN ?5 = 'failed' THEN failure_count + 1 ELSE 0 END,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?1
            "#,
            rusqlite::params![file_id, width, height, capture_time, status.as_str(), max_retries],
        )?;
        Ok(())
    }

    pub fn get_media_file(&self, project_id: i64, path: &str) -> Result<Option<MediaFile>> {
        let sql = format!(
            "SELECT {} FROM media_files WHERE project_id = ? AND path = ?",
            MEDIA_FILE_COLUMNS
        );
        let result = self.conn().query_row(
            &sql,
            rusqlite::params![project_id, path],
            media_file_from_row,
        );
        match result {
            Ok(file) => Ok(Some(file)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn media_files(&self, project_id: i64) -> Result<Vec<MediaFile>> {
        let sql = format!(
            "SELECT {} FROM media_files WHERE project_id = ? ORDER BY path",
            MEDIA_FILE_COLUMNS
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let files = stmt
            .query_map([project_id], media_file_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    pub fn media_files_in_folder(&self, folder_id: i64) -> Result<Vec<MediaFile>> {
        let sql = format!(
            "SELECT {} FROM media_files WHERE folder_id = ? ORDER BY path",
            MEDIA_FILE_COLUMNS
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let files = stmt
            .query_map([folder_id], media_file_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    /// Records left `pending` by a timed-out extraction, oldest first.
    pub fn pending_media_files(&self, project_id: i64, limit: usize) -> Result<Vec<MediaFile>> {
        let sql = format!(
            "SELECT {} FROM media_files WHERE project_id = ? AND processing_status = 'pending' \
             ORDER BY updated_at, id LIMIT ?",
            MEDIA_FILE_COLUMNS
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let files = stmt
            .query_map(rusqlite::params![project_id, limit as i64], media_file_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(files)
    }

    pub fn count_media_files(&self, project_id: i64) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM media_files WHERE project_id = ?",
            [project_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn count_media_files_with_status(
        &self,
        project_id: i64,
        status: ProcessingStatus,
    ) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM media_files WHERE project_id = ? AND processing_status = ?",
            rusqlite::params![project_id, status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Files per capture day (`YYYY-MM-DD`), the date index rebuilt after a
    /// scan.
    pub fn capture_date_counts(&self, project_id: i64) -> Result<Vec<(String, i64)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT substr(capture_time, 1, 10) AS day, COUNT(*)
            FROM media_files
            WHERE project_id = ? AND capture_time IS NOT NULL
            GROUP BY day
            ORDER BY day
            "#,
        )?;
        let days = stmt
            .query_map([project_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn setup() -> (Database, i64, i64) {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let project = db.get_or_create_project(Path::new("/r")).unwrap().id;
        let folder = db.ensure_folder(project, "/r", "r", None).unwrap();
        (db, project, folder)
    }

    fn row(folder_id: i64, path: &str, status: ProcessingStatus) -> NewMediaFile {
        NewMediaFile {
            folder_id,
            path: path.to_string(),
            kind: MediaKind::Image,
            size_bytes: 100,
            modified_time: 1_700_000_000_000,
            width: Some(640),
            height: Some(480),
            capture_time: Some("2023-05-01 10:00:00".to_string()),
            status,
        }
    }

    #[test]
    fn test_same_path_updates_single_row() {
        let (db, project, folder) = setup();
        db.upsert_media_files(project, &[row(folder, "/r/a.jpg", ProcessingStatus::Success)], 3)
            .unwrap();

        let mut changed = row(folder, "/r/a.jpg", ProcessingStatus::Success);
        changed.size_bytes = 200;
        changed.width = Some(800);
        db.upsert_media_files(project, &[changed], 3).unwrap();

        assert_eq!(db.count_media_files(project).unwrap(), 1);
        let stored = db.get_media_file(project, "/r/a.jpg").unwrap().unwrap();
        assert_eq!(stored.size_bytes, 200);
        assert_eq!(stored.width, Some(800));
        assert_eq!(stored.kind, MediaKind::Image);
    }

    #[test]
    fn test_failures_reach_exhausted() {
        let (db, project, folder) = setup();
        let failing = row(folder, "/r/bad.jpg", ProcessingStatus::Failed);

        db.upsert_media_files(project, &[failing.clone()], 3).unwrap();
        let stored = db.get_media_file(project, "/r/bad.jpg").unwrap().unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Failed);
        assert_eq!(stored.failure_count, 1);
        assert!(!db.known_modified_times(project).unwrap().contains_key("/r/bad.jpg"));

        db.upsert_media_files(project, &[failing.clone()], 3).unwrap();
        db.upsert_media_files(project, &[failing], 3).unwrap();
        let stored = db.get_media_file(project, "/r/bad.jpg").unwrap().unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Exhausted);
        assert_eq!(stored.failure_count, 3);
        assert!(db.known_modified_times(project).unwrap().contains_key("/r/bad.jpg"));

        db.upsert_media_files(project, &[row(folder, "/r/bad.jpg", ProcessingStatus::Success)], 3)
            .unwrap();
        let stored = db.get_media_file(project, "/r/bad.jpg").unwrap().unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Success);
        assert_eq!(stored.failure_count, 0);
    }

    #[test]
    fn test_single_retry_ceiling_exhausts_immediately() {
        let (db, project, folder) = setup();
        db.upsert_media_files(project, &[row(folder, "/r/x.jpg", ProcessingStatus::Failed)], 1)
            .unwrap();
        let stored = db.get_media_file(project, "/r/x.jpg").unwrap().unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Exhausted);
    }

    #[test]
    fn test_update_metadata_backfills_pending() {
        let (db, project, folder) = setup();
        let mut pending = row(folder, "/r/slow.jpg", ProcessingStatus::Pending);
        pending.width = None;
        pending.height = None;
        pending.capture_time = None;
        db.upsert_media_files(project, &[pending], 3).unwrap();

        let queue = db.pending_media_files(project, 10).unwrap();
        assert_eq!(queue.len(), 1);

        db.update_media_metadata(
            queue[0].id,
            Some(10),
            Some(20),
            Some("2020-01-01 00:00:00"),
            ProcessingStatus::Success,
            3,
        )
        .unwrap();

        let stored = db.get_media_file(project, "/r/slow.jpg").unwrap().unwrap();
        assert_eq!((stored.width, stored.height), (Some(10), Some(20)));
        assert_eq!(stored.processing_status, ProcessingStatus::Success);
        assert!(db.pending_media_files(project, 10).unwrap().is_empty());
    }

    #[test]
    fn test_capture_date_counts() {
        let (db, project, folder) = setup();
        let mut second = row(folder, "/r/b.jpg", ProcessingStatus::Success);
        second.capture_time = Some("2023-05-02 08:00:00".to_string());
        let mut undated = row(folder, "/r/c.jpg", ProcessingStatus::Success);
        undated.capture_time = None;
        db.upsert_media_files(
            project,
            &[row(folder, "/r/a.jpg", ProcessingStatus::Success), second, undated],
            3,
        )
        .unwrap();

        assert_eq!(
            db.capture_date_counts(project).unwrap(),
            vec![("2023-05-01".to_string(), 1), ("2023-05-02".to_string(), 1)]
        );
    }
}

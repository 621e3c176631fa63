//! SQLite-backed persistent store.
//!
//! Holds projects, the folder tree, media file records and the persistent
//! thumbnail cache. The connection runs in WAL mode so readers (thumbnail
//! lookups, a UI process) are not blocked while a scan commits batches.
//! Each [`Database`] owns one connection behind a mutex; open one handle per
//! concurrent consumer to get real reader/writer concurrency.

mod schema;
pub mod files;
pub mod folders;
pub mod projects;
pub mod thumb_cache;

use anyhow::{bail, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub use files::{KnownFile, MediaFile, MediaKind, NewMediaFile, ProcessingStatus};
pub use folders::FolderNode;
pub use projects::Project;
pub use schema::{MIGRATIONS, SCHEMA};
pub use thumb_cache::CachedThumbnail;

use crate::error::MediaError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

pub struct Database {
    conn: Mutex<Connection>,
    mode: AccessMode,
}

impl Database {
    /// Open (creating if needed) a read-write store.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_mode(path, AccessMode::ReadWrite)
    }

    pub fn open_read_only(path: &Path) -> Result<Self> {
        Self::open_with_mode(path, AccessMode::ReadOnly)
    }

    pub fn open_with_mode(path: &Path, mode: AccessMode) -> Result<Self> {
        let conn = match mode {
            AccessMode::ReadWrite => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent).map_err(MediaError::store)?;
                    }
                }
                Connection::open(path)
            }
            AccessMode::ReadOnly => Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            ),
        }
        .map_err(MediaError::store)?;

        Self::configure(&conn, mode).map_err(MediaError::store)?;
        tracing::debug!("Opened store {:?} ({:?})", path, mode);

        Ok(Self {
            conn: Mutex::new(conn),
            mode,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(MediaError::store)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
            mode: AccessMode::ReadWrite,
        })
    }

    fn configure(conn: &Connection, mode: AccessMode) -> rusqlite::Result<()> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        if mode == AccessMode::ReadWrite {
            let journal: String =
                conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
            if !journal.eq_ignore_ascii_case("wal") {
                tracing::warn!("Store journal mode is {}, expected wal", journal);
            }
            conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        }
        Ok(())
    }

    /// Create tables and apply column migrations.
    pub fn initialize(&self) -> Result<()> {
        if self.mode == AccessMode::ReadOnly {
            bail!(MediaError::StoreUnavailable(
                "cannot initialize a read-only store".to_string()
            ));
        }
        let conn = self.conn();
        conn.execute_batch(SCHEMA).map_err(MediaError::store)?;
        for migration in MIGRATIONS {
            let _ = conn.execute(migration, []);
        }
        Ok(())
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Lock the connection. A poisoned lock still hands out the connection:
    /// SQLite keeps its own consistency and a panicking holder cannot leave
    /// an open transaction behind (rusqlite rolls back on drop).
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_initialize_is_repeatable() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db.initialize().unwrap();

        let kind_column: i64 = db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('media_files') WHERE name = 'kind'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(kind_column, 1);
    }

    #[test]
    fn test_file_store_uses_wal() {
        let dir = tempdir().unwrap();
        let db = Database::open(&dir.path().join("sub").join("store.db")).unwrap();
        db.initialize().unwrap();

        let journal: String = db
            .conn()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal.to_lowercase(), "wal");
    }

    #[test]
    fn test_read_only_store_rejects_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db");
        let writer = Database::open(&path).unwrap();
        writer.initialize().unwrap();
        writer.get_or_create_project(Path::new("/photos")).unwrap();

        let reader = Database::open_read_only(&path).unwrap();
        assert_eq!(reader.mode(), AccessMode::ReadOnly);
        assert_eq!(reader.list_projects().unwrap().len(), 1);
        assert!(reader.initialize().is_err());
        assert!(reader.get_or_create_project(Path::new("/other")).is_err());
    }

    #[test]
    fn test_missing_read_only_store_is_unavailable() {
        let dir = tempdir().unwrap();
        let err = match Database::open_read_only(&dir.path().join("absent.db")) {
            Ok(_) => panic!("opening a missing store read-only should fail"),
            Err(e) => e,
        };
        assert!(matches!(
            err.downcast_ref::<MediaError>(),
            Some(MediaError::StoreUnavailable(_))
        ));
    }
}

use anyhow::Result;

use super::Database;

/// A persisted thumbnail, keyed by normalized source path and size class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedThumbnail {
    pub path: String,
    pub size_class: u32,
    pub source_mtime: i64,
    pub encoded_bytes: Vec<u8>,
    /// Unix seconds.
    pub last_access: i64,
}

impl Database {
    pub fn get_cached_thumbnail(
        &self,
        path: &str,
        size_class: u32,
    ) -> Result<Option<CachedThumbnail>> {
        let result = self.conn().query_row(
            r#"
            SELECT path, size_class, source_mtime, encoded_bytes, last_access
            FROM thumb_cache
            WHERE path = ? AND size_class = ?
            "#,
            rusqlite::params![path, size_class],
            |row| {
                Ok(CachedThumbnail {
                    path: row.get(0)?,
                    size_class: row.get(1)?,
                    source_mtime: row.get(2)?,
                    encoded_bytes: row.get(3)?,
                    last_access: row.get(4)?,
                })
            },
        );
        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn put_cached_thumbnail(&self, record: &CachedThumbnail) -> Result<()> {
        self.conn().execute(
            r#"
            INSERT OR REPLACE INTO thumb_cache
                (path, size_class, source_mtime, encoded_bytes, last_access)
            VALUES (?, ?, ?, ?, ?)
            "#,
            rusqlite::params![
                record.path,
                record.size_class,
                record.source_mtime,
                record.encoded_bytes,
                record.last_access,
            ],
        )?;
        Ok(())
    }

    pub fn touch_cached_thumbnail(
        &self,
        path: &str,
        size_class: u32,
        accessed_at: i64,
    ) -> Result<()> {
        self.conn().execute(
            "UPDATE thumb_cache SET last_access = ? WHERE path = ? AND size_class = ?",
            rusqlite::params![accessed_at, path, size_class],
        )?;
        Ok(())
    }

    /// Remove every size class cached for `path`.
    pub fn delete_cached_thumbnails(&self, path: &str) -> Result<usize> {
        let removed = self
            .conn()
            .execute("DELETE FROM thumb_cache WHERE path = ?", [path])?;
        Ok(removed)
    }

    /// Remove rows last accessed before `cutoff` (unix seconds).
    pub fn purge_cached_thumbnails_before(&self, cutoff: i64) -> Result<usize> {
        let removed = self
            .conn()
            .execute("DELETE FROM thumb_cache WHERE last_access < ?", [cutoff])?;
        Ok(removed)
    }

    pub fn purge_all_cached_thumbnails(&self) -> Result<usize> {
        let removed = self.conn().execute("DELETE FROM thumb_cache", [])?;
        Ok(removed)
    }

    pub fn count_cached_thumbnails(&self) -> Result<i64> {
        let count = self
            .conn()
            .query_row("SELECT COUNT(*) FROM thumb_cache", [], |row| row.get(0))?;
        Ok(count)
    }
}

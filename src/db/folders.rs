use anyhow::Result;

use super::Database;
use crate::error::MediaError;

/// One node of a project's folder tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderNode {
    pub id: i64,
    pub project_id: i64,
    pub parent_id: Option<i64>,
    pub path: String,
    pub name: String,
}

fn folder_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FolderNode> {
    Ok(FolderNode {
        id: row.get(0)?,
        project_id: row.get(1)?,
        parent_id: row.get(2)?,
        path: row.get(3)?,
        name: row.get(4)?,
    })
}

impl Database {
    /// Ensure-or-fetch a folder node and return its id.
    ///
    /// Safe to race against itself: a concurrent insert of the same path
    /// loses to the unique constraint and both callers read the same row.
    pub fn ensure_folder(
        &self,
        project_id: i64,
        path: &str,
        name: &str,
        parent_id: Option<i64>,
    ) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO folders (project_id, parent_id, path, name) VALUES (?, ?, ?, ?)",
            rusqlite::params![project_id, parent_id, path, name],
        )?;
        let id = conn.query_row(
            "SELECT id FROM folders WHERE project_id = ? AND path = ?",
            rusqlite::params![project_id, path],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn get_folder(&self, folder_id: i64) -> Result<Option<FolderNode>> {
        let result = self.conn().query_row(
            "SELECT id, project_id, parent_id, path, name FROM folders WHERE id = ?",
            [folder_id],
            folder_from_row,
        );
        match result {
            Ok(folder) => Ok(Some(folder)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_folder_by_path(&self, project_id: i64, path: &str) -> Result<Option<FolderNode>> {
        let result = self.conn().query_row(
            "SELECT id, project_id, parent_id, path, name FROM folders
             WHERE project_id = ? AND path = ?",
            rusqlite::params![project_id, path],
            folder_from_row,
        );
        match result {
            Ok(folder) => Ok(Some(folder)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Direct children of `parent_id`, or the project's root nodes when
    /// `parent_id` is `None`.
    pub fn child_folders(
        &self,
        project_id: i64,
        parent_id: Option<i64>,
    ) -> Result<Vec<FolderNode>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, project_id, parent_id, path, name
            FROM folders
            WHERE project_id = ? AND parent_id IS ?
            ORDER BY name
            "#,
        )?;
        let folders = stmt
            .query_map(rusqlite::params![project_id, parent_id], folder_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(folders)
    }

    /// The chain from the root node down to `folder_id`, inclusive.
    pub fn folder_ancestors(&self, folder_id: i64) -> Result<Vec<FolderNode>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            WITH RECURSIVE chain(id, project_id, parent_id, path, name, depth) AS (
                SELECT id, project_id, parent_id, path, name, 0
                FROM folders WHERE id = ?
                UNION ALL
                SELECT f.id, f.project_id, f.parent_id, f.path, f.name, c.depth + 1
                FROM folders f
                JOIN chain c ON f.id = c.parent_id
                WHERE c.depth < 4096
            )
            SELECT id, project_id, parent_id, path, name
            FROM chain
            ORDER BY depth DESC
            "#,
        )?;
        let chain = stmt
            .query_map([folder_id], folder_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chain)
    }

    pub fn count_folders(&self, project_id: i64) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM folders WHERE project_id = ?",
            [project_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete an empty folder. A folder with child folders or files is
    /// refused with [`MediaError::FolderNotEmpty`].
    pub fn delete_folder(&self, folder_id: i64) -> Result<bool> {
        let conn = self.conn();
        let (children, files): (i64, i64) = conn.query_row(
            r#"
            SELECT
                (SELECT COUNT(*) FROM folders WHERE parent_id = ?1),
                (SELECT COUNT(*) FROM media_files WHERE folder_id = ?1)
            "#,
            [folder_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        if children > 0 || files > 0 {
            return Err(MediaError::FolderNotEmpty(folder_id).into());
        }
        let changed = conn.execute("DELETE FROM folders WHERE id = ?", [folder_id])?;
        Ok(changed > 0)
    }
}

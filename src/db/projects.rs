use anyhow::Result;
use std::path::Path;

use super::Database;
use crate::error::MediaError;

/// An isolation scope for one scanned root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub root_path: String,
}

fn project_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        root_path: row.get(2)?,
    })
}

impl Database {
    /// Fetch the project for `root`, creating it on first use. The project is
    /// named after the root's final path component.
    pub fn get_or_create_project(&self, root: &Path) -> Result<Project> {
        let root_str = root.to_string_lossy();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| root_str.to_string());

        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO projects (name, root_path) VALUES (?, ?)",
            rusqlite::params![name, root_str.as_ref()],
        )?;
        let project = conn.query_row(
            "SELECT id, name, root_path FROM projects WHERE root_path = ?",
            [root_str.as_ref()],
            project_from_row,
        )?;
        Ok(project)
    }

    pub fn get_project(&self, project_id: i64) -> Result<Option<Project>> {
        let result = self.conn().query_row(
            "SELECT id, name, root_path FROM projects WHERE id = ?",
            [project_id],
            project_from_row,
        );
        match result {
            Ok(project) => Ok(Some(project)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_project_by_root(&self, root: &Path) -> Result<Option<Project>> {
        let root_str = root.to_string_lossy();
        let result = self.conn().query_row(
            "SELECT id, name, root_path FROM projects WHERE root_path = ?",
            [root_str.as_ref()],
            project_from_row,
        );
        match result {
            Ok(project) => Ok(Some(project)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id, name, root_path FROM projects ORDER BY name")?;
        let projects = stmt
            .query_map([], project_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(projects)
    }

    pub fn rename_project(&self, project_id: i64, name: &str) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE projects SET name = ? WHERE id = ?",
            rusqlite::params![name, project_id],
        )?;
        if changed == 0 {
            return Err(MediaError::UnknownProject(project_id).into());
        }
        Ok(())
    }

    /// Delete a project together with its folders and files.
    pub fn delete_project(&self, project_id: i64) -> Result<bool> {
        let changed = self
            .conn()
            .execute("DELETE FROM projects WHERE id = ?", [project_id])?;
        Ok(changed > 0)
    }
}

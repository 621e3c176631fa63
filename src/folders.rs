//! Folder index: maps directories under a project root onto folder nodes.

use anyhow::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::db::{Database, FolderNode};
use crate::error::MediaError;

/// Ensures folder chains for one project during a scan.
///
/// Already-ensured paths are memoized so each directory costs one store
/// round-trip per scan at most, no matter how many files it holds.
pub struct FolderIndex<'a> {
    db: &'a Database,
    project_id: i64,
    root: PathBuf,
    memo: HashMap<PathBuf, i64>,
}

impl<'a> FolderIndex<'a> {
    pub fn new(db: &'a Database, project_id: i64, root: &Path) -> Self {
        Self {
            db,
            project_id,
            root: root.to_path_buf(),
            memo: HashMap::new(),
        }
    }

    /// Ensure-or-fetch every folder from the root down to `dir` and return
    /// the id of `dir`'s node. The root node is the only one without a
    /// parent.
    pub fn ensure(&mut self, dir: &Path) -> Result<i64> {
        if let Some(&id) = self.memo.get(dir) {
            return Ok(id);
        }

        let relative = dir.strip_prefix(&self.root).map_err(|_| MediaError::OutsideRoot {
            path: dir.to_path_buf(),
            root: self.root.clone(),
        })?;

        let mut current = self.root.clone();
        let mut parent_id = self.ensure_node(&current, None)?;

        for component in relative.components() {
            current.push(component);
            parent_id = self.ensure_node(&current, Some(parent_id))?;
        }

        Ok(parent_id)
    }

    fn ensure_node(&mut self, path: &Path, parent_id: Option<i64>) -> Result<i64> {
        if let Some(&id) = self.memo.get(path) {
            return Ok(id);
        }

        let path_str = path.to_string_lossy();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path_str.to_string());

        let id = self
            .db
            .ensure_folder(self.project_id, &path_str, &name, parent_id)?;
        tracing::trace!("Folder {:?} -> {}", path, id);
        self.memo.insert(path.to_path_buf(), id);
        Ok(id)
    }

    /// Root-first chain of nodes ending at `folder_id`.
    pub fn ancestors(&self, folder_id: i64) -> Result<Vec<FolderNode>> {
        self.db.folder_ancestors(folder_id)
    }

    /// Number of distinct folders ensured through this index.
    pub fn ensured_count(&self) -> usize {
        self.memo.len()
    }
}

pub const SCHEMA: &str = r#"
-- Projects: isolation scope for a scanned root
CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    root_path TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- Folder tree, one row per directory that holds (or leads to) media
CREATE TABLE IF NOT EXISTS folders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    parent_id INTEGER,            -- NULL only for the scanned root
    path TEXT NOT NULL,
    name TEXT NOT NULL,
    UNIQUE (project_id, path),
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
    FOREIGN KEY (parent_id) REFERENCES folders(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_folders_parent ON folders(parent_id);

-- Indexed media files
CREATE TABLE IF NOT EXISTS media_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL,
    folder_id INTEGER NOT NULL,
    path TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    modified_time INTEGER NOT NULL,   -- ms since epoch, change-detection fingerprint
    width INTEGER,
    height INTEGER,
    capture_time TEXT,                -- 'YYYY-MM-DD HH:MM:SS'
    processing_status TEXT NOT NULL DEFAULT 'pending',  -- pending/success/failed/exhausted
    failure_count INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (project_id, path),
    FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
    FOREIGN KEY (folder_id) REFERENCES folders(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_media_files_folder ON media_files(folder_id);
CREATE INDEX IF NOT EXISTS idx_media_files_capture_time ON media_files(capture_time);
CREATE INDEX IF NOT EXISTS idx_media_files_status ON media_files(processing_status);

-- Persistent thumbnail cache, independent of media_files
CREATE TABLE IF NOT EXISTS thumb_cache (
    path TEXT NOT NULL,               -- normalized source path
    size_class INTEGER NOT NULL,
    source_mtime INTEGER NOT NULL,    -- ms since epoch at generation time
    encoded_bytes BLOB NOT NULL,
    last_access INTEGER NOT NULL,     -- unix seconds
    PRIMARY KEY (path, size_class)
);

CREATE INDEX IF NOT EXISTS idx_thumb_cache_last_access ON thumb_cache(last_access);
"#;

/// Column additions for stores created by earlier versions. Each statement
/// fails harmlessly when the column already exists.
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE media_files ADD COLUMN kind TEXT NOT NULL DEFAULT 'image'",
];

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::db::MediaKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub kind: MediaKind,
}

/// Everything one walk of a root produced.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub files: Vec<DiscoveredFile>,
    /// Directories visited, the root included.
    pub folders_found: usize,
}

/// Extension lists used to classify files during a walk.
#[derive(Debug, Clone)]
pub struct MediaFilter {
    image_extensions: HashSet<String>,
    video_extensions: HashSet<String>,
}

impl MediaFilter {
    pub fn new(image_extensions: &[String], video_extensions: &[String]) -> Self {
        let lower = |list: &[String]| list.iter().map(|e| e.to_lowercase()).collect();
        Self {
            image_extensions: lower(image_extensions),
            video_extensions: lower(video_extensions),
        }
    }

    pub fn classify(&self, path: &Path) -> Option<MediaKind> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        if self.image_extensions.contains(&ext) {
            Some(MediaKind::Image)
        } else if self.video_extensions.contains(&ext) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }
}

fn is_ignored(entry: &DirEntry, ignore: &HashSet<String>) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && ignore.contains(entry.file_name().to_string_lossy().as_ref())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// Walk `root` once, pruning directories named in `ignore` (they are not
/// descended into) and keeping non-hidden files whose extension is a known
/// media type. Files come back sorted by path.
pub fn discover_media(root: &Path, filter: &MediaFilter, ignore: &HashSet<String>) -> Discovery {
    let mut discovery = Discovery::default();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_ignored(e, ignore));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry under {:?}: {}", root, e);
                continue;
            }
        };

        if entry.file_type().is_dir() {
            discovery.folders_found += 1;
            continue;
        }
        if !entry.file_type().is_file() || is_hidden(&entry) {
            continue;
        }
        if let Some(kind) = filter.classify(entry.path()) {
            discovery.files.push(DiscoveredFile {
                path: entry.into_path(),
                kind,
            });
        }
    }

    discovery.files.sort_by(|a, b| a.path.cmp(&b.path));
    discovery
}

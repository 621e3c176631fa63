use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::Bitmap;

type Key = (String, u32);

struct Entry {
    bitmap: Bitmap,
    source_mtime: i64,
    tick: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<Key, Entry>,
    /// Access tick -> key, oldest first.
    order: BTreeMap<u64, Key>,
    next_tick: u64,
}

impl Inner {
    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &Key) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.tick);
        Some(entry)
    }
}

/// Fixed-capacity LRU of decoded thumbnails keyed by normalized path and
/// size class. One mutex serializes every lookup since a hit reorders.
pub struct MemoryCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Entry for `(path, size_class)` if its source modified time is within
    /// `tolerance_ms` of `current_mtime`. A hit becomes most recently used;
    /// a stale entry is dropped.
    pub fn get(
        &self,
        path: &str,
        size_class: u32,
        current_mtime: i64,
        tolerance_ms: i64,
    ) -> Option<Bitmap> {
        let key = (path.to_string(), size_class);
        let mut inner = self.lock();

        let stale = match inner.entries.get(&key) {
            None => return None,
            Some(entry) => (entry.source_mtime - current_mtime).abs() > tolerance_ms,
        };
        if stale {
            inner.remove(&key);
            return None;
        }

        let tick = inner.bump();
        let entry = inner.entries.get_mut(&key)?;
        let old_tick = std::mem::replace(&mut entry.tick, tick);
        let bitmap = entry.bitmap.clone();
        inner.order.remove(&old_tick);
        inner.order.insert(tick, key);
        Some(bitmap)
    }

    pub fn insert(&self, path: &str, size_class: u32, bitmap: Bitmap, source_mtime: i64) {
        let key = (path.to_string(), size_class);
        let mut inner = self.lock();
        inner.remove(&key);

        while inner.entries.len() >= self.capacity {
            let Some((_, oldest)) = inner.order.pop_first() else {
                break;
            };
            inner.entries.remove(&oldest);
        }

        let tick = inner.bump();
        inner.order.insert(tick, key.clone());
        inner.entries.insert(
            key,
            Entry {
                bitmap,
                source_mtime,
                tick,
            },
        );
    }

    /// Drop every size class cached for `path`.
    pub fn remove_path(&self, path: &str) -> usize {
        let mut inner = self.lock();
        let keys: Vec<Key> = inner
            .entries
            .keys()
            .filter(|(p, _)| p == path)
            .cloned()
            .collect();
        for key in &keys {
            inner.remove(key);
        }
        keys.len()
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

//! Per-file `FileSymbolData` cache keyed by absolute path, validated by
//! mtime (and optionally a content hash), LRU-evicted at a fixed entry
//! count (§4.4 supplement, `SymbolDataCache.__init__` defaults: 1000
//! entries, hash validation off).

use std::collections::HashMap;
use std::path::Path;
use std::time::SystemTime;

use ctxgraph_core::FileSymbolData;

#[derive(Debug, Clone, Default)]
pub struct SymbolCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Entry {
    data: FileSymbolData,
    mtime: SystemTime,
    content_hash: Option<String>,
    access_count: u64,
}

/// LRU order is tracked via a separate `Vec` of keys (most-recently-used
/// last) rather than a crate dependency, matching the small, explicit style
/// the rest of this crate uses for its own caches.
pub struct SymbolDataCache {
    entries: HashMap<String, Entry>,
    order: Vec<String>,
    max_entries: usize,
    use_hash_validation: bool,
    stats: SymbolCacheStats,
}

impl SymbolDataCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            max_entries,
            use_hash_validation: false,
            stats: SymbolCacheStats::default(),
        }
    }

    pub fn with_hash_validation(mut self, enabled: bool) -> Self {
        self.use_hash_validation = enabled;
        self
    }

    pub fn stats(&self) -> SymbolCacheStats {
        self.stats.clone()
    }

    /// Returns cached data for `path` if present and still valid (file
    /// exists, mtime matches, and — if enabled — content hash matches).
    pub fn get(&mut self, path: &Path, content_hash: Option<&str>) -> Option<FileSymbolData> {
        let key = path.to_string_lossy().to_string();
        let current_mtime = std::fs::metadata(path).and_then(|m| m.modified()).ok();

        let valid = match (self.entries.get(&key), current_mtime) {
            (Some(entry), Some(mtime)) => {
                entry.mtime == mtime
                    && (!self.use_hash_validation
                        || entry.content_hash.as_deref() == content_hash)
            }
            _ => false,
        };

        if !valid {
            self.stats.misses += 1;
            return None;
        }

        self.touch(&key);
        let entry = self.entries.get_mut(&key).unwrap();
        entry.access_count += 1;
        self.stats.hits += 1;
        Some(entry.data.clone())
    }

    /// Inserts or refreshes `path`'s entry, evicting the least-recently-used
    /// entry if this insert would exceed `max_entries`.
    pub fn put(&mut self, path: &Path, data: FileSymbolData, content_hash: Option<String>) {
        let key = path.to_string_lossy().to_string();
        let Ok(mtime) = std::fs::metadata(path).and_then(|m| m.modified()) else {
            return;
        };

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_entries {
            self.evict_lru();
        }

        self.entries.insert(
            key.clone(),
            Entry {
                data,
                mtime,
                content_hash,
                access_count: 0,
            },
        );
        self.touch(&key);
    }

    pub fn invalidate(&mut self, path: &Path) {
        let key = path.to_string_lossy().to_string();
        self.entries.remove(&key);
        self.order.retain(|k| k != &key);
    }

    fn touch(&mut self, key: &str) {
        self.order.retain(|k| k != key);
        self.order.push(key.to_string());
    }

    fn evict_lru(&mut self) {
        if self.order.is_empty() {
            return;
        }
        let lru_key = self.order.remove(0);
        self.entries.remove(&lru_key);
        self.stats.evictions += 1;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SymbolDataCache {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit_after_put() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        std::fs::write(&file, "x = 1\n").unwrap();

        let mut cache = SymbolDataCache::new(10);
        assert!(cache.get(&file, None).is_none());
        cache.put(&file, FileSymbolData::new(file.to_string_lossy().to_string()), None);
        assert!(cache.get(&file, None).is_some());
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn stale_mtime_invalidates_entry() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.py");
        std::fs::write(&file, "x = 1\n").unwrap();

        let mut cache = SymbolDataCache::new(10);
        cache.put(&file, FileSymbolData::new(file.to_string_lossy().to_string()), None);
        std::thread::sleep(std::time::Duration::from_millis(10));
        std::fs::write(&file, "x = 2\n").unwrap();
        assert!(cache.get(&file, None).is_none());
    }

    #[test]
    fn evicts_least_recently_used_at_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = SymbolDataCache::new(2);
        let files: Vec<_> = (0..3)
            .map(|i| {
                let f = dir.path().join(format!("f{i}.py"));
                std::fs::write(&f, "x = 1\n").unwrap();
                f
            })
            .collect();

        for f in &files {
            cache.put(f, FileSymbolData::new(f.to_string_lossy().to_string()), None);
        }
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);
        assert!(cache.get(&files[0], None).is_none());
    }
}

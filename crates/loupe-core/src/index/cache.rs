//! Merkle / Mtime Cache
//!
//! Content-addressed change detection without re-reading unchanged
//! files: a fingerprint of (hash, mtime, size) per path, persisted as
//! `cache.json` next to the database. A matching mtime+size skips the
//! read entirely; a matching hash after a read skips the re-index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Per-file fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FileFingerprint {
    pub hash: String,
    pub mtime: i64,
    pub size: u64,
}

/// Persistent fingerprint map
pub struct MerkleCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, FileFingerprint>>,
}

impl MerkleCache {
    /// Load from disk; a missing or corrupt file yields an empty cache
    pub fn load(path: &Path) -> Self {
        let entries = std::fs::read_to_string(path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        }
    }

    /// Persist to disk
    pub fn save(&self) -> std::io::Result<()> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string(&*entries)?;
        std::fs::write(&self.path, json)
    }

    pub fn get(&self, file_path: &str) -> Option<FileFingerprint> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(file_path)
            .cloned()
    }

    /// Fast unchanged check from stat data alone
    pub fn is_unchanged(&self, file_path: &str, mtime: i64, size: u64) -> bool {
        self.get(file_path)
            .is_some_and(|fp| fp.mtime == mtime && fp.size == size)
    }

    pub fn insert(&self, file_path: &str, fingerprint: FileFingerprint) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(file_path.to_string(), fingerprint);
    }

    pub fn remove(&self, file_path: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(file_path);
    }

    /// All cached paths
    pub fn paths(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let cache = MerkleCache::load(&path);
        cache.insert(
            "src/a.ts",
            FileFingerprint {
                hash: "abc".to_string(),
                mtime: 100,
                size: 42,
            },
        );
        cache.save().unwrap();

        let reloaded = MerkleCache::load(&path);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("src/a.ts").unwrap().hash, "abc");
    }

    #[test]
    fn test_missing_file_is_empty() {
        let cache = MerkleCache::load(Path::new("/nonexistent/cache.json"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "not json{{").unwrap();
        assert!(MerkleCache::load(&path).is_empty());
    }

    #[test]
    fn test_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MerkleCache::load(&dir.path().join("cache.json"));
        cache.insert(
            "a.ts",
            FileFingerprint {
                hash: "h".to_string(),
                mtime: 10,
                size: 5,
            },
        );
        assert!(cache.is_unchanged("a.ts", 10, 5));
        assert!(!cache.is_unchanged("a.ts", 11, 5));
        assert!(!cache.is_unchanged("a.ts", 10, 6));
        assert!(!cache.is_unchanged("b.ts", 10, 5));
    }
}

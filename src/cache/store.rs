//! Key-value persistence for cached collections.
//!
//! Mirrors the browser's local storage: string keys mapped to string values,
//! read and written synchronously.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use super::CacheError;

/// Synchronous string key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), CacheError>;
}

/// Process-local store; contents disappear with the value.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON-file backed store that survives restarts.
///
/// The whole map is rewritten on every `set` through a temporary file and a
/// rename, so readers of the file never see a half-written map.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`. A missing file or one holding invalid JSON
    /// starts empty; any other read failure is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::Store(e.to_string()))?;
        }

        let entries = match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), "discarding unreadable cache file: {}", e);
                HashMap::new()
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(CacheError::Store(format!("{}: {}", path.display(), e))),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn save(&self, entries: &HashMap<String, String>) -> Result<(), CacheError> {
        let data = serde_json::to_vec(entries).map_err(|e| CacheError::Store(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, data).map_err(|e| CacheError::Store(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| CacheError::Store(e.to_string()))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous = entries.insert(key.to_string(), value.to_string());

        if let Err(e) = self.save(&entries) {
            // Keep memory consistent with what is on disk
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("services"), None);

        store.set("services", "[]").unwrap();
        assert_eq!(store.get("services").as_deref(), Some("[]"));

        store.set("services", "[{\"name\":\"Web\"}]").unwrap();
        assert_eq!(store.get("services").as_deref(), Some("[{\"name\":\"Web\"}]"));
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache").join("storage.json");

        let store = FileStore::open(&path).unwrap();
        store.set("lastUpdated", "2024-01-01T00:00:00.000Z").unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get("lastUpdated").as_deref(),
            Some("2024-01-01T00:00:00.000Z")
        );
    }

    #[test]
    fn test_file_store_ignores_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("anything"), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_file_store_open_fails_when_path_is_unreadable() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be read as a file
        let path = dir.path().join("storage.json");
        std::fs::create_dir(&path).unwrap();

        let err = FileStore::open(&path).unwrap_err();
        assert!(matches!(err, CacheError::Store(_)));
        assert!(path.is_dir());
    }
}

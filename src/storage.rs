use std::collections::HashMap;
use std::fs::{self, File, create_dir_all};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{RekapError, RekapResult};

/// Cached master items
pub const ITEMS_KEY: &str = "cached_items";
/// Cached rekap history
pub const HISTORY_KEY: &str = "cached_history";
/// Client settings
pub const SETTINGS_KEY: &str = "app_settings";

pub const CACHE_KEYS: [&str; 3] = [ITEMS_KEY, HISTORY_KEY, SETTINGS_KEY];

/// Key-value store holding JSON documents on the client side
pub trait LocalStore: Send + Sync {
    fn get_raw(&self, key: &str) -> RekapResult<Option<String>>;
    fn set_raw(&self, key: &str, value: &str) -> RekapResult<()>;
    fn remove(&self, key: &str) -> RekapResult<()>;
}

/// Read and decode a cached value; unreadable entries count as absent
pub fn load<T: DeserializeOwned>(store: &dyn LocalStore, key: &str) -> Option<T> {
    match store.get_raw(key) {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding unreadable cache entry");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(key, error = %e, "failed to read cache");
            None
        }
    }
}

/// Encode and store a value; failures are logged and otherwise ignored
pub fn save<T: Serialize>(store: &dyn LocalStore, key: &str, value: &T) {
    let result = serde_json::to_string(value)
        .map_err(|e| RekapError::Storage(e.to_string()))
        .and_then(|raw| store.set_raw(key, &raw));
    if let Err(e) = result {
        tracing::warn!(key, error = %e, "failed to save to cache");
    }
}

/// Remove every cache key
pub fn clear_all(store: &dyn LocalStore) {
    for key in CACHE_KEYS {
        if let Err(e) = store.remove(key) {
            tracing::warn!(key, error = %e, "failed to clear cache entry");
        }
    }
}

/// One JSON file per key inside a directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl AsRef<Path>) -> RekapResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            create_dir_all(&dir).map_err(|e| {
                RekapError::Storage(format!("cannot create {}: {}", dir.display(), e))
            })?;
        }
        Ok(FileStore { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl LocalStore for FileStore {
    fn get_raw(&self, key: &str) -> RekapResult<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let mut contents = String::new();
        File::open(&path)
            .and_then(|mut file| file.read_to_string(&mut contents))
            .map_err(|e| RekapError::Storage(format!("cannot read {}: {}", path.display(), e)))?;
        Ok(Some(contents))
    }

    fn set_raw(&self, key: &str, value: &str) -> RekapResult<()> {
        let path = self.path_for(key);
        let mut file = File::create(&path)
            .map_err(|e| RekapError::Storage(format!("cannot create {}: {}", path.display(), e)))?;
        file.write_all(value.as_bytes())
            .map_err(|e| RekapError::Storage(format!("cannot write {}: {}", path.display(), e)))
    }

    fn remove(&self, key: &str) -> RekapResult<()> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| {
                RekapError::Storage(format!("cannot remove {}: {}", path.display(), e))
            })?;
        }
        Ok(())
    }
}

/// Volatile store, for tests and sessions without a cache directory
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocalStore for MemoryStore {
    fn get_raw(&self, key: &str) -> RekapResult<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| RekapError::Storage("store lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: &str) -> RekapResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| RekapError::Storage("store lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> RekapResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| RekapError::Storage("store lock poisoned".to_string()))?;
        entries.remove(key);
        Ok(())
    }
}

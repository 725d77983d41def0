//! File-backed key-value store.
//!
//! All keys live in one JSON document:
//! - Reads parse the whole file; a missing file is an empty store
//! - Writes go through temp file + rename so a crash never leaves a torn file
//! - Expired entries are dropped on the next write
//! - A corrupt file is replaced by the next write

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TelltaleError};
use crate::host::storage::{KeyValueStore, StoredValue};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, StoredValue>,
}

/// Durable store persisted to a single JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self, key: &str) -> Result<StoreFile> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoreFile::default());
            }
            Err(err) => {
                return Err(TelltaleError::StorageRead {
                    key: key.to_string(),
                    message: format!("{}: {err}", self.path.display()),
                });
            }
        };
        if content.trim().is_empty() {
            return Ok(StoreFile::default());
        }
        serde_json::from_str(&content).map_err(|err| TelltaleError::StorageCorrupt {
            key: key.to_string(),
            message: format!("{}: {err}", self.path.display()),
        })
    }

    fn write_file(&self, key: &str, mut file: StoreFile) -> Result<()> {
        let now = Utc::now();
        file.entries.retain(|_, v| !v.is_expired(now));
        file.version = FORMAT_VERSION;

        let content = serde_json::to_string(&file)?;
        write_atomic(&self.path, content.as_bytes()).map_err(|err| TelltaleError::StorageWrite {
            key: key.to_string(),
            message: format!("{}: {err}", self.path.display()),
        })
    }

    fn modify<F>(&self, key: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, StoredValue>),
    {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = match self.read_file(key) {
            Err(TelltaleError::StorageCorrupt { message, .. }) => {
                tracing::warn!(%message, "storage file unreadable, starting from empty");
                StoreFile::default()
            }
            other => other?,
        };
        f(&mut file.entries);
        self.write_file(key, file)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let file = self.read_file(key)?;
        Ok(file
            .entries
            .get(key)
            .filter(|v| !v.is_expired(Utc::now()))
            .map(|v| v.value.clone()))
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        tracing::trace!(key, path = %self.path.display(), "storage write");
        self.modify(key, |entries| {
            entries.insert(key.to_string(), StoredValue::new(value, ttl));
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.modify(key, |entries| {
            entries.remove(key);
        })
    }
}

/// Write bytes atomically using temp file + rename.
fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let temp_path = parent.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("storage"),
        std::process::id()
    ));

    {
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    std::fs::rename(&temp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn store() -> (TempDir, FileStore) {
        let dir = TempDir::new().expect("tempdir");
        let store = FileStore::new(dir.path().join("nested").join("storage.json"));
        (dir, store)
    }

    #[test]
    fn missing_file_reads_empty() {
        let (_dir, store) = store();
        assert_eq!(store.get("anything").expect("get"), None);
    }

    #[test]
    fn values_survive_reopen() {
        let (_dir, store) = store();
        store.set("debug_mode", "true", None).expect("set");
        store.set("other", "1", None).expect("set");

        let reopened = FileStore::new(store.path());
        assert_eq!(reopened.get("debug_mode").expect("get").as_deref(), Some("true"));
        assert_eq!(reopened.get("other").expect("get").as_deref(), Some("1"));
    }

    #[test]
    fn remove_deletes_key() {
        let (_dir, store) = store();
        store.set("k", "v", None).expect("set");
        store.remove("k").expect("remove");
        assert_eq!(store.get("k").expect("get"), None);
    }

    #[test]
    fn expired_values_are_absent() {
        let (_dir, store) = store();
        store.set("gone", "v", Some(Duration::ZERO)).expect("set");
        assert_eq!(store.get("gone").expect("get"), None);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.path().parent().expect("parent")).expect("mkdir");
        std::fs::write(store.path(), "{oops").expect("write");
        let err = store.get("k").expect_err("corrupt");
        assert!(matches!(err, TelltaleError::StorageCorrupt { .. }));
    }

    #[traced_test]
    #[test]
    fn write_replaces_corrupt_file() {
        let (_dir, store) = store();
        std::fs::create_dir_all(store.path().parent().expect("parent")).expect("mkdir");
        std::fs::write(store.path(), "{ definitely not json").expect("write");

        store.set("usage-store", "{}", None).expect("first write");
        store.set("debug_mode", "true", None).expect("second write");

        assert_eq!(store.get("usage-store").expect("get").as_deref(), Some("{}"));
        assert_eq!(store.get("debug_mode").expect("get").as_deref(), Some("true"));
        assert!(logs_contain("storage file unreadable"));
    }

    #[test]
    fn no_temp_files_left_behind() {
        let (_dir, store) = store();
        store.set("k", "v", None).expect("set");
        let parent = store.path().parent().expect("parent");
        let leftovers: Vec<_> = std::fs::read_dir(parent)
            .expect("read dir")
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }
}

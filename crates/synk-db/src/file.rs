//! JSON-file backing store.
//!
//! The whole key space is held in memory and rewritten to disk as a single
//! JSON object after every mutation. Writes go to a sibling temp file first
//! and are renamed into place, so a crash leaves either the old or the new
//! file, never a torn one.
//!
//! This is the store the episode counter uses to survive process restarts.
//! It is not meant for large or hot key spaces.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use synk_types::Value;

use crate::error::StoreError;
use crate::store::BackingStore;

/// Backing store persisted to a single JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, Value>,
}

impl FileStore {
    /// Open the store at `path`, loading existing entries if the file exists.
    ///
    /// Parent directories are created on the first write, not here.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file exists but cannot be read, or
    /// [`StoreError::Serialization`] if it is not a JSON object.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = fs::read(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_slice(&raw)?
        } else {
            BTreeMap::new()
        };
        tracing::debug!(path = %path.display(), keys = entries.len(), "File store opened");
        Ok(Self { path, entries })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `entries` to disk. Mutations swap them into `self.entries`
    /// only after this returns `Ok`.
    fn persist(&self, entries: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_vec_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl BackingStore for FileStore {
    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut next = self.entries.clone();
        next.insert(key.to_owned(), value);
        self.persist(&next)?;
        self.entries = next;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Value, StoreError> {
        self.entries
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(key))
    }

    fn exists(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        let mut next = self.entries.clone();
        if next.remove(key).is_none() {
            return Err(StoreError::not_found(key));
        }
        self.persist(&next)?;
        self.entries = next;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("counter.json");

        let mut store = FileStore::open(&path).unwrap();
        store.set("trial_num", json!(3)).unwrap();
        store.set("episode", json!("abc")).unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("trial_num").unwrap(), json!(3));
        assert_eq!(reopened.get("episode").unwrap(), json!("abc"));
    }

    #[test]
    fn delete_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let mut store = FileStore::open(&path).unwrap();
        store.set("k", json!(true)).unwrap();
        store.delete("k").unwrap();
        assert!(store.delete("k").unwrap_err().is_not_found());

        let reopened = FileStore::open(&path).unwrap();
        assert!(!reopened.exists("k"));
    }

    #[test]
    fn failed_set_leaves_key_absent() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();

        let mut store = FileStore::open(blocker.join("store.json")).unwrap();
        assert!(matches!(
            store.set("k", json!(1)),
            Err(StoreError::Io { .. })
        ));
        assert!(!store.exists("k"));
        assert!(store.get("k").unwrap_err().is_not_found());
    }

    #[test]
    fn failed_delete_keeps_key() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        let path = state_dir.join("store.json");

        let mut store = FileStore::open(&path).unwrap();
        store.set("k", json!("kept")).unwrap();

        fs::remove_dir_all(&state_dir).unwrap();
        fs::write(&state_dir, b"not a directory").unwrap();

        assert!(matches!(store.delete("k"), Err(StoreError::Io { .. })));
        assert_eq!(store.get("k").unwrap(), json!("kept"));
    }

    #[test]
    fn corrupt_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"[1, 2, 3]").unwrap();

        assert!(matches!(
            FileStore::open(&path),
            Err(StoreError::Serialization(_))
        ));
    }
}

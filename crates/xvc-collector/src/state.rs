//! File-backed key/value state store
//!
//! Durable checkpoint storage plus the single-instance lock primitive. The
//! whole store is one JSON document on disk; writes go through a temp file
//! and an atomic rename so a crash mid-write never truncates state.
//!
//! Locks are lease-shaped: acquiring records an acquisition timestamp under
//! a reserved document key, and a lease older than a configured expiry can
//! be reclaimed by a later run.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use xvc_common::{Result, XvcError};

/// Reserved document key holding lock leases.
const LOCKS_KEY: &str = "__locks__";

/// JSON-file key/value store with lock leases.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a value by key, deserialized into `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let doc = self.load_document()?;
        match doc.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Write a value under a key.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let mut doc = self.load_document()?;
        doc.insert(key.to_string(), serde_json::to_value(value)?);
        self.write_document(&doc)
    }

    /// Whether a key is present.
    pub fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.load_document()?.contains_key(key))
    }

    /// Remove a key. Removing an absent key is not an error.
    pub fn remove(&self, key: &str) -> Result<()> {
        let mut doc = self.load_document()?;
        if doc.remove(key).is_some() {
            self.write_document(&doc)?;
        }
        Ok(())
    }

    /// Try to acquire a named lock. Returns false when the lock is held.
    pub fn acquire_lock(&self, name: &str) -> Result<bool> {
        let mut doc = self.load_document()?;
        let locks = Self::locks_mut(&mut doc);
        if locks.contains_key(name) {
            return Ok(false);
        }
        locks.insert(name.to_string(), Value::String(Utc::now().to_rfc3339()));
        self.write_document(&doc)?;
        debug!(lock = name, "Lock acquired");
        Ok(true)
    }

    /// Release a named lock. Releasing an absent lock is not an error.
    pub fn release_lock(&self, name: &str) -> Result<()> {
        let mut doc = self.load_document()?;
        let released = Self::locks_mut(&mut doc).remove(name).is_some();
        if released {
            self.write_document(&doc)?;
            debug!(lock = name, "Lock released");
        }
        Ok(())
    }

    /// Reclaim a lock whose lease is older than `expiry`. Returns true when
    /// the lock was removed. A missing or unreadable lease timestamp counts
    /// as expired.
    pub fn release_lock_if_expired(&self, name: &str, expiry: Duration) -> Result<bool> {
        let mut doc = self.load_document()?;
        let locks = Self::locks_mut(&mut doc);

        let Some(lease) = locks.get(name) else {
            return Ok(false);
        };

        let expired = match lease.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok()) {
            Some(acquired_at) => {
                let age = Utc::now().signed_duration_since(acquired_at.with_timezone(&Utc));
                age.to_std().map(|age| age >= expiry).unwrap_or(true)
            }
            None => true,
        };

        if expired {
            locks.remove(name);
            self.write_document(&doc)?;
            warn!(lock = name, "Expired lock reclaimed");
        }
        Ok(expired)
    }

    fn locks_mut(doc: &mut Map<String, Value>) -> &mut Map<String, Value> {
        let entry = doc
            .entry(LOCKS_KEY.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        match entry.as_object_mut() {
            Some(map) => map,
            // unreachable after the normalization above
            None => unreachable!("locks entry is always an object"),
        }
    }

    fn load_document(&self) -> Result<Map<String, Value>> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(map) => Ok(map),
            other => Err(XvcError::State(format!(
                "state file {} holds {} instead of an object",
                self.path.display(),
                match other {
                    Value::Array(_) => "an array",
                    Value::String(_) => "a string",
                    _ => "a scalar",
                }
            ))),
        }
    }

    fn write_document(&self, doc: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&Value::Object(doc.clone()))?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_store() -> (tempfile::TempDir, FileStateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("state.json"));
        (dir, store)
    }

    #[test]
    fn test_get_set_roundtrip() {
        let (_dir, store) = temp_store();
        assert!(!store.has_key("Violations").unwrap());
        assert_eq!(store.get::<Value>("Violations").unwrap(), None);

        store
            .set("Violations", &json!({"last_fetched_created_from": "2024-01-01T00:00:00Z"}))
            .unwrap();
        assert!(store.has_key("Violations").unwrap());
        let value: Value = store.get("Violations").unwrap().unwrap();
        assert_eq!(value["last_fetched_created_from"], "2024-01-01T00:00:00Z");
    }

    #[test]
    fn test_set_overwrites() {
        let (_dir, store) = temp_store();
        store.set("k", &json!(1)).unwrap();
        store.set("k", &json!(2)).unwrap();
        assert_eq!(store.get::<u64>("k").unwrap(), Some(2));
    }

    #[test]
    fn test_remove() {
        let (_dir, store) = temp_store();
        store.set("k", &json!(1)).unwrap();
        store.remove("k").unwrap();
        assert!(!store.has_key("k").unwrap());
        // absent key is fine
        store.remove("k").unwrap();
    }

    #[test]
    fn test_lock_exclusion() {
        let (_dir, store) = temp_store();
        assert!(store.acquire_lock("run").unwrap());
        assert!(!store.acquire_lock("run").unwrap());
        store.release_lock("run").unwrap();
        assert!(store.acquire_lock("run").unwrap());
    }

    #[test]
    fn test_fresh_lock_is_not_expired() {
        let (_dir, store) = temp_store();
        store.acquire_lock("run").unwrap();
        let reclaimed = store
            .release_lock_if_expired("run", Duration::from_secs(600))
            .unwrap();
        assert!(!reclaimed);
        assert!(!store.acquire_lock("run").unwrap());
    }

    #[test]
    fn test_expired_lock_is_reclaimed() {
        let (_dir, store) = temp_store();
        store.acquire_lock("run").unwrap();
        let reclaimed = store
            .release_lock_if_expired("run", Duration::from_secs(0))
            .unwrap();
        assert!(reclaimed);
        assert!(store.acquire_lock("run").unwrap());
    }

    #[test]
    fn test_absent_lock_is_not_reclaimed() {
        let (_dir, store) = temp_store();
        assert!(!store
            .release_lock_if_expired("run", Duration::from_secs(0))
            .unwrap());
    }

    #[test]
    fn test_locks_do_not_leak_into_keys() {
        let (_dir, store) = temp_store();
        store.acquire_lock("run").unwrap();
        store.set("Violations", &json!({"offset": 2})).unwrap();
        store.release_lock("run").unwrap();
        assert!(store.has_key("Violations").unwrap());
    }
}

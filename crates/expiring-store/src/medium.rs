//! Flat string-keyed byte media with no enumeration

use crate::store::lock;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// A preferences-style key-value medium.
///
/// Deliberately offers no way to list its keys; stores built on top must
/// track their own.
pub trait KeyValueMedium: Send + Sync {
    fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>>;

    fn set(&self, key: &str, value: Vec<u8>) -> io::Result<()>;

    /// Removing an absent key succeeds
    fn remove(&self, key: &str) -> io::Result<()>;
}

impl<M: KeyValueMedium + ?Sized> KeyValueMedium for Arc<M> {
    fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Vec<u8>) -> io::Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        (**self).remove(key)
    }
}

/// Process-local medium. Clones share one map.
#[derive(Debug, Clone, Default)]
pub struct MemoryMedium {
    values: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueMedium for MemoryMedium {
    fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(lock(&self.values).get(key).cloned())
    }

    fn set(&self, key: &str, value: Vec<u8>) -> io::Result<()> {
        lock(&self.values).insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        lock(&self.values).remove(key);
        Ok(())
    }
}

/// A named suite persisted as a single JSON file of hex-encoded values.
///
/// The whole suite is held in memory and rewritten on every mutation, so it
/// suits small amounts of data. Share one instance (behind an `Arc`) rather
/// than opening the same suite twice; separate instances do not see each
/// other's writes.
#[derive(Debug)]
pub struct FileMedium {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileMedium {
    /// Open `<directory>/<suite>.json`, creating the directory if needed
    pub fn open(directory: impl AsRef<Path>, suite: &str) -> io::Result<Self> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory)?;
        let path = directory.join(format!("{suite}.json"));

        let values: BTreeMap<String, String> = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e),
        };

        info!(path = %path.display(), entries = values.len(), "Opened key-value suite");
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write via a sibling temp file so a crash never leaves a torn suite
    fn flush(&self, values: &BTreeMap<String, String>) -> io::Result<()> {
        let bytes = serde_json::to_vec(values)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), entries = values.len(), "Flushed key-value suite");
        Ok(())
    }

    fn mutate(&self, key: &str, value: Option<String>) -> io::Result<()> {
        let mut values = lock(&self.values);
        let previous = match value {
            Some(value) => values.insert(key.to_string(), value),
            None => values.remove(key),
        };

        if let Err(e) = self.flush(&values) {
            // Keep memory in line with what is on disk
            match previous {
                Some(previous) => values.insert(key.to_string(), previous),
                None => values.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }
}

impl KeyValueMedium for FileMedium {
    fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        lock(&self.values)
            .get(key)
            .map(|encoded| {
                hex::decode(encoded).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            })
            .transpose()
    }

    fn set(&self, key: &str, value: Vec<u8>) -> io::Result<()> {
        self.mutate(key, Some(hex::encode(value)))
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        if !lock(&self.values).contains_key(key) {
            return Ok(());
        }
        self.mutate(key, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_medium_clones_alias() {
        let medium = MemoryMedium::new();
        let alias = medium.clone();

        medium.set("a", b"one".to_vec()).unwrap();
        assert_eq!(alias.get("a").unwrap(), Some(b"one".to_vec()));

        alias.remove("a").unwrap();
        assert_eq!(medium.get("a").unwrap(), None);
        assert!(medium.remove("a").is_ok());
    }

    #[test]
    fn test_file_medium_persists_across_opens() {
        let dir = tempdir().unwrap();
        {
            let medium = FileMedium::open(dir.path(), "prefs").unwrap();
            medium.set("greeting", b"hello".to_vec()).unwrap();
            medium.set("bye", b"later".to_vec()).unwrap();
            medium.remove("bye").unwrap();
        }

        let reopened = FileMedium::open(dir.path(), "prefs").unwrap();
        assert_eq!(reopened.get("greeting").unwrap(), Some(b"hello".to_vec()));
        assert_eq!(reopened.get("bye").unwrap(), None);
        assert!(reopened.path().ends_with("prefs.json"));
    }

    #[test]
    fn test_file_medium_stores_hex() {
        let dir = tempdir().unwrap();
        let medium = FileMedium::open(dir.path(), "prefs").unwrap();
        medium.set("k", vec![0xde, 0xad]).unwrap();

        let raw = fs::read_to_string(medium.path()).unwrap();
        assert_eq!(raw, r#"{"k":"dead"}"#);
    }

    #[test]
    fn test_file_medium_rejects_corrupt_suite() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("prefs.json"), b"not json").unwrap();

        let err = FileMedium::open(dir.path(), "prefs").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_file_medium_remove_absent_does_not_write() {
        let dir = tempdir().unwrap();
        let medium = FileMedium::open(dir.path(), "prefs").unwrap();
        medium.remove("missing").unwrap();
        assert!(!medium.path().exists());
    }
}

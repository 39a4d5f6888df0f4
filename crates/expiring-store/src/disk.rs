//! One-file-per-object durable store

use crate::clock::{Clock, SystemClock};
use crate::codec::{Codec, JsonCodec};
use crate::envelope::Envelope;
use crate::error::{Result, StoreError};
use crate::identity::Identifiable;
use crate::store::ExpiringStore;
use crate::time_spec::TimeSpec;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Stores each object as its own file under `<root>/<store_name>/`.
///
/// The file for key `k` is `<store_name>-<k>`. Listing the directory is the
/// only enumeration, and every listing deletes the expired files it reads.
pub struct DiskStore<T, C = JsonCodec> {
    directory: PathBuf,
    store_name: String,
    expiry: TimeSpec,
    codec: C,
    clock: Arc<dyn Clock>,
    _object: PhantomData<fn() -> T>,
}

impl<T> DiskStore<T, JsonCodec>
where
    T: Identifiable + Serialize + DeserializeOwned,
{
    /// Create a store rooted at `root`. Nothing touches the disk until
    /// `init` or the first write.
    pub fn new(root: impl AsRef<Path>, store_name: &str, expiry: TimeSpec) -> Self {
        Self {
            directory: root.as_ref().join(store_name),
            store_name: store_name.to_string(),
            expiry,
            codec: JsonCodec::new(),
            clock: Arc::new(SystemClock),
            _object: PhantomData,
        }
    }
}

impl<T, C> DiskStore<T, C>
where
    T: Identifiable + Serialize + DeserializeOwned,
    C: Codec,
{
    /// Use `clock` instead of the wall clock
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Encode envelopes with `codec` instead of compact JSON
    pub fn with_codec<D: Codec>(self, codec: D) -> DiskStore<T, D> {
        DiskStore {
            directory: self.directory,
            store_name: self.store_name,
            expiry: self.expiry,
            codec,
            clock: self.clock,
            _object: PhantomData,
        }
    }

    /// Ensure the store directory exists and clear out anything already expired
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.directory).map_err(StoreError::MediumUnwritable)?;
        let purged = self.delete_expired()?;
        info!(directory = ?self.directory, purged, "Disk store initialized");
        Ok(())
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_name(&self, key: &T::Id) -> String {
        format!("{}-{}", self.store_name, key)
    }

    fn path_for(&self, key: &T::Id) -> PathBuf {
        self.directory.join(self.file_name(key))
    }

    fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        match fs::write(path, bytes) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(&self.directory).map_err(StoreError::MediumUnwritable)?;
                debug!(directory = ?self.directory, "Created store directory");
                fs::write(path, bytes).map_err(StoreError::MediumUnwritable)
            }
            other => other.map_err(StoreError::MediumUnwritable),
        }
    }

    /// `None` when there is no file at `path`
    fn read_envelope(&self, path: &Path) -> Result<Option<Envelope<T>>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::MediumUnreadable(e)),
        };
        Envelope::decode(&self.codec, &bytes).map(Some)
    }

    /// Every regular file in the store directory
    fn object_files(&self) -> Result<Vec<PathBuf>> {
        let dir = match fs::read_dir(&self.directory) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::MediumUnreadable(e)),
        };

        let mut files = Vec::new();
        for entry in dir {
            let entry = entry.map_err(StoreError::MediumUnreadable)?;
            let file_type = entry.file_type().map_err(StoreError::MediumUnreadable)?;
            if file_type.is_file() {
                files.push(entry.path());
            }
        }
        Ok(files)
    }

    /// Read every object file, deleting the expired ones. Returns the live
    /// envelopes and how many files were purged.
    fn sweep(&self) -> Result<(Vec<Envelope<T>>, usize)> {
        let now = self.clock.now();
        let mut live = Vec::new();
        let mut purged = 0;

        for path in self.object_files()? {
            // Gone between listing and reading
            let Some(envelope) = self.read_envelope(&path)? else {
                continue;
            };

            if envelope.is_expired_at(now) {
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(StoreError::MediumUnwritable(e)),
                }
                purged += 1;
                debug!(key = %envelope.key(), "Purged expired object from disk");
            } else {
                live.push(envelope);
            }
        }

        Ok((live, purged))
    }
}

impl<T, C> ExpiringStore<T> for DiskStore<T, C>
where
    T: Identifiable + Serialize + DeserializeOwned,
    C: Codec,
{
    fn put(&self, object: T) -> Result<()> {
        let now = self.clock.now();
        let envelope = Envelope::new(object, now, self.expiry.future_from(now));
        let bytes = self
            .codec
            .encode(&envelope)
            .map_err(StoreError::EncodingFailed)?;

        let path = self.path_for(envelope.key());
        self.write_file(&path, &bytes)?;
        debug!(key = %envelope.key(), size = bytes.len(), "Stored object on disk");
        Ok(())
    }

    fn get(&self, key: &T::Id) -> Result<Option<T>> {
        let Some(envelope) = self.read_envelope(&self.path_for(key))? else {
            return Ok(None);
        };
        if envelope.is_expired_at(self.clock.now()) {
            return Ok(None);
        }
        Ok(Some(envelope.into_object()))
    }

    fn entries(&self) -> Result<Vec<Envelope<T>>> {
        self.sweep().map(|(live, _)| live)
    }

    fn count(&self) -> usize {
        match self.sweep() {
            Ok((live, _)) => live.len(),
            Err(err) => {
                warn!(directory = ?self.directory, error = %err, "Failed to list disk store");
                0
            }
        }
    }

    /// Fails with `NotFound` when no file exists for `key`
    fn delete(&self, key: &T::Id) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => {
                debug!(key = %key, "Deleted object from disk");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(self.file_name(key)))
            }
            Err(e) => Err(StoreError::MediumUnwritable(e)),
        }
    }

    fn delete_all(&self) -> Result<()> {
        let files = self.object_files()?;
        for path in &files {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::MediumUnwritable(e)),
            }
        }
        info!(directory = ?self.directory, removed = files.len(), "Cleared disk store");
        Ok(())
    }

    fn delete_expired(&self) -> Result<usize> {
        let (_, purged) = self.sweep()?;
        if purged > 0 {
            info!(directory = ?self.directory, purged, "Swept expired objects from disk");
        }
        Ok(purged)
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

//! Key-indexed store over a flat key-value medium

use crate::clock::{Clock, SystemClock};
use crate::codec::{Codec, JsonCodec};
use crate::envelope::Envelope;
use crate::error::{Result, StoreError};
use crate::identity::Identifiable;
use crate::medium::KeyValueMedium;
use crate::store::{lock, ExpiringStore};
use crate::time_spec::TimeSpec;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Stores objects in a medium that cannot list its own keys.
///
/// Each object lives under the composite key `<store_name>-<id>`. The set of
/// composite keys is itself persisted in the medium under
/// `<store_name>.keys` and rewritten after every insertion or removal, so
/// enumeration survives restarts. Stores given the same medium and name see
/// the same objects.
pub struct IndexedStore<T, M, C = JsonCodec> {
    medium: M,
    store_name: String,
    index_key: String,
    /// Serialises read-modify-write cycles on the persisted index
    index_lock: Mutex<()>,
    expiry: TimeSpec,
    codec: C,
    clock: Arc<dyn Clock>,
    _object: PhantomData<fn() -> T>,
}

impl<T, M> IndexedStore<T, M, JsonCodec>
where
    T: Identifiable + Serialize + DeserializeOwned,
    M: KeyValueMedium,
{
    pub fn new(medium: M, store_name: &str, expiry: TimeSpec) -> Self {
        Self {
            medium,
            store_name: store_name.to_string(),
            index_key: format!("{store_name}.keys"),
            index_lock: Mutex::new(()),
            expiry,
            codec: JsonCodec::new(),
            clock: Arc::new(SystemClock),
            _object: PhantomData,
        }
    }
}

impl<T, M, C> IndexedStore<T, M, C>
where
    T: Identifiable + Serialize + DeserializeOwned,
    M: KeyValueMedium,
    C: Codec,
{
    /// Use `clock` instead of the wall clock
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Encode envelopes and the index with `codec` instead of compact JSON
    pub fn with_codec<D: Codec>(self, codec: D) -> IndexedStore<T, M, D> {
        IndexedStore {
            medium: self.medium,
            store_name: self.store_name,
            index_key: self.index_key,
            index_lock: self.index_lock,
            expiry: self.expiry,
            codec,
            clock: self.clock,
            _object: PhantomData,
        }
    }

    /// Check the persisted index is readable and purge expired objects
    pub fn init(&self) -> Result<()> {
        let purged = self.delete_expired()?;
        info!(store = %self.store_name, purged, "Key-value store initialized");
        Ok(())
    }

    pub fn medium(&self) -> &M {
        &self.medium
    }

    /// Medium key under which the index is persisted
    pub fn index_key(&self) -> &str {
        &self.index_key
    }

    fn composite_key(&self, key: &T::Id) -> String {
        format!("{}-{}", self.store_name, key)
    }

    fn load_index(&self) -> Result<BTreeSet<String>> {
        match self
            .medium
            .get(&self.index_key)
            .map_err(StoreError::MediumUnreadable)?
        {
            Some(bytes) => self.codec.decode(&bytes).map_err(StoreError::DecodingFailed),
            None => Ok(BTreeSet::new()),
        }
    }

    fn save_index(&self, keys: &BTreeSet<String>) -> Result<()> {
        let bytes = self.codec.encode(keys).map_err(StoreError::EncodingFailed)?;
        self.medium
            .set(&self.index_key, bytes)
            .map_err(StoreError::MediumUnwritable)
    }

    /// Run `f` against a freshly loaded index while holding the index lock.
    ///
    /// The index is reloaded on every call so that stores aliasing the same
    /// medium region never overwrite each other's keys.
    fn with_index<R>(&self, f: impl FnOnce(&mut BTreeSet<String>) -> Result<R>) -> Result<R> {
        let _guard = lock(&self.index_lock);
        let mut keys = self.load_index()?;
        f(&mut keys)
    }

    /// Drop `composite` from the index and persist the result at once
    fn unindex(&self, keys: &mut BTreeSet<String>, composite: &str) -> Result<()> {
        if keys.remove(composite) {
            self.save_index(keys)?;
        }
        Ok(())
    }

    fn read_envelope(&self, composite: &str) -> Result<Option<Envelope<T>>> {
        match self
            .medium
            .get(composite)
            .map_err(StoreError::MediumUnreadable)?
        {
            Some(bytes) => Envelope::decode(&self.codec, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Walk the index, purging expired objects and stale index entries.
    /// Returns the live envelopes and how many expired objects were purged.
    fn sweep(&self) -> Result<(Vec<Envelope<T>>, usize)> {
        let now = self.clock.now();

        self.with_index(|keys| {
            let mut live = Vec::new();
            let mut purged = 0;

            let snapshot: Vec<String> = keys.iter().cloned().collect();
            for composite in snapshot {
                let Some(envelope) = self.read_envelope(&composite)? else {
                    warn!(key = %composite, "Dropping index entry with no stored object");
                    self.unindex(keys, &composite)?;
                    continue;
                };

                if envelope.is_expired_at(now) {
                    self.medium
                        .remove(&composite)
                        .map_err(StoreError::MediumUnwritable)?;
                    self.unindex(keys, &composite)?;
                    purged += 1;
                    debug!(key = %composite, "Purged expired object from key-value medium");
                } else {
                    live.push(envelope);
                }
            }

            Ok((live, purged))
        })
    }
}

impl<T, M, C> ExpiringStore<T> for IndexedStore<T, M, C>
where
    T: Identifiable + Serialize + DeserializeOwned,
    M: KeyValueMedium,
    C: Codec,
{
    fn put(&self, object: T) -> Result<()> {
        let now = self.clock.now();
        let envelope = Envelope::new(object, now, self.expiry.future_from(now));
        let bytes = self
            .codec
            .encode(&envelope)
            .map_err(StoreError::EncodingFailed)?;
        let composite = self.composite_key(envelope.key());

        self.with_index(|keys| {
            // Index before writing so no stored object is ever missing from the index
            let newly_indexed = keys.insert(composite.clone());
            if newly_indexed {
                self.save_index(keys)?;
            }

            if let Err(e) = self.medium.set(&composite, bytes) {
                if newly_indexed {
                    keys.remove(&composite);
                    if let Err(err) = self.save_index(keys) {
                        warn!(key = %composite, error = %err, "Failed to roll back index entry");
                    }
                }
                return Err(StoreError::MediumUnwritable(e));
            }

            debug!(key = %composite, "Stored object in key-value medium");
            Ok(())
        })
    }

    fn get(&self, key: &T::Id) -> Result<Option<T>> {
        let Some(envelope) = self.read_envelope(&self.composite_key(key))? else {
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
                warn!(store = %self.store_name, error = %err, "Failed to enumerate key-value store");
                0
            }
        }
    }

    /// Deleting an absent key succeeds
    fn delete(&self, key: &T::Id) -> Result<()> {
        let composite = self.composite_key(key);
        self.with_index(|keys| {
            self.medium
                .remove(&composite)
                .map_err(StoreError::MediumUnwritable)?;
            self.unindex(keys, &composite)?;
            debug!(key = %composite, "Deleted object from key-value medium");
            Ok(())
        })
    }

    fn delete_all(&self) -> Result<()> {
        self.with_index(|keys| {
            let removed = keys.len();
            for composite in keys.iter() {
                self.medium
                    .remove(composite)
                    .map_err(StoreError::MediumUnwritable)?;
            }
            keys.clear();
            self.save_index(keys)?;
            info!(store = %self.store_name, removed, "Cleared key-value store");
            Ok(())
        })
    }

    fn delete_expired(&self) -> Result<usize> {
        let (_, purged) = self.sweep()?;
        if purged > 0 {
            info!(store = %self.store_name, purged, "Swept expired objects from key-value medium");
        }
        Ok(purged)
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

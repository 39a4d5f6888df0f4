//! The operation set shared by every backend

use crate::envelope::Envelope;
use crate::error::Result;
use crate::identity::Identifiable;
use crate::time_spec::TimeSpec;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// An expiry-aware store of `T` values keyed by `T::Id`.
///
/// Backends supply the raw primitives (`put`, `get`, `entries`, the deletes
/// and a clock); enumeration, range queries and the subscript-style helpers
/// are derived from those and behave identically across backends.
///
/// Expired objects are never returned. When they are physically removed is
/// up to the backend: the file and key-value stores purge whatever expired
/// objects an enumeration walks over, the in-memory store only filters them.
pub trait ExpiringStore<T: Identifiable> {
    /// Store `object` under its own id, overwriting any previous value
    fn put(&self, object: T) -> Result<()>;

    /// The live object stored under `key`, if any
    fn get(&self, key: &T::Id) -> Result<Option<T>>;

    /// Every live envelope, in no particular order
    fn entries(&self) -> Result<Vec<Envelope<T>>>;

    /// Number of live objects. May purge expired objects as a side effect.
    fn count(&self) -> usize;

    /// Remove the object stored under `key`
    fn delete(&self, key: &T::Id) -> Result<()>;

    /// Remove every object in the store
    fn delete_all(&self) -> Result<()>;

    /// Remove every expired object, returning how many were removed
    fn delete_expired(&self) -> Result<usize>;

    /// Current instant according to the store's clock
    fn now(&self) -> DateTime<Utc>;

    /// Store each object in turn. Stops at the first failure, leaving the
    /// objects before it stored.
    fn put_many(&self, objects: Vec<T>) -> Result<()> {
        for object in objects {
            self.put(object)?;
        }
        Ok(())
    }

    /// The live objects among `keys`, in request order. Missing and expired
    /// keys are skipped.
    fn get_many(&self, keys: &[T::Id]) -> Result<Vec<T>> {
        let mut objects = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(object) = self.get(key)? {
                objects.push(object);
            }
        }
        Ok(objects)
    }

    /// Every live object ordered by creation instant, newest first when
    /// `descending` is set
    fn get_all(&self, descending: bool) -> Result<Vec<T>> {
        let mut entries = self.entries()?;
        sort_by_creation(&mut entries, descending);
        Ok(entries.into_iter().map(Envelope::into_object).collect())
    }

    /// Live objects created at or after `span` ago, newest first
    fn stored_in_last(&self, span: TimeSpec) -> Result<Vec<T>> {
        let cutoff = span.past_from(self.now());
        stored_where(self, |created_at| created_at >= cutoff)
    }

    /// Live objects created at or before `span` ago, newest first
    fn stored_before(&self, span: TimeSpec) -> Result<Vec<T>> {
        let cutoff = span.past_from(self.now());
        stored_where(self, |created_at| created_at <= cutoff)
    }

    /// Whether a live object is stored under `key`. Read failures count as
    /// absent.
    fn contains(&self, key: &T::Id) -> bool {
        matches!(self.get(key), Ok(Some(_)))
    }

    /// Negation of `contains`: a key that was never stored also reports as
    /// expired.
    fn is_expired(&self, key: &T::Id) -> bool {
        !self.contains(key)
    }

    /// Remove each key in turn, stopping at the first failure
    fn delete_many(&self, keys: &[T::Id]) -> Result<()> {
        for key in keys {
            self.delete(key)?;
        }
        Ok(())
    }

    /// Subscript-style read: `get` with failures folded into `None`
    fn lookup(&self, key: &T::Id) -> Option<T> {
        match self.get(key) {
            Ok(object) => object,
            Err(err) => {
                debug!(key = %key, error = %err, "Lookup failed, treating as absent");
                None
            }
        }
    }

    /// Subscript-style write. `Some(value)` stores the value under its own
    /// id, `None` deletes `key`. Failures are logged and dropped.
    fn assign(&self, key: &T::Id, value: Option<T>) {
        let outcome = match value {
            Some(object) => self.put(object),
            None => self.delete(key),
        };
        if let Err(err) = outcome {
            debug!(key = %key, error = %err, "Assignment failed, ignoring");
        }
    }
}

fn stored_where<T, S>(store: &S, keep: impl Fn(DateTime<Utc>) -> bool) -> Result<Vec<T>>
where
    T: Identifiable,
    S: ExpiringStore<T> + ?Sized,
{
    let mut entries = store.entries()?;
    entries.retain(|envelope| keep(envelope.created_at()));
    sort_by_creation(&mut entries, true);
    Ok(entries.into_iter().map(Envelope::into_object).collect())
}

/// Order envelopes by creation instant. The sort is stable, so ties keep the
/// order the backend yielded them in.
pub(crate) fn sort_by_creation<T: Identifiable>(entries: &mut [Envelope<T>], descending: bool) {
    if descending {
        entries.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    } else {
        entries.sort_by(|a, b| a.created_at().cmp(&b.created_at()));
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<G>(mutex: &Mutex<G>) -> MutexGuard<'_, G> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

//! Fixtures and scenarios shared by every backend's tests

use crate::clock::ManualClock;
use crate::codec::{Codec, CodecError, JsonCodec};
use crate::error::StoreError;
use crate::identity::Identifiable;
use crate::medium::{KeyValueMedium, MemoryMedium};
use crate::store::{lock, ExpiringStore};
use crate::time_spec::TimeSpec;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: u32,
    pub title: String,
}

impl Post {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            title: format!("Swift Article{id}"),
        }
    }

    pub fn single() -> Self {
        Self {
            id: 0,
            title: "Single post test".to_string(),
        }
    }

    /// Posts 1 through 10
    pub fn batch() -> Vec<Self> {
        (1..=10).map(Self::new).collect()
    }
}

impl Identifiable for Post {
    type Id = u32;

    fn id(&self) -> u32 {
        self.id
    }
}

/// JSON codec that refuses to encode once `allowed` encodes have succeeded
pub struct FailingCodec {
    allowed: AtomicUsize,
}

impl FailingCodec {
    pub fn always() -> Self {
        Self::after(0)
    }

    pub fn after(allowed: usize) -> Self {
        Self {
            allowed: AtomicUsize::new(allowed),
        }
    }
}

impl Codec for FailingCodec {
    fn encode<V: Serialize>(&self, value: &V) -> Result<Vec<u8>, CodecError> {
        let granted = self
            .allowed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match granted {
            Ok(_) => JsonCodec::new().encode(value),
            Err(_) => Err(CodecError::new("encoding refused")),
        }
    }

    fn decode<V: DeserializeOwned>(&self, bytes: &[u8]) -> Result<V, CodecError> {
        JsonCodec::new().decode(bytes)
    }
}

/// In-memory medium whose writes and removals fail for chosen keys
#[derive(Default)]
pub struct FailingMedium {
    inner: MemoryMedium,
    read_only: Mutex<HashSet<String>>,
}

impl FailingMedium {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes_to(&self, key: &str) {
        lock(&self.read_only).insert(key.to_string());
    }

    pub fn heal(&self) {
        lock(&self.read_only).clear();
    }

    fn check(&self, key: &str) -> io::Result<()> {
        if lock(&self.read_only).contains(key) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{key} is read-only"),
            ));
        }
        Ok(())
    }
}

impl KeyValueMedium for FailingMedium {
    fn get(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: Vec<u8>) -> io::Result<()> {
        self.check(key)?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.check(key)?;
        self.inner.remove(key)
    }
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
}

pub fn clock() -> ManualClock {
    ManualClock::new(start())
}

fn ids(posts: &[Post]) -> Vec<u32> {
    posts.iter().map(|p| p.id).collect()
}

pub fn round_trip<S: ExpiringStore<Post>>(store: &S) {
    store.put(Post::single()).unwrap();
    assert_eq!(store.get(&0).unwrap(), Some(Post::single()));
    assert_eq!(store.count(), 1);
    assert!(store.contains(&0));
}

pub fn overwrite_replaces<S: ExpiringStore<Post>>(store: &S) {
    store.put(Post::new(1)).unwrap();
    store
        .put(Post {
            id: 1,
            title: "Edited".to_string(),
        })
        .unwrap();

    assert_eq!(store.get(&1).unwrap().unwrap().title, "Edited");
    assert_eq!(store.count(), 1);
}

pub fn put_many_and_fetch<S: ExpiringStore<Post>>(store: &S) {
    store.put_many(Post::batch()).unwrap();
    assert_eq!(store.count(), 10);
    assert!(store.contains(&4));
    assert_eq!(
        store.get(&3).unwrap().map(|p| p.title),
        Some("Swift Article3".to_string())
    );
}

pub fn get_many_skips_missing<S: ExpiringStore<Post>>(store: &S) {
    store.put_many(Post::batch()).unwrap();
    let found = store.get_many(&[3, 42, 2]).unwrap();
    assert_eq!(ids(&found), vec![3, 2]);
}

/// Expects a store whose clock advances one second between puts
pub fn get_all_orders_by_creation<S: ExpiringStore<Post>>(store: &S, clock: &ManualClock) {
    for post in Post::batch() {
        store.put(post).unwrap();
        clock.advance(Duration::seconds(1));
    }

    let newest_first = store.get_all(true).unwrap();
    assert_eq!(ids(&newest_first), (1..=10).rev().collect::<Vec<_>>());

    let oldest_first = store.get_all(false).unwrap();
    assert_eq!(ids(&oldest_first), (1..=10).collect::<Vec<_>>());
}

/// Expects a store configured with an already elapsed expiry
pub fn already_expired<S: ExpiringStore<Post>>(store: &S) {
    store.put_many(Post::batch()).unwrap();

    assert_eq!(store.get(&1).unwrap(), None);
    assert!(!store.contains(&1));
    assert!(store.is_expired(&1));
    assert!(store.get_all(true).unwrap().is_empty());
    assert_eq!(store.count(), 0);
}

/// Expects a store with an expiry comfortably longer than five minutes
pub fn range_queries<S: ExpiringStore<Post>>(store: &S, clock: &ManualClock) {
    store.put_many(Post::batch()).unwrap();
    clock.advance(Duration::minutes(4));

    assert_eq!(store.stored_in_last(TimeSpec::Minutes(3.0)).unwrap().len(), 0);
    assert_eq!(store.stored_before(TimeSpec::Minutes(3.0)).unwrap().len(), 10);

    assert_eq!(store.stored_in_last(TimeSpec::Minutes(5.0)).unwrap().len(), 10);
    assert_eq!(store.stored_before(TimeSpec::Minutes(5.0)).unwrap().len(), 0);
}

/// Both range bounds include an object created exactly at the cut-off
pub fn range_bounds_are_inclusive<S: ExpiringStore<Post>>(store: &S, clock: &ManualClock) {
    store.put(Post::new(1)).unwrap();
    clock.advance(Duration::minutes(3));

    assert_eq!(ids(&store.stored_in_last(TimeSpec::Minutes(3.0)).unwrap()), vec![1]);
    assert_eq!(ids(&store.stored_before(TimeSpec::Minutes(3.0)).unwrap()), vec![1]);
}

/// Expects a store with a four minute expiry
pub fn sweep_removes_expired<S: ExpiringStore<Post>>(store: &S, clock: &ManualClock) {
    store.put_many(Post::batch()).unwrap();
    clock.advance(Duration::minutes(2));
    store.put(Post::new(11)).unwrap();
    clock.advance(Duration::minutes(3));

    assert_eq!(store.delete_expired().unwrap(), 10);

    let live = store.get_all(true).unwrap();
    assert_eq!(ids(&live), vec![11]);
    assert_eq!(store.count(), 1);
    let reachable = (1..=11).filter(|id| store.contains(id)).count();
    assert_eq!(store.count(), reachable);

    assert_eq!(store.delete_expired().unwrap(), 0);
}

pub fn delete_one_and_many<S: ExpiringStore<Post>>(store: &S) {
    store.put_many(Post::batch()).unwrap();

    store.delete(&1).unwrap();
    assert_eq!(store.lookup(&1), None);

    store.delete_many(&[2, 3, 4]).unwrap();
    assert_eq!(store.count(), 6);
    assert_eq!(store.lookup(&3), None);
    assert!(store.contains(&5));
}

/// Deleting twice leaves the store exactly as the first delete did,
/// whether or not the second call reports an error
pub fn delete_is_idempotent<S: ExpiringStore<Post>>(store: &S) {
    store.put_many(Post::batch()).unwrap();

    store.delete(&5).unwrap();
    let after_first = store.get_all(true).unwrap();

    let _ = store.delete(&5);
    let after_second = store.get_all(true).unwrap();

    assert_eq!(after_first, after_second);
    assert_eq!(after_second.len(), 9);
}

pub fn delete_all_empties<S: ExpiringStore<Post>>(store: &S) {
    store.put_many(Post::batch()).unwrap();
    assert_eq!(store.count(), 10);

    store.delete_all().unwrap();
    assert_eq!(store.count(), 0);
    assert!(store.get_all(true).unwrap().is_empty());

    store.put(Post::new(3)).unwrap();
    assert_eq!(store.count(), 1);
}

pub fn subscript_matches_named_operations<S: ExpiringStore<Post>>(store: &S) {
    store.assign(&7, Some(Post::new(7)));
    assert_eq!(store.get(&7).unwrap(), Some(Post::new(7)));
    assert_eq!(store.lookup(&7), Some(Post::new(7)));

    store.assign(&7, None);
    assert!(!store.contains(&7));
    assert_eq!(store.lookup(&7), None);

    // Clearing a key that was never stored is silently accepted
    store.assign(&99, None);
}

/// Expects a store whose fourth write fails. Returns that failure.
pub fn put_many_fails_fast<S: ExpiringStore<Post>>(store: &S) -> StoreError {
    let err = store.put_many(Post::batch()).unwrap_err();

    assert_eq!(store.count(), 3);
    assert_eq!(store.get_all(false).unwrap().len(), 3);
    for id in 1..=3 {
        assert!(store.contains(&id));
    }
    for id in 4..=10 {
        assert!(!store.contains(&id));
    }
    err
}

/// Expects a store where every write fails
pub fn failed_writes_leave_nothing<S: ExpiringStore<Post>>(store: &S) -> StoreError {
    let err = store.put(Post::new(1)).unwrap_err();

    // Subscript writes swallow the same failure
    store.assign(&2, Some(Post::new(2)));

    assert_eq!(store.get(&1).unwrap(), None);
    assert_eq!(store.lookup(&2), None);
    assert_eq!(store.count(), 0);
    assert!(store.get_all(true).unwrap().is_empty());
    err
}

//! Expiry-aware object stores
//!
//! One contract, [`ExpiringStore`], implemented by three backends:
//! a bounded in-memory cache ([`VolatileStore`]), one file per object
//! ([`DiskStore`]) and a key-indexed store over a flat key-value medium that
//! cannot list its own keys ([`IndexedStore`]). Every object is wrapped in an
//! [`Envelope`] recording when it was stored and when it expires; expired
//! objects are never returned and are purged lazily.

mod clock;
mod codec;
mod disk;
mod envelope;
mod error;
mod identity;
mod indexed;
mod medium;
mod store;
mod time_spec;
mod volatile;

#[cfg(test)]
mod test_support;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{Codec, CodecError, JsonCodec};
pub use disk::DiskStore;
pub use envelope::Envelope;
pub use error::{Result, StoreError};
pub use identity::Identifiable;
pub use indexed::IndexedStore;
pub use medium::{FileMedium, KeyValueMedium, MemoryMedium};
pub use store::ExpiringStore;
pub use time_spec::{never_expires, ParseTimeSpecError, TimeSpec};
pub use volatile::{VolatileStore, DEFAULT_MAX_OBJECTS};

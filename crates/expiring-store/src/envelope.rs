//! Stored unit wrapping an object with its key and lifetime

use crate::codec::{Codec, CodecError};
use crate::error::{Result, StoreError};
use crate::identity::Identifiable;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// An object together with its key, creation instant and expiry instant.
///
/// Built fresh on every write and never mutated afterwards; an update is
/// simply a new envelope overwriting the old one. The key always equals the
/// object's id: `new` derives it, and decoding rejects envelopes where the
/// two disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize, T::Id: Serialize",
    deserialize = "T: Deserialize<'de>, T::Id: Deserialize<'de>"
))]
pub struct Envelope<T: Identifiable> {
    object: T,
    key: T::Id,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl<T: Identifiable> Envelope<T> {
    /// Wrap `object`, taking the key from the object itself
    pub fn new(object: T, created_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        let key = object.id();
        Self {
            object,
            key,
            created_at,
            expires_at,
        }
    }

    /// True once `now` is strictly past the expiry instant
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// `is_expired_at` against the wall clock
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn object(&self) -> &T {
        &self.object
    }

    pub fn key(&self) -> &T::Id {
        &self.key
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn into_object(self) -> T {
        self.object
    }
}

impl<T> Envelope<T>
where
    T: Identifiable + DeserializeOwned,
{
    /// Decode an envelope read back from a medium
    pub(crate) fn decode<C: Codec>(codec: &C, bytes: &[u8]) -> Result<Self> {
        let envelope: Self = codec.decode(bytes).map_err(StoreError::DecodingFailed)?;
        let id = envelope.object.id();
        if id != envelope.key {
            return Err(StoreError::DecodingFailed(CodecError::new(format!(
                "envelope key {} does not match object id {}",
                envelope.key, id
            ))));
        }
        Ok(envelope)
    }
}

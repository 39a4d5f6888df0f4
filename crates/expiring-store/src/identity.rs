//! Object identity

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// An object that carries a stable unique key.
///
/// The key's `Display` form is what the file and key-value backends use to
/// address the object, so two distinct ids must not render to the same text.
pub trait Identifiable {
    type Id: Clone
        + Eq
        + Hash
        + Debug
        + Display
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    fn id(&self) -> Self::Id;
}

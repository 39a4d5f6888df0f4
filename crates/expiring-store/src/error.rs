//! Error types for expiring stores

use crate::codec::CodecError;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum StoreError {
    /// Removal of a key the medium does not hold
    NotFound(String),
    EncodingFailed(CodecError),
    DecodingFailed(CodecError),
    MediumUnwritable(io::Error),
    MediumUnreadable(io::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound(key) => write!(f, "Object not found: {}", key),
            StoreError::EncodingFailed(err) => write!(f, "Failed to encode object: {}", err),
            StoreError::DecodingFailed(err) => write!(f, "Failed to decode object: {}", err),
            StoreError::MediumUnwritable(err) => write!(f, "Storage medium unwritable: {}", err),
            StoreError::MediumUnreadable(err) => write!(f, "Storage medium unreadable: {}", err),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::NotFound(_) => None,
            StoreError::EncodingFailed(err) | StoreError::DecodingFailed(err) => Some(err),
            StoreError::MediumUnwritable(err) | StoreError::MediumUnreadable(err) => Some(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

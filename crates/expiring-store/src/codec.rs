//! Serialization boundary between stores and their raw media

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// Failure reported by a codec
#[derive(Debug)]
pub struct CodecError(Box<dyn std::error::Error + Send + Sync>);

impl CodecError {
    pub fn new(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(err.into())
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err)
    }
}

/// Turns values into bytes and back.
///
/// Stores encode envelopes through this, and the key-value store also
/// encodes its key index with it.
pub trait Codec: Send + Sync {
    fn encode<V: Serialize>(&self, value: &V) -> Result<Vec<u8>, CodecError>;

    fn decode<V: DeserializeOwned>(&self, bytes: &[u8]) -> Result<V, CodecError>;
}

/// JSON codec backed by `serde_json`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit indented JSON, handy when the files are meant to be read by people
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Codec for JsonCodec {
    fn encode<V: Serialize>(&self, value: &V) -> Result<Vec<u8>, CodecError> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };
        Ok(bytes)
    }

    fn decode<V: DeserializeOwned>(&self, bytes: &[u8]) -> Result<V, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_json_codec_round_trips_index() {
        let codec = JsonCodec::new();
        let keys: BTreeSet<String> = ["posts-1".to_string(), "posts-2".to_string()].into();

        let bytes = codec.encode(&keys).unwrap();
        assert_eq!(bytes, br#"["posts-1","posts-2"]"#);

        let decoded: BTreeSet<String> = codec.decode(&bytes).unwrap();
        assert_eq!(decoded, keys);
    }

    #[test]
    fn test_pretty_codec_indents() {
        let bytes = JsonCodec::pretty().encode(&vec![1, 2]).unwrap();
        assert!(String::from_utf8(bytes).unwrap().contains('\n'));
    }

    #[test]
    fn test_decode_failure_keeps_source() {
        let err = JsonCodec::new().decode::<Vec<u32>>(b"not json").unwrap_err();
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.to_string().is_empty());
    }
}

//! # Codable descriptors
//!
//! A [`Descriptor`] is a serialized payload plus memory-region metadata,
//! the unit the data plane moves between executors. Any `serde`-encodable
//! record type is [`Codable`]; the default wire encoding is JSON, chosen by
//! the transport-facing helpers here so callers never touch the serializer
//! directly.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Marker for record types that can cross the data plane.
pub trait Codable: Serialize + DeserializeOwned + Send + 'static {}

impl<T: Serialize + DeserializeOwned + Send + 'static> Codable for T {}

/// A registered memory region rider for transports that support remote
/// access. The loopback transport carries payload bytes only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRegion {
    /// Base address of the region in the owning process.
    pub addr: u64,
    /// Region length in bytes.
    pub len: u64,
    /// Opaque remote-access key.
    pub remote_key: Bytes,
}

/// A serialized payload with its memory-region metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// The encoded payload.
    pub payload: Bytes,
    /// Memory regions referenced by the payload.
    pub regions: Vec<MemoryRegion>,
}

impl Descriptor {
    /// Creates a descriptor from raw payload bytes.
    #[must_use]
    pub fn from_payload(payload: Bytes) -> Self {
        Self {
            payload,
            regions: Vec::new(),
        }
    }

    /// Payload size in bytes.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}

/// Encodes a value into a descriptor.
///
/// # Errors
///
/// Returns [`CodableError::Encode`] if serialization fails.
pub fn encode<T: Codable>(value: &T) -> Result<Descriptor, CodableError> {
    let payload = serde_json::to_vec(value).map_err(CodableError::Encode)?;
    Ok(Descriptor::from_payload(Bytes::from(payload)))
}

/// Decodes a descriptor back into a value.
///
/// # Errors
///
/// Returns [`CodableError::Decode`] if the payload does not deserialize
/// into `T`.
pub fn decode<T: Codable>(descriptor: &Descriptor) -> Result<T, CodableError> {
    serde_json::from_slice(&descriptor.payload).map_err(CodableError::Decode)
}

/// Descriptor encode/decode failures.
#[derive(Debug, thiserror::Error)]
pub enum CodableError {
    /// The value could not be serialized.
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// The payload could not be deserialized.
    #[error("failed to decode payload: {0}")]
    Decode(#[source] serde_json::Error),
}

//! Versioned envelope for persisted records.
//!
//! Every value written through a [`KeyValueStore`](crate::store::KeyValueStore)
//! is wrapped as `{"version": N, "payload": ...}` so the stored format can
//! evolve. Readers check the version before decoding the payload.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The envelope version written by this build.
pub const CURRENT_VERSION: u32 = 1;

/// A versioned wrapper around a serialized payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub version: u32,
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Wraps a payload with the current version.
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self {
            version: CURRENT_VERSION,
            payload,
        }
    }

    #[must_use]
    pub fn into_payload(self) -> T {
        self.payload
    }
}

impl<T: Serialize> Envelope<T> {
    /// Encodes the envelope as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(self)
    }
}

/// Envelope whose payload has not been decoded yet.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    version: u32,
    payload: serde_json::Value,
}

/// Reasons a stored envelope cannot be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The bytes are not a well-formed envelope or payload.
    Malformed { reason: String },
    /// The envelope was written by a newer build.
    UnsupportedVersion { found: u32, supported: u32 },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { reason } => write!(f, "malformed envelope: {reason}"),
            Self::UnsupportedVersion { found, supported } => {
                write!(f, "envelope version {found} is newer than supported {supported}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decodes an enveloped payload, rejecting versions newer than this build.
///
/// # Errors
///
/// Returns [`DecodeError`] if the bytes are malformed or too new.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<Envelope<T>, DecodeError> {
    let raw: RawEnvelope = serde_json::from_slice(bytes).map_err(|e| DecodeError::Malformed {
        reason: e.to_string(),
    })?;
    if raw.version > CURRENT_VERSION {
        return Err(DecodeError::UnsupportedVersion {
            found: raw.version,
            supported: CURRENT_VERSION,
        });
    }
    let payload = serde_json::from_value(raw.payload).map_err(|e| DecodeError::Malformed {
        reason: e.to_string(),
    })?;
    Ok(Envelope {
        version: raw.version,
        payload,
    })
}

//! Relay payloads and their fingerprints

use std::fmt::{self, Display};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Opaque data relayed through the mesh
///
/// Cloning is cheap (reference-counted buffer), so the same payload can be
/// journaled locally and sent downstream without copying.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Payload(Bytes);

impl Payload {
    /// Wrap raw bytes as a payload
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    /// The payload bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The underlying buffer
    pub fn bytes(&self) -> &Bytes {
        &self.0
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check for an empty payload
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compute the dedup fingerprint of this payload
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.0)
    }

    /// Short, lossy text rendering for logs
    pub fn preview(&self, max: usize) -> String {
        let text = String::from_utf8_lossy(&self.0);
        if text.chars().count() <= max {
            text.into_owned()
        } else {
            let mut cut: String = text.chars().take(max).collect();
            cut.push('…');
            cut
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Self(Bytes::from(data))
    }
}

impl From<&'static str> for Payload {
    fn from(data: &'static str) -> Self {
        Self(Bytes::from_static(data.as_bytes()))
    }
}

impl From<String> for Payload {
    fn from(data: String) -> Self {
        Self(Bytes::from(data))
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Self(data)
    }
}

/// Fixed-size dedup key: BLAKE3 digest of the payload bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint arbitrary bytes
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First 8 bytes as hex, for logs
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

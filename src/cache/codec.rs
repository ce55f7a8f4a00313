//! Value Codecs
//!
//! Turns cached values into bytes for the shared tier and back.
//!
//! - **Compact**: MessagePack (`rmp-serde`), small and fast
//! - **Readable**: JSON (`serde_json`), inspectable with `redis-cli`
//!
//! The codec is chosen at configuration time. Switching it on a live shared
//! tier makes previously written entries undecodable; those reads surface as
//! misses and the entries age out through their remote TTL.
//!
//! # Example
//!
//! ```
//! use tiercache::cache::CodecKind;
//!
//! let codec = CodecKind::Readable;
//! let bytes = codec.encode(&vec![1u32, 2, 3]).unwrap();
//! assert_eq!(bytes.as_ref(), b"[1,2,3]");
//!
//! let decoded: Vec<u32> = codec.decode(&bytes).unwrap();
//! assert_eq!(decoded, vec![1, 2, 3]);
//! ```

use std::str::FromStr;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Supported codecs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    /// MessagePack binary encoding
    #[default]
    Compact,
    /// JSON text encoding
    Readable,
}

impl CodecKind {
    /// Get configuration name
    pub fn name(&self) -> &'static str {
        match self {
            CodecKind::Compact => "compact",
            CodecKind::Readable => "readable",
        }
    }

    /// Encode a value
    pub fn encode<V: Serialize + ?Sized>(&self, value: &V) -> Result<Bytes> {
        let encoded = match self {
            CodecKind::Compact => {
                rmp_serde::to_vec_named(value).map_err(|e| self.error(e.to_string()))?
            }
            CodecKind::Readable => {
                serde_json::to_vec(value).map_err(|e| self.error(e.to_string()))?
            }
        };
        Ok(Bytes::from(encoded))
    }

    /// Decode a value, failing with [`Error::Codec`] on malformed input
    pub fn decode<V: DeserializeOwned>(&self, data: &[u8]) -> Result<V> {
        match self {
            CodecKind::Compact => {
                rmp_serde::from_slice(data).map_err(|e| self.error(e.to_string()))
            }
            CodecKind::Readable => {
                serde_json::from_slice(data).map_err(|e| self.error(e.to_string()))
            }
        }
    }

    fn error(&self, reason: String) -> Error {
        Error::Codec {
            codec: self.name().to_string(),
            reason,
        }
    }
}

impl std::fmt::Display for CodecKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CodecKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "compact" | "binary" | "msgpack" => Ok(CodecKind::Compact),
            "readable" | "json" => Ok(CodecKind::Readable),
            other => Err(Error::config(format!(
                "unknown codec '{}', expected 'compact' or 'readable'",
                other
            ))),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Pluggable byte codecs for persisted snapshots.
//!
//! Snapshots written through [`crate::storage::KvStorage`] pass through a
//! [`Codec`] first. [`IdentityCodec`] is the default. With the `compression`
//! feature, [`ZstdCodec`] compresses with zstd and detects the zstd magic
//! bytes on decode, so snapshots written before compression was enabled
//! still load.
//!
//! ```toml
//! [dependencies]
//! offline-sync = { version = "0.1", features = ["compression"] }
//! ```
//!
//! # Example
//!
//! ```
//! use offline_sync::codec::{Codec, IdentityCodec};
//!
//! let codec = IdentityCodec;
//! let encoded = codec.encode(b"{\"a\":1}").unwrap();
//! assert_eq!(codec.decode(&encoded).unwrap(), b"{\"a\":1}");
//! ```

use std::sync::Arc;

/// Zstd magic bytes (little-endian): 0xFD2FB528
#[cfg(feature = "compression")]
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Default compression level (3 is a good balance of speed/ratio)
#[cfg(feature = "compression")]
const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Codec error types
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    EncodeFailed(String),

    #[error("decode failed: {0}")]
    DecodeFailed(String),
}

/// Byte-level transform applied to persisted snapshots.
pub trait Codec: Send + Sync {
    fn name(&self) -> &'static str;
    fn encode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError>;
}

pub type SharedCodec = Arc<dyn Codec>;

/// Pass-through codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityCodec;

impl Codec for IdentityCodec {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn encode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(bytes.to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(bytes.to_vec())
    }
}

/// Check if data is zstd-compressed by checking magic bytes.
#[inline]
#[must_use]
pub fn is_compressed(data: &[u8]) -> bool {
    #[cfg(feature = "compression")]
    {
        data.len() >= 4 && data[..4] == ZSTD_MAGIC
    }
    #[cfg(not(feature = "compression"))]
    {
        let _ = data;
        false
    }
}

/// Zstd codec.
#[cfg(feature = "compression")]
#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    pub level: i32,
}

#[cfg(feature = "compression")]
impl Default for ZstdCodec {
    fn default() -> Self {
        Self {
            level: DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

#[cfg(feature = "compression")]
impl Codec for ZstdCodec {
    fn name(&self) -> &'static str {
        "zstd"
    }

    fn encode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        zstd::encode_all(bytes, self.level).map_err(|e| CodecError::EncodeFailed(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        if is_compressed(bytes) {
            zstd::decode_all(bytes).map_err(|e| CodecError::DecodeFailed(e.to_string()))
        } else {
            // Plain snapshot written before compression was enabled
            Ok(bytes.to_vec())
        }
    }
}

/// Codec ratio for a single snapshot.
#[derive(Debug, Clone, Copy)]
pub struct CodecStats {
    pub original_bytes: usize,
    pub encoded_bytes: usize,
    /// Space saved as a fraction (0.0 - 1.0, negative if the codec grew the data)
    pub savings: f64,
}

impl CodecStats {
    #[must_use]
    pub fn new(original_bytes: usize, encoded_bytes: usize) -> Self {
        let savings = if original_bytes > 0 {
            1.0 - (encoded_bytes as f64 / original_bytes as f64)
        } else {
            0.0
        };
        Self {
            original_bytes,
            encoded_bytes,
            savings,
        }
    }
}

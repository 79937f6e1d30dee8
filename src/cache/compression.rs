//! Payload Compression
//!
//! LZ4 block compression with a zlib fallback, plus the framing used on the
//! L2 wire: compressed payloads carry the `COMPRESSED:` prefix.
//!
//! # Example
//!
//! ```
//! use tiercache::cache::compression::CompressionManager;
//!
//! let manager = CompressionManager::new(true, 16);
//!
//! let data = b"Hello, this is test data that should compress well! Hello, this is test data.";
//! let (framed, compressed) = manager.encode(data);
//! assert!(compressed);
//!
//! let decoded = manager.decode(&framed);
//! assert_eq!(decoded.as_ref(), data);
//! ```

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Prefix marking a compressed L2 payload
pub const COMPRESSED_MARKER: &[u8] = b"COMPRESSED:";

// =============================================================================
// Compression Algorithm
// =============================================================================

/// Supported compression algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionAlgorithm {
    /// No compression
    None,
    /// LZ4 - fast block compression
    #[default]
    Lz4,
    /// zlib - general-purpose fallback
    Zlib,
}

impl CompressionAlgorithm {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Lz4 => "lz4",
            CompressionAlgorithm::Zlib => "zlib",
        }
    }
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Compressor Trait
// =============================================================================

/// Trait for compression implementations
pub trait Compressor: Send + Sync {
    /// Get the algorithm identifier
    fn algorithm(&self) -> CompressionAlgorithm;

    /// Compress data
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress data
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

// =============================================================================
// LZ4 Compressor
// =============================================================================

/// LZ4 compressor. Output carries the uncompressed size as a 4-byte
/// little-endian prefix.
#[derive(Debug, Default)]
pub struct Lz4Compressor;

impl Lz4Compressor {
    /// Largest output a valid block of `input_len` bytes can expand to
    fn max_decompressed_len(input_len: usize) -> usize {
        input_len.saturating_mul(255).saturating_add(16)
    }
}

impl Compressor for Lz4Compressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Lz4
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::compress(data, None, true).map_err(|e| Error::CompressionFailed {
            algorithm: "LZ4".into(),
            reason: e.to_string(),
        })
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let failed = |reason: String| Error::DecompressionFailed {
            algorithm: "LZ4".into(),
            reason,
        };

        // Reject nonsense size prefixes before lz4 allocates for them
        let header: [u8; 4] = data
            .get(..4)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(|| failed("missing size prefix".into()))?;
        let declared = i32::from_le_bytes(header);
        if declared <= 0 || declared as usize > Self::max_decompressed_len(data.len() - 4) {
            return Err(failed(format!("implausible size prefix {}", declared)));
        }

        lz4::block::decompress(data, None).map_err(|e| failed(e.to_string()))
    }
}

// =============================================================================
// Zlib Compressor
// =============================================================================

/// zlib compressor
#[derive(Debug)]
pub struct ZlibCompressor {
    level: Compression,
}

impl ZlibCompressor {
    pub fn new() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl Default for ZlibCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for ZlibCompressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Zlib
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), self.level);
        encoder
            .write_all(data)
            .and_then(|_| encoder.finish())
            .map_err(|e| Error::CompressionFailed {
                algorithm: "zlib".into(),
                reason: e.to_string(),
            })
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() * 2);
        ZlibDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| Error::DecompressionFailed {
                algorithm: "zlib".into(),
                reason: e.to_string(),
            })?;
        Ok(out)
    }
}

// =============================================================================
// Compression Manager
// =============================================================================

/// Threshold-gated compression with fallback, and L2 framing
pub struct CompressionManager {
    enabled: bool,
    threshold_bytes: usize,
    lz4: Lz4Compressor,
    zlib: ZlibCompressor,
}

impl CompressionManager {
    /// Create a manager. Payloads larger than `threshold_bytes` are candidates.
    pub fn new(enabled: bool, threshold_bytes: usize) -> Self {
        Self {
            enabled,
            threshold_bytes,
            lz4: Lz4Compressor,
            zlib: ZlibCompressor::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn threshold_bytes(&self) -> usize {
        self.threshold_bytes
    }

    /// Compress with LZ4, falling back to zlib if LZ4 fails
    fn compress_any(&self, data: &[u8]) -> Option<(Vec<u8>, CompressionAlgorithm)> {
        match self.lz4.compress(data) {
            Ok(out) => return Some((out, CompressionAlgorithm::Lz4)),
            Err(e) => warn!("LZ4 compression failed, trying zlib: {}", e),
        }
        match self.zlib.compress(data) {
            Ok(out) => Some((out, CompressionAlgorithm::Zlib)),
            Err(e) => {
                warn!("zlib compression failed, storing uncompressed: {}", e);
                None
            }
        }
    }

    /// Compress when enabled, above threshold, and actually smaller.
    ///
    /// Returns (payload, algorithm_used).
    pub fn compress(&self, data: &[u8]) -> (Bytes, CompressionAlgorithm) {
        if !self.enabled || data.len() <= self.threshold_bytes {
            return (Bytes::copy_from_slice(data), CompressionAlgorithm::None);
        }

        match self.compress_any(data) {
            Some((out, algorithm)) if out.len() < data.len() => (Bytes::from(out), algorithm),
            _ => (Bytes::copy_from_slice(data), CompressionAlgorithm::None),
        }
    }

    /// Decompress trying LZ4, then zlib, then returning the input unchanged
    pub fn decompress(&self, data: &[u8]) -> Bytes {
        if let Ok(out) = self.lz4.decompress(data) {
            return Bytes::from(out);
        }
        match self.zlib.decompress(data) {
            Ok(out) => Bytes::from(out),
            Err(e) => {
                warn!("Decompression failed with every algorithm, returning raw bytes: {}", e);
                Bytes::copy_from_slice(data)
            }
        }
    }

    /// Build the L2 wire payload. Returns (payload, compressed).
    ///
    /// A value that already starts with the marker is always compressed, so a
    /// marker on the wire is never ambiguous.
    pub fn encode(&self, value: &[u8]) -> (Bytes, bool) {
        let compressed = if value.starts_with(COMPRESSED_MARKER) {
            debug!("Value begins with compression marker, forcing compressed framing");
            self.compress_any(value).map(|(out, _)| out)
        } else {
            match self.compress(value) {
                (out, CompressionAlgorithm::None) => {
                    debug_assert_eq!(out.len(), value.len());
                    None
                }
                (out, _) => Some(out.to_vec()),
            }
        };

        match compressed {
            Some(payload) => {
                let mut framed = BytesMut::with_capacity(COMPRESSED_MARKER.len() + payload.len());
                framed.put_slice(COMPRESSED_MARKER);
                framed.put_slice(&payload);
                (framed.freeze(), true)
            }
            None => (Bytes::copy_from_slice(value), false),
        }
    }

    /// Decode an L2 wire payload. Never fails: undecodable payloads are
    /// returned as stored.
    pub fn decode(&self, raw: &[u8]) -> Bytes {
        match raw.strip_prefix(COMPRESSED_MARKER) {
            Some(payload) => self.decompress(payload),
            None => Bytes::copy_from_slice(raw),
        }
    }
}

impl Default for CompressionManager {
    fn default() -> Self {
        Self::new(true, 1024)
    }
}

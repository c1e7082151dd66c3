//! Value Codec
//!
//! Serializes semi-structured values (JSON) and compresses payloads for
//! storage as opaque binary columns. The wire format is:
//!
//! ```text
//! value -> canonical JSON bytes -> zlib (DEFLATE) -> BLOB column
//! ```
//!
//! Content identity (the SHA-1 exposed by the content store) is always
//! computed over the *pre-compression* bytes, so it matches the checksum a
//! client could compute independently from the decoded value and stays
//! stable regardless of compression level.
//!
//! Round-trip contract: `decode(encode(v)) == v` for every representable
//! JSON value. Object key order is not significant.

use crate::error::{Result, StoreError};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Compress raw bytes with zlib
///
/// Used for file contents and host facts, which are stored as-is
/// (no JSON serialization step).
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompress a zlib payload
///
/// # Errors
///
/// Returns `CorruptBlob` if the payload is not a valid zlib stream.
/// A corrupt stored payload indicates database damage, not caller error.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| StoreError::corrupt_blob(format!("Failed to decompress payload: {}", e)))?;
    Ok(out)
}

/// Serialize a JSON value and compress it
///
/// # Errors
///
/// Returns `InvalidInput` if the value cannot be serialized (e.g. a map
/// with non-string keys smuggled in through a custom `Value`).
pub fn encode(value: &serde_json::Value) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(value)
        .map_err(|e| StoreError::invalid_input(format!("Failed to serialize value: {}", e)))?;
    compress(&json)
}

/// Decompress and parse a stored JSON payload
///
/// # Errors
///
/// Returns `CorruptBlob` if either decompression or JSON parsing fails.
pub fn decode(data: &[u8]) -> Result<serde_json::Value> {
    let json = decompress(data)?;
    serde_json::from_slice(&json)
        .map_err(|e| StoreError::corrupt_blob(format!("Failed to parse stored value: {}", e)))
}

//! P2P wire protocol (spec.md §6). Requests are plain JSON objects; most
//! responses are JSON too, except `pre-load` and the raw dump endpoints,
//! which use small custom binary envelopes decoded here.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::{self, Cursor, Read, Write};

/// `{method, id?, params?}` — the one request shape every method uses.
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl Request {
    pub fn new(method: &'static str, params: Option<serde_json::Value>) -> Self {
        Self {
            method,
            id: None,
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CountBlocksResponse {
    pub count_blocks: u64,
    #[serde(default)]
    pub extra_blocks: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeaderWire {
    pub number: u64,
    pub hash: String,
    pub prev_hash: String,
    pub size: u64,
    #[serde(rename = "fileName")]
    pub file_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PreloadDecodeError {
    #[error("truncated pre-load envelope")]
    Truncated,
    #[error("declared block count {declared} does not match decoded header count {actual}")]
    CountMismatch { declared: u64, actual: u64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One `pre-load` response, decoded per spec.md §4.3/§6:
/// `u64 headers_size` ‖ `u64 bodies_size` ‖ `u64 count` ‖ headers-bytes ‖
/// bodies-bytes. `headers_bytes`/`bodies_bytes` are themselves
/// length-prefixed concatenations, handled by the caller once split here.
#[derive(Debug, Clone)]
pub struct PreloadEnvelope {
    pub headers_bytes: Vec<u8>,
    pub bodies_bytes: Vec<u8>,
    pub declared_count: u64,
}

impl PreloadEnvelope {
    pub fn decode(raw: &[u8]) -> Result<Self, PreloadDecodeError> {
        let mut cursor = Cursor::new(raw);
        let headers_size = cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| PreloadDecodeError::Truncated)?;
        let bodies_size = cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| PreloadDecodeError::Truncated)?;
        let declared_count = cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| PreloadDecodeError::Truncated)?;

        let mut headers_bytes = vec![0u8; headers_size as usize];
        cursor
            .read_exact(&mut headers_bytes)
            .map_err(|_| PreloadDecodeError::Truncated)?;

        let mut bodies_bytes = vec![0u8; bodies_size as usize];
        cursor
            .read_exact(&mut bodies_bytes)
            .map_err(|_| PreloadDecodeError::Truncated)?;

        Ok(Self {
            headers_bytes,
            bodies_bytes,
            declared_count,
        })
    }

    pub fn encode(headers_bytes: &[u8], bodies_bytes: &[u8], count: u64) -> Vec<u8> {
        let mut out = Vec::with_capacity(24 + headers_bytes.len() + bodies_bytes.len());
        out.write_u64::<LittleEndian>(headers_bytes.len() as u64).unwrap();
        out.write_u64::<LittleEndian>(bodies_bytes.len() as u64).unwrap();
        out.write_u64::<LittleEndian>(count).unwrap();
        out.extend_from_slice(headers_bytes);
        out.extend_from_slice(bodies_bytes);
        out
    }
}

/// Decodes a concatenation of big-endian-length-prefixed byte strings
/// (spec.md §4.3 "Dump-payload encoding"), optionally zlib-compressed per
/// entry.
pub fn decode_length_prefixed(raw: &[u8]) -> Result<Vec<Vec<u8>>, io::Error> {
    let mut cursor = Cursor::new(raw);
    let mut out = Vec::new();
    while (cursor.position() as usize) < raw.len() {
        let len = cursor.read_u32::<byteorder::BigEndian>()?;
        let mut buf = vec![0u8; len as usize];
        cursor.read_exact(&mut buf)?;
        out.push(buf);
    }
    Ok(out)
}

pub fn encode_length_prefixed(chunks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for chunk in chunks {
        out.write_u32::<byteorder::BigEndian>(chunk.len() as u32).unwrap();
        out.extend_from_slice(chunk);
    }
    out
}

/// Decompresses a zlib-compressed dump payload (spec.md §4.3 "optionally
/// zlib-compressed").
pub fn zlib_decompress(raw: &[u8]) -> Result<Vec<u8>, io::Error> {
    use flate2::read::ZlibDecoder;
    let mut decoder = ZlibDecoder::new(raw);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

pub fn zlib_compress(raw: &[u8]) -> Vec<u8> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw).expect("in-memory write cannot fail");
    encoder.finish().expect("in-memory finish cannot fail")
}

pub mod methods {
    pub const GET_COUNT_BLOCKS: &str = "get-count-blocks";
    pub const GET_BLOCK_BY_NUMBER: &str = "get-block-by-number";
    pub const GET_BLOCKS: &str = "get-blocks";
    pub const GET_DUMP_BLOCK_BY_HASH: &str = "get-dump-block-by-hash";
    pub const GET_DUMPS_BLOCKS_BY_HASH: &str = "get-dumps-blocks-by-hash";
    pub const PRE_LOAD: &str = "pre-load";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preload_roundtrip() {
        let headers = b"hdrs".to_vec();
        let bodies = b"bodies-payload".to_vec();
        let raw = PreloadEnvelope::encode(&headers, &bodies, 3);
        let decoded = PreloadEnvelope::decode(&raw).unwrap();
        assert_eq!(decoded.headers_bytes, headers);
        assert_eq!(decoded.bodies_bytes, bodies);
        assert_eq!(decoded.declared_count, 3);
    }

    #[test]
    fn preload_truncated_is_rejected() {
        let raw = PreloadEnvelope::encode(b"hdrs", b"bodies", 1);
        assert!(PreloadEnvelope::decode(&raw[..10]).is_err());
    }

    #[test]
    fn length_prefixed_roundtrip() {
        let chunks = vec![b"one".to_vec(), b"two-longer".to_vec(), b"".to_vec()];
        let raw = encode_length_prefixed(&chunks);
        let decoded = decode_length_prefixed(&raw).unwrap();
        assert_eq!(decoded, chunks);
    }

    #[test]
    fn zlib_roundtrip() {
        let data = b"repeated repeated repeated data payload".to_vec();
        let compressed = zlib_compress(&data);
        let decompressed = zlib_decompress(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }
}

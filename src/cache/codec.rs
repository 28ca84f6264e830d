//! Payload codec for cached values.
//!
//! Compressed values are zlib streams rendered as base64 so that they share a
//! text keyspace with uncompressed values.

use std::io::{Read, Write};
use std::string::FromUtf8Error;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use flate2::{Compression, read::ZlibDecoder, write::ZlibEncoder};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("cached value is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to deflate payload: {0}")]
    Deflate(std::io::Error),
    #[error("failed to inflate cached value: {0}")]
    Inflate(std::io::Error),
    #[error("uncompressed payload is not utf-8 text: {0}")]
    NotText(#[from] FromUtf8Error),
}

/// Encode a raw payload into its stored text form.
pub fn encode(raw: &[u8], compress: bool) -> Result<String, CodecError> {
    if !compress {
        return Ok(String::from_utf8(raw.to_vec())?);
    }

    let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
    encoder.write_all(raw).map_err(CodecError::Deflate)?;
    let compressed = encoder.finish().map_err(CodecError::Deflate)?;
    Ok(STANDARD.encode(compressed))
}

/// Invert [`encode`].
pub fn decode(stored: &str, compressed: bool) -> Result<Vec<u8>, CodecError> {
    if !compressed {
        return Ok(stored.as_bytes().to_vec());
    }

    let bytes = STANDARD.decode(stored.trim())?;
    let mut decoder = ZlibDecoder::new(bytes.as_slice());
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw).map_err(CodecError::Inflate)?;
    Ok(raw)
}

/// Codec bound to the configured compression mode.
#[derive(Debug, Clone, Copy)]
pub struct PayloadCodec {
    compress: bool,
    offload_threshold: usize,
}

impl PayloadCodec {
    pub fn new(compress: bool, offload_threshold: usize) -> Self {
        Self {
            compress,
            offload_threshold,
        }
    }

    pub fn compresses(&self) -> bool {
        self.compress
    }

    /// Encode, moving large compressions onto the blocking pool.
    pub async fn encode(&self, raw: bytes::Bytes) -> Result<String, CodecError> {
        let compress = self.compress;
        if !compress || raw.len() < self.offload_threshold {
            return encode(&raw, compress);
        }
        match tokio::task::spawn_blocking(move || encode(&raw, compress)).await {
            Ok(result) => result,
            Err(join) => Err(CodecError::Deflate(std::io::Error::other(join))),
        }
    }

    /// Decode, moving large decompressions onto the blocking pool.
    pub async fn decode(&self, stored: String) -> Result<Vec<u8>, CodecError> {
        let compressed = self.compress;
        if !compressed || stored.len() < self.offload_threshold {
            return decode(&stored, compressed);
        }
        match tokio::task::spawn_blocking(move || decode(&stored, compressed)).await {
            Ok(result) => result,
            Err(join) => Err(CodecError::Inflate(std::io::Error::other(join))),
        }
    }
}

/// A decoded cache value as presented to clients.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedPayload {
    Json(Value),
    Raw(String),
}

impl CachedPayload {
    /// Interpret decoded bytes as JSON, keeping the raw text when they are not.
    pub fn from_bytes(raw: &[u8]) -> Self {
        match serde_json::from_slice(raw) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Raw(String::from_utf8_lossy(raw).into_owned()),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::Raw(text) => Value::String(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOADS: &[&str] = &[
        "",
        "plain text",
        r#"{"name":"Bolt","tags":["a","b"],"price":1.5}"#,
        "ünïcödé ✓ payload",
        "[1,2,3]",
    ];

    #[test]
    fn round_trip_compressed() {
        for payload in PAYLOADS {
            let stored = encode(payload.as_bytes(), true).expect("encode");
            let raw = decode(&stored, true).expect("decode");
            assert_eq!(raw, payload.as_bytes());
        }
    }

    #[test]
    fn round_trip_uncompressed() {
        for payload in PAYLOADS {
            let stored = encode(payload.as_bytes(), false).expect("encode");
            assert_eq!(stored, *payload);
            let raw = decode(&stored, false).expect("decode");
            assert_eq!(raw, payload.as_bytes());
        }
    }

    #[test]
    fn compressed_value_is_base64_text() {
        let body = "x".repeat(4096);
        let stored = encode(body.as_bytes(), true).expect("encode");
        assert!(stored.len() < body.len());
        assert!(STANDARD.decode(&stored).is_ok());
    }

    #[test]
    fn corrupt_base64_is_a_codec_error() {
        let err = decode("***not base64***", true).expect_err("should fail");
        assert!(matches!(err, CodecError::Base64(_)));
    }

    #[test]
    fn corrupt_zlib_stream_is_a_codec_error() {
        let stored = STANDARD.encode(b"definitely not zlib");
        let err = decode(&stored, true).expect_err("should fail");
        assert!(matches!(err, CodecError::Inflate(_)));
    }

    #[test]
    fn uncompressed_binary_is_rejected() {
        let err = encode(&[0xff, 0xfe, 0x00], false).expect_err("should fail");
        assert!(matches!(err, CodecError::NotText(_)));
    }

    #[test]
    fn payload_falls_back_to_raw_text() {
        assert_eq!(
            CachedPayload::from_bytes(br#"{"ok":true}"#),
            CachedPayload::Json(serde_json::json!({ "ok": true }))
        );
        assert_eq!(
            CachedPayload::from_bytes(b"<html>"),
            CachedPayload::Raw("<html>".to_string())
        );
    }

    #[tokio::test]
    async fn offloaded_codec_matches_inline_codec() {
        let codec = PayloadCodec::new(true, 16);
        let body = bytes::Bytes::from("y".repeat(1024));
        let stored = codec.encode(body.clone()).await.expect("encode");
        let raw = codec.decode(stored).await.expect("decode");
        assert_eq!(raw, body.to_vec());
    }
}

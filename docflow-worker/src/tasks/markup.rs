//! Original markup transport encoding
//!
//! Markup travels inside JSON payloads gzip-compressed and then base64
//! encoded (standard alphabet, padded). The empty string encodes to and
//! decodes from the empty string.

use std::io::{Read, Write};

use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarkupError {
    #[error("Markup is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Markup is not valid gzip: {0}")]
    Gzip(#[from] std::io::Error),

    #[error("Markup is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Compress and encode markup for a task payload
pub fn encode_markup(markup: &str) -> Result<String, MarkupError> {
    if markup.is_empty() {
        return Ok(String::new());
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(markup.as_bytes())?;
    let compressed = encoder.finish()?;

    Ok(base64::engine::general_purpose::STANDARD.encode(compressed))
}

/// Decode and decompress markup from a task payload
pub fn decode_markup(encoded: &str) -> Result<String, MarkupError> {
    if encoded.is_empty() {
        return Ok(String::new());
    }

    let compressed = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
    let mut decoder = GzDecoder::new(&compressed[..]);
    let mut bytes = Vec::new();
    decoder.read_to_end(&mut bytes)?;

    Ok(String::from_utf8(bytes)?)
}

#![forbid(unsafe_code)]

//! Lenient payload decoding.
//!
//! The HTTP-POST binding carries plain base64; the HTTP-Redirect binding
//! deflate-compresses before encoding and some stacks use the URL-safe
//! alphabet. The decoder strips whitespace, tries each alphabet, and
//! inflates when the decoded bytes are not already XML.

use base64::Engine;
use flate2::read::DeflateDecoder;
use sigtuna_core::Error;
use std::io::Read;

/// Decode a SAMLResponse payload into XML text.
pub fn decode_payload(payload: &str) -> Result<String, Error> {
    let stripped: String = payload.chars().filter(|c| !c.is_whitespace()).collect();

    // Raw XML is accepted as-is (useful for tests and offline tooling).
    if stripped.starts_with('<') {
        return Ok(payload.to_owned());
    }

    let bytes = decode_base64_any(&stripped)?;

    if bytes.starts_with(b"<") || bytes.starts_with(b"\xef\xbb\xbf") {
        return String::from_utf8(bytes)
            .map_err(|e| Error::XmlParse(format!("decoded payload is not UTF-8: {e}")));
    }

    // Not XML: assume the HTTP-Redirect binding's raw-deflate compression.
    let mut decoder = DeflateDecoder::new(&bytes[..]);
    let mut inflated = String::new();
    decoder
        .read_to_string(&mut inflated)
        .map_err(|e| Error::Inflate(e.to_string()))?;
    Ok(inflated)
}

/// Try the standard alphabet first, then URL-safe, with and without padding.
fn decode_base64_any(input: &str) -> Result<Vec<u8>, Error> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};

    for engine in [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD] {
        if let Ok(bytes) = engine.decode(input) {
            return Ok(bytes);
        }
    }
    Err(Error::Base64("payload is not valid base64".into()))
}

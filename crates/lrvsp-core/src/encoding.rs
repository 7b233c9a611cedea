//! Binary-safe encodings for persisted titles and metadata.
//!
//! Titles and metadata are stored as standard base64 text. The encoded title
//! doubles as the join key between `DocObjs.title` and `LinkObjs.toTitle`, so
//! the encoding must stay deterministic. Storage uses bound parameters
//! regardless; the encoding is about column safety, not injection.

use std::collections::BTreeSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::defaults::MAX_ENCODED_LINK_BYTES;
use crate::error::{Error, Result};

/// Encode a document or link title.
pub fn encode_title(title: &str) -> String {
    STANDARD.encode(title.as_bytes())
}

/// Decode a title produced by [`encode_title`].
pub fn decode_title(encoded: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| Error::InvalidInput(format!("Title is not valid base64: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| Error::InvalidInput(format!("Title is not valid UTF-8: {}", e)))
}

/// Encode metadata as base64 over its compact JSON serialization.
pub fn encode_metadata(metadata: &JsonValue) -> Result<String> {
    let json = serde_json::to_string(metadata)?;
    Ok(STANDARD.encode(json.as_bytes()))
}

/// Decode metadata produced by [`encode_metadata`].
pub fn decode_metadata(encoded: &str) -> Result<JsonValue> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| Error::InvalidInput(format!("Metadata is not valid base64: {}", e)))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Length of the padded base64 form of `raw_len` bytes.
pub const fn encoded_len(raw_len: usize) -> usize {
    raw_len.div_ceil(3) * 4
}

/// Whether a link title fits the `LinkObjs` column once encoded.
pub fn link_fits(link: &str) -> bool {
    encoded_len(link.len()) <= MAX_ENCODED_LINK_BYTES
}

/// Encode the link targets that fit the storage width, dropping the rest.
///
/// Input order is kept and duplicates collapse to their first occurrence.
pub fn encode_links<'a, I>(links: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut seen = BTreeSet::new();
    let mut encoded = Vec::new();
    for link in links {
        if !link_fits(link) {
            debug!(
                subsystem = "core",
                component = "encoding",
                raw_len = link.len(),
                encoded_len = encoded_len(link.len()),
                "Dropping link wider than storage column"
            );
            continue;
        }
        if seen.insert(link.as_str()) {
            encoded.push(encode_title(link));
        }
    }
    encoded
}

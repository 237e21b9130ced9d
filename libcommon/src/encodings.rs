//! Minimal text decoding: UTF-8 with a Latin-1 fallback.
//!
//! Text fields are length-prefixed bytes; only this one fallback pair is
//! needed (decode as UTF-8, fall back to Latin-1 on error), so there's no
//! larger Mac script-code table here.

#[must_use]
pub fn decode_lossy(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

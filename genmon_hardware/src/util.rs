use std::fmt::Write;

/// Lowercase hex rendering of a byte slice.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

/// Lowercase hex rendering of big-endian 16-bit words.
pub fn words_to_hex(words: &[u16]) -> String {
    words.iter().fold(String::with_capacity(words.len() * 4), |mut out, w| {
        let _ = write!(out, "{w:04x}");
        out
    })
}

//! Text string decoding.
//!
//! PDF text strings are UTF-16BE when they open with the byte-order mark,
//! UTF-8 when they open with its BOM (PDF 2.0), and PDFDocEncoding
//! otherwise. PDFDocEncoding is decoded as its Windows-1252 superset,
//! which matches how the strings in circulating files were produced.

use encoding_rs::{UTF_8, UTF_16BE, WINDOWS_1252};

/// Decodes a text string object's bytes into readable text.
pub fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.starts_with(&[0xFE, 0xFF]) {
        let (text, _, _) = UTF_16BE.decode(&bytes[2..]);
        return text.into_owned();
    }
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        let (text, _, _) = UTF_8.decode(&bytes[3..]);
        return text.into_owned();
    }
    let (text, _, _) = WINDOWS_1252.decode(bytes);
    text.into_owned()
}

/// Encodes text into text string bytes: plain ASCII stays byte-for-byte,
/// anything else becomes UTF-16BE behind a byte-order mark.
pub fn encode_text_string(text: &str) -> Vec<u8> {
    if text.is_ascii() {
        return text.as_bytes().to_vec();
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_passes_through() {
        assert_eq!(decode_text_string(b"Title"), "Title");
        assert_eq!(encode_text_string("Title"), b"Title");
    }

    #[test]
    fn utf16_roundtrip() {
        let text = "Grüße 漢字";
        let encoded = encode_text_string(text);
        assert_eq!(&encoded[..2], &[0xFE, 0xFF]);
        assert_eq!(decode_text_string(&encoded), text);
    }

    #[test]
    fn high_bytes_decode_as_windows_1252() {
        assert_eq!(decode_text_string(&[0xE9]), "é");
    }
}

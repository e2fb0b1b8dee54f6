//! Name and comment text handling.
//!
//! ZIP archives store file names and comments either as UTF-8 (general
//! purpose flag bit 11) or, historically, as CP437. The CP437 table and
//! both mapping directions come from the `codepage-437` crate; encoding and
//! decoding of pure printable ASCII borrows the input without allocating.

use std::borrow::Cow;

use codepage_437::{BorrowFromCp437, ToCp437, CP437_CONTROL};

use crate::error::{Result, ZipError};

/// Maps CP437 bytes to text. Infallible: every byte has a mapping.
pub fn decode_cp437(bytes: &[u8]) -> String {
    Cow::borrow_from_cp437(bytes, &CP437_CONTROL).into_owned()
}

/// Maps text to CP437 bytes.
///
/// Pure printable ASCII takes the borrowing fast path inside the table
/// crate. Fails if any character has no CP437 representation.
pub fn encode_cp437(text: &str) -> Result<Vec<u8>> {
    match text.to_cp437(&CP437_CONTROL) {
        Ok(bytes) => Ok(bytes.into_owned()),
        Err(e) => Err(ZipError::Encoding(format!(
            "no cp437 representation for {:?} at byte {}",
            text, e.representable_up_to
        ))),
    }
}

/// Decodes a raw name or comment per the entry's UTF-8 flag.
pub fn decode_field(raw: &[u8], utf8: bool) -> Result<String> {
    if utf8 {
        String::from_utf8(raw.to_vec())
            .map_err(|e| ZipError::Encoding(format!("invalid UTF-8 in name or comment: {}", e)))
    } else {
        Ok(decode_cp437(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cp437_round_trips_every_byte() {
        for b in 0..=255u8 {
            let text = decode_cp437(&[b]);
            assert_eq!(encode_cp437(&text).unwrap(), vec![b], "byte 0x{:02x}", b);
        }
    }

    #[test]
    fn printable_ascii_is_identity() {
        let text: String = (0x20u8..=0x7e).map(|b| b as char).collect();
        assert_eq!(encode_cp437(&text).unwrap(), text.as_bytes());
        assert_eq!(decode_cp437(text.as_bytes()), text);
    }

    #[test]
    fn unrepresentable_character_fails() {
        assert!(encode_cp437("\u{4e2d}").is_err());
    }

    #[test]
    fn decode_field_honors_utf8_flag() {
        assert_eq!(decode_field("fran\u{e7}ais".as_bytes(), true).unwrap(), "fran\u{e7}ais");
        // 0x87 is c-cedilla in CP437
        assert_eq!(decode_field(b"fran\x87ais", false).unwrap(), "fran\u{e7}ais");
    }
}

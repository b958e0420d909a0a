//! Hex encoding utilities for bus payloads
//!
//! Bus frames travel through logs and the JSON API as hex text. Encoding is
//! always uppercase; decoding accepts either case and ignores whitespace, so
//! both `"FFC00509"` and `"ff c0 05 09"` describe the same frame.

use std::fmt::Write;

use thiserror::Error;

/// Hex decoding error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HexError {
    /// Odd number of hex digits after removing whitespace
    #[error("Hex string must have an even number of digits, got {0}")]
    OddLength(usize),

    /// Character that is neither a hex digit nor whitespace
    #[error("Invalid hex character '{ch}' at offset {offset}")]
    InvalidCharacter { ch: char, offset: usize },
}

/// Encode bytes to uppercase hex string
/// Example: [0x12, 0x34, 0xAB] -> "1234AB"
pub fn encode_upper(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len() * 2);
    for byte in data {
        // Writing to String buffer is infallible - no need for expect
        let _ = write!(&mut result, "{:02X}", byte);
    }
    result
}

/// Format bytes as uppercase hex with a leading space before every byte
///
/// Example: [0xFF, 0xC0] -> " FF C0"
pub fn format_hex_spaced(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len() * 3);
    for byte in data {
        let _ = write!(&mut result, " {:02X}", byte);
    }
    result
}

/// Decode a hex string into bytes, skipping whitespace
pub fn decode(hex: &str) -> Result<Vec<u8>, HexError> {
    let mut digits = Vec::with_capacity(hex.len());
    for (offset, ch) in hex.char_indices() {
        if ch.is_whitespace() {
            continue;
        }
        match ch.to_digit(16) {
            Some(d) => digits.push(d as u8),
            None => return Err(HexError::InvalidCharacter { ch, offset }),
        }
    }

    if digits.len() % 2 != 0 {
        return Err(HexError::OddLength(digits.len()));
    }

    Ok(digits
        .chunks_exact(2)
        .map(|pair| (pair[0] << 4) | pair[1])
        .collect())
}

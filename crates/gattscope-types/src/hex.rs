//! Hex helpers for payloads and manufacturer data.

use core::fmt::Write;

use crate::error::{ParseError, ParseResult};

/// Encode bytes as lowercase hex without separators.
#[must_use]
pub fn encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        // Writing to a String cannot fail.
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

/// Decode a hex string into bytes.
///
/// Accepts an optional `0x` prefix and ignores `:`, `-` and whitespace
/// separators, so `"0x01 02"`, `"01:02"` and `"0102"` all decode the same.
///
/// # Errors
///
/// Returns [`ParseError::InvalidHex`] on non-hex characters or an odd digit count.
pub fn decode(input: &str) -> ParseResult<Vec<u8>> {
    let trimmed = input.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: Vec<u8> = body
        .bytes()
        .filter(|b| !matches!(b, b':' | b'-') && !b.is_ascii_whitespace())
        .collect();

    if digits.len() % 2 != 0 {
        return Err(ParseError::InvalidHex(format!(
            "odd number of digits in '{}'",
            input
        )));
    }

    digits
        .chunks_exact(2)
        .map(|pair| {
            let hi = nibble(pair[0]);
            let lo = nibble(pair[1]);
            match (hi, lo) {
                (Some(hi), Some(lo)) => Ok((hi << 4) | lo),
                _ => Err(ParseError::InvalidHex(format!(
                    "non-hex digit in '{}'",
                    input
                ))),
            }
        })
        .collect()
}

fn nibble(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

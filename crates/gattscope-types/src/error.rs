//! Error types for data parsing in gattscope-types.

use thiserror::Error;

/// Errors that can occur when parsing advertisement payloads or GATT data.
///
/// This error type is platform-agnostic and does not include
/// BLE-stack errors (those belong in gattscope-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// An AD structure declares more bytes than the payload holds.
    #[error("AD structure at offset {offset} declares {declared} bytes, only {available} available")]
    Truncated {
        /// Offset of the length byte within the payload.
        offset: usize,
        /// Length declared by the structure (type byte included).
        declared: usize,
        /// Bytes remaining after the length byte.
        available: usize,
    },

    /// A string could not be decoded as hexadecimal bytes.
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    /// A characteristic handle could not be parsed.
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// An address type other than public/random.
    #[error("Invalid address type: {0}")]
    InvalidAddressType(String),

    /// Two characteristics in one enumeration share a handle.
    #[error("Duplicate characteristic handle {0}")]
    DuplicateHandle(crate::gatt::CharacteristicHandle),
}

/// Result type alias using gattscope-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

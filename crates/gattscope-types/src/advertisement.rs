//! Advertising data (AD) structures.
//!
//! A BLE advertisement payload is a sequence of length-type-value elements.
//! This module parses raw payloads into [`AdStructure`]s and renders their
//! values as text: names as UTF-8, service UUID lists as canonical UUID
//! strings, and everything else as lowercase hex.

use core::fmt;

use bytes::Buf;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ParseError, ParseResult};
use crate::hex;
use crate::uuid::{from_short, from_u32};

// --- AD type codes ---

/// Flags.
pub const FLAGS: u8 = 0x01;
/// Incomplete list of 16-bit service UUIDs.
pub const INCOMPLETE_16B_SERVICES: u8 = 0x02;
/// Complete list of 16-bit service UUIDs.
pub const COMPLETE_16B_SERVICES: u8 = 0x03;
/// Incomplete list of 32-bit service UUIDs.
pub const INCOMPLETE_32B_SERVICES: u8 = 0x04;
/// Complete list of 32-bit service UUIDs.
pub const COMPLETE_32B_SERVICES: u8 = 0x05;
/// Incomplete list of 128-bit service UUIDs.
pub const INCOMPLETE_128B_SERVICES: u8 = 0x06;
/// Complete list of 128-bit service UUIDs.
pub const COMPLETE_128B_SERVICES: u8 = 0x07;
/// Shortened local name.
pub const SHORT_LOCAL_NAME: u8 = 0x08;
/// Complete local name.
pub const COMPLETE_LOCAL_NAME: u8 = 0x09;
/// TX power level.
pub const TX_POWER: u8 = 0x0A;
/// 16-bit service data.
pub const SERVICE_DATA_16B: u8 = 0x16;
/// Appearance.
pub const APPEARANCE: u8 = 0x19;
/// 128-bit service data.
pub const SERVICE_DATA_128B: u8 = 0x21;
/// Manufacturer specific data.
pub const MANUFACTURER: u8 = 0xFF;

/// Description used to locate a device's local name among its AD structures.
pub const COMPLETE_LOCAL_NAME_DESC: &str = "Complete Local Name";

/// Human-readable description of an AD type code.
#[must_use]
pub fn ad_type_description(ad_type: u8) -> &'static str {
    match ad_type {
        FLAGS => "Flags",
        INCOMPLETE_16B_SERVICES => "Incomplete 16b Services",
        COMPLETE_16B_SERVICES => "Complete 16b Services",
        INCOMPLETE_32B_SERVICES => "Incomplete 32b Services",
        COMPLETE_32B_SERVICES => "Complete 32b Services",
        INCOMPLETE_128B_SERVICES => "Incomplete 128b Services",
        COMPLETE_128B_SERVICES => "Complete 128b Services",
        SHORT_LOCAL_NAME => "Short Local Name",
        COMPLETE_LOCAL_NAME => COMPLETE_LOCAL_NAME_DESC,
        TX_POWER => "Tx Power",
        0x0D => "Class of Device",
        0x12 => "Slave Connection Interval Range",
        0x14 => "16b Service Solicitation",
        0x15 => "128b Service Solicitation",
        SERVICE_DATA_16B => "16b Service Data",
        0x17 => "Public Target Address",
        0x18 => "Random Target Address",
        APPEARANCE => "Appearance",
        0x1A => "Advertising Interval",
        0x1F => "32b Service Solicitation",
        0x20 => "32b Service Data",
        SERVICE_DATA_128B => "128b Service Data",
        0x24 => "URI",
        MANUFACTURER => "Manufacturer",
        _ => "Unknown",
    }
}

/// One length-type-value element of an advertisement payload.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AdStructure {
    /// AD type code.
    pub ad_type: u8,
    /// Description of the type code.
    pub description: String,
    /// Rendered value.
    pub value: String,
}

impl AdStructure {
    /// Create a structure from an already-rendered value.
    pub fn new(ad_type: u8, value: impl Into<String>) -> Self {
        Self {
            ad_type,
            description: ad_type_description(ad_type).to_string(),
            value: value.into(),
        }
    }

    /// Create a structure from its raw data bytes (type byte excluded).
    pub fn from_raw(ad_type: u8, data: &[u8]) -> Self {
        Self::new(ad_type, render_value(ad_type, data))
    }

    /// Whether this structure carries the complete local name.
    pub fn is_complete_local_name(&self) -> bool {
        self.description == COMPLETE_LOCAL_NAME_DESC
    }
}

impl fmt::Display for AdStructure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02x}): {}", self.description, self.ad_type, self.value)
    }
}

/// Parse a raw advertising payload into AD structures, in wire order.
///
/// A zero length byte ends the significant part of the payload; anything
/// after it is padding.
///
/// # Errors
///
/// Returns [`ParseError::Truncated`] when a structure claims more bytes
/// than remain in the payload.
pub fn parse_ad_payload(payload: &[u8]) -> ParseResult<Vec<AdStructure>> {
    let mut buf = payload;
    let mut structures = Vec::new();

    while buf.has_remaining() {
        let offset = payload.len() - buf.remaining();
        let len = usize::from(buf.get_u8());
        if len == 0 {
            break;
        }
        if buf.remaining() < len {
            return Err(ParseError::Truncated {
                offset,
                declared: len,
                available: buf.remaining(),
            });
        }
        let ad_type = buf.get_u8();
        let data = &buf[..len - 1];
        structures.push(AdStructure::from_raw(ad_type, data));
        buf.advance(len - 1);
    }

    Ok(structures)
}

/// Render AD data bytes as text according to their type.
#[must_use]
pub fn render_value(ad_type: u8, data: &[u8]) -> String {
    match ad_type {
        SHORT_LOCAL_NAME | COMPLETE_LOCAL_NAME => String::from_utf8_lossy(data)
            .trim_end_matches('\0')
            .to_string(),
        INCOMPLETE_16B_SERVICES | COMPLETE_16B_SERVICES if data.len() % 2 == 0 => {
            join_uuids(data.chunks_exact(2).map(|c| from_short(u16::from_le_bytes([c[0], c[1]]))))
        }
        INCOMPLETE_32B_SERVICES | COMPLETE_32B_SERVICES if data.len() % 4 == 0 => join_uuids(
            data.chunks_exact(4)
                .map(|c| from_u32(u32::from_le_bytes([c[0], c[1], c[2], c[3]]))),
        ),
        INCOMPLETE_128B_SERVICES | COMPLETE_128B_SERVICES if data.len() % 16 == 0 => {
            join_uuids(data.chunks_exact(16).map(|c| {
                let mut bytes = [0u8; 16];
                bytes.copy_from_slice(c);
                bytes.reverse();
                Uuid::from_bytes(bytes)
            }))
        }
        _ => hex::encode(data),
    }
}

fn join_uuids(uuids: impl Iterator<Item = Uuid>) -> String {
    uuids.map(|u| u.to_string()).collect::<Vec<_>>().join(",")
}

/// Find the first "Complete Local Name" value among AD structures.
#[must_use]
pub fn complete_local_name(structures: &[AdStructure]) -> Option<&str> {
    structures
        .iter()
        .find(|s| s.is_complete_local_name())
        .map(|s| s.value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags_and_name() {
        // flags=0x06, complete local name "Thermo"
        let payload = [
            0x02, 0x01, 0x06, 0x07, 0x09, b'T', b'h', b'e', b'r', b'm', b'o',
        ];
        let structures = parse_ad_payload(&payload).unwrap();
        assert_eq!(structures.len(), 2);
        assert_eq!(structures[0].description, "Flags");
        assert_eq!(structures[0].value, "06");
        assert_eq!(structures[1].description, "Complete Local Name");
        assert_eq!(structures[1].value, "Thermo");
        assert_eq!(complete_local_name(&structures), Some("Thermo"));
    }

    #[test]
    fn test_parse_stops_at_zero_length() {
        let payload = [0x02, 0x01, 0x06, 0x00, 0xAA, 0xBB];
        let structures = parse_ad_payload(&payload).unwrap();
        assert_eq!(structures.len(), 1);
    }

    #[test]
    fn test_parse_truncated() {
        let payload = [0x02, 0x01, 0x06, 0x05, 0xFF, 0x4C];
        let err = parse_ad_payload(&payload).unwrap_err();
        assert_eq!(
            err,
            ParseError::Truncated {
                offset: 3,
                declared: 5,
                available: 2
            }
        );
    }

    #[test]
    fn test_parse_keeps_duplicates_in_wire_order() {
        let payload = [0x02, 0xFF, 0x01, 0x02, 0xFF, 0x02];
        let structures = parse_ad_payload(&payload).unwrap();
        assert_eq!(structures.len(), 2);
        assert_eq!(structures[0].value, "01");
        assert_eq!(structures[1].value, "02");
    }

    #[test]
    fn test_render_16b_services() {
        let value = render_value(COMPLETE_16B_SERVICES, &[0x0f, 0x18, 0x0a, 0x18]);
        assert_eq!(
            value,
            "0000180f-0000-1000-8000-00805f9b34fb,0000180a-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_render_odd_service_list_falls_back_to_hex() {
        assert_eq!(render_value(COMPLETE_16B_SERVICES, &[0x0f, 0x18, 0x0a]), "0f180a");
    }

    #[test]
    fn test_render_128b_service() {
        let uuid = Uuid::parse_str("f0cd1400-95da-4f4b-9ac8-aa55d312af0c").unwrap();
        let mut wire = *uuid.as_bytes();
        wire.reverse();
        assert_eq!(render_value(COMPLETE_128B_SERVICES, &wire), uuid.to_string());
    }

    #[test]
    fn test_first_complete_name_wins() {
        let structures = vec![
            AdStructure::new(SHORT_LOCAL_NAME, "Th"),
            AdStructure::new(COMPLETE_LOCAL_NAME, "First"),
            AdStructure::new(COMPLETE_LOCAL_NAME, "Second"),
        ];
        assert_eq!(complete_local_name(&structures), Some("First"));
        assert_eq!(complete_local_name(&structures[..1]), None);
    }

    #[test]
    fn test_unknown_type_description() {
        assert_eq!(ad_type_description(0x99), "Unknown");
        assert_eq!(AdStructure::new(0x99, "00").to_string(), "Unknown (0x99): 00");
    }
}

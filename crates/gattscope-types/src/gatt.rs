//! GATT catalog types.
//!
//! A [`GattCatalog`] is the immutable map of services and characteristics
//! discovered on one connection. It is built from the stack's raw
//! enumeration ([`RawService`]) and never mutated afterwards.

use core::fmt;
use core::str::FromStr;
use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ParseError, ParseResult};

/// Opaque per-connection identifier of a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct CharacteristicHandle(pub u16);

impl fmt::Display for CharacteristicHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

impl FromStr for CharacteristicHandle {
    type Err = ParseError;

    /// Parses `0x`-prefixed hex or plain decimal.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u16::from_str_radix(hex, 16),
            None => s.parse::<u16>(),
        };
        parsed
            .map(CharacteristicHandle)
            .map_err(|_| ParseError::InvalidHandle(s.to_string()))
    }
}

/// One capability flag of a characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CharacteristicProperty {
    /// Value can be read.
    Read,
    /// Value can be written with a response.
    Write,
    /// Value can be written without a response.
    WriteWithoutResponse,
    /// Value changes are pushed as notifications.
    Notify,
    /// Value changes are pushed as acknowledged indications.
    Indicate,
}

impl CharacteristicProperty {
    /// All properties, in bit order.
    pub const ALL: [CharacteristicProperty; 5] = [
        CharacteristicProperty::Read,
        CharacteristicProperty::WriteWithoutResponse,
        CharacteristicProperty::Write,
        CharacteristicProperty::Notify,
        CharacteristicProperty::Indicate,
    ];

    /// Bit of this property in the GATT characteristic properties byte.
    #[must_use]
    pub const fn bit(self) -> u8 {
        match self {
            CharacteristicProperty::Read => 0x02,
            CharacteristicProperty::WriteWithoutResponse => 0x04,
            CharacteristicProperty::Write => 0x08,
            CharacteristicProperty::Notify => 0x10,
            CharacteristicProperty::Indicate => 0x20,
        }
    }

    fn label(self) -> &'static str {
        match self {
            CharacteristicProperty::Read => "read",
            CharacteristicProperty::Write => "write",
            CharacteristicProperty::WriteWithoutResponse => "write-without-response",
            CharacteristicProperty::Notify => "notify",
            CharacteristicProperty::Indicate => "indicate",
        }
    }
}

/// Set of [`CharacteristicProperty`] flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct CharacteristicProperties(u8);

impl CharacteristicProperties {
    const MASK: u8 = 0x02 | 0x04 | 0x08 | 0x10 | 0x20;

    /// Decode the stack-reported property byte; bits outside the supported
    /// vocabulary (broadcast, signed writes, extended) are dropped.
    #[must_use]
    pub const fn from_bits(raw: u8) -> Self {
        Self(raw & Self::MASK)
    }

    /// Build a set from individual properties.
    pub fn from_properties(properties: &[CharacteristicProperty]) -> Self {
        Self(properties.iter().fold(0, |acc, p| acc | p.bit()))
    }

    /// The underlying bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether the set contains `property`.
    #[must_use]
    pub const fn contains(self, property: CharacteristicProperty) -> bool {
        self.0 & property.bit() != 0
    }

    /// Whether the set is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Read is supported.
    #[must_use]
    pub const fn can_read(self) -> bool {
        self.contains(CharacteristicProperty::Read)
    }

    /// Write or WriteWithoutResponse is supported.
    #[must_use]
    pub const fn can_write(self) -> bool {
        self.contains(CharacteristicProperty::Write)
            || self.contains(CharacteristicProperty::WriteWithoutResponse)
    }

    /// Notify or Indicate is supported.
    #[must_use]
    pub const fn can_notify(self) -> bool {
        self.contains(CharacteristicProperty::Notify)
            || self.contains(CharacteristicProperty::Indicate)
    }

    /// Iterate over contained properties in bit order.
    pub fn iter(self) -> impl Iterator<Item = CharacteristicProperty> {
        CharacteristicProperty::ALL
            .into_iter()
            .filter(move |p| self.contains(*p))
    }
}

impl fmt::Display for CharacteristicProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "-");
        }
        let labels: Vec<_> = self.iter().map(CharacteristicProperty::label).collect();
        write!(f, "{}", labels.join("|"))
    }
}

/// A discovered characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GattCharacteristic {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// Per-connection handle.
    pub handle: CharacteristicHandle,
    /// Decoded properties.
    pub properties: CharacteristicProperties,
}

/// A discovered service and its characteristics, in stack order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GattService {
    /// Service UUID.
    pub uuid: Uuid,
    /// Characteristics in stack order.
    pub characteristics: Vec<GattCharacteristic>,
}

/// A characteristic as reported by the host stack, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCharacteristic {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// Per-connection handle.
    pub handle: CharacteristicHandle,
    /// Raw GATT properties byte.
    pub properties: u8,
}

/// A service as reported by the host stack, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawService {
    /// Service UUID.
    pub uuid: Uuid,
    /// Characteristics in stack order.
    pub characteristics: Vec<RawCharacteristic>,
}

/// Immutable catalog of one connection's services.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GattCatalog {
    services: Vec<GattService>,
}

impl GattCatalog {
    /// Decode a raw enumeration, keeping stack order.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::DuplicateHandle`] if two characteristics share
    /// a handle; such an enumeration cannot be addressed safely.
    pub fn from_raw(raw: Vec<RawService>) -> ParseResult<Self> {
        let mut seen = HashSet::new();
        let mut services = Vec::with_capacity(raw.len());

        for service in raw {
            let mut characteristics = Vec::with_capacity(service.characteristics.len());
            for ch in service.characteristics {
                if !seen.insert(ch.handle) {
                    return Err(ParseError::DuplicateHandle(ch.handle));
                }
                characteristics.push(GattCharacteristic {
                    uuid: ch.uuid,
                    handle: ch.handle,
                    properties: CharacteristicProperties::from_bits(ch.properties),
                });
            }
            services.push(GattService {
                uuid: service.uuid,
                characteristics,
            });
        }

        Ok(Self { services })
    }

    /// Services in stack order.
    pub fn services(&self) -> &[GattService] {
        &self.services
    }

    /// First service with the given UUID.
    pub fn service(&self, uuid: &Uuid) -> Option<&GattService> {
        self.services.iter().find(|s| &s.uuid == uuid)
    }

    /// Characteristic with the given handle.
    pub fn characteristic(&self, handle: CharacteristicHandle) -> Option<&GattCharacteristic> {
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.handle == handle)
    }

    /// Total number of characteristics.
    pub fn characteristic_count(&self) -> usize {
        self.services.iter().map(|s| s.characteristics.len()).sum()
    }

    /// Whether no service was discovered.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uuid::{BATTERY_LEVEL, BATTERY_SERVICE, DEVICE_INFO_SERVICE, MODEL_NUMBER};

    fn raw(uuid: Uuid, handle: u16, properties: u8) -> RawCharacteristic {
        RawCharacteristic {
            uuid,
            handle: CharacteristicHandle(handle),
            properties,
        }
    }

    #[test]
    fn test_properties_decoding() {
        // broadcast (0x01) and extended (0x80) bits are dropped
        let props = CharacteristicProperties::from_bits(0x01 | 0x02 | 0x10 | 0x80);
        assert!(props.can_read());
        assert!(props.can_notify());
        assert!(!props.can_write());
        assert_eq!(props.bits(), 0x12);
        assert_eq!(props.to_string(), "read|notify");

        let wnr = CharacteristicProperties::from_properties(&[
            CharacteristicProperty::WriteWithoutResponse,
        ]);
        assert!(wnr.can_write());
        assert!(!wnr.contains(CharacteristicProperty::Write));
        assert_eq!(CharacteristicProperties::default().to_string(), "-");
    }

    #[test]
    fn test_catalog_preserves_stack_order() {
        let catalog = GattCatalog::from_raw(vec![
            RawService {
                uuid: DEVICE_INFO_SERVICE,
                characteristics: vec![raw(MODEL_NUMBER, 0x0010, 0x02)],
            },
            RawService {
                uuid: BATTERY_SERVICE,
                characteristics: vec![raw(BATTERY_LEVEL, 0x0003, 0x12)],
            },
        ])
        .unwrap();

        let order: Vec<_> = catalog.services().iter().map(|s| s.uuid).collect();
        assert_eq!(order, [DEVICE_INFO_SERVICE, BATTERY_SERVICE]);
        assert_eq!(catalog.characteristic_count(), 2);
        let battery = catalog.characteristic(CharacteristicHandle(0x0003)).unwrap();
        assert_eq!(battery.uuid, BATTERY_LEVEL);
        assert!(battery.properties.can_notify());
        assert!(catalog.service(&BATTERY_SERVICE).is_some());
    }

    #[test]
    fn test_catalog_rejects_duplicate_handles() {
        let result = GattCatalog::from_raw(vec![RawService {
            uuid: BATTERY_SERVICE,
            characteristics: vec![raw(BATTERY_LEVEL, 7, 0x02), raw(MODEL_NUMBER, 7, 0x02)],
        }]);
        assert_eq!(
            result.unwrap_err(),
            ParseError::DuplicateHandle(CharacteristicHandle(7))
        );
    }

    #[test]
    fn test_handle_parse_and_display() {
        assert_eq!("0x001a".parse::<CharacteristicHandle>().unwrap(), CharacteristicHandle(26));
        assert_eq!("42".parse::<CharacteristicHandle>().unwrap(), CharacteristicHandle(42));
        assert!("0xzz".parse::<CharacteristicHandle>().is_err());
        assert_eq!(CharacteristicHandle(26).to_string(), "0x001a");
    }
}

//! Well-known Bluetooth UUIDs.
//!
//! Assigned numbers for the services and characteristics an operator most
//! often runs into, plus helpers for expanding 16- and 32-bit short forms
//! onto the Bluetooth base UUID.

use uuid::{Uuid, uuid};

/// The Bluetooth base UUID (`00000000-0000-1000-8000-00805f9b34fb`).
pub const BLUETOOTH_BASE: Uuid = uuid!("00000000-0000-1000-8000-00805f9b34fb");

// --- Standard BLE Service UUIDs ---

/// Generic Access Profile (GAP) service.
pub const GAP_SERVICE: Uuid = uuid!("00001800-0000-1000-8000-00805f9b34fb");

/// Generic Attribute Profile (GATT) service.
pub const GATT_SERVICE: Uuid = uuid!("00001801-0000-1000-8000-00805f9b34fb");

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = uuid!("0000180a-0000-1000-8000-00805f9b34fb");

/// Heart Rate service.
pub const HEART_RATE_SERVICE: Uuid = uuid!("0000180d-0000-1000-8000-00805f9b34fb");

/// Battery service.
pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");

/// Environmental Sensing service.
pub const ENVIRONMENTAL_SENSING_SERVICE: Uuid = uuid!("0000181a-0000-1000-8000-00805f9b34fb");

// --- Standard Characteristic UUIDs ---

/// Device name characteristic.
pub const DEVICE_NAME: Uuid = uuid!("00002a00-0000-1000-8000-00805f9b34fb");

/// Appearance characteristic.
pub const APPEARANCE: Uuid = uuid!("00002a01-0000-1000-8000-00805f9b34fb");

/// Service Changed characteristic.
pub const SERVICE_CHANGED: Uuid = uuid!("00002a05-0000-1000-8000-00805f9b34fb");

/// Battery level characteristic.
pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");

/// System ID characteristic.
pub const SYSTEM_ID: Uuid = uuid!("00002a23-0000-1000-8000-00805f9b34fb");

/// Model number string characteristic.
pub const MODEL_NUMBER: Uuid = uuid!("00002a24-0000-1000-8000-00805f9b34fb");

/// Serial number string characteristic.
pub const SERIAL_NUMBER: Uuid = uuid!("00002a25-0000-1000-8000-00805f9b34fb");

/// Firmware revision string characteristic.
pub const FIRMWARE_REVISION: Uuid = uuid!("00002a26-0000-1000-8000-00805f9b34fb");

/// Hardware revision string characteristic.
pub const HARDWARE_REVISION: Uuid = uuid!("00002a27-0000-1000-8000-00805f9b34fb");

/// Software revision string characteristic.
pub const SOFTWARE_REVISION: Uuid = uuid!("00002a28-0000-1000-8000-00805f9b34fb");

/// Manufacturer name string characteristic.
pub const MANUFACTURER_NAME: Uuid = uuid!("00002a29-0000-1000-8000-00805f9b34fb");

/// Heart Rate Measurement characteristic.
pub const HEART_RATE_MEASUREMENT: Uuid = uuid!("00002a37-0000-1000-8000-00805f9b34fb");

/// Temperature characteristic.
pub const TEMPERATURE: Uuid = uuid!("00002a6e-0000-1000-8000-00805f9b34fb");

/// Humidity characteristic.
pub const HUMIDITY: Uuid = uuid!("00002a6f-0000-1000-8000-00805f9b34fb");

const NAMES: &[(Uuid, &str)] = &[
    (GAP_SERVICE, "Generic Access"),
    (GATT_SERVICE, "Generic Attribute"),
    (DEVICE_INFO_SERVICE, "Device Information"),
    (HEART_RATE_SERVICE, "Heart Rate"),
    (BATTERY_SERVICE, "Battery Service"),
    (ENVIRONMENTAL_SENSING_SERVICE, "Environmental Sensing"),
    (DEVICE_NAME, "Device Name"),
    (APPEARANCE, "Appearance"),
    (SERVICE_CHANGED, "Service Changed"),
    (BATTERY_LEVEL, "Battery Level"),
    (SYSTEM_ID, "System ID"),
    (MODEL_NUMBER, "Model Number String"),
    (SERIAL_NUMBER, "Serial Number String"),
    (FIRMWARE_REVISION, "Firmware Revision String"),
    (HARDWARE_REVISION, "Hardware Revision String"),
    (SOFTWARE_REVISION, "Software Revision String"),
    (MANUFACTURER_NAME, "Manufacturer Name String"),
    (HEART_RATE_MEASUREMENT, "Heart Rate Measurement"),
    (TEMPERATURE, "Temperature"),
    (HUMIDITY, "Humidity"),
];

/// Expand a 16-bit assigned number onto the Bluetooth base UUID.
///
/// ```
/// use gattscope_types::uuid::{from_short, BATTERY_SERVICE};
///
/// assert_eq!(from_short(0x180f), BATTERY_SERVICE);
/// ```
#[must_use]
pub const fn from_short(short: u16) -> Uuid {
    from_u32(short as u32)
}

/// Expand a 32-bit assigned number onto the Bluetooth base UUID.
#[must_use]
pub const fn from_u32(value: u32) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE.as_u128() | ((value as u128) << 96))
}

/// Return the 16-bit short form if the UUID sits on the Bluetooth base.
#[must_use]
pub fn to_short(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    let low_mask = (1u128 << 96) - 1;
    if value & low_mask != BLUETOOTH_BASE.as_u128() {
        return None;
    }
    u16::try_from(value >> 96).ok()
}

/// Human-readable name for a well-known UUID.
#[must_use]
pub fn name_for(uuid: &Uuid) -> Option<&'static str> {
    NAMES
        .iter()
        .find(|(known, _)| known == uuid)
        .map(|(_, name)| *name)
}

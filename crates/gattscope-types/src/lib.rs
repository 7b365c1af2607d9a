//! Platform-agnostic types for BLE discovery and GATT sessions.
//!
//! This crate provides the passive data model shared by the session engine
//! (gattscope-core) and its front ends.
//!
//! # Features
//!
//! - AD structure parsing and value rendering
//! - Advertisement records and the first-write-wins device registry
//! - GATT catalog types and characteristic property decoding
//! - Well-known Bluetooth UUIDs
//!
//! # Example
//!
//! ```
//! use gattscope_types::{AddressType, AdvertisementRecord, DeviceRegistry, Observation};
//! use gattscope_types::advertisement::parse_ad_payload;
//!
//! let payload = [0x05, 0x09, b'L', b'a', b'm', b'p'];
//! let mut observation = Observation::new("aa:bb:cc:dd:ee:ff", AddressType::Public, -61);
//! observation.ad_structures = parse_ad_payload(&payload).unwrap();
//!
//! let mut registry = DeviceRegistry::new();
//! assert_eq!(registry.insert_first(AdvertisementRecord::from(observation)), Some(1));
//! assert_eq!(registry.records()[0].local_name.as_deref(), Some("Lamp"));
//! ```

pub mod advertisement;
pub mod error;
pub mod gatt;
pub mod hex;
pub mod types;
pub mod uuid;

pub use advertisement::{AdStructure, parse_ad_payload};
pub use error::{ParseError, ParseResult};
pub use gatt::{
    CharacteristicHandle, CharacteristicProperties, CharacteristicProperty, GattCatalog,
    GattCharacteristic, GattService, RawCharacteristic, RawService,
};
pub use types::{AddressType, AdvertisementRecord, DeviceRegistry, Observation, normalize_address};

//! BLE central session engine.
//!
//! This crate discovers advertising peripherals and drives GATT sessions
//! against them:
//!
//! - [`DiscoveryEngine`]: polls the scanner until a deadline and keeps the
//!   first sighting of every address in a [`DeviceRegistry`]
//! - [`GattSession`]: connects, enumerates the [`GattCatalog`], and runs
//!   reads, writes and notification subscriptions one at a time
//! - [`SessionController`]: runs scans, exports results, and holds at most
//!   one live session per address
//!
//! The radio is reached through the [`BleHost`] and [`HostLink`] traits.
//! [`BtleplugHost`] is the production implementation; [`MockHost`] replays
//! scripted behavior for tests.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use gattscope_core::{BtleplugHost, ScanOptions, SessionController};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let host = Arc::new(BtleplugHost::new().await?);
//!     let controller = SessionController::new(host);
//!
//!     let registry = controller.scan(&ScanOptions::new().duration_secs(10)).await?;
//!     for record in &registry {
//!         println!("{} {} dBm {:?}", record.address, record.rssi, record.local_name);
//!     }
//!     controller.export_csv("ble_devices.csv").await?;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod catalog;
pub mod controller;
pub mod discovery;
pub mod error;
pub mod events;
pub mod export;
pub mod mock;
pub mod retry;
pub mod session;
pub mod traits;

pub use adapter::{BtleplugHost, BtleplugLink};
pub use catalog::{describe, discover_catalog};
pub use controller::SessionController;
pub use discovery::{DiscoveryEngine, DiscoveryHandle, DiscoveryObserver, ScanOptions};
pub use error::{Error, Result, StackError, StackResult};
pub use events::{BleEvent, EventDispatcher, EventReceiver, EventSender};
pub use export::{CSV_HEADERS, ExportRow, export_csv, write_csv};
pub use mock::{MockHost, MockLink, MockPeripheral};
pub use retry::{RetryConfig, with_retry};
pub use session::{GattSession, Notification, NotificationHandler, SessionConfig, SessionState};
pub use traits::{BleHost, HostLink, NotificationStream, RawNotification, WriteKind};

// Re-export from gattscope-types
pub use gattscope_types::uuid as uuids;
pub use gattscope_types::{
    AddressType, AdvertisementRecord, CharacteristicHandle, CharacteristicProperties,
    CharacteristicProperty, DeviceRegistry, GattCatalog, GattCharacteristic, GattService,
    Observation,
};

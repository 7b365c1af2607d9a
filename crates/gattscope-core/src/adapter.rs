//! Host stack backed by btleplug.
//!
//! btleplug exposes decoded peripheral properties rather than raw
//! advertising payloads, and identifies characteristics by UUID rather than
//! by ATT handle. [`BtleplugHost`] rebuilds AD structures from the decoded
//! properties, and [`BtleplugLink`] assigns per-connection handles in the
//! stack's enumeration order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    AddressType as BtAddressType, Central, Characteristic, Manager as _, Peripheral as _,
    PeripheralProperties, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use futures::future::ready;
use tokio::sync::RwLock;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};
use uuid::Uuid;

use gattscope_types::advertisement::{
    AdStructure, COMPLETE_128B_SERVICES, COMPLETE_LOCAL_NAME, MANUFACTURER, SERVICE_DATA_16B,
    SERVICE_DATA_128B, TX_POWER,
};
use gattscope_types::uuid::to_short;
use gattscope_types::{
    AddressType, CharacteristicHandle, Observation, RawCharacteristic, RawService,
    normalize_address,
};

use crate::error::{Error, Result, StackError, StackResult};
use crate::traits::{
    BleHost, HostLink, NotificationStream, PendingLink, RawNotification, WriteKind,
};

/// How long `connect` keeps scanning for a peripheral the stack has not seen.
const LOOKUP_WINDOW: Duration = Duration::from_secs(5);

/// [`BleHost`] over the first Bluetooth adapter.
#[derive(Debug)]
pub struct BtleplugHost {
    adapter: Adapter,
    scanning: AtomicBool,
}

impl BtleplugHost {
    /// Use the first adapter the platform reports.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdapterUnavailable`] if there is no adapter.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::AdapterUnavailable("no Bluetooth adapter found".to_string()))?;
        match adapter.adapter_info().await {
            Ok(info) => info!("Using adapter {}", info),
            Err(e) => debug!("Adapter info unavailable: {}", e),
        }
        Ok(Self::with_adapter(adapter))
    }

    /// Use a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            scanning: AtomicBool::new(false),
        }
    }

    async fn ensure_scanning(&self) -> StackResult<()> {
        if !self.scanning.swap(true, Ordering::SeqCst) {
            if let Err(e) = self.adapter.start_scan(ScanFilter::default()).await {
                self.scanning.store(false, Ordering::SeqCst);
                return Err(scan_error(e));
            }
        }
        Ok(())
    }

    async fn heard(&self) -> StackResult<Vec<(Peripheral, Observation)>> {
        let peripherals = self.adapter.peripherals().await.map_err(scan_error)?;
        let mut heard = Vec::with_capacity(peripherals.len());
        for peripheral in peripherals {
            match peripheral.properties().await {
                Ok(Some(properties)) => {
                    let address = identifier(&properties, &peripheral.id());
                    if let Some(observation) = observation(address, &properties) {
                        heard.push((peripheral, observation));
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("Error reading peripheral properties: {}", e),
            }
        }
        Ok(heard)
    }

    async fn find(&self, address: &str) -> StackResult<Peripheral> {
        let deadline = Instant::now() + LOOKUP_WINDOW;
        loop {
            let found = self
                .heard()
                .await?
                .into_iter()
                .find(|(_, observation)| normalize_address(&observation.address) == address);
            if let Some((peripheral, _)) = found {
                return Ok(peripheral);
            }
            if Instant::now() >= deadline {
                return Err(StackError::DeviceNotFound(address.to_string()));
            }
            self.ensure_scanning().await?;
            sleep(Duration::from_millis(200)).await;
        }
    }
}

#[async_trait]
impl BleHost for BtleplugHost {
    async fn scan(&self, window: Duration) -> StackResult<Vec<Observation>> {
        self.ensure_scanning().await?;
        sleep(window).await;
        Ok(self.heard().await?.into_iter().map(|(_, obs)| obs).collect())
    }

    async fn stop_scan(&self) -> StackResult<()> {
        if self.scanning.swap(false, Ordering::SeqCst) {
            self.adapter.stop_scan().await?;
        }
        Ok(())
    }

    async fn connect(&self, address: &str) -> StackResult<Box<dyn HostLink>> {
        let address = normalize_address(address);
        let peripheral = self.find(&address).await?;
        // Connecting while scanning is unreliable on several stacks.
        if let Err(e) = self.stop_scan().await {
            debug!("Failed to stop scanning before connect: {}", e);
        }
        info!("Connecting to {}...", address);
        // Disconnects if this future is dropped mid-connect.
        let pending = PendingLink::new(Box::new(BtleplugLink::new(peripheral.clone())));
        peripheral.connect().await?;
        info!("Connected!");
        pending.establish()
    }
}

/// Identifier for a peripheral: the Bluetooth address, or the platform
/// peripheral id where the address is hidden (macOS).
fn identifier(properties: &PeripheralProperties, id: &PeripheralId) -> String {
    let address = properties.address.to_string();
    if address == "00:00:00:00:00:00" {
        format!("{:?}", id)
            .trim_start_matches("PeripheralId(")
            .trim_end_matches(')')
            .to_string()
    } else {
        address
    }
}

/// Adapter-level failures end the scan; everything else is transient.
fn scan_error(err: btleplug::Error) -> StackError {
    match err {
        btleplug::Error::PermissionDenied | btleplug::Error::NotSupported(_) => {
            StackError::AdapterUnavailable(err.to_string())
        }
        other => StackError::from(other),
    }
}

/// Build an observation from decoded properties.
///
/// Returns `None` when the stack reports no RSSI: the peripheral is known
/// from an earlier session but was not heard on air.
fn observation(address: String, properties: &PeripheralProperties) -> Option<Observation> {
    let rssi = properties.rssi?;
    let address_type = match properties.address_type {
        Some(BtAddressType::Random) => AddressType::Random,
        _ => AddressType::Public,
    };
    let mut observation = Observation::new(address, address_type, rssi);
    observation.ad_structures = ad_structures(properties);
    Some(observation)
}

/// Reconstruct AD structures in a fixed order: name, TX power, services,
/// service data (by UUID), manufacturer data (by company id).
fn ad_structures(properties: &PeripheralProperties) -> Vec<AdStructure> {
    let mut structures = Vec::new();
    if let Some(name) = &properties.local_name {
        structures.push(AdStructure::new(COMPLETE_LOCAL_NAME, name.clone()));
    }
    if let Some(level) = properties.tx_power_level {
        structures.push(AdStructure::from_raw(TX_POWER, &[level as i8 as u8]));
    }
    if !properties.services.is_empty() {
        let raw: Vec<u8> = properties
            .services
            .iter()
            .flat_map(|uuid| uuid.as_bytes().iter().rev().copied())
            .collect();
        structures.push(AdStructure::from_raw(COMPLETE_128B_SERVICES, &raw));
    }

    let mut service_data: Vec<(&Uuid, &Vec<u8>)> = properties.service_data.iter().collect();
    service_data.sort();
    for (uuid, data) in service_data {
        let (ad_type, mut raw) = match to_short(uuid) {
            Some(short) => (SERVICE_DATA_16B, short.to_le_bytes().to_vec()),
            None => (
                SERVICE_DATA_128B,
                uuid.as_bytes().iter().rev().copied().collect(),
            ),
        };
        raw.extend_from_slice(data);
        structures.push(AdStructure::from_raw(ad_type, &raw));
    }

    let mut manufacturer: Vec<(&u16, &Vec<u8>)> = properties.manufacturer_data.iter().collect();
    manufacturer.sort();
    for (company, data) in manufacturer {
        let mut raw = company.to_le_bytes().to_vec();
        raw.extend_from_slice(data);
        structures.push(AdStructure::from_raw(MANUFACTURER, &raw));
    }
    structures
}

/// [`HostLink`] over a connected btleplug peripheral.
pub struct BtleplugLink {
    peripheral: Peripheral,
    characteristics: RwLock<HashMap<CharacteristicHandle, Characteristic>>,
}

impl std::fmt::Debug for BtleplugLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleplugLink")
            .field("peripheral", &self.peripheral.id())
            .finish_non_exhaustive()
    }
}

impl BtleplugLink {
    fn new(peripheral: Peripheral) -> Self {
        Self {
            peripheral,
            characteristics: RwLock::new(HashMap::new()),
        }
    }

    async fn characteristic(&self, handle: CharacteristicHandle) -> StackResult<Characteristic> {
        self.characteristics
            .read()
            .await
            .get(&handle)
            .cloned()
            .ok_or_else(|| StackError::Other(format!("no characteristic with handle {handle}")))
    }
}

#[async_trait]
impl HostLink for BtleplugLink {
    async fn services(&self) -> StackResult<Vec<RawService>> {
        self.peripheral.discover_services().await?;

        let mut table = HashMap::new();
        let mut next = 1u16;
        let services = self
            .peripheral
            .services()
            .into_iter()
            .map(|service| RawService {
                uuid: service.uuid,
                characteristics: service
                    .characteristics
                    .into_iter()
                    .map(|characteristic| {
                        let handle = CharacteristicHandle(next);
                        next = next.wrapping_add(1);
                        let raw = RawCharacteristic {
                            uuid: characteristic.uuid,
                            handle,
                            properties: characteristic.properties.bits(),
                        };
                        table.insert(handle, characteristic);
                        raw
                    })
                    .collect(),
            })
            .collect();
        *self.characteristics.write().await = table;
        Ok(services)
    }

    async fn read(&self, handle: CharacteristicHandle) -> StackResult<Vec<u8>> {
        let characteristic = self.characteristic(handle).await?;
        Ok(self.peripheral.read(&characteristic).await?)
    }

    async fn write(
        &self,
        handle: CharacteristicHandle,
        value: &[u8],
        kind: WriteKind,
    ) -> StackResult<()> {
        let characteristic = self.characteristic(handle).await?;
        let write_type = match kind {
            WriteKind::WithResponse => WriteType::WithResponse,
            WriteKind::WithoutResponse => WriteType::WithoutResponse,
        };
        Ok(self.peripheral.write(&characteristic, value, write_type).await?)
    }

    async fn subscribe(&self, handle: CharacteristicHandle) -> StackResult<()> {
        let characteristic = self.characteristic(handle).await?;
        Ok(self.peripheral.subscribe(&characteristic).await?)
    }

    async fn unsubscribe(&self, handle: CharacteristicHandle) -> StackResult<()> {
        let characteristic = self.characteristic(handle).await?;
        Ok(self.peripheral.unsubscribe(&characteristic).await?)
    }

    async fn notifications(&self) -> StackResult<NotificationStream> {
        // Notifications carry only a UUID; attribute each to the first
        // characteristic enumerated with it.
        let mut by_uuid: HashMap<Uuid, CharacteristicHandle> = HashMap::new();
        let mut table: Vec<_> = self.characteristics.read().await.iter().map(|(h, c)| (*h, c.uuid)).collect();
        table.sort();
        for (handle, uuid) in table {
            by_uuid.entry(uuid).or_insert(handle);
        }

        let stream = self.peripheral.notifications().await?;
        Ok(stream
            .filter_map(move |n| {
                ready(by_uuid.get(&n.uuid).map(|handle| RawNotification {
                    handle: *handle,
                    value: n.value,
                }))
            })
            .boxed())
    }

    async fn disconnect(&self) -> StackResult<()> {
        if let Err(e) = self.peripheral.disconnect().await {
            warn!("Peripheral disconnect failed: {}", e);
            return Err(e.into());
        }
        Ok(())
    }
}

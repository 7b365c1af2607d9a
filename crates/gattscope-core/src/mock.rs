//! In-memory host stack for testing.
//!
//! [`MockHost`] implements [`BleHost`] without any radio: scan polls replay
//! scripted batches, and connections are served from registered
//! [`MockPeripheral`]s. Each established link is a [`MockLink`] whose
//! state tests can inspect and drive.
//!
//! # Features
//!
//! - **Scripted scans**: queue observation batches and stack errors per poll
//! - **Failure injection**: connect, discovery and per-read failures
//! - **Latency simulation**: delay connects, discovery and reads
//! - **Notification injection**: push values into a live link
//! - **Link loss**: drop a live link from the peripheral side

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use gattscope_types::{
    CharacteristicHandle, Observation, RawCharacteristic, RawService, normalize_address,
};

use crate::error::{StackError, StackResult};
use crate::traits::{
    BleHost, HostLink, NotificationStream, PendingLink, RawNotification, WriteKind,
};

/// A simulated peripheral, registered on a [`MockHost`].
///
/// # Example
///
/// ```
/// use gattscope_core::mock::MockPeripheral;
/// use gattscope_types::uuid::{BATTERY_LEVEL, BATTERY_SERVICE};
///
/// let peripheral = MockPeripheral::new()
///     .service(BATTERY_SERVICE, [(BATTERY_LEVEL, 1, 0x12)])
///     .value(1, vec![90]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockPeripheral {
    services: Vec<RawService>,
    values: HashMap<CharacteristicHandle, Vec<u8>>,
    connect_error: Option<StackError>,
    discovery_error: Option<StackError>,
    connect_latency: Duration,
    link_stall: Duration,
    discovery_latency: Duration,
}

impl MockPeripheral {
    /// A peripheral with no services.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service; each characteristic is `(uuid, handle, properties byte)`.
    #[must_use]
    pub fn service(
        mut self,
        uuid: Uuid,
        characteristics: impl IntoIterator<Item = (Uuid, u16, u8)>,
    ) -> Self {
        self.services.push(RawService {
            uuid,
            characteristics: characteristics
                .into_iter()
                .map(|(uuid, handle, properties)| RawCharacteristic {
                    uuid,
                    handle: CharacteristicHandle(handle),
                    properties,
                })
                .collect(),
        });
        self
    }

    /// Set the value a read of `handle` returns.
    #[must_use]
    pub fn value(mut self, handle: u16, value: Vec<u8>) -> Self {
        self.values.insert(CharacteristicHandle(handle), value);
        self
    }

    /// Make every connect attempt fail.
    #[must_use]
    pub fn fail_connect(mut self, error: StackError) -> Self {
        self.connect_error = Some(error);
        self
    }

    /// Make service enumeration fail.
    #[must_use]
    pub fn fail_discovery(mut self, error: StackError) -> Self {
        self.discovery_error = Some(error);
        self
    }

    /// Delay link establishment.
    #[must_use]
    pub fn connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }

    /// Bring the link up, then stall before the connect call returns.
    ///
    /// Models a stack that finishes connecting while the caller has already
    /// given up.
    #[must_use]
    pub fn stall_after_link(mut self, stall: Duration) -> Self {
        self.link_stall = stall;
        self
    }

    /// Delay service enumeration.
    #[must_use]
    pub fn discovery_latency(mut self, latency: Duration) -> Self {
        self.discovery_latency = latency;
        self
    }
}

/// A mock host stack for testing.
#[derive(Default)]
pub struct MockHost {
    scans: Mutex<VecDeque<StackResult<Vec<Observation>>>>,
    scan_count: AtomicU32,
    stop_count: AtomicU32,
    connect_count: AtomicU32,
    peripherals: std::sync::RwLock<HashMap<String, MockPeripheral>>,
    links: RwLock<HashMap<String, Arc<MockLink>>>,
}

impl std::fmt::Debug for MockHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHost")
            .field("scan_count", &self.scan_count.load(Ordering::Relaxed))
            .field("stop_count", &self.stop_count.load(Ordering::Relaxed))
            .field("connect_count", &self.connect_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockHost {
    /// An empty host: scans hear nothing and no peripheral is connectable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of one future scan poll.
    ///
    /// Polls past the end of the script return an empty batch.
    pub async fn push_scan(&self, result: StackResult<Vec<Observation>>) {
        self.scans.lock().await.push_back(result);
    }

    /// Queue a batch of observations for one poll.
    pub async fn push_batch(&self, batch: Vec<Observation>) {
        self.push_scan(Ok(batch)).await;
    }

    /// Register a connectable peripheral.
    pub fn add_peripheral(&self, address: &str, peripheral: MockPeripheral) {
        if let Ok(mut peripherals) = self.peripherals.write() {
            peripherals.insert(normalize_address(address), peripheral);
        }
    }

    /// Number of scan polls served.
    pub fn scan_count(&self) -> u32 {
        self.scan_count.load(Ordering::SeqCst)
    }

    /// Number of `stop_scan` calls.
    pub fn stop_count(&self) -> u32 {
        self.stop_count.load(Ordering::SeqCst)
    }

    /// Number of connect attempts.
    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// The most recent link established to `address`.
    pub async fn link(&self, address: &str) -> Option<Arc<MockLink>> {
        self.links.read().await.get(&normalize_address(address)).cloned()
    }

    fn peripheral(&self, address: &str) -> Option<MockPeripheral> {
        self.peripherals
            .read()
            .ok()
            .and_then(|peripherals| peripherals.get(address).cloned())
    }
}

#[async_trait]
impl BleHost for MockHost {
    async fn scan(&self, window: Duration) -> StackResult<Vec<Observation>> {
        self.scan_count.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(window).await;
        self.scans.lock().await.pop_front().unwrap_or(Ok(Vec::new()))
    }

    async fn stop_scan(&self) -> StackResult<()> {
        self.stop_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn connect(&self, address: &str) -> StackResult<Box<dyn HostLink>> {
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        let address = normalize_address(address);
        let peripheral = self
            .peripheral(&address)
            .ok_or_else(|| StackError::DeviceNotFound(address.clone()))?;
        if !peripheral.connect_latency.is_zero() {
            tokio::time::sleep(peripheral.connect_latency).await;
        }
        if let Some(error) = peripheral.connect_error.clone() {
            return Err(error);
        }
        let stall = peripheral.link_stall;
        let link = Arc::new(MockLink::new(peripheral));
        self.links.write().await.insert(address, Arc::clone(&link));
        let pending = PendingLink::new(Box::new(SharedLink(link)));
        if !stall.is_zero() {
            tokio::time::sleep(stall).await;
        }
        pending.establish()
    }
}

/// Live state of one mock connection.
#[derive(Debug)]
pub struct MockLink {
    services: Vec<RawService>,
    discovery_error: Option<StackError>,
    discovery_latency: Duration,
    values: RwLock<HashMap<CharacteristicHandle, Vec<u8>>>,
    writes: RwLock<Vec<(CharacteristicHandle, Vec<u8>, WriteKind)>>,
    subscribed: RwLock<Vec<CharacteristicHandle>>,
    listeners: Mutex<Vec<mpsc::UnboundedSender<RawNotification>>>,
    connected: AtomicBool,
    read_count: AtomicU32,
    read_latency_ms: AtomicU64,
    remaining_read_failures: AtomicU32,
    read_failure: std::sync::Mutex<Option<StackError>>,
}

impl MockLink {
    fn new(peripheral: MockPeripheral) -> Self {
        Self {
            services: peripheral.services,
            discovery_error: peripheral.discovery_error,
            discovery_latency: peripheral.discovery_latency,
            values: RwLock::new(peripheral.values),
            writes: RwLock::new(Vec::new()),
            subscribed: RwLock::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            read_count: AtomicU32::new(0),
            read_latency_ms: AtomicU64::new(0),
            remaining_read_failures: AtomicU32::new(0),
            read_failure: std::sync::Mutex::new(None),
        }
    }

    /// Whether the link is still up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Number of reads served (including failed ones).
    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::SeqCst)
    }

    /// Fail the next `count` reads with `error`.
    pub fn fail_next_reads(&self, count: u32, error: StackError) {
        if let Ok(mut slot) = self.read_failure.lock() {
            *slot = Some(error);
        }
        self.remaining_read_failures.store(count, Ordering::SeqCst);
    }

    /// Delay every read.
    pub fn set_read_latency(&self, latency: Duration) {
        self.read_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Writes received, in order.
    pub async fn writes(&self) -> Vec<(CharacteristicHandle, Vec<u8>, WriteKind)> {
        self.writes.read().await.clone()
    }

    /// Handles with notifications enabled at the link level.
    pub async fn subscribed(&self) -> Vec<CharacteristicHandle> {
        self.subscribed.read().await.clone()
    }

    /// Push a notification to every open notification stream.
    ///
    /// Delivery does not depend on link-level subscription; filtering is
    /// the session's job.
    pub async fn notify(&self, handle: CharacteristicHandle, value: Vec<u8>) {
        let mut listeners = self.listeners.lock().await;
        listeners.retain(|tx| {
            tx.unbounded_send(RawNotification {
                handle,
                value: value.clone(),
            })
            .is_ok()
        });
    }

    /// Drop the link from the peripheral side: the link goes down and every
    /// notification stream ends, with no call from the session.
    pub async fn sever(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.listeners.lock().await.clear();
    }

    fn check_connected(&self) -> StackResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(StackError::NotConnected)
        }
    }

    fn take_read_failure(&self) -> Option<StackError> {
        let remaining = self.remaining_read_failures.load(Ordering::SeqCst);
        if remaining == 0 {
            return None;
        }
        self.remaining_read_failures
            .store(remaining - 1, Ordering::SeqCst);
        self.read_failure.lock().ok().and_then(|slot| slot.clone())
    }
}

/// Boxed handle onto a shared [`MockLink`].
struct SharedLink(Arc<MockLink>);

#[async_trait]
impl HostLink for SharedLink {
    async fn services(&self) -> StackResult<Vec<RawService>> {
        let link = &self.0;
        link.check_connected()?;
        if !link.discovery_latency.is_zero() {
            tokio::time::sleep(link.discovery_latency).await;
        }
        match &link.discovery_error {
            Some(error) => Err(error.clone()),
            None => Ok(link.services.clone()),
        }
    }

    async fn read(&self, handle: CharacteristicHandle) -> StackResult<Vec<u8>> {
        let link = &self.0;
        link.check_connected()?;
        link.read_count.fetch_add(1, Ordering::SeqCst);
        let latency = link.read_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if let Some(error) = link.take_read_failure() {
            return Err(error);
        }
        link.values
            .read()
            .await
            .get(&handle)
            .cloned()
            .ok_or_else(|| StackError::Other(format!("no value for {handle}")))
    }

    async fn write(
        &self,
        handle: CharacteristicHandle,
        value: &[u8],
        kind: WriteKind,
    ) -> StackResult<()> {
        let link = &self.0;
        link.check_connected()?;
        link.writes.write().await.push((handle, value.to_vec(), kind));
        link.values.write().await.insert(handle, value.to_vec());
        Ok(())
    }

    async fn subscribe(&self, handle: CharacteristicHandle) -> StackResult<()> {
        self.0.check_connected()?;
        let mut subscribed = self.0.subscribed.write().await;
        if !subscribed.contains(&handle) {
            subscribed.push(handle);
        }
        Ok(())
    }

    async fn unsubscribe(&self, handle: CharacteristicHandle) -> StackResult<()> {
        self.0.check_connected()?;
        self.0.subscribed.write().await.retain(|h| *h != handle);
        Ok(())
    }

    async fn notifications(&self) -> StackResult<NotificationStream> {
        self.0.check_connected()?;
        let (tx, rx) = mpsc::unbounded();
        self.0.listeners.lock().await.push(tx);
        Ok(rx.boxed())
    }

    async fn disconnect(&self) -> StackResult<()> {
        self.0.connected.store(false, Ordering::SeqCst);
        self.0.subscribed.write().await.clear();
        // Dropping the senders ends every notification stream.
        self.0.listeners.lock().await.clear();
        Ok(())
    }
}

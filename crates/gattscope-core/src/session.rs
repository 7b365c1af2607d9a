//! GATT session state machine.
//!
//! A [`GattSession`] owns one link to one peripheral. It walks
//! `Disconnected -> Connecting -> Discovering -> Ready -> Closing ->
//! Disconnected`, dropping to `Failed` if connection or discovery fails.
//! Characteristic operations are valid only in `Ready`, run one at a time in
//! submission order, and never change the state on their own.
//!
//! Notifications are delivered by a separate task that shares only the
//! subscription set and the callback with the session, so an in-flight read
//! or write never holds them back. When the stack closes that stream on a
//! `Ready` session, the link is gone and the session moves to `Failed`.
//!
//! A session is single-use: once it has left `Disconnected` it cannot be
//! connected again. Build a new one to reconnect.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use gattscope_types::{
    CharacteristicHandle, CharacteristicProperty, GattCatalog, GattCharacteristic, GattService,
    normalize_address,
};

use crate::catalog::discover_catalog;
use crate::error::{Error, Result, StackError, StackResult};
use crate::events::{BleEvent, EventDispatcher};
use crate::traits::{BleHost, HostLink, NotificationStream, WriteKind};

/// Lifecycle state of a [`GattSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No link. Initial state, and the state after a clean disconnect.
    Disconnected,
    /// Link establishment in progress.
    Connecting,
    /// Enumerating services and characteristics.
    Discovering,
    /// Catalog available; characteristic operations allowed.
    Ready,
    /// Tearing the link down.
    Closing,
    /// Connection or discovery failed, or the link dropped.
    Failed,
}

impl SessionState {
    /// Whether the session can no longer reach `Ready`.
    ///
    /// `Disconnected` is only terminal for a session that has already been
    /// connected once; see [`GattSession::is_spent`].
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Failed | SessionState::Disconnected)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Discovering => "discovering",
            SessionState::Ready => "ready",
            SessionState::Closing => "closing",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Timeouts applied by a [`GattSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Link establishment limit. Expiry fails the session.
    pub connect_timeout: Duration,
    /// Service enumeration limit. Expiry fails the session.
    pub discovery_timeout: Duration,
    /// Per-operation limit for reads, writes and (un)subscribes. Expiry is a
    /// transport error; the session stays `Ready`.
    pub operation_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            discovery_timeout: Duration::from_secs(10),
            operation_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    /// Create a configuration with default timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the per-operation timeout.
    #[must_use]
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if any timeout is zero.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("discovery_timeout", self.discovery_timeout),
            ("operation_timeout", self.operation_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::invalid_config(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }
}

/// A value pushed by a subscribed characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Characteristic that produced the value.
    pub handle: CharacteristicHandle,
    /// Payload, exactly as received.
    pub payload: Bytes,
    /// Arrival time.
    pub received_at: OffsetDateTime,
}

/// Callback invoked for every notification on a subscribed handle.
pub type NotificationHandler = Arc<dyn Fn(Notification) + Send + Sync>;

/// One connection to one peripheral.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use gattscope_core::{BtleplugHost, GattSession, SessionConfig};
/// use gattscope_types::CharacteristicHandle;
///
/// # async fn example() -> gattscope_core::Result<()> {
/// let host = Arc::new(BtleplugHost::new().await?);
/// let session = GattSession::new(host, SessionConfig::default());
/// session.connect("AA:BB:CC:DD:EE:FF").await?;
/// let value = session.read(CharacteristicHandle(1)).await?;
/// println!("{:02x?}", value);
/// session.disconnect().await?;
/// # Ok(())
/// # }
/// ```
pub struct GattSession {
    host: Arc<dyn BleHost>,
    config: SessionConfig,
    events: EventDispatcher,
    address: OnceLock<String>,
    state: Arc<watch::Sender<SessionState>>,
    /// The link doubles as the operation lock: holding it serializes
    /// connect, disconnect and characteristic operations in FIFO order.
    link: Mutex<Option<Box<dyn HostLink>>>,
    catalog: Arc<RwLock<Option<Arc<GattCatalog>>>>,
    subscriptions: Arc<RwLock<HashSet<CharacteristicHandle>>>,
    handler: Arc<RwLock<Option<NotificationHandler>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for GattSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GattSession")
            .field("address", &self.address.get())
            .field("state", &*self.state.borrow())
            .field("config", &self.config)
            .finish()
    }
}

impl GattSession {
    /// Create a disconnected session with its own event dispatcher.
    pub fn new(host: Arc<dyn BleHost>, config: SessionConfig) -> Self {
        Self::with_events(host, config, EventDispatcher::default())
    }

    /// Create a disconnected session publishing to `events`.
    pub fn with_events(host: Arc<dyn BleHost>, config: SessionConfig, events: EventDispatcher) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            host,
            config,
            events,
            address: OnceLock::new(),
            state: Arc::new(state),
            link: Mutex::new(None),
            catalog: Arc::new(RwLock::new(None)),
            subscriptions: Arc::new(RwLock::new(HashSet::new())),
            handler: Arc::new(RwLock::new(None)),
            pump: Mutex::new(None),
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Address this session connected (or tried to connect) to.
    pub fn address(&self) -> Option<&str> {
        self.address.get().map(String::as_str)
    }

    /// Whether the session has been used and can never reach `Ready` again.
    pub fn is_spent(&self) -> bool {
        self.address.get().is_some() && self.state().is_terminal()
    }

    /// The configuration in use.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Connect to `address` and enumerate its services.
    ///
    /// On success the session is `Ready` and the catalog is returned. On any
    /// failure the session is `Failed` and holds no catalog.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the session is not fresh
    /// - [`Error::Connect`] / [`Error::ConnectTimeout`] if the link fails
    /// - [`Error::Discovery`] if enumeration fails or times out
    #[tracing::instrument(level = "info", skip(self), fields(address = %address))]
    pub async fn connect(&self, address: &str) -> Result<Arc<GattCatalog>> {
        let mut slot = self.link.lock().await;
        let state = self.state();
        let address = normalize_address(address);
        if state != SessionState::Disconnected || self.address.set(address.clone()).is_err() {
            return Err(Error::InvalidState {
                operation: "connect",
                state,
            });
        }

        self.transition(SessionState::Connecting);
        let link = match timeout(self.config.connect_timeout, self.host.connect(&address)).await {
            Ok(Ok(link)) => link,
            Ok(Err(reason)) => return Err(self.fail(Error::connect(&address, reason))),
            Err(_) => {
                return Err(self.fail(Error::ConnectTimeout {
                    address,
                    duration: self.config.connect_timeout,
                }));
            }
        };

        self.transition(SessionState::Discovering);
        let catalog = match discover_catalog(link.as_ref(), self.config.discovery_timeout).await {
            Ok(catalog) => Arc::new(catalog),
            Err(e) => {
                release(link.as_ref()).await;
                return Err(self.fail(e));
            }
        };
        let stream = match link.notifications().await {
            Ok(stream) => stream,
            Err(e) => {
                release(link.as_ref()).await;
                return Err(self.fail(Error::Discovery(format!(
                    "notification channel unavailable: {e}"
                ))));
            }
        };

        *self.catalog.write().await = Some(Arc::clone(&catalog));
        *slot = Some(link);
        self.transition(SessionState::Ready);
        // Started after Ready so a stream that ends at once counts as a lost link.
        *self.pump.lock().await = Some(self.spawn_pump(stream, address));
        info!(
            services = catalog.services().len(),
            characteristics = catalog.characteristic_count(),
            "Session ready"
        );
        Ok(catalog)
    }

    /// Tear the session down.
    ///
    /// Waits for any in-flight operation, clears subscriptions and the
    /// catalog, and releases the link. Calling this on a session that is
    /// already `Disconnected` or `Failed` is a no-op.
    #[tracing::instrument(level = "info", skip(self), fields(address = ?self.address.get()))]
    pub async fn disconnect(&self) -> Result<()> {
        let mut slot = self.link.lock().await;
        if self.state().is_terminal() {
            // A link lost under a Ready session is still held here.
            if let Some(link) = slot.take() {
                release(link.as_ref()).await;
            }
            return Ok(());
        }

        self.transition(SessionState::Closing);
        if let Some(pump) = self.pump.lock().await.take() {
            pump.abort();
        }
        self.subscriptions.write().await.clear();
        *self.catalog.write().await = None;
        if let Some(link) = slot.take() {
            release(link.as_ref()).await;
        }
        self.transition(SessionState::Disconnected);
        Ok(())
    }

    /// The catalog of the current connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] outside `Ready`.
    pub async fn catalog(&self) -> Result<Arc<GattCatalog>> {
        let state = self.state();
        if state != SessionState::Ready {
            return Err(Error::NotReady(state));
        }
        self.catalog
            .read()
            .await
            .clone()
            .ok_or(Error::NotReady(state))
    }

    /// All services, in stack order.
    pub async fn list_services(&self) -> Result<Vec<GattService>> {
        Ok(self.catalog().await?.services().to_vec())
    }

    /// Characteristics of one service, in stack order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownService`] if the service is not in the catalog.
    pub async fn list_characteristics(&self, service: &Uuid) -> Result<Vec<GattCharacteristic>> {
        self.catalog()
            .await?
            .service(service)
            .map(|s| s.characteristics.clone())
            .ok_or(Error::UnknownService(*service))
    }

    /// Read a characteristic value.
    ///
    /// # Errors
    ///
    /// - [`Error::NotReady`] outside `Ready`
    /// - [`Error::NotReadable`] if the characteristic lacks Read
    /// - [`Error::Transport`] if the stack fails or the operation times out
    #[tracing::instrument(level = "debug", skip(self), fields(handle = %handle))]
    pub async fn read(&self, handle: CharacteristicHandle) -> Result<Bytes> {
        self.ensure_ready()?;
        let slot = self.link.lock().await;
        let (link, characteristic) = self.operable(slot.as_deref(), handle).await?;
        if !characteristic.properties.can_read() {
            return Err(Error::NotReadable(handle));
        }
        let value = self.bounded(link.read(handle)).await?;
        debug!(len = value.len(), "Read complete");
        Ok(Bytes::from(value))
    }

    /// Write a characteristic value.
    ///
    /// Uses a write request when the characteristic supports Write, and a
    /// write command when it only supports WriteWithoutResponse.
    #[tracing::instrument(level = "debug", skip(self, value), fields(handle = %handle, len = value.len()))]
    pub async fn write(&self, handle: CharacteristicHandle, value: &[u8]) -> Result<()> {
        self.ensure_ready()?;
        let slot = self.link.lock().await;
        let (link, characteristic) = self.operable(slot.as_deref(), handle).await?;
        let properties = characteristic.properties;
        if !properties.can_write() {
            return Err(Error::NotWritable(handle));
        }
        let kind = if properties.contains(CharacteristicProperty::Write) {
            WriteKind::WithResponse
        } else {
            WriteKind::WithoutResponse
        };
        self.bounded(link.write(handle, value, kind)).await
    }

    /// Enable notifications for a characteristic.
    ///
    /// Subscribing to an already subscribed handle is a no-op.
    #[tracing::instrument(level = "debug", skip(self), fields(handle = %handle))]
    pub async fn subscribe(&self, handle: CharacteristicHandle) -> Result<()> {
        self.ensure_ready()?;
        let slot = self.link.lock().await;
        let (link, characteristic) = self.operable(slot.as_deref(), handle).await?;
        if !characteristic.properties.can_notify() {
            return Err(Error::NotNotifiable(handle));
        }
        // Membership goes in first so a value pushed right after the CCCD
        // write is not dropped by the pump.
        if !self.subscriptions.write().await.insert(handle) {
            return Ok(());
        }
        if let Err(e) = self.bounded(link.subscribe(handle)).await {
            self.subscriptions.write().await.remove(&handle);
            return Err(e);
        }
        debug!("Subscribed");
        Ok(())
    }

    /// Disable notifications for a characteristic.
    ///
    /// Unsubscribing a handle that is not subscribed is a no-op.
    #[tracing::instrument(level = "debug", skip(self), fields(handle = %handle))]
    pub async fn unsubscribe(&self, handle: CharacteristicHandle) -> Result<()> {
        self.ensure_ready()?;
        let slot = self.link.lock().await;
        let (link, _) = self.operable(slot.as_deref(), handle).await?;
        if !self.subscriptions.read().await.contains(&handle) {
            return Ok(());
        }
        self.bounded(link.unsubscribe(handle)).await?;
        self.subscriptions.write().await.remove(&handle);
        debug!("Unsubscribed");
        Ok(())
    }

    /// Currently subscribed handles, ascending.
    pub async fn subscriptions(&self) -> Vec<CharacteristicHandle> {
        let mut handles: Vec<_> = self.subscriptions.read().await.iter().copied().collect();
        handles.sort();
        handles
    }

    /// Install the notification callback, replacing any previous one.
    pub async fn set_notification_handler<F>(&self, handler: F)
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        *self.handler.write().await = Some(Arc::new(handler));
    }

    /// Remove the notification callback. Notifications are then dropped.
    pub async fn clear_notification_handler(&self) {
        *self.handler.write().await = None;
    }

    /// Reject an operation before it queues behind connect or discovery.
    fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            SessionState::Ready => Ok(()),
            state => Err(Error::NotReady(state)),
        }
    }

    /// Resolve the link and characteristic for an operation in `Ready`.
    async fn operable<'a>(
        &self,
        link: Option<&'a dyn HostLink>,
        handle: CharacteristicHandle,
    ) -> Result<(&'a dyn HostLink, GattCharacteristic)> {
        let state = self.state();
        let link = match link {
            Some(link) if state == SessionState::Ready => link,
            _ => return Err(Error::NotReady(state)),
        };
        let catalog = self.catalog.read().await;
        let characteristic = catalog
            .as_ref()
            .and_then(|c| c.characteristic(handle))
            .cloned()
            .ok_or(Error::UnknownCharacteristic(handle))?;
        Ok((link, characteristic))
    }

    /// Apply the operation timeout and map stack failures to transport errors.
    async fn bounded<T>(&self, operation: impl Future<Output = StackResult<T>>) -> Result<T> {
        let limit = self.config.operation_timeout;
        match timeout(limit, operation).await {
            Ok(result) => result.map_err(Error::Transport),
            Err(_) => Err(Error::Transport(StackError::Timeout(limit))),
        }
    }

    fn transition(&self, to: SessionState) {
        let from = self.state.send_replace(to);
        if from == to {
            return;
        }
        let address = self.address.get().cloned().unwrap_or_default();
        announce(&self.events, address, from, to);
    }

    fn fail(&self, err: Error) -> Error {
        let address = self.address.get().cloned().unwrap_or_default();
        error!(address = %address, "Session failed: {}", err);
        self.transition(SessionState::Failed);
        self.events.send(BleEvent::SessionFailed {
            address,
            error: err.to_string(),
        });
        err
    }

    fn spawn_pump(&self, mut stream: NotificationStream, address: String) -> JoinHandle<()> {
        let subscriptions = Arc::clone(&self.subscriptions);
        let handler = Arc::clone(&self.handler);
        let state = Arc::clone(&self.state);
        let catalog = Arc::clone(&self.catalog);
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(raw) = stream.next().await {
                if !subscriptions.read().await.contains(&raw.handle) {
                    debug!(handle = %raw.handle, "Dropping notification for unsubscribed handle");
                    continue;
                }
                let notification = Notification {
                    handle: raw.handle,
                    payload: Bytes::from(raw.value),
                    received_at: OffsetDateTime::now_utc(),
                };
                debug!(
                    handle = %notification.handle,
                    len = notification.payload.len(),
                    "Notification received"
                );
                events.send(BleEvent::Notification {
                    address: address.clone(),
                    handle: notification.handle,
                    len: notification.payload.len(),
                });
                let callback = handler.read().await.clone();
                match callback {
                    Some(callback) => callback(notification),
                    None => debug!(handle = %notification.handle, "No notification handler installed"),
                }
            }
            let lost = state.send_if_modified(|current| {
                let ready = *current == SessionState::Ready;
                if ready {
                    *current = SessionState::Failed;
                }
                ready
            });
            if !lost {
                debug!(address = %address, "Notification stream ended");
                return;
            }
            subscriptions.write().await.clear();
            *catalog.write().await = None;
            let reason = Error::LinkLost(address.clone());
            error!(address = %address, "Session failed: {}", reason);
            announce(&events, address.clone(), SessionState::Ready, SessionState::Failed);
            events.send(BleEvent::SessionFailed {
                address,
                error: reason.to_string(),
            });
        })
    }
}

fn announce(events: &EventDispatcher, address: String, from: SessionState, to: SessionState) {
    info!(address = %address, "{} -> {}", from, to);
    events.send(BleEvent::StateChanged { address, from, to });
}

async fn release(link: &dyn HostLink) {
    if let Err(e) = link.disconnect().await {
        warn!("Link teardown reported an error: {}", e);
    }
}

impl Drop for GattSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().take() {
            pump.abort();
        }
        let Some(link) = self.link.get_mut().take() else {
            return;
        };
        warn!(
            address = ?self.address.get(),
            "Session dropped without calling disconnect() - performing best-effort cleanup"
        );
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                release(link.as_ref()).await;
            });
        }
    }
}

//! Orchestration of discovery and sessions.
//!
//! [`SessionController`] is the entry point front ends use: it runs scans,
//! keeps the most recent registry for export, and holds at most one live
//! [`GattSession`] per peripheral address.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gattscope_types::{CharacteristicHandle, DeviceRegistry, normalize_address};

use crate::discovery::{DiscoveryEngine, ScanOptions};
use crate::error::{Error, Result};
use crate::events::{BleEvent, EventDispatcher, EventReceiver};
use crate::export;
use crate::retry::{RetryConfig, with_retry};
use crate::session::{GattSession, SessionConfig};
use crate::traits::BleHost;

/// Runs scans and owns the live sessions.
pub struct SessionController {
    host: Arc<dyn BleHost>,
    session_config: SessionConfig,
    events: EventDispatcher,
    sessions: RwLock<HashMap<String, Arc<GattSession>>>,
    last_registry: RwLock<Option<DeviceRegistry>>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("session_config", &self.session_config)
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Create a controller with default session timeouts.
    pub fn new(host: Arc<dyn BleHost>) -> Self {
        Self::with_config(host, SessionConfig::default())
    }

    /// Create a controller whose sessions use `session_config`.
    pub fn with_config(host: Arc<dyn BleHost>, session_config: SessionConfig) -> Self {
        Self {
            host,
            session_config,
            events: EventDispatcher::default(),
            sessions: RwLock::new(HashMap::new()),
            last_registry: RwLock::new(None),
        }
    }

    /// Subscribe to events from every scan and session this controller runs.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Run a scan and remember its registry.
    pub async fn scan(&self, options: &ScanOptions) -> Result<DeviceRegistry> {
        self.scan_with(options, |_| {}).await
    }

    /// Run a scan, calling `observer` for each event as it happens.
    pub async fn scan_with<F>(&self, options: &ScanOptions, observer: F) -> Result<DeviceRegistry>
    where
        F: Fn(&BleEvent) + Send + Sync + 'static,
    {
        self.scan_until(options, CancellationToken::new(), observer)
            .await
    }

    /// Run a scan that stops early at the next poll boundary once `cancel`
    /// fires. The devices heard so far are kept.
    pub async fn scan_until<F>(
        &self,
        options: &ScanOptions,
        cancel: CancellationToken,
        observer: F,
    ) -> Result<DeviceRegistry>
    where
        F: Fn(&BleEvent) + Send + Sync + 'static,
    {
        let mut engine = DiscoveryEngine::with_events(Arc::clone(&self.host), self.events.clone())
            .with_cancel_token(cancel);
        engine.add_observer(observer);
        let result = engine.scan(options).await;
        // Keep whatever was heard, even if the scan aborted.
        *self.last_registry.write().await = Some(engine.registry());
        result
    }

    /// Registry from the most recent scan.
    pub async fn last_registry(&self) -> Option<DeviceRegistry> {
        self.last_registry.read().await.clone()
    }

    /// Export the most recent registry as CSV. Without a prior scan only the
    /// header is written.
    pub async fn export_csv(&self, path: impl AsRef<Path>) -> Result<usize> {
        let registry = self.last_registry().await.unwrap_or_default();
        export::export_csv(&registry, path)
    }

    /// Open a session to `address` and connect it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionActive`] if a live session for the address
    /// exists, or any error from [`GattSession::connect`].
    pub async fn open_session(&self, address: &str) -> Result<Arc<GattSession>> {
        let address = normalize_address(address);
        let session = {
            let mut sessions = self.sessions.write().await;
            if let Some(existing) = sessions.get(&address) {
                if !existing.is_spent() {
                    return Err(Error::SessionActive(address));
                }
            }
            let session = Arc::new(GattSession::with_events(
                Arc::clone(&self.host),
                self.session_config.clone(),
                self.events.clone(),
            ));
            sessions.insert(address.clone(), Arc::clone(&session));
            session
        };

        if let Err(e) = session.connect(&address).await {
            self.sessions.write().await.remove(&address);
            return Err(e);
        }
        Ok(session)
    }

    /// The session for `address`, if one is held.
    pub async fn session(&self, address: &str) -> Option<Arc<GattSession>> {
        self.sessions.read().await.get(&normalize_address(address)).cloned()
    }

    /// Addresses with a session held, sorted.
    pub async fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    /// Disconnect and forget the session for `address`. Unknown addresses
    /// are ignored.
    pub async fn close_session(&self, address: &str) -> Result<()> {
        let session = self.sessions.write().await.remove(&normalize_address(address));
        match session {
            Some(session) => session.disconnect().await,
            None => Ok(()),
        }
    }

    /// Disconnect every session.
    pub async fn close_all(&self) {
        let sessions: Vec<_> = self.sessions.write().await.drain().collect();
        for (address, session) in sessions {
            if let Err(e) = session.disconnect().await {
                warn!("Failed to close session for {}: {}", address, e);
            }
        }
        info!("All sessions closed");
    }

    /// Read a characteristic, retrying transient transport failures.
    pub async fn read_with_retry(
        &self,
        address: &str,
        handle: CharacteristicHandle,
        retry: &RetryConfig,
    ) -> Result<Bytes> {
        let session = self
            .session(address)
            .await
            .ok_or_else(|| Error::NotReady(crate::session::SessionState::Disconnected))?;
        with_retry(retry, "read", || session.read(handle)).await
    }
}

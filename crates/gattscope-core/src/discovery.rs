//! Deduplicating device discovery.
//!
//! The [`DiscoveryEngine`] drives the host stack's scanner in short polls
//! until a deadline and folds every observation into a [`DeviceRegistry`].
//! The first sighting of an address wins: later advertisements from the same
//! address are dropped, even when their RSSI or payload differ.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use gattscope_types::{AdvertisementRecord, DeviceRegistry, Observation};

use crate::error::{Error, Result};
use crate::events::{BleEvent, EventDispatcher};
use crate::traits::BleHost;

/// Default total scan duration.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(30);

/// Default length of one scan poll.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Options for a scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How long to scan in total.
    pub duration: Duration,
    /// Length of each poll. The deadline is checked between polls.
    pub poll_interval: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            duration: DEFAULT_SCAN_DURATION,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ScanOptions {
    /// Create scan options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the total scan duration.
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set the scan duration in seconds.
    #[must_use]
    pub fn duration_secs(self, secs: u64) -> Self {
        self.duration(Duration::from_secs(secs))
    }

    /// Set the poll interval.
    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Validate the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if either duration is zero or the
    /// poll interval exceeds the scan duration.
    pub fn validate(&self) -> Result<()> {
        if self.duration.is_zero() {
            return Err(Error::invalid_config("scan duration must be greater than zero"));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::invalid_config("poll interval must be greater than zero"));
        }
        if self.poll_interval > self.duration {
            return Err(Error::invalid_config(
                "poll interval must not exceed the scan duration",
            ));
        }
        Ok(())
    }
}

/// Callback invoked synchronously for every discovery event.
pub type DiscoveryObserver = Box<dyn Fn(&BleEvent) + Send + Sync>;

/// Scans for advertising peripherals and keeps the first sighting of each.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use gattscope_core::{BtleplugHost, DiscoveryEngine};
///
/// # async fn example() -> gattscope_core::Result<()> {
/// let host = Arc::new(BtleplugHost::new().await?);
/// let mut engine = DiscoveryEngine::new(host);
/// engine.add_observer(|event| println!("{:?}", event));
/// let registry = engine
///     .start_scan(Duration::from_secs(10), Duration::from_millis(100))
///     .await?;
/// println!("{} devices", registry.len());
/// # Ok(())
/// # }
/// ```
pub struct DiscoveryEngine {
    host: Arc<dyn BleHost>,
    registry: watch::Sender<DeviceRegistry>,
    observers: Vec<DiscoveryObserver>,
    events: EventDispatcher,
    cancel: CancellationToken,
}

impl fmt::Debug for DiscoveryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryEngine")
            .field("devices", &self.registry.borrow().len())
            .field("observers", &self.observers.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl DiscoveryEngine {
    /// Create an engine with its own event dispatcher.
    pub fn new(host: Arc<dyn BleHost>) -> Self {
        Self::with_events(host, EventDispatcher::default())
    }

    /// Create an engine publishing to `events`.
    pub fn with_events(host: Arc<dyn BleHost>, events: EventDispatcher) -> Self {
        let (registry, _) = watch::channel(DeviceRegistry::new());
        Self {
            host,
            registry,
            observers: Vec::new(),
            events,
            cancel: CancellationToken::new(),
        }
    }

    /// Register an observer. Observers run on the scanning task, in
    /// registration order, and must not block.
    pub fn add_observer<F>(&mut self, observer: F)
    where
        F: Fn(&BleEvent) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Stop scans when `cancel` fires instead of using a private token.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the scan at the next poll boundary.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Snapshot of the registry.
    pub fn registry(&self) -> DeviceRegistry {
        self.registry.borrow().clone()
    }

    /// Watch the registry as it fills.
    pub fn watch_registry(&self) -> watch::Receiver<DeviceRegistry> {
        self.registry.subscribe()
    }

    /// Scan for `duration`, polling in `poll_interval` windows.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] if either duration is zero
    /// - [`Error::FatalScan`] if the stack reports an unrecoverable failure
    pub async fn start_scan(
        &mut self,
        duration: Duration,
        poll_interval: Duration,
    ) -> Result<DeviceRegistry> {
        self.scan(&ScanOptions {
            duration,
            poll_interval,
        })
        .await
    }

    /// Scan with explicit options.
    ///
    /// Each scan starts a new discovery session with an empty registry.
    /// Transient poll failures are logged, reported as
    /// [`BleEvent::ScanError`], and scanning continues.
    #[tracing::instrument(level = "info", skip_all, fields(duration = ?options.duration))]
    pub async fn scan(&mut self, options: &ScanOptions) -> Result<DeviceRegistry> {
        options.validate()?;
        self.registry.send_replace(DeviceRegistry::new());

        info!("Scanning for devices...");
        let deadline = Instant::now() + options.duration;
        let mut polls = 0u32;
        let mut cancelled = false;

        while Instant::now() < deadline {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            polls += 1;
            let started = Instant::now();
            let window = options
                .poll_interval
                .min(deadline.saturating_duration_since(started));

            match self.host.scan(window).await {
                Ok(batch) => {
                    for observation in batch {
                        self.observe(observation);
                    }
                }
                Err(e) if e.is_fatal() => {
                    error!("Scan aborted: {}", e);
                    self.stop_scanner().await;
                    self.emit(BleEvent::ScanAborted {
                        error: e.to_string(),
                    });
                    return Err(Error::FatalScan(e));
                }
                Err(e) => {
                    warn!("Error during scan: {}", e);
                    self.emit(BleEvent::ScanError {
                        poll: polls,
                        error: e.to_string(),
                    });
                    // Keep the poll cadence when the stack fails fast.
                    sleep_until(started + window).await;
                }
            }
        }

        self.stop_scanner().await;
        let devices = self.registry.borrow().len();
        info!("Scan complete. Found {} devices in {} polls", devices, polls);
        self.emit(BleEvent::ScanCompleted {
            devices,
            polls,
            cancelled,
        });
        Ok(self.registry())
    }

    /// Fold one observation into the registry.
    ///
    /// Returns the 1-based discovery sequence number if the address was new.
    pub fn observe(&mut self, observation: Observation) -> Option<usize> {
        let record = AdvertisementRecord::from(observation);
        if self.registry.borrow().contains(&record.address) {
            debug!(address = %record.address, "Already recorded, ignoring");
            return None;
        }

        info!(
            "Discovered {} devices. Latest: {} ({}), RSSI={} dB, Name={}",
            self.registry.borrow().len() + 1,
            record.address,
            record.address_type,
            record.rssi,
            record.local_name.as_deref().unwrap_or("None")
        );

        let event_record = record.clone();
        let mut sequence = None;
        self.registry.send_if_modified(|registry| {
            sequence = registry.insert_first(record);
            sequence.is_some()
        });
        if let Some(sequence) = sequence {
            self.emit(BleEvent::DeviceDiscovered {
                sequence,
                record: event_record,
            });
        }
        sequence
    }

    /// Run a scan on a background task.
    pub fn spawn(self, options: ScanOptions) -> DiscoveryHandle {
        let cancel = self.cancel_token();
        let registry = self.watch_registry();
        let mut engine = self;
        let task = tokio::spawn(async move { engine.scan(&options).await });
        DiscoveryHandle {
            cancel,
            registry,
            task,
        }
    }

    /// Best effort: a scanner that will not stop is only logged.
    async fn stop_scanner(&self) {
        if let Err(e) = self.host.stop_scan().await {
            debug!("Failed to stop scanning: {}", e);
        }
    }

    fn emit(&self, event: BleEvent) {
        for observer in &self.observers {
            observer(&event);
        }
        self.events.send(event);
    }
}

/// Handle to a scan running on a background task.
#[derive(Debug)]
pub struct DiscoveryHandle {
    cancel: CancellationToken,
    registry: watch::Receiver<DeviceRegistry>,
    task: JoinHandle<Result<DeviceRegistry>>,
}

impl DiscoveryHandle {
    /// Stop the scan at the next poll boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Registry as of now.
    pub fn snapshot(&self) -> DeviceRegistry {
        self.registry.borrow().clone()
    }

    /// Whether the scan task has finished.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the scan to finish.
    pub async fn join(self) -> Result<DeviceRegistry> {
        self.task
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::mock::MockHost;
    use gattscope_types::AddressType;
    use proptest::prelude::*;

    proptest! {
        /// Sequence numbers count first sightings; repeats change nothing.
        #[test]
        fn observe_keeps_first_sighting(
            sightings in proptest::collection::vec((0u8..8, -100i16..0), 0..40)
        ) {
            let mut engine = DiscoveryEngine::new(Arc::new(MockHost::new()));
            let mut first: Vec<(String, i16)> = Vec::new();

            for (device, rssi) in sightings {
                let address = format!("AA:00:00:00:00:{device:02X}");
                let sequence =
                    engine.observe(Observation::new(&address, AddressType::Public, rssi));
                if first.iter().any(|(seen, _)| *seen == address) {
                    prop_assert_eq!(sequence, None);
                } else {
                    first.push((address, rssi));
                    prop_assert_eq!(sequence, Some(first.len()));
                }
            }

            let registry = engine.registry();
            prop_assert_eq!(registry.len(), first.len());
            for (record, (address, rssi)) in registry.iter().zip(&first) {
                prop_assert_eq!(&record.address, address);
                prop_assert_eq!(record.rssi, *rssi);
            }
        }
    }
}

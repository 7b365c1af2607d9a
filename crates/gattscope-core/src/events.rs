//! Session engine event system.
//!
//! Discovery, connection state transitions and notification arrivals are
//! published as [`BleEvent`]s on a broadcast channel. One
//! [`EventDispatcher`] is created per process and handed to each component
//! at construction.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use gattscope_types::{AdvertisementRecord, CharacteristicHandle};

use crate::session::SessionState;

/// Events emitted by the discovery engine and GATT sessions.
///
/// All events are serializable for logging, persistence, and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum BleEvent {
    /// A new address entered the registry.
    DeviceDiscovered {
        /// 1-based discovery count.
        sequence: usize,
        /// The stored record.
        record: AdvertisementRecord,
    },
    /// A poll failed; scanning continues.
    ScanError {
        /// 1-based poll number.
        poll: u32,
        /// Stack-reported reason.
        error: String,
    },
    /// A scan finished (deadline or cancellation).
    ScanCompleted {
        /// Distinct devices recorded.
        devices: usize,
        /// Polls issued.
        polls: u32,
        /// Whether the scan stopped early on cancellation.
        cancelled: bool,
    },
    /// A scan aborted on an unrecoverable stack failure.
    ScanAborted { error: String },
    /// A session changed state.
    StateChanged {
        address: String,
        from: SessionState,
        to: SessionState,
    },
    /// A subscribed characteristic pushed a value.
    Notification {
        address: String,
        handle: CharacteristicHandle,
        len: usize,
    },
    /// A session entered `Failed`.
    SessionFailed { address: String, error: String },
}

/// Sender for engine events.
pub type EventSender = broadcast::Sender<BleEvent>;

/// Receiver for engine events.
pub type EventReceiver = broadcast::Receiver<BleEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: BleEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}

//! Trait abstractions for the host BLE stack.
//!
//! The session engine never talks to a radio directly. It drives a
//! [`BleHost`] (scanning, link establishment) and, per connection, a
//! [`HostLink`] (enumeration, reads, writes, notifications). The production
//! implementation is [`crate::adapter::BtleplugHost`]; tests use
//! [`crate::mock::MockHost`].

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tracing::warn;

use gattscope_types::{CharacteristicHandle, Observation, RawService};

use crate::error::{StackError, StackResult};

/// How a write is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Write request; the peripheral confirms.
    WithResponse,
    /// Write command; no confirmation.
    WithoutResponse,
}

/// A value pushed by the peripheral for a characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawNotification {
    /// Characteristic the value belongs to.
    pub handle: CharacteristicHandle,
    /// Payload bytes.
    pub value: Vec<u8>,
}

/// Stream of notifications for one link.
pub type NotificationStream = BoxStream<'static, RawNotification>;

/// Scanning and link establishment.
///
/// # Example
///
/// ```ignore
/// use gattscope_core::{BleHost, Result};
///
/// async fn count_nearby<H: BleHost + ?Sized>(host: &H) -> usize {
///     host.scan(std::time::Duration::from_millis(100))
///         .await
///         .map(|batch| batch.len())
///         .unwrap_or(0)
/// }
/// ```
#[async_trait]
pub trait BleHost: Send + Sync {
    /// Scan for `window` and return what was heard.
    ///
    /// The same device may appear in several batches; callers deduplicate.
    async fn scan(&self, window: Duration) -> StackResult<Vec<Observation>>;

    /// Stop any scanning left running by [`BleHost::scan`].
    async fn stop_scan(&self) -> StackResult<()> {
        Ok(())
    }

    /// Establish a link to the peripheral at `address`.
    async fn connect(&self, address: &str) -> StackResult<Box<dyn HostLink>>;
}

/// One established link to a peripheral.
#[async_trait]
pub trait HostLink: Send + Sync {
    /// Enumerate services and characteristics, in stack order.
    async fn services(&self) -> StackResult<Vec<RawService>>;

    /// Read a characteristic value.
    async fn read(&self, handle: CharacteristicHandle) -> StackResult<Vec<u8>>;

    /// Write a characteristic value.
    async fn write(&self, handle: CharacteristicHandle, value: &[u8], kind: WriteKind)
    -> StackResult<()>;

    /// Enable notifications/indications for a characteristic.
    async fn subscribe(&self, handle: CharacteristicHandle) -> StackResult<()>;

    /// Disable notifications/indications for a characteristic.
    async fn unsubscribe(&self, handle: CharacteristicHandle) -> StackResult<()>;

    /// Stream of inbound notifications for every handle on this link.
    async fn notifications(&self) -> StackResult<NotificationStream>;

    /// Tear the link down.
    async fn disconnect(&self) -> StackResult<()>;
}

/// A link whose establishment has not finished yet.
///
/// Hosts wrap the link before starting the connect and hand it over with
/// [`PendingLink::establish`] once it is up. If the connect future is
/// dropped first (a timeout upstream, say) the link is torn down on a
/// spawned task so the stack does not keep an unowned connection.
pub(crate) struct PendingLink {
    link: Option<Box<dyn HostLink>>,
}

impl PendingLink {
    pub(crate) fn new(link: Box<dyn HostLink>) -> Self {
        Self { link: Some(link) }
    }

    /// Hand over the established link; nothing is torn down afterwards.
    pub(crate) fn establish(mut self) -> StackResult<Box<dyn HostLink>> {
        self.link.take().ok_or(StackError::NotConnected)
    }
}

impl Drop for PendingLink {
    fn drop(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };
        warn!("Connect did not complete - tearing down the link");
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = link.disconnect().await {
                    warn!("Teardown of abandoned link failed: {}", e);
                }
            });
        }
    }
}

//! Error types for gattscope-core.
//!
//! This module defines the errors surfaced by the discovery engine and the
//! GATT session, plus [`StackError`], the failure type of the host-stack
//! seam.
//!
//! # Error Recovery Strategies
//!
//! | Error Type | Effect | Caller action |
//! |------------|--------|---------------|
//! | [`Error::FatalScan`] | Scan aborted | Fix the adapter, scan again |
//! | [`Error::Connect`] / [`Error::ConnectTimeout`] | Session `Failed` | Build a new session to retry |
//! | [`Error::Discovery`] | Session `Failed`, catalog discarded | Build a new session to retry |
//! | [`Error::NotReady`] | None | Wait for `Ready` |
//! | [`Error::NotReadable`] / [`Error::NotWritable`] / [`Error::NotNotifiable`] | None | Pick another characteristic |
//! | [`Error::Transport`] | Session stays `Ready` | Retry (see [`crate::with_retry`]) |
//! | [`Error::LinkLost`] | Session `Failed`, catalog discarded | Build a new session to reconnect |
//!
//! Transient scan failures never reach the caller as errors: the discovery
//! engine logs them and reports them as [`crate::BleEvent::ScanError`].

use std::time::Duration;

use thiserror::Error;

use gattscope_types::{CharacteristicHandle, ParseError};

use crate::session::SessionState;

/// Errors that can occur while scanning or driving a GATT session.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error from btleplug.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No usable Bluetooth adapter.
    #[error("Bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(String),

    /// Unrecoverable stack failure that aborted discovery.
    #[error("Scan aborted: {0}")]
    FatalScan(StackError),

    /// The stack could not establish a link.
    #[error("Connection to {address} failed: {reason}")]
    Connect {
        /// Peripheral address.
        address: String,
        /// Stack-reported reason.
        reason: StackError,
    },

    /// The link was not established within the caller's timeout.
    #[error("Connection to {address} timed out after {duration:?}")]
    ConnectTimeout {
        /// Peripheral address.
        address: String,
        /// The timeout that expired.
        duration: Duration,
    },

    /// Service or characteristic enumeration failed.
    #[error("Service discovery failed: {0}")]
    Discovery(String),

    /// Operation attempted outside the `Ready` state.
    #[error("Session not ready (state: {0})")]
    NotReady(SessionState),

    /// Operation not valid in the current state (e.g. connecting twice).
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        /// The operation attempted.
        operation: &'static str,
        /// The state the session was in.
        state: SessionState,
    },

    /// Characteristic lacks the Read property.
    #[error("Characteristic {0} is not readable")]
    NotReadable(CharacteristicHandle),

    /// Characteristic lacks Write and WriteWithoutResponse.
    #[error("Characteristic {0} is not writable")]
    NotWritable(CharacteristicHandle),

    /// Characteristic lacks Notify and Indicate.
    #[error("Characteristic {0} does not support notifications")]
    NotNotifiable(CharacteristicHandle),

    /// Handle not present in the catalog.
    #[error("Unknown characteristic {0}")]
    UnknownCharacteristic(CharacteristicHandle),

    /// Service UUID not present in the catalog.
    #[error("Unknown service {0}")]
    UnknownService(uuid::Uuid),

    /// Read/write/subscribe failed at the stack level; the session remains usable.
    #[error("Transport error: {0}")]
    Transport(StackError),

    /// The peripheral dropped the link under a `Ready` session.
    #[error("Link to {0} lost")]
    LinkLost(String),

    /// A live session already exists for the address.
    #[error("A session for {0} is already active")]
    SessionActive(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Data parsing failed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// CSV export failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a connection failure.
    pub fn connect(address: impl Into<String>, reason: StackError) -> Self {
        Self::Connect {
            address: address.into(),
            reason,
        }
    }

    /// Whether retrying the same operation on the same session may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(reason) => !reason.is_fatal(),
            _ => false,
        }
    }
}

/// Failure reported by the host BLE stack.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum StackError {
    /// Adapter missing, powered off, or access denied.
    #[error("adapter unavailable: {0}")]
    AdapterUnavailable(String),
    /// Radio busy with another operation.
    #[error("radio busy")]
    Busy,
    /// Stack-level timeout.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// Peripheral unknown to the stack.
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    /// The link dropped.
    #[error("not connected")]
    NotConnected,
    /// Operation not supported by the stack or peripheral.
    #[error("not supported: {0}")]
    NotSupported(String),
    /// Anything else.
    #[error("{0}")]
    Other(String),
}

impl StackError {
    /// Whether the failure makes the adapter unusable for the rest of the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StackError::AdapterUnavailable(_))
    }
}

impl From<btleplug::Error> for StackError {
    fn from(err: btleplug::Error) -> Self {
        match err {
            btleplug::Error::PermissionDenied => {
                StackError::AdapterUnavailable("permission denied".to_string())
            }
            btleplug::Error::DeviceNotFound => StackError::DeviceNotFound(String::new()),
            btleplug::Error::NotConnected => StackError::NotConnected,
            btleplug::Error::TimedOut(duration) => StackError::Timeout(duration),
            btleplug::Error::NotSupported(what) => StackError::NotSupported(what),
            other => StackError::Other(other.to_string()),
        }
    }
}

/// Result type alias using gattscope-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for host-stack calls.
pub type StackResult<T> = std::result::Result<T, StackError>;

//! Transport module - the boundary to the radio link.
//!
//! The engine only needs a handful of blocking primitives:
//! - an [`Adapter`] that reports availability, enumerates paired devices and
//!   creates unconnected channels
//! - a [`Connection`] that connects, reads and can be closed from another
//!   thread to unblock a pending call
//!
//! Implementations:
//! - [`tcp`]: serial-over-TCP bridges, one `host:port` per device
//! - [`scripted`]: in-memory sensors driven by queued chunks

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

pub mod scripted;
pub mod tcp;

pub use scripted::{ScriptedAdapter, ScriptedConnection};
pub use tcp::{TcpAdapter, TcpConnection};

/// Identifier and display name of a discoverable endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle {
    /// Transport address (MAC, `host:port`, ...).
    pub id: String,
    /// Human-readable name.
    pub name: String,
}

impl DeviceHandle {
    /// Create a device handle.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Host radio adapter.
pub trait Adapter: Send + Sync + 'static {
    /// Live connection type.
    type Connection: Connection;

    /// Lazy, one-shot enumeration of paired devices.
    type Devices: Iterator<Item = DeviceHandle> + Send + 'static;

    /// Whether the adapter is present and usable.
    fn is_available(&self) -> bool;

    /// Enumerate paired devices. Order is unspecified.
    fn paired_devices(&self) -> Self::Devices;

    /// Stop any running discovery; discovery slows down or blocks connects.
    fn cancel_discovery(&self);

    /// Create an unconnected channel to `device`.
    ///
    /// Must not block; the blocking part is [`Connection::connect`].
    fn open_connection(&self, device: &DeviceHandle) -> Result<Self::Connection, TransportError>;
}

/// A byte-stream channel to one device.
///
/// All methods take `&self` so that [`close`](Connection::close) can be
/// called while another thread is blocked in `connect` or `read`.
pub trait Connection: Send + Sync + 'static {
    /// Establish the link. Blocks until connected, failed or closed.
    fn connect(&self) -> Result<(), TransportError>;

    /// Read available bytes. Blocks until data arrives.
    ///
    /// `Ok(0)` means the stream has ended.
    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Close the channel. Idempotent; pending calls return an error.
    fn close(&self);
}

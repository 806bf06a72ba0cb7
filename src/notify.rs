//! Client notification boundary.
//!
//! The engine never calls the client from a worker task. Every callback is
//! queued and delivered in order by a single dispatcher task, so a client sees
//! a serialized stream of notifications and may call back into the engine
//! from inside a callback.
//!
//! Callbacks run on the dispatcher task and should return quickly.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::transport::DeviceHandle;

/// Why an established connection ended.
///
/// Only failures are reported; `disconnect()` and `close()` end the session
/// silently.
#[derive(Debug, Error)]
pub enum DisconnectReason {
    /// The sensor stream ended.
    #[error("End of stream")]
    EndOfStream,

    /// A read on the link failed.
    #[error("Read failed: {0}")]
    ReadFailed(#[source] TransportError),
}

/// Receiver of engine notifications.
pub trait HrClient: Send + 'static {
    /// Result of `open()`; `false` when no adapter is available.
    fn on_open_result(&self, ok: bool);

    /// One paired device found while scanning.
    fn on_scan_result(&self, provider_name: &str, device: DeviceHandle);

    /// Result of a connection attempt.
    fn on_connect_result(&self, ok: bool);

    /// An established connection was lost.
    fn on_disconnected(&self, reason: DisconnectReason);
}

/// A notification as a value, for channel-based clients.
#[derive(Debug)]
pub enum Notification {
    /// See [`HrClient::on_open_result`].
    OpenResult(bool),
    /// See [`HrClient::on_scan_result`].
    ScanResult {
        provider_name: String,
        device: DeviceHandle,
    },
    /// See [`HrClient::on_connect_result`].
    ConnectResult(bool),
    /// See [`HrClient::on_disconnected`].
    Disconnected(DisconnectReason),
}

/// Client that forwards notifications into a tokio channel.
///
/// ```
/// use hrlink::ChannelClient;
///
/// let (client, mut notifications) = ChannelClient::new();
/// # drop(client);
/// # assert!(notifications.try_recv().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct ChannelClient {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelClient {
    /// Create a client and the receiving end of its notifications.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::trace!("Notification receiver dropped");
        }
    }
}

impl HrClient for ChannelClient {
    fn on_open_result(&self, ok: bool) {
        self.forward(Notification::OpenResult(ok));
    }

    fn on_scan_result(&self, provider_name: &str, device: DeviceHandle) {
        self.forward(Notification::ScanResult {
            provider_name: provider_name.to_string(),
            device,
        });
    }

    fn on_connect_result(&self, ok: bool) {
        self.forward(Notification::ConnectResult(ok));
    }

    fn on_disconnected(&self, reason: DisconnectReason) {
        self.forward(Notification::Disconnected(reason));
    }
}

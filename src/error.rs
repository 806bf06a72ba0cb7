//! Error types for hrlink.

use thiserror::Error;

/// Errors raised by a transport adapter or a live connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error from the underlying socket or link.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed, locally or by a cancelled session.
    #[error("Connection closed")]
    Closed,

    /// The adapter does not know the requested device.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
}

/// Main error type for hrlink.
///
/// Engine operations themselves never return this type; failures there are
/// reported through [`HrClient`](crate::HrClient) notifications, with a lost
/// link described by [`DisconnectReason`](crate::DisconnectReason). It is
/// returned by the builder and configuration loading, and names engine
/// failures in logs.
#[derive(Debug, Error)]
pub enum HrError {
    /// No transport adapter is present. Reported at `open()`.
    #[error("Transport adapter unavailable")]
    AdapterUnavailable,

    /// Opening the transport connection failed.
    #[error("Connect failed: {0}")]
    Connect(#[source] TransportError),

    /// The engine was built outside a tokio runtime and no handle was given.
    #[error("No tokio runtime available")]
    NoRuntime,

    /// Configuration could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// I/O error while loading configuration.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using HrError.
pub type Result<T> = std::result::Result<T, HrError>;

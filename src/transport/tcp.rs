//! Serial-over-TCP transport.
//!
//! Many RFCOMM bridges and sensor simulators expose the serial stream on a
//! TCP port. Each device id is a `host:port` address; the "paired" list is
//! whatever the configuration names.
//!
//! # Example
//!
//! ```ignore
//! use hrlink::transport::{DeviceHandle, TcpAdapter};
//!
//! let adapter = TcpAdapter::new(vec![DeviceHandle::new("127.0.0.1:4000", "Bench HxM")]);
//! ```

use std::io::Read;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use super::{Adapter, Connection, DeviceHandle};
use crate::config::EngineConfig;
use crate::error::TransportError;

/// Adapter over a fixed list of TCP endpoints.
#[derive(Debug, Clone, Default)]
pub struct TcpAdapter {
    devices: Vec<DeviceHandle>,
}

impl TcpAdapter {
    /// Create an adapter for the given endpoints.
    pub fn new(devices: Vec<DeviceHandle>) -> Self {
        Self { devices }
    }

    /// Create an adapter for the devices listed in `config`.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.devices.clone())
    }

    /// Configured endpoints.
    pub fn devices(&self) -> &[DeviceHandle] {
        &self.devices
    }
}

impl Adapter for TcpAdapter {
    type Connection = TcpConnection;
    type Devices = std::vec::IntoIter<DeviceHandle>;

    fn is_available(&self) -> bool {
        true
    }

    fn paired_devices(&self) -> Self::Devices {
        self.devices.clone().into_iter()
    }

    fn cancel_discovery(&self) {
        // TCP has no discovery phase.
    }

    fn open_connection(&self, device: &DeviceHandle) -> Result<Self::Connection, TransportError> {
        if device.id.is_empty() {
            return Err(TransportError::DeviceNotFound(device.name.clone()));
        }
        Ok(TcpConnection::new(device.id.clone()))
    }
}

/// TCP stream to one endpoint.
///
/// `close` shuts the socket down, which wakes a blocked `read`. A `connect`
/// already in progress cannot be interrupted; its result is dropped and the
/// socket shut down as soon as it returns.
#[derive(Debug)]
pub struct TcpConnection {
    addr: String,
    stream: OnceLock<TcpStream>,
    closed: AtomicBool,
}

impl TcpConnection {
    /// Create an unconnected channel to `addr`.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            stream: OnceLock::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Endpoint address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Connection for TcpConnection {
    fn connect(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let stream = TcpStream::connect(self.addr.as_str())?;
        if let Err(stream) = self.stream.set(stream) {
            // Already connected; keep the first stream.
            let _ = stream.shutdown(Shutdown::Both);
        }

        // close() may have run before the stream was stored.
        if self.is_closed() {
            self.close();
            return Err(TransportError::Closed);
        }

        tracing::debug!(addr = %self.addr, "TCP link connected");
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut stream: &TcpStream = self.stream.get().ok_or(TransportError::Closed)?;
        let n = stream.read(buf)?;

        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        Ok(n)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(stream) = self.stream.get() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_connect_and_read() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            socket.write_all(&[1, 2, 3]).unwrap();
        });

        let adapter = TcpAdapter::new(vec![DeviceHandle::new(addr, "bench")]);
        let device = adapter.paired_devices().next().unwrap();
        let conn = adapter.open_connection(&device).unwrap();
        conn.connect().unwrap();
        server.join().unwrap();

        let mut buf = [0u8; 8];
        let mut got = Vec::new();
        loop {
            let n = conn.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            got.extend_from_slice(&buf[..n]);
        }
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[test]
    fn test_close_unblocks_read() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let conn = Arc::new(TcpConnection::new(addr.to_string()));
        conn.connect().unwrap();
        let (_peer, _) = listener.accept().unwrap();

        let reader = {
            let conn = conn.clone();
            std::thread::spawn(move || {
                let mut buf = [0u8; 8];
                conn.read(&mut buf)
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        conn.close();
        conn.close();
        assert!(matches!(reader.join().unwrap(), Err(TransportError::Closed)));
    }

    #[test]
    fn test_connect_after_close_fails() {
        let conn = TcpConnection::new("127.0.0.1:9");
        conn.close();
        assert!(matches!(conn.connect(), Err(TransportError::Closed)));
    }

    #[test]
    fn test_read_before_connect_fails() {
        let conn = TcpConnection::new("127.0.0.1:9");
        let mut buf = [0u8; 1];
        assert!(matches!(conn.read(&mut buf), Err(TransportError::Closed)));
    }

    #[test]
    fn test_empty_id_rejected() {
        let adapter = TcpAdapter::default();
        let err = adapter
            .open_connection(&DeviceHandle::new("", "nameless"))
            .unwrap_err();
        assert!(matches!(err, TransportError::DeviceNotFound(name) if name == "nameless"));
    }
}

//! In-memory transport for simulated sensors.
//!
//! A [`ScriptedAdapter`] hands out prepared [`ScriptedConnection`]s. Each
//! connection replays queued chunks to `read` and can be fed more bytes while
//! the engine is reading from it. Connect behaviour is selectable so that
//! failures, hangs and late completions can be reproduced.
//!
//! # Example
//!
//! ```
//! use hrlink::transport::{DeviceHandle, ScriptedAdapter, ScriptedConnection};
//! use hrlink::protocol::zephyr;
//!
//! let sensor = ScriptedConnection::new().with_chunk(zephyr::build_frame(70).to_vec());
//! let adapter = ScriptedAdapter::new();
//! adapter.add_device(DeviceHandle::new("00:11:22:33:44:55", "HXM"), sensor.clone());
//! ```

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::{Buf, Bytes};

use super::{Adapter, Connection, DeviceHandle};
use crate::error::TransportError;

/// How [`ScriptedConnection::connect`] behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectMode {
    /// Connect immediately unless already closed.
    Succeed,
    /// Fail with `ConnectionRefused`.
    Refuse,
    /// Block until closed, then fail.
    HangUntilClosed,
    /// Block until released, then succeed even if closed meanwhile.
    Gated,
}

#[derive(Debug)]
enum Step {
    Data(Bytes),
    Fail(io::ErrorKind),
    End,
}

#[derive(Debug)]
struct ConnState {
    mode: ConnectMode,
    released: bool,
    connect_calls: usize,
    connect_returned: bool,
    connected: bool,
    closed: bool,
    steps: VecDeque<Step>,
}

#[derive(Debug)]
struct ConnInner {
    state: Mutex<ConnState>,
    changed: Condvar,
}

/// Scripted byte-stream connection.
///
/// Cheap to clone; clones share the same script, so a test can keep one
/// handle and feed bytes while the engine reads from another.
#[derive(Debug, Clone)]
pub struct ScriptedConnection {
    inner: Arc<ConnInner>,
}

impl ScriptedConnection {
    /// A connection that connects immediately and stays open once the
    /// queued chunks are consumed.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ConnInner {
                state: Mutex::new(ConnState {
                    mode: ConnectMode::Succeed,
                    released: false,
                    connect_calls: 0,
                    connect_returned: false,
                    connected: false,
                    closed: false,
                    steps: VecDeque::new(),
                }),
                changed: Condvar::new(),
            }),
        }
    }

    /// Queue a chunk to be returned by `read`.
    pub fn with_chunk(self, data: impl Into<Bytes>) -> Self {
        self.feed(data);
        self
    }

    /// Make `connect` fail.
    pub fn refusing(self) -> Self {
        self.lock().mode = ConnectMode::Refuse;
        self
    }

    /// Make `connect` block until the connection is closed.
    pub fn hanging(self) -> Self {
        self.lock().mode = ConnectMode::HangUntilClosed;
        self
    }

    /// Make `connect` block until [`release_connect`](Self::release_connect),
    /// then succeed whether or not it was closed in between.
    pub fn gated(self) -> Self {
        self.lock().mode = ConnectMode::Gated;
        self
    }

    /// Append bytes to the stream.
    pub fn feed(&self, data: impl Into<Bytes>) {
        self.push_step(Step::Data(data.into()));
    }

    /// End the stream once queued bytes are consumed.
    pub fn end(&self) {
        self.push_step(Step::End);
    }

    /// Fail the next read after queued bytes are consumed.
    pub fn fail(&self, kind: io::ErrorKind) {
        self.push_step(Step::Fail(kind));
    }

    /// Let a gated `connect` return.
    pub fn release_connect(&self) {
        self.lock().released = true;
        self.inner.changed.notify_all();
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Whether `connect` has succeeded at least once.
    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Number of `connect` calls so far.
    pub fn connect_calls(&self) -> usize {
        self.lock().connect_calls
    }

    /// Block until `connect` has been entered, or the timeout elapses.
    pub fn wait_connect_started(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, |s| s.connect_calls > 0)
    }

    /// Block until a `connect` call has returned, or the timeout elapses.
    pub fn wait_connect_returned(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, |s| s.connect_returned)
    }

    /// Block until the connection is closed, or the timeout elapses.
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, |s| s.closed)
    }

    fn push_step(&self, step: Step) {
        self.lock().steps.push_back(step);
        self.inner.changed.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, ConnState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_until(&self, timeout: Duration, done: impl Fn(&ConnState) -> bool) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .inner
            .changed
            .wait_timeout_while(guard, timeout, |s| !done(s))
            .unwrap_or_else(PoisonError::into_inner);
        done(&guard)
    }

    fn wait<'a>(
        &'a self,
        guard: MutexGuard<'a, ConnState>,
        blocked: impl FnMut(&mut ConnState) -> bool,
    ) -> MutexGuard<'a, ConnState> {
        self.inner
            .changed
            .wait_while(guard, blocked)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ScriptedConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection for ScriptedConnection {
    fn connect(&self) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.connect_calls += 1;
        self.inner.changed.notify_all();

        let mode = state.mode;
        let result = match mode {
            ConnectMode::Succeed if state.closed => Err(TransportError::Closed),
            ConnectMode::Succeed => Ok(()),
            ConnectMode::Refuse => Err(TransportError::Io(io::ErrorKind::ConnectionRefused.into())),
            ConnectMode::HangUntilClosed => {
                state = self.wait(state, |s| !s.closed);
                Err(TransportError::Closed)
            }
            ConnectMode::Gated => {
                state = self.wait(state, |s| !s.released);
                Ok(())
            }
        };

        state.connected |= result.is_ok();
        state.connect_returned = true;
        self.inner.changed.notify_all();
        result
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.lock();

        loop {
            if state.closed {
                return Err(TransportError::Closed);
            }

            let Some(step) = state.steps.pop_front() else {
                state = self.wait(state, |s| !s.closed && s.steps.is_empty());
                continue;
            };

            match step {
                Step::Data(mut chunk) => {
                    let n = buf.len().min(chunk.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    chunk.advance(n);
                    if !chunk.is_empty() {
                        state.steps.push_front(Step::Data(chunk));
                    }
                    if n > 0 {
                        return Ok(n);
                    }
                }
                Step::End => {
                    state.steps.push_front(Step::End);
                    return Ok(0);
                }
                Step::Fail(kind) => return Err(TransportError::Io(kind.into())),
            }
        }
    }

    fn close(&self) {
        self.lock().closed = true;
        self.inner.changed.notify_all();
    }
}

#[derive(Debug, Default)]
struct AdapterInner {
    unavailable: AtomicBool,
    devices: Mutex<Vec<DeviceHandle>>,
    connections: Mutex<HashMap<String, VecDeque<ScriptedConnection>>>,
    discovery_cancels: AtomicUsize,
}

/// Scripted adapter with a fixed paired-device list.
#[derive(Debug, Clone, Default)]
pub struct ScriptedAdapter {
    inner: Arc<AdapterInner>,
}

impl ScriptedAdapter {
    /// An available adapter with no devices.
    pub fn new() -> Self {
        Self::default()
    }

    /// An adapter that reports itself unavailable.
    pub fn unavailable() -> Self {
        let adapter = Self::new();
        adapter.set_available(false);
        adapter
    }

    /// Switch availability.
    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::Release);
    }

    /// Register a paired device and the connection its first connect gets.
    pub fn add_device(&self, device: DeviceHandle, connection: ScriptedConnection) {
        self.prepare(&device.id, connection);
        self.inner
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(device);
    }

    /// Queue another connection for a later connect to `device_id`.
    pub fn prepare(&self, device_id: &str, connection: ScriptedConnection) {
        self.inner
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(device_id.to_string())
            .or_default()
            .push_back(connection);
    }

    /// How many times discovery was cancelled.
    pub fn discovery_cancels(&self) -> usize {
        self.inner.discovery_cancels.load(Ordering::Acquire)
    }
}

impl Adapter for ScriptedAdapter {
    type Connection = ScriptedConnection;
    type Devices = std::vec::IntoIter<DeviceHandle>;

    fn is_available(&self) -> bool {
        !self.inner.unavailable.load(Ordering::Acquire)
    }

    fn paired_devices(&self) -> Self::Devices {
        self.inner
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .into_iter()
    }

    fn cancel_discovery(&self) {
        self.inner.discovery_cancels.fetch_add(1, Ordering::AcqRel);
    }

    fn open_connection(&self, device: &DeviceHandle) -> Result<Self::Connection, TransportError> {
        self.inner
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&device.id)
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| TransportError::DeviceNotFound(device.id.clone()))
    }
}

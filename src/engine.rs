//! Engine builder and connection state machine.
//!
//! The [`EngineBuilder`] picks the frame profile and runtime. The
//! [`HrEngine`] manages the lifecycle:
//! 1. `open()` checks the adapter once and starts the dispatcher
//! 2. `start_scan()` publishes paired devices one dispatch step at a time
//! 3. `connect()` cancels any previous session and starts a connect task
//! 4. the dispatcher promotes a successful connect to `Connected` and starts
//!    the read task, which publishes readings until the link drops
//!
//! Every session gets a fresh epoch. `connect()`, `disconnect()` and
//! `close()` retire the current epoch, so results that arrive from a
//! cancelled session are dropped without notifying the client.
//!
//! # Example
//!
//! ```ignore
//! use hrlink::{ChannelClient, EngineBuilder, ProfileKind};
//! use hrlink::transport::{DeviceHandle, TcpAdapter};
//!
//! #[tokio::main]
//! async fn main() -> hrlink::Result<()> {
//!     let adapter = TcpAdapter::new(vec![DeviceHandle::new("127.0.0.1:4000", "Bench")]);
//!     let engine = EngineBuilder::new().profile(ProfileKind::Polar).build(adapter)?;
//!
//!     let (client, mut notifications) = ChannelClient::new();
//!     engine.open(client);
//!     engine.start_scan();
//!
//!     while let Some(n) = notifications.recv().await {
//!         println!("{:?}", n);
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::dispatch::{deliver, dispatch_loop, Job, JobSender};
use crate::error::{HrError, Result, TransportError};
use crate::notify::{DisconnectReason, HrClient, Notification};
use crate::protocol::{FrameProfile, ProfileKind};
use crate::reading::{Reading, ReadingSlot};
use crate::session::{connect_task, read_task};
use crate::transport::{Adapter, Connection, DeviceHandle};

/// Lifecycle state. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Open (or closed) with nothing in progress.
    Idle,
    /// Publishing paired devices.
    Scanning,
    /// A connect task is running.
    Connecting,
    /// A read task is streaming frames.
    Connected,
    /// The last session ended.
    Disconnected,
}

/// Builder for configuring and creating an [`HrEngine`].
pub struct EngineBuilder {
    profile: Arc<dyn FrameProfile>,
    runtime: Option<Handle>,
}

impl EngineBuilder {
    /// Create a builder with the Zephyr profile and the ambient runtime.
    pub fn new() -> Self {
        Self {
            profile: ProfileKind::default().profile(),
            runtime: None,
        }
    }

    /// Use one of the shipped frame profiles.
    pub fn profile(mut self, kind: ProfileKind) -> Self {
        self.profile = kind.profile();
        self
    }

    /// Use a custom frame profile.
    pub fn custom_profile(mut self, profile: impl FrameProfile + 'static) -> Self {
        self.profile = Arc::new(profile);
        self
    }

    /// Apply a loaded configuration.
    pub fn config(self, config: &EngineConfig) -> Self {
        self.profile(config.profile)
    }

    /// Spawn tasks on this runtime instead of the current one.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Build the engine around `adapter`.
    ///
    /// Fails with [`HrError::NoRuntime`] when called outside a tokio runtime
    /// without an explicit [`runtime`](Self::runtime).
    pub fn build<A: Adapter>(self, adapter: A) -> Result<HrEngine<A>> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| HrError::NoRuntime)?,
        };

        Ok(HrEngine {
            shared: Arc::new(Shared {
                source: Arc::new(adapter),
                profile: self.profile,
                runtime,
                reading: Arc::new(ReadingSlot::new()),
                inner: Mutex::new(Inner {
                    link: None,
                    state: ConnectionState::Idle,
                    epoch: 0,
                    scan: 0,
                    session: None,
                    retired: Vec::new(),
                }),
            }),
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection engine for one heart-rate provider.
///
/// All operations return immediately; outcomes arrive through the
/// [`HrClient`] passed to [`open`](Self::open). Before `open()` succeeds, and
/// after `close()`, every operation except `open()` is a no-op.
///
/// Dropping the engine closes it.
pub struct HrEngine<A: Adapter> {
    shared: Arc<Shared<A>>,
}

/// State shared with the dispatcher.
pub(crate) struct Shared<A: Adapter> {
    /// Adapter as handed to the builder; only used once verified by `open()`.
    source: Arc<A>,
    profile: Arc<dyn FrameProfile>,
    runtime: Handle,
    reading: Arc<ReadingSlot>,
    inner: Mutex<Inner<A>>,
}

struct Inner<A: Adapter> {
    /// Present while open with an available adapter.
    link: Option<Link<A>>,
    state: ConnectionState,
    /// Current session epoch.
    epoch: u64,
    /// Current scan generation.
    scan: u64,
    session: Option<Session<A::Connection>>,
    /// Tasks of cancelled sessions, awaited by the next connect task.
    retired: Vec<JoinHandle<()>>,
}

struct Link<A: Adapter> {
    adapter: Arc<A>,
    queue: JobSender<A>,
}

struct Session<C> {
    epoch: u64,
    device: DeviceHandle,
    conn: Arc<C>,
    tasks: Vec<JoinHandle<()>>,
}

impl<A: Adapter> Inner<A> {
    /// Post a job if the engine is open.
    fn post(&self, job: Job<A>) -> bool {
        match &self.link {
            Some(link) => link.queue.send(job).is_ok(),
            None => false,
        }
    }

    /// Retire the current session epoch and release its connection.
    ///
    /// Returns whether a session was active.
    fn end_session(&mut self) -> bool {
        self.epoch += 1;
        self.retired.retain(|task| !task.is_finished());

        match self.session.take() {
            Some(session) => {
                tracing::debug!(epoch = session.epoch, device = %session.device, "Ending session");
                session.conn.close();
                self.retired.extend(session.tasks);
                true
            }
            None => false,
        }
    }

    fn stop_scan(&mut self) {
        self.scan += 1;
        if self.state == ConnectionState::Scanning {
            self.state = ConnectionState::Idle;
        }
    }

    fn is_current_scan(&self, scan: u64) -> bool {
        self.link.is_some() && self.state == ConnectionState::Scanning && self.scan == scan
    }

    fn is_current_session(&self, epoch: u64, state: ConnectionState) -> bool {
        self.link.is_some() && self.epoch == epoch && self.state == state
    }
}

impl<A: Adapter> HrEngine<A> {
    /// Build an engine with the default configuration.
    pub fn new(adapter: A) -> Result<Self> {
        EngineBuilder::new().build(adapter)
    }

    /// Provider name of the configured profile.
    pub fn provider_name(&self) -> &'static str {
        self.shared.profile.name()
    }

    /// Attach `client` and check the adapter.
    ///
    /// Reports `on_open_result(false)` if the adapter is unavailable; the
    /// engine then stays closed. Opening an open engine replaces the attached
    /// client with `client` and reports `true` to it.
    pub fn open(&self, client: impl HrClient) {
        let shared = &self.shared;
        let mut inner = shared.lock();
        let mut client: Box<dyn HrClient> = Box::new(client);

        if let Some(link) = &inner.link {
            match link.queue.send(Job::Rebind(client)) {
                Ok(()) => {
                    let _ = link.queue.send(Job::Notify(Notification::OpenResult(true)));
                    tracing::debug!("Engine already open, client replaced");
                    return;
                }
                Err(mpsc::error::SendError(Job::Rebind(returned))) => client = returned,
                Err(_) => return,
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        shared
            .runtime
            .spawn(dispatch_loop(Arc::downgrade(shared), client, rx));

        if !shared.source.is_available() {
            tracing::warn!("{}", HrError::AdapterUnavailable);
            let _ = tx.send(Job::Notify(Notification::OpenResult(false)));
            return;
        }

        let _ = tx.send(Job::Notify(Notification::OpenResult(true)));
        inner.state = ConnectionState::Idle;
        inner.link = Some(Link {
            adapter: shared.source.clone(),
            queue: tx,
        });
        tracing::info!(provider = shared.profile.name(), "Engine opened");
    }

    /// Disconnect and release the adapter.
    pub fn close(&self) {
        let mut inner = self.shared.lock();
        if inner.link.is_none() {
            return;
        }

        inner.end_session();
        inner.stop_scan();
        inner.state = ConnectionState::Idle;
        inner.link = None;
        tracing::info!("Engine closed");
    }

    /// Start publishing paired devices through `on_scan_result`.
    ///
    /// Only starts from `Idle` or `Disconnected`.
    pub fn start_scan(&self) {
        let mut inner = self.shared.lock();
        if inner.link.is_none() {
            return;
        }

        match inner.state {
            ConnectionState::Idle | ConnectionState::Disconnected => {}
            state => {
                tracing::debug!(?state, "Ignoring start_scan");
                return;
            }
        }

        inner.scan += 1;
        inner.state = ConnectionState::Scanning;
        let scan = inner.scan;
        inner.post(Job::ScanStep {
            scan,
            devices: None,
        });
        tracing::debug!(scan, "Scan started");
    }

    /// Stop publishing scan results.
    pub fn stop_scan(&self) {
        let mut inner = self.shared.lock();
        if inner.link.is_some() && inner.state == ConnectionState::Scanning {
            inner.stop_scan();
            tracing::debug!("Scan stopped");
        }
    }

    /// Connect to `device`, cancelling any scan or previous session first.
    pub fn connect(&self, device: &DeviceHandle) {
        let shared = &self.shared;
        let mut inner = shared.lock();
        let Some(link) = &inner.link else {
            return;
        };
        let adapter = link.adapter.clone();
        let queue = link.queue.clone();

        inner.stop_scan();
        inner.end_session();
        let epoch = inner.epoch;

        let conn = match adapter.open_connection(device) {
            Ok(conn) => Arc::new(conn),
            Err(error) => {
                tracing::warn!(device = %device, %error, "Could not open connection");
                inner.state = ConnectionState::Disconnected;
                inner.post(Job::Notify(Notification::ConnectResult(false)));
                return;
            }
        };

        inner.state = ConnectionState::Connecting;
        let retired = std::mem::take(&mut inner.retired);
        let task = shared.runtime.spawn(connect_task(
            adapter,
            conn.clone(),
            device.clone(),
            epoch,
            retired,
            queue,
        ));

        inner.session = Some(Session {
            epoch,
            device: device.clone(),
            conn,
            tasks: vec![task],
        });
    }

    /// End the current connection attempt or connection.
    ///
    /// Does not notify the client.
    pub fn disconnect(&self) {
        let mut inner = self.shared.lock();
        if inner.link.is_none() {
            return;
        }

        inner.stop_scan();
        if inner.end_session() {
            inner.state = ConnectionState::Disconnected;
            tracing::info!("Disconnected");
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// Whether the engine has been opened with an available adapter.
    pub fn is_open(&self) -> bool {
        self.shared.lock().link.is_some()
    }

    /// Whether a scan is in progress.
    pub fn is_scanning(&self) -> bool {
        self.state() == ConnectionState::Scanning
    }

    /// Whether a connect task is running.
    pub fn is_connecting(&self) -> bool {
        self.state() == ConnectionState::Connecting
    }

    /// Whether a connection is established.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Device of the current connection attempt or connection.
    pub fn device(&self) -> Option<DeviceHandle> {
        let inner = self.shared.lock();
        inner.session.as_ref().map(|s| s.device.clone())
    }

    /// Latest decoded heart-rate reading.
    pub fn latest_reading(&self) -> Option<Reading> {
        self.shared.reading.latest()
    }
}

impl<A: Adapter> Drop for HrEngine<A> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<A: Adapter> Shared<A> {
    fn lock(&self) -> MutexGuard<'_, Inner<A>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run one dispatch job. Called only from the dispatcher task.
    pub(crate) fn run_job(&self, job: Job<A>, client: &dyn HrClient) {
        match job {
            Job::Notify(notification) => deliver(client, notification),
            // Consumed by the dispatcher loop before it gets here.
            Job::Rebind(_) => {}
            Job::ScanStep { scan, devices } => self.scan_step(scan, devices, client),
            Job::Connected { epoch } => self.connected(epoch, client),
            Job::ConnectFailed { epoch, error } => self.connect_failed(epoch, error, client),
            Job::ReadEnded { epoch, reason } => self.read_ended(epoch, reason, client),
        }
    }

    fn scan_step(&self, scan: u64, devices: Option<A::Devices>, client: &dyn HrClient) {
        if !self.lock().is_current_scan(scan) {
            tracing::trace!(scan, "Dropping stale scan step");
            return;
        }

        let mut devices = devices.unwrap_or_else(|| self.source.paired_devices());
        let next = devices.next();

        let mut inner = self.lock();
        if !inner.is_current_scan(scan) {
            return;
        }

        match next {
            Some(device) => {
                inner.post(Job::ScanStep {
                    scan,
                    devices: Some(devices),
                });
                drop(inner);
                client.on_scan_result(self.profile.name(), device);
            }
            None => {
                inner.state = ConnectionState::Idle;
                tracing::debug!(scan, "Scan finished");
            }
        }
    }

    fn connected(&self, epoch: u64, client: &dyn HrClient) {
        let mut inner = self.lock();
        if !inner.is_current_session(epoch, ConnectionState::Connecting) {
            tracing::debug!(epoch, "Discarding stale connect result");
            return;
        }

        let queue = match &inner.link {
            Some(link) => link.queue.clone(),
            None => return,
        };
        inner.state = ConnectionState::Connected;

        if let Some(session) = inner.session.as_mut() {
            let task = self.runtime.spawn(read_task(
                session.conn.clone(),
                self.profile.clone(),
                self.reading.clone(),
                epoch,
                queue,
            ));
            session.tasks.push(task);
            tracing::info!(device = %session.device, epoch, "Connected");
        }

        drop(inner);
        client.on_connect_result(true);
    }

    fn connect_failed(&self, epoch: u64, error: TransportError, client: &dyn HrClient) {
        let mut inner = self.lock();
        if !inner.is_current_session(epoch, ConnectionState::Connecting) {
            tracing::debug!(epoch, %error, "Discarding stale connect failure");
            return;
        }

        tracing::warn!(error = %HrError::Connect(error), "Connection attempt failed");
        inner.end_session();
        inner.state = ConnectionState::Disconnected;

        drop(inner);
        client.on_connect_result(false);
    }

    fn read_ended(&self, epoch: u64, reason: DisconnectReason, client: &dyn HrClient) {
        let mut inner = self.lock();
        if !inner.is_current_session(epoch, ConnectionState::Connected) {
            tracing::debug!(epoch, %reason, "Discarding read end of cancelled session");
            return;
        }

        tracing::warn!(%reason, "Connection lost");
        inner.end_session();
        inner.state = ConnectionState::Disconnected;

        drop(inner);
        client.on_disconnected(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ScriptedAdapter, ScriptedConnection};

    #[test]
    fn test_build_without_runtime_fails() {
        let err = HrEngine::new(ScriptedAdapter::new()).err().unwrap();
        assert!(matches!(err, HrError::NoRuntime));
    }

    #[test]
    fn test_build_with_explicit_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let engine = EngineBuilder::new()
            .profile(ProfileKind::Polar)
            .runtime(runtime.handle().clone())
            .build(ScriptedAdapter::new())
            .unwrap();

        assert_eq!(engine.provider_name(), "Polar");
        assert_eq!(engine.state(), ConnectionState::Idle);
        drop(engine);
    }

    #[tokio::test]
    async fn test_operations_before_open_are_noops() {
        let adapter = ScriptedAdapter::new();
        let device = DeviceHandle::new("a", "A");
        adapter.add_device(device.clone(), ScriptedConnection::new());
        let engine = HrEngine::new(adapter).unwrap();

        engine.start_scan();
        assert!(!engine.is_scanning());
        engine.connect(&device);
        assert!(!engine.is_connecting());
        assert_eq!(engine.device(), None);
        engine.disconnect();
        engine.close();
        assert_eq!(engine.state(), ConnectionState::Idle);
        assert!(!engine.is_open());
    }

    #[tokio::test]
    async fn test_unavailable_adapter_stays_closed() {
        let engine = HrEngine::new(ScriptedAdapter::unavailable()).unwrap();
        let (client, _rx) = crate::notify::ChannelClient::new();

        engine.open(client);
        assert!(!engine.is_open());
        engine.start_scan();
        assert!(!engine.is_scanning());
    }

    #[tokio::test]
    async fn test_scan_state_transitions() {
        let adapter = ScriptedAdapter::new();
        let engine = HrEngine::new(adapter).unwrap();
        let (client, _rx) = crate::notify::ChannelClient::new();
        engine.open(client);

        engine.start_scan();
        assert!(engine.is_scanning());
        engine.stop_scan();
        assert_eq!(engine.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_connect_sets_connecting_and_device() {
        let adapter = ScriptedAdapter::new();
        let device = DeviceHandle::new("a", "A");
        adapter.add_device(device.clone(), ScriptedConnection::new().hanging());
        let engine = HrEngine::new(adapter).unwrap();
        let (client, _rx) = crate::notify::ChannelClient::new();
        engine.open(client);

        engine.connect(&device);
        assert!(engine.is_connecting());
        assert_eq!(engine.device(), Some(device));

        engine.start_scan();
        assert!(engine.is_connecting(), "scan must not preempt a connect");

        engine.disconnect();
        assert_eq!(engine.state(), ConnectionState::Disconnected);
        assert_eq!(engine.device(), None);
    }

    #[tokio::test]
    async fn test_unknown_device_fails_synchronously() {
        let engine = HrEngine::new(ScriptedAdapter::new()).unwrap();
        let (client, _rx) = crate::notify::ChannelClient::new();
        engine.open(client);

        engine.connect(&DeviceHandle::new("missing", "Nobody"));
        assert_eq!(engine.state(), ConnectionState::Disconnected);
    }
}

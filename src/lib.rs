//! # hrlink
//!
//! Connection engine for serial heart-rate chest straps.
//!
//! The engine discovers paired sensors, connects to one, decodes its framed
//! byte stream and publishes the latest heart-rate value. Two frame formats
//! ship with the crate: Zephyr HxM (60-byte STX/ETX frames) and Polar
//! WearLink (16-byte `0xFE` messages).
//!
//! ## Architecture
//!
//! - **Engine** ([`HrEngine`]): non-blocking operations and the state machine
//! - **Dispatcher**: one task that delivers every [`HrClient`] callback in order
//! - **Session tasks**: blocking connect and read loops on tokio's blocking pool
//! - **Protocol** ([`protocol`]): sans-IO frame decoding with resynchronization
//! - **Transport** ([`transport`]): the adapter/connection boundary
//!
//! ## Example
//!
//! ```ignore
//! use hrlink::{ChannelClient, EngineBuilder, Notification, ProfileKind};
//! use hrlink::transport::{DeviceHandle, TcpAdapter};
//!
//! #[tokio::main]
//! async fn main() -> hrlink::Result<()> {
//!     let device = DeviceHandle::new("127.0.0.1:4000", "HXM bench");
//!     let engine = EngineBuilder::new()
//!         .profile(ProfileKind::Zephyr)
//!         .build(TcpAdapter::new(vec![device.clone()]))?;
//!
//!     let (client, mut notifications) = ChannelClient::new();
//!     engine.open(client);
//!     engine.connect(&device);
//!
//!     while let Some(n) = notifications.recv().await {
//!         if let Notification::ConnectResult(true) = n {
//!             println!("connected, hr = {:?}", engine.latest_reading());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod notify;
pub mod protocol;
pub mod reading;
pub mod transport;

mod dispatch;
mod engine;
mod session;

pub use config::EngineConfig;
pub use engine::{ConnectionState, EngineBuilder, HrEngine};
pub use error::{HrError, Result, TransportError};
pub use notify::{ChannelClient, DisconnectReason, HrClient, Notification};
pub use protocol::ProfileKind;
pub use reading::{Reading, ReadingSlot};
pub use transport::DeviceHandle;

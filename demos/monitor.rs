//! Heart-rate monitor over a serial-to-TCP bridge.
//!
//! ```text
//! cargo run --example monitor -- hrlink.json
//! ```
//!
//! The config names the frame profile and the bridge endpoints; the first
//! endpoint is connected and its readings printed once a second. Engine
//! logs are filtered by `RUST_LOG`, e.g. `RUST_LOG=hrlink=debug`.

use std::time::Duration;

use hrlink::transport::TcpAdapter;
use hrlink::{ChannelClient, EngineBuilder, EngineConfig, Notification};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> hrlink::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "hrlink.json".to_string());
    let config = EngineConfig::from_file(&path)?;

    let Some(device) = config.devices.first().cloned() else {
        eprintln!("{}: no devices configured", path);
        return Ok(());
    };

    let engine = EngineBuilder::new()
        .config(&config)
        .build(TcpAdapter::from_config(&config))?;
    let (client, mut notifications) = ChannelClient::new();
    engine.open(client);

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            notification = notifications.recv() => match notification {
                Some(Notification::OpenResult(true)) => {
                    println!("{} ready, connecting to {}", engine.provider_name(), device);
                    engine.connect(&device);
                }
                Some(Notification::ConnectResult(true)) => println!("connected"),
                Some(Notification::ConnectResult(false)) => {
                    println!("connect failed");
                    break;
                }
                Some(Notification::Disconnected(reason)) => {
                    println!("disconnected: {}", reason);
                    break;
                }
                Some(other) => println!("{:?}", other),
                None => break,
            },
            _ = ticker.tick() => {
                if let Some(reading) = engine.latest_reading() {
                    println!("{} bpm", reading.value);
                }
            }
        }
    }

    engine.close();
    Ok(())
}

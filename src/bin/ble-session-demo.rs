//! Sample caller: scan for peripherals, connect to a target and print every
//! status event as JSON until interrupted.
//!
//! Usage: `ble-session-demo [address]`. Without an address the first
//! discovered device is used.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use ble_session::{BluestRadio, BluetoothManager, SessionConfig, StatusEvent};
use log::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = SessionConfig::default();
    let scan_window = Duration::from_millis(config.scan_timeout_ms + 500);

    let radio = Arc::new(BluestRadio::new().await?);
    let manager = BluetoothManager::new(radio, config);

    manager.register_listener(Arc::new(|event: StatusEvent| {
        match serde_json::to_string(&event) {
            Ok(json) => println!("{json}"),
            Err(err) => eprintln!("failed to encode event: {err}"),
        }
    }));

    if !manager.is_radio_enabled().await {
        anyhow::bail!("bluetooth radio is unavailable or disabled");
    }

    manager.start_scan().await?;
    // Let the scan run its course; it auto-stops at the deadline.
    tokio::time::sleep(scan_window).await;

    let devices = manager.devices();
    info!("scan finished, {} device(s) found", devices.len());

    let target = env::args().nth(1).or_else(|| devices.first().map(|d| d.address.clone()));
    let Some(address) = target else {
        info!("no devices found, nothing to connect to");
        return Ok(());
    };

    manager.connect(&address).await?;

    tokio::signal::ctrl_c().await?;
    manager.shutdown().await;
    Ok(())
}

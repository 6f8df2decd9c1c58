//! Scan lifecycle: timeout, dedup, stop idempotence.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use ble_session::{BleError, BluetoothManager, SessionConfig, StatusEvent};
use common::{MockRadio, assert_no_event, listen, next_event};

fn manager_with(radio: &Arc<MockRadio>) -> BluetoothManager<MockRadio> {
    BluetoothManager::new(radio.clone(), SessionConfig::default())
}

#[tokio::test(start_paused = true)]
async fn scan_reports_devices_and_auto_stops_at_deadline() {
    let radio = Arc::new(MockRadio::new());
    let manager = manager_with(&radio);
    let mut events = listen(&manager);

    manager.start_scan().await.unwrap();
    assert_eq!(next_event(&mut events).await, StatusEvent::ScanStarted);
    assert!(manager.is_scanning());

    radio.feed_device("AA:BB:CC:DD:EE:FF", Some("Peripheral"), -40);
    match next_event(&mut events).await {
        StatusEvent::DeviceDiscovered(device) => {
            assert_eq!(device.address, "AA:BB:CC:DD:EE:FF");
            assert_eq!(device.rssi, Some(-40));
        }
        other => panic!("expected a device discovery, got {:?}", other),
    }

    // No stop call: the hard 10 s deadline fires on its own.
    assert_eq!(next_event(&mut events).await, StatusEvent::ScanStopped);
    assert!(!manager.is_scanning());

    let devices = manager.devices();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].address, "AA:BB:CC:DD:EE:FF");
    assert!(radio.stop_discovery_calls() >= 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_sightings_refresh_strength_but_keep_position() {
    let radio = Arc::new(MockRadio::new());
    let manager = manager_with(&radio);
    let mut events = listen(&manager);

    manager.start_scan().await.unwrap();
    assert_eq!(next_event(&mut events).await, StatusEvent::ScanStarted);

    radio.feed_device("AA:BB:CC:DD:EE:FF", Some("One"), -40);
    radio.feed_device("11:22:33:44:55:66", Some("Two"), -50);
    radio.feed_device("AA:BB:CC:DD:EE:FF", Some("One"), -63);
    // Sightings are processed in order, so this third discovery proves the
    // duplicate above it has been recorded.
    radio.feed_device("77:88:99:AA:BB:CC", Some("Three"), -70);

    for expected in ["AA:BB:CC:DD:EE:FF", "11:22:33:44:55:66", "77:88:99:AA:BB:CC"] {
        match next_event(&mut events).await {
            StatusEvent::DeviceDiscovered(device) => assert_eq!(device.address, expected),
            other => panic!("expected a device discovery, got {:?}", other),
        }
    }

    let devices = manager.devices();
    assert_eq!(devices.len(), 3);
    // Original position, refreshed signal strength.
    assert_eq!(devices[0].address, "AA:BB:CC:DD:EE:FF");
    assert_eq!(devices[0].rssi, Some(-63));
    assert_eq!(devices[1].address, "11:22:33:44:55:66");
    assert_eq!(devices[2].address, "77:88:99:AA:BB:CC");
}

#[tokio::test(start_paused = true)]
async fn user_stop_and_timeout_emit_stopped_exactly_once() {
    let radio = Arc::new(MockRadio::new());
    let manager = manager_with(&radio);
    let mut events = listen(&manager);

    manager.start_scan().await.unwrap();
    assert_eq!(next_event(&mut events).await, StatusEvent::ScanStarted);

    manager.stop_scan().await;
    assert_eq!(next_event(&mut events).await, StatusEvent::ScanStopped);

    // The deadline of the stopped scan must not fire a second stop.
    tokio::time::sleep(Duration::from_millis(11_000)).await;
    assert_no_event(&mut events).await;

    // Stopping again is a no-op.
    manager.stop_scan().await;
    assert_no_event(&mut events).await;
}

#[tokio::test(start_paused = true)]
async fn restarting_a_scan_supersedes_it_and_clears_the_device_list() {
    let radio = Arc::new(MockRadio::new());
    let manager = manager_with(&radio);
    let mut events = listen(&manager);

    manager.start_scan().await.unwrap();
    assert_eq!(next_event(&mut events).await, StatusEvent::ScanStarted);
    radio.feed_device("AA:BB:CC:DD:EE:FF", None, -40);
    match next_event(&mut events).await {
        StatusEvent::DeviceDiscovered(_) => {}
        other => panic!("expected a device discovery, got {:?}", other),
    }
    assert_eq!(manager.devices().len(), 1);

    // A second start stops the first session and begins a fresh one.
    manager.start_scan().await.unwrap();
    assert_eq!(next_event(&mut events).await, StatusEvent::ScanStopped);
    assert_eq!(next_event(&mut events).await, StatusEvent::ScanStarted);
    assert!(manager.devices().is_empty());

    // The earlier sighting does not carry over; a fresh one is reported anew.
    radio.feed_device("AA:BB:CC:DD:EE:FF", None, -45);
    match next_event(&mut events).await {
        StatusEvent::DeviceDiscovered(device) => assert_eq!(device.rssi, Some(-45)),
        other => panic!("expected a device discovery, got {:?}", other),
    }
}

#[tokio::test]
async fn start_scan_fails_cleanly_when_radio_disabled() {
    let radio = Arc::new(MockRadio::new());
    radio.enabled.store(false, Ordering::SeqCst);
    let manager = manager_with(&radio);
    let mut events = listen(&manager);

    let err = manager.start_scan().await.unwrap_err();
    assert!(matches!(err, BleError::RadioUnavailable));
    assert!(!manager.is_scanning());
    assert_no_event(&mut events).await;
}

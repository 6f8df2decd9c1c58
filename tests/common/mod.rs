//! Scripted radio and listener plumbing shared by the integration tests.
#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use ble_session::{
    BleError, BluetoothManager, DiscoveredDevice, RadioAdapter, RadioEvent, StatusEvent,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// A radio whose behavior the test scripts: which lookups succeed, whether
/// registration is accepted, and when link events fire.
pub struct MockRadio {
    pub enabled: AtomicBool,
    pub has_service: AtomicBool,
    pub has_characteristic: AtomicBool,
    pub accept_notifications: AtomicBool,
    pub accept_descriptor_write: AtomicBool,
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    discovery_tx: Option<mpsc::UnboundedSender<DiscoveredDevice>>,
    stop_discovery_calls: usize,
    sessions: Vec<MockSession>,
    discover_requests: Vec<usize>,
}

struct MockSession {
    address: String,
    events: mpsc::UnboundedSender<RadioEvent>,
    close_count: usize,
}

#[derive(Clone)]
pub struct MockHandle {
    session: usize,
}

#[derive(Clone)]
pub struct MockService;

#[derive(Clone)]
pub struct MockCharacteristic;

impl MockRadio {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            has_service: AtomicBool::new(true),
            has_characteristic: AtomicBool::new(true),
            accept_notifications: AtomicBool::new(true),
            accept_descriptor_write: AtomicBool::new(true),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Reports a device sighting on the in-progress discovery.
    pub fn feed_device(&self, address: &str, name: Option<&str>, rssi: i16) {
        let state = self.state.lock().unwrap();
        let tx = state.discovery_tx.as_ref().expect("no discovery in progress");
        tx.send(DiscoveredDevice {
            address: address.to_string(),
            name: name.map(str::to_string),
            rssi: Some(rssi),
        })
        .unwrap();
    }

    /// Radio-event channel of the `index`-th opened connection, used to
    /// inject link callbacks.
    pub fn link(&self, index: usize) -> mpsc::UnboundedSender<RadioEvent> {
        self.state.lock().unwrap().sessions[index].events.clone()
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    pub fn session_address(&self, index: usize) -> String {
        self.state.lock().unwrap().sessions[index].address.clone()
    }

    pub fn close_count(&self, index: usize) -> usize {
        self.state.lock().unwrap().sessions[index].close_count
    }

    pub fn discover_requests(&self) -> usize {
        self.state.lock().unwrap().discover_requests.len()
    }

    pub fn stop_discovery_calls(&self) -> usize {
        self.state.lock().unwrap().stop_discovery_calls
    }
}

#[async_trait]
impl RadioAdapter for MockRadio {
    type Handle = MockHandle;
    type Service = MockService;
    type Characteristic = MockCharacteristic;

    async fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn start_discovery(
        &self,
        found: mpsc::UnboundedSender<DiscoveredDevice>,
    ) -> Result<(), BleError> {
        self.state.lock().unwrap().discovery_tx = Some(found);
        Ok(())
    }

    async fn stop_discovery(&self) {
        let mut state = self.state.lock().unwrap();
        state.stop_discovery_calls += 1;
        state.discovery_tx = None;
    }

    async fn open_connection(
        &self,
        address: &str,
        _auto_connect: bool,
        events: mpsc::UnboundedSender<RadioEvent>,
    ) -> Result<MockHandle, BleError> {
        let mut state = self.state.lock().unwrap();
        state.sessions.push(MockSession {
            address: address.to_string(),
            events,
            close_count: 0,
        });
        Ok(MockHandle { session: state.sessions.len() - 1 })
    }

    async fn close_connection(&self, handle: &MockHandle) {
        self.state.lock().unwrap().sessions[handle.session].close_count += 1;
    }

    async fn discover_services(&self, handle: &MockHandle) {
        self.state.lock().unwrap().discover_requests.push(handle.session);
    }

    async fn get_service(&self, _handle: &MockHandle, _uuid: Uuid) -> Option<MockService> {
        self.has_service.load(Ordering::SeqCst).then_some(MockService)
    }

    async fn get_characteristic(
        &self,
        _service: &MockService,
        _uuid: Uuid,
    ) -> Option<MockCharacteristic> {
        self.has_characteristic.load(Ordering::SeqCst).then_some(MockCharacteristic)
    }

    async fn enable_notification(
        &self,
        _handle: &MockHandle,
        _characteristic: &MockCharacteristic,
        _enable: bool,
    ) -> bool {
        self.accept_notifications.load(Ordering::SeqCst)
    }

    async fn write_descriptor(
        &self,
        _handle: &MockHandle,
        _characteristic: &MockCharacteristic,
        _descriptor: Uuid,
        _value: &[u8],
    ) -> Result<(), BleError> {
        if self.accept_descriptor_write.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BleError::Backend(anyhow!("gatt descriptor write rejected")))
        }
    }
}

/// Registers a channel-backed listener and returns the receiving end.
pub fn listen(manager: &BluetoothManager<MockRadio>) -> mpsc::UnboundedReceiver<StatusEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    manager.register_listener(Arc::new(move |event: StatusEvent| {
        let _ = tx.send(event);
    }));
    rx
}

pub async fn next_event(events: &mut mpsc::UnboundedReceiver<StatusEvent>) -> StatusEvent {
    // Longer than the scan deadline, so that on a paused clock the deadline
    // timer fires before this guard does.
    tokio::time::timeout(Duration::from_secs(30), events.recv())
        .await
        .expect("timed out waiting for a status event")
        .expect("event channel closed")
}

pub async fn assert_no_event(events: &mut mpsc::UnboundedReceiver<StatusEvent>) {
    match tokio::time::timeout(Duration::from_millis(200), events.recv()).await {
        Ok(Some(event)) => panic!("unexpected event: {:?}", event),
        // A closed channel (listener deregistered) also means silence.
        Ok(None) | Err(_) => {}
    }
}

//! The caller-facing facade.
//!
//! Wires the dispatcher, scan controller and connection state machine
//! together over one radio adapter and delegates to them. Everything here is
//! one-line delegation; the behavior lives in the components.

use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::config::SessionConfig;
use crate::connection::ConnectionManager;
use crate::dispatcher::{EventDispatcher, StatusListener};
use crate::error::BleError;
use crate::radio::RadioAdapter;
use crate::scanner::ScanController;
use crate::types::{ConnectionState, DiscoveredDevice};

/// Manages BLE operations against one radio adapter: scanning, a single
/// connection session and status-event delivery to one listener.
pub struct BluetoothManager<R: RadioAdapter> {
    radio: Arc<R>,
    dispatcher: EventDispatcher,
    scanner: ScanController<R>,
    connection: ConnectionManager<R>,
}

impl<R: RadioAdapter> BluetoothManager<R> {
    pub fn new(radio: Arc<R>, config: SessionConfig) -> Self {
        let dispatcher = EventDispatcher::new();
        let scanner = ScanController::new(
            radio.clone(),
            dispatcher.clone(),
            Duration::from_millis(config.scan_timeout_ms),
        );
        let connection =
            ConnectionManager::new(radio.clone(), dispatcher.clone(), scanner.clone(), config);
        Self { radio, dispatcher, scanner, connection }
    }

    /// Registers the status listener, replacing any previous one.
    pub fn register_listener(&self, listener: Arc<dyn StatusListener>) {
        self.dispatcher.register(listener);
    }

    /// Deregisters the status listener. Call before the listener is dropped.
    pub fn unregister_listener(&self) {
        self.dispatcher.unregister();
    }

    /// Whether the radio is present and enabled.
    pub async fn is_radio_enabled(&self) -> bool {
        self.radio.is_enabled().await
    }

    /// Starts a scan session. See [`ScanController::start_scan`].
    pub async fn start_scan(&self) -> Result<(), BleError> {
        self.scanner.start_scan().await
    }

    /// Stops the running scan, if any.
    pub async fn stop_scan(&self) {
        self.scanner.stop_scan().await
    }

    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    /// Devices discovered in the current scan session, in discovery order.
    pub fn devices(&self) -> Vec<DiscoveredDevice> {
        self.scanner.devices()
    }

    /// Connects to the device with the given address. See
    /// [`ConnectionManager::connect`].
    pub async fn connect(&self, address: &str) -> Result<(), BleError> {
        self.connection.connect(address).await
    }

    /// Tears down the current session, if any.
    pub async fn disconnect(&self) {
        self.connection.disconnect().await
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.connection.connection_state().await
    }

    /// Whether a scan or a live session exists.
    pub async fn is_active(&self) -> bool {
        self.scanner.is_scanning() || self.connection.has_session().await
    }

    /// Orderly teardown: disconnect first, then stop event delivery.
    pub async fn shutdown(&self) {
        info!("shutting down bluetooth manager");
        self.connection.disconnect().await;
        self.dispatcher.unregister();
    }
}

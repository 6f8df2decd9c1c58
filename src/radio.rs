//! Capability contract over the platform BLE radio.
//!
//! The radio is an external collaborator, not reimplemented here. Commands
//! are fire-and-forget: submitting a GATT operation returns once the radio
//! accepted it, and completion is observed only through the corresponding
//! [`RadioEvent`] on the channel handed to [`RadioAdapter::open_connection`].
//! The radio delivers events serially relative to itself, but they interleave
//! freely with in-flight caller commands.

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::BleError;
use crate::types::DiscoveredDevice;

/// Radio-level link state reported through [`RadioEvent::ConnectionStateChanged`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
}

/// Outcome of a service discovery round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattStatus {
    Success,
    /// Backend-specific status code or error text, interpolated verbatim into
    /// the failure event message.
    Failure(String),
}

/// Asynchronous callbacks from the radio for one open connection.
#[derive(Debug, Clone)]
pub enum RadioEvent {
    ConnectionStateChanged(LinkState),
    ServicesDiscovered { status: GattStatus },
    CharacteristicChanged { value: Vec<u8> },
}

/// Abstraction over the platform's BLE radio.
///
/// `Handle` is the exclusive connection resource held by one session; cloning
/// it clones the reference, not the connection. Service and characteristic
/// values are only valid for the handle they were resolved from.
#[async_trait]
pub trait RadioAdapter: Send + Sync + 'static {
    type Handle: Clone + Send + Sync + 'static;
    type Service: Clone + Send + Sync + 'static;
    type Characteristic: Clone + Send + Sync + 'static;

    /// Whether the radio is present and enabled.
    async fn is_enabled(&self) -> bool;

    /// Begins device discovery. Each sighting is delivered on `found` until
    /// [`stop_discovery`](Self::stop_discovery) is called.
    async fn start_discovery(
        &self,
        found: mpsc::UnboundedSender<DiscoveredDevice>,
    ) -> Result<(), BleError>;

    /// Halts discovery. Idempotent.
    async fn stop_discovery(&self);

    /// Opens a connection to `address`. Link transitions, discovery results
    /// and notification payloads for this connection arrive on `events`.
    async fn open_connection(
        &self,
        address: &str,
        auto_connect: bool,
        events: mpsc::UnboundedSender<RadioEvent>,
    ) -> Result<Self::Handle, BleError>;

    /// Releases the connection resource. Idempotent per handle.
    async fn close_connection(&self, handle: &Self::Handle);

    /// Requests service discovery; completion arrives as
    /// [`RadioEvent::ServicesDiscovered`].
    async fn discover_services(&self, handle: &Self::Handle);

    /// Looks up a discovered service by UUID.
    async fn get_service(&self, handle: &Self::Handle, uuid: Uuid) -> Option<Self::Service>;

    /// Looks up a characteristic by UUID within `service`.
    async fn get_characteristic(
        &self,
        service: &Self::Service,
        uuid: Uuid,
    ) -> Option<Self::Characteristic>;

    /// Turns local notification delivery for `characteristic` on or off.
    /// Returns whether the registration was accepted.
    async fn enable_notification(
        &self,
        handle: &Self::Handle,
        characteristic: &Self::Characteristic,
        enable: bool,
    ) -> bool;

    /// Writes `value` to the descriptor identified by `descriptor` on
    /// `characteristic`.
    async fn write_descriptor(
        &self,
        handle: &Self::Handle,
        characteristic: &Self::Characteristic,
        descriptor: Uuid,
        value: &[u8],
    ) -> Result<(), BleError>;
}

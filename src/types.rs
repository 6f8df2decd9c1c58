//! Shared data structures: discovered devices, connection states and the
//! status events delivered to the registered listener.

use serde::Serialize;

/// A peripheral reported by the radio during a scan.
///
/// Held in an insertion-ordered, address-deduplicated collection for the
/// duration of one scan session; a repeat sighting refreshes the signal
/// strength but never moves the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDevice {
    /// Unique hardware identifier. A MAC address on most platforms, an opaque
    /// platform id where the OS hides the MAC.
    pub address: String,
    /// Advertised display name, if any.
    pub name: Option<String>,
    /// Last-seen signal strength in dBm.
    pub rssi: Option<i16>,
}

/// Lifecycle of one connection session.
///
/// `Disconnected` is terminal for a session instance; reconnecting requires a
/// new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    DiscoveringServices,
    Subscribed,
    Failed,
    Disconnected,
}

/// Status events produced by the scan controller and the connection state
/// machine, consumed by the single registered listener.
///
/// Events are immutable, ephemeral and delivered in production order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum StatusEvent {
    ScanStarted,
    ScanStopped,
    /// First sighting of a device in the current scan session. Repeat
    /// sightings only refresh the stored signal strength.
    DeviceDiscovered(DiscoveredDevice),
    Connecting,
    Connected,
    Disconnected,
    OperationSucceeded(String),
    OperationFailed(String),
    /// Inbound notification payload, hex-encoded byte-by-byte and space
    /// separated. Empty payloads carry the sentinel `"empty notification"`.
    NotificationReceived(String),
}

//! Session configuration: the UUID triple a session resolves and the scan
//! timeout. All four values default to the compile-time constants.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{
    DEFAULT_CHARACTERISTIC_UUID, DEFAULT_SCAN_TIMEOUT_MS, DEFAULT_SERVICE_UUID,
    UUID_CLIENT_CHARACTERISTIC_CONFIG,
};

/// Fixed configuration for one [`BluetoothManager`](crate::BluetoothManager).
///
/// Immutable once the manager is built; reconfiguration means building a new
/// manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// The GATT service to resolve after connecting.
    pub service_uuid: Uuid,
    /// The notifiable characteristic inside `service_uuid`.
    pub characteristic_uuid: Uuid,
    /// The client characteristic configuration descriptor used to enable
    /// notification delivery.
    pub config_descriptor_uuid: Uuid,
    /// How long a scan runs before it auto-stops, in milliseconds.
    pub scan_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            service_uuid: DEFAULT_SERVICE_UUID,
            characteristic_uuid: DEFAULT_CHARACTERISTIC_UUID,
            config_descriptor_uuid: UUID_CLIENT_CHARACTERISTIC_CONFIG,
            scan_timeout_ms: DEFAULT_SCAN_TIMEOUT_MS,
        }
    }
}

//! Constant values used throughout the crate: target UUIDs, the standard
//! notification descriptor, and timing defaults.

use uuid::Uuid;

/// The GATT service the session subscribes to by default.
pub const DEFAULT_SERVICE_UUID: Uuid = Uuid::from_u128(0x9e672755_c622_49e0_93b8_4be76a97208b);

/// The notifiable characteristic inside [`DEFAULT_SERVICE_UUID`].
pub const DEFAULT_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0xe2cc9711_c6d2_464d_ac7c_25dc963f0bde);

/// Standard "Client Characteristic Configuration" descriptor (0x2902).
pub const UUID_CLIENT_CHARACTERISTIC_CONFIG: Uuid =
    Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// Value written to the configuration descriptor to turn notifications on.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// A scan auto-stops this long after it starts. Hard deadline, not an idle timer.
pub const DEFAULT_SCAN_TIMEOUT_MS: u64 = 10_000;

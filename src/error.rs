//! Error types for command-path failures.
//!
//! Subscription failures (missing service/characteristic, descriptor write,
//! notification registration) are not errors on any command path; they are
//! surfaced as [`StatusEvent::OperationFailed`](crate::StatusEvent) events
//! and leave the session in the `Failed` state.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BleError {
    /// The radio is missing or disabled. Surfaced immediately, never retried.
    #[error("bluetooth radio is unavailable or disabled")]
    RadioUnavailable,

    /// A reentrant `connect` raced an in-flight attempt for the same address.
    #[error("connection attempt already in progress for {0}")]
    AlreadyConnecting(String),

    /// The address does not correspond to any device the radio knows about.
    #[error("no known device with address {0}")]
    DeviceNotFound(String),

    /// Type-erased failure from the underlying radio backend.
    #[error("radio backend failure: {0}")]
    Backend(anyhow::Error),
}

impl From<anyhow::Error> for BleError {
    fn from(err: anyhow::Error) -> Self {
        BleError::Backend(err)
    }
}

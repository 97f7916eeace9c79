//! Error types for hmlink-core.
//!
//! No error here is fatal to the controller: a failed connect resumes
//! scanning, a failed discovery leaves the session partially populated, a
//! failed read leaves the value absent, and an adapter outage parks the
//! machine in `Unavailable` until the radio comes back. Errors cross the
//! [`StatusSink`](crate::traits::StatusSink) boundary only as human-readable
//! text; the structured kinds below exist for internal decisions and logs.

use thiserror::Error;

use hmlink_types::{AdapterState, PeripheralId};

/// Errors that can occur while driving the central state machine.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error from the platform backend.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No Bluetooth adapter is present on this machine.
    #[error("no Bluetooth adapter available")]
    NoAdapter,

    /// The adapter cannot service requests in its current state.
    #[error("Bluetooth adapter unavailable: {0}")]
    AdapterUnavailable(AdapterState),

    /// A connect request was issued for a peripheral the backend no longer knows.
    #[error("peripheral not found: {0}")]
    PeripheralNotFound(PeripheralId),

    /// Connecting to the peripheral failed.
    #[error("connection failed: {0}")]
    Connect(#[from] ConnectError),

    /// Service or characteristic discovery failed.
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Reading a characteristic value failed.
    #[error("read failed: {0}")]
    Read(#[from] ReadError),
}

/// Why a connection attempt failed.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConnectError {
    /// The connection attempt timed out.
    #[error("connection timed out")]
    Timeout,

    /// The peripheral rejected the connection.
    #[error("connection rejected by peripheral")]
    Rejected,

    /// The peripheral went out of range before the link came up.
    #[error("peripheral out of range")]
    OutOfRange,

    /// Generic BLE error from the backend.
    #[error("BLE error: {0}")]
    Ble(String),
}

/// Why an established connection was lost.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Disconnect was requested locally.
    #[error("disconnect requested")]
    Requested,

    /// The link dropped without a local request.
    #[error("connection lost")]
    ConnectionLost,

    /// Generic BLE error from the backend.
    #[error("BLE error: {0}")]
    Ble(String),
}

/// Why a GATT discovery step failed.
///
/// Discovery failures are reported and logged but never retried; the
/// session simply stays where it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// The requested service is not present on the peripheral.
    #[error("service {0} not found on peripheral")]
    ServiceNotFound(uuid::Uuid),

    /// Generic BLE error from the backend.
    #[error("BLE error: {0}")]
    Ble(String),
}

/// Why reading a characteristic value failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ReadError {
    /// The characteristic is not present on the peripheral.
    #[error("characteristic {0} not found on peripheral")]
    CharacteristicNotFound(uuid::Uuid),

    /// Generic BLE error from the backend.
    #[error("BLE error: {0}")]
    Ble(String),
}

/// Result type alias using hmlink-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

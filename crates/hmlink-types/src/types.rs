//! Core value types for the hmlink central state machine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Power and authorization state of the local Bluetooth adapter.
///
/// Produced by the adapter backend; the core only ever reads it.
/// This enum is marked `#[non_exhaustive]` to allow adding new states
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum AdapterState {
    /// State not yet known (initial state on most platforms).
    Unknown,
    /// The platform has no usable BLE radio.
    Unsupported,
    /// The application is not authorized to use Bluetooth.
    Unauthorized,
    /// The radio is present but powered off.
    PoweredOff,
    /// The radio is powered on and ready.
    PoweredOn,
}

impl AdapterState {
    /// Whether the adapter can service scan and connect requests.
    pub fn is_powered_on(self) -> bool {
        matches!(self, Self::PoweredOn)
    }
}

impl std::fmt::Display for AdapterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::PoweredOff => write!(f, "powered off"),
            Self::PoweredOn => write!(f, "powered on"),
        }
    }
}

/// Opaque identifier for a peripheral.
///
/// On macOS this is a CoreBluetooth UUID; on Linux/Windows it is derived
/// from the MAC address. The core never interprets the contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeripheralId(String);

impl PeripheralId {
    /// Create a peripheral ID from any string-like identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A single BLE advertisement as seen during scanning.
///
/// Ephemeral: one value per scan event, not retained by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertisement {
    /// Advertised local name, if the packet carried one.
    pub local_name: Option<String>,
    /// Identifier used to connect to the advertising peripheral.
    pub peripheral_id: PeripheralId,
    /// Signal strength in dBm, if reported.
    pub rssi: Option<i16>,
    /// Raw manufacturer data payload, if present.
    pub raw_manufacturer_data: Option<Vec<u8>>,
}

impl Advertisement {
    /// Create an advertisement with just a name and identifier.
    ///
    /// Mostly useful in tests; the backend fills in all fields.
    pub fn named(name: impl Into<String>, peripheral_id: impl Into<PeripheralId>) -> Self {
        Self {
            local_name: Some(name.into()),
            peripheral_id: peripheral_id.into(),
            rssi: None,
            raw_manufacturer_data: None,
        }
    }

    /// Create an advertisement that carries no local name.
    pub fn unnamed(peripheral_id: impl Into<PeripheralId>) -> Self {
        Self {
            local_name: None,
            peripheral_id: peripheral_id.into(),
            rssi: None,
            raw_manufacturer_data: None,
        }
    }
}

/// Which device the controller should connect to.
///
/// Immutable for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    /// The exact advertised local name to match.
    pub expected_local_name: String,
}

impl TargetDescriptor {
    /// Create a target descriptor for the given local name.
    pub fn new(expected_local_name: impl Into<String>) -> Self {
        Self {
            expected_local_name: expected_local_name.into(),
        }
    }
}

impl Default for TargetDescriptor {
    fn default() -> Self {
        Self::new(crate::uuid::DEFAULT_LOCAL_NAME)
    }
}

/// A discovered GATT service and the characteristics found under it.
///
/// Owned by the session; exists only between service discovery completion
/// and session teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// The service UUID.
    pub uuid: Uuid,
    /// Characteristics discovered under this service.
    pub characteristics: Vec<CharacteristicRecord>,
}

impl ServiceRecord {
    /// Create an empty record for a discovered service.
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            characteristics: Vec::new(),
        }
    }

    /// Find a characteristic record by UUID.
    pub fn characteristic(&self, uuid: Uuid) -> Option<&CharacteristicRecord> {
        self.characteristics.iter().find(|c| c.uuid == uuid)
    }
}

/// A discovered GATT characteristic and its last read value.
///
/// Mutated only by the owning session on read callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacteristicRecord {
    /// The characteristic UUID.
    pub uuid: Uuid,
    /// Last value read from the peripheral, if any.
    pub last_value: Option<Vec<u8>>,
    /// Whether notifications are enabled (always false: the module's
    /// manufacturer value is fetched with a one-shot read).
    pub notifying: bool,
}

impl CharacteristicRecord {
    /// Create a record for a discovered characteristic with no value yet.
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            last_value: None,
            notifying: false,
        }
    }
}

/// Decode a characteristic payload as a UTF-8 manufacturer name.
///
/// Invalid UTF-8 yields `None` rather than an error: the module is the
/// source of truth for its own payload and a garbled value is simply
/// treated as absent.
pub fn decode_manufacturer_name(bytes: &[u8]) -> Option<String> {
    std::str::from_utf8(bytes).ok().map(str::to_owned)
}

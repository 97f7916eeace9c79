//! Platform-agnostic types for HM-10 style BLE serial modules.
//!
//! This crate provides the shared value types used by the hmlink central
//! state machine: adapter power states, advertisement data, the target
//! descriptor, and the GATT records a session accumulates.
//!
//! # Example
//!
//! ```
//! use hmlink_types::{Advertisement, PeripheralId, TargetDescriptor};
//!
//! let target = TargetDescriptor::new("HMSoft");
//! assert_eq!(target.expected_local_name, "HMSoft");
//! ```

pub mod types;
pub mod uuid;

pub use types::{
    AdapterState, Advertisement, CharacteristicRecord, PeripheralId, ServiceRecord,
    TargetDescriptor, decode_manufacturer_name,
};
pub use uuid as uuids;

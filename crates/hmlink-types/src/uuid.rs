//! Bluetooth UUIDs for HM-10 style serial modules.
//!
//! The HM-10 (and its CC41 clones) exposes a single custom service that
//! carries the module's manufacturer information.

use uuid::{Uuid, uuid};

// --- HM-10 Service UUIDs ---

/// Device information service exposed by the module (0xFFE0).
pub const DEVICE_INFO_SERVICE: Uuid = uuid!("0000ffe0-0000-1000-8000-00805f9b34fb");

// --- HM-10 Characteristic UUIDs ---

/// Manufacturer characteristic carrying a UTF-8 name (0xFFE1).
pub const MANUFACTURER_CHARACTERISTIC: Uuid = uuid!("0000ffe1-0000-1000-8000-00805f9b34fb");

/// Local name the module advertises out of the box.
pub const DEFAULT_LOCAL_NAME: &str = "HMSoft";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_info_service_uuid() {
        let expected = "0000ffe0-0000-1000-8000-00805f9b34fb";
        assert_eq!(DEVICE_INFO_SERVICE.to_string(), expected);
    }

    #[test]
    fn test_manufacturer_characteristic_uuid() {
        let expected = "0000ffe1-0000-1000-8000-00805f9b34fb";
        assert_eq!(MANUFACTURER_CHARACTERISTIC.to_string(), expected);
    }

    #[test]
    fn test_uuids_are_distinct() {
        assert_ne!(DEVICE_INFO_SERVICE, MANUFACTURER_CHARACTERISTIC);
    }

    #[test]
    fn test_uuids_use_base_ble_suffix() {
        // Both are 16-bit UUIDs expanded with the Bluetooth base UUID
        for uuid in [DEVICE_INFO_SERVICE, MANUFACTURER_CHARACTERISTIC] {
            assert!(uuid.to_string().ends_with("-0000-1000-8000-00805f9b34fb"));
        }
    }

    #[test]
    fn test_default_local_name() {
        assert_eq!(DEFAULT_LOCAL_NAME, "HMSoft");
    }
}

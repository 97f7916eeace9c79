//! Advertisement filtering.
//!
//! The scan runs with no service filter; whether a discovered advertisement
//! belongs to the target device is decided here, in software.

use hmlink_types::{Advertisement, TargetDescriptor};

/// Whether an advertisement belongs to the target device.
///
/// True iff the advertisement carries a local name that is exactly equal to
/// the target's expected name. No substring and no case-insensitive
/// matching: HM-10 modules in the field carry names that differ only in
/// case ("HMSoft" vs "hmsoft"), and those are different devices.
pub fn matches(adv: &Advertisement, target: &TargetDescriptor) -> bool {
    adv.local_name.as_deref() == Some(target.expected_local_name.as_str())
}

//! Collaborator traits for the central state machine.
//!
//! The controller talks to hardware only through these traits. Every
//! method that waits on the radio is a *request*: it returns as soon as the
//! request is issued, and the outcome arrives later as an [`Event`] on the
//! controller's queue. The btleplug backend in [`crate::btle`] and the test
//! doubles in [`crate::mock`] both implement them.
//!
//! [`Event`]: crate::events::Event

use async_trait::async_trait;
use uuid::Uuid;

use hmlink_types::PeripheralId;

use crate::error::Result;

/// The local Bluetooth adapter (central role).
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Start scanning for advertisements.
    ///
    /// `service_filter` restricts the scan to peripherals advertising one of
    /// the given service UUIDs; `None` scans everything. The controller
    /// always passes `None` and filters in software.
    async fn scan(&self, service_filter: Option<&[Uuid]>) -> Result<()>;

    /// Stop an in-flight scan. The only cancellation primitive the
    /// adapter offers; connects and discoveries cannot be cancelled.
    async fn stop_scan(&self) -> Result<()>;

    /// Request a connection to a peripheral.
    ///
    /// The outcome arrives later as [`Event::ConnectResult`].
    ///
    /// [`Event::ConnectResult`]: crate::events::Event::ConnectResult
    async fn connect(&self, id: &PeripheralId) -> Result<()>;
}

/// GATT operations on one connected peripheral.
///
/// Implementations are exclusively owned through [`PeripheralHandle`]; no
/// live reference survives session teardown.
#[async_trait]
pub trait GattPeripheral: Send + Sync {
    /// The identifier this peripheral was connected under.
    fn id(&self) -> &PeripheralId;

    /// Request service discovery. `None` discovers all services.
    ///
    /// Completion arrives as [`Event::ServicesDiscovered`].
    ///
    /// [`Event::ServicesDiscovered`]: crate::events::Event::ServicesDiscovered
    async fn discover_services(&self, filter: Option<&[Uuid]>) -> Result<()>;

    /// Request characteristic discovery for one service.
    ///
    /// Completion arrives as [`Event::CharacteristicsDiscovered`].
    ///
    /// [`Event::CharacteristicsDiscovered`]: crate::events::Event::CharacteristicsDiscovered
    async fn discover_characteristics(&self, service: Uuid, filter: Option<&[Uuid]>)
    -> Result<()>;

    /// Request a one-shot read of a characteristic value.
    ///
    /// Completion arrives as [`Event::ValueUpdated`].
    ///
    /// [`Event::ValueUpdated`]: crate::events::Event::ValueUpdated
    async fn read_value(&self, characteristic: Uuid) -> Result<()>;

    /// Request a disconnect. The link is down once
    /// [`Event::Disconnected`] arrives.
    ///
    /// [`Event::Disconnected`]: crate::events::Event::Disconnected
    async fn disconnect(&self) -> Result<()>;
}

/// Exclusively owned handle to a connected peripheral.
///
/// At most one handle exists system-wide: it is created by the backend on
/// a successful connect and owned by the active session until teardown.
pub struct PeripheralHandle(Box<dyn GattPeripheral>);

impl PeripheralHandle {
    /// Wrap a backend peripheral in an owned handle.
    pub fn new(peripheral: Box<dyn GattPeripheral>) -> Self {
        Self(peripheral)
    }

    /// The identifier of the connected peripheral.
    pub fn id(&self) -> &PeripheralId {
        self.0.id()
    }
}

impl std::ops::Deref for PeripheralHandle {
    type Target = dyn GattPeripheral;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl std::fmt::Debug for PeripheralHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PeripheralHandle").field(&self.id()).finish()
    }
}

/// Receiver for human-readable status text.
///
/// Fire-and-forget: `report` must never block the caller. This is the only
/// surface the UI layer sees; structured error kinds stay internal.
pub trait StatusSink: Send + Sync {
    /// Deliver one status line.
    fn report(&self, text: &str);
}

/// Status sink that forwards every line to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn report(&self, text: &str) {
        tracing::info!(status = text, "status update");
    }
}

//! Typed events consumed by the central state machine.
//!
//! Every asynchronous hardware outcome is one [`Event`] pushed onto a
//! single-consumer queue. The queue preserves delivery order, which is the
//! ordering guarantee the machine relies on: discovery completions are never
//! reordered relative to connect/disconnect events for the same peripheral.

use tokio::sync::mpsc;
use uuid::Uuid;

use hmlink_types::{AdapterState, Advertisement};

use crate::error::{ConnectError, DisconnectReason, DiscoveryError, ReadError};
use crate::traits::PeripheralHandle;

/// One asynchronous hardware or protocol outcome.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event kinds
/// in future versions without breaking downstream code.
#[derive(Debug)]
#[non_exhaustive]
pub enum Event {
    /// The adapter's power/authorization state changed.
    AdapterStateChanged(AdapterState),
    /// An advertisement was seen while scanning.
    AdvertisementReceived(Advertisement),
    /// A previously issued connect request completed.
    ConnectResult(Result<PeripheralHandle, ConnectError>),
    /// The peripheral link went down, with a reason when the backend knows one.
    Disconnected(Option<DisconnectReason>),
    /// Service discovery completed with the UUIDs of the discovered services.
    ServicesDiscovered(Result<Vec<Uuid>, DiscoveryError>),
    /// Characteristic discovery completed for one service.
    CharacteristicsDiscovered {
        /// The service whose characteristics were discovered.
        service: Uuid,
        /// The UUIDs of the discovered characteristics.
        result: Result<Vec<Uuid>, DiscoveryError>,
    },
    /// A one-shot read completed.
    ValueUpdated {
        /// The characteristic that was read.
        characteristic: Uuid,
        /// The value payload.
        result: Result<Vec<u8>, ReadError>,
    },
}

/// Sender half of the event queue, cloned into every backend task.
pub type EventSender = mpsc::UnboundedSender<Event>;

/// Receiver half of the event queue; the controller is the only consumer.
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;

/// Create the event queue connecting a backend to a controller.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

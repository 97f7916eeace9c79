//! BLE central connection state machine for HM-10 serial modules.
//!
//! This crate implements the full central-role lifecycle against an HM-10
//! style module (local name `"HMSoft"`, service `0xFFE0`, characteristic
//! `0xFFE1`): wait for the adapter to power on, scan without a service
//! filter, match advertisements by exact local name, connect, walk GATT
//! discovery, read the manufacturer characteristic once, and fall back to
//! scanning on any disconnect or connect failure.
//!
//! # Architecture
//!
//! All hardware callbacks are expressed as typed [`Event`] values delivered
//! through a single-consumer channel; [`CentralController`] is an explicit
//! state machine consuming that queue. Hardware access sits behind the
//! [`Adapter`] and [`GattPeripheral`] traits, so the machine runs unchanged
//! against the btleplug backend ([`SystemAdapter`]) or the in-process mocks.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hmlink_core::{CentralController, SystemAdapter, TracingStatusSink, event_channel};
//! use hmlink_types::TargetDescriptor;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (tx, rx) = event_channel();
//!     let adapter = Arc::new(SystemAdapter::new(tx.clone()).await?);
//!     let cancel = CancellationToken::new();
//!     adapter.spawn_event_pump(cancel.clone());
//!
//!     let controller = CentralController::new(
//!         adapter,
//!         Arc::new(TracingStatusSink),
//!         TargetDescriptor::default(),
//!     );
//!     controller.run(rx, cancel).await?;
//!     Ok(())
//! }
//! ```

pub mod btle;
pub mod controller;
pub mod error;
pub mod events;
pub mod filter;
pub mod mock;
pub mod session;
pub mod traits;

// Core exports
pub use btle::{SystemAdapter, SystemPeripheral};
pub use controller::{CentralController, ControllerState};
pub use error::{ConnectError, DisconnectReason, DiscoveryError, Error, ReadError, Result};
pub use events::{Event, EventReceiver, EventSender, event_channel};
pub use filter::matches;
pub use mock::{MockAdapter, MockPeripheral, RecordingSink};
pub use session::{PeripheralSession, SessionState};
pub use traits::{Adapter, GattPeripheral, PeripheralHandle, StatusSink, TracingStatusSink};

// Re-export from hmlink-types
pub use hmlink_types::uuid as uuids;
pub use hmlink_types::{
    AdapterState, Advertisement, CharacteristicRecord, PeripheralId, ServiceRecord,
    TargetDescriptor, decode_manufacturer_name,
};

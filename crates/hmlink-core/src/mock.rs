//! Mock collaborators for testing without BLE hardware.
//!
//! [`MockAdapter`] and [`MockPeripheral`] record every request the state
//! machine issues; tests drive the machine by pushing [`Event`]s directly
//! and then assert on the recorded requests. [`RecordingSink`] captures
//! status text the same way.
//!
//! [`Event`]: crate::events::Event

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use hmlink_types::PeripheralId;

use crate::error::Result;
use crate::traits::{Adapter, GattPeripheral, StatusSink};

/// A request the controller issued to the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterRequest {
    /// `scan` with the service filter that was passed.
    Scan {
        /// The service filter, `None` for an unfiltered scan.
        service_filter: Option<Vec<Uuid>>,
    },
    /// `stop_scan`.
    StopScan,
    /// `connect` to the given peripheral.
    Connect(PeripheralId),
}

/// Adapter double that records requests and always succeeds.
///
/// Outcomes (connect results, advertisements, state changes) are injected
/// by the test pushing events onto the controller's queue, mirroring how
/// the real backend delivers them.
#[derive(Debug, Default)]
pub struct MockAdapter {
    requests: Mutex<Vec<AdapterRequest>>,
}

impl MockAdapter {
    /// Create a mock adapter with an empty request log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request issued so far, in order.
    pub fn requests(&self) -> Vec<AdapterRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of scan requests issued.
    pub fn scan_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| matches!(r, AdapterRequest::Scan { .. }))
            .count()
    }

    /// Number of connect requests issued.
    pub fn connect_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| matches!(r, AdapterRequest::Connect(_)))
            .count()
    }

    fn record(&self, request: AdapterRequest) {
        self.requests.lock().unwrap().push(request);
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    async fn scan(&self, service_filter: Option<&[Uuid]>) -> Result<()> {
        self.record(AdapterRequest::Scan {
            service_filter: service_filter.map(<[Uuid]>::to_vec),
        });
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.record(AdapterRequest::StopScan);
        Ok(())
    }

    async fn connect(&self, id: &PeripheralId) -> Result<()> {
        self.record(AdapterRequest::Connect(id.clone()));
        Ok(())
    }
}

/// A request the session issued to a peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattRequest {
    /// `discover_services` with the UUID filter that was passed.
    DiscoverServices {
        /// The UUID filter, `None` for all services.
        filter: Option<Vec<Uuid>>,
    },
    /// `discover_characteristics` for one service.
    DiscoverCharacteristics {
        /// The service whose characteristics were requested.
        service: Uuid,
        /// The UUID filter, `None` for all characteristics.
        filter: Option<Vec<Uuid>>,
    },
    /// `read_value` of one characteristic.
    ReadValue(Uuid),
    /// `disconnect`.
    Disconnect,
}

/// Shared request log for a [`MockPeripheral`].
///
/// Tests keep a clone of the log, because the peripheral itself moves into
/// the session when it is boxed into a handle.
pub type RequestLog = Arc<Mutex<Vec<GattRequest>>>;

/// Short names of the requests in a log, for compact assertions.
pub fn gatt_request_names(log: &RequestLog) -> Vec<&'static str> {
    log.lock()
        .unwrap()
        .iter()
        .map(|r| match r {
            GattRequest::DiscoverServices { .. } => "discover_services",
            GattRequest::DiscoverCharacteristics { .. } => "discover_characteristics",
            GattRequest::ReadValue(_) => "read_value",
            GattRequest::Disconnect => "disconnect",
        })
        .collect()
}

/// Peripheral double that records GATT requests and always succeeds.
#[derive(Debug)]
pub struct MockPeripheral {
    id: PeripheralId,
    requests: RequestLog,
}

impl MockPeripheral {
    /// Create a mock peripheral with the given identifier.
    pub fn new(id: impl Into<PeripheralId>) -> Self {
        Self {
            id: id.into(),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A clone of the request log, usable after the peripheral is boxed.
    pub fn request_log(&self) -> RequestLog {
        Arc::clone(&self.requests)
    }
}

#[async_trait]
impl GattPeripheral for MockPeripheral {
    fn id(&self) -> &PeripheralId {
        &self.id
    }

    async fn discover_services(&self, filter: Option<&[Uuid]>) -> Result<()> {
        self.requests.lock().unwrap().push(GattRequest::DiscoverServices {
            filter: filter.map(<[Uuid]>::to_vec),
        });
        Ok(())
    }

    async fn discover_characteristics(
        &self,
        service: Uuid,
        filter: Option<&[Uuid]>,
    ) -> Result<()> {
        self.requests
            .lock()
            .unwrap()
            .push(GattRequest::DiscoverCharacteristics {
                service,
                filter: filter.map(<[Uuid]>::to_vec),
            });
        Ok(())
    }

    async fn read_value(&self, characteristic: Uuid) -> Result<()> {
        self.requests
            .lock()
            .unwrap()
            .push(GattRequest::ReadValue(characteristic));
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.requests.lock().unwrap().push(GattRequest::Disconnect);
        Ok(())
    }
}

/// Status sink that records every reported line.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    /// Create an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All status lines reported so far, in order.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    /// Whether any reported line contains the given text.
    pub fn contains(&self, text: &str) -> bool {
        self.messages.lock().unwrap().iter().any(|m| m.contains(text))
    }
}

impl StatusSink for RecordingSink {
    fn report(&self, text: &str) {
        self.messages.lock().unwrap().push(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_adapter_records_in_order() {
        let adapter = MockAdapter::new();
        adapter.scan(None).await.unwrap();
        adapter.stop_scan().await.unwrap();
        adapter.connect(&PeripheralId::new("peer-1")).await.unwrap();

        assert_eq!(
            adapter.requests(),
            vec![
                AdapterRequest::Scan {
                    service_filter: None
                },
                AdapterRequest::StopScan,
                AdapterRequest::Connect(PeripheralId::new("peer-1")),
            ]
        );
        assert_eq!(adapter.scan_count(), 1);
        assert_eq!(adapter.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_peripheral_log_survives_boxing() {
        let peripheral = MockPeripheral::new("peer-1");
        let log = peripheral.request_log();
        let boxed: Box<dyn GattPeripheral> = Box::new(peripheral);

        boxed.read_value(uuid::Uuid::nil()).await.unwrap();
        assert_eq!(gatt_request_names(&log), vec!["read_value"]);
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.report("Searching");
        sink.report("Found BLE DEVICE");

        assert_eq!(sink.messages().len(), 2);
        assert!(sink.contains("Found"));
        assert!(!sink.contains("Connected"));
    }
}

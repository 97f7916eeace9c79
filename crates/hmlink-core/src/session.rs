//! Peripheral session: GATT discovery and value reads for one connection.
//!
//! A session exclusively owns the [`PeripheralHandle`] created on connect
//! and accumulates the service/characteristic records discovered over it.
//! Dropping the session (which the controller does on every disconnect)
//! invalidates all records atomically; there is no way to read stale GATT
//! state after teardown.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use hmlink_types::{
    CharacteristicRecord, PeripheralId, ServiceRecord, decode_manufacturer_name,
    uuid::{DEVICE_INFO_SERVICE, MANUFACTURER_CHARACTERISTIC},
};

use crate::error::{DiscoveryError, ReadError, Result};
use crate::traits::{PeripheralHandle, StatusSink};

/// Where the session is in the discovery protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Service discovery requested, completion not yet seen.
    AwaitingServices,
    /// Characteristic discovery in flight for at least one matched service.
    AwaitingCharacteristics,
    /// Discovery finished; value reads may still be in flight.
    Ready,
    /// Records invalidated; the session accepts no further events.
    TornDown,
}

/// Owns one connected peripheral through discovery, read, and teardown.
pub struct PeripheralSession {
    handle: PeripheralHandle,
    status: Arc<dyn StatusSink>,
    state: SessionState,
    services: Vec<ServiceRecord>,
    /// Characteristic discoveries still in flight.
    pending_discoveries: usize,
}

impl std::fmt::Debug for PeripheralSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeripheralSession")
            .field("peripheral", &self.handle.id())
            .field("state", &self.state)
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

impl PeripheralSession {
    /// Take exclusive ownership of a freshly connected peripheral.
    pub fn new(handle: PeripheralHandle, status: Arc<dyn StatusSink>) -> Self {
        Self {
            handle,
            status,
            state: SessionState::AwaitingServices,
            services: Vec::new(),
            pending_discoveries: 0,
        }
    }

    /// Current protocol state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Identifier of the connected peripheral.
    pub fn peripheral_id(&self) -> &PeripheralId {
        self.handle.id()
    }

    /// Records for the services retained by this session.
    pub fn services(&self) -> &[ServiceRecord] {
        &self.services
    }

    /// The decoded manufacturer name, once the one-shot read has landed.
    ///
    /// `None` until the read completes, and also when the payload was not
    /// valid UTF-8.
    pub fn manufacturer_name(&self) -> Option<String> {
        self.last_value(MANUFACTURER_CHARACTERISTIC)
            .and_then(decode_manufacturer_name)
    }

    /// Raw last value read from a characteristic, if any.
    pub fn last_value(&self, characteristic: Uuid) -> Option<&[u8]> {
        self.services
            .iter()
            .find_map(|s| s.characteristic(characteristic))
            .and_then(|c| c.last_value.as_deref())
    }

    /// Request full service discovery (no UUID filter) from the peripheral.
    pub async fn begin_discovery(&mut self) -> Result<()> {
        debug!(peripheral = %self.handle.id(), "requesting service discovery");
        self.handle.discover_services(None).await
    }

    /// Handle completion of service discovery.
    ///
    /// Services other than the device-info service are acknowledged but not
    /// stored. Zero matches leaves the session inert in `AwaitingServices`;
    /// errors are reported and never retried.
    pub async fn on_services_discovered(
        &mut self,
        result: std::result::Result<Vec<Uuid>, DiscoveryError>,
    ) -> Result<()> {
        if self.state != SessionState::AwaitingServices {
            debug!(state = ?self.state, "ignoring service discovery result");
            return Ok(());
        }

        let services = match result {
            Ok(services) => services,
            Err(e) => {
                warn!("service discovery failed: {e}");
                self.status.report(&format!("Service discovery failed: {e}"));
                return Ok(());
            }
        };

        for uuid in services {
            debug!(service = %uuid, "discovered service");
            if uuid != DEVICE_INFO_SERVICE {
                continue;
            }
            self.status.report("FOUND SERVICE");
            self.handle.discover_characteristics(uuid, None).await?;
            // Record only once the request is out; a failed request must not
            // leave a service whose characteristics will never arrive
            self.services.push(ServiceRecord::new(uuid));
            self.pending_discoveries += 1;
            self.state = SessionState::AwaitingCharacteristics;
        }

        if self.services.is_empty() {
            debug!("no device-info service on peripheral, session stays inert");
        }
        Ok(())
    }

    /// Handle completion of characteristic discovery for one service.
    ///
    /// Each manufacturer characteristic gets a record and a one-shot read
    /// request. Notifications are deliberately not enabled.
    pub async fn on_characteristics_discovered(
        &mut self,
        service: Uuid,
        result: std::result::Result<Vec<Uuid>, DiscoveryError>,
    ) -> Result<()> {
        if self.state != SessionState::AwaitingCharacteristics {
            debug!(state = ?self.state, "ignoring characteristic discovery result");
            return Ok(());
        }

        match result {
            Ok(characteristics) => {
                let mut reads = Vec::new();
                if let Some(record) = self.services.iter_mut().find(|s| s.uuid == service) {
                    for uuid in characteristics {
                        debug!(characteristic = %uuid, "discovered characteristic");
                        if uuid != MANUFACTURER_CHARACTERISTIC {
                            continue;
                        }
                        self.status.report("FOUND CHARACTERISTIC");
                        record.characteristics.push(CharacteristicRecord::new(uuid));
                        reads.push(uuid);
                    }
                } else {
                    debug!(service = %service, "characteristics for a service we did not retain");
                }
                for uuid in reads {
                    self.handle.read_value(uuid).await?;
                }
            }
            Err(e) => {
                warn!(service = %service, "characteristic discovery failed: {e}");
                self.status
                    .report(&format!("Characteristic discovery failed: {e}"));
            }
        }

        self.pending_discoveries = self.pending_discoveries.saturating_sub(1);
        if self.pending_discoveries == 0 {
            self.state = SessionState::Ready;
        }
        Ok(())
    }

    /// Handle completion of a one-shot value read.
    ///
    /// A payload that is not valid UTF-8 leaves the manufacturer name absent
    /// rather than surfacing an error.
    pub fn on_value_updated(
        &mut self,
        characteristic: Uuid,
        result: std::result::Result<Vec<u8>, ReadError>,
    ) {
        if self.state == SessionState::TornDown {
            debug!("ignoring value update after teardown");
            return;
        }

        let bytes = match result {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(characteristic = %characteristic, "value read failed: {e}");
                self.status.report(&format!("Read failed: {e}"));
                return;
            }
        };

        let Some(record) = self
            .services
            .iter_mut()
            .find_map(|s| s.characteristics.iter_mut().find(|c| c.uuid == characteristic))
        else {
            debug!(characteristic = %characteristic, "value for an unknown characteristic");
            return;
        };

        record.last_value = Some(bytes.clone());
        match decode_manufacturer_name(&bytes) {
            Some(name) => {
                info!(manufacturer = %name, "manufacturer name read");
                self.status.report(&format!("Manufacturer: {name}"));
            }
            None => {
                debug!("manufacturer payload is not valid UTF-8, name left absent");
            }
        }
    }

    /// Ask the peripheral to disconnect and invalidate the records now.
    ///
    /// The link is actually down once the backend delivers the disconnect
    /// event; the controller parks in `Disconnecting` until then.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.handle.disconnect().await?;
        self.teardown();
        Ok(())
    }

    /// Invalidate all owned records. Idempotent via the state guard.
    pub fn teardown(&mut self) {
        if self.state == SessionState::TornDown {
            return;
        }
        debug!(peripheral = %self.handle.id(), "tearing down session");
        self.services.clear();
        self.state = SessionState::TornDown;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockPeripheral, RecordingSink, gatt_request_names};

    fn session_with_mock() -> (PeripheralSession, Arc<RecordingSink>, crate::mock::RequestLog) {
        let peripheral = MockPeripheral::new("peer-1");
        let log = peripheral.request_log();
        let sink = Arc::new(RecordingSink::default());
        let session = PeripheralSession::new(
            PeripheralHandle::new(Box::new(peripheral)),
            sink.clone(),
        );
        (session, sink, log)
    }

    #[tokio::test]
    async fn test_begin_discovery_requests_all_services() {
        let (mut session, _sink, log) = session_with_mock();
        session.begin_discovery().await.unwrap();

        assert_eq!(gatt_request_names(&log), vec!["discover_services"]);
        assert_eq!(session.state(), SessionState::AwaitingServices);
    }

    #[tokio::test]
    async fn test_matching_service_triggers_characteristic_discovery() {
        let (mut session, sink, log) = session_with_mock();
        session.begin_discovery().await.unwrap();

        session
            .on_services_discovered(Ok(vec![uuid::Uuid::nil(), DEVICE_INFO_SERVICE]))
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::AwaitingCharacteristics);
        assert_eq!(session.services().len(), 1);
        assert!(sink.contains("FOUND SERVICE"));
        assert_eq!(
            gatt_request_names(&log),
            vec!["discover_services", "discover_characteristics"]
        );
    }

    #[tokio::test]
    async fn test_no_matching_service_leaves_session_inert() {
        let (mut session, sink, log) = session_with_mock();
        session.begin_discovery().await.unwrap();

        session
            .on_services_discovered(Ok(vec![uuid::Uuid::nil()]))
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::AwaitingServices);
        assert!(session.services().is_empty());
        assert!(!sink.contains("FOUND SERVICE"));
        assert_eq!(gatt_request_names(&log), vec!["discover_services"]);
    }

    #[tokio::test]
    async fn test_failed_characteristic_request_records_no_service() {
        use crate::traits::GattPeripheral;

        struct RejectingGatt {
            id: PeripheralId,
        }

        #[async_trait::async_trait]
        impl GattPeripheral for RejectingGatt {
            fn id(&self) -> &PeripheralId {
                &self.id
            }

            async fn discover_services(&self, _filter: Option<&[Uuid]>) -> Result<()> {
                Ok(())
            }

            async fn discover_characteristics(
                &self,
                _service: Uuid,
                _filter: Option<&[Uuid]>,
            ) -> Result<()> {
                Err(DiscoveryError::Ble("request rejected".into()).into())
            }

            async fn read_value(&self, _characteristic: Uuid) -> Result<()> {
                Ok(())
            }

            async fn disconnect(&self) -> Result<()> {
                Ok(())
            }
        }

        let sink = Arc::new(RecordingSink::default());
        let handle = PeripheralHandle::new(Box::new(RejectingGatt {
            id: PeripheralId::new("peer-1"),
        }));
        let mut session = PeripheralSession::new(handle, sink);
        session.begin_discovery().await.unwrap();

        let result = session
            .on_services_discovered(Ok(vec![DEVICE_INFO_SERVICE]))
            .await;

        // The error propagates, and no dangling service record is kept
        assert!(result.is_err());
        assert!(session.services().is_empty());
        assert_eq!(session.state(), SessionState::AwaitingServices);
    }

    #[tokio::test]
    async fn test_discovery_error_is_reported_not_retried() {
        let (mut session, sink, log) = session_with_mock();
        session.begin_discovery().await.unwrap();

        session
            .on_services_discovered(Err(DiscoveryError::Ble("gatt timeout".into())))
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::AwaitingServices);
        assert!(sink.contains("Service discovery failed"));
        // No second discover_services request
        assert_eq!(gatt_request_names(&log), vec!["discover_services"]);
    }

    #[tokio::test]
    async fn test_manufacturer_characteristic_gets_one_shot_read() {
        let (mut session, sink, log) = session_with_mock();
        session.begin_discovery().await.unwrap();
        session
            .on_services_discovered(Ok(vec![DEVICE_INFO_SERVICE]))
            .await
            .unwrap();

        session
            .on_characteristics_discovered(
                DEVICE_INFO_SERVICE,
                Ok(vec![uuid::Uuid::nil(), MANUFACTURER_CHARACTERISTIC]),
            )
            .await
            .unwrap();

        assert_eq!(session.state(), SessionState::Ready);
        assert!(sink.contains("FOUND CHARACTERISTIC"));
        assert_eq!(
            gatt_request_names(&log),
            vec![
                "discover_services",
                "discover_characteristics",
                "read_value"
            ]
        );
        // Read requested, but notifications never enabled
        let record = session.services()[0]
            .characteristic(MANUFACTURER_CHARACTERISTIC)
            .unwrap();
        assert!(!record.notifying);
        assert!(record.last_value.is_none());
    }

    #[tokio::test]
    async fn test_value_update_decodes_utf8() {
        let (mut session, sink, _log) = session_with_mock();
        session.begin_discovery().await.unwrap();
        session
            .on_services_discovered(Ok(vec![DEVICE_INFO_SERVICE]))
            .await
            .unwrap();
        session
            .on_characteristics_discovered(
                DEVICE_INFO_SERVICE,
                Ok(vec![MANUFACTURER_CHARACTERISTIC]),
            )
            .await
            .unwrap();

        session.on_value_updated(
            MANUFACTURER_CHARACTERISTIC,
            Ok(vec![0x54, 0x65, 0x73, 0x74]),
        );

        assert_eq!(session.manufacturer_name().as_deref(), Some("Test"));
        assert!(sink.contains("Manufacturer: Test"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_leaves_name_absent() {
        let (mut session, sink, _log) = session_with_mock();
        session.begin_discovery().await.unwrap();
        session
            .on_services_discovered(Ok(vec![DEVICE_INFO_SERVICE]))
            .await
            .unwrap();
        session
            .on_characteristics_discovered(
                DEVICE_INFO_SERVICE,
                Ok(vec![MANUFACTURER_CHARACTERISTIC]),
            )
            .await
            .unwrap();

        session.on_value_updated(MANUFACTURER_CHARACTERISTIC, Ok(vec![0xFF, 0xFE]));

        assert_eq!(session.manufacturer_name(), None);
        assert!(!sink.contains("Manufacturer:"));
        // The raw bytes are still retained on the record
        assert_eq!(
            session.last_value(MANUFACTURER_CHARACTERISTIC),
            Some(&[0xFF, 0xFE][..])
        );
    }

    #[tokio::test]
    async fn test_read_error_is_reported_and_discarded() {
        let (mut session, sink, _log) = session_with_mock();
        session.begin_discovery().await.unwrap();
        session
            .on_services_discovered(Ok(vec![DEVICE_INFO_SERVICE]))
            .await
            .unwrap();
        session
            .on_characteristics_discovered(
                DEVICE_INFO_SERVICE,
                Ok(vec![MANUFACTURER_CHARACTERISTIC]),
            )
            .await
            .unwrap();

        session.on_value_updated(
            MANUFACTURER_CHARACTERISTIC,
            Err(ReadError::Ble("link lost mid-read".into())),
        );

        assert!(sink.contains("Read failed"));
        assert_eq!(session.last_value(MANUFACTURER_CHARACTERISTIC), None);
    }

    #[tokio::test]
    async fn test_teardown_invalidates_records_and_is_idempotent() {
        let (mut session, _sink, _log) = session_with_mock();
        session.begin_discovery().await.unwrap();
        session
            .on_services_discovered(Ok(vec![DEVICE_INFO_SERVICE]))
            .await
            .unwrap();
        assert!(!session.services().is_empty());

        session.teardown();
        assert_eq!(session.state(), SessionState::TornDown);
        assert!(session.services().is_empty());

        // Second teardown is a no-op
        session.teardown();
        assert_eq!(session.state(), SessionState::TornDown);

        // Late value updates after teardown are ignored
        session.on_value_updated(MANUFACTURER_CHARACTERISTIC, Ok(vec![0x41]));
        assert_eq!(session.manufacturer_name(), None);
    }

    #[tokio::test]
    async fn test_disconnect_requests_and_tears_down() {
        let (mut session, _sink, log) = session_with_mock();
        session.disconnect().await.unwrap();

        assert_eq!(session.state(), SessionState::TornDown);
        assert_eq!(gatt_request_names(&log), vec!["disconnect"]);
    }
}

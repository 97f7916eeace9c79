//! Central controller: the top-level BLE connection state machine.
//!
//! `Idle → Scanning → Connecting → Connected → Disconnecting → Scanning`,
//! with `Unavailable` reachable from every state when the adapter loses
//! power or authorization. The controller owns the adapter collaborator and
//! the (at most one) peripheral session, and reports every transition as
//! human-readable text through the [`StatusSink`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hmlink_types::{AdapterState, Advertisement, PeripheralId, TargetDescriptor};

use crate::error::{ConnectError, DisconnectReason, Result};
use crate::events::{Event, EventReceiver};
use crate::filter;
use crate::session::PeripheralSession;
use crate::traits::{Adapter, PeripheralHandle, StatusSink};

/// Controller states.
///
/// The session lives inside the `Connected` variant, so GATT records are
/// structurally unreachable outside of it.
#[derive(Debug)]
pub enum ControllerState {
    /// Waiting for the first adapter state report.
    Idle,
    /// The adapter is not powered on; no requests are issued.
    Unavailable,
    /// Scanning for advertisements (no service filter).
    Scanning,
    /// Connect request in flight for one matched peripheral.
    Connecting {
        /// The peripheral the connect request was issued for.
        peripheral_id: PeripheralId,
    },
    /// Link up; the session drives GATT discovery and reads.
    Connected(PeripheralSession),
    /// Local disconnect requested, waiting for the link to drop.
    Disconnecting,
}

impl ControllerState {
    /// Short name for logs and tests.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Unavailable => "unavailable",
            Self::Scanning => "scanning",
            Self::Connecting { .. } => "connecting",
            Self::Connected(_) => "connected",
            Self::Disconnecting => "disconnecting",
        }
    }
}

/// Orchestrates adapter state, scanning, filtering, connecting, and the
/// peripheral session for exactly one target device.
pub struct CentralController {
    adapter: Arc<dyn Adapter>,
    status: Arc<dyn StatusSink>,
    target: TargetDescriptor,
    state: ControllerState,
}

impl std::fmt::Debug for CentralController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CentralController")
            .field("target", &self.target)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl CentralController {
    /// Create a controller in `Idle`, waiting for the adapter to report in.
    pub fn new(
        adapter: Arc<dyn Adapter>,
        status: Arc<dyn StatusSink>,
        target: TargetDescriptor,
    ) -> Self {
        Self {
            adapter,
            status,
            target,
            state: ControllerState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    /// The target this controller connects to.
    pub fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    /// The active session, when connected.
    pub fn session(&self) -> Option<&PeripheralSession> {
        match &self.state {
            ControllerState::Connected(session) => Some(session),
            _ => None,
        }
    }

    /// Consume events until the queue closes or the token is cancelled.
    ///
    /// Recoverable errors (and they are all recoverable) are logged and the
    /// loop keeps going; the controller self-heals by returning to scanning.
    pub async fn run(mut self, mut events: EventReceiver, cancel: CancellationToken) -> Result<()> {
        info!(target_name = %self.target.expected_local_name, "central controller running");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("central controller cancelled");
                    if let Err(e) = self.disconnect().await {
                        warn!("disconnect on shutdown failed: {e}");
                    }
                    return Ok(());
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        info!("event queue closed, central controller stopping");
                        return Ok(());
                    };
                    if let Err(e) = self.handle_event(event).await {
                        warn!("event handling failed: {e}");
                    }
                }
            }
        }
    }

    /// Dispatch one event to the state machine.
    ///
    /// GATT completions are routed to the active session; when no session
    /// exists they are stale leftovers from a torn-down connection and are
    /// dropped.
    pub async fn handle_event(&mut self, event: Event) -> Result<()> {
        match event {
            Event::AdapterStateChanged(state) => self.on_adapter_state_changed(state).await,
            Event::AdvertisementReceived(adv) => self.on_advertisement(adv).await,
            Event::ConnectResult(result) => self.on_connect_result(result).await,
            Event::Disconnected(reason) => self.on_disconnect(reason).await,
            Event::ServicesDiscovered(result) => {
                match &mut self.state {
                    ControllerState::Connected(session) => {
                        session.on_services_discovered(result).await?
                    }
                    _ => debug!("dropping stale service discovery result"),
                }
                Ok(())
            }
            Event::CharacteristicsDiscovered { service, result } => {
                match &mut self.state {
                    ControllerState::Connected(session) => {
                        session.on_characteristics_discovered(service, result).await?
                    }
                    _ => debug!("dropping stale characteristic discovery result"),
                }
                Ok(())
            }
            Event::ValueUpdated {
                characteristic,
                result,
            } => {
                match &mut self.state {
                    ControllerState::Connected(session) => {
                        session.on_value_updated(characteristic, result)
                    }
                    _ => debug!("dropping stale value update"),
                }
                Ok(())
            }
        }
    }

    /// React to an adapter power/authorization change.
    ///
    /// Powered-on from `Idle` or `Unavailable` starts scanning with no
    /// service filter (matching happens in software). Anything else parks
    /// the machine in `Unavailable` and cancels what can be cancelled.
    pub async fn on_adapter_state_changed(&mut self, adapter_state: AdapterState) -> Result<()> {
        info!(adapter_state = %adapter_state, "adapter state changed");

        if adapter_state.is_powered_on() {
            match self.state {
                ControllerState::Idle | ControllerState::Unavailable => {
                    self.status.report("Searching");
                    self.enter_scanning().await
                }
                _ => {
                    debug!(state = self.state.name(), "adapter powered on, already active");
                    Ok(())
                }
            }
        } else {
            self.status
                .report(&format!("Bluetooth unavailable ({adapter_state})"));
            let previous = std::mem::replace(&mut self.state, ControllerState::Unavailable);
            match previous {
                ControllerState::Scanning => {
                    // Stopping the scan is the only cancellation the radio offers
                    self.adapter.stop_scan().await?;
                }
                ControllerState::Connected(mut session) => {
                    // An in-flight connect cannot be cancelled; a dead radio
                    // resolves it with a disconnect event we will ignore here
                    session.teardown();
                }
                _ => {}
            }
            Ok(())
        }
    }

    /// React to one advertisement.
    ///
    /// Only meaningful while `Scanning`; duplicate matches arriving after
    /// the transition to `Connecting` are ignored by the state guard. Any
    /// named advertisement is surfaced as "Found BLE DEVICE", matched or
    /// not.
    pub async fn on_advertisement(&mut self, adv: Advertisement) -> Result<()> {
        if !matches!(self.state, ControllerState::Scanning) {
            debug!(state = self.state.name(), "ignoring advertisement");
            return Ok(());
        }

        if let Some(name) = &adv.local_name {
            debug!(name = %name, peripheral = %adv.peripheral_id, rssi = ?adv.rssi, "saw named advertisement");
            self.status.report("Found BLE DEVICE");
        }

        if !filter::matches(&adv, &self.target) {
            return Ok(());
        }

        info!(peripheral = %adv.peripheral_id, "target device found, connecting");
        self.status
            .report(&format!("Connecting to {}", self.target.expected_local_name));
        self.state = ControllerState::Connecting {
            peripheral_id: adv.peripheral_id.clone(),
        };
        self.adapter.stop_scan().await?;
        self.adapter.connect(&adv.peripheral_id).await
    }

    /// React to the outcome of a connect request.
    ///
    /// Success builds the session and starts GATT discovery; failure is
    /// non-fatal and resumes scanning with exactly one re-issued scan.
    pub async fn on_connect_result(
        &mut self,
        result: std::result::Result<PeripheralHandle, ConnectError>,
    ) -> Result<()> {
        if !matches!(self.state, ControllerState::Connecting { .. }) {
            debug!(state = self.state.name(), "ignoring connect result");
            // A connect that raced a disconnect still brought the link up;
            // drop it rather than leave the peripheral connected unattended
            if let Ok(handle) = result {
                tokio::spawn(async move {
                    if let Err(e) = handle.disconnect().await {
                        warn!(peripheral = %handle.id(), "failed to drop stale connection: {e}");
                    }
                });
            }
            return Ok(());
        }

        match result {
            Ok(handle) => {
                info!(peripheral = %handle.id(), "connected");
                self.status.report("Connected to BLE device");
                let mut session = PeripheralSession::new(handle, Arc::clone(&self.status));
                session.begin_discovery().await?;
                self.state = ControllerState::Connected(session);
                Ok(())
            }
            Err(e) => {
                warn!("connect failed: {e}");
                self.status.report(&format!("Connection failed: {e}"));
                self.enter_scanning().await
            }
        }
    }

    /// React to the link dropping.
    ///
    /// Valid from `Connected`, `Connecting`, or `Disconnecting`; never
    /// fatal. The session (and with it every GATT record) is destroyed and
    /// scanning resumes.
    pub async fn on_disconnect(&mut self, reason: Option<DisconnectReason>) -> Result<()> {
        match std::mem::replace(&mut self.state, ControllerState::Scanning) {
            ControllerState::Connected(mut session) => {
                info!(peripheral = %session.peripheral_id(), reason = ?reason, "disconnected");
                session.teardown();
            }
            ControllerState::Connecting { peripheral_id } => {
                info!(peripheral = %peripheral_id, reason = ?reason, "link dropped while connecting");
            }
            ControllerState::Disconnecting => {
                info!(reason = ?reason, "disconnect completed");
            }
            other => {
                debug!(state = other.name(), "ignoring disconnect event");
                self.state = other;
                return Ok(());
            }
        }

        match reason {
            Some(reason) => self.status.report(&format!("Disconnected: {reason}")),
            None => self.status.report("Disconnected"),
        }
        self.status.report("Searching");
        self.adapter.scan(None).await
    }

    /// Explicitly tear down the current connection.
    ///
    /// Invalidates the session records immediately and parks in
    /// `Disconnecting` until the backend confirms the link is down. A no-op
    /// outside of `Connected`.
    pub async fn disconnect(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, ControllerState::Disconnecting) {
            ControllerState::Connected(mut session) => {
                info!(peripheral = %session.peripheral_id(), "disconnect requested");
                self.status.report("Disconnecting");
                session.disconnect().await
            }
            other => {
                self.state = other;
                Ok(())
            }
        }
    }

    async fn enter_scanning(&mut self) -> Result<()> {
        self.state = ControllerState::Scanning;
        // No service filter: HM-10 clones are inconsistent about advertising
        // FFE0, so everything is scanned and matched by name in software
        self.adapter.scan(None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{AdapterRequest, MockAdapter, RecordingSink};

    fn controller() -> (CentralController, Arc<MockAdapter>, Arc<RecordingSink>) {
        let adapter = Arc::new(MockAdapter::new());
        let sink = Arc::new(RecordingSink::default());
        let controller = CentralController::new(
            adapter.clone(),
            sink.clone(),
            TargetDescriptor::new("HMSoft"),
        );
        (controller, adapter, sink)
    }

    #[tokio::test]
    async fn test_powered_on_starts_unfiltered_scan() {
        let (mut controller, adapter, sink) = controller();

        controller
            .on_adapter_state_changed(AdapterState::PoweredOn)
            .await
            .unwrap();

        assert_eq!(controller.state().name(), "scanning");
        assert!(sink.contains("Searching"));
        assert_eq!(
            adapter.requests(),
            vec![AdapterRequest::Scan {
                service_filter: None
            }]
        );
    }

    #[tokio::test]
    async fn test_powered_off_parks_in_unavailable() {
        let (mut controller, adapter, sink) = controller();
        controller
            .on_adapter_state_changed(AdapterState::PoweredOn)
            .await
            .unwrap();

        controller
            .on_adapter_state_changed(AdapterState::PoweredOff)
            .await
            .unwrap();

        assert_eq!(controller.state().name(), "unavailable");
        assert!(sink.contains("Bluetooth unavailable (powered off)"));
        assert_eq!(
            adapter.requests().last(),
            Some(&AdapterRequest::StopScan)
        );

        // No scan or connect while unavailable
        let before = adapter.requests().len();
        controller
            .on_advertisement(Advertisement::named("HMSoft", "peer-1"))
            .await
            .unwrap();
        assert_eq!(adapter.requests().len(), before);
    }

    #[tokio::test]
    async fn test_every_non_powered_state_is_unavailable() {
        for state in [
            AdapterState::Unknown,
            AdapterState::Unsupported,
            AdapterState::Unauthorized,
            AdapterState::PoweredOff,
        ] {
            let (mut controller, adapter, _sink) = controller();
            controller.on_adapter_state_changed(state).await.unwrap();
            assert_eq!(controller.state().name(), "unavailable");
            assert!(adapter.requests().is_empty());
        }
    }

    #[tokio::test]
    async fn test_powered_on_recurs_resumes_scanning() {
        let (mut controller, adapter, _sink) = controller();
        controller
            .on_adapter_state_changed(AdapterState::PoweredOff)
            .await
            .unwrap();
        controller
            .on_adapter_state_changed(AdapterState::PoweredOn)
            .await
            .unwrap();

        assert_eq!(controller.state().name(), "scanning");
        assert_eq!(adapter.scan_count(), 1);
    }

    #[tokio::test]
    async fn test_named_non_matching_advertisement_reported_but_not_connected() {
        let (mut controller, adapter, sink) = controller();
        controller
            .on_adapter_state_changed(AdapterState::PoweredOn)
            .await
            .unwrap();

        controller
            .on_advertisement(Advertisement::named("SomeOtherDevice", "peer-9"))
            .await
            .unwrap();

        assert_eq!(controller.state().name(), "scanning");
        // Permissive status on any named advertisement
        assert!(sink.contains("Found BLE DEVICE"));
        assert_eq!(adapter.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_nameless_advertisement_reports_nothing() {
        let (mut controller, _adapter, sink) = controller();
        controller
            .on_adapter_state_changed(AdapterState::PoweredOn)
            .await
            .unwrap();

        controller
            .on_advertisement(Advertisement::unnamed("peer-9"))
            .await
            .unwrap();

        assert!(!sink.contains("Found BLE DEVICE"));
    }

    #[tokio::test]
    async fn test_matching_advertisement_stops_scan_and_connects() {
        let (mut controller, adapter, _sink) = controller();
        controller
            .on_adapter_state_changed(AdapterState::PoweredOn)
            .await
            .unwrap();

        controller
            .on_advertisement(Advertisement::named("HMSoft", "peer-1"))
            .await
            .unwrap();

        assert_eq!(controller.state().name(), "connecting");
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
    }

    #[tokio::test]
    async fn test_duplicate_matches_yield_one_connect() {
        let (mut controller, adapter, _sink) = controller();
        controller
            .on_adapter_state_changed(AdapterState::PoweredOn)
            .await
            .unwrap();

        // Duplicate delivery of the same matching advertisement
        controller
            .on_advertisement(Advertisement::named("HMSoft", "peer-1"))
            .await
            .unwrap();
        controller
            .on_advertisement(Advertisement::named("HMSoft", "peer-1"))
            .await
            .unwrap();

        assert_eq!(adapter.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_resumes_scanning_once() {
        let (mut controller, adapter, sink) = controller();
        controller
            .on_adapter_state_changed(AdapterState::PoweredOn)
            .await
            .unwrap();
        controller
            .on_advertisement(Advertisement::named("HMSoft", "peer-1"))
            .await
            .unwrap();

        controller
            .on_connect_result(Err(ConnectError::Timeout))
            .await
            .unwrap();

        assert_eq!(controller.state().name(), "scanning");
        assert!(sink.contains("Connection failed"));
        // Initial scan plus exactly one re-issued scan
        assert_eq!(adapter.scan_count(), 2);
    }

    #[tokio::test]
    async fn test_stale_connect_result_is_ignored() {
        let (mut controller, adapter, _sink) = controller();
        controller
            .on_adapter_state_changed(AdapterState::PoweredOn)
            .await
            .unwrap();

        // Still scanning; no connect was requested
        controller
            .on_connect_result(Err(ConnectError::Rejected))
            .await
            .unwrap();

        assert_eq!(controller.state().name(), "scanning");
        assert_eq!(adapter.scan_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_successful_connect_drops_the_link() {
        use crate::mock::{MockPeripheral, gatt_request_names};

        let (mut controller, adapter, _sink) = controller();
        controller
            .on_adapter_state_changed(AdapterState::PoweredOn)
            .await
            .unwrap();

        // The link came up after the controller had already moved on
        let peripheral = MockPeripheral::new("peer-1");
        let log = peripheral.request_log();
        controller
            .on_connect_result(Ok(PeripheralHandle::new(Box::new(peripheral))))
            .await
            .unwrap();

        // The disconnect is issued from a spawned task
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(controller.state().name(), "scanning");
        assert_eq!(adapter.connect_count(), 0);
        assert_eq!(gatt_request_names(&log), vec!["disconnect"]);
    }

    #[tokio::test]
    async fn test_disconnect_while_idle_is_ignored() {
        let (mut controller, adapter, _sink) = controller();

        controller.on_disconnect(None).await.unwrap();

        assert_eq!(controller.state().name(), "idle");
        assert!(adapter.requests().is_empty());
    }
}

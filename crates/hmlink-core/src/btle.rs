//! btleplug-backed implementations of the collaborator traits.
//!
//! [`SystemAdapter`] wraps the first platform adapter and translates the
//! btleplug [`CentralEvent`] stream into core [`Event`]s; [`SystemPeripheral`]
//! wraps one connected [`Peripheral`]. Completions for connect, discovery,
//! and read requests are produced by spawned tasks so the request methods
//! return immediately, matching the callback model the state machine expects.

use std::collections::HashMap;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter as PlatformAdapter, Manager, Peripheral, PeripheralId as PlatformPeripheralId};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use hmlink_types::{AdapterState, Advertisement, PeripheralId};

use crate::error::{ConnectError, DiscoveryError, Error, ReadError, Result};
use crate::events::{Event, EventSender};
use crate::traits::{Adapter, GattPeripheral, PeripheralHandle};

/// The real Bluetooth adapter, backed by btleplug.
pub struct SystemAdapter {
    adapter: PlatformAdapter,
    events: EventSender,
}

impl std::fmt::Debug for SystemAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemAdapter").finish_non_exhaustive()
    }
}

impl SystemAdapter {
    /// Wrap the first available platform adapter.
    pub async fn new(events: EventSender) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(Error::NoAdapter)?;
        Ok(Self { adapter, events })
    }

    /// Spawn the task that feeds hardware events into the queue.
    ///
    /// Translates `StateUpdate`, `DeviceDiscovered`/`DeviceUpdated`, and
    /// `DeviceDisconnected`; the remaining btleplug events carry data the
    /// state machine reads from peripheral properties instead. Runs until
    /// the token is cancelled or the stream ends.
    pub fn spawn_event_pump(&self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let adapter = self.adapter.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let mut stream = match adapter.events().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("failed to subscribe to adapter events: {e}");
                    return;
                }
            };

            // Some platforms only report state changes, not the state the
            // adapter is already in when we subscribe
            if let Ok(state) = adapter.adapter_state().await {
                let _ = events.send(Event::AdapterStateChanged(map_central_state(state)));
            }

            info!("adapter event pump running");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("adapter event pump cancelled");
                        break;
                    }
                    event = stream.next() => {
                        let Some(event) = event else {
                            info!("adapter event stream ended");
                            break;
                        };
                        if let Some(event) = translate_event(&adapter, event).await {
                            if events.send(event).is_err() {
                                debug!("event queue closed, stopping pump");
                                break;
                            }
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl Adapter for SystemAdapter {
    async fn scan(&self, service_filter: Option<&[Uuid]>) -> Result<()> {
        let filter = match service_filter {
            Some(services) => ScanFilter {
                services: services.to_vec(),
            },
            None => ScanFilter::default(),
        };
        debug!("starting scan");
        self.adapter.start_scan(filter).await?;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        debug!("stopping scan");
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn connect(&self, id: &PeripheralId) -> Result<()> {
        let peripheral = find_peripheral(&self.adapter, id)
            .await?
            .ok_or_else(|| Error::PeripheralNotFound(id.clone()))?;

        let our_id = id.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = match peripheral.connect().await {
                Ok(()) => {
                    let gatt = SystemPeripheral::new(our_id, peripheral, events.clone());
                    Ok(PeripheralHandle::new(Box::new(gatt)))
                }
                Err(e) => Err(ConnectError::Ble(e.to_string())),
            };
            let _ = events.send(Event::ConnectResult(result));
        });
        Ok(())
    }
}

/// One connected peripheral, backed by btleplug.
pub struct SystemPeripheral {
    id: PeripheralId,
    peripheral: Peripheral,
    events: EventSender,
}

impl std::fmt::Debug for SystemPeripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemPeripheral")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl SystemPeripheral {
    fn new(id: PeripheralId, peripheral: Peripheral, events: EventSender) -> Self {
        Self {
            id,
            peripheral,
            events,
        }
    }
}

#[async_trait]
impl GattPeripheral for SystemPeripheral {
    fn id(&self) -> &PeripheralId {
        &self.id
    }

    async fn discover_services(&self, filter: Option<&[Uuid]>) -> Result<()> {
        let peripheral = self.peripheral.clone();
        let events = self.events.clone();
        let filter = filter.map(<[Uuid]>::to_vec);

        tokio::spawn(async move {
            // btleplug discovers the whole attribute tree at once; the
            // characteristic step below answers from the cached tree
            let result = match peripheral.discover_services().await {
                Ok(()) => {
                    let mut services: Vec<Uuid> =
                        peripheral.services().iter().map(|s| s.uuid).collect();
                    if let Some(filter) = filter {
                        services.retain(|uuid| filter.contains(uuid));
                    }
                    Ok(services)
                }
                Err(e) => Err(DiscoveryError::Ble(e.to_string())),
            };
            let _ = events.send(Event::ServicesDiscovered(result));
        });
        Ok(())
    }

    async fn discover_characteristics(
        &self,
        service: Uuid,
        filter: Option<&[Uuid]>,
    ) -> Result<()> {
        let result = self
            .peripheral
            .services()
            .iter()
            .find(|s| s.uuid == service)
            .map(|s| {
                let mut characteristics: Vec<Uuid> =
                    s.characteristics.iter().map(|c| c.uuid).collect();
                if let Some(filter) = filter {
                    characteristics.retain(|uuid| filter.contains(uuid));
                }
                characteristics
            })
            .ok_or(DiscoveryError::ServiceNotFound(service));

        let _ = self
            .events
            .send(Event::CharacteristicsDiscovered { service, result });
        Ok(())
    }

    async fn read_value(&self, characteristic: Uuid) -> Result<()> {
        let Some(target) = self
            .peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic)
        else {
            let _ = self.events.send(Event::ValueUpdated {
                characteristic,
                result: Err(ReadError::CharacteristicNotFound(characteristic)),
            });
            return Ok(());
        };

        let peripheral = self.peripheral.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = peripheral
                .read(&target)
                .await
                .map_err(|e| ReadError::Ble(e.to_string()));
            let _ = events.send(Event::ValueUpdated {
                characteristic,
                result,
            });
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

/// Translate one btleplug central event into a core event, if it maps.
async fn translate_event(adapter: &PlatformAdapter, event: CentralEvent) -> Option<Event> {
    match event {
        CentralEvent::StateUpdate(state) => {
            Some(Event::AdapterStateChanged(map_central_state(state)))
        }
        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
            match advertisement_for(adapter, &id).await {
                Ok(Some(adv)) => Some(Event::AdvertisementReceived(adv)),
                Ok(None) => None,
                Err(e) => {
                    debug!("failed to read peripheral properties: {e}");
                    None
                }
            }
        }
        CentralEvent::DeviceDisconnected(_) => Some(Event::Disconnected(None)),
        _ => None,
    }
}

/// Build an [`Advertisement`] from the properties of a discovered peripheral.
async fn advertisement_for(
    adapter: &PlatformAdapter,
    id: &PlatformPeripheralId,
) -> Result<Option<Advertisement>> {
    let peripheral = adapter.peripheral(id).await?;
    let Some(props) = peripheral.properties().await? else {
        return Ok(None);
    };

    Ok(Some(Advertisement {
        local_name: props.local_name,
        peripheral_id: PeripheralId::new(format_platform_id(id)),
        rssi: props.rssi,
        raw_manufacturer_data: first_manufacturer_blob(&props.manufacturer_data),
    }))
}

/// Search the adapter's known peripherals for one matching our identifier.
async fn find_peripheral(
    adapter: &PlatformAdapter,
    id: &PeripheralId,
) -> Result<Option<Peripheral>> {
    for peripheral in adapter.peripherals().await? {
        if format_platform_id(&peripheral.id()) == id.as_str() {
            return Ok(Some(peripheral));
        }
    }
    Ok(None)
}

fn map_central_state(state: CentralState) -> AdapterState {
    match state {
        CentralState::PoweredOn => AdapterState::PoweredOn,
        CentralState::PoweredOff => AdapterState::PoweredOff,
        _ => AdapterState::Unknown,
    }
}

/// Platform peripheral IDs have no Display impl; strip the Debug wrapper.
fn format_platform_id(id: &PlatformPeripheralId) -> String {
    format!("{id:?}")
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Pick the advertisement's manufacturer payload, lowest company ID first
/// so repeated advertisements yield a stable value.
fn first_manufacturer_blob(data: &HashMap<u16, Vec<u8>>) -> Option<Vec<u8>> {
    data.iter().min_by_key(|(id, _)| **id).map(|(_, v)| v.clone())
}

//! [`RadioAdapter`] implementation over the `bluest` cross-platform BLE
//! backend.
//!
//! Discovery and notification streams are consumed by spawned tasks and
//! forwarded over the adapter's event channels; teardown goes through
//! cancellation tokens. Devices seen during discovery are kept in an
//! id-keyed map so a later connect can resolve the address.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bluest::{Adapter, Characteristic, Device, Service};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use regex::Regex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::BleError;
use crate::radio::{GattStatus, LinkState, RadioAdapter, RadioEvent};
use crate::types::DiscoveredDevice;

pub struct BluestRadio {
    adapter: Adapter,
    /// Devices seen by the most recent discovery, keyed by the address handed
    /// out in [`DiscoveredDevice`]. Connect resolves targets here.
    devices: Arc<Mutex<HashMap<String, Device>>>,
    scan_cancel: Mutex<Option<CancellationToken>>,
}

impl BluestRadio {
    /// Acquires the default system adapter and waits for it to become
    /// available.
    pub async fn new() -> Result<Self, BleError> {
        let adapter = Adapter::default().await.ok_or(BleError::RadioUnavailable)?;
        adapter
            .wait_available()
            .await
            .map_err(|err| BleError::Backend(err.into()))?;
        info!("bluetooth adapter is available");
        Ok(Self {
            adapter,
            devices: Arc::new(Mutex::new(HashMap::new())),
            scan_cancel: Mutex::new(None),
        })
    }
}

/// Connection resource for one session: the platform device plus the event
/// channel and service cache shared with the adapter's pump tasks.
#[derive(Clone)]
pub struct BluestHandle {
    device: Device,
    shared: Arc<HandleShared>,
}

struct HandleShared {
    events: mpsc::UnboundedSender<RadioEvent>,
    services: Mutex<Vec<Service>>,
    notify_cancel: CancellationToken,
}

/// Platform device ids embed the MAC on most platforms; surface it as the
/// address when present, the opaque id otherwise (macOS hides the MAC).
fn extract_mac_address(device_id: &str) -> Option<String> {
    let re = Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").unwrap();
    re.find_iter(device_id).last().map(|m| m.as_str().to_uppercase())
}

#[async_trait]
impl RadioAdapter for BluestRadio {
    type Handle = BluestHandle;
    type Service = Service;
    type Characteristic = Characteristic;

    async fn is_enabled(&self) -> bool {
        self.adapter.connected_devices().await.is_ok()
    }

    async fn start_discovery(
        &self,
        found: mpsc::UnboundedSender<DiscoveredDevice>,
    ) -> Result<(), BleError> {
        self.stop_discovery().await;

        let cancel = CancellationToken::new();
        *self.scan_cancel.lock().unwrap() = Some(cancel.clone());
        self.devices.lock().unwrap().clear();

        let adapter = self.adapter.clone();
        let devices = self.devices.clone();
        tokio::spawn(async move {
            // The scan stream borrows the adapter, so both live in this task.
            let mut stream = match adapter.scan(&[]).await {
                Ok(stream) => stream,
                Err(err) => {
                    error!("failed to start bluetooth discovery: {}", err);
                    return;
                }
            };
            info!("bluetooth discovery started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sighting = stream.next() => match sighting {
                        Some(adv) => {
                            let device = adv.device;
                            let id = device.id().to_string();
                            let address = extract_mac_address(&id).unwrap_or(id);
                            let discovered = DiscoveredDevice {
                                address: address.clone(),
                                name: device.name().ok(),
                                rssi: adv.rssi,
                            };
                            debug!("sighting: {} rssi {:?}", discovered.address, discovered.rssi);
                            devices.lock().unwrap().insert(address, device);
                            if found.send(discovered).is_err() {
                                break;
                            }
                        }
                        None => {
                            info!("bluetooth scan stream ended");
                            break;
                        }
                    },
                }
            }
            info!("bluetooth discovery stopped");
        });

        Ok(())
    }

    async fn stop_discovery(&self) {
        if let Some(cancel) = self.scan_cancel.lock().unwrap().take() {
            cancel.cancel();
        }
    }

    async fn open_connection(
        &self,
        address: &str,
        _auto_connect: bool,
        events: mpsc::UnboundedSender<RadioEvent>,
    ) -> Result<Self::Handle, BleError> {
        let device = self
            .devices
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .ok_or_else(|| BleError::DeviceNotFound(address.to_string()))?;

        let handle = BluestHandle {
            device: device.clone(),
            shared: Arc::new(HandleShared {
                events: events.clone(),
                services: Mutex::new(Vec::new()),
                notify_cancel: CancellationToken::new(),
            }),
        };

        // The connect completes asynchronously; its outcome arrives as a link
        // state event.
        let adapter = self.adapter.clone();
        tokio::spawn(async move {
            match adapter.connect_device(&device).await {
                Ok(()) => {
                    info!("connected to {}", device.id());
                    let _ = events.send(RadioEvent::ConnectionStateChanged(LinkState::Connected));
                }
                Err(err) => {
                    warn!("connection to {} failed: {}", device.id(), err);
                    let _ =
                        events.send(RadioEvent::ConnectionStateChanged(LinkState::Disconnected));
                }
            }
        });

        Ok(handle)
    }

    async fn close_connection(&self, handle: &Self::Handle) {
        handle.shared.notify_cancel.cancel();
        if let Err(err) = self.adapter.disconnect_device(&handle.device).await {
            warn!("disconnect from {} failed: {}", handle.device.id(), err);
        }
    }

    async fn discover_services(&self, handle: &Self::Handle) {
        let handle = handle.clone();
        tokio::spawn(async move {
            let status = match handle.device.services().await {
                Ok(services) => {
                    debug!("discovered {} services", services.len());
                    *handle.shared.services.lock().unwrap() = services;
                    GattStatus::Success
                }
                Err(err) => GattStatus::Failure(err.to_string()),
            };
            let _ = handle.shared.events.send(RadioEvent::ServicesDiscovered { status });
        });
    }

    async fn get_service(&self, handle: &Self::Handle, uuid: Uuid) -> Option<Self::Service> {
        handle
            .shared
            .services
            .lock()
            .unwrap()
            .iter()
            .find(|service| service.uuid() == uuid)
            .cloned()
    }

    async fn get_characteristic(
        &self,
        service: &Self::Service,
        uuid: Uuid,
    ) -> Option<Self::Characteristic> {
        match service.characteristics().await {
            Ok(characteristics) => {
                characteristics.into_iter().find(|characteristic| characteristic.uuid() == uuid)
            }
            Err(err) => {
                warn!("failed to enumerate characteristics: {}", err);
                None
            }
        }
    }

    async fn enable_notification(
        &self,
        handle: &Self::Handle,
        characteristic: &Self::Characteristic,
        enable: bool,
    ) -> bool {
        if !enable {
            handle.shared.notify_cancel.cancel();
            return true;
        }

        let characteristic = characteristic.clone();
        let events = handle.shared.events.clone();
        let cancel = handle.shared.notify_cancel.clone();
        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(async move {
            // The notify stream borrows the characteristic, so both live in
            // this task; readiness is reported back once the subscription is
            // up.
            let mut stream = match characteristic.notify().await {
                Ok(stream) => {
                    let _ = ready_tx.send(true);
                    stream
                }
                Err(err) => {
                    error!("failed to subscribe to notifications: {}", err);
                    let _ = ready_tx.send(false);
                    return;
                }
            };
            info!("listening for notifications");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    item = stream.next() => match item {
                        Some(Ok(value)) => {
                            debug!("notification payload: {:?}", value);
                            if events.send(RadioEvent::CharacteristicChanged { value }).is_err() {
                                return;
                            }
                        }
                        Some(Err(err)) => {
                            error!("error in notification stream: {}", err);
                            break;
                        }
                        None => break,
                    },
                }
            }
            // Stream ended without an explicit unsubscribe: the link is gone.
            info!("notification stream ended");
            let _ = events.send(RadioEvent::ConnectionStateChanged(LinkState::Disconnected));
        });

        ready_rx.await.unwrap_or(false)
    }

    async fn write_descriptor(
        &self,
        _handle: &Self::Handle,
        _characteristic: &Self::Characteristic,
        descriptor: Uuid,
        _value: &[u8],
    ) -> Result<(), BleError> {
        // bluest writes the client characteristic configuration itself when a
        // notify subscription starts; there is nothing further to write on
        // this backend.
        debug!("descriptor {} is managed by the platform backend", descriptor);
        Ok(())
    }
}

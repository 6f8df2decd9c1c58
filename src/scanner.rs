//! Scan lifecycle: start/stop, the one-shot timeout and the discovered
//! device collection.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use indexmap::IndexMap;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatcher::EventDispatcher;
use crate::error::BleError;
use crate::radio::RadioAdapter;
use crate::types::{DiscoveredDevice, StatusEvent};

/// Owns scan start/stop and the scan-timeout timer.
///
/// A scan runs until stopped or until the fixed deadline elapses, whichever
/// comes first; `ScanStopped` is emitted exactly once per started scan even
/// when an external stop races the timeout.
pub struct ScanController<R: RadioAdapter> {
    inner: Arc<ScanInner<R>>,
}

impl<R: RadioAdapter> Clone for ScanController<R> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

struct ScanInner<R: RadioAdapter> {
    radio: Arc<R>,
    dispatcher: EventDispatcher,
    scan_timeout: Duration,
    state: Mutex<ScanState>,
    devices: Mutex<IndexMap<String, DiscoveredDevice>>,
}

#[derive(Default)]
struct ScanState {
    scanning: bool,
    generation: u64,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<R: RadioAdapter> ScanController<R> {
    pub fn new(radio: Arc<R>, dispatcher: EventDispatcher, scan_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ScanInner {
                radio,
                dispatcher,
                scan_timeout,
                state: Mutex::new(ScanState::default()),
                devices: Mutex::new(IndexMap::new()),
            }),
        }
    }

    /// Starts a scan session.
    ///
    /// Re-validates the radio (callers may have checked already, the call
    /// checks again), supersedes any scan still running, clears the previous
    /// device collection and schedules the auto-stop deadline.
    pub async fn start_scan(&self) -> Result<(), BleError> {
        if !self.inner.radio.is_enabled().await {
            return Err(BleError::RadioUnavailable);
        }

        // A new scan supersedes the previous one.
        self.stop_scan().await;

        self.inner.devices.lock().unwrap().clear();

        let (found_tx, found_rx) = mpsc::unbounded_channel();
        self.inner.radio.start_discovery(found_tx).await?;

        let (generation, cancel) = {
            let mut state = self.inner.state.lock().unwrap();
            state.generation += 1;
            state.scanning = true;
            state.cancel = CancellationToken::new();
            (state.generation, state.cancel.clone())
        };

        let task = tokio::spawn(Self::scan_task(self.inner.clone(), generation, found_rx, cancel));
        self.inner.state.lock().unwrap().task = Some(task);

        info!(
            "scan {} started, auto-stop in {:?}",
            generation, self.inner.scan_timeout
        );
        self.inner.dispatcher.emit(StatusEvent::ScanStarted);
        Ok(())
    }

    /// Stops the running scan. Idempotent: a no-op when no scan is active.
    pub async fn stop_scan(&self) {
        let task = {
            let mut state = self.inner.state.lock().unwrap();
            if !state.scanning {
                return;
            }
            state.scanning = false;
            state.cancel.cancel();
            state.task.take()
        };

        self.inner.radio.stop_discovery().await;
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!("scan task ended abnormally: {}", err);
            }
        }
        self.inner.dispatcher.emit(StatusEvent::ScanStopped);
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.state.lock().unwrap().scanning
    }

    /// Snapshot of the current scan session's device list, in discovery order.
    pub fn devices(&self) -> Vec<DiscoveredDevice> {
        self.inner.devices.lock().unwrap().values().cloned().collect()
    }

    async fn scan_task(
        inner: Arc<ScanInner<R>>,
        generation: u64,
        mut found: mpsc::UnboundedReceiver<DiscoveredDevice>,
        cancel: CancellationToken,
    ) {
        // Hard deadline: created once, never refreshed by activity.
        let deadline = tokio::time::sleep(inner.scan_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = &mut deadline => {
                    Self::halt_from_timeout(&inner, generation).await;
                    break;
                }
                sighting = found.recv() => match sighting {
                    Some(device) => inner.record_device(device),
                    None => {
                        // Discovery source ended early; the deadline still
                        // bounds the session.
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            _ = &mut deadline => Self::halt_from_timeout(&inner, generation).await,
                        }
                        break;
                    }
                },
            }
        }
        debug!("scan task {} exited", generation);
    }

    /// Self-triggered stop from the deadline. Loses quietly to an external
    /// stop that got there first.
    async fn halt_from_timeout(inner: &Arc<ScanInner<R>>, generation: u64) {
        {
            let mut state = inner.state.lock().unwrap();
            if !state.scanning || state.generation != generation {
                return;
            }
            state.scanning = false;
            state.cancel.cancel();
        }
        info!("scan {} timed out", generation);
        inner.radio.stop_discovery().await;
        inner.dispatcher.emit(StatusEvent::ScanStopped);
    }
}

impl<R: RadioAdapter> ScanInner<R> {
    fn record_device(&self, device: DiscoveredDevice) {
        let mut devices = self.devices.lock().unwrap();
        if let Some(existing) = devices.get_mut(&device.address) {
            // Repeat sighting: refresh signal strength, keep list position.
            existing.rssi = device.rssi;
            return;
        }
        debug!(
            "discovered {} ({:?}, rssi {:?})",
            device.address, device.name, device.rssi
        );
        devices.insert(device.address.clone(), device.clone());
        drop(devices);
        self.dispatcher.emit(StatusEvent::DeviceDiscovered(device));
    }
}

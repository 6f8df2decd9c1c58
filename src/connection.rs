//! The per-connection lifecycle state machine.
//!
//! One session at a time: Idle → Connecting → Connected → DiscoveringServices
//! → Subscribed, with Failed and Disconnected reachable from any non-terminal
//! state. Radio callbacks and caller commands serialize on the session mutex;
//! callbacks for a superseded session are identified by session id and
//! dropped.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{Mutex, mpsc};

use crate::config::SessionConfig;
use crate::constants::ENABLE_NOTIFICATION_VALUE;
use crate::dispatcher::EventDispatcher;
use crate::error::BleError;
use crate::radio::{GattStatus, LinkState, RadioAdapter, RadioEvent};
use crate::scanner::ScanController;
use crate::types::{ConnectionState, StatusEvent};

pub struct ConnectionManager<R: RadioAdapter> {
    inner: Arc<ConnInner<R>>,
}

impl<R: RadioAdapter> Clone for ConnectionManager<R> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

struct ConnInner<R: RadioAdapter> {
    radio: Arc<R>,
    dispatcher: EventDispatcher,
    scanner: ScanController<R>,
    config: SessionConfig,
    session: Mutex<SessionSlot<R>>,
}

struct SessionSlot<R: RadioAdapter> {
    next_id: u64,
    current: Option<ConnectionSession<R>>,
}

/// The single live or pending connection. The radio handle is owned
/// exclusively by the session and released exactly once, on the transition to
/// `Disconnected`.
struct ConnectionSession<R: RadioAdapter> {
    id: u64,
    address: String,
    state: ConnectionState,
    handle: Option<R::Handle>,
}

impl<R: RadioAdapter> ConnectionManager<R> {
    pub fn new(
        radio: Arc<R>,
        dispatcher: EventDispatcher,
        scanner: ScanController<R>,
        config: SessionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ConnInner {
                radio,
                dispatcher,
                scanner,
                config,
                session: Mutex::new(SessionSlot { next_id: 0, current: None }),
            }),
        }
    }

    /// Opens a connection to `address`.
    ///
    /// Any prior session is torn down first (its radio resource closed), and
    /// any in-progress scan is stopped, since connecting and scanning are
    /// mutually exclusive radio operations. Fails with
    /// [`BleError::AlreadyConnecting`] only when a reentrant call races the
    /// same in-flight attempt; otherwise the new connect supersedes.
    pub async fn connect(&self, address: &str) -> Result<(), BleError> {
        let mut slot = self.inner.session.lock().await;

        if let Some(current) = &slot.current {
            if current.address == address && current.state == ConnectionState::Connecting {
                return Err(BleError::AlreadyConnecting(address.to_string()));
            }
        }

        // Tear down before connect: the old resource is released before the
        // new one is opened.
        if let Some(mut old) = slot.current.take() {
            self.inner.teardown_session(&mut old).await;
        }

        self.inner.scanner.stop_scan().await;

        slot.next_id += 1;
        let id = slot.next_id;
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        // Connections are user-initiated, never radio-triggered: auto_connect
        // stays false.
        let handle = self.inner.radio.open_connection(address, false, events_tx).await?;

        slot.current = Some(ConnectionSession {
            id,
            address: address.to_string(),
            state: ConnectionState::Connecting,
            handle: Some(handle),
        });
        info!("connecting to {} (session {})", address, id);
        self.inner.dispatcher.emit(StatusEvent::Connecting);
        drop(slot);

        // Radio-event actor for this session: drains callbacks serially and
        // feeds them to the state machine.
        let inner = self.inner.clone();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                inner.handle_radio_event(id, event).await;
            }
            debug!("radio event pump for session {} ended", id);
        });

        Ok(())
    }

    /// Tears down the current session. Idempotent: a no-op when no radio
    /// resource is held. Always safe to call, including mid-`Connecting`.
    pub async fn disconnect(&self) {
        self.inner.scanner.stop_scan().await;

        let mut slot = self.inner.session.lock().await;
        let Some(session) = slot.current.as_mut() else {
            return;
        };
        if session.handle.is_none() {
            return;
        }
        self.inner.teardown_session(session).await;
    }

    /// True only while radio-level connected: `Connected`,
    /// `DiscoveringServices` or `Subscribed`.
    pub async fn is_connected(&self) -> bool {
        matches!(
            self.connection_state().await,
            ConnectionState::Connected
                | ConnectionState::DiscoveringServices
                | ConnectionState::Subscribed
        )
    }

    /// Current session state, `Idle` when no session has been opened yet.
    pub async fn connection_state(&self) -> ConnectionState {
        let slot = self.inner.session.lock().await;
        slot.current.as_ref().map(|s| s.state).unwrap_or(ConnectionState::Idle)
    }

    /// Whether a live (non-terminal) session exists.
    pub async fn has_session(&self) -> bool {
        let slot = self.inner.session.lock().await;
        slot.current
            .as_ref()
            .is_some_and(|s| s.state != ConnectionState::Disconnected)
    }
}

impl<R: RadioAdapter> ConnInner<R> {
    async fn handle_radio_event(&self, session_id: u64, event: RadioEvent) {
        let mut slot = self.session.lock().await;
        let Some(session) = slot.current.as_mut() else {
            debug!("dropping radio event for session {}: no session", session_id);
            return;
        };
        if session.id != session_id || session.state == ConnectionState::Disconnected {
            debug!("dropping stale radio event for session {}", session_id);
            return;
        }

        match event {
            RadioEvent::ConnectionStateChanged(LinkState::Connected) => {
                info!("session {} link up, discovering services", session.id);
                session.state = ConnectionState::Connected;
                if let Some(handle) = session.handle.clone() {
                    self.radio.discover_services(&handle).await;
                }
                session.state = ConnectionState::DiscoveringServices;
                self.dispatcher.emit(StatusEvent::Connected);
            }
            RadioEvent::ConnectionStateChanged(LinkState::Disconnected) => {
                // The radio can force this from any state at any time,
                // including mid-discovery.
                info!("session {} link lost", session.id);
                self.teardown_session(session).await;
            }
            RadioEvent::ServicesDiscovered { status } => {
                self.on_services_discovered(session, status).await;
            }
            RadioEvent::CharacteristicChanged { value } => {
                if session.state != ConnectionState::Subscribed {
                    debug!("notification before subscription complete, ignoring");
                    return;
                }
                self.dispatcher
                    .emit(StatusEvent::NotificationReceived(format_payload(&value)));
            }
        }
    }

    /// Resolves the configured service and characteristic, then enables
    /// notification delivery. The descriptor write is only attempted once
    /// both resolutions succeeded, on the session's live handle.
    async fn on_services_discovered(&self, session: &mut ConnectionSession<R>, status: GattStatus) {
        if let GattStatus::Failure(status) = status {
            self.fail(session, format!("service discovery failed: {status}"));
            return;
        }
        let Some(handle) = session.handle.clone() else {
            return;
        };

        let Some(service) = self.radio.get_service(&handle, self.config.service_uuid).await else {
            self.fail(session, "service not found".to_string());
            return;
        };
        let Some(characteristic) = self
            .radio
            .get_characteristic(&service, self.config.characteristic_uuid)
            .await
        else {
            self.fail(session, "characteristic not found".to_string());
            return;
        };

        let registered = self.radio.enable_notification(&handle, &characteristic, true).await;
        if let Err(err) = self
            .radio
            .write_descriptor(
                &handle,
                &characteristic,
                self.config.config_descriptor_uuid,
                &ENABLE_NOTIFICATION_VALUE,
            )
            .await
        {
            self.fail(session, format!("descriptor write failed: {err}"));
            return;
        }

        if registered {
            info!("session {} subscribed to {}", session.id, self.config.characteristic_uuid);
            session.state = ConnectionState::Subscribed;
            self.dispatcher
                .emit(StatusEvent::OperationSucceeded("notifications enabled".to_string()));
        } else {
            self.fail(session, "notification registration failed".to_string());
        }
    }

    /// Releases the radio resource and marks the session terminal, emitting
    /// `Disconnected` at most once per session.
    async fn teardown_session(&self, session: &mut ConnectionSession<R>) {
        if let Some(handle) = session.handle.take() {
            self.radio.close_connection(&handle).await;
        }
        if session.state != ConnectionState::Disconnected {
            session.state = ConnectionState::Disconnected;
            info!("session {} ({}) disconnected", session.id, session.address);
            self.dispatcher.emit(StatusEvent::Disconnected);
        }
    }

    /// Non-fatal subscription failure: the session keeps its radio resource,
    /// releasing it is the caller's explicit decision via `disconnect`.
    fn fail(&self, session: &mut ConnectionSession<R>, message: String) {
        warn!("session {} failed: {}", session.id, message);
        session.state = ConnectionState::Failed;
        self.dispatcher.emit(StatusEvent::OperationFailed(message));
    }
}

/// Hex-encodes a notification payload byte-by-byte, space separated. Empty
/// payloads become a sentinel message so the listener never sees an
/// ambiguous empty string.
fn format_payload(value: &[u8]) -> String {
    if value.is_empty() {
        return "empty notification".to_string();
    }
    value
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

//! Event delivery to the caller.
//!
//! One listener at a time, registered explicitly and replaced by the next
//! registration. Delivery is synchronous and best-effort: with no listener
//! registered an event is dropped, never queued.

use std::sync::{Arc, Mutex};

use log::debug;

use crate::types::StatusEvent;

/// Receives every status event the manager produces.
pub trait StatusListener: Send + Sync {
    fn on_status_event(&self, event: StatusEvent);
}

impl<F> StatusListener for F
where
    F: Fn(StatusEvent) + Send + Sync,
{
    fn on_status_event(&self, event: StatusEvent) {
        self(event)
    }
}

/// Funnels internal status events to the registered listener.
///
/// The dispatcher holds the only reference shared between the scan controller
/// and the connection state machine, so events from both arrive at the
/// listener in production order. Callers must `unregister` at teardown; the
/// dispatcher never drops a listener on its own.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    listener: Arc<Mutex<Option<Arc<dyn StatusListener>>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener`, replacing any previously registered one.
    pub fn register(&self, listener: Arc<dyn StatusListener>) {
        *self.listener.lock().unwrap() = Some(listener);
    }

    /// Removes the current listener. Subsequent events are dropped.
    pub fn unregister(&self) {
        *self.listener.lock().unwrap() = None;
    }

    /// Delivers `event` synchronously to the registered listener, or drops it
    /// if none is registered.
    pub fn emit(&self, event: StatusEvent) {
        let listener = self.listener.lock().unwrap().clone();
        match listener {
            Some(listener) => listener.on_status_event(event),
            None => debug!("no listener registered, dropping event: {:?}", event),
        }
    }
}

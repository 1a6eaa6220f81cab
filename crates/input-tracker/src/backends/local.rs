//! In-process listener for events the host application already receives.

use std::sync::{Arc, Mutex, MutexGuard};

use presenter_common::error::PresenterResult;
use presenter_recording_model::event::InputKind;

use crate::{EventHandler, InputListener};

/// Forwarding point for the host application's own input events.
///
/// The host keeps one port for its lifetime and routes every key/pointer
/// event through [`LocalEventPort::forward`]. While a session is logging, the
/// event is recorded; either way it is returned unchanged so normal
/// processing continues.
#[derive(Clone, Default)]
pub struct LocalEventPort {
    slot: Arc<Mutex<Option<EventHandler>>>,
}

impl LocalEventPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `event` if a logger is attached, then hand it back.
    pub fn forward(&self, event: InputKind) -> InputKind {
        if let Some(handler) = self.lock().as_ref() {
            handler.handle(event.clone());
        }
        event
    }

    /// A listener that attaches this port to a logger.
    pub fn listener(&self) -> LocalListener {
        LocalListener { port: self.clone() }
    }

    /// Whether a logger is currently attached.
    pub fn is_attached(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<EventHandler>> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Listener half of a [`LocalEventPort`].
pub struct LocalListener {
    port: LocalEventPort,
}

impl InputListener for LocalListener {
    fn name(&self) -> &str {
        "local"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn register(&mut self, handler: EventHandler) -> PresenterResult<()> {
        *self.port.lock() = Some(handler);
        Ok(())
    }

    fn deregister(&mut self) {
        self.port.lock().take();
    }
}

//! Scripted listener for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use presenter_common::error::{PresenterError, PresenterResult};
use presenter_recording_model::event::InputKind;

use crate::{EventHandler, InputListener};

/// Delivers a fixed list of events as soon as it is registered.
pub struct StubListener {
    events: Vec<InputKind>,
    available: bool,
    fail_register: bool,
    registered: Arc<AtomicBool>,
}

impl StubListener {
    pub fn new(events: Vec<InputKind>) -> Self {
        Self {
            events,
            available: true,
            fail_register: false,
            registered: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A listener that reports itself unavailable.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(Vec::new())
        }
    }

    /// A listener that is available but refuses to register, as a global
    /// listener without device permission does.
    pub fn denied() -> Self {
        Self {
            fail_register: true,
            ..Self::new(Vec::new())
        }
    }

    /// Flag that is true while the listener is registered.
    pub fn registered_flag(&self) -> Arc<AtomicBool> {
        self.registered.clone()
    }
}

impl InputListener for StubListener {
    fn name(&self) -> &str {
        "stub"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn register(&mut self, handler: EventHandler) -> PresenterResult<()> {
        if self.fail_register {
            return Err(PresenterError::authorization_denied(
                "stub listener has no input permission",
            ));
        }
        self.registered.store(true, Ordering::SeqCst);
        for event in self.events.drain(..) {
            handler.handle(event);
        }
        Ok(())
    }

    fn deregister(&mut self) {
        self.registered.store(false, Ordering::SeqCst);
    }
}

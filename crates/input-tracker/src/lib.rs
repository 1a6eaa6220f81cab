//! Presenter Input Tracker
//!
//! Logs key presses and pointer activity to `input.jsonl` while a session
//! records. Two listeners feed one handler:
//!
//! - **Global:** system-wide devices (evdev on Linux), needs input permission
//! - **Local:** events the host application forwards from its own windows
//!
//! Each event is one compact JSON line, flushed as it is written.

pub mod backends;
pub mod handler;
pub mod writer;

use std::path::{Path, PathBuf};

use presenter_common::error::PresenterResult;

pub use backends::{detect_global_listener, LocalEventPort, LocalListener, StubListener};
pub use handler::EventHandler;
pub use writer::EventWriter;

/// A source of input notifications.
pub trait InputListener: Send {
    /// Listener name for logging.
    fn name(&self) -> &str;

    /// Whether the listener can run on this system right now.
    fn is_available(&self) -> bool;

    /// Start delivering events to `handler`.
    fn register(&mut self, handler: EventHandler) -> PresenterResult<()>;

    /// Stop delivering events. Must be idempotent.
    fn deregister(&mut self);
}

/// Logs input events from a global and a local listener into one file.
pub struct InputEventLogger {
    path: PathBuf,
    handler: EventHandler,
    listeners: Vec<Box<dyn InputListener>>,
}

impl InputEventLogger {
    /// Create an empty `path` opened for append and register both listeners.
    ///
    /// A listener that is unavailable or fails to register is skipped with a
    /// warning; the other keeps logging. Only file creation is fatal.
    pub fn start(
        path: &Path,
        global: Box<dyn InputListener>,
        local: Box<dyn InputListener>,
    ) -> PresenterResult<Self> {
        let handler = EventHandler::new(EventWriter::create(path)?);

        let mut listeners = Vec::with_capacity(2);
        for mut listener in [global, local] {
            if !listener.is_available() {
                tracing::warn!(
                    listener = listener.name(),
                    "Input listener unavailable; events from it will not be logged"
                );
                continue;
            }
            match listener.register(handler.clone()) {
                Ok(()) => {
                    tracing::info!(listener = listener.name(), "Input listener registered");
                    listeners.push(listener);
                }
                Err(e) => {
                    tracing::warn!(
                        listener = listener.name(),
                        error = %e,
                        "Input listener failed to register"
                    );
                }
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            handler,
            listeners,
        })
    }

    /// Deregister both listeners and close the file.
    /// Returns the number of events logged.
    pub fn stop(mut self) -> u64 {
        for listener in &mut self.listeners {
            listener.deregister();
        }
        let events = self.handler.close();
        tracing::info!(events, path = %self.path.display(), "Input logging stopped");
        events
    }

    pub fn events_logged(&self) -> u64 {
        self.handler.events_logged()
    }

    /// Names of listeners that registered successfully.
    pub fn active_listeners(&self) -> Vec<&str> {
        self.listeners.iter().map(|l| l.name()).collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InputEventLogger {
    fn drop(&mut self) {
        for listener in &mut self.listeners {
            listener.deregister();
        }
        self.handler.close();
    }
}

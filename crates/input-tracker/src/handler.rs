//! The single event handler every listener feeds.

use std::sync::{Arc, Mutex, MutexGuard};

use presenter_common::clock::unix_timestamp_secs;
use presenter_recording_model::event::InputKind;

use crate::writer::EventWriter;

/// Shared, cloneable handle to the session's event writer.
///
/// Listeners call [`EventHandler::handle`] from whatever thread they deliver
/// on; the mutex serializes writes so lines never interleave. Once the
/// handler is closed, late events are ignored.
#[derive(Clone)]
pub struct EventHandler {
    inner: Arc<Mutex<Option<EventWriter>>>,
}

impl EventHandler {
    pub fn new(writer: EventWriter) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(writer))),
        }
    }

    /// Stamp the event with the current wall clock and append it.
    pub fn handle(&self, kind: InputKind) {
        self.handle_at(unix_timestamp_secs(), kind);
    }

    /// Append an event observed at `timestamp` (unix seconds).
    pub fn handle_at(&self, timestamp: f64, kind: InputKind) {
        let mut guard = self.lock();
        let Some(writer) = guard.as_mut() else {
            return;
        };
        if let Err(e) = writer.write_event(timestamp, kind) {
            tracing::warn!(error = %e, "Dropping input event");
        }
    }

    /// Number of events written so far.
    pub fn events_logged(&self) -> u64 {
        self.lock().as_ref().map_or(0, EventWriter::events_written)
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Flush and close the file. Returns the number of events written.
    pub fn close(&self) -> u64 {
        let Some(mut writer) = self.lock().take() else {
            return 0;
        };
        if let Err(e) = writer.flush() {
            tracing::warn!(error = %e, "Final flush of input events failed");
        }
        writer.events_written()
    }

    fn lock(&self) -> MutexGuard<'_, Option<EventWriter>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

//! Start/stop command surface.
//!
//! The orchestrator owns at most one active [`RecordingSession`]. Both
//! commands are synchronous, idempotent and never wait on a device: start
//! spawns the track tasks, stop signals them and returns.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;

use presenter_common::config::AppConfig;
use presenter_common::error::PresenterResult;
use presenter_platform_core::PermissionBroker;
use presenter_recording_model::layout::TrackKind;

use crate::backend::CaptureBackend;
use crate::session::{RecordingSession, SessionReport, SessionStatus};
use crate::track::TrackStatus;

#[derive(Default)]
struct Slot {
    active: Option<RecordingSession>,
    last: Option<SessionReport>,
}

pub struct RecordingOrchestrator {
    config: AppConfig,
    backend: Arc<dyn CaptureBackend>,
    permissions: Arc<dyn PermissionBroker>,
    runtime: Handle,
    recording: AtomicBool,
    slot: Mutex<Slot>,
}

impl RecordingOrchestrator {
    pub fn new(
        config: AppConfig,
        backend: Arc<dyn CaptureBackend>,
        permissions: Arc<dyn PermissionBroker>,
        runtime: Handle,
    ) -> Self {
        Self {
            config,
            backend,
            permissions,
            runtime,
            recording: AtomicBool::new(false),
            slot: Mutex::new(Slot::default()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Start a session and return its directory.
    ///
    /// While a session is active this is a no-op returning the active
    /// directory. Fails only when the session directory cannot be created,
    /// in which case no track is started.
    pub fn start_recording(&self) -> PresenterResult<PathBuf> {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(session) = slot.active.as_ref() {
            tracing::debug!(session = %session.name(), "Already recording");
            return Ok(session.dir().to_path_buf());
        }

        let session = RecordingSession::start(
            &self.config.recordings_dir,
            self.backend.clone(),
            self.permissions.clone(),
            &self.config.recording,
            &self.runtime,
        )
        .map_err(|e| {
            tracing::error!(error = %e, "Recording session aborted");
            e
        })?;

        let dir = session.dir().to_path_buf();
        slot.active = Some(session);
        self.recording.store(true, Ordering::SeqCst);
        Ok(dir)
    }

    /// Signal every track to stop; finalize continues in the background.
    ///
    /// Returns the report of the stopped session, or `None` when idle.
    pub fn stop_recording(&self) -> Option<SessionReport> {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        let session = slot.active.take()?;
        self.recording.store(false, Ordering::SeqCst);

        let report = session.stop();
        slot.last = Some(report.clone());
        Some(report)
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn active_session_dir(&self) -> Option<PathBuf> {
        let slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        slot.active.as_ref().map(|s| s.dir().to_path_buf())
    }

    /// Per-track status of the active session, empty when idle.
    pub fn track_statuses(&self) -> Vec<(TrackKind, TrackStatus)> {
        let slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        slot.active
            .as_ref()
            .map(RecordingSession::track_statuses)
            .unwrap_or_default()
    }

    /// Report of the most recently stopped session.
    pub fn last_session(&self) -> Option<SessionReport> {
        let slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        slot.last.clone()
    }

    /// `Stopping` while the last stopped session is still finalizing.
    pub fn session_status(&self) -> SessionStatus {
        let slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        if slot.active.is_some() {
            SessionStatus::Active
        } else if slot.last.as_ref().is_some_and(|r| !r.is_finalized()) {
            SessionStatus::Stopping
        } else {
            SessionStatus::Idle
        }
    }
}

impl Drop for RecordingOrchestrator {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(|p| p.into_inner());
        if let Some(session) = slot.active.take() {
            tracing::warn!(session = %session.name(), "Orchestrator dropped while recording");
            session.stop();
        }
    }
}

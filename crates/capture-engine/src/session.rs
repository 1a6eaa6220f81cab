//! Recording session management.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::runtime::Handle;

use presenter_common::clock::{session_dir_name, RecordingClock};
use presenter_common::config::RecordingDefaults;
use presenter_common::error::{PresenterError, PresenterResult};
use presenter_platform_core::PermissionBroker;
use presenter_recording_model::layout::{SessionLayout, TrackKind};

use crate::backend::CaptureBackend;
use crate::track::{TrackContext, TrackHandle, TrackObserver, TrackStatus};

/// Suffixes tried after the bare timestamp name is taken.
const MAX_COLLISION_SUFFIX: u32 = 1000;

/// State of the orchestrator's session slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No session.
    Idle,
    /// Tracks are capturing.
    Active,
    /// Stop was issued; tracks are finalizing.
    Stopping,
}

/// Create a fresh session directory under `root` named after `at`.
///
/// Intermediate directories are created as needed. If the second-resolution
/// name is taken, `_2`, `_3`, ... are tried in turn.
pub fn allocate_session_dir(root: &Path, at: &DateTime<Local>) -> PresenterResult<PathBuf> {
    std::fs::create_dir_all(root).map_err(|source| PresenterError::DirectoryCreationFailed {
        path: root.to_path_buf(),
        source,
    })?;

    let base = session_dir_name(at);
    let mut candidate = root.join(&base);
    for suffix in 2..=MAX_COLLISION_SUFFIX + 1 {
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::debug!(path = %candidate.display(), "Session directory exists");
                candidate = root.join(format!("{base}_{suffix}"));
            }
            Err(source) => {
                return Err(PresenterError::DirectoryCreationFailed {
                    path: candidate,
                    source,
                });
            }
        }
    }

    Err(PresenterError::DirectoryCreationFailed {
        path: root.join(&base),
        source: std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "too many sessions with the same timestamp",
        ),
    })
}

/// One start-to-stop interval: a directory and exactly four tracks.
pub struct RecordingSession {
    layout: SessionLayout,
    created_at: DateTime<Local>,
    clock: RecordingClock,
    tracks: Vec<TrackHandle>,
}

impl RecordingSession {
    /// Allocate the session directory, then spawn all four tracks.
    ///
    /// Returns once the tasks are spawned; nothing here waits on a device.
    /// A directory failure aborts before any track exists.
    pub fn start(
        recordings_dir: &Path,
        backend: Arc<dyn CaptureBackend>,
        permissions: Arc<dyn PermissionBroker>,
        defaults: &RecordingDefaults,
        runtime: &Handle,
    ) -> PresenterResult<Self> {
        let clock = RecordingClock::start();
        let created_at = clock.epoch_wall();
        let dir = allocate_session_dir(recordings_dir, &created_at)?;
        let layout = SessionLayout::new(dir);

        tracing::info!(
            session = %layout.name(),
            dir = %layout.root().display(),
            backend = backend.name(),
            "Starting recording session"
        );

        let tracks = TrackKind::ALL
            .into_iter()
            .map(|kind| {
                let ctx = TrackContext {
                    path: layout.track_path(kind),
                    backend: backend.clone(),
                    permissions: permissions.clone(),
                    defaults: defaults.clone(),
                    clock: clock.clone(),
                };
                TrackHandle::spawn(kind, ctx, runtime)
            })
            .collect();

        Ok(Self {
            layout,
            created_at,
            clock,
            tracks,
        })
    }

    pub fn name(&self) -> String {
        self.layout.name()
    }

    pub fn dir(&self) -> &Path {
        self.layout.root()
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    pub fn clock(&self) -> &RecordingClock {
        &self.clock
    }

    /// Snapshot of every track's status, in start order.
    pub fn track_statuses(&self) -> Vec<(TrackKind, TrackStatus)> {
        self.tracks.iter().map(|t| (t.kind(), t.status())).collect()
    }

    /// Issue stop to every track and hand back a report to observe finalize.
    pub fn stop(self) -> SessionReport {
        tracing::info!(
            session = %self.layout.name(),
            duration_secs = self.clock.elapsed_secs(),
            "Stopping recording session"
        );
        for track in &self.tracks {
            track.request_stop();
        }
        SessionReport {
            dir: self.layout.root().to_path_buf(),
            name: self.layout.name(),
            observers: self.tracks.iter().map(TrackHandle::observer).collect(),
        }
    }
}

/// Observes a stopped session's tracks as they finalize.
#[derive(Clone)]
pub struct SessionReport {
    dir: PathBuf,
    name: String,
    observers: Vec<TrackObserver>,
}

impl SessionReport {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn statuses(&self) -> Vec<(TrackKind, TrackStatus)> {
        self.observers
            .iter()
            .map(|o| (o.kind(), o.status()))
            .collect()
    }

    pub fn status(&self, kind: TrackKind) -> Option<TrackStatus> {
        self.observers
            .iter()
            .find(|o| o.kind() == kind)
            .map(TrackObserver::status)
    }

    /// Whether every track reached a terminal status.
    pub fn is_finalized(&self) -> bool {
        self.observers.iter().all(|o| o.status().is_terminal())
    }

    /// Wait for every track to finish finalizing.
    pub async fn wait_finalized(&self) -> Vec<(TrackKind, TrackStatus)> {
        let mut results = Vec::with_capacity(self.observers.len());
        for observer in &self.observers {
            let mut observer = observer.clone();
            let status = observer.wait_terminal().await;
            results.push((observer.kind(), status));
        }
        tracing::info!(session = %self.name, "Session finalized");
        results
    }
}

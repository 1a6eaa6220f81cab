//! Track lifecycle: authorize, configure, capture, finalize.
//!
//! Each track runs as one tokio task that exclusively owns its source and
//! writer. The orchestrator talks to it only through two watch channels: a
//! stop flag in, a status out.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;

use presenter_common::clock::RecordingClock;
use presenter_common::config::RecordingDefaults;
use presenter_common::error::{FailureKind, PresenterError, PresenterResult};
use presenter_input_tracker::InputEventLogger;
use presenter_platform_core::{resolve_authorization, AuthorizationStatus, PermissionBroker};
use presenter_recording_model::layout::TrackKind;

use crate::backend::CaptureBackend;
use crate::source::{capability_for, CaptureSource};
use crate::writer::TrackWriter;

/// Why a track ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&PresenterError> for FailureReason {
    fn from(error: &PresenterError) -> Self {
        Self {
            kind: error.failure_kind(),
            message: error.to_string(),
        }
    }
}

/// What a finished track produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackOutput {
    /// Output file; `None` when the track never captured anything.
    pub path: Option<PathBuf>,
    /// Source timestamp of the first written sample.
    pub anchor: Option<Duration>,
    /// Time from the start command to the first sample.
    pub first_sample_latency: Option<Duration>,
    pub samples_written: u64,
    /// Samples dropped by the source queue or the busy encoder.
    pub samples_dropped: u64,
    /// Input track only.
    pub events_logged: u64,
}

/// Lifecycle status of one track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TrackStatus {
    NotStarted,
    Authorizing,
    Capturing,
    Stopping,
    Finalizing,
    Finished(TrackOutput),
    Failed(FailureReason),
}

impl TrackStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrackStatus::Finished(_) | TrackStatus::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            TrackStatus::NotStarted => "not_started",
            TrackStatus::Authorizing => "authorizing",
            TrackStatus::Capturing => "capturing",
            TrackStatus::Stopping => "stopping",
            TrackStatus::Finalizing => "finalizing",
            TrackStatus::Finished(_) => "finished",
            TrackStatus::Failed(_) => "failed",
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            TrackStatus::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn output(&self) -> Option<&TrackOutput> {
        match self {
            TrackStatus::Finished(output) => Some(output),
            _ => None,
        }
    }
}

/// Everything a track task needs, cloned per track.
#[derive(Clone)]
pub struct TrackContext {
    pub path: PathBuf,
    pub backend: Arc<dyn CaptureBackend>,
    pub permissions: Arc<dyn PermissionBroker>,
    pub defaults: RecordingDefaults,
    pub clock: RecordingClock,
}

/// Read-only view of a track's status.
#[derive(Clone)]
pub struct TrackObserver {
    kind: TrackKind,
    path: PathBuf,
    status: watch::Receiver<TrackStatus>,
}

impl TrackObserver {
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn status(&self) -> TrackStatus {
        self.status.borrow().clone()
    }

    /// Wait until the track reaches `Finished` or `Failed`.
    pub async fn wait_terminal(&mut self) -> TrackStatus {
        let waited = self
            .status
            .wait_for(TrackStatus::is_terminal)
            .await
            .map(|status| status.clone());
        match waited {
            Ok(status) => status,
            Err(_) => {
                let last = self.status.borrow().clone();
                if last.is_terminal() {
                    last
                } else {
                    TrackStatus::Failed(FailureReason {
                        kind: FailureKind::CaptureFailed,
                        message: format!("{} track task ended unexpectedly", self.kind),
                    })
                }
            }
        }
    }
}

/// Control handle held by the session.
pub struct TrackHandle {
    observer: TrackObserver,
    stop: watch::Sender<bool>,
}

impl TrackHandle {
    /// Spawn the task for `kind` on `runtime`. Returns immediately.
    pub fn spawn(kind: TrackKind, ctx: TrackContext, runtime: &Handle) -> Self {
        let (status_tx, status_rx) = watch::channel(TrackStatus::NotStarted);
        let (stop_tx, stop_rx) = watch::channel(false);
        let path = ctx.path.clone();

        runtime.spawn(run_track(kind, ctx, status_tx, stop_rx));

        Self {
            observer: TrackObserver {
                kind,
                path,
                status: status_rx,
            },
            stop: stop_tx,
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.observer.kind
    }

    pub fn status(&self) -> TrackStatus {
        self.observer.status()
    }

    /// Ask the track to stop. Never blocks; repeated calls are no-ops.
    pub fn request_stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn observer(&self) -> TrackObserver {
        self.observer.clone()
    }
}

async fn run_track(
    kind: TrackKind,
    ctx: TrackContext,
    status: watch::Sender<TrackStatus>,
    mut stop: watch::Receiver<bool>,
) {
    let result = if kind.is_media() {
        run_media_track(kind, &ctx, &status, &mut stop).await
    } else {
        run_input_track(&ctx, &status, &mut stop).await
    };

    let final_status = match result {
        Ok(output) => TrackStatus::Finished(output),
        Err(e) => {
            tracing::error!(track = %kind, error = %e, "Track failed");
            TrackStatus::Failed(FailureReason::from(&e))
        }
    };
    status.send_replace(final_status);
}

/// Resolves once stop was requested, or the session dropped its handle.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|requested| *requested).await;
}

fn is_stop_requested(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow()
}

/// Authorize `kind`, racing the prompt against a stop request.
/// `Ok(None)` means stop arrived first.
async fn authorize(
    kind: TrackKind,
    ctx: &TrackContext,
    stop: &mut watch::Receiver<bool>,
) -> Option<AuthorizationStatus> {
    let capability = capability_for(kind);
    tokio::select! {
        status = resolve_authorization(ctx.permissions.as_ref(), capability) => Some(status),
        _ = stop_requested(stop) => {
            tracing::info!(track = %kind, "Stopped while waiting for authorization");
            None
        }
    }
}

/// Run device or encoder work off the async workers.
async fn run_blocking<T, F>(kind: TrackKind, work: F) -> PresenterResult<T>
where
    F: FnOnce() -> PresenterResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PresenterError::capture(format!("{kind} worker task failed: {e}")))?
}

/// Create and configure the source, then the sink that matches its format.
fn open_media_track(
    kind: TrackKind,
    ctx: &TrackContext,
) -> PresenterResult<(Box<dyn CaptureSource>, TrackWriter)> {
    let mut source = ctx.backend.create_source(kind, &ctx.defaults)?;
    let format = source.configure()?;
    tracing::info!(track = %kind, ?format, "Source configured");
    let sink = ctx
        .backend
        .create_sink(kind, &ctx.path, &format, &ctx.defaults)?;
    Ok((source, TrackWriter::new(kind, &ctx.path, sink)))
}

async fn run_media_track(
    kind: TrackKind,
    ctx: &TrackContext,
    status: &watch::Sender<TrackStatus>,
    stop: &mut watch::Receiver<bool>,
) -> PresenterResult<TrackOutput> {
    status.send_replace(TrackStatus::Authorizing);
    match authorize(kind, ctx, stop).await {
        None => return Ok(TrackOutput::default()),
        Some(AuthorizationStatus::Authorized) => {}
        Some(other) => {
            return Err(PresenterError::authorization_denied(format!(
                "{} access is {other:?}",
                capability_for(kind)
            )));
        }
    }

    let setup = ctx.clone();
    let (source, writer) = run_blocking(kind, move || open_media_track(kind, &setup)).await?;

    // A stop that arrived during setup wins over starting the device.
    if is_stop_requested(stop) {
        tracing::info!(track = %kind, "Stop requested before capture started");
        tokio::task::spawn_blocking(move || drop((source, writer)));
        return Ok(TrackOutput::default());
    }

    let mut writer = writer;
    let (mut source, mut samples) = run_blocking(kind, move || {
        let mut source = source;
        source.start().map(|samples| (source, samples))
    })
    .await?;
    status.send_replace(TrackStatus::Capturing);

    let mut first_sample_latency = None;
    let mut write_error = None;
    loop {
        let sample = tokio::select! {
            biased;
            _ = stop_requested(stop) => break,
            sample = samples.recv() => match sample {
                Some(sample) => sample,
                None => {
                    tracing::warn!(track = %kind, "Sample stream closed by source");
                    break;
                }
            },
        };
        if first_sample_latency.is_none() {
            let latency = ctx.clock.elapsed();
            tracing::info!(
                track = %kind,
                latency_ms = latency.as_millis() as u64,
                "First sample received"
            );
            first_sample_latency = Some(latency);
        }

        // The first sample opens the output and brings the encoder up.
        let result = if writer.anchor().is_none() {
            let (returned, result) = run_blocking(kind, move || {
                let result = writer.accept(sample);
                Ok((writer, result))
            })
            .await?;
            writer = returned;
            result
        } else {
            writer.accept(sample)
        };
        if let Err(e) = result {
            write_error = Some(e);
            break;
        }
    }

    status.send_replace(TrackStatus::Stopping);
    let (source_result, source_dropped) = run_blocking(kind, move || {
        let result = source.stop();
        let dropped = source.dropped_samples();
        drop(source);
        Ok((result, dropped))
    })
    .await?;
    drop(samples);

    status.send_replace(TrackStatus::Finalizing);
    let finalized = tokio::task::spawn_blocking(move || writer.finish())
        .await
        .map_err(|e| PresenterError::finalize(format!("{kind} finalize task failed: {e}")))
        .and_then(|result| result);

    // A broken source or encoder also breaks the finalize; report the cause.
    if let Some(e) = write_error.or_else(|| source_result.err()) {
        if let Err(finalize_error) = &finalized {
            tracing::warn!(
                track = %kind,
                error = %finalize_error,
                "Finalize failed after capture error"
            );
        }
        return Err(e);
    }
    let summary = finalized?;

    Ok(TrackOutput {
        path: summary.path,
        anchor: summary.anchor,
        first_sample_latency,
        samples_written: summary.samples_written,
        samples_dropped: summary.samples_dropped + source_dropped,
        events_logged: 0,
    })
}

async fn run_input_track(
    ctx: &TrackContext,
    status: &watch::Sender<TrackStatus>,
    stop: &mut watch::Receiver<bool>,
) -> PresenterResult<TrackOutput> {
    status.send_replace(TrackStatus::Authorizing);
    match authorize(TrackKind::Input, ctx, stop).await {
        None => return Ok(TrackOutput::default()),
        Some(AuthorizationStatus::Authorized) => {}
        Some(other) => {
            // The local listener still works without system-wide access.
            tracing::warn!(
                ?other,
                "Input monitoring not authorized; only application events will be logged"
            );
        }
    }

    if is_stop_requested(stop) {
        return Ok(TrackOutput::default());
    }

    let path = ctx.path.clone();
    let backend = ctx.backend.clone();
    let logger = run_blocking(TrackKind::Input, move || {
        InputEventLogger::start(&path, backend.global_listener(), backend.local_listener())
    })
    .await?;
    status.send_replace(TrackStatus::Capturing);

    stop_requested(stop).await;

    status.send_replace(TrackStatus::Stopping);
    status.send_replace(TrackStatus::Finalizing);
    let events_logged = tokio::task::spawn_blocking(move || logger.stop())
        .await
        .map_err(|e| PresenterError::finalize(format!("input finalize task failed: {e}")))?;

    Ok(TrackOutput {
        path: Some(ctx.path.clone()),
        events_logged,
        ..TrackOutput::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_reason_classifies_errors() {
        let reason = FailureReason::from(&PresenterError::unsupported("no screen capture"));
        assert_eq!(reason.kind, FailureKind::DeviceUnavailable);

        let reason = FailureReason::from(&PresenterError::finalize("muxer stalled"));
        assert_eq!(reason.kind, FailureKind::FinalizeFailed);
        assert!(reason.message.contains("muxer stalled"));
    }

    #[test]
    fn status_serializes_with_state_tag() {
        let status = TrackStatus::Failed(FailureReason {
            kind: FailureKind::AuthorizationDenied,
            message: "camera access is Denied".into(),
        });
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["kind"], "authorization_denied");
        assert!(status.is_terminal());
        assert!(!TrackStatus::Finalizing.is_terminal());
    }

    #[tokio::test]
    async fn dropped_task_reads_as_failed() {
        let (tx, rx) = watch::channel(TrackStatus::Capturing);
        let mut observer = TrackObserver {
            kind: TrackKind::Audio,
            path: PathBuf::from("audio.m4a"),
            status: rx,
        };
        drop(tx);
        let status = observer.wait_terminal().await;
        assert_eq!(status.failure().map(|f| f.kind), Some(FailureKind::CaptureFailed));
    }
}

//! End-to-end session behaviour against the stub backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use presenter_capture_engine::{
    CaptureBackend, RecordingOrchestrator, SessionReport, SessionStatus, StubCaptureBackend,
    StubTrack, TrackStatus,
};
use chrono::Local;
use presenter_common::clock::{session_dir_name, unix_timestamp_secs};
use presenter_common::config::AppConfig;
use presenter_common::error::{FailureKind, PresenterError};
use presenter_platform_core::{Capability, PermissionBroker, StaticPermissions};
use presenter_recording_model::event::{InputKind, MouseButton};
use presenter_recording_model::layout::TrackKind;
use presenter_recording_model::validate::{validate_session, FileState};
use tokio::runtime::Handle;

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    _root: tempfile::TempDir,
    recordings: PathBuf,
    backend: Arc<StubCaptureBackend>,
    orchestrator: RecordingOrchestrator,
}

fn harness(backend: StubCaptureBackend, permissions: StaticPermissions) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let recordings = root.path().join("recordings");
    let config = AppConfig {
        recordings_dir: recordings.clone(),
        ..AppConfig::default()
    };
    let backend = Arc::new(backend);
    let capture: Arc<dyn CaptureBackend> = backend.clone();
    let permissions: Arc<dyn PermissionBroker> = Arc::new(permissions);
    let orchestrator = RecordingOrchestrator::new(config, capture, permissions, Handle::current());
    Harness {
        _root: root,
        recordings,
        backend,
        orchestrator,
    }
}

async fn wait_for_status(
    orchestrator: &RecordingOrchestrator,
    kind: TrackKind,
    matches: impl Fn(&TrackStatus) -> bool,
) {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let current = orchestrator
            .track_statuses()
            .into_iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, s)| s);
        if current.as_ref().is_some_and(&matches) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "{kind} never reached the expected status, last seen {current:?}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn record_for(harness: &Harness, duration: Duration) -> (PathBuf, SessionReport) {
    let dir = harness.orchestrator.start_recording().unwrap();
    let report = stop_after(harness, duration).await;
    (dir, report)
}

/// Let a started session capture for `duration`, then stop and finalize it.
async fn stop_after(harness: &Harness, duration: Duration) -> SessionReport {
    wait_for_status(&harness.orchestrator, TrackKind::Input, |s| {
        *s == TrackStatus::Capturing
    })
    .await;
    tokio::time::sleep(duration).await;
    let report = harness.orchestrator.stop_recording().unwrap();
    tokio::time::timeout(WAIT, report.wait_finalized())
        .await
        .expect("session did not finalize");
    report
}

fn status_of(report: &SessionReport, kind: TrackKind) -> TrackStatus {
    report.status(kind).unwrap()
}

fn failure_kind(report: &SessionReport, kind: TrackKind) -> Option<FailureKind> {
    status_of(report, kind).failure().map(|f| f.kind)
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn healthy_session_writes_all_four_files() {
    let h = harness(StubCaptureBackend::new(), StaticPermissions::all_authorized());
    let before = Local::now();
    let dir = h.orchestrator.start_recording().unwrap();
    let after = Local::now();
    let report = stop_after(&h, Duration::from_millis(100)).await;

    // Named after the moment start was called; the second may tick over.
    let name = dir.file_name().unwrap().to_string_lossy().into_owned();
    assert!(
        name == session_dir_name(&before) || name == session_dir_name(&after),
        "{name} was not taken from the start time"
    );
    assert_eq!(
        files_in(&dir),
        ["audio.m4a", "input.jsonl", "screen.mov", "webcam.mov"]
    );
    for kind in [TrackKind::Screen, TrackKind::Webcam, TrackKind::Audio] {
        let status = status_of(&report, kind);
        let output = status.output().expect("media track finished");
        assert_eq!(output.path.as_deref(), Some(dir.join(kind.file_name()).as_path()));
        assert_eq!(output.anchor, Some(Duration::from_secs(1)));
        assert!(output.first_sample_latency.is_some());
        assert!(output.samples_written > 0);
    }

    let validation = validate_session(&dir).unwrap();
    assert!(validation.is_valid(), "{:?}", validation.issues);
    assert!(validation.name_matches_pattern);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_tracks_do_not_affect_siblings() {
    let backend = StubCaptureBackend::new()
        .with_track(TrackKind::Webcam, StubTrack::missing_device())
        .with_track(
            TrackKind::Audio,
            StubTrack {
                encoder_missing: true,
                ..StubTrack::default()
            },
        );
    let h = harness(backend, StaticPermissions::all_authorized());
    let (dir, report) = record_for(&h, Duration::from_millis(60)).await;

    assert_eq!(
        failure_kind(&report, TrackKind::Webcam),
        Some(FailureKind::DeviceUnavailable)
    );
    assert_eq!(
        failure_kind(&report, TrackKind::Audio),
        Some(FailureKind::EncoderSetupFailed)
    );
    assert!(status_of(&report, TrackKind::Screen).output().is_some());
    assert!(status_of(&report, TrackKind::Input).output().is_some());
    assert_eq!(files_in(&dir), ["input.jsonl", "screen.mov"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn denied_camera_only_loses_the_webcam() {
    let permissions = StaticPermissions::all_authorized().deny(Capability::Camera);
    let h = harness(StubCaptureBackend::new(), permissions);
    let (dir, report) = record_for(&h, Duration::from_millis(60)).await;

    assert_eq!(
        failure_kind(&report, TrackKind::Webcam),
        Some(FailureKind::AuthorizationDenied)
    );
    assert!(!dir.join("webcam.mov").exists());
    for kind in [TrackKind::Screen, TrackKind::Audio, TrackKind::Input] {
        assert!(dir.join(kind.file_name()).exists(), "{kind} missing");
    }
    assert_eq!(h.backend.sources_created(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_and_stop_are_idempotent() {
    let h = harness(StubCaptureBackend::new(), StaticPermissions::all_authorized());

    assert_eq!(h.orchestrator.session_status(), SessionStatus::Idle);
    let first = h.orchestrator.start_recording().unwrap();
    assert!(h.orchestrator.is_recording());
    let second = h.orchestrator.start_recording().unwrap();
    assert_eq!(first, second);
    assert_eq!(h.orchestrator.active_session_dir(), Some(first.clone()));
    assert_eq!(h.orchestrator.session_status(), SessionStatus::Active);

    wait_for_status(&h.orchestrator, TrackKind::Screen, |s| {
        *s == TrackStatus::Capturing
    })
    .await;

    let report = h.orchestrator.stop_recording().unwrap();
    assert!(!h.orchestrator.is_recording());
    assert!(h.orchestrator.stop_recording().is_none());
    assert!(h.orchestrator.track_statuses().is_empty());

    report.wait_finalized().await;
    assert!(report.is_finalized());
    assert_eq!(h.orchestrator.session_status(), SessionStatus::Idle);
    assert_eq!(h.orchestrator.last_session().unwrap().dir(), first);

    assert_eq!(files_in(&h.recordings).len(), 1);
    assert_eq!(h.backend.sources_created(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn busy_encoder_drops_samples() {
    let backend = StubCaptureBackend::new().with_track(
        TrackKind::Screen,
        StubTrack {
            samples: 20,
            sink_busy_after: Some(5),
            sink_busy_checks: Some(3),
            ..StubTrack::default()
        },
    );
    let h = harness(backend, StaticPermissions::all_authorized());
    let (dir, report) = record_for(&h, Duration::from_millis(300)).await;

    let status = status_of(&report, TrackKind::Screen);
    let output = status.output().unwrap();
    // Delivery resumes after each busy window.
    assert!(output.samples_written > 5, "{output:?}");
    assert!(output.samples_dropped > 0, "{output:?}");
    assert_eq!(output.samples_written + output.samples_dropped, 20);
    assert_eq!(
        std::fs::metadata(dir.join("screen.mov")).unwrap().len(),
        output.samples_written * 64
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_during_authorization_starts_nothing() {
    let mut permissions = StaticPermissions::all_authorized();
    for capability in [
        Capability::ScreenRecording,
        Capability::Camera,
        Capability::Microphone,
        Capability::InputMonitoring,
    ] {
        permissions = permissions.undetermined(capability, true);
    }
    let permissions = permissions.with_prompt_delay(Duration::from_secs(30));
    let h = harness(StubCaptureBackend::new(), permissions);

    let dir = h.orchestrator.start_recording().unwrap();
    for kind in TrackKind::ALL {
        wait_for_status(&h.orchestrator, kind, |s| *s == TrackStatus::Authorizing).await;
    }
    let report = h.orchestrator.stop_recording().unwrap();
    let statuses = tokio::time::timeout(WAIT, report.wait_finalized())
        .await
        .expect("pending authorization blocked stop");

    for (kind, status) in statuses {
        let output = status.output().unwrap_or_else(|| panic!("{kind} failed"));
        assert_eq!(output.path, None);
    }
    assert!(files_in(&dir).is_empty());
    assert_eq!(h.backend.sources_created(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn input_events_from_both_listeners_are_logged() {
    let backend = StubCaptureBackend::new().with_input_events(vec![
        InputKind::KeyDown { key_code: 30 },
        InputKind::MouseMoved { x: 10.0, y: 20.0 },
    ]);
    let h = harness(backend, StaticPermissions::all_authorized());

    let started_at = unix_timestamp_secs();
    let dir = h.orchestrator.start_recording().unwrap();
    wait_for_status(&h.orchestrator, TrackKind::Input, |s| {
        *s == TrackStatus::Capturing
    })
    .await;
    let event = InputKind::MouseDown {
        button: MouseButton::Left,
        x: 4.0,
        y: 8.0,
    };
    assert_eq!(h.backend.local_port().forward(event.clone()), event);

    let report = h.orchestrator.stop_recording().unwrap();
    let stopped_at = unix_timestamp_secs();
    report.wait_finalized().await;
    assert_eq!(
        status_of(&report, TrackKind::Input).output().unwrap().events_logged,
        3
    );

    let validation = validate_session(&dir).unwrap();
    assert!(validation.is_valid(), "{:?}", validation.issues);
    let input = validation.input.unwrap();
    assert_eq!(input.records, 3);
    assert_eq!(input.key_events, 1);
    assert_eq!(input.pointer_events, 2);
    let first = input.first_timestamp.unwrap();
    let last = input.last_timestamp.unwrap();
    assert!(started_at <= first, "{first} precedes start at {started_at}");
    assert!(last <= stopped_at, "{last} follows stop at {stopped_at}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn denied_input_monitoring_keeps_local_events() {
    let backend = StubCaptureBackend::new().with_input_denied();
    let permissions = StaticPermissions::all_authorized().deny(Capability::InputMonitoring);
    let h = harness(backend, permissions);

    h.orchestrator.start_recording().unwrap();
    wait_for_status(&h.orchestrator, TrackKind::Input, |s| {
        *s == TrackStatus::Capturing
    })
    .await;
    h.backend
        .local_port()
        .forward(InputKind::KeyDown { key_code: 57 });

    let report = h.orchestrator.stop_recording().unwrap();
    report.wait_finalized().await;
    let status = status_of(&report, TrackKind::Input);
    assert_eq!(status.output().unwrap().events_logged, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unusable_recordings_dir_aborts_before_any_track() {
    let h = harness(StubCaptureBackend::new(), StaticPermissions::all_authorized());
    std::fs::write(&h.recordings, b"in the way").unwrap();

    let err = h.orchestrator.start_recording().unwrap_err();
    assert!(matches!(err, PresenterError::DirectoryCreationFailed { .. }));
    assert!(!h.orchestrator.is_recording());
    assert!(h.orchestrator.track_statuses().is_empty());
    assert!(h.orchestrator.stop_recording().is_none());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.backend.sources_created(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn back_to_back_sessions_get_distinct_directories() {
    let h = harness(StubCaptureBackend::new(), StaticPermissions::all_authorized());
    let (first, _) = record_for(&h, Duration::from_millis(10)).await;
    let (second, _) = record_for(&h, Duration::from_millis(10)).await;

    assert_ne!(first, second);
    assert_eq!(files_in(&h.recordings).len(), 2);
    assert_eq!(files_in(&first).len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn finalize_error_is_reported_on_the_track() {
    let backend = StubCaptureBackend::new().with_track(
        TrackKind::Audio,
        StubTrack {
            finalize_error: true,
            ..StubTrack::default()
        },
    );
    let h = harness(backend, StaticPermissions::all_authorized());
    let (_dir, report) = record_for(&h, Duration::from_millis(60)).await;

    assert_eq!(
        failure_kind(&report, TrackKind::Audio),
        Some(FailureKind::FinalizeFailed)
    );
    assert!(status_of(&report, TrackKind::Screen).output().is_some());
    assert!(status_of(&report, TrackKind::Webcam).output().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn device_lost_mid_capture_keeps_what_was_written() {
    let backend = StubCaptureBackend::new().with_track(
        TrackKind::Webcam,
        StubTrack {
            fail_after: Some(3),
            ..StubTrack::default()
        },
    );
    let h = harness(backend, StaticPermissions::all_authorized());
    let (dir, report) = record_for(&h, Duration::from_millis(60)).await;

    assert_eq!(
        failure_kind(&report, TrackKind::Webcam),
        Some(FailureKind::CaptureFailed)
    );
    assert_eq!(
        std::fs::metadata(dir.join("webcam.mov")).unwrap().len(),
        3 * 64
    );
    assert!(status_of(&report, TrackKind::Screen).output().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn capture_error_outranks_the_finalize_error_it_causes() {
    let backend = StubCaptureBackend::new().with_track(
        TrackKind::Webcam,
        StubTrack {
            fail_after: Some(3),
            finalize_error: true,
            ..StubTrack::default()
        },
    );
    let h = harness(backend, StaticPermissions::all_authorized());
    let (_dir, report) = record_for(&h, Duration::from_millis(60)).await;

    let status = status_of(&report, TrackKind::Webcam);
    let failure = status.failure().unwrap();
    assert_eq!(failure.kind, FailureKind::CaptureFailed);
    assert!(failure.message.contains("disconnected"), "{}", failure.message);
}

#[tokio::test]
async fn slow_device_setup_does_not_stall_the_runtime() {
    let backend = StubCaptureBackend::new().with_track(
        TrackKind::Screen,
        StubTrack {
            setup_delay: Duration::from_millis(400),
            ..StubTrack::default()
        },
    );
    let h = harness(backend, StaticPermissions::all_authorized());
    h.orchestrator.start_recording().unwrap();

    // Single-threaded runtime: a setup blocking the worker would hold this up.
    let started = std::time::Instant::now();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(started.elapsed() < Duration::from_millis(200));

    wait_for_status(&h.orchestrator, TrackKind::Screen, |s| {
        *s == TrackStatus::Capturing
    })
    .await;
    let report = h.orchestrator.stop_recording().unwrap();
    tokio::time::timeout(WAIT, report.wait_finalized())
        .await
        .expect("session did not finalize");
    assert!(status_of(&report, TrackKind::Screen).output().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn silent_source_leaves_no_file() {
    let backend = StubCaptureBackend::new().with_track(TrackKind::Webcam, StubTrack::silent());
    let h = harness(backend, StaticPermissions::all_authorized());
    let (dir, report) = record_for(&h, Duration::from_millis(30)).await;

    let status = status_of(&report, TrackKind::Webcam);
    assert_eq!(status.output().unwrap().path, None);
    assert!(!dir.join("webcam.mov").exists());
    assert_eq!(
        validate_session(&dir).unwrap().file_state(TrackKind::Webcam),
        Some(FileState::Absent)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_finalize_does_not_block_stop() {
    let backend = StubCaptureBackend::new().with_track(
        TrackKind::Screen,
        StubTrack {
            finalize_delay: Duration::from_millis(300),
            ..StubTrack::default()
        },
    );
    let h = harness(backend, StaticPermissions::all_authorized());
    h.orchestrator.start_recording().unwrap();
    wait_for_status(&h.orchestrator, TrackKind::Screen, |s| {
        *s == TrackStatus::Capturing
    })
    .await;
    tokio::time::sleep(Duration::from_millis(40)).await;

    let started = std::time::Instant::now();
    let report = h.orchestrator.stop_recording().unwrap();
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(!h.orchestrator.is_recording());

    report.wait_finalized().await;
    assert!(status_of(&report, TrackKind::Screen).output().is_some());
}

//! Scripted backend for tests and dry runs.
//!
//! Sources emit byte samples on their own thread; sinks write the raw bytes
//! to the output path, so tests can see exactly which tracks produced files.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc;

use presenter_common::config::RecordingDefaults;
use presenter_common::error::{PresenterError, PresenterResult};
use presenter_input_tracker::{InputListener, LocalEventPort, StubListener};
use presenter_recording_model::event::InputKind;
use presenter_recording_model::layout::TrackKind;

use crate::backend::CaptureBackend;
use crate::source::{CaptureSource, Sample, SamplePayload, SampleStream, SourceFormat};
use crate::writer::MediaSink;

/// Behaviour of one scripted track.
#[derive(Debug, Clone)]
pub struct StubTrack {
    /// Samples emitted after start.
    pub samples: usize,
    pub interval: Duration,
    pub sample_size: usize,
    /// Timestamp of the first sample in the source clock.
    pub start_pts: Duration,
    /// `create_source` fails with DeviceUnavailable.
    pub device_missing: bool,
    /// `create_sink` fails with EncoderSetupFailed.
    pub encoder_missing: bool,
    /// The source fails after emitting this many samples.
    pub fail_after: Option<usize>,
    /// The sink reports busy once it holds this many samples.
    pub sink_busy_after: Option<u64>,
    /// A busy sink becomes ready again after this many readiness checks.
    pub sink_busy_checks: Option<u64>,
    /// `create_source` blocks this long, like a slow device enumeration.
    pub setup_delay: Duration,
    pub finalize_delay: Duration,
    pub finalize_error: bool,
}

impl Default for StubTrack {
    fn default() -> Self {
        Self {
            samples: 10,
            interval: Duration::from_millis(2),
            sample_size: 64,
            start_pts: Duration::from_secs(1),
            device_missing: false,
            encoder_missing: false,
            fail_after: None,
            sink_busy_after: None,
            sink_busy_checks: None,
            setup_delay: Duration::ZERO,
            finalize_delay: Duration::ZERO,
            finalize_error: false,
        }
    }
}

impl StubTrack {
    pub fn missing_device() -> Self {
        Self {
            device_missing: true,
            ..Self::default()
        }
    }

    pub fn silent() -> Self {
        Self {
            samples: 0,
            ..Self::default()
        }
    }
}

/// Backend whose tracks follow [`StubTrack`] scripts.
pub struct StubCaptureBackend {
    tracks: HashMap<TrackKind, StubTrack>,
    input_events: Vec<InputKind>,
    input_denied: bool,
    local_port: LocalEventPort,
    sources_created: AtomicUsize,
}

impl Default for StubCaptureBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StubCaptureBackend {
    /// Every media track emits the default script.
    pub fn new() -> Self {
        Self {
            tracks: HashMap::new(),
            input_events: Vec::new(),
            input_denied: false,
            local_port: LocalEventPort::new(),
            sources_created: AtomicUsize::new(0),
        }
    }

    pub fn with_track(mut self, kind: TrackKind, track: StubTrack) -> Self {
        self.tracks.insert(kind, track);
        self
    }

    /// Events the global listener delivers on registration.
    pub fn with_input_events(mut self, events: Vec<InputKind>) -> Self {
        self.input_events = events;
        self
    }

    /// The global listener refuses to register.
    pub fn with_input_denied(mut self) -> Self {
        self.input_denied = true;
        self
    }

    /// Port for forwarding host-application events.
    pub fn local_port(&self) -> &LocalEventPort {
        &self.local_port
    }

    /// Media sources created so far, across sessions.
    pub fn sources_created(&self) -> usize {
        self.sources_created.load(Ordering::SeqCst)
    }

    fn script(&self, kind: TrackKind) -> StubTrack {
        self.tracks.get(&kind).cloned().unwrap_or_default()
    }
}

impl CaptureBackend for StubCaptureBackend {
    fn name(&self) -> &str {
        "stub"
    }

    fn create_source(
        &self,
        kind: TrackKind,
        defaults: &RecordingDefaults,
    ) -> PresenterResult<Box<dyn CaptureSource>> {
        let script = self.script(kind);
        if !script.setup_delay.is_zero() {
            std::thread::sleep(script.setup_delay);
        }
        if script.device_missing {
            return Err(PresenterError::device_unavailable(format!(
                "no stub {kind} device"
            )));
        }
        self.sources_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubSource::new(
            kind,
            script,
            defaults.queue_depth.max(1) as usize,
        )))
    }

    fn create_sink(
        &self,
        kind: TrackKind,
        path: &Path,
        _format: &SourceFormat,
        _defaults: &RecordingDefaults,
    ) -> PresenterResult<Box<dyn MediaSink>> {
        let script = self.script(kind);
        if script.encoder_missing {
            return Err(PresenterError::encoder_setup(format!(
                "no stub encoder for {kind}"
            )));
        }
        let mut sink = FileSink::new(path).with_finalize_delay(script.finalize_delay);
        if let Some(limit) = script.sink_busy_after {
            sink = sink.busy_after(limit);
        }
        if let Some(checks) = script.sink_busy_checks {
            sink = sink.recover_after(checks);
        }
        if script.finalize_error {
            sink = sink.failing_finalize();
        }
        Ok(Box::new(sink))
    }

    fn global_listener(&self) -> Box<dyn InputListener> {
        if self.input_denied {
            Box::new(StubListener::denied())
        } else {
            Box::new(StubListener::new(self.input_events.clone()))
        }
    }

    fn local_listener(&self) -> Box<dyn InputListener> {
        Box::new(self.local_port.listener())
    }
}

/// Source that emits a scripted run of byte samples.
pub struct StubSource {
    kind: TrackKind,
    script: StubTrack,
    capacity: usize,
    stop: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    error: Arc<Mutex<Option<String>>>,
    thread: Option<JoinHandle<()>>,
}

impl StubSource {
    pub fn new(kind: TrackKind, script: StubTrack, capacity: usize) -> Self {
        Self {
            kind,
            script,
            capacity,
            stop: Arc::new(AtomicBool::new(false)),
            dropped: Arc::new(AtomicU64::new(0)),
            error: Arc::new(Mutex::new(None)),
            thread: None,
        }
    }
}

impl CaptureSource for StubSource {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn configure(&mut self) -> PresenterResult<SourceFormat> {
        Ok(match self.kind {
            TrackKind::Audio => SourceFormat::audio("stub microphone", 44_100, 2),
            _ => SourceFormat::video(format!("stub {}", self.kind), 1920, 1088, 60),
        })
    }

    fn start(&mut self) -> PresenterResult<SampleStream> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let script = self.script.clone();
        let stop = self.stop.clone();
        let dropped = self.dropped.clone();
        let error = self.error.clone();
        let kind = self.kind;

        let thread = std::thread::Builder::new()
            .name(format!("stub-{kind}"))
            .spawn(move || {
                for i in 0..script.samples {
                    if stop.load(Ordering::SeqCst) {
                        return;
                    }
                    if script.fail_after == Some(i) {
                        *error.lock().unwrap_or_else(|p| p.into_inner()) =
                            Some(format!("stub {kind} device disconnected"));
                        return;
                    }
                    let pts = script.start_pts + script.interval * i as u32;
                    let sample = Sample::new(pts, SamplePayload::Bytes(vec![0xAB; script.sample_size]));
                    if tx.try_send(sample).is_err() {
                        dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    std::thread::sleep(script.interval);
                }
                // A real device keeps its stream open until stopped.
                while !stop.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(1));
                }
            })
            .map_err(|e| PresenterError::capture(format!("Failed to spawn stub source: {e}")))?;
        self.thread = Some(thread);
        Ok(rx)
    }

    fn stop(&mut self) -> PresenterResult<()> {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        match self.error.lock().unwrap_or_else(|p| p.into_inner()).take() {
            Some(message) => Err(PresenterError::capture(message)),
            None => Ok(()),
        }
    }

    fn dropped_samples(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Sink that appends raw sample bytes to its output file.
pub struct FileSink {
    path: PathBuf,
    file: Option<File>,
    busy_after: Option<u64>,
    recover_after: Option<u64>,
    held: AtomicU64,
    busy_checks: AtomicU64,
    finalize_delay: Duration,
    finalize_error: bool,
    written_pts: Arc<Mutex<Vec<Duration>>>,
}

impl FileSink {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            file: None,
            busy_after: None,
            recover_after: None,
            held: AtomicU64::new(0),
            busy_checks: AtomicU64::new(0),
            finalize_delay: Duration::ZERO,
            finalize_error: false,
            written_pts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Report not-ready once `limit` samples were appended.
    pub fn busy_after(mut self, limit: u64) -> Self {
        self.busy_after = Some(limit);
        self
    }

    /// Stay busy for `checks` readiness checks, then accept another
    /// `busy_after` samples.
    pub fn recover_after(mut self, checks: u64) -> Self {
        self.recover_after = Some(checks);
        self
    }

    pub fn with_finalize_delay(mut self, delay: Duration) -> Self {
        self.finalize_delay = delay;
        self
    }

    pub fn failing_finalize(mut self) -> Self {
        self.finalize_error = true;
        self
    }

    /// Relative timestamps of every appended sample.
    pub fn written_pts(&self) -> Arc<Mutex<Vec<Duration>>> {
        self.written_pts.clone()
    }
}

impl MediaSink for FileSink {
    fn start_timeline(&mut self, _anchor: Duration, _first: &Sample) -> PresenterResult<()> {
        let file = File::create(&self.path).map_err(|e| {
            PresenterError::encoder_setup(format!("Failed to create {}: {e}", self.path.display()))
        })?;
        self.file = Some(file);
        Ok(())
    }

    fn is_ready_for_more(&self) -> bool {
        let Some(limit) = self.busy_after else {
            return true;
        };
        if self.held.load(Ordering::Relaxed) < limit {
            return true;
        }
        let Some(checks) = self.recover_after else {
            return false;
        };
        if self.busy_checks.fetch_add(1, Ordering::Relaxed) < checks {
            return false;
        }
        self.held.store(0, Ordering::Relaxed);
        self.busy_checks.store(0, Ordering::Relaxed);
        true
    }

    fn append(&mut self, sample: Sample) -> PresenterResult<()> {
        let Some(file) = self.file.as_mut() else {
            return Err(PresenterError::capture("append before timeline start"));
        };
        let bytes = match &sample.payload {
            SamplePayload::Bytes(bytes) => bytes.clone(),
            SamplePayload::Gst(gst_sample) => gst_sample
                .buffer()
                .and_then(|b| b.map_readable().ok().map(|m| m.as_slice().to_vec()))
                .unwrap_or_default(),
        };
        file.write_all(&bytes)?;
        self.held.fetch_add(1, Ordering::Relaxed);
        self.written_pts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(sample.pts);
        Ok(())
    }

    fn finalize(self: Box<Self>) -> PresenterResult<()> {
        if !self.finalize_delay.is_zero() {
            std::thread::sleep(self.finalize_delay);
        }
        if let Some(mut file) = self.file {
            file.flush()?;
        }
        if self.finalize_error {
            return Err(PresenterError::finalize(format!(
                "stub muxer failed to write {}",
                self.path.display()
            )));
        }
        Ok(())
    }

    fn discard(self: Box<Self>) {}
}

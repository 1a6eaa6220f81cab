//! GStreamer pipelines behind the production sources and sinks.
//!
//! A source pipeline ends in an `appsink` whose callback forwards samples
//! into a bounded channel. A sink pipeline starts at an `appsrc` and ends in
//! a `filesink`; it stays in `Null` (no file on disk) until the first sample
//! arrives.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};

use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;
use tokio::sync::mpsc;

use presenter_common::config::RecordingDefaults;
use presenter_common::error::{PresenterError, PresenterResult};
use presenter_recording_model::layout::TrackKind;

use crate::source::{CaptureSource, Sample, SamplePayload, SampleStream, SourceFormat};
use crate::writer::MediaSink;

pub(crate) fn init_gstreamer() -> PresenterResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(PresenterError::capture(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

type SenderSlot = Arc<Mutex<Option<mpsc::Sender<Sample>>>>;

/// A capture pipeline whose frames are pulled from an appsink.
pub struct GstSource {
    kind: TrackKind,
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    format: SourceFormat,
    queue_depth: usize,
    sender: SenderSlot,
    error: Arc<Mutex<Option<String>>>,
    dropped: Arc<AtomicU64>,
}

impl GstSource {
    /// Wrap a pipeline that contains an appsink named `sink`.
    pub fn new(
        kind: TrackKind,
        pipeline: gst::Pipeline,
        format: SourceFormat,
        queue_depth: u32,
    ) -> PresenterResult<Self> {
        let appsink = pipeline
            .by_name("sink")
            .and_then(|e| e.downcast::<gst_app::AppSink>().ok())
            .ok_or_else(|| PresenterError::capture(format!("{kind} pipeline has no appsink")))?;

        Ok(Self {
            kind,
            pipeline,
            appsink,
            format,
            queue_depth: queue_depth.max(1) as usize,
            sender: Arc::new(Mutex::new(None)),
            error: Arc::new(Mutex::new(None)),
            dropped: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Build from a launch description ending in `appsink name=sink`.
    pub fn from_launch(
        kind: TrackKind,
        launch: &str,
        format: SourceFormat,
        queue_depth: u32,
    ) -> PresenterResult<Self> {
        init_gstreamer()?;
        tracing::debug!(track = %kind, %launch, "Building source pipeline");

        let element = gst::parse::launch(launch).map_err(|e| {
            PresenterError::device_unavailable(format!("Failed to build {kind} pipeline: {e}"))
        })?;
        let pipeline = element.dynamic_cast::<gst::Pipeline>().map_err(|_| {
            PresenterError::capture("Launch string did not produce a pipeline")
        })?;
        Self::new(kind, pipeline, format, queue_depth)
    }

    fn install_callbacks(&self) {
        let sender = self.sender.clone();
        let dropped = self.dropped.clone();
        let kind = self.kind;

        self.appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let Some(pts) = sample.buffer().and_then(|b| b.pts()) else {
                        tracing::trace!(track = %kind, "Sample without timestamp skipped");
                        return Ok(gst::FlowSuccess::Ok);
                    };
                    let sample = Sample::new(
                        Duration::from_nanos(pts.nseconds()),
                        SamplePayload::Gst(sample),
                    );

                    let guard = sender.lock().unwrap_or_else(|p| p.into_inner());
                    if let Some(tx) = guard.as_ref() {
                        if tx.try_send(sample).is_err() {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );
    }

    fn install_bus_handler(&self) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        let sender = self.sender.clone();
        let error = self.error.clone();
        let kind = self.kind;

        bus.set_sync_handler(move |_, msg| {
            if let gst::MessageView::Error(err) = msg.view() {
                let message = format!("{} ({:?})", err.error(), err.debug());
                tracing::error!(track = %kind, error = %message, "Capture pipeline error");
                error
                    .lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .get_or_insert(message);
                // Closing the channel ends the track's capture loop.
                sender.lock().unwrap_or_else(|p| p.into_inner()).take();
            }
            gst::BusSyncReply::Pass
        });
    }
}

impl CaptureSource for GstSource {
    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn configure(&mut self) -> PresenterResult<SourceFormat> {
        self.pipeline.set_state(gst::State::Ready).map_err(|e| {
            PresenterError::device_unavailable(format!(
                "{} device could not be opened: {e:?}",
                self.kind
            ))
        })?;
        Ok(self.format.clone())
    }

    fn start(&mut self) -> PresenterResult<SampleStream> {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        *self.sender.lock().unwrap_or_else(|p| p.into_inner()) = Some(tx);
        self.install_callbacks();
        self.install_bus_handler();

        self.pipeline.set_state(gst::State::Playing).map_err(|e| {
            PresenterError::capture(format!("Failed to start {} pipeline: {e:?}", self.kind))
        })?;
        tracing::info!(track = %self.kind, device = %self.format.device, "Capture started");
        Ok(rx)
    }

    fn stop(&mut self) -> PresenterResult<()> {
        self.sender.lock().unwrap_or_else(|p| p.into_inner()).take();
        let state_result = self.pipeline.set_state(gst::State::Null);
        if let Some(bus) = self.pipeline.bus() {
            bus.unset_sync_handler();
        }

        let dropped = self.dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            tracing::info!(track = %self.kind, dropped, "Source dropped samples on a full queue");
        }

        if let Some(message) = self.error.lock().unwrap_or_else(|p| p.into_inner()).take() {
            return Err(PresenterError::capture(message));
        }
        state_result.map_err(|e| {
            PresenterError::capture(format!("Failed to stop {} pipeline: {e:?}", self.kind))
        })?;
        Ok(())
    }

    fn dropped_samples(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for GstSource {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// Encoder settings for one sink.
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderSettings {
    H264 {
        bitrate_kbps: u32,
        keyframe_interval: u32,
        high_profile: bool,
    },
    Aac {
        bitrate: u32,
        sample_rate: u32,
        channels: u32,
    },
}

impl EncoderSettings {
    pub fn for_track(kind: TrackKind, format: &SourceFormat, defaults: &RecordingDefaults) -> Self {
        match kind {
            TrackKind::Audio | TrackKind::Input => EncoderSettings::Aac {
                bitrate: defaults.audio_bitrate,
                sample_rate: defaults.audio_sample_rate,
                channels: defaults.audio_channels,
            },
            TrackKind::Screen => EncoderSettings::H264 {
                bitrate_kbps: defaults.screen_bitrate_kbps,
                keyframe_interval: keyframe_interval(format.framerate.unwrap_or(defaults.screen_fps)),
                high_profile: true,
            },
            TrackKind::Webcam => EncoderSettings::H264 {
                bitrate_kbps: defaults.webcam_bitrate_kbps,
                keyframe_interval: keyframe_interval(format.framerate.unwrap_or(30)),
                high_profile: false,
            },
        }
    }
}

/// One keyframe every two seconds.
fn keyframe_interval(fps: u32) -> u32 {
    fps.saturating_mul(2).max(2)
}

/// AAC encoders in order of preference.
pub const AAC_ENCODERS: [&str; 4] = ["fdkaacenc", "avenc_aac", "voaacenc", "faac"];

fn find_aac_encoder() -> PresenterResult<gst::Element> {
    AAC_ENCODERS
        .iter()
        .find_map(|name| gst::ElementFactory::make(name).build().ok())
        .ok_or_else(|| {
            PresenterError::encoder_setup(format!(
                "No AAC encoder available (tried {})",
                AAC_ENCODERS.join(", ")
            ))
        })
}

fn make(factory: &str) -> PresenterResult<gst::Element> {
    gst::ElementFactory::make(factory).build().map_err(|e| {
        PresenterError::encoder_setup(format!("Failed to create {factory}: {e}"))
    })
}

/// Encoder + muxer pipeline fed through an appsrc.
pub struct GstSink {
    kind: TrackKind,
    path: PathBuf,
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    queue_depth: u64,
    ready_limit_bytes: u64,
    finalize_timeout: Duration,
}

impl GstSink {
    pub fn new(
        kind: TrackKind,
        path: &Path,
        settings: &EncoderSettings,
        defaults: &RecordingDefaults,
    ) -> PresenterResult<Self> {
        init_gstreamer()?;

        let pipeline = gst::Pipeline::with_name(&format!("{kind}-writer"));
        let appsrc = gst_app::AppSrc::builder()
            .name("src")
            .format(gst::Format::Time)
            .is_live(true)
            .build();

        let mut chain: Vec<gst::Element> = vec![appsrc.clone().upcast()];
        match settings {
            EncoderSettings::H264 {
                bitrate_kbps,
                keyframe_interval,
                high_profile,
            } => {
                let encoder = make("x264enc")?;
                encoder.set_property("bitrate", *bitrate_kbps);
                encoder.set_property("key-int-max", *keyframe_interval);
                encoder.set_property_from_str("speed-preset", "veryfast");
                encoder.set_property_from_str("tune", "zerolatency");

                let profile = gst::ElementFactory::make("capsfilter")
                    .property(
                        "caps",
                        gst::Caps::builder("video/x-h264")
                            .field("profile", if *high_profile { "high" } else { "main" })
                            .build(),
                    )
                    .build()
                    .map_err(|e| PresenterError::encoder_setup(format!("capsfilter: {e}")))?;

                chain.extend([
                    make("videoconvert")?,
                    encoder,
                    profile,
                    make("h264parse")?,
                    make("qtmux")?,
                ]);
            }
            EncoderSettings::Aac {
                bitrate,
                sample_rate,
                channels,
            } => {
                let encoder = find_aac_encoder()?;
                if encoder.find_property("bitrate").is_some() {
                    encoder.set_property_from_str("bitrate", &bitrate.to_string());
                }
                let raw = gst::ElementFactory::make("capsfilter")
                    .property(
                        "caps",
                        gst::Caps::builder("audio/x-raw")
                            .field("rate", *sample_rate as i32)
                            .field("channels", *channels as i32)
                            .build(),
                    )
                    .build()
                    .map_err(|e| PresenterError::encoder_setup(format!("capsfilter: {e}")))?;

                chain.extend([
                    make("audioconvert")?,
                    make("audioresample")?,
                    raw,
                    encoder,
                    make("mp4mux")?,
                ]);
            }
        }

        let filesink = gst::ElementFactory::make("filesink")
            .property("location", path.to_string_lossy().to_string())
            .build()
            .map_err(|e| PresenterError::encoder_setup(format!("filesink: {e}")))?;
        chain.push(filesink);

        pipeline.add_many(&chain).map_err(|e| {
            PresenterError::encoder_setup(format!("Failed to assemble {kind} writer: {e}"))
        })?;
        gst::Element::link_many(&chain).map_err(|e| {
            PresenterError::encoder_setup(format!("Failed to link {kind} writer: {e}"))
        })?;

        Ok(Self {
            kind,
            path: path.to_path_buf(),
            pipeline,
            appsrc,
            queue_depth: u64::from(defaults.queue_depth.max(1)),
            ready_limit_bytes: u64::MAX,
            finalize_timeout: Duration::from_secs(defaults.finalize_timeout_secs.max(1)),
        })
    }

    fn to_buffer(sample: Sample) -> PresenterResult<gst::Buffer> {
        let mut buffer = match sample.payload {
            SamplePayload::Gst(gst_sample) => gst_sample
                .buffer_owned()
                .ok_or_else(|| PresenterError::capture("Sample carries no buffer"))?,
            SamplePayload::Bytes(bytes) => gst::Buffer::from_mut_slice(bytes),
        };
        let pts = gst::ClockTime::from_nseconds(sample.pts.as_nanos() as u64);
        let buffer_mut = buffer.make_mut();
        buffer_mut.set_pts(pts);
        // Upstream DTS is in the source's running time, not the track's.
        buffer_mut.set_dts(gst::ClockTime::NONE);
        Ok(buffer)
    }
}

impl MediaSink for GstSink {
    fn start_timeline(&mut self, _anchor: Duration, first: &Sample) -> PresenterResult<()> {
        let SamplePayload::Gst(gst_sample) = &first.payload else {
            return Err(PresenterError::encoder_setup(
                "GStreamer writer needs samples with caps",
            ));
        };
        let caps = gst_sample
            .caps()
            .map(|caps| caps.to_owned())
            .ok_or_else(|| PresenterError::encoder_setup("First sample has no caps"))?;
        tracing::debug!(track = %self.kind, %caps, "Writer caps from first sample");
        self.appsrc.set_caps(Some(&caps));

        let first_size = first.payload.size().max(1) as u64;
        self.ready_limit_bytes = self.queue_depth.saturating_mul(first_size);

        self.pipeline.set_state(gst::State::Playing).map_err(|e| {
            PresenterError::encoder_setup(format!(
                "Failed to start {} writer for {}: {e:?}",
                self.kind,
                self.path.display()
            ))
        })?;
        Ok(())
    }

    fn is_ready_for_more(&self) -> bool {
        self.appsrc.current_level_bytes() < self.ready_limit_bytes
    }

    fn append(&mut self, sample: Sample) -> PresenterResult<()> {
        let buffer = Self::to_buffer(sample)?;
        self.appsrc.push_buffer(buffer).map_err(|e| {
            PresenterError::capture(format!("{} writer rejected buffer: {e:?}", self.kind))
        })?;
        Ok(())
    }

    fn finalize(self: Box<Self>) -> PresenterResult<()> {
        if let Err(e) = self.appsrc.end_of_stream() {
            tracing::warn!(track = %self.kind, error = ?e, "Failed to send EOS; output may be truncated");
        }
        let drained = drain_bus(&self.pipeline, self.kind, self.finalize_timeout);
        let stopped = self.pipeline.set_state(gst::State::Null);

        drained?;
        stopped.map_err(|e| {
            PresenterError::finalize(format!("Failed to stop {} writer: {e:?}", self.kind))
        })?;
        Ok(())
    }

    fn discard(self: Box<Self>) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// Wait for EOS to reach the end of `pipeline`, bounded by `deadline`.
fn drain_bus(pipeline: &gst::Pipeline, kind: TrackKind, deadline: Duration) -> PresenterResult<()> {
    let Some(bus) = pipeline.bus() else {
        return Err(PresenterError::finalize(format!("{kind} writer has no bus")));
    };

    let start = Instant::now();
    loop {
        let Some(remaining) = deadline.checked_sub(start.elapsed()) else {
            break;
        };
        let timeout = gst::ClockTime::from_nseconds(remaining.as_nanos() as u64);
        match bus.timed_pop(timeout) {
            Some(msg) => match msg.view() {
                gst::MessageView::Eos(_) => {
                    tracing::debug!(track = %kind, "EOS received; writer drained");
                    return Ok(());
                }
                gst::MessageView::Error(e) => {
                    return Err(PresenterError::finalize(format!(
                        "{kind} writer error during drain: {}",
                        e.error()
                    )));
                }
                _ => {}
            },
            None => break,
        }
    }

    Err(PresenterError::finalize(format!(
        "{kind} writer did not drain within {}s",
        deadline.as_secs()
    )))
}

/// `ximagesrc` region properties for one monitor, inclusive end coordinates.
pub(crate) fn x11_capture_region_fragment(
    capture_region: Option<(i32, i32, u32, u32)>,
) -> PresenterResult<String> {
    let Some((x, y, width, height)) = capture_region else {
        return Ok(String::new());
    };

    if width == 0 || height == 0 {
        return Err(PresenterError::device_unavailable(format!(
            "Invalid X11 capture region {width}x{height} at ({x},{y})"
        )));
    }

    let width_i32 = i32::try_from(width).map_err(|_| {
        PresenterError::device_unavailable(format!("X11 capture width too large: {width}"))
    })?;
    let height_i32 = i32::try_from(height).map_err(|_| {
        PresenterError::device_unavailable(format!("X11 capture height too large: {height}"))
    })?;

    let endx = x
        .checked_add(width_i32 - 1)
        .ok_or_else(|| PresenterError::device_unavailable("X11 capture region x-range overflow"))?;
    let endy = y
        .checked_add(height_i32 - 1)
        .ok_or_else(|| PresenterError::device_unavailable("X11 capture region y-range overflow"))?;

    Ok(format!(" startx={x} starty={y} endx={endx} endy={endy}"))
}

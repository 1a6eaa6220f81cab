//! GStreamer capture backend.
//!
//! Screen capture uses the platform's screen source element; webcam and
//! microphone are discovered through the GStreamer device monitor.

use std::path::Path;

use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;

use presenter_common::config::RecordingDefaults;
use presenter_common::error::{PresenterError, PresenterResult};
use presenter_input_tracker::{detect_global_listener, InputListener, LocalEventPort};
use presenter_recording_model::layout::TrackKind;

use crate::backend::CaptureBackend;
use crate::pipeline::{init_gstreamer, EncoderSettings, GstSink, GstSource};
use crate::source::{CaptureSource, SourceFormat};
use crate::writer::MediaSink;

/// Production backend built on GStreamer.
#[derive(Default)]
pub struct GstBackend {
    local_port: LocalEventPort,
}

impl GstBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Port the host application forwards its own input events through.
    pub fn local_port(&self) -> &LocalEventPort {
        &self.local_port
    }
}

impl CaptureBackend for GstBackend {
    fn name(&self) -> &str {
        "gstreamer"
    }

    fn create_source(
        &self,
        kind: TrackKind,
        defaults: &RecordingDefaults,
    ) -> PresenterResult<Box<dyn CaptureSource>> {
        init_gstreamer()?;
        let source = match kind {
            TrackKind::Screen => screen_source(defaults)?,
            TrackKind::Webcam => webcam_source(defaults)?,
            TrackKind::Audio => microphone_source(defaults)?,
            TrackKind::Input => {
                return Err(PresenterError::unsupported(
                    "The input track has no media source",
                ))
            }
        };
        Ok(Box::new(source))
    }

    fn create_sink(
        &self,
        kind: TrackKind,
        path: &Path,
        format: &SourceFormat,
        defaults: &RecordingDefaults,
    ) -> PresenterResult<Box<dyn MediaSink>> {
        if !kind.is_media() {
            return Err(PresenterError::unsupported("The input track has no encoder"));
        }
        let settings = EncoderSettings::for_track(kind, format, defaults);
        tracing::debug!(track = %kind, ?settings, path = %path.display(), "Creating writer");
        Ok(Box::new(GstSink::new(kind, path, &settings, defaults)?))
    }

    fn global_listener(&self) -> Box<dyn InputListener> {
        detect_global_listener()
    }

    fn local_listener(&self) -> Box<dyn InputListener> {
        Box::new(self.local_port.listener())
    }
}

fn appsink_fragment(defaults: &RecordingDefaults) -> String {
    format!(
        "appsink name=sink max-buffers={} drop=true sync=false",
        defaults.queue_depth.max(1)
    )
}

/// Scale and convert to raw I420 at the encoder size.
fn screen_caps_fragment(width: u32, height: u32, fps: u32) -> String {
    format!(
        "videoconvert ! videoscale ! videorate ! \
         video/x-raw,format=I420,width={width},height={height},framerate={fps}/1"
    )
}

/// Width and height of the first structure in fixed video caps.
#[cfg(any(target_os = "macos", target_os = "windows", test))]
pub(crate) fn frame_size(caps: &gst::CapsRef) -> Option<(u32, u32)> {
    let s = caps.structure(0)?;
    let width = u32::try_from(s.get::<i32>("width").ok()?).ok()?;
    let height = u32::try_from(s.get::<i32>("height").ok()?).ok()?;
    (width > 0 && height > 0).then_some((width, height))
}

/// Pull one frame from `src` and report its size in physical pixels.
#[cfg(any(target_os = "macos", target_os = "windows"))]
fn native_screen_size(src: &str) -> PresenterResult<(u32, u32)> {
    let launch = format!("{src} num-buffers=1 ! appsink name=first-frame sync=false");
    let pipeline = gst::parse::launch(&launch)
        .map_err(|e| {
            PresenterError::device_unavailable(format!("Failed to open screen source: {e}"))
        })?
        .dynamic_cast::<gst::Pipeline>()
        .map_err(|_| PresenterError::capture("Launch string did not produce a pipeline"))?;
    let appsink = pipeline
        .by_name("first-frame")
        .and_then(|e| e.downcast::<gst_app::AppSink>().ok())
        .ok_or_else(|| PresenterError::capture("Screen size pipeline has no appsink"))?;

    pipeline.set_state(gst::State::Playing).map_err(|e| {
        PresenterError::device_unavailable(format!("Screen source could not start: {e:?}"))
    })?;
    let sample = appsink.try_pull_sample(gst::ClockTime::from_seconds(5));
    let _ = pipeline.set_state(gst::State::Null);

    sample
        .as_ref()
        .and_then(|sample| sample.caps())
        .and_then(frame_size)
        .ok_or_else(|| PresenterError::device_unavailable("Screen source delivered no frame"))
}

/// Physical screen size from `src`, rounded up to the encoder alignment.
#[cfg(any(target_os = "macos", target_os = "windows"))]
fn encoder_screen_size(src: &str) -> PresenterResult<(u32, u32)> {
    use presenter_platform_core::{round_up_to_multiple, ENCODER_ALIGNMENT};

    let (width, height) = native_screen_size(src)?;
    let encoded = (
        round_up_to_multiple(width, ENCODER_ALIGNMENT),
        round_up_to_multiple(height, ENCODER_ALIGNMENT),
    );
    tracing::info!(
        physical = %format!("{width}x{height}"),
        encoded = %format!("{}x{}", encoded.0, encoded.1),
        "Screen capture configured"
    );
    Ok(encoded)
}

#[cfg(target_os = "linux")]
fn screen_source(defaults: &RecordingDefaults) -> PresenterResult<GstSource> {
    use presenter_platform_core::primary_monitor;
    use presenter_platform_linux::{detect_display_server, detect_monitors, DisplayServer};

    use crate::pipeline::x11_capture_region_fragment;

    let display_server = detect_display_server();
    if display_server != DisplayServer::X11 {
        return Err(PresenterError::device_unavailable(format!(
            "Screen capture needs an X11 session (detected {display_server:?})"
        )));
    }

    let monitors = detect_monitors()?;
    let monitor = primary_monitor(&monitors)
        .ok_or_else(|| PresenterError::device_unavailable("No monitor to capture"))?;
    let (width, height) = monitor.encoder_dimensions();
    let region = x11_capture_region_fragment(Some((
        monitor.x,
        monitor.y,
        monitor.width,
        monitor.height,
    )))?;
    let fps = defaults.screen_fps.max(1);

    tracing::info!(
        monitor = %monitor.name,
        physical = %format!("{}x{}", monitor.width, monitor.height),
        encoded = %format!("{width}x{height}"),
        "Screen capture configured"
    );

    let launch = format!(
        "ximagesrc use-damage=false show-pointer={show}{region} ! queue max-size-buffers=8 leaky=downstream ! {caps} ! {sink}",
        show = defaults.show_cursor,
        caps = screen_caps_fragment(width, height, fps),
        sink = appsink_fragment(defaults),
    );
    GstSource::from_launch(
        TrackKind::Screen,
        &launch,
        SourceFormat::video(monitor.name.clone(), width, height, fps),
        defaults.queue_depth,
    )
}

#[cfg(target_os = "macos")]
fn screen_source(defaults: &RecordingDefaults) -> PresenterResult<GstSource> {
    let fps = defaults.screen_fps.max(1);
    let src = format!(
        "avfvideosrc capture-screen=true capture-screen-cursor={}",
        defaults.show_cursor
    );
    let (width, height) = encoder_screen_size(&src)?;
    let launch = format!(
        "{src} ! {caps} ! {sink}",
        caps = screen_caps_fragment(width, height, fps),
        sink = appsink_fragment(defaults),
    );
    let format = SourceFormat::video("main display", width, height, fps);
    GstSource::from_launch(TrackKind::Screen, &launch, format, defaults.queue_depth)
}

#[cfg(target_os = "windows")]
fn screen_source(defaults: &RecordingDefaults) -> PresenterResult<GstSource> {
    let fps = defaults.screen_fps.max(1);
    let src = format!(
        "d3d11screencapturesrc monitor-index=0 show-cursor={}",
        defaults.show_cursor
    );
    let (width, height) = encoder_screen_size(&src)?;
    let launch = format!(
        "{src} ! queue max-size-buffers=8 leaky=downstream ! {caps} ! {sink}",
        caps = screen_caps_fragment(width, height, fps),
        sink = appsink_fragment(defaults),
    );
    let format = SourceFormat::video("monitor 0", width, height, fps);
    GstSource::from_launch(TrackKind::Screen, &launch, format, defaults.queue_depth)
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn screen_source(_defaults: &RecordingDefaults) -> PresenterResult<GstSource> {
    Err(PresenterError::unsupported(
        "Screen capture is not available on this platform",
    ))
}

/// A capture device as reported by the device monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDeviceInfo {
    pub class: String,
    pub name: String,
    pub is_default: bool,
}

/// Webcams and microphones a session would choose from.
pub fn list_capture_devices() -> PresenterResult<Vec<CaptureDeviceInfo>> {
    init_gstreamer()?;
    let mut found = Vec::new();
    for class in ["Video/Source", "Audio/Source"] {
        for device in enumerate_devices(class)? {
            found.push(CaptureDeviceInfo {
                class: class.to_string(),
                name: device.display_name().to_string(),
                is_default: is_default_device(&device),
            });
        }
    }
    Ok(found)
}

fn enumerate_devices(class: &str) -> PresenterResult<Vec<gst::Device>> {
    let monitor = gst::DeviceMonitor::new();
    monitor.add_filter(Some(class), None);
    monitor.start().map_err(|e| {
        PresenterError::device_unavailable(format!("Device monitor for {class} failed: {e}"))
    })?;
    let devices: Vec<gst::Device> = monitor
        .devices()
        .into_iter()
        .filter(|device| !is_monitor_of_output(device))
        .collect();
    monitor.stop();
    tracing::debug!(class, count = devices.len(), "Enumerated capture devices");
    Ok(devices)
}

/// Find a device of `class`, preferring the system default.
fn find_device(class: &str) -> PresenterResult<gst::Device> {
    let candidates = enumerate_devices(class)?;
    candidates
        .iter()
        .find(|device| is_default_device(device))
        .or_else(|| candidates.first())
        .cloned()
        .ok_or_else(|| PresenterError::device_unavailable(format!("No {class} device found")))
}

fn is_default_device(device: &gst::Device) -> bool {
    device
        .properties()
        .and_then(|p| p.get::<bool>("is-default").ok())
        .unwrap_or(false)
}

/// PulseAudio/PipeWire expose loopbacks of outputs as audio sources.
fn is_monitor_of_output(device: &gst::Device) -> bool {
    device
        .properties()
        .and_then(|p| p.get::<String>("device.class").ok())
        .is_some_and(|class| class == "monitor")
}

/// The caps structure with the largest frame area, raw preferred on ties.
pub(crate) fn best_video_structure(caps: &gst::CapsRef) -> Option<gst::Structure> {
    caps.iter()
        .filter(|s| s.has_name("video/x-raw") || s.has_name("image/jpeg"))
        .filter_map(|s| {
            let width = s.get::<i32>("width").ok()?;
            let height = s.get::<i32>("height").ok()?;
            let area = i64::from(width) * i64::from(height);
            Some(((area, s.has_name("video/x-raw")), s.to_owned()))
        })
        .max_by_key(|(key, _)| *key)
        .map(|(_, s)| s)
}

fn webcam_source(defaults: &RecordingDefaults) -> PresenterResult<GstSource> {
    let device = find_device("Video/Source")?;
    let name = device.display_name().to_string();

    let caps = device.caps();
    let best = caps.as_ref().and_then(|caps| best_video_structure(caps));
    let format = match &best {
        Some(s) => SourceFormat::video(
            name.clone(),
            s.get::<i32>("width").map_or(0, |w| w as u32),
            s.get::<i32>("height").map_or(0, |h| h as u32),
            s.get::<gst::Fraction>("framerate")
                .map_or(30, |f| (f.numer() / f.denom().max(1)) as u32),
        ),
        None => SourceFormat {
            device: name.clone(),
            ..SourceFormat::default()
        },
    };
    tracing::info!(device = %name, ?format, "Webcam selected");

    let pipeline = gst::Pipeline::with_name("webcam-capture");
    let src = device.create_element(Some("webcam-src")).map_err(|e| {
        PresenterError::device_unavailable(format!("Failed to open webcam {name}: {e}"))
    })?;
    let mut chain = vec![src];

    if let Some(structure) = best {
        let is_jpeg = structure.has_name("image/jpeg");
        let filter = gst::ElementFactory::make("capsfilter")
            .property("caps", gst::Caps::builder_full().structure(structure).build())
            .build()
            .map_err(|e| PresenterError::capture(format!("capsfilter: {e}")))?;
        chain.push(filter);
        if is_jpeg {
            chain.push(element("jpegdec")?);
        }
    }
    chain.push(element("videoconvert")?);
    chain.push(appsink(defaults).upcast());

    assemble(&pipeline, &chain, TrackKind::Webcam)?;
    GstSource::new(TrackKind::Webcam, pipeline, format, defaults.queue_depth)
}

fn microphone_source(defaults: &RecordingDefaults) -> PresenterResult<GstSource> {
    let device = find_device("Audio/Source")?;
    let name = device.display_name().to_string();

    let native = device.caps().and_then(|caps| {
        let s = caps.structure(0)?;
        Some((s.get::<i32>("rate").ok()?, s.get::<i32>("channels").ok()?))
    });
    let format = match native {
        Some((rate, channels)) => SourceFormat::audio(name.clone(), rate as u32, channels as u32),
        None => SourceFormat {
            device: name.clone(),
            ..SourceFormat::default()
        },
    };
    tracing::info!(device = %name, ?format, "Microphone selected");

    let pipeline = gst::Pipeline::with_name("audio-capture");
    let src = device.create_element(Some("audio-src")).map_err(|e| {
        PresenterError::device_unavailable(format!("Failed to open microphone {name}: {e}"))
    })?;
    let chain = vec![src, element("audioconvert")?, appsink(defaults).upcast()];

    assemble(&pipeline, &chain, TrackKind::Audio)?;
    GstSource::new(TrackKind::Audio, pipeline, format, defaults.queue_depth)
}

fn element(factory: &str) -> PresenterResult<gst::Element> {
    gst::ElementFactory::make(factory)
        .build()
        .map_err(|e| PresenterError::capture(format!("Failed to create {factory}: {e}")))
}

fn appsink(defaults: &RecordingDefaults) -> gst_app::AppSink {
    gst_app::AppSink::builder()
        .name("sink")
        .max_buffers(defaults.queue_depth.max(1))
        .drop(true)
        .sync(false)
        .build()
}

fn assemble(pipeline: &gst::Pipeline, chain: &[gst::Element], kind: TrackKind) -> PresenterResult<()> {
    pipeline
        .add_many(chain)
        .map_err(|e| PresenterError::capture(format!("Failed to assemble {kind} pipeline: {e}")))?;
    gst::Element::link_many(chain)
        .map_err(|e| PresenterError::capture(format!("Failed to link {kind} pipeline: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn largest_frame_wins_and_raw_breaks_ties() {
        gst::init().unwrap();
        let caps: gst::Caps = "video/x-raw,width=640,height=480; \
                               image/jpeg,width=1920,height=1080; \
                               video/x-raw,width=1920,height=1080; \
                               video/x-raw,width=1280,height=720"
            .parse()
            .unwrap();

        let best = best_video_structure(&caps).unwrap();
        assert!(best.has_name("video/x-raw"));
        assert_eq!(best.get::<i32>("width").unwrap(), 1920);
    }

    #[test]
    fn jpeg_only_camera_still_selects_a_format() {
        gst::init().unwrap();
        let caps: gst::Caps = "image/jpeg,width=1280,height=720; image/jpeg,width=640,height=360"
            .parse()
            .unwrap();
        let best = best_video_structure(&caps).unwrap();
        assert!(best.has_name("image/jpeg"));
        assert_eq!(best.get::<i32>("height").unwrap(), 720);
    }

    #[test]
    fn screen_caps_pin_the_encoder_size() {
        let fragment = screen_caps_fragment(3024, 1968, 60);
        assert!(fragment.starts_with("videoconvert ! videoscale ! videorate ! "));
        assert!(fragment.ends_with("video/x-raw,format=I420,width=3024,height=1968,framerate=60/1"));
    }

    #[test]
    fn frame_size_reads_fixed_caps_only() {
        gst::init().unwrap();
        let caps: gst::Caps = "video/x-raw,format=BGRA,width=3024,height=1964".parse().unwrap();
        assert_eq!(frame_size(&caps), Some((3024, 1964)));

        let ranged: gst::Caps = "video/x-raw,width=[ 1, 4096 ],height=1080".parse().unwrap();
        assert_eq!(frame_size(&ranged), None);
        let empty: gst::Caps = "video/x-raw,width=0,height=1080".parse().unwrap();
        assert_eq!(frame_size(&empty), None);
    }

    #[test]
    fn structures_without_fixed_size_are_ignored() {
        gst::init().unwrap();
        let caps: gst::Caps = "video/x-raw,width=[ 1, 4096 ],height=[ 1, 2160 ]"
            .parse()
            .unwrap();
        assert!(best_video_structure(&caps).is_none());
    }
}

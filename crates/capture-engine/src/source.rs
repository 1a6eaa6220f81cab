//! Capture sources: one device, one stream of timestamped samples.

use std::fmt;
use std::time::Duration;

use gstreamer as gst;
use tokio::sync::mpsc;

use presenter_common::error::PresenterResult;
use presenter_platform_core::Capability;
use presenter_recording_model::layout::TrackKind;

/// Media payload of one sample.
pub enum SamplePayload {
    /// A buffer with caps, as delivered by a GStreamer appsink.
    Gst(gst::Sample),
    /// Raw bytes, used by the stub backend.
    Bytes(Vec<u8>),
}

impl SamplePayload {
    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        match self {
            SamplePayload::Gst(sample) => sample.buffer().map_or(0, |b| b.size()),
            SamplePayload::Bytes(bytes) => bytes.len(),
        }
    }
}

impl fmt::Debug for SamplePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplePayload::Gst(_) => write!(f, "Gst({} bytes)", self.size()),
            SamplePayload::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
        }
    }
}

/// One media buffer with its presentation timestamp in the source's clock.
#[derive(Debug)]
pub struct Sample {
    pub pts: Duration,
    pub payload: SamplePayload,
}

impl Sample {
    pub fn new(pts: Duration, payload: SamplePayload) -> Self {
        Self { pts, payload }
    }
}

/// Receiving end of a running source. Closed when the source stops or fails.
pub type SampleStream = mpsc::Receiver<Sample>;

/// Format a source negotiated with its device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceFormat {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub framerate: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    /// Human-readable device description for logs.
    pub device: String,
}

impl SourceFormat {
    pub fn video(device: impl Into<String>, width: u32, height: u32, framerate: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            framerate: Some(framerate),
            device: device.into(),
            ..Self::default()
        }
    }

    pub fn audio(device: impl Into<String>, sample_rate: u32, channels: u32) -> Self {
        Self {
            sample_rate: Some(sample_rate),
            channels: Some(channels),
            device: device.into(),
            ..Self::default()
        }
    }
}

/// A display, camera, or microphone producing samples.
///
/// Sources are created fresh for every session. `configure` opens the device
/// at its best native format; `start` begins delivery on the device's own
/// thread and hands back the stream; `stop` tears the device down and reports
/// any error the device hit while running.
pub trait CaptureSource: Send {
    fn kind(&self) -> TrackKind;

    /// Capability that must be authorized before the device is opened.
    fn capability(&self) -> Capability {
        capability_for(self.kind())
    }

    fn configure(&mut self) -> PresenterResult<SourceFormat>;

    fn start(&mut self) -> PresenterResult<SampleStream>;

    fn stop(&mut self) -> PresenterResult<()>;

    /// Samples discarded because the stream was full.
    fn dropped_samples(&self) -> u64 {
        0
    }
}

/// Capability gating each track kind.
pub fn capability_for(kind: TrackKind) -> Capability {
    match kind {
        TrackKind::Screen => Capability::ScreenRecording,
        TrackKind::Webcam => Capability::Camera,
        TrackKind::Audio => Capability::Microphone,
        TrackKind::Input => Capability::InputMonitoring,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_track_kind_has_a_distinct_capability() {
        let caps: std::collections::HashSet<_> =
            TrackKind::ALL.iter().map(|k| capability_for(*k)).collect();
        assert_eq!(caps.len(), TrackKind::ALL.len());
    }

    #[test]
    fn byte_payload_reports_size() {
        let sample = Sample::new(Duration::ZERO, SamplePayload::Bytes(vec![0; 12]));
        assert_eq!(sample.payload.size(), 12);
        assert_eq!(format!("{:?}", sample.payload), "Bytes(12 bytes)");
    }
}

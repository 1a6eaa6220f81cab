use std::path::Path;
use std::sync::Arc;

use presenter_common::config::RecordingDefaults;
use presenter_common::error::PresenterResult;
use presenter_input_tracker::InputListener;
use presenter_recording_model::layout::TrackKind;

use crate::source::{CaptureSource, SourceFormat};
use crate::writer::MediaSink;

/// Factory for the per-session capture objects.
///
/// Every session asks for fresh sources, sinks and listeners; nothing is
/// reused between sessions.
pub trait CaptureBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Create the device source for a media track.
    fn create_source(
        &self,
        kind: TrackKind,
        defaults: &RecordingDefaults,
    ) -> PresenterResult<Box<dyn CaptureSource>>;

    /// Create the encoder+muxer writing `path`.
    fn create_sink(
        &self,
        kind: TrackKind,
        path: &Path,
        format: &SourceFormat,
        defaults: &RecordingDefaults,
    ) -> PresenterResult<Box<dyn MediaSink>>;

    /// System-wide input listener.
    fn global_listener(&self) -> Box<dyn InputListener>;

    /// Listener for events the host application forwards.
    fn local_listener(&self) -> Box<dyn InputListener>;
}

pub mod gst;

pub use self::gst::{list_capture_devices, CaptureDeviceInfo, GstBackend};

/// The production backend.
pub fn default_backend() -> Arc<dyn CaptureBackend> {
    Arc::new(GstBackend::new())
}

//! Presenter Capture Engine
//!
//! Records a presenter session as four independent tracks: screen video,
//! webcam video, microphone audio and input events. Each track owns its own
//! source and writer and fails on its own; the orchestrator only fans out
//! start and stop.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────── RecordingOrchestrator ────────────────────┐
//! │                      RecordingSession                         │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌───────────────┐  │
//! │  │ screen   │  │ webcam   │  │ audio    │  │ input         │  │
//! │  │ Source → │  │ Source → │  │ Source → │  │ Listeners →   │  │
//! │  │ Writer   │  │ Writer   │  │ Writer   │  │ EventLogger   │  │
//! │  └────┬─────┘  └────┬─────┘  └────┬─────┘  └──────┬────────┘  │
//! │       ▼             ▼             ▼               ▼           │
//! │  screen.mov    webcam.mov     audio.m4a      input.jsonl      │
//! └───────────────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod orchestrator;
pub mod pipeline;
pub mod session;
pub mod source;
pub mod stub;
pub mod track;
pub mod writer;

pub use backend::{
    default_backend, list_capture_devices, CaptureBackend, CaptureDeviceInfo, GstBackend,
};
pub use orchestrator::RecordingOrchestrator;
pub use session::{allocate_session_dir, RecordingSession, SessionReport, SessionStatus};
pub use source::{CaptureSource, Sample, SamplePayload, SampleStream, SourceFormat};
pub use stub::{FileSink, StubCaptureBackend, StubSource, StubTrack};
pub use track::{FailureReason, TrackHandle, TrackObserver, TrackOutput, TrackStatus};
pub use writer::{AppendOutcome, MediaSink, TrackWriter, WriterSummary};

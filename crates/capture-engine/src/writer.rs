//! Track writers: one encoder+muxer bound to one output file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use presenter_common::error::PresenterResult;
use presenter_recording_model::layout::TrackKind;

use crate::source::Sample;

/// Encoder and container behind a [`TrackWriter`].
///
/// A sink must not touch its output file before `start_timeline` is called.
/// `finalize` and `discard` consume the sink and may block.
pub trait MediaSink: Send {
    /// Open the output and begin the timeline. `first` is the sample that
    /// anchors it; sinks use it to learn the stream format.
    fn start_timeline(&mut self, anchor: Duration, first: &Sample) -> PresenterResult<()>;

    /// Whether the encoder can take another sample without queueing up.
    fn is_ready_for_more(&self) -> bool;

    /// Encode one sample. `sample.pts` is already relative to the anchor.
    fn append(&mut self, sample: Sample) -> PresenterResult<()>;

    /// Signal end of stream and wait for the container to be written.
    fn finalize(self: Box<Self>) -> PresenterResult<()>;

    /// Tear down a sink whose timeline never started.
    fn discard(self: Box<Self>);
}

/// Whether an accepted sample reached the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Written,
    /// Encoder not ready; the sample was discarded.
    Dropped,
}

/// What a finished writer left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterSummary {
    /// Output file, `None` when no sample ever arrived.
    pub path: Option<PathBuf>,
    pub anchor: Option<Duration>,
    pub samples_written: u64,
    pub samples_dropped: u64,
}

/// Writes one track's samples, anchoring the timeline at the first one.
///
/// Samples are written in arrival order. When the sink is not ready the
/// sample is dropped rather than buffered.
pub struct TrackWriter {
    kind: TrackKind,
    path: PathBuf,
    sink: Box<dyn MediaSink>,
    anchor: Option<Duration>,
    samples_written: u64,
    samples_dropped: u64,
}

impl TrackWriter {
    pub fn new(kind: TrackKind, path: impl Into<PathBuf>, sink: Box<dyn MediaSink>) -> Self {
        Self {
            kind,
            path: path.into(),
            sink,
            anchor: None,
            samples_written: 0,
            samples_dropped: 0,
        }
    }

    pub fn accept(&mut self, sample: Sample) -> PresenterResult<AppendOutcome> {
        let anchor = match self.anchor {
            Some(anchor) => anchor,
            None => {
                self.sink.start_timeline(sample.pts, &sample)?;
                self.anchor = Some(sample.pts);
                tracing::debug!(track = %self.kind, anchor = ?sample.pts, "Timeline started");
                sample.pts
            }
        };

        if !self.sink.is_ready_for_more() {
            self.samples_dropped += 1;
            if self.samples_dropped.is_power_of_two() {
                tracing::debug!(
                    track = %self.kind,
                    dropped = self.samples_dropped,
                    "Encoder not ready; dropping samples"
                );
            }
            return Ok(AppendOutcome::Dropped);
        }

        let pts = sample.pts.saturating_sub(anchor);
        self.sink.append(Sample::new(pts, sample.payload))?;
        self.samples_written += 1;
        Ok(AppendOutcome::Written)
    }

    pub fn anchor(&self) -> Option<Duration> {
        self.anchor
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    pub fn samples_dropped(&self) -> u64 {
        self.samples_dropped
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Finalize the output. Blocks until the container is written.
    ///
    /// A writer that never received a sample produces no file.
    pub fn finish(self) -> PresenterResult<WriterSummary> {
        let Self {
            kind,
            path,
            sink,
            anchor,
            samples_written,
            samples_dropped,
        } = self;

        if anchor.is_none() {
            sink.discard();
            if path.exists() {
                if let Err(e) = std::fs::remove_file(&path) {
                    tracing::warn!(track = %kind, error = %e, "Failed to remove empty output");
                }
            }
            tracing::info!(track = %kind, "No samples captured; no output written");
            return Ok(WriterSummary {
                path: None,
                anchor: None,
                samples_written: 0,
                samples_dropped: 0,
            });
        }

        sink.finalize()?;
        tracing::info!(
            track = %kind,
            path = %path.display(),
            samples_written,
            samples_dropped,
            "Track finalized"
        );
        Ok(WriterSummary {
            path: Some(path),
            anchor,
            samples_written,
            samples_dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SamplePayload;
    use crate::stub::FileSink;

    fn bytes(pts_ms: u64, len: usize) -> Sample {
        Sample::new(
            Duration::from_millis(pts_ms),
            SamplePayload::Bytes(vec![7; len]),
        )
    }

    #[test]
    fn timeline_is_anchored_at_first_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screen.mov");
        let sink = FileSink::new(&path);
        let written = sink.written_pts();
        let mut writer = TrackWriter::new(TrackKind::Screen, &path, Box::new(sink));

        for pts in [5_000, 5_016, 5_033] {
            assert_eq!(writer.accept(bytes(pts, 4)).unwrap(), AppendOutcome::Written);
        }
        assert_eq!(writer.anchor(), Some(Duration::from_millis(5_000)));

        let summary = writer.finish().unwrap();
        assert_eq!(summary.path.as_deref(), Some(path.as_path()));
        assert_eq!(summary.samples_written, 3);
        assert_eq!(
            *written.lock().unwrap(),
            vec![
                Duration::ZERO,
                Duration::from_millis(16),
                Duration::from_millis(33)
            ]
        );
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 12);
    }

    #[test]
    fn busy_encoder_drops_instead_of_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("webcam.mov");
        let sink = FileSink::new(&path).busy_after(2);
        let mut writer = TrackWriter::new(TrackKind::Webcam, &path, Box::new(sink));

        let outcomes: Vec<_> = (0..5)
            .map(|i| writer.accept(bytes(i * 33, 1)).unwrap())
            .collect();
        assert_eq!(outcomes[..2], [AppendOutcome::Written, AppendOutcome::Written]);
        assert!(outcomes[2..].iter().all(|o| *o == AppendOutcome::Dropped));

        let summary = writer.finish().unwrap();
        assert_eq!(summary.samples_written, 2);
        assert_eq!(summary.samples_dropped, 3);
    }

    #[test]
    fn writes_resume_in_order_once_encoder_catches_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screen.mov");
        let sink = FileSink::new(&path).busy_after(3).recover_after(2);
        let written = sink.written_pts();
        let mut writer = TrackWriter::new(TrackKind::Screen, &path, Box::new(sink));

        let outcomes: Vec<_> = (0..11)
            .map(|i| writer.accept(bytes(1_000 + i * 10, 1)).unwrap())
            .collect();
        use AppendOutcome::{Dropped as D, Written as W};
        assert_eq!(outcomes, [W, W, W, D, D, W, W, W, D, D, W]);

        let written = written.lock().unwrap().clone();
        let expected: Vec<_> = [0u64, 1, 2, 5, 6, 7, 10]
            .into_iter()
            .map(|i| Duration::from_millis(i * 10))
            .collect();
        assert_eq!(written, expected);
        assert!(written.windows(2).all(|w| w[0] < w[1]));

        let summary = writer.finish().unwrap();
        assert_eq!(summary.samples_written, 7);
        assert_eq!(summary.samples_dropped, 4);
    }

    #[test]
    fn writer_without_samples_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.m4a");
        let writer = TrackWriter::new(TrackKind::Audio, &path, Box::new(FileSink::new(&path)));

        let summary = writer.finish().unwrap();
        assert_eq!(summary.path, None);
        assert!(!path.exists());
    }
}

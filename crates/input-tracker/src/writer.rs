//! Append-only JSONL writer for `input.jsonl`.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use presenter_common::error::{PresenterError, PresenterResult};
use presenter_recording_model::event::{InputKind, InputRecord};

/// Writes input records as one compact JSON object per line.
///
/// Every record is flushed before `write_event` returns, so a crash loses at
/// most the event being written. Timestamps never go backwards: a wall clock
/// step is absorbed by repeating the previous timestamp.
pub struct EventWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    events_written: u64,
    last_timestamp: f64,
}

impl EventWriter {
    /// Create (or truncate) `path` and open it for appending.
    pub fn create(path: &Path) -> PresenterResult<Self> {
        File::create(path).map_err(|e| {
            PresenterError::input_tracking(format!("Failed to create {}: {e}", path.display()))
        })?;
        let file = OpenOptions::new().append(true).open(path).map_err(|e| {
            PresenterError::input_tracking(format!("Failed to open {}: {e}", path.display()))
        })?;

        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            events_written: 0,
            last_timestamp: f64::NEG_INFINITY,
        })
    }

    /// Append one event observed at `timestamp` (unix seconds).
    pub fn write_event(&mut self, timestamp: f64, kind: InputKind) -> PresenterResult<InputRecord> {
        let timestamp = timestamp.max(self.last_timestamp);
        let record = InputRecord { timestamp, kind };

        let json = serde_json::to_string(&record)?;
        writeln!(self.writer, "{json}")
            .map_err(|e| PresenterError::input_tracking(format!("Failed to write event: {e}")))?;
        self.flush()?;

        self.last_timestamp = timestamp;
        self.events_written += 1;
        Ok(record)
    }

    /// Flush buffered writes to disk.
    pub fn flush(&mut self) -> PresenterResult<()> {
        self.writer
            .flush()
            .map_err(|e| PresenterError::input_tracking(format!("Failed to flush events: {e}")))
    }

    pub fn events_written(&self) -> u64 {
        self.events_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EventWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

//! On-disk layout of a recording session.
//!
//! ```text
//! recordings/<yyyy-MM-dd_HH-mm-ss>/
//!   screen.mov
//!   webcam.mov
//!   audio.m4a
//!   input.jsonl
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The four tracks of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Screen,
    Webcam,
    Audio,
    Input,
}

impl TrackKind {
    /// All track kinds in start order.
    pub const ALL: [TrackKind; 4] = [
        TrackKind::Screen,
        TrackKind::Webcam,
        TrackKind::Audio,
        TrackKind::Input,
    ];

    /// File name of this track inside a session directory.
    pub fn file_name(self) -> &'static str {
        match self {
            TrackKind::Screen => "screen.mov",
            TrackKind::Webcam => "webcam.mov",
            TrackKind::Audio => "audio.m4a",
            TrackKind::Input => "input.jsonl",
        }
    }

    /// Whether this track goes through an encoder.
    pub fn is_media(self) -> bool {
        !matches!(self, TrackKind::Input)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrackKind::Screen => "screen",
            TrackKind::Webcam => "webcam",
            TrackKind::Audio => "audio",
            TrackKind::Input => "input",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Paths of one session directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLayout {
    root: PathBuf,
}

impl SessionLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The session directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory name, i.e. the session's identity.
    pub fn name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Destination file of a track.
    pub fn track_path(&self, kind: TrackKind) -> PathBuf {
        self.root.join(kind.file_name())
    }
}

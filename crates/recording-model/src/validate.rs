//! Structural checks for a finished session directory.
//!
//! Absent media files are reported but are not issues: a track that never
//! received a sample (denied permission, missing device) produces no file.
//! Empty files and malformed input streams are issues.

use std::path::Path;

use serde::Serialize;

use crate::event::{InputKind, InputRecord};
use crate::layout::{SessionLayout, TrackKind};

/// State of one track file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Absent,
    Empty,
    Present { bytes: u64 },
}

/// Summary of `input.jsonl`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InputStreamSummary {
    pub records: usize,
    pub key_events: usize,
    pub pointer_events: usize,
    pub first_timestamp: Option<f64>,
    pub last_timestamp: Option<f64>,
}

/// Result of validating a session directory.
#[derive(Debug, Clone, Serialize)]
pub struct SessionValidation {
    pub name: String,
    pub name_matches_pattern: bool,
    pub files: Vec<(TrackKind, FileState)>,
    pub input: Option<InputStreamSummary>,
    pub issues: Vec<String>,
}

impl SessionValidation {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn file_state(&self, kind: TrackKind) -> Option<FileState> {
        self.files
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, state)| *state)
    }
}

/// Validate the session directory at `root`.
pub fn validate_session(root: &Path) -> std::io::Result<SessionValidation> {
    let layout = SessionLayout::new(root);
    let name = layout.name();
    let name_matches_pattern = presenter_common::parse_session_dir_name(&name).is_some();

    let mut issues = Vec::new();
    if !root.is_dir() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", root.display()),
        ));
    }
    if !name_matches_pattern {
        issues.push(format!(
            "directory name {name:?} does not match yyyy-MM-dd_HH-mm-ss"
        ));
    }

    let mut files = Vec::with_capacity(TrackKind::ALL.len());
    for kind in TrackKind::ALL {
        let state = match std::fs::metadata(layout.track_path(kind)) {
            Ok(meta) if meta.len() == 0 => FileState::Empty,
            Ok(meta) => FileState::Present { bytes: meta.len() },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileState::Absent,
            Err(e) => return Err(e),
        };
        // An input log with no events is legitimately empty.
        if state == FileState::Empty && kind.is_media() {
            issues.push(format!("{} exists but is empty", kind.file_name()));
        }
        files.push((kind, state));
    }

    let input_path = layout.track_path(TrackKind::Input);
    let input = if input_path.exists() {
        match String::from_utf8(std::fs::read(&input_path)?) {
            Ok(content) => Some(check_input_stream(&content, &mut issues)),
            Err(e) => {
                issues.push(format!(
                    "{} is not valid UTF-8 (byte {})",
                    TrackKind::Input.file_name(),
                    e.utf8_error().valid_up_to()
                ));
                None
            }
        }
    } else {
        None
    };

    Ok(SessionValidation {
        name,
        name_matches_pattern,
        files,
        input,
        issues,
    })
}

/// Check every line of an input stream, appending problems to `issues`.
pub fn check_input_stream(content: &str, issues: &mut Vec<String>) -> InputStreamSummary {
    let mut summary = InputStreamSummary::default();
    let mut previous: Option<f64> = None;

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            issues.push(format!("input.jsonl line {line_no} is blank"));
            continue;
        }
        let record: InputRecord = match serde_json::from_str(line) {
            Ok(record) => record,
            Err(e) => {
                issues.push(format!("input.jsonl line {line_no} is not a valid record: {e}"));
                continue;
            }
        };

        if let Some(prev) = previous {
            if record.timestamp < prev {
                issues.push(format!(
                    "input.jsonl line {line_no} goes back in time ({} < {prev})",
                    record.timestamp
                ));
            }
        }
        previous = Some(record.timestamp);

        match record.kind {
            InputKind::KeyDown { .. } => summary.key_events += 1,
            _ => summary.pointer_events += 1,
        }
        summary.records += 1;
        summary.first_timestamp.get_or_insert(record.timestamp);
        summary.last_timestamp = Some(record.timestamp);
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_input_stream_flags_regressions_and_garbage() {
        let content = "{\"timestamp\":2.0,\"type\":\"key_down\",\"keyCode\":1}\n\
                       {\"timestamp\":1.0,\"type\":\"mouse_moved\",\"x\":0.0,\"y\":0.0}\n\
                       not json\n";
        let mut issues = Vec::new();
        let summary = check_input_stream(content, &mut issues);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.key_events, 1);
        assert_eq!(summary.pointer_events, 1);
        assert_eq!(issues.len(), 2);
        assert!(issues[0].contains("back in time"));
        assert!(issues[1].contains("line 3"));
    }

    #[test]
    fn session_with_missing_webcam_is_still_valid() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("2026-05-01_12-30-00");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("screen.mov"), b"moov").unwrap();
        std::fs::write(root.join("audio.m4a"), b"moov").unwrap();
        std::fs::write(
            root.join("input.jsonl"),
            "{\"timestamp\":1.0,\"type\":\"key_down\",\"keyCode\":1}\n",
        )
        .unwrap();

        let report = validate_session(&root).unwrap();
        assert!(report.is_valid(), "{:?}", report.issues);
        assert!(report.name_matches_pattern);
        assert_eq!(report.file_state(TrackKind::Webcam), Some(FileState::Absent));
        assert_eq!(report.input.unwrap().records, 1);
    }

    #[test]
    fn empty_media_file_is_an_issue() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("2026-05-01_12-30-00");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("screen.mov"), b"").unwrap();
        std::fs::write(root.join("input.jsonl"), b"").unwrap();

        let report = validate_session(&root).unwrap();
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.file_state(TrackKind::Input), Some(FileState::Empty));
    }

    #[test]
    fn non_utf8_input_log_is_an_issue() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("2026-05-01_12-30-00");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("screen.mov"), b"moov").unwrap();
        std::fs::write(root.join("input.jsonl"), b"{\"timestamp\":1.0,\xff\xfe}\n").unwrap();

        let report = validate_session(&root).unwrap();
        assert!(!report.is_valid());
        assert!(report.input.is_none());
        assert!(report.issues[0].contains("not valid UTF-8"), "{:?}", report.issues);
    }
}

//! Input event records for the `input.jsonl` stream.
//!
//! Each line of the file is one compact JSON object:
//!
//! ```text
//! {"timestamp":1767225600.125,"type":"key_down","keyCode":30}
//! {"timestamp":1767225600.250,"type":"mouse_moved","x":812.0,"y":440.5}
//! {"timestamp":1767225600.375,"type":"mouse_down","button":"left","x":812.0,"y":440.5}
//! ```
//!
//! Timestamps are wall-clock unix seconds so the stream can be lined up
//! against the media files' creation times downstream.

use serde::{Deserialize, Serialize};

/// A single logged input event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRecord {
    /// Unix seconds (fractional) at which the handler observed the event.
    pub timestamp: f64,

    /// The event payload.
    #[serde(flatten)]
    pub kind: InputKind,
}

/// Discriminated union of logged event kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputKind {
    /// Key press.
    KeyDown {
        #[serde(rename = "keyCode")]
        key_code: u16,
    },

    /// Pointer button press.
    MouseDown { button: MouseButton, x: f64, y: f64 },

    /// Pointer motion with no button held.
    MouseMoved { x: f64, y: f64 },

    /// Pointer motion while a button is held.
    MouseDragged { button: MouseButton, x: f64, y: f64 },
}

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Other,
}

impl InputRecord {
    pub fn key_down(timestamp: f64, key_code: u16) -> Self {
        Self {
            timestamp,
            kind: InputKind::KeyDown { key_code },
        }
    }

    pub fn mouse_down(timestamp: f64, button: MouseButton, x: f64, y: f64) -> Self {
        Self {
            timestamp,
            kind: InputKind::MouseDown { button, x, y },
        }
    }

    pub fn mouse_moved(timestamp: f64, x: f64, y: f64) -> Self {
        Self {
            timestamp,
            kind: InputKind::MouseMoved { x, y },
        }
    }

    pub fn mouse_dragged(timestamp: f64, button: MouseButton, x: f64, y: f64) -> Self {
        Self {
            timestamp,
            kind: InputKind::MouseDragged { button, x, y },
        }
    }

    /// Pointer position if this is a pointer event.
    pub fn pointer_position(&self) -> Option<(f64, f64)> {
        self.kind.pointer_position()
    }
}

impl InputKind {
    /// Pointer position if this is a pointer event.
    pub fn pointer_position(&self) -> Option<(f64, f64)> {
        match *self {
            InputKind::MouseDown { x, y, .. }
            | InputKind::MouseMoved { x, y }
            | InputKind::MouseDragged { x, y, .. } => Some((x, y)),
            InputKind::KeyDown { .. } => None,
        }
    }
}

/// Parse records from JSONL content, skipping blank lines.
pub fn parse_records(jsonl: &str) -> Result<Vec<InputRecord>, serde_json::Error> {
    jsonl
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(serde_json::from_str)
        .collect()
}

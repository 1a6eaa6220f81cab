//! Clock and timing utilities.
//!
//! Every track anchors its own timeline to its first sample, so the only
//! shared time reference is the session clock started by the start command.
//! It is used for diagnostics (first-sample latency per track) and for
//! naming the session directory.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Local, NaiveDateTime};

/// `chrono` format of session directory names (`yyyy-MM-dd_HH-mm-ss`).
pub const SESSION_DIR_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// A session clock that provides monotonic offsets relative to the moment
/// the start command was issued.
#[derive(Debug, Clone)]
pub struct RecordingClock {
    epoch: Instant,
    epoch_wall: DateTime<Local>,
}

impl RecordingClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: Local::now(),
        }
    }

    /// Time elapsed since the start command.
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Seconds elapsed since the start command.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Local wall-clock time at the start command.
    pub fn epoch_wall(&self) -> DateTime<Local> {
        self.epoch_wall
    }

}

/// Format a local timestamp as a session directory name.
pub fn session_dir_name(at: &DateTime<Local>) -> String {
    at.format(SESSION_DIR_FORMAT).to_string()
}

/// Parse a session directory name back into its local timestamp.
///
/// Accepts the collision suffix (`_2`, `_3`, ...) appended when two sessions
/// start within the same second.
pub fn parse_session_dir_name(name: &str) -> Option<NaiveDateTime> {
    let base = match name.len() {
        19 => name,
        n if n > 20 && name.as_bytes()[19] == b'_' => {
            let suffix = &name[20..];
            if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            &name[..19]
        }
        _ => return None,
    };
    NaiveDateTime::parse_from_str(base, SESSION_DIR_FORMAT).ok()
}

/// Current wall-clock time as fractional unix seconds.
pub fn unix_timestamp_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_clock_elapsed() {
        let clock = RecordingClock::start();
        assert!(clock.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_session_dir_name_format() {
        let at = Local.with_ymd_and_hms(2026, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(session_dir_name(&at), "2026-03-07_09-05-02");
    }

    #[test]
    fn test_parse_session_dir_name() {
        assert!(parse_session_dir_name("2026-03-07_09-05-02").is_some());
        assert!(parse_session_dir_name("2026-03-07_09-05-02_2").is_some());
        assert!(parse_session_dir_name("2026-03-07_09-05-02_").is_none());
        assert!(parse_session_dir_name("2026-03-07 09:05:02").is_none());
        assert!(parse_session_dir_name("recording").is_none());
    }

    #[test]
    fn test_unix_timestamp_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(unix_timestamp_secs() > 1_577_836_800.0);
    }
}

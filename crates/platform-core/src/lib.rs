//! Presenter platform core contracts.
//!
//! Cross-platform display and permission data structures used by the
//! capture and input crates without coupling to a concrete OS backend.

pub mod permissions;

pub use permissions::*;

use serde::{Deserialize, Serialize};

/// Information about a connected monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorInfo {
    /// Monitor name/identifier.
    pub name: String,
    /// Resolution in physical pixels.
    pub width: u32,
    pub height: u32,
    /// Position in the virtual desktop (pixels).
    pub x: i32,
    pub y: i32,
    /// Scale factor (for example 1.0, 1.25, 2.0).
    pub scale_factor: f64,
    /// Refresh rate in Hz.
    pub refresh_rate_hz: u32,
    /// Whether this monitor is primary.
    pub primary: bool,
}

impl MonitorInfo {
    /// Logical resolution (physical / scale).
    pub fn logical_width(&self) -> u32 {
        (self.width as f64 / self.scale_factor) as u32
    }

    /// Logical resolution (physical / scale).
    pub fn logical_height(&self) -> u32 {
        (self.height as f64 / self.scale_factor) as u32
    }

    /// Physical dimensions padded for encoder macroblock alignment.
    pub fn encoder_dimensions(&self) -> (u32, u32) {
        (
            round_up_to_multiple(self.width, ENCODER_ALIGNMENT),
            round_up_to_multiple(self.height, ENCODER_ALIGNMENT),
        )
    }
}

/// H.264 encoders want frame dimensions that are whole macroblocks.
pub const ENCODER_ALIGNMENT: u32 = 16;

/// Round `value` up to the next multiple of `multiple`.
pub fn round_up_to_multiple(value: u32, multiple: u32) -> u32 {
    if multiple == 0 {
        return value;
    }
    value.div_ceil(multiple).saturating_mul(multiple)
}

/// Pick the monitor to record: the primary one, else the first.
pub fn primary_monitor(monitors: &[MonitorInfo]) -> Option<&MonitorInfo> {
    monitors
        .iter()
        .find(|m| m.primary)
        .or_else(|| monitors.first())
}

/// Compute virtual desktop bounds that include all connected monitors.
/// Returns `(min_x, min_y, width, height)` in physical pixels.
pub fn virtual_desktop_bounds(monitors: &[MonitorInfo]) -> (i32, i32, u32, u32) {
    if monitors.is_empty() {
        return (0, 0, 1920, 1080);
    }

    let min_x = monitors.iter().map(|m| m.x).min().unwrap_or(0);
    let min_y = monitors.iter().map(|m| m.y).min().unwrap_or(0);
    let max_x = monitors
        .iter()
        .map(|m| m.x + m.width as i32)
        .max()
        .unwrap_or(1920);
    let max_y = monitors
        .iter()
        .map(|m| m.y + m.height as i32)
        .max()
        .unwrap_or(1080);

    let width = (max_x - min_x).max(1) as u32;
    let height = (max_y - min_y).max(1) as u32;
    (min_x, min_y, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(name: &str, width: u32, height: u32, x: i32, primary: bool) -> MonitorInfo {
        MonitorInfo {
            name: name.to_string(),
            width,
            height,
            x,
            y: 0,
            scale_factor: 1.0,
            refresh_rate_hz: 60,
            primary,
        }
    }

    #[test]
    fn virtual_bounds_cover_negative_origin_layout() {
        let monitors = vec![
            monitor("left", 1920, 1080, -1920, false),
            monitor("main", 2560, 1440, 0, true),
        ];

        let (x, y, w, h) = virtual_desktop_bounds(&monitors);
        assert_eq!(x, -1920);
        assert_eq!(y, 0);
        assert_eq!(w, 4480);
        assert_eq!(h, 1440);
    }

    #[test]
    fn encoder_dimensions_round_up_to_sixteen() {
        // 1366x768 laptops and 3024x1964 Retina panels are not aligned.
        assert_eq!(
            monitor("lap", 1366, 768, 0, true).encoder_dimensions(),
            (1376, 768)
        );
        assert_eq!(
            monitor("mbp", 3024, 1964, 0, true).encoder_dimensions(),
            (3024, 1968)
        );
        assert_eq!(round_up_to_multiple(0, 16), 0);
        assert_eq!(round_up_to_multiple(17, 0), 17);
    }

    #[test]
    fn primary_monitor_prefers_primary_flag() {
        let monitors = vec![
            monitor("side", 1920, 1080, 0, false),
            monitor("main", 2560, 1440, 1920, true),
        ];
        assert_eq!(primary_monitor(&monitors).unwrap().name, "main");
        assert_eq!(primary_monitor(&monitors[..1]).unwrap().name, "side");
        assert!(primary_monitor(&[]).is_none());
    }
}

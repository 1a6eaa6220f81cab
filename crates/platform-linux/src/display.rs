//! Display/monitor detection.

use presenter_common::error::{PresenterError, PresenterResult};
use presenter_platform_core::MonitorInfo;

/// Display server type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayServer {
    Wayland,
    X11,
    Unknown,
}

/// Detect the current display server.
pub fn detect_display_server() -> DisplayServer {
    if std::env::var("WAYLAND_DISPLAY").is_ok() {
        DisplayServer::Wayland
    } else if std::env::var("DISPLAY").is_ok() {
        DisplayServer::X11
    } else {
        DisplayServer::Unknown
    }
}

/// Detect connected monitors by querying `xrandr`.
///
/// Works under X11 and under XWayland, where the reported size is the
/// output's physical mode.
pub fn detect_monitors() -> PresenterResult<Vec<MonitorInfo>> {
    tracing::debug!("Detecting monitors");

    let output = std::process::Command::new("xrandr")
        .arg("--query")
        .output()
        .map_err(|e| PresenterError::platform(format!("Failed to run xrandr: {e}")))?;

    if !output.status.success() {
        return Err(PresenterError::platform(format!(
            "xrandr exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let monitors = parse_xrandr(&String::from_utf8_lossy(&output.stdout));
    if monitors.is_empty() {
        return Err(PresenterError::device_unavailable(
            "xrandr reported no connected monitors",
        ));
    }
    Ok(monitors)
}

/// Parse `xrandr --query` output into monitors.
///
/// Only connected outputs with an active mode are returned. The refresh rate
/// comes from the mode line marked current (`*`).
pub fn parse_xrandr(text: &str) -> Vec<MonitorInfo> {
    let mut monitors: Vec<MonitorInfo> = Vec::new();
    let mut awaiting_refresh = false;

    for line in text.lines() {
        if !line.starts_with(char::is_whitespace) {
            awaiting_refresh = false;
            let mut parts = line.split_whitespace();
            let (Some(name), Some("connected")) = (parts.next(), parts.next()) else {
                continue;
            };
            let rest: Vec<&str> = parts.collect();
            let primary = rest.first() == Some(&"primary");
            let Some(geometry) = rest.iter().find_map(|token| parse_geometry(token)) else {
                continue;
            };
            let (width, height, x, y) = geometry;
            monitors.push(MonitorInfo {
                name: name.to_string(),
                width,
                height,
                x,
                y,
                scale_factor: 1.0,
                refresh_rate_hz: 60,
                primary,
            });
            awaiting_refresh = true;
            continue;
        }

        if awaiting_refresh && line.contains('*') {
            let current = line
                .split_whitespace()
                .skip(1)
                .find(|token| token.contains('*'))
                .and_then(|token| token.trim_end_matches(['*', '+']).parse::<f64>().ok());
            if let (Some(rate), Some(monitor)) = (current, monitors.last_mut()) {
                monitor.refresh_rate_hz = rate.round() as u32;
            }
            awaiting_refresh = false;
        }
    }

    monitors
}

/// Parse `WxH+X+Y`.
fn parse_geometry(token: &str) -> Option<(u32, u32, i32, i32)> {
    let (size, offsets) = token.split_once('+')?;
    let (w, h) = size.split_once('x')?;
    let (x, y) = offsets.split_once('+')?;
    Some((w.parse().ok()?, h.parse().ok()?, x.parse().ok()?, y.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Screen 0: minimum 320 x 200, current 4480 x 1600, maximum 16384 x 16384
eDP-1 connected primary 2560x1600+0+0 (normal left inverted right x axis y axis) 302mm x 189mm
   2560x1600     60.00*+  48.00
   1920x1200     59.88
HDMI-1 connected 1920x1080+2560+0 (normal left inverted right x axis y axis) 527mm x 296mm
   1920x1080     60.00 +  74.97*   50.00
DP-1 disconnected (normal left inverted right x axis y axis)
DP-2 connected (normal left inverted right x axis y axis)
   1920x1080     60.00 +
";

    #[test]
    fn parses_connected_outputs_with_geometry() {
        let monitors = parse_xrandr(SAMPLE);
        assert_eq!(monitors.len(), 2);

        assert_eq!(monitors[0].name, "eDP-1");
        assert!(monitors[0].primary);
        assert_eq!((monitors[0].width, monitors[0].height), (2560, 1600));
        assert_eq!(monitors[0].refresh_rate_hz, 60);

        assert_eq!(monitors[1].name, "HDMI-1");
        assert!(!monitors[1].primary);
        assert_eq!((monitors[1].x, monitors[1].y), (2560, 0));
        assert_eq!(monitors[1].refresh_rate_hz, 75);
    }

    #[test]
    fn geometry_parser_rejects_other_tokens() {
        assert_eq!(parse_geometry("1920x1080+10+20"), Some((1920, 1080, 10, 20)));
        assert_eq!(parse_geometry("(normal"), None);
        assert_eq!(parse_geometry("primary"), None);
    }
}

//! Permission detection and guidance for Linux.
//!
//! Linux has no interactive consent dialog for the devices Presenter uses.
//! Authorization is derived from whether the relevant device nodes can be
//! opened; "prompting" re-checks and logs the fix the user has to apply.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use presenter_platform_core::{AuthorizationStatus, Capability, PermissionBroker};

use crate::display::{detect_display_server, DisplayServer};

/// Permission broker backed by display-server and device-node checks.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxPermissions;

impl LinuxPermissions {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl PermissionBroker for LinuxPermissions {
    fn status(&self, capability: Capability) -> AuthorizationStatus {
        match capability {
            Capability::ScreenRecording => screen_status(detect_display_server()),
            Capability::Camera => device_nodes_status(&video_device_nodes()),
            Capability::Microphone => AuthorizationStatus::Authorized,
            Capability::InputMonitoring => device_nodes_status(&input_event_nodes()),
        }
    }

    async fn prompt_authorization(&self, capability: Capability) -> AuthorizationStatus {
        let status = self.status(capability);
        if status != AuthorizationStatus::Authorized {
            tracing::warn!(
                %capability,
                fix = fix_instructions(capability),
                "Capability not available"
            );
        }
        status
    }
}

fn screen_status(display_server: DisplayServer) -> AuthorizationStatus {
    match display_server {
        DisplayServer::X11 => AuthorizationStatus::Authorized,
        DisplayServer::Wayland | DisplayServer::Unknown => AuthorizationStatus::Denied,
    }
}

/// Authorized when no node exists (absence is a device problem, reported by
/// the source) or when at least one node can be opened for reading.
fn device_nodes_status(nodes: &[PathBuf]) -> AuthorizationStatus {
    if nodes.is_empty() || nodes.iter().any(|node| is_readable(node)) {
        AuthorizationStatus::Authorized
    } else {
        AuthorizationStatus::Denied
    }
}

fn is_readable(path: &Path) -> bool {
    OpenOptions::new().read(true).open(path).is_ok()
}

fn video_device_nodes() -> Vec<PathBuf> {
    (0..16)
        .map(|idx| PathBuf::from(format!("/dev/video{idx}")))
        .filter(|path| path.exists())
        .collect()
}

fn input_event_nodes() -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir("/dev/input") else {
        return Vec::new();
    };
    let mut nodes: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("event"))
        })
        .collect();
    nodes.sort();
    nodes
}

fn fix_instructions(capability: Capability) -> &'static str {
    match capability {
        Capability::ScreenRecording => {
            "Screen capture needs an X11 session (DISPLAY set); log in with an X11/Xorg session"
        }
        Capability::Camera => "Add user to the video group: sudo usermod -aG video $USER (logout required)",
        Capability::Microphone => "Ensure PipeWire or PulseAudio is running for your user",
        Capability::InputMonitoring => {
            "Add user to the input group: sudo usermod -aG input $USER (logout required)"
        }
    }
}

/// A system capability report entry.
#[derive(Debug, Clone)]
pub struct CapabilityCheck {
    pub name: String,
    pub description: String,
    pub available: bool,
    pub required: bool,
    pub fix_instructions: Option<String>,
}

/// Check all capabilities and report status.
pub fn check_capabilities() -> Vec<CapabilityCheck> {
    let broker = LinuxPermissions::new();
    let video_nodes = video_device_nodes();
    let input_nodes = input_event_nodes();

    vec![
        check(
            &broker,
            Capability::ScreenRecording,
            "X11 display for ximagesrc screen capture",
            true,
            true,
        ),
        check(
            &broker,
            Capability::Camera,
            "Video4Linux webcam for webcam.mov",
            false,
            !video_nodes.is_empty(),
        ),
        check(
            &broker,
            Capability::Microphone,
            "PulseAudio/PipeWire microphone for audio.m4a",
            false,
            true,
        ),
        check(
            &broker,
            Capability::InputMonitoring,
            "evdev keyboard/pointer devices for input.jsonl",
            false,
            !input_nodes.is_empty(),
        ),
    ]
}

fn check(
    broker: &LinuxPermissions,
    capability: Capability,
    description: &str,
    required: bool,
    device_present: bool,
) -> CapabilityCheck {
    let available = device_present && broker.is_authorized(capability);
    CapabilityCheck {
        name: capitalize(&capability.to_string()),
        description: description.to_string(),
        available,
        required,
        fix_instructions: if available {
            None
        } else if !device_present {
            Some(format!("No {capability} device found"))
        } else {
            Some(fix_instructions(capability).to_string())
        },
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Print a user-friendly capability report.
pub fn print_capability_report(capabilities: &[CapabilityCheck]) {
    println!("Presenter System Capabilities:");
    println!("{}", "-".repeat(60));

    for cap in capabilities {
        let status = if cap.available {
            "[OK]"
        } else if cap.required {
            "[MISSING - REQUIRED]"
        } else {
            "[MISSING - OPTIONAL]"
        };

        println!("  {} {}: {}", status, cap.name, cap.description);

        if let Some(ref fix) = cap.fix_instructions {
            println!("    Fix: {fix}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_requires_x11() {
        assert_eq!(screen_status(DisplayServer::X11), AuthorizationStatus::Authorized);
        assert_eq!(screen_status(DisplayServer::Wayland), AuthorizationStatus::Denied);
        assert_eq!(screen_status(DisplayServer::Unknown), AuthorizationStatus::Denied);
    }

    #[test]
    fn missing_nodes_are_not_a_permission_problem() {
        assert_eq!(device_nodes_status(&[]), AuthorizationStatus::Authorized);
    }

    #[test]
    fn unreadable_nodes_are_denied() {
        let missing = PathBuf::from("/nonexistent/presenter/video0");
        assert_eq!(
            device_nodes_status(&[missing]),
            AuthorizationStatus::Denied
        );
    }

    #[test]
    fn capitalize_first_letter() {
        assert_eq!(capitalize("input monitoring"), "Input monitoring");
        assert_eq!(capitalize(""), "");
    }
}

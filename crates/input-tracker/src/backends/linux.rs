//! System-wide keyboard and pointer listening through evdev.
//!
//! Requires read access to `/dev/input/event*` (usually membership in the
//! `input` group). Relative pointer motion is accumulated into an absolute
//! position clamped to the virtual desktop, since evdev has no notion of the
//! on-screen cursor.

use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use evdev::{Device, EventType, Key, RelativeAxisType};

use presenter_common::error::{PresenterError, PresenterResult};
use presenter_platform_core::{
    virtual_desktop_bounds, AuthorizationStatus, Capability, PermissionBroker,
};
use presenter_platform_linux::LinuxPermissions;
use presenter_recording_model::event::{InputKind, MouseButton};

use crate::{EventHandler, InputListener};

const POLL_INTERVAL: Duration = Duration::from_millis(2);

const SYN_REPORT: u16 = 0;
const FIRST_BUTTON_CODE: u16 = 0x100;
const FIRST_KEY_AFTER_BUTTONS: u16 = 0x160;

/// Global listener over every readable keyboard and relative pointer.
pub struct EvdevListener {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EvdevListener {
    pub fn new() -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

impl Default for EvdevListener {
    fn default() -> Self {
        Self::new()
    }
}

impl InputListener for EvdevListener {
    fn name(&self) -> &str {
        "evdev"
    }

    fn is_available(&self) -> bool {
        std::path::Path::new("/dev/input").is_dir()
    }

    fn register(&mut self, handler: EventHandler) -> PresenterResult<()> {
        if LinuxPermissions::new().status(Capability::InputMonitoring)
            == AuthorizationStatus::Denied
        {
            return Err(PresenterError::authorization_denied(
                "No readable /dev/input/event* device. Fix: sudo usermod -aG input $USER && log out/in",
            ));
        }

        let devices = open_input_devices();
        if devices.is_empty() {
            return Err(PresenterError::device_unavailable(
                "No keyboard or pointer input devices found",
            ));
        }

        let bounds = match presenter_platform_linux::detect_monitors() {
            Ok(monitors) => virtual_desktop_bounds(&monitors),
            Err(e) => {
                tracing::debug!(error = %e, "Monitor detection failed; assuming 1920x1080");
                virtual_desktop_bounds(&[])
            }
        };

        self.stop.store(false, Ordering::SeqCst);
        let stop = self.stop.clone();
        let pointer = PointerState::new(bounds);
        let thread = std::thread::Builder::new()
            .name("presenter-evdev".into())
            .spawn(move || poll_devices(devices, handler, stop, pointer))
            .map_err(|e| {
                PresenterError::input_tracking(format!("Failed to spawn evdev thread: {e}"))
            })?;
        self.thread = Some(thread);
        Ok(())
    }

    fn deregister(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("evdev polling thread panicked");
            }
        }
    }
}

impl Drop for EvdevListener {
    fn drop(&mut self) {
        self.deregister();
    }
}

fn open_input_devices() -> Vec<(PathBuf, Device)> {
    evdev::enumerate()
        .filter(|(_, device)| is_keyboard(device) || is_relative_pointer(device))
        .filter_map(|(path, device)| match set_nonblocking(&device) {
            Ok(()) => {
                tracing::debug!(
                    path = %path.display(),
                    name = device.name().unwrap_or("unknown"),
                    "Listening to input device"
                );
                Some((path, device))
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping input device");
                None
            }
        })
        .collect()
}

fn is_keyboard(device: &Device) -> bool {
    device
        .supported_keys()
        .is_some_and(|keys| keys.contains(Key::KEY_A) && keys.contains(Key::KEY_ENTER))
}

fn is_relative_pointer(device: &Device) -> bool {
    device.supported_relative_axes().is_some_and(|axes| {
        axes.contains(RelativeAxisType::REL_X) && axes.contains(RelativeAxisType::REL_Y)
    })
}

fn set_nonblocking(device: &Device) -> std::io::Result<()> {
    let fd = device.as_raw_fd();
    // SAFETY: `fd` is owned by `device`, which outlives both calls.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

fn poll_devices(
    mut devices: Vec<(PathBuf, Device)>,
    handler: EventHandler,
    stop: Arc<AtomicBool>,
    mut pointer: PointerState,
) {
    tracing::debug!(devices = devices.len(), "evdev polling started");

    while !stop.load(Ordering::Relaxed) && !devices.is_empty() {
        let mut idle = true;

        devices.retain_mut(|(path, device)| {
            let events: Vec<evdev::InputEvent> = match device.fetch_events() {
                Ok(events) => events.collect(),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return true,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Input device lost");
                    return false;
                }
            };
            idle &= events.is_empty();
            for event in &events {
                if let Some(kind) = pointer.on_event(event) {
                    handler.handle(kind);
                }
            }
            true
        });

        if idle {
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    tracing::debug!("evdev polling stopped");
}

/// Translates raw evdev events into logged input kinds.
///
/// Motion is emitted once per `SYN_REPORT`, as a drag while a button is held.
#[derive(Debug, Clone)]
pub struct PointerState {
    x: f64,
    y: f64,
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
    pending_dx: f64,
    pending_dy: f64,
    held: Option<MouseButton>,
}

impl PointerState {
    /// Start at the centre of `(min_x, min_y, width, height)`.
    pub fn new(bounds: (i32, i32, u32, u32)) -> Self {
        let (min_x, min_y, width, height) = bounds;
        let (min_x, min_y) = (min_x as f64, min_y as f64);
        let max_x = min_x + width.saturating_sub(1) as f64;
        let max_y = min_y + height.saturating_sub(1) as f64;
        Self {
            x: (min_x + max_x) / 2.0,
            y: (min_y + max_y) / 2.0,
            min_x,
            min_y,
            max_x,
            max_y,
            pending_dx: 0.0,
            pending_dy: 0.0,
            held: None,
        }
    }

    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn on_event(&mut self, event: &evdev::InputEvent) -> Option<InputKind> {
        let (code, value) = (event.code(), event.value());
        match event.event_type() {
            EventType::RELATIVE => {
                if code == RelativeAxisType::REL_X.0 {
                    self.pending_dx += value as f64;
                } else if code == RelativeAxisType::REL_Y.0 {
                    self.pending_dy += value as f64;
                }
                None
            }
            EventType::SYNCHRONIZATION if code == SYN_REPORT => {
                if !self.apply_motion() {
                    return None;
                }
                let (x, y) = (self.x, self.y);
                Some(match self.held {
                    Some(button) => InputKind::MouseDragged { button, x, y },
                    None => InputKind::MouseMoved { x, y },
                })
            }
            EventType::KEY => self.on_key(code, value),
            _ => None,
        }
    }

    fn on_key(&mut self, code: u16, value: i32) -> Option<InputKind> {
        if let Some(button) = pointer_button(code) {
            if value == 1 {
                self.apply_motion();
                self.held.get_or_insert(button);
                return Some(InputKind::MouseDown {
                    button,
                    x: self.x,
                    y: self.y,
                });
            }
            if value == 0 && self.held == Some(button) {
                self.held = None;
            }
            return None;
        }

        // 1 = press, 2 = autorepeat.
        let is_key = !(FIRST_BUTTON_CODE..FIRST_KEY_AFTER_BUTTONS).contains(&code);
        (is_key && value != 0).then_some(InputKind::KeyDown { key_code: code })
    }

    /// Fold pending relative motion into the position. Returns whether the
    /// pointer received any motion.
    fn apply_motion(&mut self) -> bool {
        if self.pending_dx == 0.0 && self.pending_dy == 0.0 {
            return false;
        }
        self.x = (self.x + self.pending_dx).clamp(self.min_x, self.max_x);
        self.y = (self.y + self.pending_dy).clamp(self.min_y, self.max_y);
        self.pending_dx = 0.0;
        self.pending_dy = 0.0;
        true
    }
}

fn pointer_button(code: u16) -> Option<MouseButton> {
    if code == Key::BTN_LEFT.code() {
        Some(MouseButton::Left)
    } else if code == Key::BTN_RIGHT.code() {
        Some(MouseButton::Right)
    } else if (Key::BTN_MIDDLE.code()..=Key::BTN_TASK.code()).contains(&code) {
        Some(MouseButton::Other)
    } else {
        None
    }
}

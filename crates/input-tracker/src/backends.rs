//! Input listener implementations.
//!
//! - `linux`: system-wide keyboards and pointers through evdev
//! - `local`: in-process forwarding from the host application
//! - `stub`: scripted events for tests

#[cfg(target_os = "linux")]
mod linux;
mod local;
#[cfg(not(target_os = "linux"))]
mod non_linux;
mod stub;

#[cfg(target_os = "linux")]
pub use linux::{EvdevListener, PointerState};
pub use local::{LocalEventPort, LocalListener};
#[cfg(not(target_os = "linux"))]
pub use non_linux::UnsupportedGlobalListener;
pub use stub::StubListener;

use crate::InputListener;

/// The global listener for the current platform.
#[cfg(target_os = "linux")]
pub fn detect_global_listener() -> Box<dyn InputListener> {
    Box::new(EvdevListener::new())
}

/// The global listener for the current platform.
#[cfg(not(target_os = "linux"))]
pub fn detect_global_listener() -> Box<dyn InputListener> {
    Box::new(UnsupportedGlobalListener)
}

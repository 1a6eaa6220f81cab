//! Presenter Linux Platform Integration
//!
//! Platform-specific implementations for Linux:
//! - **Display Detection:** Monitor enumeration through `xrandr`
//! - **Permissions:** Capability detection, a permission broker backed by
//!   device-node access, and user guidance

pub mod display;
pub mod permissions;

pub use display::*;
pub use permissions::LinuxPermissions;

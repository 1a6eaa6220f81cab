//! Presenter Common Utilities
//!
//! Shared infrastructure for all Presenter crates:
//! - Error types and result aliases
//! - Wall-clock helpers and session directory naming
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;

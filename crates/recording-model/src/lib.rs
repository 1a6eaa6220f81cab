//! Presenter Recording Model
//!
//! Defines the data contracts of a recording session on disk:
//! - **Events:** wall-clock stamped input records written to `input.jsonl`
//! - **Layout:** the session directory and its fixed track file names
//! - **Validation:** structural checks of a finished session directory

pub mod event;
pub mod layout;
pub mod validate;

pub use event::*;
pub use layout::*;
pub use validate::*;

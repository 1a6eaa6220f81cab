//! Global input listening on platforms without a backend.

use presenter_common::error::{PresenterError, PresenterResult};

use crate::{EventHandler, InputListener};

/// Never available; only locally forwarded events are logged.
pub struct UnsupportedGlobalListener;

impl InputListener for UnsupportedGlobalListener {
    fn name(&self) -> &str {
        "unsupported"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn register(&mut self, _handler: EventHandler) -> PresenterResult<()> {
        Err(PresenterError::unsupported(
            "Global input listening is not implemented on this platform",
        ))
    }

    fn deregister(&mut self) {}
}

//! Synthetic page-turn input.
//!
//! Sends one arrow-key event straight to the target process so the reader
//! does not need keyboard focus. Fire-and-forget: the caller owns the
//! settling delay before the next capture.

use crate::types::{CaptureTarget, PageDirection, PipelineError};
use tracing::trace;

/// Sends exactly one "next page" signal to the target's input queue.
///
/// A single-method contract so tests can substitute counting fakes without
/// OS-level input synthesis.
pub trait PageAdvancer {
    fn advance(&self, target: &CaptureTarget) -> Result<(), PipelineError>;
}

#[cfg(target_os = "macos")]
mod macos {
    use super::*;
    use core_graphics::event::CGEvent;
    use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
    use std::time::Duration;

    pub fn send_key(pid: i32, keycode: u16) -> Result<(), PipelineError> {
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState).map_err(|_| {
            PipelineError::PermissionDenied(
                "cannot create input event source; grant Accessibility in \
                 System Settings > Privacy & Security"
                    .to_string(),
            )
        })?;

        let key_down = CGEvent::new_keyboard_event(source.clone(), keycode, true)
            .map_err(|_| event_failed())?;
        let key_up =
            CGEvent::new_keyboard_event(source, keycode, false).map_err(|_| event_failed())?;

        // Posting to the pid bypasses the focused window entirely
        key_down.post_to_pid(pid);
        std::thread::sleep(Duration::from_millis(50));
        key_up.post_to_pid(pid);
        Ok(())
    }

    fn event_failed() -> PipelineError {
        PipelineError::PermissionDenied("failed to synthesize keyboard event".to_string())
    }
}

#[cfg(not(target_os = "macos"))]
mod macos {
    use super::*;

    pub fn send_key(_pid: i32, _keycode: u16) -> Result<(), PipelineError> {
        Err(PipelineError::CaptureUnavailable(
            "input synthesis requires macOS".to_string(),
        ))
    }
}

/// Arrow-key page advancer
pub struct ArrowKeyAdvancer {
    direction: PageDirection,
}

impl ArrowKeyAdvancer {
    pub fn new(direction: PageDirection) -> Self {
        Self { direction }
    }
}

impl PageAdvancer for ArrowKeyAdvancer {
    fn advance(&self, target: &CaptureTarget) -> Result<(), PipelineError> {
        if !crate::windows::window_exists(target.window_id) {
            return Err(PipelineError::TargetNotFound(format!(
                "window {} ({}) is gone",
                target.window_id, target.app_name
            )));
        }

        trace!(
            "Sending {:?} arrow to pid {} ({})",
            self.direction,
            target.pid,
            target.app_name
        );
        macos::send_key(target.pid, self.direction.keycode())
    }
}

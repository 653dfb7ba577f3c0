#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event system for async communication in hops
//!
//! Events are grouped by functional domain (relocation, cleanup, general).
//! All user-visible output flows through events; only the CLI prints.

pub mod events;
pub use events::{AppEvent, CleanupEvent, GeneralEvent, RelocateEvent};

use tokio::sync::mpsc::UnboundedSender;

/// Type alias for event sender
pub type EventSender = UnboundedSender<AppEvent>;

/// Type alias for event receiver
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<AppEvent>;

/// Create a new event channel
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Send an event, ignoring a closed receiver.
///
/// Operations keep running when nobody is listening (tests, library use),
/// so a send failure is deliberately not an error.
pub fn emit(sender: Option<&EventSender>, event: AppEvent) {
    if let Some(sender) = sender {
        let _ = sender.send(event);
    }
}

//! Notification capability injected into the controllers.

use std::sync::{Mutex, PoisonError};

use colloquy_core::events::ClientEvent;
use tracing::{info, warn};

/// Receives every [`ClientEvent`] the controllers publish.
///
/// Implementations must not block: they are called synchronously from the
/// controller after local state has been updated.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &ClientEvent);
}

/// Logs events through `tracing`. Failures go out at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, event: &ClientEvent) {
        if event.is_failure() {
            warn!(%event, "Operation failed");
        } else {
            info!(%event, "Client event");
        }
    }
}

/// Keeps every event in memory, in publication order.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<ClientEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ClientEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn failures(&self) -> Vec<ClientEvent> {
        self.events()
            .into_iter()
            .filter(ClientEvent::is_failure)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: &ClientEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

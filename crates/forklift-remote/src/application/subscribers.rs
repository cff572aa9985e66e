//! Observer lists for telemetry and connectivity changes.
//!
//! Subscribers are plain closures.  They are called synchronously, in
//! registration order, and never while the session's state lock is held, so a
//! subscriber may read back from the session.

use std::sync::{Arc, Mutex, PoisonError};

use forklift_core::ForkliftTelemetry;

/// Called with every new telemetry snapshot.
pub type StateSubscriber = Box<dyn Fn(&ForkliftTelemetry) + Send + Sync>;

/// Called with `true` when the session becomes connected and `false` when it
/// stops being connected.
pub type ConnectionSubscriber = Box<dyn Fn(bool) + Send + Sync>;

type SharedState = Arc<dyn Fn(&ForkliftTelemetry) + Send + Sync>;
type SharedConnection = Arc<dyn Fn(bool) + Send + Sync>;

/// Both subscriber lists of one session.
#[derive(Default)]
pub struct Subscribers {
    state: Mutex<Vec<SharedState>>,
    connection: Mutex<Vec<SharedConnection>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_state(&self, subscriber: StateSubscriber) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::from(subscriber));
    }

    pub fn add_connection(&self, subscriber: ConnectionSubscriber) {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::from(subscriber));
    }

    pub fn notify_state(&self, telemetry: &ForkliftTelemetry) {
        // Snapshot the list so a subscriber may register another one.
        let list = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for subscriber in &list {
            subscriber(telemetry);
        }
    }

    pub fn notify_connection(&self, connected: bool) {
        let list = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for subscriber in &list {
            subscriber(connected);
        }
    }

    #[cfg(test)]
    fn state_count(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[cfg(test)]
    fn connection_count(&self) -> usize {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

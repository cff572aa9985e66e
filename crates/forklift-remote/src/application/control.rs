//! The `ControlSession` trait: everything the UI layer may ask of a session.
//!
//! Two implementations exist and are interchangeable behind
//! `Arc<dyn ControlSession>`:
//!
//! - [`Session`](super::session::Session) talks to a real controller through
//!   a [`Transport`](super::transport::Transport).
//! - [`SimulatedSession`](super::simulated::SimulatedSession) keeps the rig
//!   state in memory and echoes every command back as telemetry.
//!
//! The choice is made once at startup; nothing else branches on it.

use async_trait::async_trait;
use forklift_core::{ConnectionState, Endpoint, ForkDelta, ForkliftTelemetry};

use crate::application::subscribers::{ConnectionSubscriber, StateSubscriber};
use crate::domain::errors::{ConnectError, ConnectionLost, SendError};

#[async_trait]
pub trait ControlSession: Send + Sync {
    /// Connects to `host:port`.
    ///
    /// # Errors
    ///
    /// [`ConnectError::InvalidEndpoint`] without any network activity,
    /// [`ConnectError::AlreadyActive`] unless disconnected, otherwise the
    /// transport's failure.
    async fn connect(&self, host: &str, port: u16) -> Result<(), ConnectError>;

    /// Closes the link or cancels a pending connect.  Idempotent.
    fn disconnect(&self);

    /// Sends a joystick sample.  Values are clamped to `[-1, 1]` and rounded
    /// to two decimals; a repeat of the last transmitted vector may be
    /// suppressed.
    fn send_movement(&self, x: f64, y: f64) -> Result<(), SendError>;

    /// Sends the `(0, 0)` stop vector.  Never suppressed.
    fn release_movement(&self) -> Result<(), SendError>;

    /// Sends one fork step.
    fn send_fork(&self, delta: ForkDelta) -> Result<(), SendError>;

    /// Endpoint of the current or most recent connection, or the configured
    /// default.
    fn endpoint(&self) -> Endpoint;

    /// Latest telemetry snapshot.
    fn telemetry(&self) -> ForkliftTelemetry;

    fn connection_state(&self) -> ConnectionState;

    fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    /// Why the most recent connection ended without a `disconnect()` call.
    /// Cleared by the next successful connect.
    fn last_connection_loss(&self) -> Option<ConnectionLost>;

    fn on_state_change(&self, subscriber: StateSubscriber);

    fn on_connection_change(&self, subscriber: ConnectionSubscriber);
}

//! SimulatedSession: a `ControlSession` with no controller behind it.
//!
//! Used for demos and UI work when the rig is not powered.  It keeps a
//! simulated device state in memory and answers every accepted command the
//! way the firmware would: by reporting its new state as telemetry.
//!
//! The public contract is identical to [`Session`](super::session::Session):
//! endpoint validation, `AlreadyActive`, connectivity gating, clamping,
//! repeat suppression and the release guarantee all behave the same.  The
//! only difference is that nothing touches the network.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use forklift_core::{
    CommandEncoder, ConnectionState, Endpoint, ForkDelta, ForkliftTelemetry, MovementVector,
};
use tracing::{debug, info};

use crate::application::control::ControlSession;
use crate::application::subscribers::{ConnectionSubscriber, StateSubscriber, Subscribers};
use crate::domain::errors::{ConnectError, ConnectionLost, SendError};

struct SimState {
    connected_since: Option<Instant>,
    endpoint: Endpoint,
    device: ForkliftTelemetry,
    encoder: CommandEncoder,
}

pub struct SimulatedSession {
    state: Mutex<SimState>,
    subscribers: Subscribers,
}

impl SimulatedSession {
    pub fn new(default_endpoint: Endpoint) -> Self {
        Self::with_suppression(default_endpoint, true)
    }

    pub fn with_suppression(default_endpoint: Endpoint, suppress_repeats: bool) -> Self {
        Self {
            state: Mutex::new(SimState {
                connected_since: None,
                endpoint: default_endpoint,
                device: ForkliftTelemetry::default(),
                encoder: CommandEncoder::with_suppression(suppress_repeats),
            }),
            subscribers: Subscribers::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `update` to the simulated device if connected, then echoes
    /// the new device state to state subscribers.
    fn apply(
        &self,
        update: impl FnOnce(&mut SimState) -> bool,
    ) -> Result<(), SendError> {
        let snapshot = {
            let mut state = self.lock();
            if state.connected_since.is_none() {
                return Err(SendError::NotConnected);
            }
            if !update(&mut state) {
                return Ok(());
            }
            state.device
        };
        self.subscribers.notify_state(&snapshot);
        Ok(())
    }
}

#[async_trait]
impl ControlSession for SimulatedSession {
    async fn connect(&self, host: &str, port: u16) -> Result<(), ConnectError> {
        let endpoint = Endpoint::new(host, port)?;
        {
            let mut state = self.lock();
            if state.connected_since.is_some() {
                return Err(ConnectError::AlreadyActive);
            }
            state.connected_since = Some(Instant::now());
            state.device = state.device.stopped();
            state.encoder.reset();
            state.endpoint = endpoint.clone();
        }
        info!("simulated connection to {endpoint}");
        self.subscribers.notify_connection(true);
        Ok(())
    }

    fn disconnect(&self) {
        let was_connected = self.lock().connected_since.take().is_some();
        if was_connected {
            info!("simulated connection closed");
            self.subscribers.notify_connection(false);
        }
    }

    fn send_movement(&self, x: f64, y: f64) -> Result<(), SendError> {
        self.apply(|state| match state.encoder.encode_movement(x, y) {
            Some(command) => {
                debug!("simulated {} frame: {}", command.kind(), command.to_frame());
                state.device.movement = MovementVector::clamped(x, y);
                true
            }
            None => false,
        })
    }

    fn release_movement(&self) -> Result<(), SendError> {
        self.apply(|state| {
            state.encoder.encode_release();
            state.device.movement = MovementVector::ZERO;
            true
        })
    }

    fn send_fork(&self, delta: ForkDelta) -> Result<(), SendError> {
        self.apply(|state| {
            let command = state.encoder.encode_fork(delta);
            debug!("simulated {} frame: {}", command.kind(), command.to_frame());
            state.device.fork_height = state.device.fork_height.saturating_add(delta.step());
            true
        })
    }

    fn endpoint(&self) -> Endpoint {
        self.lock().endpoint.clone()
    }

    fn telemetry(&self) -> ForkliftTelemetry {
        self.lock().device
    }

    fn connection_state(&self) -> ConnectionState {
        let state = self.lock();
        match state.connected_since {
            Some(since) => ConnectionState::Connected {
                endpoint: state.endpoint.clone(),
                since,
            },
            None => ConnectionState::Disconnected,
        }
    }

    /// The simulated rig never drops the link.
    fn last_connection_loss(&self) -> Option<ConnectionLost> {
        None
    }

    fn on_state_change(&self, subscriber: StateSubscriber) {
        self.subscribers.add_state(subscriber);
    }

    fn on_connection_change(&self, subscriber: ConnectionSubscriber) {
        self.subscribers.add_connection(subscriber);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn recorded_states(session: &SimulatedSession) -> Arc<Mutex<Vec<ForkliftTelemetry>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.on_state_change(Box::new(move |t| sink.lock().unwrap().push(*t)));
        seen
    }

    #[tokio::test]
    async fn test_connect_validates_endpoint() {
        let session = SimulatedSession::new(Endpoint::default());

        let result = session.connect("  ", 81).await;

        assert!(matches!(result, Err(ConnectError::InvalidEndpoint(_))));
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_connect_then_disconnect_notifies_each_once() {
        // Arrange
        let session = SimulatedSession::new(Endpoint::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.on_connection_change(Box::new(move |c| sink.lock().unwrap().push(c)));

        // Act
        session.connect("192.168.4.1", 81).await.unwrap();
        let again = session.connect("192.168.4.1", 81).await;
        session.disconnect();
        session.disconnect();

        // Assert
        assert_eq!(again, Err(ConnectError::AlreadyActive));
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test]
    async fn test_commands_are_rejected_while_disconnected() {
        let session = SimulatedSession::new(Endpoint::default());
        let states = recorded_states(&session);

        assert_eq!(session.send_movement(0.1, 0.1), Err(SendError::NotConnected));
        assert_eq!(session.send_fork(ForkDelta::Up), Err(SendError::NotConnected));
        assert!(states.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commands_are_echoed_as_telemetry() {
        // Arrange
        let session = SimulatedSession::new(Endpoint::default());
        let states = recorded_states(&session);
        session.connect("192.168.4.1", 81).await.unwrap();

        // Act
        session.send_movement(2.0, -0.456).unwrap();
        session.send_fork(ForkDelta::Up).unwrap();

        // Assert
        let states = states.lock().unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].movement, MovementVector { x: 1.0, y: -0.46 });
        assert_eq!(states[1].fork_height, 1);
        assert_eq!(session.telemetry().fork_height, 1);
    }

    #[tokio::test]
    async fn test_repeated_movement_is_not_echoed_but_release_is() {
        let session = SimulatedSession::new(Endpoint::default());
        let states = recorded_states(&session);
        session.connect("192.168.4.1", 81).await.unwrap();

        session.send_movement(0.3, 0.3).unwrap();
        session.send_movement(0.3, 0.3).unwrap();
        session.release_movement().unwrap();

        let states = states.lock().unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states[1].movement, MovementVector::ZERO);
    }

    #[tokio::test]
    async fn test_reconnect_stops_movement_and_keeps_fork_height() {
        let session = SimulatedSession::new(Endpoint::default());
        session.connect("192.168.4.1", 81).await.unwrap();
        session.send_movement(0.5, 0.5).unwrap();
        session.send_fork(ForkDelta::Down).unwrap();
        session.disconnect();

        session.connect("10.0.0.2", 81).await.unwrap();

        assert_eq!(session.telemetry().movement, MovementVector::ZERO);
        assert_eq!(session.telemetry().fork_height, -1);
        assert_eq!(session.endpoint().host(), "10.0.0.2");
    }
}

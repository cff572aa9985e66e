//! Session: the single owner of the controller connection.
//!
//! The session composes a [`TransportConnection`] (one per connect attempt),
//! a [`CommandEncoder`] and a [`TelemetryDecoder`], caches the last-known
//! [`ForkliftTelemetry`], and fans out change notifications.
//!
//! # Threading
//!
//! Session state sits behind one `std::sync::Mutex` that is never held
//! across an `.await` and never held while subscribers run.  Each
//! connection gets a generation number; inbound events and connect results
//! carrying an older generation are ignored, which is how a `disconnect()`
//! during a pending `connect()` or a late event from a dropped link is kept
//! from touching current state.
//!
//! Notifications are queued under the state lock, in the same order as the
//! transitions that produce them, and delivered by whichever caller finds no
//! delivery in progress.  Subscribers therefore observe transitions in order
//! even when the connect path and the pump task run on different workers,
//! and a subscriber that calls back into the session only queues.
//!
//! # Inbound path
//!
//! After a successful connect a pump task drains the link's event stream in
//! arrival order:
//!
//! - `Frame` → decode → replace the cached telemetry → notify state
//!   subscribers.  Malformed frames are logged at `debug` and dropped.
//! - `Closed` / `Error` / end of stream → `Disconnected`, a recorded
//!   [`ConnectionLost`], and one `false` connection notification.  There is
//!   no automatic reconnect.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use forklift_core::{
    CommandEncoder, ConnectionState, Endpoint, ForkDelta, ForkliftTelemetry, MovementVector,
    TelemetryDecoder,
};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::application::control::ControlSession;
use crate::application::subscribers::{ConnectionSubscriber, StateSubscriber, Subscribers};
use crate::application::transport::{LinkEvent, Transport, TransportConnection};
use crate::domain::config::SessionConfig;
use crate::domain::errors::{ConnectError, ConnectionLost, SendError};

// ── State ─────────────────────────────────────────────────────────────────────

enum Notice {
    State(ForkliftTelemetry),
    Connection(bool),
}

struct SessionState {
    connection: ConnectionState,
    link: Option<Arc<TransportConnection>>,
    generation: u64,
    telemetry: ForkliftTelemetry,
    encoder: CommandEncoder,
    endpoint: Endpoint,
    /// Last value delivered to connection subscribers.
    announced_connected: bool,
    last_loss: Option<ConnectionLost>,
    pending: VecDeque<Notice>,
    /// Set while some caller is delivering `pending`.
    delivering: bool,
}

impl SessionState {
    /// Queues a connection notice if `connected` differs from the last one.
    fn announce(&mut self, connected: bool) {
        if self.announced_connected != connected {
            self.announced_connected = connected;
            self.pending.push_back(Notice::Connection(connected));
        }
    }

    fn connected_link(&self) -> Option<Arc<TransportConnection>> {
        match (&self.connection, &self.link) {
            (ConnectionState::Connected { .. }, Some(link)) => Some(Arc::clone(link)),
            _ => None,
        }
    }
}

struct Shared {
    state: Mutex<SessionState>,
    subscribers: Subscribers,
    decoder: TelemetryDecoder,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Delivers queued notices until the queue is empty.  Returns at once if
    /// another caller is already delivering; that caller picks up whatever
    /// was queued meanwhile.
    fn deliver(&self) {
        {
            let mut state = self.lock();
            if state.delivering {
                return;
            }
            state.delivering = true;
        }
        loop {
            let notice = {
                let mut state = self.lock();
                match state.pending.pop_front() {
                    Some(notice) => notice,
                    None => {
                        state.delivering = false;
                        return;
                    }
                }
            };
            match notice {
                Notice::State(telemetry) => self.subscribers.notify_state(&telemetry),
                Notice::Connection(connected) => self.subscribers.notify_connection(connected),
            }
        }
    }

    fn on_frame(&self, generation: u64, raw: &[u8]) {
        {
            let mut state = self.lock();
            if state.generation != generation || !state.connection.is_connected() {
                trace!("ignoring frame from stale link");
                return;
            }
            match self.decoder.decode(raw) {
                Ok(telemetry) => {
                    state.telemetry = telemetry;
                    state.pending.push_back(Notice::State(telemetry));
                }
                Err(e) => {
                    debug!("discarding inbound frame: {e}");
                    return;
                }
            }
        }
        self.deliver();
    }

    fn on_link_lost(&self, generation: u64, reason: String) {
        let link = {
            let mut state = self.lock();
            if state.generation != generation || !state.connection.is_connected() {
                return;
            }
            warn!("connection to {} lost: {reason}", state.endpoint);
            state.connection = ConnectionState::Disconnected;
            state.generation += 1;
            state.last_loss = Some(ConnectionLost { reason });
            state.announce(false);
            state.link.take()
        };
        if let Some(link) = link {
            link.disconnect();
        }
        self.deliver();
    }
}

async fn pump_link_events(
    shared: Arc<Shared>,
    generation: u64,
    mut events: mpsc::Receiver<LinkEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            LinkEvent::Frame(raw) => shared.on_frame(generation, &raw),
            LinkEvent::Closed => {
                shared.on_link_lost(generation, "closed by controller".to_string());
                return;
            }
            LinkEvent::Error(reason) => {
                shared.on_link_lost(generation, reason);
                return;
            }
        }
    }
    shared.on_link_lost(generation, "link ended".to_string());
}

// ── Session ───────────────────────────────────────────────────────────────────

/// The control session for a real controller.
///
/// Construct one per application run and share it as
/// `Arc<dyn ControlSession>`.
pub struct Session {
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    shared: Arc<Shared>,
}

impl Session {
    /// Creates a disconnected session.  `default_endpoint` is what
    /// [`ControlSession::endpoint`] reports before the first connect.
    pub fn new(
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        default_endpoint: Endpoint,
    ) -> Self {
        let encoder = CommandEncoder::with_suppression(config.suppress_repeated_movement);
        Self {
            transport,
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState {
                    connection: ConnectionState::Disconnected,
                    link: None,
                    generation: 0,
                    telemetry: ForkliftTelemetry::default(),
                    encoder,
                    endpoint: default_endpoint,
                    announced_connected: false,
                    last_loss: None,
                    pending: VecDeque::new(),
                    delivering: false,
                }),
                subscribers: Subscribers::new(),
                decoder: TelemetryDecoder::new(),
            }),
        }
    }

    /// Connects to an already validated endpoint.
    ///
    /// # Errors
    ///
    /// See [`ControlSession::connect`].
    pub async fn connect_to(&self, endpoint: Endpoint) -> Result<(), ConnectError> {
        let (connection, generation) = {
            let mut state = self.shared.lock();
            if !state.connection.is_disconnected() {
                return Err(ConnectError::AlreadyActive);
            }
            let connection = Arc::new(TransportConnection::new(
                Arc::clone(&self.transport),
                self.config.connect_timeout,
            ));
            state.generation += 1;
            state.connection = ConnectionState::Connecting {
                endpoint: endpoint.clone(),
            };
            state.link = Some(Arc::clone(&connection));
            state.endpoint = endpoint.clone();
            (connection, state.generation)
        };

        info!("connecting to controller at {endpoint}");
        let result = connection.connect(endpoint.clone()).await;

        let mut state = self.shared.lock();
        if state.generation != generation {
            // disconnect() ran while the handshake was pending.
            drop(state);
            connection.disconnect();
            return Err(ConnectError::Cancelled);
        }

        match result {
            Ok(events) => {
                state.connection = ConnectionState::Connected {
                    endpoint: endpoint.clone(),
                    since: Instant::now(),
                };
                state.telemetry = state.telemetry.stopped();
                state.encoder.reset();
                state.last_loss = None;
                state.announce(true);
                drop(state);

                info!("connected to controller at {endpoint}");
                // `true` is queued ahead of anything the pump can report.
                self.shared.deliver();
                tokio::spawn(pump_link_events(
                    Arc::clone(&self.shared),
                    generation,
                    events,
                ));
                Ok(())
            }
            Err(err) => {
                state.connection = ConnectionState::Disconnected;
                state.link = None;
                state.announce(false);
                drop(state);

                warn!("connect to {endpoint} failed: {err}");
                self.shared.deliver();
                Err(err)
            }
        }
    }

    /// Last movement vector handed to the transport, `(0, 0)` if none since
    /// the current connection was established.
    pub fn last_sent_movement(&self) -> MovementVector {
        self.shared
            .lock()
            .encoder
            .last_movement()
            .unwrap_or(MovementVector::ZERO)
    }

    fn transmit_movement(&self, release: bool, x: f64, y: f64) -> Result<(), SendError> {
        let mut state = self.shared.lock();
        let link = state.connected_link().ok_or(SendError::NotConnected)?;

        let vector = if release {
            MovementVector::ZERO
        } else {
            MovementVector::clamped(x, y)
        };
        let command = if release {
            Some(state.encoder.encode_release())
        } else {
            state.encoder.encode_movement(x, y)
        };

        if let Some(command) = command {
            if let Err(e) = link.send(&command.to_frame()) {
                // The encoder already recorded the vector as sent.
                state.encoder.reset();
                debug!("movement not transmitted: {e}");
                return Err(e);
            }
            trace!("sent {} frame", command.kind());
        }

        state.telemetry.movement = vector;
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let link = {
            let mut state = self.shared.lock();
            state.generation += 1;
            state.link.take()
        };
        if let Some(link) = link {
            link.disconnect();
        }
    }
}

#[async_trait]
impl ControlSession for Session {
    async fn connect(&self, host: &str, port: u16) -> Result<(), ConnectError> {
        let endpoint = Endpoint::new(host, port)?;
        self.connect_to(endpoint).await
    }

    fn disconnect(&self) {
        let link = {
            let mut state = self.shared.lock();
            if !state.connection.is_disconnected() {
                info!(
                    "disconnecting from {} ({})",
                    state.endpoint,
                    state.connection.label()
                );
            }
            state.connection = ConnectionState::Disconnected;
            state.generation += 1;
            state.announce(false);
            state.link.take()
        };
        if let Some(link) = link {
            link.disconnect();
        }
        self.shared.deliver();
    }

    fn send_movement(&self, x: f64, y: f64) -> Result<(), SendError> {
        self.transmit_movement(false, x, y)
    }

    fn release_movement(&self) -> Result<(), SendError> {
        self.transmit_movement(true, 0.0, 0.0)
    }

    fn send_fork(&self, delta: ForkDelta) -> Result<(), SendError> {
        let mut state = self.shared.lock();
        let link = state.connected_link().ok_or(SendError::NotConnected)?;
        let command = state.encoder.encode_fork(delta);
        link.send(&command.to_frame())?;
        state.telemetry.fork_height = state.telemetry.fork_height.saturating_add(delta.step());
        Ok(())
    }

    fn endpoint(&self) -> Endpoint {
        self.shared.lock().endpoint.clone()
    }

    fn telemetry(&self) -> ForkliftTelemetry {
        self.shared.lock().telemetry
    }

    fn connection_state(&self) -> ConnectionState {
        self.shared.lock().connection.clone()
    }

    fn last_connection_loss(&self) -> Option<ConnectionLost> {
        self.shared.lock().last_loss.clone()
    }

    fn on_state_change(&self, subscriber: StateSubscriber) {
        self.shared.subscribers.add_state(subscriber);
    }

    fn on_connection_change(&self, subscriber: ConnectionSubscriber) {
        self.shared.subscribers.add_connection(subscriber);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use forklift_core::protocol::CommandFrame;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::application::transport::{Link, LinkError, LinkHandle, MockTransport};
    use crate::infrastructure::scripted::{ScriptedOutcome, ScriptedTransport};

    type Recorded<T> = Arc<Mutex<Vec<T>>>;

    fn session_with(transport: &ScriptedTransport) -> Session {
        Session::new(
            Arc::new(transport.clone()),
            SessionConfig::default(),
            Endpoint::default(),
        )
    }

    fn record_connection(session: &Session) -> Recorded<bool> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.on_connection_change(Box::new(move |c| sink.lock().unwrap().push(c)));
        seen
    }

    fn record_state(session: &Session) -> Recorded<ForkliftTelemetry> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        session.on_state_change(Box::new(move |t| sink.lock().unwrap().push(*t)));
        seen
    }

    /// Lets the pump task drain whatever the test injected.
    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_connect_notifies_true_and_reports_connected() {
        // Arrange
        let transport = ScriptedTransport::new();
        let session = session_with(&transport);
        let seen = record_connection(&session);

        // Act
        let result = session.connect("192.168.4.1", 81).await;

        // Assert
        assert_ok!(result);
        assert!(session.is_connected());
        assert_eq!(*seen.lock().unwrap(), vec![true]);
        assert_eq!(transport.open_calls(), vec![Endpoint::default()]);
    }

    #[tokio::test]
    async fn test_connect_twice_is_already_active() {
        let transport = ScriptedTransport::new();
        let session = session_with(&transport);
        session.connect("192.168.4.1", 81).await.unwrap();

        let second = session.connect("192.168.4.1", 81).await;

        assert_eq!(second, Err(ConnectError::AlreadyActive));
        assert_eq!(transport.open_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_endpoint_never_reaches_transport() {
        // Arrange
        let mut mock = MockTransport::new();
        mock.expect_open().never();
        let session = Session::new(
            Arc::new(mock),
            SessionConfig::default(),
            Endpoint::default(),
        );

        // Act
        let empty_host = session.connect("", 81).await;
        let zero_port = session.connect("192.168.4.1", 0).await;

        // Assert
        assert!(matches!(empty_host, Err(ConnectError::InvalidEndpoint(_))));
        assert!(matches!(zero_port, Err(ConnectError::InvalidEndpoint(_))));
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_failed_connect_without_prior_true_does_not_notify() {
        // Arrange
        let transport = ScriptedTransport::new();
        transport.push_outcome(ScriptedOutcome::Refuse("connection refused".into()));
        let session = session_with(&transport);
        let seen = record_connection(&session);

        // Act
        let result = session.connect("192.168.4.1", 81).await;

        // Assert
        assert!(matches!(result, Err(ConnectError::Refused { .. })));
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_times_out_with_configured_timeout() {
        let transport = ScriptedTransport::new();
        transport.push_outcome(ScriptedOutcome::Hang);
        let config = SessionConfig {
            connect_timeout: Duration::from_millis(250),
            ..SessionConfig::default()
        };
        let session = Session::new(Arc::new(transport.clone()), config, Endpoint::default());

        let result = session.connect("192.168.4.1", 81).await;

        assert_eq!(result, Err(ConnectError::Timeout(Duration::from_millis(250))));
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_during_connect_cancels_it() {
        // Arrange
        let transport = ScriptedTransport::new();
        transport.push_outcome(ScriptedOutcome::Hang);
        let session = Arc::new(session_with(&transport));
        let seen = record_connection(&session);
        let pending = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.connect("192.168.4.1", 81).await })
        };
        while !matches!(session.connection_state(), ConnectionState::Connecting { .. }) {
            tokio::task::yield_now().await;
        }

        // Act
        session.disconnect();
        let result = pending.await.unwrap();

        // Assert
        assert_eq!(result, Err(ConnectError::Cancelled));
        assert_eq!(session.connection_state(), ConnectionState::Disconnected);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_while_disconnected_never_transmits() {
        let transport = ScriptedTransport::new();
        let session = session_with(&transport);

        assert_eq!(session.send_movement(0.5, 0.5), Err(SendError::NotConnected));
        assert_eq!(session.release_movement(), Err(SendError::NotConnected));
        assert_eq!(session.send_fork(ForkDelta::Up), Err(SendError::NotConnected));
        assert!(transport.sent_frames().is_empty());
        assert_eq!(session.telemetry(), ForkliftTelemetry::default());
    }

    #[tokio::test]
    async fn test_send_movement_clamps_and_caches_optimistically() {
        // Arrange
        let transport = ScriptedTransport::new();
        let session = session_with(&transport);
        let states = record_state(&session);
        session.connect("192.168.4.1", 81).await.unwrap();

        // Act
        assert_ok!(session.send_movement(5.0, -9.0));

        // Assert
        assert_eq!(
            transport.sent_commands(),
            vec![CommandFrame::Move { x: 1.0, y: -1.0 }]
        );
        assert_eq!(session.telemetry().movement, MovementVector { x: 1.0, y: -1.0 });
        assert_eq!(session.last_sent_movement(), MovementVector { x: 1.0, y: -1.0 });
        // The optimistic echo does not notify.
        assert!(states.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fork_steps_accumulate_in_cache() {
        let transport = ScriptedTransport::new();
        let session = session_with(&transport);
        session.connect("192.168.4.1", 81).await.unwrap();

        session.send_fork(ForkDelta::Up).unwrap();
        session.send_fork(ForkDelta::Up).unwrap();
        session.send_fork(ForkDelta::Down).unwrap();

        assert_eq!(session.telemetry().fork_height, 1);
        assert_eq!(
            transport.sent_commands(),
            vec![
                CommandFrame::Fork { delta: 1 },
                CommandFrame::Fork { delta: 1 },
                CommandFrame::Fork { delta: -1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_release_after_suppressed_repeats_still_transmits_stop() {
        // Arrange
        let transport = ScriptedTransport::new();
        let session = session_with(&transport);
        session.connect("192.168.4.1", 81).await.unwrap();

        // Act
        for _ in 0..5 {
            session.send_movement(0.4, 0.4).unwrap();
        }
        session.release_movement().unwrap();
        session.release_movement().unwrap();

        // Assert
        assert_eq!(
            transport.sent_commands(),
            vec![
                CommandFrame::Move { x: 0.4, y: 0.4 },
                CommandFrame::Move { x: 0.0, y: 0.0 },
                CommandFrame::Move { x: 0.0, y: 0.0 },
            ]
        );
        assert_eq!(session.telemetry().movement, MovementVector::ZERO);
    }

    #[tokio::test]
    async fn test_saturated_link_resets_throttle_memory() {
        // Arrange
        let transport = ScriptedTransport::new();
        let session = session_with(&transport);
        session.connect("192.168.4.1", 81).await.unwrap();
        transport.set_saturated(true);

        // Act
        let dropped = session.send_movement(0.7, 0.0);
        transport.set_saturated(false);
        let retried = session.send_movement(0.7, 0.0);

        // Assert
        assert_eq!(dropped, Err(SendError::Saturated));
        assert_ok!(retried);
        assert_eq!(
            transport.sent_commands(),
            vec![CommandFrame::Move { x: 0.7, y: 0.0 }]
        );
    }

    #[tokio::test]
    async fn test_telemetry_frame_replaces_cache_and_notifies_once() {
        // Arrange
        let transport = ScriptedTransport::new();
        let session = session_with(&transport);
        let states = record_state(&session);
        session.connect("192.168.4.1", 81).await.unwrap();

        // Act
        assert!(transport.push_frame(
            r#"{"type":"state","movement":{"x":0.25,"y":-0.5},"forkHeight":7}"#
        ));
        settle().await;

        // Assert
        let expected = ForkliftTelemetry {
            movement: MovementVector { x: 0.25, y: -0.5 },
            fork_height: 7,
        };
        assert_eq!(*states.lock().unwrap(), vec![expected]);
        assert_eq!(session.telemetry(), expected);
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_cache_and_is_silent() {
        // Arrange
        let transport = ScriptedTransport::new();
        let session = session_with(&transport);
        let states = record_state(&session);
        session.connect("192.168.4.1", 81).await.unwrap();
        session.send_fork(ForkDelta::Up).unwrap();
        let before = session.telemetry();

        // Act
        transport.push_frame(r#"{"type":"state","movement":{"x":0.1}"#);
        transport.push_frame(r#"{"type":"state","movement":{"x":3.0,"y":0.0},"forkHeight":1}"#);
        transport.push_frame("not json at all");
        settle().await;

        // Assert
        assert_eq!(session.telemetry(), before);
        assert!(states.lock().unwrap().is_empty());
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_device_close_notifies_false_once_and_records_loss() {
        // Arrange
        let transport = ScriptedTransport::new();
        let session = session_with(&transport);
        let seen = record_connection(&session);
        session.connect("192.168.4.1", 81).await.unwrap();

        // Act
        transport.close_from_device();
        settle().await;
        session.disconnect();

        // Assert
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
        assert!(!session.is_connected());
        assert_eq!(
            session.last_connection_loss(),
            Some(ConnectionLost {
                reason: "closed by controller".into()
            })
        );
        assert_err!(session.send_fork(ForkDelta::Down));
    }

    #[tokio::test]
    async fn test_link_error_is_reported_as_loss_reason() {
        let transport = ScriptedTransport::new();
        let session = session_with(&transport);
        session.connect("192.168.4.1", 81).await.unwrap();

        transport.fail_link("connection reset by peer");
        settle().await;

        assert!(!session.is_connected());
        assert_eq!(
            session.last_connection_loss().map(|l| l.reason),
            Some("connection reset by peer".to_string())
        );
    }

    #[tokio::test]
    async fn test_disconnect_twice_notifies_false_once() {
        // Arrange
        let transport = ScriptedTransport::new();
        let session = session_with(&transport);
        let seen = record_connection(&session);
        session.connect("192.168.4.1", 81).await.unwrap();

        // Act
        session.disconnect();
        session.disconnect();

        // Assert
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
        assert_eq!(transport.closed_links(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_when_never_connected_is_silent() {
        let transport = ScriptedTransport::new();
        let session = session_with(&transport);
        let seen = record_connection(&session);

        session.disconnect();

        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_resets_movement_but_keeps_fork_height() {
        // Arrange
        let transport = ScriptedTransport::new();
        let session = session_with(&transport);
        session.connect("192.168.4.1", 81).await.unwrap();
        session.send_movement(0.6, 0.6).unwrap();
        session.send_fork(ForkDelta::Up).unwrap();
        session.disconnect();

        // Telemetry and last sent movement survive the disconnect.
        assert_eq!(session.telemetry().movement, MovementVector { x: 0.6, y: 0.6 });
        assert_eq!(session.last_sent_movement(), MovementVector { x: 0.6, y: 0.6 });

        // Act
        session.connect("192.168.4.1", 81).await.unwrap();

        // Assert
        assert_eq!(session.telemetry().movement, MovementVector::ZERO);
        assert_eq!(session.telemetry().fork_height, 1);
        assert_eq!(session.last_sent_movement(), MovementVector::ZERO);
        // Throttle memory was cleared, so the same vector goes out again.
        session.send_movement(0.6, 0.6).unwrap();
        assert_eq!(transport.sent_commands().len(), 3);
    }

    #[tokio::test]
    async fn test_frames_from_previous_link_are_ignored() {
        // Arrange
        let transport = ScriptedTransport::new();
        let session = session_with(&transport);
        let states = record_state(&session);
        session.connect("192.168.4.1", 81).await.unwrap();

        // Act: after disconnect, the old link has nobody listening.
        session.disconnect();
        let delivered = transport.push_frame(
            r#"{"type":"state","movement":{"x":0.5,"y":0.5},"forkHeight":2}"#,
        );
        settle().await;

        // Assert
        assert!(!delivered);
        assert!(states.lock().unwrap().is_empty());
        assert_eq!(session.telemetry(), ForkliftTelemetry::default());
    }

    #[tokio::test]
    async fn test_frame_queued_before_disconnect_is_ignored() {
        // Arrange
        let transport = ScriptedTransport::new();
        let session = session_with(&transport);
        let states = record_state(&session);
        session.connect("192.168.4.1", 81).await.unwrap();
        assert!(transport.push_frame(
            r#"{"type":"state","movement":{"x":0.5,"y":0.5},"forkHeight":2}"#
        ));

        // Act: the pump only sees the frame after disconnect.
        session.disconnect();
        settle().await;

        // Assert
        assert!(states.lock().unwrap().is_empty());
        assert_eq!(session.telemetry(), ForkliftTelemetry::default());
    }

    #[tokio::test]
    async fn test_frames_buffered_on_old_link_are_ignored_after_reconnect() {
        // Arrange
        let transport = ScriptedTransport::new();
        let session = session_with(&transport);
        let states = record_state(&session);
        let connections = record_connection(&session);
        session.connect("192.168.4.1", 81).await.unwrap();
        assert!(transport.push_frame(
            r#"{"type":"state","movement":{"x":0.5,"y":0.5},"forkHeight":2}"#
        ));
        transport.close_from_device();

        // Act: the first link's pump drains only after the second link is up.
        session.disconnect();
        session.connect("192.168.4.1", 81).await.unwrap();
        settle().await;

        // Assert
        assert!(states.lock().unwrap().is_empty());
        assert_eq!(session.telemetry(), ForkliftTelemetry::default());
        assert!(session.is_connected());
        assert_eq!(session.last_connection_loss(), None);
        assert_eq!(*connections.lock().unwrap(), vec![true, false, true]);

        // The second link still delivers.
        assert!(transport.push_frame(
            r#"{"type":"state","movement":{"x":0.0,"y":0.0},"forkHeight":5}"#
        ));
        settle().await;
        assert_eq!(
            states.lock().unwrap().iter().map(|t| t.fork_height).collect::<Vec<_>>(),
            vec![5]
        );
    }

    /// A link the controller has already closed by the time `open` returns.
    struct ClosedOnArrival;

    struct InertLink;

    impl Link for InertLink {
        fn transmit(&self, _frame: &str) -> Result<(), LinkError> {
            Ok(())
        }

        fn close(&self) {}
    }

    #[async_trait]
    impl Transport for ClosedOnArrival {
        async fn open(&self, _endpoint: &Endpoint) -> Result<LinkHandle, ConnectError> {
            let (tx, rx) = mpsc::channel(1);
            tx.try_send(LinkEvent::Closed)
                .expect("fresh channel has room");
            Ok(LinkHandle {
                link: Box::new(InertLink),
                events: rx,
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_immediate_close_is_announced_after_connect_on_multi_thread_runtime() {
        for _ in 0..500 {
            // Arrange
            let session = Session::new(
                Arc::new(ClosedOnArrival),
                SessionConfig::default(),
                Endpoint::default(),
            );
            let seen = record_connection(&session);

            // Act
            session.connect("192.168.4.1", 81).await.unwrap();
            let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
            while seen.lock().unwrap().len() < 2 && tokio::time::Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }

            // Assert
            assert_eq!(*seen.lock().unwrap(), vec![true, false]);
            assert!(!session.is_connected());
        }
    }

    #[tokio::test]
    async fn test_subscriber_disconnecting_on_connect_sees_ordered_notifications() {
        // Arrange
        let transport = ScriptedTransport::new();
        let session = Arc::new(session_with(&transport));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let weak = Arc::downgrade(&session);
        session.on_connection_change(Box::new(move |connected| {
            sink.lock().unwrap().push(connected);
            if connected {
                if let Some(session) = weak.upgrade() {
                    session.disconnect();
                }
            }
        }));

        // Act
        session.connect("192.168.4.1", 81).await.unwrap();

        // Assert
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn test_endpoint_reports_default_then_last_used() {
        let transport = ScriptedTransport::new();
        let session = session_with(&transport);
        assert_eq!(session.endpoint(), Endpoint::default());

        session.connect("10.0.0.9", 8081).await.unwrap();
        session.disconnect();

        assert_eq!(session.endpoint(), Endpoint::new("10.0.0.9", 8081).unwrap());
    }

    #[tokio::test]
    async fn test_fork_height_saturates() {
        let transport = ScriptedTransport::new();
        let session = session_with(&transport);
        session.connect("192.168.4.1", 81).await.unwrap();
        transport.push_frame(&format!(
            r#"{{"type":"state","movement":{{"x":0.0,"y":0.0}},"forkHeight":{}}}"#,
            i32::MAX
        ));
        settle().await;

        session.send_fork(ForkDelta::Up).unwrap();

        assert_eq!(session.telemetry().fork_height, i32::MAX);
    }
}

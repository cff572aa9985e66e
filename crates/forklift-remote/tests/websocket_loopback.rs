//! Loopback tests for the WebSocket transport.
//!
//! # Purpose
//!
//! A tiny fake controller is started on `127.0.0.1:<ephemeral>` with
//! `tokio_tungstenite::accept_async`.  The real `Session` + `WsTransport`
//! connect to it, so these tests cover the actual handshake, text framing,
//! the reader/writer tasks, and both ways a link can end.
//!
//! The fake controller forwards every text frame it receives to the test and
//! sends whatever the test tells it to.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use forklift_core::{Endpoint, ForkDelta, ForkliftTelemetry, MovementVector};
use forklift_remote::application::{ControlSession, Session};
use forklift_remote::domain::{ConnectError, SessionConfig};
use forklift_remote::infrastructure::websocket::WsTransport;

const WAIT: Duration = Duration::from_secs(5);

/// Marker the fake controller reports when the link ends.
const CLOSED: &str = "<closed>";

enum DeviceAction {
    Send(String),
    Close,
}

struct FakeController {
    port: u16,
    received: mpsc::Receiver<String>,
    actions: mpsc::Sender<DeviceAction>,
}

impl FakeController {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let (received_tx, received) = mpsc::channel(32);
        let (actions, mut actions_rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let ws = accept_async(stream).await.expect("handshake");
            let (mut sink, mut stream) = ws.split();
            loop {
                tokio::select! {
                    msg = stream.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            let _ = received_tx.send(text).await;
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                            let _ = received_tx.send(CLOSED.to_string()).await;
                            break;
                        }
                        Some(Ok(_)) => {}
                    },
                    action = actions_rx.recv() => match action {
                        Some(DeviceAction::Send(text)) => {
                            if sink.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Some(DeviceAction::Close) | None => {
                            let _ = sink.close().await;
                            break;
                        }
                    },
                }
            }
        });

        Self {
            port,
            received,
            actions,
        }
    }

    async fn next_frame(&mut self) -> String {
        timeout(WAIT, self.received.recv())
            .await
            .expect("controller waited too long for a frame")
            .expect("controller task ended")
    }

    async fn send(&self, text: &str) {
        self.actions
            .send(DeviceAction::Send(text.to_string()))
            .await
            .expect("controller task ended");
    }

    async fn close(&self) {
        self.actions
            .send(DeviceAction::Close)
            .await
            .expect("controller task ended");
    }
}

fn websocket_session(port: u16) -> Arc<dyn ControlSession> {
    let config = SessionConfig {
        connect_timeout: Duration::from_secs(2),
        ..SessionConfig::default()
    };
    Arc::new(Session::new(
        Arc::new(WsTransport::new(config.outbound_capacity)),
        config,
        Endpoint::new("127.0.0.1", port).expect("valid endpoint"),
    ))
}

#[tokio::test]
async fn test_commands_and_telemetry_cross_a_real_websocket() {
    // Arrange
    let mut controller = FakeController::start().await;
    let session = websocket_session(controller.port);
    let (state_tx, mut state_rx) = mpsc::unbounded_channel();
    session.on_state_change(Box::new(move |t| {
        let _ = state_tx.send(*t);
    }));

    // Act: connect and drive.
    session
        .connect("127.0.0.1", controller.port)
        .await
        .expect("connect to loopback controller");
    session.send_movement(0.5, -0.3).unwrap();
    session.send_fork(ForkDelta::Up).unwrap();
    session.release_movement().unwrap();

    // Assert: frames arrive in call order.
    assert_eq!(controller.next_frame().await, r#"{"type":"move","x":0.5,"y":-0.3}"#);
    assert_eq!(controller.next_frame().await, r#"{"type":"fork","delta":1}"#);
    assert_eq!(controller.next_frame().await, r#"{"type":"move","x":0.0,"y":0.0}"#);

    // Act: the controller reports its state.
    controller
        .send(r#"{"type":"state","movement":{"x":0.0,"y":0.0},"forkHeight":12,"battery":87}"#)
        .await;

    // Assert
    let telemetry = timeout(WAIT, state_rx.recv())
        .await
        .expect("no telemetry notification")
        .expect("subscriber dropped");
    assert_eq!(
        telemetry,
        ForkliftTelemetry {
            movement: MovementVector::ZERO,
            fork_height: 12,
        }
    );
    assert_eq!(session.telemetry().fork_height, 12);

    // Act: the session disconnects; the controller sees the link end.
    session.disconnect();
    assert_eq!(controller.next_frame().await, CLOSED);
}

#[tokio::test]
async fn test_controller_closing_the_link_disconnects_the_session() {
    // Arrange
    let controller = FakeController::start().await;
    let session = websocket_session(controller.port);
    let (conn_tx, mut conn_rx) = mpsc::unbounded_channel();
    session.on_connection_change(Box::new(move |c| {
        let _ = conn_tx.send(c);
    }));
    session.connect("127.0.0.1", controller.port).await.unwrap();
    assert_eq!(conn_rx.recv().await, Some(true));

    // Act
    controller.close().await;

    // Assert
    let flag = timeout(WAIT, conn_rx.recv())
        .await
        .expect("no connection notification");
    assert_eq!(flag, Some(false));
    assert!(!session.is_connected());
    assert!(session.send_movement(0.1, 0.1).is_err());
}

#[tokio::test]
async fn test_nothing_listening_is_refused() {
    // Arrange: reserve a port, then free it.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let session = websocket_session(port);

    // Act
    let result = session.connect("127.0.0.1", port).await;

    // Assert
    assert!(
        matches!(result, Err(ConnectError::Refused { .. })),
        "got {result:?}"
    );
    assert!(!session.is_connected());
}

//! Transport seam and the per-attempt connection state machine.
//!
//! # Architecture
//!
//! The session never touches a socket.  It talks to a [`Transport`], which
//! opens one bidirectional [`Link`] per call, and wraps every attempt in a
//! fresh [`TransportConnection`] that owns the connect timeout, the
//! cancellation path, and the gate that keeps frames off a link that is not
//! open.
//!
//! Infrastructure supplies the real implementation
//! ([`crate::infrastructure::websocket::WsTransport`]); tests supply
//! [`crate::infrastructure::scripted::ScriptedTransport`] or the mockall
//! `MockTransport`.
//!
//! ```text
//! Disconnected ──connect──► Connecting ──handshake ok──► Connected
//!      ▲                        │                            │
//!      │        timeout/refused ▼                            │
//!      │                      Failed                         │
//!      └────────────── disconnect (any state) ◄──────────────┘
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use forklift_core::{ConnectionState, Endpoint};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::domain::errors::{ConnectError, SendError};

// ── Link and transport traits ─────────────────────────────────────────────────

/// What the far side of a link produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// One complete inbound frame, payload bytes only.
    Frame(Vec<u8>),
    /// The peer closed the link cleanly.
    Closed,
    /// The link failed.
    Error(String),
}

/// Why a [`Link`] refused an outbound frame.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("outbound queue is full")]
    Saturated,
    #[error("link is closed")]
    Closed,
}

impl From<LinkError> for SendError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::Saturated => SendError::Saturated,
            LinkError::Closed => SendError::NotConnected,
        }
    }
}

/// The outbound half of an open link.
///
/// `transmit` never blocks: a frame is either handed to the link's writer or
/// rejected immediately.
pub trait Link: Send + Sync {
    fn transmit(&self, frame: &str) -> Result<(), LinkError>;

    /// Closes the link.  Safe to call more than once.
    fn close(&self);
}

/// An open link plus the stream of events it produces.
pub struct LinkHandle {
    pub link: Box<dyn Link>,
    pub events: mpsc::Receiver<LinkEvent>,
}

/// Opens links to a controller endpoint.
///
/// `open` resolves once the handshake completes or fails.  It does not apply
/// a timeout of its own; [`TransportConnection`] bounds it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, endpoint: &Endpoint) -> Result<LinkHandle, ConnectError>;
}

// ── TransportConnection ───────────────────────────────────────────────────────

enum Phase {
    Disconnected,
    Connecting(Endpoint),
    Connected {
        endpoint: Endpoint,
        since: Instant,
        link: Box<dyn Link>,
    },
    Failed(String),
    /// Terminal: `disconnect` ran.
    Closed,
}

/// One connection attempt and, if it succeeds, the link it produced.
///
/// All methods take `&self` so `disconnect` can run while `connect` is
/// awaiting the handshake.  Frames can only be transmitted in the
/// `Connected` phase.
pub struct TransportConnection {
    transport: Arc<dyn Transport>,
    connect_timeout: Duration,
    phase: Mutex<Phase>,
    /// Bumped on every cancellation; a pending `connect` watches it.
    cancel_epoch: watch::Sender<u64>,
}

impl TransportConnection {
    pub fn new(transport: Arc<dyn Transport>, connect_timeout: Duration) -> Self {
        let (cancel_epoch, _) = watch::channel(0);
        Self {
            transport,
            connect_timeout,
            phase: Mutex::new(Phase::Disconnected),
            cancel_epoch,
        }
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens the link and returns its inbound event stream.
    ///
    /// # Errors
    ///
    /// - [`ConnectError::AlreadyActive`] if an attempt is pending or a link is
    ///   open.
    /// - [`ConnectError::Timeout`] if the handshake outlives the connect
    ///   timeout.
    /// - [`ConnectError::Refused`] if the transport rejects the handshake.
    /// - [`ConnectError::Cancelled`] if [`disconnect`](Self::disconnect) ran
    ///   while the handshake was pending.  A link that opens after the
    ///   cancellation is closed immediately.
    pub async fn connect(
        &self,
        endpoint: Endpoint,
    ) -> Result<mpsc::Receiver<LinkEvent>, ConnectError> {
        let mut cancelled = {
            let mut phase = self.phase();
            match *phase {
                Phase::Connecting(_) | Phase::Connected { .. } => {
                    return Err(ConnectError::AlreadyActive)
                }
                Phase::Closed => return Err(ConnectError::Cancelled),
                Phase::Disconnected | Phase::Failed(_) => {}
            }
            *phase = Phase::Connecting(endpoint.clone());
            // Subscribed under the lock so a cancellation cannot slip in
            // between the phase change and the watch.
            self.cancel_epoch.subscribe()
        };
        let epoch = *cancelled.borrow_and_update();

        debug!("opening link to {endpoint} (timeout {:?})", self.connect_timeout);
        let outcome = tokio::select! {
            _ = cancelled.changed() => None,
            res = tokio::time::timeout(self.connect_timeout, self.transport.open(&endpoint)) => Some(res),
        };

        let mut phase = self.phase();
        let still_ours =
            matches!(*phase, Phase::Connecting(_)) && *self.cancel_epoch.borrow() == epoch;

        match outcome {
            Some(Ok(Ok(handle))) if still_ours => {
                *phase = Phase::Connected {
                    endpoint: endpoint.clone(),
                    since: Instant::now(),
                    link: handle.link,
                };
                info!("link to {endpoint} open");
                Ok(handle.events)
            }
            Some(Ok(Ok(handle))) => {
                drop(phase);
                debug!("link to {endpoint} opened after cancellation; closing it");
                handle.link.close();
                Err(ConnectError::Cancelled)
            }
            _ if !still_ours => Err(ConnectError::Cancelled),
            None => Err(ConnectError::Cancelled),
            Some(Err(_elapsed)) => {
                *phase = Phase::Failed(format!("timed out after {:?}", self.connect_timeout));
                Err(ConnectError::Timeout(self.connect_timeout))
            }
            Some(Ok(Err(err))) => {
                *phase = Phase::Failed(err.to_string());
                Err(err)
            }
        }
    }

    /// Hands one frame to the open link.
    ///
    /// # Errors
    ///
    /// [`SendError::NotConnected`] outside the `Connected` phase or when the
    /// link has already gone away; [`SendError::Saturated`] when the link's
    /// outbound queue is full.  Nothing is queued in either case.
    pub fn send(&self, frame: &str) -> Result<(), SendError> {
        match &*self.phase() {
            Phase::Connected { link, .. } => link.transmit(frame).map_err(SendError::from),
            _ => Err(SendError::NotConnected),
        }
    }

    /// Closes the link or cancels a pending attempt.  The connection cannot
    /// be reused afterwards; a later `connect` fails with
    /// [`ConnectError::Cancelled`].
    ///
    /// Idempotent.  Returns `true` if a link was open or an attempt was
    /// pending.
    pub fn disconnect(&self) -> bool {
        let previous = std::mem::replace(&mut *self.phase(), Phase::Closed);
        match previous {
            Phase::Connecting(endpoint) => {
                self.cancel_epoch.send_modify(|epoch| *epoch += 1);
                debug!("cancelled pending connect to {endpoint}");
                true
            }
            Phase::Connected { endpoint, link, .. } => {
                link.close();
                info!("link to {endpoint} closed");
                true
            }
            Phase::Disconnected | Phase::Failed(_) | Phase::Closed => false,
        }
    }

    /// Observable state of this attempt.
    pub fn state(&self) -> ConnectionState {
        match &*self.phase() {
            Phase::Disconnected | Phase::Closed => ConnectionState::Disconnected,
            Phase::Connecting(endpoint) => ConnectionState::Connecting {
                endpoint: endpoint.clone(),
            },
            Phase::Connected {
                endpoint, since, ..
            } => ConnectionState::Connected {
                endpoint: endpoint.clone(),
                since: *since,
            },
            Phase::Failed(reason) => ConnectionState::Failed {
                reason: reason.clone(),
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

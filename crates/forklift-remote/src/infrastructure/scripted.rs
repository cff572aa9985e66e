//! Scripted in-memory transport for tests and offline demos.
//!
//! # Why a scripted transport?
//!
//! The real [`WsTransport`](super::websocket::WsTransport) needs a controller
//! (or a local WebSocket server) to talk to, and its timing depends on the
//! network.  `ScriptedTransport` replaces the socket with in-memory state:
//!
//! - every `open()` call is recorded and answered from a queue of
//!   [`ScriptedOutcome`]s (default: accept),
//! - every transmitted frame is recorded in order,
//! - the test injects inbound frames and link drops on demand.
//!
//! Clones share the same state, so a test keeps one clone for assertions and
//! hands another to the session.
//!
//! ```ignore
//! let transport = ScriptedTransport::new();
//! let session = Session::new(Arc::new(transport.clone()), SessionConfig::default(), Endpoint::default());
//!
//! session.connect("192.168.4.1", 81).await?;
//! session.send_fork(ForkDelta::Up)?;
//! assert_eq!(transport.sent_frames(), vec![r#"{"type":"fork","delta":1}"#]);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use forklift_core::protocol::CommandFrame;
use forklift_core::Endpoint;
use tokio::sync::mpsc;

use crate::application::transport::{Link, LinkError, LinkEvent, LinkHandle, Transport};
use crate::domain::errors::ConnectError;

/// Inbound events buffered per link before `push_frame` starts failing.
const SCRIPTED_EVENT_CAPACITY: usize = 64;

/// How the next `open()` call behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    /// Complete the handshake immediately.
    Accept,
    /// Fail with [`ConnectError::Refused`] carrying this reason.
    Refuse(String),
    /// Never complete; the caller's timeout or cancellation must end it.
    Hang,
}

#[derive(Default)]
struct ScriptState {
    outcomes: VecDeque<ScriptedOutcome>,
    open_calls: Vec<Endpoint>,
    sent: Vec<String>,
    /// Sender side of the most recently opened link's event stream.
    inbound: Option<mpsc::Sender<LinkEvent>>,
    link_id: u64,
    closed_links: usize,
    saturated: bool,
}

/// A [`Transport`] whose behaviour is driven by the test.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues the behaviour of a future `open()` call.
    pub fn push_outcome(&self, outcome: ScriptedOutcome) {
        self.state().outcomes.push_back(outcome);
    }

    /// Endpoints passed to `open()`, in call order.
    pub fn open_calls(&self) -> Vec<Endpoint> {
        self.state().open_calls.clone()
    }

    /// Every frame transmitted on any link, in order.
    pub fn sent_frames(&self) -> Vec<String> {
        self.state().sent.clone()
    }

    /// Transmitted frames parsed back into [`CommandFrame`]s.  Frames that do
    /// not parse are skipped.
    pub fn sent_commands(&self) -> Vec<CommandFrame> {
        self.state()
            .sent
            .iter()
            .filter_map(|text| CommandFrame::parse(text).ok())
            .collect()
    }

    /// Number of links closed from the session side.
    pub fn closed_links(&self) -> usize {
        self.state().closed_links
    }

    /// While set, every `transmit` fails with [`LinkError::Saturated`].
    pub fn set_saturated(&self, saturated: bool) {
        self.state().saturated = saturated;
    }

    /// Delivers an inbound frame on the current link.  Returns `false` if no
    /// link is open or its buffer is full.
    pub fn push_frame(&self, text: &str) -> bool {
        self.push_event(LinkEvent::Frame(text.as_bytes().to_vec()))
    }

    /// Simulates the controller closing the link.
    pub fn close_from_device(&self) -> bool {
        self.push_event(LinkEvent::Closed)
    }

    /// Simulates a link failure.
    pub fn fail_link(&self, reason: &str) -> bool {
        self.push_event(LinkEvent::Error(reason.to_string()))
    }

    fn push_event(&self, event: LinkEvent) -> bool {
        match &self.state().inbound {
            Some(tx) => tx.try_send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, endpoint: &Endpoint) -> Result<LinkHandle, ConnectError> {
        let outcome = {
            let mut state = self.state();
            state.open_calls.push(endpoint.clone());
            state.outcomes.pop_front().unwrap_or(ScriptedOutcome::Accept)
        };

        match outcome {
            ScriptedOutcome::Accept => {
                let (tx, rx) = mpsc::channel(SCRIPTED_EVENT_CAPACITY);
                let id = {
                    let mut state = self.state();
                    state.link_id += 1;
                    state.inbound = Some(tx);
                    state.link_id
                };
                Ok(LinkHandle {
                    link: Box::new(ScriptedLink {
                        id,
                        state: Arc::clone(&self.state),
                        closed: Mutex::new(false),
                    }),
                    events: rx,
                })
            }
            ScriptedOutcome::Refuse(reason) => Err(ConnectError::Refused { reason }),
            ScriptedOutcome::Hang => std::future::pending().await,
        }
    }
}

struct ScriptedLink {
    id: u64,
    state: Arc<Mutex<ScriptState>>,
    closed: Mutex<bool>,
}

impl ScriptedLink {
    fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Link for ScriptedLink {
    fn transmit(&self, frame: &str) -> Result<(), LinkError> {
        if self.is_closed() {
            return Err(LinkError::Closed);
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.saturated {
            return Err(LinkError::Saturated);
        }
        state.sent.push(frame.to_string());
        Ok(())
    }

    fn close(&self) {
        let mut closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            return;
        }
        *closed = true;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.closed_links += 1;
        if state.link_id == self.id {
            state.inbound = None;
        }
    }
}

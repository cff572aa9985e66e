//! WebSocket transport to the forklift controller.
//!
//! This module is responsible for:
//!
//! 1. Performing the WebSocket client handshake against `ws://host:port/`.
//! 2. Splitting the stream into a write sink and a read stream.
//! 3. Running two Tokio tasks per link:
//!    - **Writer**: drains a bounded queue of outbound text frames into the
//!      sink.  The session fills the queue with `try_send`, so a slow link
//!      drops commands instead of blocking the caller.
//!    - **Reader**: turns inbound WebSocket messages into [`LinkEvent`]s for
//!      the session's pump task.
//! 4. Closing the link when the session asks, which stops both tasks.
//!
//! The connect timeout is applied one level up by `TransportConnection`, so
//! `open` here simply awaits the handshake.

use async_trait::async_trait;
use forklift_core::Endpoint;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::application::transport::{Link, LinkError, LinkEvent, LinkHandle, Transport};
use crate::domain::errors::ConnectError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Inbound events buffered between the reader task and the session pump.
const INBOUND_CAPACITY: usize = 64;

// ── Public API ────────────────────────────────────────────────────────────────

/// [`Transport`] that speaks plain WebSocket to the controller.
#[derive(Debug, Clone)]
pub struct WsTransport {
    outbound_capacity: usize,
}

impl WsTransport {
    /// `outbound_capacity` is the number of frames that may wait for the
    /// writer task before `transmit` starts returning
    /// [`LinkError::Saturated`].  Values below 1 are raised to 1.
    pub fn new(outbound_capacity: usize) -> Self {
        Self {
            outbound_capacity: outbound_capacity.max(1),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, endpoint: &Endpoint) -> Result<LinkHandle, ConnectError> {
        let url = endpoint.ws_url();

        // `connect_async` resolves the host, opens the TCP socket and performs
        // the HTTP Upgrade.  The response carries nothing we need.
        let (ws_stream, _response) =
            connect_async(url.as_str())
                .await
                .map_err(|e| ConnectError::Refused {
                    reason: format!("{url}: {e}"),
                })?;

        info!("WebSocket handshake with {url} complete");

        let (sink, stream) = ws_stream.split();
        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(self.outbound_capacity);
        let (event_tx, event_rx) = mpsc::channel::<LinkEvent>(INBOUND_CAPACITY);
        let (close_tx, close_rx) = watch::channel(false);

        tokio::spawn(run_writer(sink, outbound_rx, close_rx, url.clone()));
        let reader = tokio::spawn(run_reader(stream, event_tx, url));

        Ok(LinkHandle {
            link: Box::new(WsLink {
                outbound: outbound_tx,
                close: close_tx,
                reader,
            }),
            events: event_rx,
        })
    }
}

// ── Link ──────────────────────────────────────────────────────────────────────

struct WsLink {
    outbound: mpsc::Sender<String>,
    close: watch::Sender<bool>,
    reader: JoinHandle<()>,
}

impl Link for WsLink {
    fn transmit(&self, frame: &str) -> Result<(), LinkError> {
        self.outbound
            .try_send(frame.to_owned())
            .map_err(|e| match e {
                TrySendError::Full(_) => LinkError::Saturated,
                TrySendError::Closed(_) => LinkError::Closed,
            })
    }

    fn close(&self) {
        // The writer sends the Close frame; queued commands are discarded.
        self.close.send_replace(true);
        self.reader.abort();
    }
}

impl Drop for WsLink {
    fn drop(&mut self) {
        self.close.send_replace(true);
        self.reader.abort();
    }
}

// ── Tasks ─────────────────────────────────────────────────────────────────────

async fn run_writer(
    mut sink: SplitSink<WsStream, WsMessage>,
    mut outbound: mpsc::Receiver<String>,
    mut close: watch::Receiver<bool>,
    url: String,
) {
    loop {
        tokio::select! {
            // Close wins over queued frames.
            biased;
            changed = close.changed() => {
                if changed.is_err() || *close.borrow() {
                    break;
                }
            }
            next = outbound.recv() => {
                let Some(text) = next else { break };
                if let Err(e) = sink.send(WsMessage::Text(text)).await {
                    debug!("{url}: WebSocket send failed: {e}");
                    return;
                }
            }
        }
    }

    // Sends the Close frame and flushes.
    if let Err(e) = sink.close().await {
        debug!("{url}: WebSocket close failed: {e}");
    }
}

async fn run_reader(
    mut stream: SplitStream<WsStream>,
    events: mpsc::Sender<LinkEvent>,
    url: String,
) {
    let last = loop {
        let payload = match stream.next().await {
            Some(Ok(WsMessage::Text(text))) => text.into_bytes(),
            Some(Ok(WsMessage::Binary(bytes))) => bytes,
            Some(Ok(WsMessage::Close(frame))) => {
                debug!("{url}: Close frame received: {frame:?}");
                break LinkEvent::Closed;
            }
            // Pong replies to pings are queued by tungstenite itself.
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => continue,
            Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                break LinkEvent::Closed;
            }
            Some(Err(e)) => {
                warn!("{url}: WebSocket read error: {e}");
                break LinkEvent::Error(e.to_string());
            }
        };

        if events.send(LinkEvent::Frame(payload)).await.is_err() {
            // Session dropped the receiver; nobody is listening any more.
            return;
        }
    };

    let _ = events.send(last).await;
}

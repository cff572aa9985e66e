//! Error taxonomy of the control session.
//!
//! | Error            | Surfaces to                         | Recovery              |
//! |------------------|-------------------------------------|-----------------------|
//! | `ConnectError`   | caller of `connect()`               | user retries          |
//! | `SendError`      | caller of `send_movement/send_fork` | command is dropped    |
//! | `DecodeError`    | nobody (logged at debug)            | frame is discarded    |
//! | `ConnectionLost` | connection subscribers (`false`)    | user reconnects       |

use std::time::Duration;

use forklift_core::EndpointError;
use thiserror::Error;

/// Why a `connect()` call did not produce a live link.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    /// Host empty or port out of range.  No network operation was attempted.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] EndpointError),

    /// A connection is already being established or is established.
    #[error("a connection is already active")]
    AlreadyActive,

    /// The handshake did not complete within the connect timeout.
    #[error("controller did not answer within {0:?}")]
    Timeout(Duration),

    /// The controller refused the connection or the handshake failed.
    #[error("connection refused: {reason}")]
    Refused { reason: String },

    /// `disconnect()` was called while the attempt was pending.
    #[error("connection attempt cancelled")]
    Cancelled,
}

/// Why a command was not transmitted.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SendError {
    /// The session is not connected; nothing was sent.
    #[error("not connected to the controller")]
    NotConnected,

    /// The outbound channel is full; the command was dropped, not queued.
    #[error("link saturated, command dropped")]
    Saturated,
}

/// The controller closed the link, or the link failed, while connected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("connection to the controller lost: {reason}")]
pub struct ConnectionLost {
    pub reason: String,
}

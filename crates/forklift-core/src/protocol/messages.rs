//! Wire frames exchanged with the controller firmware.
//!
//! Every frame is one WebSocket text message holding one JSON object.  The
//! `"type"` field identifies the variant and the remaining fields are
//! flattened into the same object:
//!
//! ```json
//! {"type":"move","x":0.5,"y":-0.3}
//! {"type":"fork","delta":1}
//! {"type":"state","movement":{"x":0.5,"y":-0.3},"forkHeight":0}
//! ```
//!
//! Outbound and inbound frames are separate enums so a telemetry frame can
//! never be sent to the controller by mistake, and vice versa.

use serde::{Deserialize, Serialize};

use crate::domain::telemetry::{ForkDelta, MovementVector};

/// An outbound command, already clamped and rounded by the encoder.
///
/// This is the abstract record the session hands to the transport; the
/// concrete JSON text comes from [`Command::to_frame`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Move(MovementVector),
    Fork(ForkDelta),
}

impl Command {
    /// Serializes the command into its wire text.
    pub fn to_frame(&self) -> String {
        let frame = match *self {
            Command::Move(v) => CommandFrame::Move { x: v.x, y: v.y },
            Command::Fork(delta) => CommandFrame::Fork {
                delta: delta.step(),
            },
        };
        // Serializing a tagged enum of plain numbers cannot fail.
        serde_json::to_string(&frame).unwrap_or_default()
    }

    /// Short variant name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Move(_) => "move",
            Command::Fork(_) => "fork",
        }
    }
}

/// JSON shape of an outbound command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CommandFrame {
    /// Drive vector, both axes in `[-1.0, 1.0]` with 2 decimals.
    Move { x: f64, y: f64 },
    /// One fork step: `1` raises, `-1` lowers.
    Fork { delta: i32 },
}

impl CommandFrame {
    /// Parses outbound wire text back into its frame.  Used by test doubles
    /// and the simulator to inspect what the session transmitted.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error when `text` is not a command frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// JSON shape of an inbound frame.  Unknown extra fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TelemetryFrame {
    State {
        movement: MovementVector,
        #[serde(rename = "forkHeight")]
        fork_height: i32,
    },
}

//! Command encoder and telemetry decoder.
//!
//! The encoder is the only place where joystick input is clamped, rounded,
//! and checked against the last transmitted vector.  The decoder is the only
//! place where inbound bytes become a [`ForkliftTelemetry`].
//!
//! Neither type performs I/O; the session decides what to do with their
//! output.

use thiserror::Error;
use tracing::trace;

use crate::domain::telemetry::{ForkDelta, ForkliftTelemetry, MovementVector};
use crate::protocol::messages::{Command, TelemetryFrame};

/// Errors produced by [`TelemetryDecoder::decode`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame is not valid JSON, has the wrong shape, misses a required
    /// field, or carries an out-of-domain value.
    #[error("malformed telemetry frame: {reason}")]
    Malformed { reason: String },
}

impl DecodeError {
    fn malformed(reason: impl Into<String>) -> Self {
        DecodeError::Malformed {
            reason: reason.into(),
        }
    }
}

// ── Encoder ───────────────────────────────────────────────────────────────────

/// Turns user intents into outbound [`Command`]s.
///
/// # Repeat suppression
///
/// Joystick widgets report at a high rate and often repeat the same value.
/// When suppression is on, a movement request equal to the last transmitted
/// vector yields `None` so the link is not flooded.  [`encode_release`]
/// ignores suppression: the stop command always goes out.
///
/// Fork steps are never suppressed.
///
/// [`encode_release`]: CommandEncoder::encode_release
#[derive(Debug, Clone)]
pub struct CommandEncoder {
    last_movement: Option<MovementVector>,
    suppress_repeats: bool,
}

impl CommandEncoder {
    /// Creates an encoder with repeat suppression enabled.
    pub fn new() -> Self {
        Self::with_suppression(true)
    }

    pub fn with_suppression(suppress_repeats: bool) -> Self {
        Self {
            last_movement: None,
            suppress_repeats,
        }
    }

    /// Encodes a joystick sample.
    ///
    /// Returns `None` when the clamped vector equals the last transmitted one
    /// and suppression is enabled.  A returned command is recorded as
    /// transmitted.
    pub fn encode_movement(&mut self, x: f64, y: f64) -> Option<Command> {
        let vector = MovementVector::clamped(x, y);
        if self.suppress_repeats && self.last_movement == Some(vector) {
            trace!("suppressed repeated movement ({:.2}, {:.2})", vector.x, vector.y);
            return None;
        }
        self.last_movement = Some(vector);
        Some(Command::Move(vector))
    }

    /// Encodes the joystick release: always `(0.0, 0.0)`, never suppressed.
    pub fn encode_release(&mut self) -> Command {
        self.last_movement = Some(MovementVector::ZERO);
        Command::Move(MovementVector::ZERO)
    }

    /// Encodes one fork step.  Every call produces exactly one command.
    pub fn encode_fork(&self, delta: ForkDelta) -> Command {
        Command::Fork(delta)
    }

    /// Last movement recorded as transmitted, if any.
    pub fn last_movement(&self) -> Option<MovementVector> {
        self.last_movement
    }

    /// Forgets the last transmitted vector so the next request always goes out.
    pub fn reset(&mut self) {
        self.last_movement = None;
    }
}

impl Default for CommandEncoder {
    fn default() -> Self {
        Self::new()
    }
}

// ── Decoder ───────────────────────────────────────────────────────────────────

/// Parses inbound frames into [`ForkliftTelemetry`].
///
/// Decoding never panics; every failure is reported as
/// [`DecodeError::Malformed`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetryDecoder;

impl TelemetryDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decodes one raw frame.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] when the bytes are not UTF-8 JSON,
    /// the `type` tag is unknown, a field is missing or has the wrong type,
    /// or the movement vector leaves `[-1.0, 1.0]`.
    pub fn decode(&self, raw: &[u8]) -> Result<ForkliftTelemetry, DecodeError> {
        let frame: TelemetryFrame =
            serde_json::from_slice(raw).map_err(|e| DecodeError::malformed(e.to_string()))?;

        match frame {
            TelemetryFrame::State {
                movement,
                fork_height,
            } => {
                if !movement.is_in_domain() {
                    return Err(DecodeError::malformed(format!(
                        "movement ({}, {}) outside [-1, 1]",
                        movement.x, movement.y
                    )));
                }
                Ok(ForkliftTelemetry {
                    movement,
                    fork_height,
                })
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Movement, fork, telemetry and connection-state value types.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::domain::endpoint::Endpoint;

/// Rounds to the 2-decimal precision used on the wire.
fn round_centi(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// A 2-D drive command or report.  Both axes lie in `[-1.0, 1.0]`.
///
/// `x` is the steering axis and `y` the throttle axis, exactly as sampled
/// from the joystick.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MovementVector {
    pub x: f64,
    pub y: f64,
}

impl MovementVector {
    /// The stopped vector.
    pub const ZERO: MovementVector = MovementVector { x: 0.0, y: 0.0 };

    /// Normalizes raw joystick input into a wire-ready vector.
    ///
    /// Non-finite components become `0.0`, then each component is clamped to
    /// `[-1.0, 1.0]` and rounded to 2 decimal places.
    ///
    /// ```rust
    /// use forklift_core::MovementVector;
    ///
    /// let v = MovementVector::clamped(5.0, -9.0);
    /// assert_eq!(v, MovementVector { x: 1.0, y: -1.0 });
    /// ```
    pub fn clamped(x: f64, y: f64) -> Self {
        let norm = |v: f64| {
            if v.is_finite() {
                round_centi(v.clamp(-1.0, 1.0))
            } else {
                0.0
            }
        };
        Self {
            x: norm(x),
            y: norm(y),
        }
    }

    /// `true` when both components are finite and within `[-1.0, 1.0]`.
    pub fn is_in_domain(&self) -> bool {
        [self.x, self.y]
            .iter()
            .all(|v| v.is_finite() && (-1.0..=1.0).contains(v))
    }
}

/// One discrete fork step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForkDelta {
    Up,
    Down,
}

impl ForkDelta {
    /// Signed step applied to the fork height.
    pub fn step(self) -> i32 {
        match self {
            ForkDelta::Up => 1,
            ForkDelta::Down => -1,
        }
    }
}

/// Last reported (or optimistically assumed) physical state of the rig.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ForkliftTelemetry {
    pub movement: MovementVector,
    #[serde(rename = "forkHeight")]
    pub fork_height: i32,
}

impl ForkliftTelemetry {
    /// Same fork height, movement stopped.
    ///
    /// Used when a fresh connection is established, before the controller has
    /// reported anything.
    pub fn stopped(self) -> Self {
        Self {
            movement: MovementVector::ZERO,
            ..self
        }
    }
}

/// Lifecycle of the link to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting { endpoint: Endpoint },
    Connected { endpoint: Endpoint, since: Instant },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, ConnectionState::Disconnected)
    }

    /// Short label for status displays and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting { .. } => "Connecting",
            ConnectionState::Connected { .. } => "Connected",
            ConnectionState::Failed { .. } => "Failed",
        }
    }
}

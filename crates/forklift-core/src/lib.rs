//! # forklift-core
//!
//! Shared library for the forklift remote containing the domain entities,
//! the JSON wire frames exchanged with the controller firmware, and the
//! command encoder / telemetry decoder pair.
//!
//! This crate has zero dependencies on sockets, async runtimes, or UI code.
//!
//! # Architecture overview (for beginners)
//!
//! The forklift rig is driven by a small Wi-Fi microcontroller that runs its
//! own access point (`192.168.4.1`) and a WebSocket server on port 81.  The
//! remote sends it two kinds of commands:
//!
//! - a continuous **movement vector** sampled from a joystick, and
//! - discrete **fork steps** (up / down) from buttons.
//!
//! The controller answers with **telemetry**: its current movement and fork
//! height.
//!
//! - **`domain`** – Value types with their invariants: `Endpoint`,
//!   `MovementVector`, `ForkDelta`, `ForkliftTelemetry`, `ConnectionState`.
//!
//! - **`protocol`** – How those values travel over the wire.  Commands are
//!   produced by the `CommandEncoder` (clamping, rounding, repeat
//!   suppression) and inbound frames are checked by the `TelemetryDecoder`.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `forklift_core::Endpoint` instead of `forklift_core::domain::endpoint::Endpoint`.
pub use domain::endpoint::{Endpoint, EndpointError, DEFAULT_HOST, DEFAULT_PORT};
pub use domain::telemetry::{ConnectionState, ForkDelta, ForkliftTelemetry, MovementVector};
pub use protocol::codec::{CommandEncoder, DecodeError, TelemetryDecoder};
pub use protocol::messages::Command;

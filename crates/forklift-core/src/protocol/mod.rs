//! Protocol module containing the wire frames and the command/telemetry codec.

pub mod codec;
pub mod messages;

pub use codec::{CommandEncoder, DecodeError, TelemetryDecoder};
pub use messages::{Command, CommandFrame, TelemetryFrame};

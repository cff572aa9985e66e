//! Domain layer: value types shared by the session and the codec.
//!
//! Nothing in here performs I/O.  Every type enforces its own invariant at
//! construction so the rest of the code can take it for granted.

pub mod endpoint;
pub mod telemetry;

pub use endpoint::{Endpoint, EndpointError};
pub use telemetry::{ConnectionState, ForkDelta, ForkliftTelemetry, MovementVector};

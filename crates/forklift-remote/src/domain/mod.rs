//! Domain layer for forklift-remote.
//!
//! Pure types with no I/O of their own: the error taxonomy of the control
//! session and the configuration schema.  (The file helpers in `config`
//! touch the disk, but nothing else in the domain does.)

pub mod config;
pub mod errors;

pub use config::{RemoteConfig, SessionConfig};
pub use errors::{ConnectError, ConnectionLost, SendError};

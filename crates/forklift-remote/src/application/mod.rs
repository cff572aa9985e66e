//! Application layer for forklift-remote.
//!
//! Contains the control session and the seams it depends on.
//!
//! **Dependency rule**: this layer depends on `domain` and `forklift_core`,
//! never on `infrastructure`.  Infrastructure plugs in through the
//! [`transport::Transport`] trait.
//!
//! # Sub-modules
//!
//! - **`control`** – The `ControlSession` trait the UI layer talks to.
//! - **`session`** – `Session`, the real implementation over a transport.
//! - **`simulated`** – `SimulatedSession`, the in-memory stand-in.
//! - **`subscribers`** – Observer lists with registration-order delivery.
//! - **`transport`** – `Transport` / `Link` traits and the
//!   `TransportConnection` state machine.

pub mod control;
pub mod session;
pub mod simulated;
pub mod subscribers;
pub mod transport;

pub use control::ControlSession;
pub use session::Session;
pub use simulated::SimulatedSession;
pub use subscribers::{ConnectionSubscriber, StateSubscriber};
pub use transport::{Link, LinkError, LinkEvent, LinkHandle, Transport, TransportConnection};

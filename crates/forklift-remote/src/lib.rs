//! forklift-remote library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does forklift-remote do? (for beginners)
//!
//! The forklift rig is driven by a microcontroller that exposes a WebSocket
//! server on its own Wi-Fi access point.  This crate owns the *control
//! session* with that controller:
//!
//! 1. Opens one WebSocket link to the controller (bounded by a timeout).
//! 2. Turns joystick vectors and fork button presses into command frames.
//! 3. Turns the controller's telemetry frames into a cached
//!    `ForkliftTelemetry` snapshot and notifies subscribers.
//! 4. Tears the link down on request or when the controller goes away,
//!    without ever reconnecting on its own.
//!
//! # Layers
//!
//! ```text
//! main.rs  (config, logging, infrastructure::console shell)
//!   └─ application::ControlSession        <- Session | SimulatedSession
//!        └─ application::transport::TransportConnection
//!             └─ dyn Transport            <- infrastructure::websocket::WsTransport
//!                                            infrastructure::scripted::ScriptedTransport
//! ```

/// Domain layer: configuration and error taxonomy.
pub mod domain;

/// Application layer: the control session, its simulated twin, and the
/// subscriber lists.
pub mod application;

/// Infrastructure layer: WebSocket and scripted transports, console shell.
pub mod infrastructure;

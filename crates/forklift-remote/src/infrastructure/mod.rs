//! Infrastructure layer for forklift-remote.
//!
//! Contains the I/O-facing adapters: the WebSocket transport, an in-memory
//! scripted transport, and the line-oriented console shell.
//!
//! **Dependency rule**: this layer may depend on `application`, `domain` and
//! `forklift_core`, but MUST NOT be imported by the `application` or domain
//! layers (outside of their tests).
//!
//! # Sub-modules
//!
//! - **`websocket`** – `WsTransport`, the production `Transport` built on
//!   tokio-tungstenite.
//!
//! - **`scripted`** – `ScriptedTransport`, which records outbound frames and
//!   lets tests inject inbound frames, link drops, refusals and hangs.
//!
//! - **`console`** – Parses operator commands (`move 0.5 -0.3`, `fork up`,
//!   ...) and executes them against any `ControlSession`.

pub mod console;
pub mod scripted;
pub mod websocket;

//! HTTP and WebSocket surface in front of the hub.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `server` | Router, upgrade endpoints, health, listener lifecycle |
//! | `connection` | Per-session read/write pumps |
//! | `publish` | Producer-facing POST endpoints |
//!
//! Credentials are checked here (via `beacon-auth`) before anything
//! touches the hub; the hub only ever sees `(scope, topic, payload)`.

pub mod connection;
pub mod publish;
pub mod server;

pub use server::{build_router, start, AppState, ServerHandle};

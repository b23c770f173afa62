//! The broker state machine: session registry, topic-scoped membership,
//! message fan-out, and slow-consumer eviction.
//!
//! All registry mutation and fan-out enumeration is funneled through a
//! single actor task owning the `scope → topic → session-set` map, so no
//! fan-out ever observes a partially applied insert or remove. Callers
//! hold a cloneable [`Hub`] handle and communicate over a command channel.
//!
//! Transport concerns (the WebSocket read/write pumps) live in
//! `beacon-server`; this crate only owns the bounded per-session buffer
//! and the delivery policy.

pub mod hub;
pub mod session;

pub use hub::Hub;
pub use session::{Session, OUTBOUND_BUFFER};

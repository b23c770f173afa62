//! Shared vocabulary for the beacon broker: session identifiers and the
//! trusted/public audience partition.

pub mod ids;
pub mod scope;

pub use ids::SessionId;
pub use scope::{Scope, DEFAULT_TOPIC};

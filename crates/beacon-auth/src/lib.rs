//! Credential checks performed before a request reaches the hub.
//!
//! Two mechanisms, mirroring the two producer/consumer surfaces:
//! - [`bearer`]: signed bearer credential (HS256 JWT) admitting trusted
//!   streaming sessions.
//! - [`timetoken`]: time-windowed HMAC token authenticating publish
//!   calls from backend producers.
//!
//! The broker core never sees credentials; callers verify here and only
//! then hand `(scope, topic, payload)` to the hub.

pub mod bearer;
pub mod timetoken;

pub use bearer::Claims;

/// Why a credential was rejected.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing credential")]
    Missing,
    #[error("invalid bearer credential: {0}")]
    Bearer(#[from] jsonwebtoken::errors::Error),
    #[error("malformed time token")]
    Malformed,
    #[error("time token outside the allowed window")]
    OutsideWindow,
    #[error("time token signature mismatch")]
    BadSignature,
}

pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

//! Time-windowed HMAC token for publish endpoints.
//!
//! Token format: `base64(window ":" mac)` where `window` is the current
//! unix time divided by the window size (decimal string) and `mac` is
//! the URL-safe unpadded base64 of `HMAC-SHA256(window, secret)`. A
//! token is accepted while its window lies within ±`allowed_skew`
//! windows of the verifier's clock. Either base64 alphabet is accepted
//! on input; producers in other runtimes tend to emit the URL-safe one.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{unix_now, AuthError};

type HmacSha256 = Hmac<Sha256>;

/// Generate a token for the current window. For backend producers and
/// tests; the broker itself only validates.
pub fn generate(secret: &str, window_secs: u64) -> String {
    let window = unix_now() / window_secs.max(1);
    let mac = window_mac(&window.to_string(), secret);
    STANDARD.encode(format!("{window}:{mac}"))
}

/// Validate a token against the shared secret and the current clock.
pub fn validate(
    token: &str,
    secret: &str,
    window_secs: u64,
    allowed_skew: i64,
) -> Result<(), AuthError> {
    validate_at(token, secret, window_secs, allowed_skew, unix_now())
}

fn validate_at(
    token: &str,
    secret: &str,
    window_secs: u64,
    allowed_skew: i64,
    now: u64,
) -> Result<(), AuthError> {
    let decoded = STANDARD
        .decode(to_standard_base64(token))
        .map_err(|_| AuthError::Malformed)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AuthError::Malformed)?;

    let (window_str, received) = decoded.split_once(':').ok_or(AuthError::Malformed)?;
    if received.contains(':') {
        return Err(AuthError::Malformed);
    }

    let window: i64 = window_str.parse().map_err(|_| AuthError::Malformed)?;
    let current = (now / window_secs.max(1)) as i64;
    if window < current - allowed_skew || window > current + allowed_skew {
        return Err(AuthError::OutsideWindow);
    }

    let received_raw = URL_SAFE_NO_PAD
        .decode(to_url_safe_no_pad(received))
        .map_err(|_| AuthError::BadSignature)?;
    let mut mac = hmac_keyed(secret);
    mac.update(window_str.as_bytes());
    mac.verify_slice(&received_raw)
        .map_err(|_| AuthError::BadSignature)
}

fn window_mac(window: &str, secret: &str) -> String {
    let mut mac = hmac_keyed(secret);
    mac.update(window.as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}

fn hmac_keyed(secret: &str) -> HmacSha256 {
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length")
}

fn to_standard_base64(s: &str) -> String {
    let mut s = s.replace('-', "+").replace('_', "/");
    while s.len() % 4 != 0 {
        s.push('=');
    }
    s
}

fn to_url_safe_no_pad(s: &str) -> String {
    s.replace('+', "-")
        .replace('/', "_")
        .trim_end_matches('=')
        .to_owned()
}

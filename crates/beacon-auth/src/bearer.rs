use std::time::Duration;

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{unix_now, AuthError};

/// Claims carried by the bearer credential.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: u64,
}

/// Verify an HS256 bearer credential against the shared secret.
/// Expiry is validated; issuer and audience are not part of the scheme.
pub fn verify(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;
    Ok(data.claims)
}

/// Issue a credential for `sub` valid for `ttl`. Producers normally
/// mint these out of process; this exists for tooling and tests.
pub fn issue(sub: &str, secret: &str, ttl: Duration) -> Result<String, AuthError> {
    let claims = Claims {
        sub: sub.to_owned(),
        exp: unix_now() + ttl.as_secs(),
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-jwt-secret";

    #[test]
    fn issue_then_verify_roundtrip() {
        let token = issue("user-1", SECRET, Duration::from_secs(600)).unwrap();
        let claims = verify(&token, SECRET).unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue("user-1", SECRET, Duration::from_secs(600)).unwrap();
        assert!(verify(&token, "other-secret").is_err());
    }

    #[test]
    fn expired_credential_is_rejected() {
        // Far enough in the past to clear the default leeway.
        let claims = Claims {
            sub: "user-1".into(),
            exp: unix_now().saturating_sub(600),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(verify(&token, SECRET).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(verify("not.a.jwt", SECRET).is_err());
        assert!(verify("", SECRET).is_err());
    }
}

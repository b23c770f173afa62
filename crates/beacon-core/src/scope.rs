use serde::{Deserialize, Serialize};

/// Topic assigned to sessions that do not select one explicitly.
pub const DEFAULT_TOPIC: &str = "default";

/// Audience partition for a session or a published event.
///
/// Orthogonal to topics: fan-out never crosses from one scope to the
/// other, even on the same topic name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Sessions admitted through the credentialed upgrade endpoint.
    Trusted,
    /// Unauthenticated sessions.
    Public,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trusted => f.write_str("trusted"),
            Self::Public => f.write_str("public"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_display() {
        assert_eq!(Scope::Trusted.to_string(), "trusted");
        assert_eq!(Scope::Public.to_string(), "public");
    }

    #[test]
    fn scope_serde() {
        let json = serde_json::to_string(&Scope::Public).unwrap();
        assert_eq!(json, r#""public""#);
        let parsed: Scope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Scope::Public);
    }

    #[test]
    fn scopes_are_distinct() {
        assert_ne!(Scope::Trusted, Scope::Public);
    }
}

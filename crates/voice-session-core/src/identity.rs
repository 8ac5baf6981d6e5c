//! Caller identity and the store holding the active one

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Logical caller name registered with the telephony SDK
///
/// Always non-empty and trimmed of surrounding whitespace.
///
/// ```rust
/// use voice_session_core::Identity;
///
/// let identity = Identity::parse("  alice ").unwrap();
/// assert_eq!(identity.as_str(), "alice");
/// assert!(Identity::parse("   ").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    /// Validate and normalize a raw identity string
    pub fn parse(raw: impl AsRef<str>) -> ClientResult<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ClientError::validation("identity", "must not be blank"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Holds the identity the client is currently registered (or registering) as
#[derive(Debug, Default)]
pub struct IdentityStore {
    current: Option<Identity>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the identity, returning the previous one
    pub fn replace(&mut self, identity: Identity) -> Option<Identity> {
        self.current.replace(identity)
    }

    /// Forget the identity (teardown)
    pub fn clear(&mut self) -> Option<Identity> {
        self.current.take()
    }

    pub fn current(&self) -> Option<&Identity> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_blank() {
        for raw in ["", " ", "\t\n"] {
            let err = Identity::parse(raw).unwrap_err();
            assert!(matches!(err, ClientError::Validation { ref field, .. } if field == "identity"));
        }
    }

    #[test]
    fn test_store_replace_and_clear() {
        let mut store = IdentityStore::new();
        assert!(store.current().is_none());

        assert_eq!(store.replace(Identity::parse("alice").unwrap()), None);
        let previous = store.replace(Identity::parse("bob").unwrap());
        assert_eq!(previous.map(|i| i.to_string()), Some("alice".to_string()));
        assert_eq!(store.current().unwrap().as_str(), "bob");

        assert!(store.clear().is_some());
        assert!(store.clear().is_none());
    }
}

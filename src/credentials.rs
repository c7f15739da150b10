//! Credential lookup for the connection handshake.
//!
//! The client only ever reads credentials: the current bearer token is looked
//! up right before each connection attempt, so a refreshed token is picked up
//! on the next reconnect. A missing token is fine; the connection is then
//! opened anonymously.

use std::env;
use std::fmt;

/// Read-only source of the bearer token.
///
/// # Example Implementation
///
/// ```rust
/// use store_link::CredentialStore;
/// use std::sync::RwLock;
///
/// struct SessionTokens {
///     current: RwLock<Option<String>>,
/// }
///
/// impl CredentialStore for SessionTokens {
///     fn bearer_token(&self) -> Option<String> {
///         self.current.read().ok().and_then(|t| t.clone())
///     }
/// }
/// ```
pub trait CredentialStore: Send + Sync {
    /// Current bearer token, if any.
    fn bearer_token(&self) -> Option<String>;
}

/// A fixed token.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

impl CredentialStore for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        non_empty(Some(self.0.clone()))
    }
}

/// Reads the token from an environment variable on every lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvTokenStore {
    var: String,
}

impl EnvTokenStore {
    /// Default variable: `STORE_LINK_TOKEN`.
    pub const DEFAULT_VAR: &'static str = "STORE_LINK_TOKEN";

    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

impl Default for EnvTokenStore {
    fn default() -> Self {
        Self::new(Self::DEFAULT_VAR)
    }
}

impl CredentialStore for EnvTokenStore {
    fn bearer_token(&self) -> Option<String> {
        non_empty(env::var(&self.var).ok())
    }
}

fn non_empty(token: Option<String>) -> Option<String> {
    token.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_token() {
        assert_eq!(StaticToken::new("abc").bearer_token().as_deref(), Some("abc"));
        assert_eq!(StaticToken::new("  ").bearer_token(), None);
        assert_eq!(format!("{:?}", StaticToken::new("secret")), "StaticToken(***)");
    }

    #[test]
    fn test_env_token_store() {
        let store = EnvTokenStore::new("STORE_LINK_TEST_TOKEN_CREDENTIALS");
        assert_eq!(store.bearer_token(), None);

        env::set_var("STORE_LINK_TEST_TOKEN_CREDENTIALS", "from-env");
        assert_eq!(store.bearer_token().as_deref(), Some("from-env"));
        env::remove_var("STORE_LINK_TEST_TOKEN_CREDENTIALS");
    }
}

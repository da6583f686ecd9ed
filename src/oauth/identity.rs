//! End-user identity used to scope cached tokens

use serde::{Deserialize, Serialize};

/// Provider name of the reserved identity that owns preconfigured tokens.
pub const PRECONFIGURED_PROVIDER: &str = "mcp-agent";

/// Subject of the reserved identity that owns preconfigured tokens.
pub const PRECONFIGURED_SUBJECT: &str = "preconfigured-tokens";

/// The identity of the end user on whose behalf a token is obtained.
///
/// Two identities with the same provider and subject share cached tokens;
/// `email` is informational and does not take part in the cache key.
///
/// # Examples
///
/// ```
/// use mcp_oauth_broker::oauth::identity::OAuthUserIdentity;
///
/// let user = OAuthUserIdentity::new("github", "user-42");
/// assert_eq!(user.cache_key(), "github:user-42");
/// assert!(!user.is_preconfigured());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OAuthUserIdentity {
    /// Identity provider that authenticated the user
    pub provider: String,

    /// Stable subject identifier within `provider`
    pub subject: String,

    /// Email address, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl OAuthUserIdentity {
    /// Creates an identity without an email address.
    pub fn new(provider: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            subject: subject.into(),
            email: None,
        }
    }

    /// Attaches an email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// The reserved identity for statically preconfigured tokens.
    ///
    /// Tokens stored under this identity are never visible to a real user's
    /// cache lookups and vice versa.
    pub fn preconfigured() -> Self {
        Self::new(PRECONFIGURED_PROVIDER, PRECONFIGURED_SUBJECT)
    }

    /// Returns `true` for the reserved preconfigured-token identity.
    pub fn is_preconfigured(&self) -> bool {
        self.provider == PRECONFIGURED_PROVIDER && self.subject == PRECONFIGURED_SUBJECT
    }

    /// The user component of a token store key.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.provider, self.subject)
    }
}

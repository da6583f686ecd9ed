//! Issued token records as persisted by the token store

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An issued OAuth token together with the context it was issued for.
///
/// Records are value objects: a refresh or re-authorization produces a new
/// record that replaces the old one in the store. Refresh leeway is not baked
/// into the record; callers apply it at read time via
/// [`TokenRecord::is_expired`].
///
/// # Examples
///
/// ```
/// use chrono::{Duration, Utc};
/// use mcp_oauth_broker::oauth::records::TokenRecord;
///
/// let mut record = TokenRecord::new("tok");
/// record.expires_at = Some(Utc::now() + Duration::seconds(5));
///
/// assert!(!record.is_expired(0));
/// assert!(record.is_expired(10));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// The bearer token presented to the downstream server
    pub access_token: String,

    /// Refresh token, when the authorization server issued one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Absolute expiry; `None` means the token never expires.
    ///
    /// Serialized as epoch seconds.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub expires_at: Option<DateTime<Utc>>,

    /// Granted scopes in the order the server reported them
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Token type, normally `Bearer`
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Resource the token was issued for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,

    /// Issuer of the token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_server: Option<String>,

    /// Audit and diagnostic metadata (raw payload, workflow name, session id)
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenRecord {
    /// Creates a non-expiring bearer record with no scopes or metadata.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            scopes: Vec::new(),
            token_type: default_token_type(),
            resource: None,
            authorization_server: None,
            metadata: Map::new(),
        }
    }

    /// Returns `true` when `now >= expires_at - leeway_seconds`.
    ///
    /// Records without an expiry are never expired. A leeway too large to
    /// subtract from the expiry counts as expired.
    pub fn is_expired(&self, leeway_seconds: i64) -> bool {
        match self.expires_at {
            None => false,
            Some(expires_at) => TimeDelta::try_seconds(leeway_seconds)
                .and_then(|leeway| expires_at.checked_sub_signed(leeway))
                .map_or(true, |deadline| Utc::now() >= deadline),
        }
    }

    /// Returns a copy with `key` set in the metadata map.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

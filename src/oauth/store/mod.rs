//! Token persistence keyed by user, resource, issuer and scope set
//!
//! [`TokenStore`] is the seam between the token manager and its backend.
//! Two backends ship with the crate:
//!
//! - [`InMemoryTokenStore`]: process-local, the default.
//! - `RedisTokenStore` (feature `redis`): shared between broker instances.
//!
//! Stores apply no expiry policy of their own beyond optional backend TTLs;
//! refresh leeway is applied by the caller at read time.

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::{TokenStoreBackend, TokenStoreSettings};
use crate::error::{BrokerError, Result};
use crate::oauth::records::TokenRecord;

pub use memory::InMemoryTokenStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisTokenStore;

/// Canonical, order-insensitive representation of a scope set.
///
/// Scopes are de-duplicated, sorted and space-joined; empty entries are
/// skipped.
///
/// # Examples
///
/// ```
/// use mcp_oauth_broker::oauth::store::scope_fingerprint;
///
/// assert_eq!(scope_fingerprint(["write", "read", "read"]), "read write");
/// assert_eq!(scope_fingerprint(Vec::<String>::new()), "");
/// ```
pub fn scope_fingerprint<I, S>(scopes: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    scopes
        .into_iter()
        .filter_map(|s| {
            let s = s.as_ref().trim();
            (!s.is_empty()).then(|| s.to_string())
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Identifies one cached token.
///
/// Two keys are equal exactly when all four components are equal, so the
/// same user holds independent tokens per resource, issuer and scope set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenStoreKey {
    /// `provider:subject` of the owning identity
    pub user_key: String,

    /// Canonical resource identifier
    pub resource: String,

    /// Issuer of the token, when known
    pub authorization_server: Option<String>,

    /// Output of [`scope_fingerprint`]
    pub scope_fingerprint: String,
}

impl TokenStoreKey {
    /// Creates a key; `scopes` are fingerprinted.
    pub fn new<I, S>(
        user_key: impl Into<String>,
        resource: impl Into<String>,
        authorization_server: Option<String>,
        scopes: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            user_key: user_key.into(),
            resource: resource.into(),
            authorization_server,
            scope_fingerprint: scope_fingerprint(scopes),
        }
    }

    /// Hex SHA-256 over a length-prefixed encoding of every component.
    ///
    /// Distinct keys never share a digest input, unlike the `Display` form.
    pub fn digest(&self) -> String {
        fn field(hasher: &mut Sha256, value: &str) {
            hasher.update((value.len() as u64).to_be_bytes());
            hasher.update(value.as_bytes());
        }

        let mut hasher = Sha256::new();
        field(&mut hasher, &self.user_key);
        field(&mut hasher, &self.resource);
        match &self.authorization_server {
            Some(issuer) => {
                hasher.update([1u8]);
                field(&mut hasher, issuer);
            }
            None => hasher.update([0u8]),
        }
        field(&mut hasher, &self.scope_fingerprint);

        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// Human-readable form for logs. Not unique: components may themselves
/// contain `|`.
impl fmt::Display for TokenStoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.user_key,
            self.resource,
            self.authorization_server.as_deref().unwrap_or(""),
            self.scope_fingerprint
        )
    }
}

/// Storage backend for token records.
///
/// Implementations must be safe for concurrent use; `set` on an existing key
/// replaces its record.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Returns the record stored under `key`, if any.
    async fn get(&self, key: &TokenStoreKey) -> Result<Option<TokenRecord>>;

    /// Stores `record` under `key`, replacing any existing record.
    async fn set(&self, key: &TokenStoreKey, record: TokenRecord) -> Result<()>;

    /// Removes the record under `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &TokenStoreKey) -> Result<()>;
}

/// Builds the configured token store backend.
///
/// # Errors
///
/// Returns [`BrokerError::Config`] if the redis backend is selected without a
/// `redis_url`, or the crate was built without the `redis` feature.
pub fn build_token_store(settings: &TokenStoreSettings) -> Result<Arc<dyn TokenStore>> {
    match settings.backend {
        TokenStoreBackend::Memory => Ok(Arc::new(InMemoryTokenStore::new())),
        TokenStoreBackend::Redis => build_redis_store(settings),
    }
}

#[cfg(feature = "redis")]
fn build_redis_store(settings: &TokenStoreSettings) -> Result<Arc<dyn TokenStore>> {
    let url = settings.redis_url.as_deref().ok_or_else(|| {
        BrokerError::Config("redis backend requires token_store.redis_url".into())
    })?;
    let store = RedisTokenStore::connect(url, settings.redis_prefix.clone())?;
    tracing::info!(prefix = %settings.redis_prefix, "Using Redis token store");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
fn build_redis_store(_settings: &TokenStoreSettings) -> Result<Arc<dyn TokenStore>> {
    Err(BrokerError::Config(
        "redis token store requested but the crate was built without the `redis` feature".into(),
    )
    .into())
}

//! Redis-backed token store
//!
//! Records are stored as JSON under `{prefix}:{digest}`, where the digest is
//! [`TokenStoreKey::digest`]. Hashing keeps user and resource identifiers out
//! of the Redis keyspace. Records that expire and cannot be refreshed get a
//! Redis TTL matching their expiry; records with a refresh token are kept
//! until explicitly deleted.

use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;

use super::{TokenStore, TokenStoreKey};
use crate::error::{BrokerError, Result};
use crate::oauth::records::TokenRecord;

/// [`TokenStore`] backed by a shared Redis instance.
#[derive(Debug, Clone)]
pub struct RedisTokenStore {
    client: redis::Client,
    prefix: String,
}

impl RedisTokenStore {
    /// Creates a store for `url`. No connection is made until first use.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Config`] if `url` is not a valid Redis URL.
    pub fn connect(url: &str, prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| BrokerError::Config(format!("invalid redis_url: {e}")))?;
        Ok(Self::with_client(client, prefix))
    }

    /// Creates a store around an existing client.
    pub fn with_client(client: redis::Client, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    fn redis_key(&self, key: &TokenStoreKey) -> String {
        format!("{}:{}", self.prefix, key.digest())
    }
}

/// Seconds until `record` should disappear from Redis, if it should.
fn record_ttl_seconds(record: &TokenRecord) -> Option<u64> {
    if record.refresh_token.is_some() {
        return None;
    }
    let expires_at = record.expires_at?;
    let remaining = (expires_at - Utc::now()).num_seconds();
    Some(remaining.max(1) as u64)
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn get(&self, key: &TokenStoreKey) -> Result<Option<TokenRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(self.redis_key(key)).await?;

        match value {
            Some(json) => {
                let record: TokenRecord = serde_json::from_str(&json).map_err(|e| {
                    BrokerError::Storage(format!("corrupt token record in redis: {e}"))
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &TokenStoreKey, record: TokenRecord) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let redis_key = self.redis_key(key);
        let payload = serde_json::to_string(&record)?;

        match record_ttl_seconds(&record) {
            Some(ttl) => conn.set_ex::<_, _, ()>(redis_key, payload, ttl).await?,
            None => conn.set::<_, _, ()>(redis_key, payload).await?,
        }
        Ok(())
    }

    async fn delete(&self, key: &TokenStoreKey) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(self.redis_key(key)).await?;
        Ok(())
    }
}

//! Bearer token verification via RFC 7662 introspection
//!
//! [`McpTokenVerifier`] answers "is this token valid for me?" for tokens
//! presented to this process. Results are cached per token until the token's
//! expiry (capped at `token_cache_ttl_seconds`), and expired entries are
//! pruned whenever a new result is recorded. Verification fails closed: any
//! introspection problem yields `None`, never an error.
//!
//! Concurrent misses for the same token share one introspection call through
//! a sharded lock keyed by a hash of the token; unrelated tokens rarely
//! contend.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, RwLock};

use crate::config::AuthorizationServerSettings;
use crate::error::{BrokerError, Result};
use crate::oauth::access_token::McpAccessToken;

const LOCK_SHARDS: usize = 16;
const CACHE_LEEWAY_SECONDS: i64 = 30;
const INTROSPECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Verifies bearer tokens against an introspection endpoint.
pub struct McpTokenVerifier {
    settings: AuthorizationServerSettings,
    endpoint: String,
    http: reqwest::Client,
    cache: RwLock<HashMap<String, McpAccessToken>>,
    shards: Vec<Mutex<()>>,
}

impl std::fmt::Debug for McpTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpTokenVerifier")
            .field("endpoint", &self.endpoint)
            .field("issuer_url", &self.settings.issuer_url)
            .finish_non_exhaustive()
    }
}

impl McpTokenVerifier {
    /// Creates a verifier with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Config`] if no introspection endpoint is
    /// configured.
    pub fn new(settings: AuthorizationServerSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(INTROSPECTION_TIMEOUT)
            .build()?;
        Self::with_client(settings, http)
    }

    /// Creates a verifier using `http` for introspection.
    pub fn with_client(settings: AuthorizationServerSettings, http: reqwest::Client) -> Result<Self> {
        let endpoint = settings
            .introspection_endpoint
            .clone()
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                BrokerError::Config(
                    "introspection_endpoint must be configured to verify tokens".to_string(),
                )
            })?;
        Ok(Self {
            settings,
            endpoint,
            http,
            cache: RwLock::new(HashMap::new()),
            shards: (0..LOCK_SHARDS).map(|_| Mutex::new(())).collect(),
        })
    }

    /// Returns the verified token, or `None` if it is not acceptable.
    pub async fn verify_token(&self, token: &str) -> Option<McpAccessToken> {
        if let Some(cached) = self.cached(token).await {
            return Some(cached);
        }

        let _shard = self.shards[shard_index(token)].lock().await;

        // Another task may have introspected this token while we waited.
        if let Some(cached) = self.cached(token).await {
            return Some(cached);
        }

        let verified = self.introspect(token).await;
        let mut cache = self.cache.write().await;
        cache.retain(|_, cached| !cached.is_expired(CACHE_LEEWAY_SECONDS));
        match &verified {
            Some(access_token) => {
                cache.insert(token.to_string(), access_token.clone());
            }
            None => {
                cache.remove(token);
            }
        }
        verified
    }

    /// Drops any cached verification for `token`.
    pub async fn invalidate(&self, token: &str) {
        self.cache.write().await.remove(token);
    }

    async fn cached(&self, token: &str) -> Option<McpAccessToken> {
        self.cache
            .read()
            .await
            .get(token)
            .filter(|t| !t.is_expired(CACHE_LEEWAY_SECONDS))
            .cloned()
    }

    async fn introspect(&self, token: &str) -> Option<McpAccessToken> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .form(&[("token", token), ("token_type_hint", "access_token")]);
        if let (Some(id), Some(secret)) = (
            &self.settings.introspection_client_id,
            &self.settings.introspection_client_secret,
        ) {
            request = request.basic_auth(id, Some(secret));
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "Token introspection request failed");
                return None;
            }
        };

        if response.status() != reqwest::StatusCode::OK {
            tracing::warn!(status = %response.status(), "Token introspection returned non-success status");
            return None;
        }

        let payload: Map<String, Value> = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "Token introspection response was not valid JSON");
                return None;
            }
        };

        if !payload.get("active").and_then(Value::as_bool).unwrap_or(false) {
            tracing::debug!("Introspected token is not active");
            return None;
        }

        if let (Some(expected), Some(actual)) = (
            self.settings.issuer_url.as_deref(),
            payload.get("iss").and_then(Value::as_str),
        ) {
            if expected.trim_end_matches('/') != actual.trim_end_matches('/') {
                tracing::warn!(expected, actual, "Token issuer mismatch");
                return None;
            }
        }

        let mut access_token = McpAccessToken::from_introspection(
            token,
            &payload,
            self.settings.resource_server_url.as_deref(),
        );

        if access_token.is_expired(0) {
            tracing::warn!(exp = ?access_token.expires_at, "Introspected token is already expired");
            return None;
        }

        let ttl = i64::try_from(self.settings.token_cache_ttl_seconds).unwrap_or(i64::MAX);
        if ttl > 0 {
            let limit = Utc::now().timestamp().saturating_add(ttl);
            access_token.expires_at = Some(access_token.expires_at.map_or(limit, |exp| exp.min(limit)));
        }

        if !access_token.has_scopes(&self.settings.required_scopes) {
            let missing: Vec<&String> = self
                .settings
                .required_scopes
                .iter()
                .filter(|s| !access_token.scopes.contains(s))
                .collect();
            tracing::warn!(?missing, "Token missing required scopes");
            return None;
        }

        Some(access_token)
    }
}

fn shard_index(token: &str) -> usize {
    let digest = Sha256::digest(token.as_bytes());
    digest[0] as usize % LOCK_SHARDS
}

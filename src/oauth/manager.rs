//! Token acquisition for OAuth-protected downstream servers
//!
//! [`TokenManager`] is the entry point used when calling a downstream server
//! on behalf of a user. For each call it:
//!
//! 1. Resolves the user identity from the [`OAuthRequestContext`], falling
//!    back to the preconfigured-token identity when the server has a static
//!    token.
//! 2. Resolves the resource and authorization server via metadata
//!    discovery. Fetched documents are cached for
//!    `metadata_cache_ttl_seconds`.
//! 3. Returns a cached token if it is still usable, refreshes an expired
//!    token that has a refresh token, or runs a new authorization flow.
//!
//! Concurrent calls for the same store key are serialized, so one caller
//! runs the flow and the others see its stored result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::DateTime;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::config::{McpServerConfig, OAuthClientSettings, OAuthSettings};
use crate::error::{BrokerError, Result};
use crate::oauth::callbacks::OAuthCallbackRegistry;
use crate::oauth::context::OAuthRequestContext;
use crate::oauth::flow::AuthorizationFlowCoordinator;
use crate::oauth::identity::OAuthUserIdentity;
use crate::oauth::metadata::{
    fetch_authorization_server_metadata, fetch_resource_metadata, normalize_resource,
    select_authorization_server, AuthorizationServerMetadata, ProtectedResourceMetadata,
    ResolvedOAuthContext,
};
use crate::oauth::records::TokenRecord;
use crate::oauth::store::{build_token_store, TokenStore, TokenStoreKey};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A fetched metadata document and when it was fetched.
struct CachedDocument<T> {
    fetched_at: Instant,
    document: T,
}

type DocumentCache<T> = RwLock<HashMap<String, CachedDocument<T>>>;

/// Orchestrates token lookup, refresh and authorization for downstream
/// servers.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use mcp_oauth_broker::config::{McpServerConfig, OAuthClientSettings, OAuthSettings};
/// use mcp_oauth_broker::oauth::callbacks::OAuthCallbackRegistry;
/// use mcp_oauth_broker::oauth::context::OAuthRequestContext;
/// use mcp_oauth_broker::oauth::identity::OAuthUserIdentity;
/// use mcp_oauth_broker::oauth::manager::TokenManager;
///
/// # async fn example() -> mcp_oauth_broker::error::Result<()> {
/// let registry = Arc::new(OAuthCallbackRegistry::new());
/// let manager = TokenManager::from_settings(OAuthSettings::default(), registry)?;
///
/// let server = McpServerConfig::with_oauth(
///     "https://api.example.com/mcp",
///     OAuthClientSettings {
///         client_id: Some("client".to_string()),
///         scopes: vec!["read".to_string()],
///         ..OAuthClientSettings::default()
///     },
/// );
/// let ctx = OAuthRequestContext::new().with_user(OAuthUserIdentity::new("github", "42"));
///
/// let token = manager.ensure_access_token(&ctx, "example", &server).await?;
/// println!("Bearer {}", token.access_token);
/// # Ok(())
/// # }
/// ```
pub struct TokenManager {
    settings: OAuthSettings,
    store: Arc<dyn TokenStore>,
    http: reqwest::Client,
    flow: AuthorizationFlowCoordinator,
    locks: Mutex<HashMap<TokenStoreKey, Arc<tokio::sync::Mutex<()>>>>,
    resource_metadata_cache: DocumentCache<ProtectedResourceMetadata>,
    authorization_metadata_cache: DocumentCache<AuthorizationServerMetadata>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("settings", &self.settings)
            .field("flow", &self.flow)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Creates a manager from its collaborators.
    ///
    /// `registry` must be the instance the callback router delivers to.
    pub fn new(
        settings: OAuthSettings,
        store: Arc<dyn TokenStore>,
        http: reqwest::Client,
        registry: Arc<OAuthCallbackRegistry>,
    ) -> Self {
        let flow = AuthorizationFlowCoordinator::new(http.clone(), settings.clone(), registry);
        Self {
            settings,
            store,
            http,
            flow,
            locks: Mutex::new(HashMap::new()),
            resource_metadata_cache: RwLock::new(HashMap::new()),
            authorization_metadata_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a manager with the configured token store and a default HTTP
    /// client.
    ///
    /// # Errors
    ///
    /// Returns an error if the token store or HTTP client cannot be built.
    pub fn from_settings(
        settings: OAuthSettings,
        registry: Arc<OAuthCallbackRegistry>,
    ) -> Result<Self> {
        let store = build_token_store(&settings.token_store)?;
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self::new(settings, store, http, registry))
    }

    /// The token store backing this manager.
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// The callback registry flows are registered in.
    pub fn registry(&self) -> &Arc<OAuthCallbackRegistry> {
        self.flow.registry()
    }

    /// Returns a usable access token for `server_name`, acquiring one if
    /// needed.
    ///
    /// # Errors
    ///
    /// - [`BrokerError::OAuthFlow`] if the server is not configured for OAuth,
    ///   or the flow fails.
    /// - [`BrokerError::MissingUserIdentity`] if no identity can be resolved.
    /// - [`BrokerError::AuthorizationDeclined`] if a flow is needed but the
    ///   context is non-interactive or the user declines.
    /// - [`BrokerError::CallbackTimeout`] if the user does not complete the
    ///   flow in time.
    /// - [`BrokerError::Discovery`] if metadata cannot be resolved.
    pub async fn ensure_access_token(
        &self,
        ctx: &OAuthRequestContext,
        server_name: &str,
        server_config: &McpServerConfig,
    ) -> Result<TokenRecord> {
        let oauth = enabled_oauth(server_name, server_config)?;
        let user = resolve_user(ctx, oauth)?;
        let resolved = self.resolve_oauth_context(server_name, server_config).await?;
        let key = Self::build_store_key(
            &user,
            &resolved.resource,
            Some(resolved.issuer.as_str()),
            &resolved.scopes,
        );

        let lock = self.lock_for(&key);
        let _held = lock.lock().await;

        let leeway = self.settings.token_store.refresh_leeway_seconds;
        if let Some(record) = self.store.get(&key).await? {
            if !record.is_expired(leeway) {
                tracing::debug!(server = server_name, user = %user.cache_key(), "Using cached OAuth token");
                return Ok(record);
            }

            if record.refresh_token.is_some() {
                match self.flow.refresh(&record, oauth, &resolved).await {
                    Ok(refreshed) => {
                        self.store.set(&key, refreshed.clone()).await?;
                        tracing::info!(server = server_name, "Refreshed OAuth token");
                        return Ok(refreshed);
                    }
                    Err(e) => {
                        tracing::warn!(
                            server = server_name,
                            error = %e,
                            "Token refresh failed; falling back to a new authorization"
                        );
                        self.store.delete(&key).await?;
                    }
                }
            }
        }

        if user.is_preconfigured() {
            let record = preconfigured_record(oauth, &resolved).ok_or_else(|| {
                BrokerError::OAuthFlow(format!(
                    "server '{server_name}' has no preconfigured access token"
                ))
            })?;
            let record = with_request_metadata(record, ctx, None);
            if record.is_expired(leeway) {
                return Err(BrokerError::MissingUserIdentity(format!(
                    "preconfigured token for '{server_name}' has expired and no user is available to re-authorize"
                ))
                .into());
            }
            self.store.set(&key, record.clone()).await?;
            return Ok(record);
        }

        if !ctx.allow_interactive {
            return Err(BrokerError::AuthorizationDeclined(format!(
                "no usable token for '{server_name}' and interactive authorization is disabled"
            ))
            .into());
        }

        let record = self
            .flow
            .authorize(ctx, Some(&user), server_name, oauth, &resolved)
            .await?;
        let record = with_request_metadata(record, ctx, None);
        self.store.set(&key, record.clone()).await?;
        Ok(record)
    }

    /// Stores the server's static `access_token` under the preconfigured
    /// identity, so automated workflows can run without interactive consent.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::OAuthFlow`] if OAuth is disabled or no static
    /// token is configured, or a discovery error.
    pub async fn store_preconfigured_token(
        &self,
        ctx: &OAuthRequestContext,
        server_name: &str,
        server_config: &McpServerConfig,
    ) -> Result<TokenRecord> {
        let oauth = enabled_oauth(server_name, server_config)?;
        let resolved = self.resolve_oauth_context(server_name, server_config).await?;
        let record = preconfigured_record(oauth, &resolved).ok_or_else(|| {
            BrokerError::OAuthFlow(format!(
                "server '{server_name}' has no preconfigured access token"
            ))
        })?;
        let record = with_request_metadata(record, ctx, None);

        let key = Self::build_store_key(
            &OAuthUserIdentity::preconfigured(),
            &resolved.resource,
            Some(resolved.issuer.as_str()),
            &resolved.scopes,
        );
        self.store.set(&key, record.clone()).await?;
        tracing::info!(server = server_name, "Stored preconfigured OAuth token");
        Ok(record)
    }

    /// Stores an externally obtained token for `user`.
    ///
    /// `token_data` is a JSON object with `access_token` and optionally
    /// `refresh_token`, `expires_at` (epoch seconds), `scopes` (list or
    /// space-separated string) and `token_type`. The record is tagged with
    /// `workflow_name` (falling back to the context's) and the context's
    /// session id.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::InvalidValue`] if `token_data` has no
    /// `access_token`.
    pub async fn store_user_token(
        &self,
        ctx: &OAuthRequestContext,
        user: &OAuthUserIdentity,
        server_name: &str,
        server_config: &McpServerConfig,
        token_data: &Value,
        workflow_name: Option<&str>,
    ) -> Result<TokenRecord> {
        enabled_oauth(server_name, server_config)?;
        let resolved = self.resolve_oauth_context(server_name, server_config).await?;
        let record = with_request_metadata(
            record_from_token_data(token_data, &resolved)?,
            ctx,
            workflow_name,
        );

        let key = Self::build_store_key(
            user,
            &resolved.resource,
            Some(resolved.issuer.as_str()),
            &resolved.scopes,
        );
        self.store.set(&key, record.clone()).await?;
        tracing::info!(server = server_name, user = %user.cache_key(), "Stored user OAuth token");
        Ok(record)
    }

    /// Deletes the cached token for the given key components, forcing the
    /// next [`ensure_access_token`](Self::ensure_access_token) to
    /// re-authorize.
    pub async fn invalidate<S: AsRef<str>>(
        &self,
        user: &OAuthUserIdentity,
        resource: &str,
        authorization_server: Option<&str>,
        scopes: &[S],
        session_id: Option<&str>,
    ) -> Result<()> {
        let key = Self::build_store_key(user, resource, authorization_server, scopes);
        self.store.delete(&key).await?;
        tracing::info!(
            user = %user.cache_key(),
            resource,
            session_id = session_id.unwrap_or(""),
            "Invalidated OAuth token"
        );
        Ok(())
    }

    /// Builds the store key for a token.
    pub fn build_store_key<S: AsRef<str>>(
        user: &OAuthUserIdentity,
        resource: &str,
        authorization_server: Option<&str>,
        scopes: &[S],
    ) -> TokenStoreKey {
        TokenStoreKey::new(
            user.cache_key(),
            resource,
            authorization_server.map(str::to_string),
            scopes,
        )
    }

    /// Resolves resource, authorization server and scopes for a server.
    ///
    /// When the resource publishes no metadata but the client configuration
    /// names an authorization server, that server is used directly.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::InvalidValue`] if no resource can be
    /// determined, or [`BrokerError::Discovery`] if metadata cannot be
    /// fetched.
    pub async fn resolve_oauth_context(
        &self,
        server_name: &str,
        server_config: &McpServerConfig,
    ) -> Result<ResolvedOAuthContext> {
        let oauth = enabled_oauth(server_name, server_config)?;
        let resource = normalize_resource(oauth.resource.as_deref(), server_config.url.as_deref())?;

        let resource_metadata = match self.resource_metadata(&resource).await {
            Ok(metadata) => metadata,
            Err(e) => match oauth.authorization_server.as_deref() {
                Some(server) => {
                    tracing::debug!(
                        server = server_name,
                        error = %e,
                        authorization_server = server,
                        "Resource metadata unavailable; using configured authorization server"
                    );
                    ProtectedResourceMetadata::for_server(resource.clone(), server)
                }
                None => return Err(e),
            },
        };

        let authorization_server_url =
            select_authorization_server(&resource_metadata, oauth.authorization_server.as_deref())?;
        let authorization_metadata = self
            .authorization_metadata(&authorization_server_url)
            .await?;
        let issuer = if authorization_metadata.issuer.is_empty() {
            authorization_server_url.clone()
        } else {
            authorization_metadata.issuer.clone()
        };

        Ok(ResolvedOAuthContext {
            resource,
            resource_metadata,
            authorization_server_url,
            authorization_metadata,
            issuer,
            scopes: oauth.scopes.clone(),
        })
    }

    fn lock_for(&self, key: &TokenStoreKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Drop locks nobody is holding or waiting on.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.settings.metadata_cache_ttl_seconds)
    }

    async fn resource_metadata(&self, resource: &str) -> Result<ProtectedResourceMetadata> {
        let ttl = self.cache_ttl();
        if let Some(cached) = self.resource_metadata_cache.read().await.get(resource) {
            if cached.fetched_at.elapsed() < ttl {
                return Ok(cached.document.clone());
            }
        }

        let document = fetch_resource_metadata(&self.http, resource).await?;
        self.resource_metadata_cache.write().await.insert(
            resource.to_string(),
            CachedDocument {
                fetched_at: Instant::now(),
                document: document.clone(),
            },
        );
        Ok(document)
    }

    async fn authorization_metadata(&self, issuer: &str) -> Result<AuthorizationServerMetadata> {
        let ttl = self.cache_ttl();
        if let Some(cached) = self.authorization_metadata_cache.read().await.get(issuer) {
            if cached.fetched_at.elapsed() < ttl {
                return Ok(cached.document.clone());
            }
        }

        let document = fetch_authorization_server_metadata(&self.http, issuer).await?;
        self.authorization_metadata_cache.write().await.insert(
            issuer.to_string(),
            CachedDocument {
                fetched_at: Instant::now(),
                document: document.clone(),
            },
        );
        Ok(document)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn enabled_oauth<'a>(
    server_name: &str,
    server_config: &'a McpServerConfig,
) -> Result<&'a OAuthClientSettings> {
    server_config
        .oauth()
        .filter(|oauth| oauth.enabled)
        .ok_or_else(|| {
            BrokerError::OAuthFlow(format!(
                "server '{server_name}' is not configured for OAuth authentication"
            ))
            .into()
        })
}

/// Explicit, scoped or session identity; the preconfigured identity when the
/// server has a static token.
fn resolve_user(ctx: &OAuthRequestContext, oauth: &OAuthClientSettings) -> Result<OAuthUserIdentity> {
    if let Some(user) = ctx.resolve_identity() {
        return Ok(user.clone());
    }
    if oauth.has_preconfigured_token() {
        return Ok(OAuthUserIdentity::preconfigured());
    }
    Err(BrokerError::MissingUserIdentity(
        "no authenticated user available for delegated OAuth flow".to_string(),
    )
    .into())
}

fn preconfigured_record(
    oauth: &OAuthClientSettings,
    resolved: &ResolvedOAuthContext,
) -> Option<TokenRecord> {
    let access_token = oauth.access_token.as_deref().filter(|t| !t.is_empty())?;
    let mut record = TokenRecord::new(access_token);
    record.refresh_token = oauth.refresh_token.clone();
    record.expires_at = oauth
        .expires_at
        .and_then(|secs| DateTime::from_timestamp(secs, 0));
    record.scopes = resolved.scopes.clone();
    record.resource = Some(resolved.resource.clone());
    record.authorization_server = Some(resolved.issuer.clone());
    Some(record.with_metadata("source", "preconfigured"))
}

fn record_from_token_data(data: &Value, resolved: &ResolvedOAuthContext) -> Result<TokenRecord> {
    let empty = Map::new();
    let fields = data.as_object().unwrap_or(&empty);
    let string_field = |name: &str| {
        fields
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let access_token = string_field("access_token").ok_or_else(|| {
        BrokerError::InvalidValue("token data is missing access_token".to_string())
    })?;

    let mut record = TokenRecord::new(access_token);
    record.refresh_token = string_field("refresh_token");
    record.expires_at = fields
        .get("expires_at")
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .and_then(|secs| DateTime::from_timestamp(secs, 0));
    record.scopes = match fields.get("scopes").or_else(|| fields.get("scope")) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
        _ => resolved.scopes.clone(),
    };
    if let Some(token_type) = string_field("token_type") {
        record.token_type = token_type;
    }
    record.resource = Some(resolved.resource.clone());
    record.authorization_server = Some(resolved.issuer.clone());
    Ok(record)
}

/// Tags `record` with the workflow name and session id for audit.
fn with_request_metadata(
    mut record: TokenRecord,
    ctx: &OAuthRequestContext,
    workflow_name: Option<&str>,
) -> TokenRecord {
    if let Some(workflow) = workflow_name.or(ctx.workflow_name.as_deref()) {
        record = record.with_metadata("workflow_name", workflow);
    }
    if let Some(session_id) = ctx.session_id.as_deref() {
        record = record.with_metadata("session_id", session_id);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::store::InMemoryTokenStore;
    use serde_json::json;

    fn resolved() -> ResolvedOAuthContext {
        ResolvedOAuthContext {
            resource: "https://api.example.com/mcp".to_string(),
            resource_metadata: ProtectedResourceMetadata::for_server(
                "https://api.example.com/mcp",
                "https://auth.example.com",
            ),
            authorization_server_url: "https://auth.example.com".to_string(),
            authorization_metadata: AuthorizationServerMetadata {
                issuer: "https://auth.example.com".to_string(),
                authorization_endpoint: "https://auth.example.com/authorize".to_string(),
                token_endpoint: "https://auth.example.com/token".to_string(),
                registration_endpoint: None,
                introspection_endpoint: None,
                scopes_supported: None,
                response_types_supported: Vec::new(),
                grant_types_supported: None,
                code_challenge_methods_supported: None,
                extra: HashMap::new(),
            },
            issuer: "https://auth.example.com".to_string(),
            scopes: vec!["repo".to_string()],
        }
    }

    fn oauth(access_token: Option<&str>) -> OAuthClientSettings {
        OAuthClientSettings {
            access_token: access_token.map(str::to_string),
            ..OAuthClientSettings::default()
        }
    }

    #[test]
    fn test_resolve_user_precedence_and_sentinel() {
        let ctx = OAuthRequestContext::new();
        let err = resolve_user(&ctx, &oauth(None)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BrokerError>(),
            Some(BrokerError::MissingUserIdentity(_))
        ));

        assert!(resolve_user(&ctx, &oauth(Some("tok")))
            .unwrap()
            .is_preconfigured());

        let ctx = ctx.with_session_identity(OAuthUserIdentity::new("p", "s"));
        assert_eq!(resolve_user(&ctx, &oauth(Some("tok"))).unwrap().subject, "s");
    }

    #[test]
    fn test_enabled_oauth_rejects_disabled_and_missing() {
        let plain = McpServerConfig::default();
        assert!(enabled_oauth("s", &plain).is_err());

        let disabled = McpServerConfig::with_oauth(
            "https://x",
            OAuthClientSettings {
                enabled: false,
                ..OAuthClientSettings::default()
            },
        );
        assert!(enabled_oauth("s", &disabled).is_err());
    }

    #[test]
    fn test_preconfigured_record_from_config() {
        let mut settings = oauth(Some("static"));
        settings.expires_at = Some(4_102_444_800);
        let record = preconfigured_record(&settings, &resolved()).unwrap();
        assert_eq!(record.access_token, "static");
        assert_eq!(record.scopes, vec!["repo"]);
        assert_eq!(record.authorization_server.as_deref(), Some("https://auth.example.com"));
        assert_eq!(record.expires_at.unwrap().timestamp(), 4_102_444_800);
        assert!(preconfigured_record(&oauth(None), &resolved()).is_none());
    }

    #[test]
    fn test_record_from_token_data() {
        let record = record_from_token_data(
            &json!({"access_token": "t", "scopes": ["a", "b"], "expires_at": 0, "token_type": "DPoP"}),
            &resolved(),
        )
        .unwrap();
        assert_eq!(record.scopes, vec!["a", "b"]);
        assert_eq!(record.token_type, "DPoP");
        assert_eq!(record.expires_at.unwrap().timestamp(), 0);

        let defaulted = record_from_token_data(&json!({"access_token": "t"}), &resolved()).unwrap();
        assert_eq!(defaulted.scopes, vec!["repo"]);

        assert!(record_from_token_data(&json!({"scopes": []}), &resolved()).is_err());
    }

    #[test]
    fn test_request_metadata_prefers_explicit_workflow() {
        let ctx = OAuthRequestContext::new()
            .with_workflow_name("from-ctx")
            .with_session_id("s-1");
        let record = with_request_metadata(TokenRecord::new("t"), &ctx, Some("explicit"));
        assert_eq!(record.metadata["workflow_name"], "explicit");
        assert_eq!(record.metadata["session_id"], "s-1");

        let record = with_request_metadata(TokenRecord::new("t"), &ctx, None);
        assert_eq!(record.metadata["workflow_name"], "from-ctx");
    }

    #[test]
    fn test_build_store_key_uses_cache_key_and_fingerprint() {
        let key = TokenManager::build_store_key(
            &OAuthUserIdentity::new("github", "1"),
            "https://r",
            Some("https://as"),
            &["b", "a"],
        );
        assert_eq!(key.user_key, "github:1");
        assert_eq!(key.scope_fingerprint, "a b");
    }

    #[tokio::test]
    async fn test_lock_map_prunes_idle_entries() {
        let manager = TokenManager::new(
            OAuthSettings::default(),
            Arc::new(InMemoryTokenStore::new()),
            reqwest::Client::new(),
            Arc::new(OAuthCallbackRegistry::new()),
        );
        let a = TokenManager::build_store_key(&OAuthUserIdentity::new("p", "a"), "r", None, &["x"]);
        let b = TokenManager::build_store_key(&OAuthUserIdentity::new("p", "b"), "r", None, &["x"]);

        let held = manager.lock_for(&a);
        let _guard = held.lock().await;
        drop(manager.lock_for(&b));
        let _ = manager.lock_for(&a);

        let locks = manager.locks.lock().unwrap();
        assert!(locks.contains_key(&a));
        assert!(!locks.contains_key(&b));
    }
}

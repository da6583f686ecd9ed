//! Configuration management for the OAuth broker
//!
//! This module handles loading, parsing, and validating the YAML
//! configuration consumed by the token manager, the authorization flow
//! coordinator, the token store factory, and the token verifier.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{BrokerError, Result};

/// Top-level configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Global OAuth delegation settings
    #[serde(default)]
    pub oauth: OAuthSettings,

    /// Resource-server token verification settings
    #[serde(default)]
    pub authorization: Option<AuthorizationServerSettings>,

    /// Downstream servers keyed by name
    #[serde(default)]
    pub servers: HashMap<String, McpServerConfig>,
}

impl Config {
    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML for
    /// this structure. Call [`Config::validate`] afterwards to check
    /// cross-field constraints.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            BrokerError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parses configuration from a YAML string.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents).map_err(BrokerError::Yaml)?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.oauth.validate()?;
        if let Some(authorization) = &self.authorization {
            authorization.validate()?;
        }
        for (name, server) in &self.servers {
            if let Some(oauth) = server.oauth() {
                oauth
                    .validate()
                    .map_err(|e| BrokerError::Config(format!("server '{name}': {e}")))?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Global OAuth settings
// ---------------------------------------------------------------------------

/// Global settings for delegated OAuth flows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthSettings {
    /// Public base URL of the internal callback router. When set, clients with
    /// `use_internal_callback` get a redirect URI of
    /// `{callback_base_url}/internal/oauth/callback/{flow_id}`.
    #[serde(default)]
    pub callback_base_url: Option<String>,

    /// Upper bound on how long a flow waits for its callback (seconds)
    #[serde(default = "default_flow_timeout_seconds")]
    pub flow_timeout_seconds: u64,

    /// Loopback ports tried when no upstream session can relay the
    /// authorization request. Empty disables the loopback fallback.
    #[serde(default)]
    pub loopback_ports: Vec<u16>,

    /// How long fetched metadata documents are reused (seconds)
    #[serde(default = "default_metadata_cache_ttl_seconds")]
    pub metadata_cache_ttl_seconds: u64,

    /// Token store backend selection and read-time policy
    #[serde(default)]
    pub token_store: TokenStoreSettings,
}

fn default_flow_timeout_seconds() -> u64 {
    300
}

fn default_metadata_cache_ttl_seconds() -> u64 {
    300
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            callback_base_url: None,
            flow_timeout_seconds: default_flow_timeout_seconds(),
            loopback_ports: Vec::new(),
            metadata_cache_ttl_seconds: default_metadata_cache_ttl_seconds(),
            token_store: TokenStoreSettings::default(),
        }
    }
}

impl OAuthSettings {
    /// Validates the global OAuth settings.
    pub fn validate(&self) -> Result<()> {
        if self.flow_timeout_seconds == 0 {
            return Err(
                BrokerError::Config("flow_timeout_seconds must be greater than 0".into()).into(),
            );
        }
        if let Some(base) = &self.callback_base_url {
            Url::parse(base).map_err(|e| {
                BrokerError::Config(format!("invalid callback_base_url '{base}': {e}"))
            })?;
        }
        self.token_store.validate()
    }

    /// Builds the internal callback URL for a flow, tolerating a trailing
    /// slash on the configured base.
    pub fn internal_callback_url(&self, flow_id: &str) -> Option<String> {
        self.callback_base_url.as_ref().map(|base| {
            format!(
                "{}/internal/oauth/callback/{}",
                base.trim_end_matches('/'),
                flow_id
            )
        })
    }
}

/// Token store backend selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStoreBackend {
    /// Process-local map; tokens are lost on restart
    #[default]
    Memory,
    /// Shared Redis instance for multi-instance deployments
    Redis,
}

/// Token store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenStoreSettings {
    /// Which backend to use
    #[serde(default)]
    pub backend: TokenStoreBackend,

    /// Redis connection URL, required for the redis backend
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Namespace prepended to every Redis key
    #[serde(default = "default_redis_prefix")]
    pub redis_prefix: String,

    /// Seconds subtracted from a token's expiry when deciding whether it is
    /// still usable
    #[serde(default = "default_refresh_leeway_seconds")]
    pub refresh_leeway_seconds: i64,
}

fn default_redis_prefix() -> String {
    "mcp_oauth".to_string()
}

/// Upper bound for `refresh_leeway_seconds`: one day
pub const MAX_REFRESH_LEEWAY_SECONDS: i64 = 86_400;

fn default_refresh_leeway_seconds() -> i64 {
    60
}

impl Default for TokenStoreSettings {
    fn default() -> Self {
        Self {
            backend: TokenStoreBackend::default(),
            redis_url: None,
            redis_prefix: default_redis_prefix(),
            refresh_leeway_seconds: default_refresh_leeway_seconds(),
        }
    }
}

impl TokenStoreSettings {
    /// Validates the token store settings.
    pub fn validate(&self) -> Result<()> {
        if !(0..=MAX_REFRESH_LEEWAY_SECONDS).contains(&self.refresh_leeway_seconds) {
            return Err(BrokerError::Config(format!(
                "refresh_leeway_seconds must be between 0 and {MAX_REFRESH_LEEWAY_SECONDS}"
            ))
            .into());
        }
        if self.backend == TokenStoreBackend::Redis && self.redis_url.is_none() {
            return Err(
                BrokerError::Config("redis backend requires token_store.redis_url".into()).into(),
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Per-server OAuth client settings
// ---------------------------------------------------------------------------

/// How the client authenticates at the token endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenEndpointAuthMethod {
    /// `client_secret` in the form body
    #[default]
    ClientSecretPost,
    /// HTTP Basic with `client_id:client_secret`
    ClientSecretBasic,
}

/// OAuth client settings for one downstream server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClientSettings {
    /// Whether OAuth is used for this server
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Registered client identifier
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret for confidential clients
    #[serde(default)]
    pub client_secret: Option<String>,

    /// How `client_secret` is presented to the token endpoint
    #[serde(default)]
    pub token_endpoint_auth_method: TokenEndpointAuthMethod,

    /// Scopes requested for this server
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Preferred authorization server issuer
    #[serde(default)]
    pub authorization_server: Option<String>,

    /// Resource identifier; defaults to the server URL
    #[serde(default)]
    pub resource: Option<String>,

    /// Whether to synthesize an internal callback redirect URI
    #[serde(default = "default_true")]
    pub use_internal_callback: bool,

    /// Statically preconfigured access token
    #[serde(default)]
    pub access_token: Option<String>,

    /// Refresh token accompanying `access_token`
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Expiry of `access_token` as epoch seconds
    #[serde(default)]
    pub expires_at: Option<i64>,

    /// Statically registered redirect URIs, in preference order
    #[serde(default)]
    pub redirect_uri_options: Vec<String>,

    /// Extra query parameters added to the authorize URL
    #[serde(default)]
    pub extra_authorize_params: HashMap<String, String>,

    /// Extra form parameters added to token endpoint requests
    #[serde(default)]
    pub extra_token_params: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

impl Default for OAuthClientSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            client_id: None,
            client_secret: None,
            token_endpoint_auth_method: TokenEndpointAuthMethod::default(),
            scopes: Vec::new(),
            authorization_server: None,
            resource: None,
            use_internal_callback: true,
            access_token: None,
            refresh_token: None,
            expires_at: None,
            redirect_uri_options: Vec::new(),
            extra_authorize_params: HashMap::new(),
            extra_token_params: HashMap::new(),
        }
    }
}

impl OAuthClientSettings {
    /// Validates the client settings.
    pub fn validate(&self) -> Result<()> {
        for uri in &self.redirect_uri_options {
            Url::parse(uri).map_err(|e| {
                BrokerError::Config(format!("invalid redirect_uri_options entry '{uri}': {e}"))
            })?;
        }
        if self.client_secret.is_some() && self.client_id.is_none() {
            return Err(
                BrokerError::Config("client_secret configured without client_id".into()).into(),
            );
        }
        Ok(())
    }

    /// Returns `true` when a static access token is configured.
    pub fn has_preconfigured_token(&self) -> bool {
        self.access_token
            .as_deref()
            .map(|t| !t.is_empty())
            .unwrap_or(false)
    }
}

/// Authentication block of a server entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerAuthConfig {
    /// OAuth client settings
    #[serde(default)]
    pub oauth: Option<OAuthClientSettings>,
}

/// A downstream server that may require a bearer token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Server URL, used as the fallback resource identifier
    #[serde(default)]
    pub url: Option<String>,

    /// Authentication configuration
    #[serde(default)]
    pub auth: Option<ServerAuthConfig>,
}

impl McpServerConfig {
    /// Convenience constructor for a server protected by OAuth.
    pub fn with_oauth(url: impl Into<String>, oauth: OAuthClientSettings) -> Self {
        Self {
            url: Some(url.into()),
            auth: Some(ServerAuthConfig { oauth: Some(oauth) }),
        }
    }

    /// Returns the OAuth client settings, if any.
    pub fn oauth(&self) -> Option<&OAuthClientSettings> {
        self.auth.as_ref().and_then(|a| a.oauth.as_ref())
    }
}

// ---------------------------------------------------------------------------
// Resource-server verification settings
// ---------------------------------------------------------------------------

/// Settings for verifying bearer tokens presented to this process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationServerSettings {
    /// Expected `iss` of introspected tokens
    #[serde(default)]
    pub issuer_url: Option<String>,

    /// This resource server's identifier, used as the resource hint
    #[serde(default)]
    pub resource_server_url: Option<String>,

    /// RFC 7662 introspection endpoint
    #[serde(default)]
    pub introspection_endpoint: Option<String>,

    /// Client id for Basic-authenticated introspection
    #[serde(default)]
    pub introspection_client_id: Option<String>,

    /// Client secret for Basic-authenticated introspection
    #[serde(default)]
    pub introspection_client_secret: Option<String>,

    /// Scopes every accepted token must carry
    #[serde(default)]
    pub required_scopes: Vec<String>,

    /// Upper bound on how long a verified token is cached (seconds)
    #[serde(default = "default_token_cache_ttl_seconds")]
    pub token_cache_ttl_seconds: u64,
}

fn default_token_cache_ttl_seconds() -> u64 {
    300
}

impl Default for AuthorizationServerSettings {
    fn default() -> Self {
        Self {
            issuer_url: None,
            resource_server_url: None,
            introspection_endpoint: None,
            introspection_client_id: None,
            introspection_client_secret: None,
            required_scopes: Vec::new(),
            token_cache_ttl_seconds: default_token_cache_ttl_seconds(),
        }
    }
}

impl AuthorizationServerSettings {
    /// Validates the verifier settings.
    pub fn validate(&self) -> Result<()> {
        let endpoint = self.introspection_endpoint.as_deref().ok_or_else(|| {
            BrokerError::Config("introspection_endpoint must be configured to verify tokens".into())
        })?;
        Url::parse(endpoint).map_err(|e| {
            BrokerError::Config(format!("invalid introspection_endpoint '{endpoint}': {e}"))
        })?;
        Ok(())
    }
}

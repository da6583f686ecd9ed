//! Error types for the OAuth broker
//!
//! This module defines the error taxonomy used by discovery, the
//! authorization flow, the token manager, and the token verifier, using
//! `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for broker operations
///
/// The first four variants are the flow-level failures surfaced to callers of
/// [`TokenManager::ensure_access_token`](crate::oauth::manager::TokenManager::ensure_access_token).
/// None of them are retried internally; the caller decides whether to retry
/// a whole new flow or surface the failure to the user.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// No identity is available to scope a token to
    #[error("Missing user identity: {0}")]
    MissingUserIdentity(String),

    /// OAuth protocol violation (state mismatch, missing code or client_id,
    /// authorization server error, malformed token response)
    #[error("OAuth flow error: {0}")]
    OAuthFlow(String),

    /// No authorization callback arrived before the flow timeout elapsed
    #[error("OAuth callback timed out: {0}")]
    CallbackTimeout(String),

    /// The user rejected the request, or no channel exists to ask
    #[error("Authorization declined: {0}")]
    AuthorizationDeclined(String),

    /// Refresh-token grant failed; recovered by the token manager
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// Protected resource or authorization server metadata discovery failed
    #[error("Metadata discovery error: {0}")]
    Discovery(String),

    /// An input value could not be interpreted
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token store backend errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Redis backend errors
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl BrokerError {
    /// Returns `true` for failures where starting a brand new authorization
    /// attempt may succeed.
    ///
    /// A missing identity or an explicit user decline will fail the same way
    /// again, so those are not retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BrokerError::OAuthFlow(_) | BrokerError::CallbackTimeout(_)
        )
    }
}

/// Result type alias for broker operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type.
/// Typed failures are raised as [`BrokerError`] and can be recovered with
/// `err.downcast_ref::<BrokerError>()`.
pub type Result<T> = anyhow::Result<T>;

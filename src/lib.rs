//! mcp-oauth-broker - Delegated OAuth for MCP servers
//!
//! This library acquires, caches and refreshes OAuth 2.0 bearer tokens on
//! behalf of end users so that calls to downstream servers carry the right
//! token, and verifies bearer tokens presented to the process itself.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `oauth`: token manager, authorization flow, discovery, callback
//!   rendezvous and token stores
//! - `server`: callback HTTP router and introspection-based token verifier
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli` / `commands`: Command-line interface and its handlers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mcp_oauth_broker::{
//!     Config, OAuthCallbackRegistry, OAuthRequestContext, OAuthUserIdentity, TokenManager,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml")?;
//!     config.validate()?;
//!
//!     let registry = Arc::new(OAuthCallbackRegistry::new());
//!     let manager = TokenManager::from_settings(config.oauth.clone(), registry)?;
//!     let ctx = OAuthRequestContext::new()
//!         .with_user(OAuthUserIdentity::new("github", "42"))
//!         .with_session_id("session-1");
//!     let token = manager
//!         .ensure_access_token(&ctx, "github", &config.servers["github"])
//!         .await?;
//!     println!("Bearer {}", token.access_token);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod oauth;
pub mod server;

// Re-export commonly used types
pub use config::Config;
pub use error::{BrokerError, Result};
pub use oauth::{
    OAuthCallbackRegistry, OAuthRequestContext, OAuthUserIdentity, TokenManager, TokenRecord,
};
pub use server::McpTokenVerifier;

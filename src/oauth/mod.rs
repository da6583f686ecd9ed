//! Delegated OAuth 2.0 for downstream servers
//!
//! This module acquires, caches and refreshes bearer tokens on behalf of end
//! users, and hosts the pieces the resource-server side shares with it.
//!
//! - [`manager`]: [`TokenManager`], the entry point.
//! - [`flow`]: the authorization code flow with PKCE and the refresh grant.
//! - [`metadata`]: RFC 9728 / RFC 8414 discovery.
//! - [`callbacks`]: rendezvous between flows and HTTP callbacks.
//! - [`store`]: token persistence backends.

pub mod access_token;
pub mod callbacks;
pub mod context;
pub mod flow;
pub mod identity;
pub mod manager;
pub mod metadata;
pub mod pkce;
pub mod records;
pub mod store;

pub use access_token::McpAccessToken;
pub use callbacks::{OAuthCallbackRegistry, PendingFlowGuard};
pub use context::OAuthRequestContext;
pub use flow::{
    AuthorizationFlowCoordinator, AuthorizationReply, AuthorizationRequest, AuthorizationRequester,
};
pub use identity::OAuthUserIdentity;
pub use manager::TokenManager;
pub use metadata::ResolvedOAuthContext;
pub use records::TokenRecord;
pub use store::{scope_fingerprint, InMemoryTokenStore, TokenStore, TokenStoreKey};

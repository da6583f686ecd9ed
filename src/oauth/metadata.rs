//! OAuth metadata discovery (RFC 9728 / RFC 8414)
//!
//! This module builds the well-known URLs for protected resource metadata
//! and authorization server metadata, fetches them in preference order, and
//! selects the authorization server to use for a resource.
//!
//! # Discovery sequence
//!
//! 1. [`candidate_resource_metadata_urls`] yields the path-specific
//!    `/.well-known/oauth-protected-resource{path}` document first and the
//!    root document second; [`fetch_resource_metadata`] returns the first one
//!    that answers with a parseable document.
//! 2. [`select_authorization_server`] picks the configured issuer when the
//!    resource lists it, otherwise the first listed server.
//! 3. [`fetch_authorization_server_metadata`] repeats step 1 for
//!    `/.well-known/oauth-authorization-server`.
//!
//! The URL builders, [`select_authorization_server`] and
//! [`normalize_resource`] are pure; only the `fetch_*` functions touch the
//! network.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{BrokerError, Result};

const PROTECTED_RESOURCE_DOCUMENT: &str = "oauth-protected-resource";
const AUTHORIZATION_SERVER_DOCUMENT: &str = "oauth-authorization-server";

// ---------------------------------------------------------------------------
// Protected Resource Metadata (RFC 9728)
// ---------------------------------------------------------------------------

/// Metadata document describing a protected resource.
///
/// # Examples
///
/// ```
/// use mcp_oauth_broker::oauth::metadata::ProtectedResourceMetadata;
///
/// let json = r#"{
///     "resource": "https://api.example.com",
///     "authorization_servers": ["https://auth.example.com"]
/// }"#;
///
/// let meta: ProtectedResourceMetadata = serde_json::from_str(json).unwrap();
/// assert_eq!(meta.authorization_servers.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// The URI of the protected resource itself.
    pub resource: String,

    /// Issuers of the authorization servers that protect this resource.
    #[serde(default)]
    pub authorization_servers: Vec<String>,

    /// OAuth scopes supported by this resource, if advertised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// Supported methods for presenting bearer tokens (e.g. `"header"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_methods_supported: Option<Vec<String>>,

    /// Additional fields not modelled above.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ProtectedResourceMetadata {
    /// Builds a document for a resource protected by a single known server.
    ///
    /// Used when the resource does not publish metadata but the client
    /// configuration names its authorization server.
    pub fn for_server(resource: impl Into<String>, authorization_server: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            authorization_servers: vec![authorization_server.into()],
            scopes_supported: None,
            bearer_methods_supported: None,
            extra: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Authorization Server Metadata (RFC 8414)
// ---------------------------------------------------------------------------

/// Metadata document describing an authorization server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    /// The issuer identifier URI for this authorization server.
    pub issuer: String,

    /// The URL of the authorization endpoint (RFC 6749 section 3.1).
    pub authorization_endpoint: String,

    /// The URL of the token endpoint (RFC 6749 section 3.2).
    pub token_endpoint: String,

    /// Dynamic Client Registration endpoint (RFC 7591), if offered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,

    /// Token introspection endpoint (RFC 7662), if offered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introspection_endpoint: Option<String>,

    /// List of OAuth scopes the server supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// List of `response_type` values the server supports.
    #[serde(default)]
    pub response_types_supported: Vec<String>,

    /// List of `grant_type` values the server supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_types_supported: Option<Vec<String>>,

    /// PKCE challenge methods the server supports (e.g. `["S256"]`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,

    /// Additional server metadata fields not explicitly modelled above.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Resolved context
// ---------------------------------------------------------------------------

/// Outcome of metadata discovery for one (server, identity) pair.
///
/// Short-lived: built per call and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedOAuthContext {
    /// Canonical resource identifier
    pub resource: String,

    /// Protected resource metadata the server selection was based on
    pub resource_metadata: ProtectedResourceMetadata,

    /// Selected authorization server URL, as listed by the resource
    pub authorization_server_url: String,

    /// Metadata of the selected authorization server
    pub authorization_metadata: AuthorizationServerMetadata,

    /// Issuer recorded on tokens and used in store keys
    pub issuer: String,

    /// Scopes requested for this server
    pub scopes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

/// Builds `[{root}/.well-known/{document}{path}, {root}/.well-known/{document}]`.
///
/// The path-specific entry is omitted when `base` has no path.
fn well_known_candidates(base: &Url, document: &str) -> Vec<Url> {
    let path = base.path().trim_end_matches('/').to_string();

    let mut root = base.clone();
    root.set_query(None);
    root.set_fragment(None);
    root.set_path(&format!("/.well-known/{document}"));

    let mut candidates = Vec::with_capacity(2);
    if !path.is_empty() {
        let mut specific = root.clone();
        specific.set_path(&format!("/.well-known/{document}{path}"));
        candidates.push(specific);
    }
    candidates.push(root);
    candidates
}

/// Candidate RFC 9728 metadata URLs for a resource, most specific first.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use mcp_oauth_broker::oauth::metadata::candidate_resource_metadata_urls;
///
/// let urls = candidate_resource_metadata_urls(&Url::parse("https://api.example.com/mcp").unwrap());
/// assert_eq!(urls[0].as_str(), "https://api.example.com/.well-known/oauth-protected-resource/mcp");
/// assert_eq!(urls[1].as_str(), "https://api.example.com/.well-known/oauth-protected-resource");
/// ```
pub fn candidate_resource_metadata_urls(resource: &Url) -> Vec<Url> {
    well_known_candidates(resource, PROTECTED_RESOURCE_DOCUMENT)
}

/// Candidate RFC 8414 metadata URLs for an issuer, most specific first.
pub fn candidate_authorization_metadata_urls(issuer: &Url) -> Vec<Url> {
    well_known_candidates(issuer, AUTHORIZATION_SERVER_DOCUMENT)
}

/// Chooses the authorization server for a resource.
///
/// A `preferred` server listed by the resource wins; the comparison ignores
/// a trailing `/` on either side and the listed value is returned as-is.
/// Otherwise the first listed server is returned.
///
/// # Errors
///
/// Returns [`BrokerError::Discovery`] when the resource lists no servers.
///
/// # Examples
///
/// ```
/// use mcp_oauth_broker::oauth::metadata::{select_authorization_server, ProtectedResourceMetadata};
///
/// let mut meta = ProtectedResourceMetadata::for_server("https://api", "https://a/");
/// meta.authorization_servers.push("https://b/".to_string());
///
/// assert_eq!(select_authorization_server(&meta, Some("https://b")).unwrap(), "https://b/");
/// assert_eq!(select_authorization_server(&meta, Some("https://c")).unwrap(), "https://a/");
/// ```
pub fn select_authorization_server(
    metadata: &ProtectedResourceMetadata,
    preferred: Option<&str>,
) -> Result<String> {
    let first = metadata.authorization_servers.first().ok_or_else(|| {
        BrokerError::Discovery(format!(
            "protected resource metadata for {} did not include authorization servers",
            metadata.resource
        ))
    })?;

    if let Some(preferred) = preferred {
        let wanted = preferred.trim_end_matches('/');
        if let Some(found) = metadata
            .authorization_servers
            .iter()
            .find(|candidate| candidate.trim_end_matches('/') == wanted)
        {
            return Ok(found.clone());
        }
        tracing::warn!(
            preferred,
            candidates = ?metadata.authorization_servers,
            "Preferred authorization server not listed; falling back to first entry"
        );
    }

    Ok(first.clone())
}

/// Canonicalizes a resource identifier.
///
/// Uses `resource` when present, otherwise `fallback`; the host is
/// lower-cased and a single trailing `/` is removed.
///
/// # Errors
///
/// Returns [`BrokerError::InvalidValue`] when both inputs are absent or empty.
///
/// # Examples
///
/// ```
/// use mcp_oauth_broker::oauth::metadata::normalize_resource;
///
/// assert_eq!(normalize_resource(Some("https://Example.COM/"), None).unwrap(), "https://example.com");
/// assert_eq!(normalize_resource(None, Some("https://fallback")).unwrap(), "https://fallback");
/// assert!(normalize_resource(None, None).is_err());
/// ```
pub fn normalize_resource(resource: Option<&str>, fallback: Option<&str>) -> Result<String> {
    let raw = resource
        .filter(|r| !r.is_empty())
        .or(fallback.filter(|f| !f.is_empty()))
        .ok_or_else(|| {
            BrokerError::InvalidValue(
                "unable to determine resource identifier for OAuth flow".to_string(),
            )
        })?;

    let canonical = match Url::parse(raw) {
        // `Url` lower-cases the host of special schemes during parsing.
        Ok(url) if url.has_host() => url.to_string(),
        _ => raw.to_string(),
    };

    Ok(canonical
        .strip_suffix('/')
        .map(str::to_string)
        .unwrap_or(canonical))
}

// ---------------------------------------------------------------------------
// Network fetch
// ---------------------------------------------------------------------------

/// GETs each candidate in order and returns the first parseable document.
async fn fetch_first<T: DeserializeOwned>(
    http: &reqwest::Client,
    candidates: &[Url],
) -> Option<(Url, T)> {
    for candidate in candidates {
        let resp = match http.get(candidate.clone()).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!(url = %candidate, error = %e, "Metadata request failed");
                continue;
            }
        };

        if !resp.status().is_success() {
            tracing::debug!(url = %candidate, status = %resp.status(), "Metadata candidate unavailable");
            continue;
        }

        match resp.json::<T>().await {
            Ok(doc) => return Some((candidate.clone(), doc)),
            Err(e) => {
                tracing::debug!(url = %candidate, error = %e, "Metadata document did not parse");
            }
        }
    }
    None
}

/// Fetches the protected resource metadata for `resource`.
///
/// # Errors
///
/// Returns [`BrokerError::Discovery`] if no candidate yields a document, or a
/// URL error if `resource` is not a URL.
pub async fn fetch_resource_metadata(
    http: &reqwest::Client,
    resource: &str,
) -> Result<ProtectedResourceMetadata> {
    let resource_url = Url::parse(resource)?;
    let candidates = candidate_resource_metadata_urls(&resource_url);
    fetch_first(http, &candidates)
        .await
        .map(|(url, doc)| {
            tracing::debug!(%url, "Resolved protected resource metadata");
            doc
        })
        .ok_or_else(|| {
            BrokerError::Discovery(format!(
                "protected resource metadata not found for {resource}"
            ))
            .into()
        })
}

/// Fetches the authorization server metadata for `issuer`.
///
/// # Errors
///
/// Returns [`BrokerError::Discovery`] if no candidate yields a document, or a
/// URL error if `issuer` is not a URL.
pub async fn fetch_authorization_server_metadata(
    http: &reqwest::Client,
    issuer: &str,
) -> Result<AuthorizationServerMetadata> {
    let issuer_url = Url::parse(issuer)?;
    let candidates = candidate_authorization_metadata_urls(&issuer_url);
    fetch_first(http, &candidates)
        .await
        .map(|(url, doc)| {
            tracing::debug!(%url, "Resolved authorization server metadata");
            doc
        })
        .ok_or_else(|| {
            BrokerError::Discovery(format!(
                "authorization server metadata not found for issuer {issuer}"
            ))
            .into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource_with_servers(servers: &[&str]) -> ProtectedResourceMetadata {
        ProtectedResourceMetadata {
            resource: "https://api.example.com".to_string(),
            authorization_servers: servers.iter().map(|s| s.to_string()).collect(),
            scopes_supported: None,
            bearer_methods_supported: None,
            extra: HashMap::new(),
        }
    }

    // -----------------------------------------------------------------------
    // candidate URLs
    // -----------------------------------------------------------------------

    #[test]
    fn test_resource_candidates_path_first_then_root() {
        let url = Url::parse("https://api.example.com/mcp").unwrap();
        let urls = candidate_resource_metadata_urls(&url);
        assert_eq!(urls.len(), 2);
        assert!(urls[0]
            .as_str()
            .ends_with("/.well-known/oauth-protected-resource/mcp"));
        assert!(urls[1]
            .as_str()
            .ends_with("/.well-known/oauth-protected-resource"));
    }

    #[test]
    fn test_authorization_candidates_path_first_then_root() {
        let url = Url::parse("https://auth.example.com/tenant").unwrap();
        let urls = candidate_authorization_metadata_urls(&url);
        assert_eq!(
            urls[0].as_str(),
            "https://auth.example.com/.well-known/oauth-authorization-server/tenant"
        );
        assert_eq!(
            urls[1].as_str(),
            "https://auth.example.com/.well-known/oauth-authorization-server"
        );
    }

    #[test]
    fn test_candidates_without_path_only_root() {
        let url = Url::parse("https://auth.example.com/").unwrap();
        let urls = candidate_authorization_metadata_urls(&url);
        assert_eq!(urls.len(), 1);
        assert_eq!(
            urls[0].as_str(),
            "https://auth.example.com/.well-known/oauth-authorization-server"
        );
    }

    #[test]
    fn test_candidates_keep_port_and_drop_query() {
        let url = Url::parse("http://127.0.0.1:8080/tenant/v2/?x=1#frag").unwrap();
        let urls = candidate_authorization_metadata_urls(&url);
        assert_eq!(
            urls[0].as_str(),
            "http://127.0.0.1:8080/.well-known/oauth-authorization-server/tenant/v2"
        );
        assert_eq!(
            urls[1].as_str(),
            "http://127.0.0.1:8080/.well-known/oauth-authorization-server"
        );
    }

    // -----------------------------------------------------------------------
    // select_authorization_server
    // -----------------------------------------------------------------------

    #[test]
    fn test_select_preferred_with_trailing_slash() {
        let meta = resource_with_servers(&["https://a/", "https://b/"]);
        assert_eq!(
            select_authorization_server(&meta, Some("https://b/")).unwrap(),
            "https://b/"
        );
        assert_eq!(
            select_authorization_server(&meta, Some("https://b")).unwrap(),
            "https://b/"
        );
    }

    #[test]
    fn test_select_preferred_when_candidates_lack_slash() {
        let meta = resource_with_servers(&["https://auth.example.com", "https://other.example.com"]);
        assert_eq!(
            select_authorization_server(&meta, Some("https://other.example.com/")).unwrap(),
            "https://other.example.com"
        );
    }

    #[test]
    fn test_select_unknown_preferred_falls_back_to_first() {
        let meta = resource_with_servers(&["https://a/", "https://b/"]);
        assert_eq!(
            select_authorization_server(&meta, Some("https://unknown")).unwrap(),
            "https://a/"
        );
        assert_eq!(select_authorization_server(&meta, None).unwrap(), "https://a/");
    }

    #[test]
    fn test_select_without_servers_is_error() {
        let meta = resource_with_servers(&[]);
        let err = select_authorization_server(&meta, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BrokerError>(),
            Some(BrokerError::Discovery(_))
        ));
    }

    // -----------------------------------------------------------------------
    // normalize_resource
    // -----------------------------------------------------------------------

    #[test]
    fn test_normalize_lowercases_host_and_strips_slash() {
        assert_eq!(
            normalize_resource(Some("https://Example.COM/"), None).unwrap(),
            "https://example.com"
        );
    }

    #[test]
    fn test_normalize_keeps_path() {
        assert_eq!(
            normalize_resource(Some("https://example.com/api"), None).unwrap(),
            "https://example.com/api"
        );
        assert_eq!(
            normalize_resource(Some("https://example.com/api/"), None).unwrap(),
            "https://example.com/api"
        );
    }

    #[test]
    fn test_normalize_uses_fallback() {
        assert_eq!(
            normalize_resource(None, Some("https://fallback")).unwrap(),
            "https://fallback"
        );
        assert_eq!(
            normalize_resource(Some(""), Some("https://fallback/")).unwrap(),
            "https://fallback"
        );
    }

    #[test]
    fn test_normalize_without_inputs_is_invalid_value() {
        let err = normalize_resource(None, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BrokerError>(),
            Some(BrokerError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_normalize_non_url_strips_single_slash() {
        assert_eq!(
            normalize_resource(Some("urn:resource//"), None).unwrap(),
            "urn:resource/"
        );
    }

    // -----------------------------------------------------------------------
    // serde
    // -----------------------------------------------------------------------

    #[test]
    fn test_authorization_metadata_minimal_document() {
        let json = r#"{
            "issuer": "https://auth.example.com",
            "authorization_endpoint": "https://auth.example.com/authorize",
            "token_endpoint": "https://auth.example.com/token",
            "custom_field": "custom_value"
        }"#;
        let meta: AuthorizationServerMetadata = serde_json::from_str(json).unwrap();
        assert!(meta.response_types_supported.is_empty());
        assert_eq!(meta.extra["custom_field"], "custom_value");
    }
}

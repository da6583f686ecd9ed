//! Shared fixtures for the broker integration tests

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use async_trait::async_trait;
use mockall::mock;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcp_oauth_broker::config::{McpServerConfig, OAuthClientSettings, OAuthSettings};
use mcp_oauth_broker::oauth::flow::{
    AuthorizationReply, AuthorizationRequest, AuthorizationRequester,
};
use mcp_oauth_broker::oauth::metadata::{
    AuthorizationServerMetadata, ProtectedResourceMetadata, ResolvedOAuthContext,
};

/// Client id used by every test server configuration.
#[allow(dead_code)]
pub const CLIENT_ID: &str = "client-123";

/// Public base URL used for the internal callback in tests.
#[allow(dead_code)]
pub const CALLBACK_BASE: &str = "http://broker.test";

mock! {
    pub Requester {}

    #[async_trait]
    impl AuthorizationRequester for Requester {
        async fn request_authorization(
            &self,
            request: AuthorizationRequest,
        ) -> anyhow::Result<AuthorizationReply>;
    }
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Protected resource metadata body naming `base_url` as its only
/// authorization server.
#[allow(dead_code)]
pub fn protected_resource_body(resource: &str, base_url: &str) -> serde_json::Value {
    serde_json::json!({
        "resource": resource,
        "authorization_servers": [base_url],
        "bearer_methods_supported": ["header"]
    })
}

/// Authorization server metadata body with endpoints under `base_url`.
#[allow(dead_code)]
pub fn authorization_server_body(base_url: &str) -> serde_json::Value {
    serde_json::json!({
        "issuer": base_url,
        "authorization_endpoint": format!("{base_url}/authorize"),
        "token_endpoint": format!("{base_url}/token"),
        "introspection_endpoint": format!("{base_url}/introspect"),
        "response_types_supported": ["code"],
        "code_challenge_methods_supported": ["S256"]
    })
}

/// Mounts RFC 9728 metadata for `{server}/mcp` and RFC 8414 metadata for the
/// server root, both served by `server`.
#[allow(dead_code)]
pub async fn mount_discovery(server: &MockServer) {
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-protected-resource/mcp"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(protected_resource_body(&format!("{base}/mcp"), &base)),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-authorization-server"))
        .respond_with(ResponseTemplate::new(200).set_body_json(authorization_server_body(&base)))
        .mount(server)
        .await;
}

/// OAuth client settings for the test client.
#[allow(dead_code)]
pub fn client_settings(scopes: &[&str]) -> OAuthClientSettings {
    OAuthClientSettings {
        client_id: Some(CLIENT_ID.to_string()),
        scopes: scopes.iter().map(|s| s.to_string()).collect(),
        ..OAuthClientSettings::default()
    }
}

/// A server at `{base}/mcp` protected by OAuth with the test client.
#[allow(dead_code)]
pub fn server_config(base: &str, scopes: &[&str]) -> McpServerConfig {
    McpServerConfig::with_oauth(format!("{base}/mcp"), client_settings(scopes))
}

/// Broker settings with the internal callback enabled and a short flow
/// timeout.
#[allow(dead_code)]
pub fn oauth_settings(flow_timeout_seconds: u64) -> OAuthSettings {
    OAuthSettings {
        callback_base_url: Some(CALLBACK_BASE.to_string()),
        flow_timeout_seconds,
        ..OAuthSettings::default()
    }
}

/// A resolved context pointing at endpoints under `base`.
#[allow(dead_code)]
pub fn resolved_context(base: &str, scopes: &[&str]) -> ResolvedOAuthContext {
    let resource = format!("{base}/mcp");
    ResolvedOAuthContext {
        resource: resource.clone(),
        resource_metadata: ProtectedResourceMetadata::for_server(resource, base),
        authorization_server_url: base.to_string(),
        authorization_metadata: AuthorizationServerMetadata {
            issuer: base.to_string(),
            authorization_endpoint: format!("{base}/authorize"),
            token_endpoint: format!("{base}/token"),
            registration_endpoint: None,
            introspection_endpoint: None,
            scopes_supported: None,
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: None,
            code_challenge_methods_supported: Some(vec!["S256".to_string()]),
            extra: HashMap::new(),
        },
        issuer: base.to_string(),
        scopes: scopes.iter().map(|s| s.to_string()).collect(),
    }
}

/// Extracts the `state` query parameter of an authorize URL.
#[allow(dead_code)]
pub fn state_of(authorize_url: &str) -> String {
    let url = url::Url::parse(authorize_url).expect("authorize URL should parse");
    url.query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("authorize URL should carry state")
}

/// A requester that answers with a redirect URL carrying `code` and the
/// request's own state.
#[allow(dead_code)]
pub fn redirecting_requester(code: &'static str) -> MockRequester {
    let mut requester = MockRequester::new();
    requester.expect_request_authorization().returning(move |req| {
        let state = state_of(&req.url);
        Ok(AuthorizationReply::redirect(format!(
            "{CALLBACK_BASE}/internal/oauth/callback/{}?code={code}&state={state}",
            req.flow_id
        )))
    });
    requester
}

/// Token endpoint response body.
#[allow(dead_code)]
pub fn token_body(access_token: &str, refresh_token: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "access_token": access_token,
        "token_type": "Bearer",
        "expires_in": 3600
    });
    if let Some(refresh) = refresh_token {
        body["refresh_token"] = serde_json::Value::String(refresh.to_string());
    }
    body
}

//! OAuth 2.0 authorization code flow with PKCE, run on behalf of a user
//!
//! [`AuthorizationFlowCoordinator::authorize`] drives one delegated
//! authorization attempt:
//!
//! 1. Build redirect URI candidates; an internal callback URL goes first.
//! 2. Generate a PKCE pair and a `state` nonce, and build the authorize URL.
//! 3. Pre-register the flow in the [`OAuthCallbackRegistry`] so no callback
//!    can arrive before the flow is waiting for it.
//! 4. Ask the user to authorize through the request's
//!    [`AuthorizationRequester`], or through a loopback listener when there is
//!    no upstream session.
//! 5. Validate the callback (`error`, `state`, `code`) and exchange the code at
//!    the token endpoint.
//!
//! None of the failures are retried here; the token manager decides.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use url::Url;

use crate::config::{OAuthClientSettings, OAuthSettings, TokenEndpointAuthMethod};
use crate::error::{BrokerError, Result};
use crate::oauth::callbacks::{
    CallbackPayload, OAuthCallbackRegistry, PendingFlowGuard, CALLBACK_COMPLETE_HTML,
};
use crate::oauth::context::OAuthRequestContext;
use crate::oauth::identity::OAuthUserIdentity;
use crate::oauth::metadata::ResolvedOAuthContext;
use crate::oauth::pkce::{self, PkceChallenge};
use crate::oauth::records::TokenRecord;

/// RPC method used to relay an [`AuthorizationRequest`] to the upstream client.
pub const AUTH_REQUEST_METHOD: &str = "auth/request";

// ---------------------------------------------------------------------------
// Upstream authorization channel
// ---------------------------------------------------------------------------

/// Payload sent upstream to ask the user to authorize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Authorize URL the user should open
    pub url: String,

    /// Human-readable prompt
    pub message: String,

    /// Redirect URIs the flow accepts, first one in use
    pub redirect_uri_options: Vec<String>,

    /// Identifier of the pending flow
    pub flow_id: String,

    /// Downstream server the token is for
    pub server_name: String,

    /// Requested scopes
    pub scopes: Vec<String>,

    /// How long the flow waits for a callback (seconds)
    pub flow_timeout_seconds: u64,
}

/// Reply to an [`AuthorizationRequest`].
///
/// An empty reply means "the callback will arrive out of band".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationReply {
    /// Full redirect URL captured by the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Authorization code already extracted by the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// `state` accompanying `code`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// OAuth error reported by the authorization server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Description accompanying `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl AuthorizationReply {
    /// A reply carrying the full redirect URL.
    pub fn redirect(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// A reply carrying an extracted code and state.
    pub fn code(code: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            state: Some(state.into()),
            ..Self::default()
        }
    }

    fn into_payload(self) -> CallbackPayload {
        [
            ("code", self.code),
            ("state", self.state),
            ("error", self.error),
            ("error_description", self.error_description),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k.to_string(), v)))
        .collect()
    }
}

/// Channel to the user for an in-progress request.
///
/// Implemented by whatever carries the upstream session (for MCP, an
/// [`AUTH_REQUEST_METHOD`] request on the current session). Returning
/// [`BrokerError::AuthorizationDeclined`] signals an explicit refusal.
#[async_trait]
pub trait AuthorizationRequester: Send + Sync {
    /// Presents `request` to the user.
    async fn request_authorization(
        &self,
        request: AuthorizationRequest,
    ) -> Result<AuthorizationReply>;
}

// ---------------------------------------------------------------------------
// Token endpoint response
// ---------------------------------------------------------------------------

/// Token endpoint response, accepted as JSON or form-encoded.
#[derive(Debug)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<f64>,
    scopes: Option<Vec<String>>,
    token_type: Option<String>,
    raw: String,
}

impl TokenResponse {
    /// Returns `None` when the body carries no `access_token`.
    fn parse(body: &str) -> Option<Self> {
        let payload: Map<String, Value> = serde_json::from_str(body).unwrap_or_else(|_| {
            url::form_urlencoded::parse(body.trim().as_bytes())
                .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                .collect()
        });

        let string_field = |name: &str| {
            payload
                .get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let access_token = string_field("access_token")?;
        let scopes = string_field("scope")
            .map(|s| s.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .filter(|s| !s.is_empty());
        let expires_in = payload.get("expires_in").and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });

        Some(Self {
            access_token,
            refresh_token: string_field("refresh_token"),
            expires_in,
            scopes,
            token_type: string_field("token_type"),
            raw: body.to_string(),
        })
    }

    /// Absolute expiry derived from `expires_in`.
    ///
    /// A negative, non-finite or unrepresentable `expires_in` is a malformed
    /// response.
    fn expires_at(&self) -> std::result::Result<Option<chrono::DateTime<Utc>>, String> {
        let Some(secs) = self.expires_in else {
            return Ok(None);
        };
        let malformed = || format!("token endpoint returned invalid expires_in: {secs}");
        if !secs.is_finite() || secs < 0.0 || secs * 1000.0 > i64::MAX as f64 {
            return Err(malformed());
        }
        TimeDelta::try_milliseconds((secs * 1000.0) as i64)
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .map(Some)
            .ok_or_else(malformed)
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Runs authorization code flows and refresh grants against token endpoints.
///
/// Stateless apart from the shared callback registry; one instance serves all
/// servers and users.
#[derive(Debug, Clone)]
pub struct AuthorizationFlowCoordinator {
    http: reqwest::Client,
    settings: OAuthSettings,
    registry: Arc<OAuthCallbackRegistry>,
}

impl AuthorizationFlowCoordinator {
    /// Creates a coordinator.
    ///
    /// `registry` must be the same instance the callback router delivers to.
    pub fn new(
        http: reqwest::Client,
        settings: OAuthSettings,
        registry: Arc<OAuthCallbackRegistry>,
    ) -> Self {
        Self {
            http,
            settings,
            registry,
        }
    }

    /// The callback registry this coordinator registers flows in.
    pub fn registry(&self) -> &Arc<OAuthCallbackRegistry> {
        &self.registry
    }

    /// Runs one authorization code flow and returns the issued token.
    ///
    /// # Errors
    ///
    /// - [`BrokerError::MissingUserIdentity`] without `user`.
    /// - [`BrokerError::OAuthFlow`] for a missing `client_id`, an
    ///   authorization error, a `state` mismatch, a missing code, or a failed
    ///   token exchange.
    /// - [`BrokerError::CallbackTimeout`] when no callback arrives in time.
    /// - [`BrokerError::AuthorizationDeclined`] when the user refuses or there
    ///   is no channel to ask them.
    pub async fn authorize(
        &self,
        ctx: &OAuthRequestContext,
        user: Option<&OAuthUserIdentity>,
        server_name: &str,
        oauth: &OAuthClientSettings,
        resolved: &ResolvedOAuthContext,
    ) -> Result<TokenRecord> {
        let user = user.ok_or_else(|| {
            BrokerError::MissingUserIdentity(
                "cannot begin OAuth flow without an authenticated user".to_string(),
            )
        })?;

        let client_id = oauth
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                BrokerError::OAuthFlow(format!(
                    "no OAuth client_id configured for server '{server_name}'"
                ))
            })?;

        let flow_id = uuid::Uuid::new_v4().simple().to_string();
        let use_loopback = ctx.requester.is_none() && !self.settings.loopback_ports.is_empty();

        if ctx.requester.is_none() && !use_loopback {
            return Err(BrokerError::AuthorizationDeclined(
                "no upstream session available to prompt the user for authorization".to_string(),
            )
            .into());
        }

        // Redirect candidates: internal callback first, then static options.
        let internal_redirect = if oauth.use_internal_callback && !use_loopback {
            self.settings.internal_callback_url(&flow_id)
        } else {
            None
        };
        let mut redirect_options: Vec<String> = internal_redirect.iter().cloned().collect();
        redirect_options.extend(oauth.redirect_uri_options.iter().cloned());

        let loopback = if use_loopback {
            let (listener, port) = bind_loopback(&self.settings.loopback_ports).await?;
            let loopback_uri = format!("http://127.0.0.1:{port}/callback");
            for candidate in loopback_candidates(&self.settings.loopback_ports) {
                if !redirect_options.contains(&candidate) {
                    redirect_options.push(candidate);
                }
            }
            // The bound port must be the one the server redirects to.
            redirect_options.retain(|uri| uri != &loopback_uri);
            redirect_options.insert(0, loopback_uri);
            Some(listener)
        } else {
            None
        };

        let redirect_uri = redirect_options.first().cloned().ok_or_else(|| {
            BrokerError::OAuthFlow(
                "no redirect URI options configured for OAuth authorization flow".to_string(),
            )
        })?;

        let pkce = PkceChallenge::generate();
        let state = pkce::generate_state();
        let scope_param = resolved.scopes.join(" ");

        let authorize_url = build_authorize_url(
            &resolved.authorization_metadata.authorization_endpoint,
            &[
                ("response_type", "code"),
                ("client_id", client_id),
                ("redirect_uri", redirect_uri.as_str()),
                ("scope", scope_param.as_str()),
                ("state", state.as_str()),
                ("code_challenge", pkce.challenge.as_str()),
                ("code_challenge_method", pkce::CODE_CHALLENGE_METHOD),
                ("resource", resolved.resource.as_str()),
            ],
            &oauth.extra_authorize_params,
        )?;

        tracing::info!(
            server = server_name,
            user = %user.cache_key(),
            flow_id = %flow_id,
            loopback = use_loopback,
            "Starting OAuth authorization flow"
        );

        // Register before anyone can see the authorize URL.
        let pending = internal_redirect.as_ref().map(|_| {
            let handle = self.registry.create_handle(&flow_id);
            self.registry.register_state(&flow_id, &state);
            (handle, PendingFlowGuard::new(Arc::clone(&self.registry), &flow_id))
        });

        let timeout = Duration::from_secs(self.settings.flow_timeout_seconds);

        let callback = match (&ctx.requester, loopback) {
            (_, Some(listener)) => {
                eprintln!("Open the following URL in your browser to authorize {server_name}:\n{authorize_url}");
                try_open_browser(authorize_url.as_str());
                tokio::time::timeout(timeout, accept_loopback_callback(listener))
                    .await
                    .map_err(|_| {
                        BrokerError::CallbackTimeout(format!(
                            "timed out waiting for OAuth callback after {} seconds",
                            timeout.as_secs()
                        ))
                    })??
            }
            (Some(requester), None) => {
                let request = AuthorizationRequest {
                    url: authorize_url.to_string(),
                    message: format!("Authorization required for {server_name}"),
                    redirect_uri_options: redirect_options.clone(),
                    flow_id: flow_id.clone(),
                    server_name: server_name.to_string(),
                    scopes: resolved.scopes.clone(),
                    flow_timeout_seconds: self.settings.flow_timeout_seconds,
                };
                let reply = requester.request_authorization(request).await?;
                let redirect_url = reply.url.clone().filter(|u| !u.is_empty());

                if let Some(url) = redirect_url {
                    parse_callback_url(&url)?
                } else if reply.code.is_some() || reply.error.is_some() {
                    reply.into_payload()
                } else if let Some((handle, _guard)) = pending {
                    match tokio::time::timeout(timeout, handle).await {
                        Ok(Ok(payload)) => payload,
                        Ok(Err(_)) => {
                            return Err(BrokerError::OAuthFlow(
                                "OAuth callback slot was discarded before delivery".to_string(),
                            )
                            .into())
                        }
                        Err(_) => {
                            return Err(BrokerError::CallbackTimeout(format!(
                                "timed out waiting for OAuth callback after {} seconds",
                                timeout.as_secs()
                            ))
                            .into())
                        }
                    }
                } else {
                    return Err(BrokerError::AuthorizationDeclined(
                        "authorization request was declined by the user".to_string(),
                    )
                    .into());
                }
            }
            (None, None) => {
                return Err(BrokerError::AuthorizationDeclined(
                    "no channel available to prompt the user for authorization".to_string(),
                )
                .into())
            }
        };

        let code = validate_callback(&callback, &state)?;

        let mut form = BTreeMap::new();
        form.insert("grant_type".to_string(), "authorization_code".to_string());
        form.insert("code".to_string(), code);
        form.insert("redirect_uri".to_string(), redirect_uri);
        form.insert("code_verifier".to_string(), pkce.verifier);
        form.insert("resource".to_string(), resolved.resource.clone());
        if !scope_param.is_empty() {
            form.insert("scope".to_string(), scope_param);
        }

        let response = self
            .post_token_request(
                &resolved.authorization_metadata.token_endpoint,
                oauth,
                client_id,
                form,
            )
            .await
            .map_err(BrokerError::OAuthFlow)?;

        let expires_at = response.expires_at().map_err(BrokerError::OAuthFlow)?;
        let record = TokenRecord {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at,
            scopes: response.scopes.unwrap_or_else(|| resolved.scopes.clone()),
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            resource: Some(resolved.resource.clone()),
            authorization_server: Some(resolved.issuer.clone()),
            metadata: Map::new(),
        }
        .with_metadata("raw", response.raw)
        .with_metadata(
            "authorization_server_url",
            resolved.authorization_server_url.clone(),
        );

        tracing::info!(server = server_name, flow_id = %flow_id, "OAuth authorization flow completed");
        Ok(record)
    }

    /// Exchanges `record`'s refresh token for a new access token.
    ///
    /// The new record keeps the old refresh token and scopes when the
    /// response omits them. It carries no expiry when the response has no
    /// `expires_in`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::TokenRefresh`] for any failure.
    pub async fn refresh(
        &self,
        record: &TokenRecord,
        oauth: &OAuthClientSettings,
        resolved: &ResolvedOAuthContext,
    ) -> Result<TokenRecord> {
        let refresh_token = record
            .refresh_token
            .as_deref()
            .ok_or_else(|| BrokerError::TokenRefresh("record has no refresh token".to_string()))?;
        let client_id = oauth
            .client_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BrokerError::TokenRefresh("no OAuth client_id configured".to_string()))?;

        let mut form = BTreeMap::new();
        form.insert("grant_type".to_string(), "refresh_token".to_string());
        form.insert("refresh_token".to_string(), refresh_token.to_string());
        form.insert("resource".to_string(), resolved.resource.clone());
        if !resolved.scopes.is_empty() {
            form.insert("scope".to_string(), resolved.scopes.join(" "));
        }

        let response = self
            .post_token_request(
                &resolved.authorization_metadata.token_endpoint,
                oauth,
                client_id,
                form,
            )
            .await
            .map_err(BrokerError::TokenRefresh)?;

        let expires_at = response.expires_at().map_err(BrokerError::TokenRefresh)?;
        let mut refreshed = record.clone();
        refreshed.access_token = response.access_token;
        refreshed.expires_at = expires_at;
        if let Some(token) = response.refresh_token {
            refreshed.refresh_token = Some(token);
        }
        if let Some(scopes) = response.scopes {
            refreshed.scopes = scopes;
        }
        if let Some(token_type) = response.token_type {
            refreshed.token_type = token_type;
        }
        refreshed.metadata.insert("raw".to_string(), Value::String(response.raw));

        tracing::debug!(resource = %resolved.resource, "Refreshed OAuth access token");
        Ok(refreshed)
    }

    /// POSTs a grant to the token endpoint and parses the response.
    ///
    /// Errors are returned as messages so each caller can wrap them in its
    /// own error class.
    async fn post_token_request(
        &self,
        token_endpoint: &str,
        oauth: &OAuthClientSettings,
        client_id: &str,
        mut form: BTreeMap<String, String>,
    ) -> std::result::Result<TokenResponse, String> {
        for (key, value) in &oauth.extra_token_params {
            form.insert(key.clone(), value.clone());
        }

        let mut request = self
            .http
            .post(token_endpoint)
            .header(reqwest::header::ACCEPT, "application/json");

        match (&oauth.client_secret, oauth.token_endpoint_auth_method) {
            (Some(secret), TokenEndpointAuthMethod::ClientSecretBasic) => {
                request = request.basic_auth(client_id, Some(secret));
            }
            (Some(secret), TokenEndpointAuthMethod::ClientSecretPost) => {
                form.insert("client_id".to_string(), client_id.to_string());
                form.insert("client_secret".to_string(), secret.clone());
            }
            (None, _) => {
                form.insert("client_id".to_string(), client_id.to_string());
            }
        }

        let resp = request
            .form(&form)
            .send()
            .await
            .map_err(|e| format!("token endpoint request failed: {e}"))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| format!("failed to read token endpoint response: {e}"))?;

        if !status.is_success() {
            tracing::warn!(%status, endpoint = token_endpoint, "Token endpoint rejected grant");
            return Err(format!("token endpoint returned {status}: {body}"));
        }

        TokenResponse::parse(&body)
            .ok_or_else(|| "token endpoint response missing access_token".to_string())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Builds the authorize URL from `endpoint` and query parameters.
///
/// A trailing `/` on the endpoint path is dropped so the query follows the
/// last path segment directly.
pub fn build_authorize_url(
    endpoint: &str,
    params: &[(&str, &str)],
    extra: &std::collections::HashMap<String, String>,
) -> Result<Url> {
    let mut url = Url::parse(endpoint).map_err(|e| {
        BrokerError::OAuthFlow(format!("invalid authorization endpoint '{endpoint}': {e}"))
    })?;

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    let mut extra: Vec<_> = extra.iter().collect();
    extra.sort();

    {
        let mut query = url.query_pairs_mut();
        for (key, value) in params {
            query.append_pair(key, value);
        }
        for (key, value) in extra {
            query.append_pair(key, value);
        }
    }
    Ok(url)
}

/// Extracts callback parameters from a redirect URL's query and fragment.
///
/// Relative URLs (`/callback?code=...`) are accepted. Later occurrences of a
/// parameter win, and fragment parameters override query parameters.
pub fn parse_callback_url(raw: &str) -> Result<CallbackPayload> {
    let base = Url::parse("http://localhost/")?;
    let url = base
        .join(raw)
        .map_err(|e| BrokerError::OAuthFlow(format!("invalid callback URL: {e}")))?;

    let mut payload: CallbackPayload = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if let Some(fragment) = url.fragment() {
        payload.extend(
            url::form_urlencoded::parse(fragment.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
    }
    Ok(payload)
}

/// Checks a callback payload and returns its authorization code.
fn validate_callback(payload: &CallbackPayload, expected_state: &str) -> Result<String> {
    if let Some(error) = payload.get("error").filter(|e| !e.is_empty()) {
        let description = payload
            .get("error_description")
            .filter(|d| !d.is_empty())
            .unwrap_or(error);
        return Err(BrokerError::OAuthFlow(format!(
            "authorization server returned error: {description}"
        ))
        .into());
    }

    if payload.get("state").map(String::as_str) != Some(expected_state) {
        tracing::warn!("State mismatch in OAuth callback");
        return Err(
            BrokerError::OAuthFlow("state mismatch detected in OAuth callback".to_string()).into(),
        );
    }

    payload
        .get("code")
        .filter(|c| !c.is_empty())
        .cloned()
        .ok_or_else(|| {
            BrokerError::OAuthFlow("authorization callback did not include code".to_string())
                .into()
        })
}

fn loopback_candidates(ports: &[u16]) -> Vec<String> {
    ports
        .iter()
        .flat_map(|port| {
            [
                format!("http://127.0.0.1:{port}/callback"),
                format!("http://localhost:{port}/callback"),
            ]
        })
        .collect()
}

/// Binds the first free port in `ports` on 127.0.0.1.
async fn bind_loopback(ports: &[u16]) -> Result<(TcpListener, u16)> {
    for &port in ports {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => {
                let bound = listener.local_addr()?.port();
                return Ok((listener, bound));
            }
            Err(e) => tracing::debug!(port, error = %e, "Loopback port unavailable"),
        }
    }
    Err(BrokerError::OAuthFlow(format!(
        "none of the configured loopback ports {ports:?} could be bound"
    ))
    .into())
}

/// Serves the loopback listener until a `/callback` request arrives and
/// returns its query parameters.
async fn accept_loopback_callback(listener: TcpListener) -> Result<CallbackPayload> {
    loop {
        let (stream, peer) = listener.accept().await.map_err(|e| {
            BrokerError::OAuthFlow(format!("failed to accept OAuth callback connection: {e}"))
        })?;

        let mut reader = BufReader::new(stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line).await?;

        // Drain headers up to the blank line.
        loop {
            let mut line = String::new();
            let read = reader.read_line(&mut line).await?;
            if read == 0 || line.trim_end().is_empty() {
                break;
            }
        }

        // "GET /callback?code=...&state=... HTTP/1.1"
        let target = request_line.split_whitespace().nth(1).unwrap_or("/");
        let is_callback = target.split('?').next() == Some("/callback");

        let response = if is_callback {
            format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                CALLBACK_COMPLETE_HTML.len(),
                CALLBACK_COMPLETE_HTML
            )
        } else {
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
        };
        let mut stream = reader.into_inner();
        if let Err(e) = stream.write_all(response.as_bytes()).await {
            tracing::debug!(%peer, error = %e, "Failed to answer loopback request");
        }
        let _ = stream.shutdown().await;

        if is_callback {
            return parse_callback_url(target);
        }
        tracing::debug!(%peer, target, "Ignoring non-callback loopback request");
    }
}

/// Best-effort attempt to open `url` in the user's browser.
fn try_open_browser(url: &str) {
    #[cfg(target_os = "macos")]
    {
        let _ = std::process::Command::new("open").arg(url).spawn();
    }
    #[cfg(target_os = "linux")]
    {
        let _ = std::process::Command::new("xdg-open").arg(url).spawn();
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        let _ = url;
    }
}

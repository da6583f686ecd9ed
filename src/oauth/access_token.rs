//! Verified bearer token model built from RFC 7662 introspection responses

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A bearer token accepted by this resource server, with identity claims.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use mcp_oauth_broker::oauth::access_token::McpAccessToken;
///
/// let payload = json!({"active": true, "cid": "app", "scp": ["read"], "sub": "u1"});
/// let token = McpAccessToken::from_introspection("tok", payload.as_object().unwrap(), None);
///
/// assert_eq!(token.client_id, "app");
/// assert_eq!(token.scopes, vec!["read"]);
/// assert_eq!(token.subject.as_deref(), Some("u1"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpAccessToken {
    /// The raw bearer token
    pub token: String,

    /// Client the token was issued to; empty when not reported
    pub client_id: String,

    /// Granted scopes
    pub scopes: Vec<String>,

    /// Expiry as epoch seconds
    pub expires_at: Option<i64>,

    /// Resource the token is valid for
    pub resource: Option<String>,

    /// Subject (`sub`) of the token
    pub subject: Option<String>,

    /// Email or preferred username of the subject
    pub email: Option<String>,

    /// Issuer (`iss`) of the token
    pub issuer: Option<String>,

    /// RFC 8707 resource indicator; mirrors `resource`
    pub resource_indicator: Option<String>,

    /// The full introspection payload
    pub claims: Map<String, Value>,
}

impl McpAccessToken {
    /// Builds a token from an introspection payload.
    ///
    /// Field names vary between issuers: the client id may be `client_id`,
    /// `clientId` or `cid`; scopes may be `scope` or `scp`, as a
    /// space-separated string or a list; the resource may be `resource` or
    /// `aud`, as a string or a list. `resource_hint`, when given, takes
    /// precedence over the reported resource.
    pub fn from_introspection(
        token: impl Into<String>,
        payload: &Map<String, Value>,
        resource_hint: Option<&str>,
    ) -> Self {
        let client_id = first_non_empty(payload, &["client_id", "clientId", "cid"])
            .map(value_to_string)
            .unwrap_or_default();

        let scopes = match first_non_empty(payload, &["scope", "scp"]) {
            Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
            Some(Value::Array(items)) => items.iter().map(value_to_string).collect(),
            _ => Vec::new(),
        };

        let audience = match first_non_empty(payload, &["resource", "aud"]) {
            Some(Value::Array(items)) => items.iter().find(|v| !is_empty(v)).map(value_to_string),
            Some(v) if !is_empty(v) => Some(value_to_string(v)),
            _ => None,
        };
        let resource = resource_hint
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .or(audience);

        let expires_at = payload.get("exp").and_then(|v| match v {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            _ => None,
        });

        Self {
            token: token.into(),
            client_id,
            scopes,
            expires_at,
            resource: resource.clone(),
            subject: first_non_empty(payload, &["sub", "subject"]).map(value_to_string),
            email: first_non_empty(payload, &["email", "preferred_username"])
                .map(value_to_string),
            issuer: payload
                .get("iss")
                .filter(|v| !is_empty(v))
                .map(value_to_string),
            resource_indicator: resource,
            claims: payload.clone(),
        }
    }

    /// Returns `true` when `now >= expires_at - leeway_seconds`.
    pub fn is_expired(&self, leeway_seconds: i64) -> bool {
        match self.expires_at {
            None => false,
            Some(exp) => Utc::now().timestamp() >= exp.saturating_sub(leeway_seconds),
        }
    }

    /// Returns `true` when every scope in `required` was granted.
    pub fn has_scopes<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required
            .iter()
            .all(|r| self.scopes.iter().any(|s| s == r.as_ref()))
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// First of `keys` with a non-null, non-empty value.
fn first_non_empty<'a>(payload: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| payload.get(*k))
        .find(|v| !is_empty(v))
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn from(payload: Value, hint: Option<&str>) -> McpAccessToken {
        McpAccessToken::from_introspection("tok", payload.as_object().unwrap(), hint)
    }

    #[test]
    fn test_client_id_variants() {
        assert_eq!(from(json!({"client_id": "a"}), None).client_id, "a");
        assert_eq!(from(json!({"clientId": "b"}), None).client_id, "b");
        assert_eq!(from(json!({"cid": "c"}), None).client_id, "c");
        assert_eq!(from(json!({"client_id": "", "cid": "c"}), None).client_id, "c");
        assert_eq!(from(json!({}), None).client_id, "");
    }

    #[test]
    fn test_scope_string_and_list() {
        assert_eq!(
            from(json!({"scope": "read  write"}), None).scopes,
            vec!["read", "write"]
        );
        assert_eq!(
            from(json!({"scp": ["read", "write"]}), None).scopes,
            vec!["read", "write"]
        );
        assert!(from(json!({}), None).scopes.is_empty());
    }

    #[test]
    fn test_audience_list_takes_first_non_empty() {
        let token = from(json!({"aud": ["", "https://api"]}), None);
        assert_eq!(token.resource.as_deref(), Some("https://api"));
        assert_eq!(token.resource_indicator.as_deref(), Some("https://api"));
    }

    #[test]
    fn test_resource_preferred_over_aud() {
        let token = from(json!({"resource": "https://r", "aud": "https://a"}), None);
        assert_eq!(token.resource.as_deref(), Some("https://r"));
    }

    #[test]
    fn test_resource_hint_wins() {
        let token = from(json!({"aud": "https://a"}), Some("https://hint"));
        assert_eq!(token.resource.as_deref(), Some("https://hint"));
    }

    #[test]
    fn test_identity_claims() {
        let token = from(
            json!({"subject": "s", "preferred_username": "user", "iss": "https://as", "exp": 1.7e9}),
            None,
        );
        assert_eq!(token.subject.as_deref(), Some("s"));
        assert_eq!(token.email.as_deref(), Some("user"));
        assert_eq!(token.issuer.as_deref(), Some("https://as"));
        assert_eq!(token.expires_at, Some(1_700_000_000));
        assert_eq!(token.claims["iss"], "https://as");
    }

    #[test]
    fn test_is_expired_with_leeway() {
        let mut token = from(json!({}), None);
        assert!(!token.is_expired(0));

        token.expires_at = Some(Utc::now().timestamp() + 20);
        assert!(!token.is_expired(0));
        assert!(token.is_expired(30));
    }

    #[test]
    fn test_is_expired_at_extreme_exp() {
        let mut token = from(json!({ "exp": i64::MIN }), None);
        assert_eq!(token.expires_at, Some(i64::MIN));
        assert!(token.is_expired(30));

        token.expires_at = Some(i64::MAX);
        assert!(!token.is_expired(30));
    }

    #[test]
    fn test_has_scopes() {
        let token = from(json!({"scope": "a b"}), None);
        assert!(token.has_scopes(&["a"]));
        assert!(token.has_scopes::<&str>(&[]));
        assert!(!token.has_scopes(&["a", "c"]));
    }
}

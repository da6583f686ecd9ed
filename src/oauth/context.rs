//! Per-request context threaded through token acquisition
//!
//! Identity and session information is passed explicitly with every call
//! instead of living in task-local state. The composing server builds one
//! [`OAuthRequestContext`] per inbound request and hands it to the
//! [`TokenManager`](super::manager::TokenManager).

use std::fmt;
use std::sync::Arc;

use crate::oauth::flow::AuthorizationRequester;
use crate::oauth::identity::OAuthUserIdentity;

/// Caller context for one token request.
///
/// # Examples
///
/// ```
/// use mcp_oauth_broker::oauth::context::OAuthRequestContext;
/// use mcp_oauth_broker::oauth::identity::OAuthUserIdentity;
///
/// let ctx = OAuthRequestContext::new()
///     .with_user(OAuthUserIdentity::new("github", "42"))
///     .with_session_id("session-1");
///
/// assert_eq!(ctx.resolve_identity().unwrap().subject, "42");
/// ```
#[derive(Clone)]
pub struct OAuthRequestContext {
    /// Explicitly authenticated user for this call
    pub current_user: Option<OAuthUserIdentity>,

    /// Identity bound by an enclosing scope (e.g. a workflow run on behalf of
    /// a user), consulted when `current_user` is absent
    pub scoped_identity: Option<OAuthUserIdentity>,

    /// Upstream session identifier
    pub session_id: Option<String>,

    /// Identity derived from the upstream session
    pub session_identity: Option<OAuthUserIdentity>,

    /// Workflow on whose behalf the token is requested
    pub workflow_name: Option<String>,

    /// Channel used to ask the user to authorize; `None` when there is no
    /// upstream session
    pub requester: Option<Arc<dyn AuthorizationRequester>>,

    /// When `false`, a missing token fails instead of starting a flow
    pub allow_interactive: bool,
}

impl Default for OAuthRequestContext {
    fn default() -> Self {
        Self {
            current_user: None,
            scoped_identity: None,
            session_id: None,
            session_identity: None,
            workflow_name: None,
            requester: None,
            allow_interactive: true,
        }
    }
}

impl fmt::Debug for OAuthRequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthRequestContext")
            .field("current_user", &self.current_user)
            .field("scoped_identity", &self.scoped_identity)
            .field("session_id", &self.session_id)
            .field("session_identity", &self.session_identity)
            .field("workflow_name", &self.workflow_name)
            .field("has_requester", &self.requester.is_some())
            .field("allow_interactive", &self.allow_interactive)
            .finish()
    }
}

impl OAuthRequestContext {
    /// Creates an empty, interactive context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the explicitly authenticated user.
    pub fn with_user(mut self, user: OAuthUserIdentity) -> Self {
        self.current_user = Some(user);
        self
    }

    /// Sets the identity bound by an enclosing scope.
    pub fn with_scoped_identity(mut self, identity: OAuthUserIdentity) -> Self {
        self.scoped_identity = Some(identity);
        self
    }

    /// Sets the upstream session id.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Sets the identity derived from the upstream session.
    pub fn with_session_identity(mut self, identity: OAuthUserIdentity) -> Self {
        self.session_identity = Some(identity);
        self
    }

    /// Sets the workflow name recorded on stored tokens.
    pub fn with_workflow_name(mut self, workflow_name: impl Into<String>) -> Self {
        self.workflow_name = Some(workflow_name.into());
        self
    }

    /// Sets the upstream authorization channel.
    pub fn with_requester(mut self, requester: Arc<dyn AuthorizationRequester>) -> Self {
        self.requester = Some(requester);
        self
    }

    /// Forbids starting interactive authorization flows.
    pub fn non_interactive(mut self) -> Self {
        self.allow_interactive = false;
        self
    }

    /// Resolves the end-user identity in precedence order: explicit user,
    /// scoped identity, then session identity.
    ///
    /// The preconfigured-token fallback depends on server configuration and
    /// is applied by the token manager.
    pub fn resolve_identity(&self) -> Option<&OAuthUserIdentity> {
        self.current_user
            .as_ref()
            .or(self.scoped_identity.as_ref())
            .or(self.session_identity.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_user_wins() {
        let ctx = OAuthRequestContext::new()
            .with_user(OAuthUserIdentity::new("a", "explicit"))
            .with_scoped_identity(OAuthUserIdentity::new("a", "scoped"))
            .with_session_identity(OAuthUserIdentity::new("a", "session"));
        assert_eq!(ctx.resolve_identity().unwrap().subject, "explicit");
    }

    #[test]
    fn test_scoped_identity_before_session_identity() {
        let ctx = OAuthRequestContext::new()
            .with_scoped_identity(OAuthUserIdentity::new("a", "scoped"))
            .with_session_identity(OAuthUserIdentity::new("a", "session"));
        assert_eq!(ctx.resolve_identity().unwrap().subject, "scoped");
    }

    #[test]
    fn test_session_identity_last() {
        let ctx =
            OAuthRequestContext::new().with_session_identity(OAuthUserIdentity::new("a", "session"));
        assert_eq!(ctx.resolve_identity().unwrap().subject, "session");
    }

    #[test]
    fn test_empty_context_has_no_identity() {
        let ctx = OAuthRequestContext::new();
        assert!(ctx.resolve_identity().is_none());
        assert!(ctx.allow_interactive);
        assert!(!ctx.non_interactive().allow_interactive);
    }
}

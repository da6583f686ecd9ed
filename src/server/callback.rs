//! Internal HTTP endpoint that receives OAuth redirects
//!
//! Routes:
//!
//! - `GET|POST /internal/oauth/callback/:flow_id`
//! - `GET /internal/oauth/callback` (matched by `state`)
//!
//! Parameters come from the query string, or from a form body on `POST`.
//! A delivered callback answers 200 with a short HTML page; a callback with
//! no pending flow answers 404, so duplicate or late redirects are harmless.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Router};

use crate::oauth::callbacks::{CallbackPayload, OAuthCallbackRegistry, CALLBACK_COMPLETE_HTML};

/// Path prefix of the callback routes.
pub const CALLBACK_PATH: &str = "/internal/oauth/callback";

/// Builds the callback router delivering into `registry`.
pub fn router(registry: Arc<OAuthCallbackRegistry>) -> Router {
    Router::new()
        .route(
            "/internal/oauth/callback/:flow_id",
            get(callback_by_flow).post(callback_by_flow_form),
        )
        .route(CALLBACK_PATH, get(callback_by_state))
        .with_state(registry)
}

async fn callback_by_flow(
    State(registry): State<Arc<OAuthCallbackRegistry>>,
    Path(flow_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    deliver(&registry, Some(&flow_id), params)
}

async fn callback_by_flow_form(
    State(registry): State<Arc<OAuthCallbackRegistry>>,
    Path(flow_id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let mut params = query;
    params.extend(form);
    deliver(&registry, Some(&flow_id), params)
}

async fn callback_by_state(
    State(registry): State<Arc<OAuthCallbackRegistry>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    deliver(&registry, None, params)
}

fn deliver(
    registry: &OAuthCallbackRegistry,
    flow_id: Option<&str>,
    payload: CallbackPayload,
) -> Response {
    let state = payload.get("state").cloned();

    let mut delivered = match flow_id {
        Some(id) => registry.deliver(id, payload.clone()),
        None => false,
    };
    if !delivered {
        if let Some(state) = state.as_deref() {
            delivered = registry.deliver_by_state(state, payload);
        }
    }

    if delivered {
        tracing::info!(flow_id = flow_id.unwrap_or(""), "OAuth callback delivered");
        Html(CALLBACK_COMPLETE_HTML).into_response()
    } else {
        tracing::debug!(flow_id = flow_id.unwrap_or(""), "OAuth callback had no pending flow");
        (StatusCode::NOT_FOUND, "No pending authorization flow").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_get_by_flow_id_delivers() {
        let registry = Arc::new(OAuthCallbackRegistry::new());
        let handle = registry.create_handle("f1");
        let app = router(Arc::clone(&registry));

        let resp = app
            .oneshot(
                Request::get("/internal/oauth/callback/f1?code=abc&state=s1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let payload = handle.await.unwrap();
        assert_eq!(payload["code"], "abc");
        assert_eq!(payload["state"], "s1");
    }

    #[tokio::test]
    async fn test_post_form_delivers() {
        let registry = Arc::new(OAuthCallbackRegistry::new());
        let handle = registry.create_handle("f1");
        let app = router(Arc::clone(&registry));

        let resp = app
            .oneshot(
                Request::post("/internal/oauth/callback/f1")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("code=xyz&state=s1"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(handle.await.unwrap()["code"], "xyz");
    }

    #[tokio::test]
    async fn test_pathless_route_matches_state() {
        let registry = Arc::new(OAuthCallbackRegistry::new());
        let handle = registry.create_handle("f1");
        registry.register_state("f1", "s1");
        let app = router(Arc::clone(&registry));

        let resp = app
            .oneshot(
                Request::get("/internal/oauth/callback?code=c&state=s1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(handle.await.unwrap()["code"], "c");
    }

    #[tokio::test]
    async fn test_unknown_flow_is_not_found() {
        let registry = Arc::new(OAuthCallbackRegistry::new());
        let app = router(registry);

        let resp = app
            .oneshot(
                Request::get("/internal/oauth/callback/missing?code=c&state=s")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

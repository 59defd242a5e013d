// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Pass-through forwarding to the CouchDB backend.
//!
//! Every request that matches no other route lands here. After the device
//! credential is accepted, the request goes to the backend with the same
//! method, path, query, and body. Header policy:
//!
//! - `Host`, `Authorization`, and `Transfer-Encoding` are dropped on the way in
//! - the backend's own Basic credentials are attached
//! - everything else, CORS headers included, passes untouched both ways
//!
//! `OPTIONS` is forwarded without a credential check so that browser
//! preflights reach the backend's own CORS handling.

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, HOST, TRANSFER_ENCODING},
        HeaderMap, Method,
    },
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::auth::authenticate_device;
use crate::error::ApiError;
use crate::state::AppState;

/// Strip the headers the gateway owns from an inbound request.
fn outbound_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    headers.remove(HOST);
    headers.remove(AUTHORIZATION);
    headers.remove(TRANSFER_ENCODING);
    headers
}

/// Fallback handler: authenticate, then relay to the backend.
pub async fn forward(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    if parts.method != Method::OPTIONS {
        if let Err(rejection) = authenticate_device(&state, &parts.headers) {
            return rejection.into_response();
        }
    }

    let body = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "Failed to read request body");
            return ApiError::bad_request("Failed to read request body").into_response();
        }
    };

    let backend = &state.config.backend;
    let target = backend.target_url(parts.uri.path(), parts.uri.query());

    let upstream = state
        .upstream
        .request(parts.method.clone(), &target)
        .headers(outbound_headers(&parts.headers))
        .basic_auth(&backend.user, Some(&backend.password))
        .body(body)
        .send()
        .await;

    let upstream = match upstream {
        Ok(response) => response,
        Err(e) => return upstream_failure(&parts.method, parts.uri.path(), e),
    };

    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    headers.remove(TRANSFER_ENCODING);

    let bytes = match upstream.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => return upstream_failure(&parts.method, parts.uri.path(), e),
    };

    debug!(
        method = %parts.method,
        path = %parts.uri.path(),
        status = status.as_u16(),
        bytes = bytes.len(),
        "Relayed backend response"
    );

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn upstream_failure(method: &Method, path: &str, err: reqwest::Error) -> Response {
    if err.is_timeout() {
        warn!(%method, path, error = %err, "Backend request timed out");
        ApiError::gateway_timeout(format!("Backend timeout: {err}")).into_response()
    } else {
        warn!(%method, path, error = %err, "Backend request failed");
        ApiError::bad_gateway(format!("Backend unavailable: {err}")).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        router,
        testing::{send, spawn_backend},
    };
    use crate::state::test_state_with;
    use axum::http::{HeaderValue, Request, StatusCode};
    use base64ct::{Base64, Encoding};
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn backend_basic() -> String {
        format!("Basic {}", Base64::encode_string(b"admin:couch-pass"))
    }

    #[test]
    fn outbound_headers_drop_gateway_owned_entries() {
        let mut inbound = HeaderMap::new();
        inbound.insert(HOST, HeaderValue::from_static("gateway.example.org"));
        inbound.insert(AUTHORIZATION, HeaderValue::from_static("Bearer device"));
        inbound.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        inbound.insert("x-custom", HeaderValue::from_static("kept"));
        inbound.append("accept", HeaderValue::from_static("application/json"));
        inbound.append("accept", HeaderValue::from_static("text/plain"));

        let outbound = outbound_headers(&inbound);
        assert!(outbound.get(HOST).is_none());
        assert!(outbound.get(AUTHORIZATION).is_none());
        assert!(outbound.get(TRANSFER_ENCODING).is_none());
        assert_eq!(outbound.get("x-custom").unwrap(), "kept");
        assert_eq!(outbound.get_all("accept").iter().count(), 2);
    }

    #[tokio::test]
    async fn authenticated_methods_reach_backend_verbatim() {
        let backend = spawn_backend().await;
        let temp_dir = TempDir::new().unwrap();
        let state = test_state_with(&temp_dir, &[("COUCHDB_URL", backend.url.as_str())]);
        let token = state.tokens.create("Laptop", None, None).unwrap();
        let credential = state.signer.mint(&token).unwrap();
        let app = router(state);

        for method in ["GET", "POST", "PUT", "DELETE"] {
            let request = Request::builder()
                .method(method)
                .uri("/vault/doc%3A1?rev=2-abc&conflicts=true")
                .header("Authorization", format!("Bearer {credential}"))
                .header("Content-Type", "application/json")
                .header("X-Custom", "kept")
                .body(Body::from(r#"{"_id":"doc:1"}"#))
                .unwrap();
            let (status, headers, echo) = send(&app, request).await;

            assert_eq!(status, StatusCode::OK, "{method}");
            assert_eq!(echo["method"], method);
            assert_eq!(echo["path"], "/vault/doc%3A1");
            assert_eq!(echo["query"], "rev=2-abc&conflicts=true");
            assert_eq!(echo["body"], r#"{"_id":"doc:1"}"#);
            assert_eq!(echo["headers"]["x-custom"], "kept");
            assert_eq!(echo["headers"]["content-type"], "application/json");
            assert_eq!(echo["headers"]["authorization"], backend_basic());
            assert!(echo["headers"]["transfer-encoding"].is_null());
            assert_eq!(headers.get("access-control-allow-origin").unwrap(), "app://obsidian.md");
        }
        assert_eq!(backend.hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn basic_auth_with_credential_as_password_is_accepted() {
        let backend = spawn_backend().await;
        let temp_dir = TempDir::new().unwrap();
        let state = test_state_with(&temp_dir, &[("COUCHDB_URL", backend.url.as_str())]);
        let token = state.tokens.create("iPad", None, None).unwrap();
        let credential = state.signer.mint(&token).unwrap();
        let app = router(state);

        let basic = Base64::encode_string(format!("obsidian:{credential}").as_bytes());
        let request = Request::builder()
            .uri("/")
            .header("Authorization", format!("Basic {basic}"))
            .body(Body::empty())
            .unwrap();
        let (status, _, echo) = send(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(echo["headers"]["authorization"], backend_basic());
    }

    #[tokio::test]
    async fn rejected_credentials_never_reach_backend() {
        let backend = spawn_backend().await;
        let temp_dir = TempDir::new().unwrap();
        let state = test_state_with(&temp_dir, &[("COUCHDB_URL", backend.url.as_str())]);
        let token = state.tokens.create("Old phone", None, None).unwrap();
        let credential = state.signer.mint(&token).unwrap();
        state.tokens.revoke(&token.token_id).unwrap();
        let app = router(state);

        let request = Request::builder().uri("/_all_dbs").body(Body::empty()).unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "invalid_auth_header");

        let request = Request::builder()
            .uri("/_all_dbs")
            .header("Authorization", format!("Bearer {credential}"))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Token revoked or expired");

        assert_eq!(backend.hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn preflight_skips_credential_check() {
        let backend = spawn_backend().await;
        let temp_dir = TempDir::new().unwrap();
        let app = router(test_state_with(&temp_dir, &[("COUCHDB_URL", backend.url.as_str())]));

        let request = Request::builder()
            .method("OPTIONS")
            .uri("/vault/_changes")
            .header("Origin", "app://obsidian.md")
            .header("Access-Control-Request-Method", "POST")
            .body(Body::empty())
            .unwrap();
        let (status, headers, echo) = send(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(echo["method"], "OPTIONS");
        assert_eq!(echo["headers"]["origin"], "app://obsidian.md");
        assert_eq!(echo["headers"]["authorization"], backend_basic());
        assert_eq!(headers.get("access-control-allow-origin").unwrap(), "app://obsidian.md");
    }

    #[tokio::test]
    async fn dot_segments_are_resolved_before_forwarding() {
        let backend = spawn_backend().await;
        let temp_dir = TempDir::new().unwrap();
        let app = router(test_state_with(&temp_dir, &[("COUCHDB_URL", backend.url.as_str())]));

        let request = Request::builder()
            .method("OPTIONS")
            .uri("/db/a/../b/%2e%2e/c?x=1")
            .body(Body::empty())
            .unwrap();
        let (status, _, echo) = send(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(echo["path"], "/db/c");
        assert_eq!(echo["query"], "x=1");
    }

    #[tokio::test]
    async fn backend_redirects_are_relayed_not_followed() {
        let backend = spawn_backend().await;
        let temp_dir = TempDir::new().unwrap();
        let state = test_state_with(&temp_dir, &[("COUCHDB_URL", backend.url.as_str())]);
        let token = state.tokens.create("Laptop", None, None).unwrap();
        let credential = state.signer.mint(&token).unwrap();
        let app = router(state);

        let request = Request::builder()
            .uri("/redirect")
            .header("Authorization", format!("Bearer {credential}"))
            .body(Body::empty())
            .unwrap();
        let response = tower::ServiceExt::oneshot(app, request).await.unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get("location").unwrap(), "/elsewhere");
        assert_eq!(backend.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unreachable_backend_is_bad_gateway() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let temp_dir = TempDir::new().unwrap();
        let app = router(test_state_with(&temp_dir, &[("COUCHDB_URL", url.as_str())]));

        let request = Request::builder().method("OPTIONS").uri("/").body(Body::empty()).unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().starts_with("Backend unavailable"));
    }

    #[tokio::test]
    async fn slow_backend_is_gateway_timeout() {
        let backend = spawn_backend().await;
        let temp_dir = TempDir::new().unwrap();
        let app = router(test_state_with(
            &temp_dir,
            &[
                ("COUCHDB_URL", backend.url.as_str()),
                ("UPSTREAM_TIMEOUT_SECS", "1"),
            ],
        ));

        let request = Request::builder().method("OPTIONS").uri("/slow").body(Body::empty()).unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert!(body["error"].as_str().unwrap().starts_with("Backend timeout"));
    }
}

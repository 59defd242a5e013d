// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::{setup::SetupBundle, state::AppState, storage::DeviceToken};

pub mod admin;
pub mod health;
pub mod proxy;

pub fn router(state: AppState) -> Router {
    let token_routes = Router::new()
        .route("/create", post(admin::create_token))
        .route("/list", get(admin::list_tokens))
        .route("/revoke/{token_id}", post(admin::revoke_token))
        .route("/delete/{token_id}", delete(admin::delete_token))
        .route("/info/{token_id}", get(admin::token_info))
        .route("/cleanup", post(admin::cleanup_tokens))
        .route("/setup", post(admin::create_setup_bundle));

    Router::new()
        .route("/health", get(health::health))
        .route("/admin/openapi.json", get(admin::openapi))
        .nest("/admin/tokens", token_routes)
        .fallback(proxy::forward)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(OpenApi)]
#[openapi(
    info(title = "livesync-gate admin API"),
    paths(
        health::health,
        admin::create_token,
        admin::list_tokens,
        admin::revoke_token,
        admin::delete_token,
        admin::token_info,
        admin::cleanup_tokens,
        admin::create_setup_bundle
    ),
    components(
        schemas(
            DeviceToken,
            SetupBundle,
            admin::CreateTokenResponse,
            admin::TokenListResponse,
            admin::MessageResponse,
            admin::RevokeResponse,
            admin::CleanupResponse,
            admin::SetupRequest,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Health", description = "Liveness"),
        (name = "Tokens", description = "Device token management (operator only)")
    )
)]
struct ApiDoc;

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Operator endpoints for device token management.
//!
//! Every handler takes [`AdminOnly`], so nothing here runs without the
//! operator secret. These endpoints provide:
//! - Token issue, listing, and inspection
//! - Revocation and permanent deletion
//! - Expired-token cleanup
//! - Setup bundle issue for new devices

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::{
    auth::AdminOnly,
    error::ApiError,
    setup::{issue_setup_bundle, SetupBundle, SetupError, SetupOptions},
    state::AppState,
    storage::DeviceToken,
};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for token creation.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CreateTokenParams {
    /// Device label (required, non-empty).
    pub device_name: Option<String>,
    /// Lifetime in days; omit or pass 0 for a non-expiring token.
    pub expires_in_days: Option<u32>,
    /// Free-form metadata stored with the token.
    pub metadata: Option<String>,
}

/// A newly issued token together with its signed credential.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateTokenResponse {
    #[serde(flatten)]
    pub token: DeviceToken,
    /// Signed device credential.
    pub jwt_token: String,
    /// Ready-to-use header line.
    pub usage: String,
}

/// Query parameters for token listing.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListTokensParams {
    /// Include revoked tokens (default false).
    #[serde(default)]
    pub include_revoked: bool,
}

/// Response for token listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenListResponse {
    /// Tokens, newest first.
    pub tokens: Vec<DeviceToken>,
    /// Number of tokens returned.
    pub count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// Result of a revoke call.
#[derive(Debug, Serialize, ToSchema)]
pub struct RevokeResponse {
    pub message: String,
    /// False when the token was already revoked.
    pub changed: bool,
}

/// Result of an expired-token sweep.
#[derive(Debug, Serialize, ToSchema)]
pub struct CleanupResponse {
    pub message: String,
    /// Number of tokens removed.
    pub deleted: usize,
}

/// Request body for setup bundle issue.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SetupRequest {
    /// Device label; also written as `deviceAndVaultName`.
    pub device_name: String,
    /// Vault encryption passphrase; generated when absent.
    pub e2ee_passphrase: Option<String>,
    /// Passphrase that opens the setup URI; generated when absent.
    pub uri_passphrase: Option<String>,
    /// Token lifetime in days; omit for a non-expiring token.
    pub expires_in_days: Option<u32>,
    /// Enable vault encryption (default true).
    #[serde(default = "default_true")]
    pub encryption: bool,
    /// Obfuscate paths when encryption is on (default true).
    #[serde(default = "default_true")]
    pub path_obfuscation: bool,
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Handlers
// ============================================================================

/// Issue a device token and its credential.
#[utoipa::path(
    post,
    path = "/admin/tokens/create",
    tag = "Tokens",
    params(CreateTokenParams),
    responses(
        (status = 200, description = "Token issued", body = CreateTokenResponse),
        (status = 400, description = "Missing device name or invalid expiry"),
        (status = 401, description = "Missing or malformed operator credential"),
        (status = 403, description = "Wrong operator secret or admin API disabled")
    )
)]
pub async fn create_token(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Query(params): Query<CreateTokenParams>,
) -> Result<Json<CreateTokenResponse>, ApiError> {
    let device_name = params
        .device_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::bad_request("device_name is required"))?;

    let token = state
        .tokens
        .create(device_name, params.expires_in_days, params.metadata)?;
    let jwt_token = state.signer.mint(&token).map_err(|e| {
        tracing::error!(error = %e, "Failed to sign device credential");
        ApiError::internal("Failed to sign credential")
    })?;

    info!(
        token_id = %token.token_id,
        device_name = %token.device_name,
        expires_at = ?token.expires_at,
        "Created device token"
    );

    Ok(Json(CreateTokenResponse {
        usage: format!("Authorization: Bearer {jwt_token}"),
        jwt_token,
        token,
    }))
}

/// List device tokens, newest first.
#[utoipa::path(
    get,
    path = "/admin/tokens/list",
    tag = "Tokens",
    params(ListTokensParams),
    responses(
        (status = 200, description = "Token list", body = TokenListResponse)
    )
)]
pub async fn list_tokens(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Query(params): Query<ListTokensParams>,
) -> Result<Json<TokenListResponse>, ApiError> {
    let tokens = state.tokens.list(params.include_revoked)?;
    Ok(Json(TokenListResponse {
        count: tokens.len(),
        tokens,
    }))
}

/// Revoke a device token. Revoking twice is not an error.
#[utoipa::path(
    post,
    path = "/admin/tokens/revoke/{token_id}",
    tag = "Tokens",
    params(("token_id" = String, Path, description = "Token identifier")),
    responses(
        (status = 200, description = "Token revoked (or already revoked)", body = RevokeResponse),
        (status = 404, description = "Unknown token")
    )
)]
pub async fn revoke_token(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(token_id): Path<String>,
) -> Result<Json<RevokeResponse>, ApiError> {
    if state.tokens.revoke(&token_id)? {
        info!(token_id = %token_id, "Revoked device token");
        return Ok(Json(RevokeResponse {
            message: format!("Token {token_id} revoked successfully"),
            changed: true,
        }));
    }

    match state.tokens.get(&token_id)? {
        Some(_) => Ok(Json(RevokeResponse {
            message: format!("Token {token_id} was already revoked"),
            changed: false,
        })),
        None => Err(ApiError::not_found("Token not found")),
    }
}

/// Permanently delete a device token.
#[utoipa::path(
    delete,
    path = "/admin/tokens/delete/{token_id}",
    tag = "Tokens",
    params(("token_id" = String, Path, description = "Token identifier")),
    responses(
        (status = 200, description = "Token deleted", body = MessageResponse),
        (status = 404, description = "Unknown token")
    )
)]
pub async fn delete_token(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(token_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state.tokens.delete(&token_id)? {
        return Err(ApiError::not_found("Token not found"));
    }

    info!(token_id = %token_id, "Deleted device token");
    Ok(Json(MessageResponse {
        message: format!("Token {token_id} deleted permanently"),
    }))
}

/// Fetch a single token record.
#[utoipa::path(
    get,
    path = "/admin/tokens/info/{token_id}",
    tag = "Tokens",
    params(("token_id" = String, Path, description = "Token identifier")),
    responses(
        (status = 200, description = "Token record", body = DeviceToken),
        (status = 404, description = "Unknown token")
    )
)]
pub async fn token_info(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Path(token_id): Path<String>,
) -> Result<Json<DeviceToken>, ApiError> {
    state
        .tokens
        .get(&token_id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Token not found"))
}

/// Delete every expired token.
#[utoipa::path(
    post,
    path = "/admin/tokens/cleanup",
    tag = "Tokens",
    responses(
        (status = 200, description = "Expired tokens removed", body = CleanupResponse)
    )
)]
pub async fn cleanup_tokens(
    _admin: AdminOnly,
    State(state): State<AppState>,
) -> Result<Json<CleanupResponse>, ApiError> {
    let deleted = state.tokens.cleanup_expired()?;
    info!(deleted, "Cleaned up expired tokens");
    Ok(Json(CleanupResponse {
        message: format!("Deleted {deleted} expired tokens"),
        deleted,
    }))
}

/// Issue a token and seal it into a LiveSync setup URI.
///
/// The response is the only place the passphrases ever appear.
#[utoipa::path(
    post,
    path = "/admin/tokens/setup",
    tag = "Tokens",
    request_body = SetupRequest,
    responses(
        (status = 200, description = "Setup bundle issued", body = SetupBundle),
        (status = 400, description = "Missing device name or invalid expiry")
    )
)]
pub async fn create_setup_bundle(
    _admin: AdminOnly,
    State(state): State<AppState>,
    Json(request): Json<SetupRequest>,
) -> Result<Json<SetupBundle>, ApiError> {
    let options = SetupOptions {
        device_name: request.device_name,
        transport_passphrase: request.uri_passphrase,
        content_passphrase: request.e2ee_passphrase,
        expires_in_days: request.expires_in_days,
        encryption: request.encryption,
        path_obfuscation: request.path_obfuscation,
    };

    let bundle = issue_setup_bundle(&state.tokens, &state.signer, &state.config.setup, options)
        .map_err(|e| match e {
            SetupError::EmptyDeviceName => ApiError::bad_request("device_name is required"),
            SetupError::Store(store) => ApiError::from(store),
            other => {
                tracing::error!(error = %other, "Failed to issue setup bundle");
                ApiError::internal("Failed to issue setup bundle")
            }
        })?;

    Ok(Json(bundle))
}

/// OpenAPI document for the admin surface.
pub async fn openapi(_admin: AdminOnly) -> Json<utoipa::openapi::OpenApi> {
    Json(super::ApiDoc::openapi())
}

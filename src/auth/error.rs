// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! Device credential failures all render as 401. The response body never says
//! whether a token was revoked, expired, or unknown, and malformed headers
//! share one generic message; the precise reason only reaches the logs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Why a device credential was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// Header absent, unknown scheme, bad base64, or no `user:password` separator.
    /// The payload is an internal reason and is never sent to the client.
    MalformedAuth(&'static str),
    /// Token is not a JWT at all
    MalformedToken,
    /// Signature does not verify, or the token is unsigned / uses another algorithm
    InvalidSignature,
    /// The signed `exp` claim is in the past
    ExpiredSignature,
    /// Signed payload lacks a `token_id`
    MissingClaim,
    /// The store no longer honors this token (revoked, expired, or unknown)
    RevokedOrExpired,
    /// The token store could not be read
    StoreUnavailable(String),
}

/// Why an operator request to the admin API was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminAuthError {
    /// No authorization header present
    MissingAuthHeader,
    /// Header is not `Bearer <secret>`
    InvalidAuthHeader,
    /// Secret does not match
    InvalidAdminToken,
    /// No operator secret is configured
    AdminDisabled,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl CredentialError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            CredentialError::MalformedAuth(_) => "invalid_auth_header",
            CredentialError::MalformedToken => "malformed_token",
            CredentialError::InvalidSignature => "invalid_signature",
            CredentialError::ExpiredSignature => "token_expired",
            CredentialError::MissingClaim => "missing_claim",
            CredentialError::RevokedOrExpired => "token_rejected",
            CredentialError::StoreUnavailable(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CredentialError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl std::fmt::Display for CredentialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialError::MalformedAuth(_) => write!(
                f,
                "Invalid authorization header (expected 'Bearer <token>' or 'Basic <user:token>')"
            ),
            CredentialError::MalformedToken => write!(f, "Token is malformed"),
            CredentialError::InvalidSignature => write!(f, "Token signature is invalid"),
            CredentialError::ExpiredSignature => write!(f, "Token has expired"),
            CredentialError::MissingClaim => write!(f, "Invalid token: missing token_id"),
            CredentialError::RevokedOrExpired => write!(f, "Token revoked or expired"),
            CredentialError::StoreUnavailable(_) => {
                write!(f, "Authentication is temporarily unavailable")
            }
        }
    }
}

impl std::error::Error for CredentialError {}

impl IntoResponse for CredentialError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}

impl AdminAuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AdminAuthError::MissingAuthHeader => "missing_auth_header",
            AdminAuthError::InvalidAuthHeader => "invalid_auth_header",
            AdminAuthError::InvalidAdminToken => "invalid_admin_token",
            AdminAuthError::AdminDisabled => "admin_disabled",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AdminAuthError::MissingAuthHeader | AdminAuthError::InvalidAuthHeader => {
                StatusCode::UNAUTHORIZED
            }
            AdminAuthError::InvalidAdminToken | AdminAuthError::AdminDisabled => {
                StatusCode::FORBIDDEN
            }
        }
    }
}

impl std::fmt::Display for AdminAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdminAuthError::MissingAuthHeader => write!(f, "Missing authorization header"),
            AdminAuthError::InvalidAuthHeader => write!(f, "Invalid authorization format"),
            AdminAuthError::InvalidAdminToken => write!(f, "Invalid admin token"),
            AdminAuthError::AdminDisabled => write!(f, "Admin API is disabled"),
        }
    }
}

impl std::error::Error for AdminAuthError {}

impl IntoResponse for AdminAuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Credential extraction for device traffic and operator calls.
//!
//! Device requests are checked by [`authenticate_device`], which the proxy
//! calls directly so that preflight `OPTIONS` can skip it. Admin handlers use
//! the [`AdminOnly`] extractor:
//!
//! ```rust,ignore
//! async fn list_tokens(_admin: AdminOnly, State(state): State<AppState>) -> impl IntoResponse {
//!     // only reached with a valid operator secret
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use base64ct::{Base64, Encoding};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::{AdminAuthError, CredentialClaims, CredentialError, CredentialSigner};
use crate::state::AppState;
use crate::storage::TokenStore;

/// A credential as presented in the `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentedCredential {
    /// `Bearer <credential>`
    Bearer(String),
    /// `Basic base64(<username>:<credential>)`; the username is informational only
    Basic { username: String, credential: String },
}

impl PresentedCredential {
    /// Parse an `Authorization` header value. Scheme names are case-insensitive.
    pub fn parse(header: Option<&str>) -> Result<Self, CredentialError> {
        let header = header.ok_or(CredentialError::MalformedAuth("missing header"))?;
        let (scheme, rest) = header
            .trim()
            .split_once(' ')
            .ok_or(CredentialError::MalformedAuth("missing scheme"))?;
        let rest = rest.trim();

        if scheme.eq_ignore_ascii_case("bearer") {
            if rest.is_empty() {
                return Err(CredentialError::MalformedAuth("empty bearer token"));
            }
            return Ok(PresentedCredential::Bearer(rest.to_string()));
        }

        if scheme.eq_ignore_ascii_case("basic") {
            let decoded = Base64::decode_vec(rest)
                .map_err(|_| CredentialError::MalformedAuth("invalid base64"))?;
            let decoded = String::from_utf8(decoded)
                .map_err(|_| CredentialError::MalformedAuth("credentials are not UTF-8"))?;
            let (username, credential) = decoded
                .split_once(':')
                .ok_or(CredentialError::MalformedAuth("missing ':' separator"))?;
            if credential.is_empty() {
                return Err(CredentialError::MalformedAuth("empty password"));
            }
            return Ok(PresentedCredential::Basic {
                username: username.to_string(),
                credential: credential.to_string(),
            });
        }

        Err(CredentialError::MalformedAuth("unsupported scheme"))
    }

    /// The signed credential, regardless of scheme.
    pub fn credential(&self) -> &str {
        match self {
            PresentedCredential::Bearer(credential) => credential,
            PresentedCredential::Basic { credential, .. } => credential,
        }
    }
}

/// Full device check: header shape, signature, claims, then the token store.
///
/// The store is consulted on every call so revocation takes effect at once.
pub fn verify_authorization(
    header: Option<&str>,
    signer: &CredentialSigner,
    tokens: &TokenStore,
) -> Result<CredentialClaims, CredentialError> {
    let presented = PresentedCredential::parse(header)?;
    let claims = signer.verify(presented.credential())?;

    let valid = tokens
        .is_valid(&claims.token_id)
        .map_err(|e| CredentialError::StoreUnavailable(e.to_string()))?;
    if !valid {
        return Err(CredentialError::RevokedOrExpired);
    }

    Ok(claims)
}

/// Authenticate a device request and record its use.
///
/// The `last_used_at` update runs on the blocking pool and is not awaited;
/// a failed update is logged and never fails the request.
pub fn authenticate_device(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<CredentialClaims, CredentialError> {
    let header = match headers.get(AUTHORIZATION) {
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| CredentialError::MalformedAuth("non-ASCII header"))?,
        ),
        None => None,
    };

    let claims = match verify_authorization(header, &state.signer, &state.tokens) {
        Ok(claims) => claims,
        Err(e) => {
            match &e {
                CredentialError::StoreUnavailable(reason) => {
                    warn!(error = %reason, "Token store unavailable during authentication")
                }
                CredentialError::MalformedAuth(reason) => {
                    debug!(reason = *reason, "Rejected malformed authorization header")
                }
                other => debug!(error_code = other.error_code(), "Rejected device credential"),
            }
            return Err(e);
        }
    };

    let tokens = state.tokens.clone();
    let token_id = claims.token_id.clone();
    tokio::task::spawn_blocking(move || {
        if let Err(e) = tokens.touch(&token_id) {
            warn!(token_id = %token_id, error = %e, "Failed to record token use");
        }
    });

    Ok(claims)
}

/// Compare an `Authorization` header against the operator secret.
///
/// Both sides are hashed first so the comparison runs over equal-length
/// digests and takes the same time wherever they differ.
pub fn verify_operator(header: Option<&str>, expected: Option<&str>) -> Result<(), AdminAuthError> {
    let expected = expected.ok_or(AdminAuthError::AdminDisabled)?;
    let header = header.ok_or(AdminAuthError::MissingAuthHeader)?;

    let (scheme, presented) = header
        .trim()
        .split_once(' ')
        .ok_or(AdminAuthError::InvalidAuthHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AdminAuthError::InvalidAuthHeader);
    }

    let presented = Sha256::digest(presented.trim().as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    let diff = presented
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b));

    if diff == 0 {
        Ok(())
    } else {
        Err(AdminAuthError::InvalidAdminToken)
    }
}

/// Extractor that requires the operator secret.
pub struct AdminOnly;

impl FromRequestParts<AppState> for AdminOnly {
    type Rejection = AdminAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = match parts.headers.get(AUTHORIZATION) {
            Some(value) => Some(value.to_str().map_err(|_| AdminAuthError::InvalidAuthHeader)?),
            None => None,
        };

        match verify_operator(header, state.config.admin_token.as_deref()) {
            Ok(()) => Ok(AdminOnly),
            Err(e) => {
                warn!(
                    error_code = e.error_code(),
                    path = %parts.uri.path(),
                    "Rejected admin request"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_state;
    use axum::http::Request;
    use tempfile::TempDir;

    fn basic(user: &str, password: &str) -> String {
        format!("Basic {}", Base64::encode_string(format!("{user}:{password}").as_bytes()))
    }

    #[test]
    fn parses_bearer_and_basic_case_insensitively() {
        assert_eq!(
            PresentedCredential::parse(Some("bearer abc.def.ghi")).unwrap(),
            PresentedCredential::Bearer("abc.def.ghi".to_string())
        );

        let parsed = PresentedCredential::parse(Some(&basic("obsidian", "abc.def.ghi"))).unwrap();
        assert_eq!(parsed.credential(), "abc.def.ghi");
        assert!(matches!(parsed, PresentedCredential::Basic { ref username, .. } if username == "obsidian"));

        let upper = basic("u", "tok").replacen("Basic", "BASIC", 1);
        assert_eq!(PresentedCredential::parse(Some(&upper)).unwrap().credential(), "tok");
    }

    #[test]
    fn basic_password_may_contain_colons() {
        let parsed = PresentedCredential::parse(Some(&basic("user", "a:b:c"))).unwrap();
        assert_eq!(parsed.credential(), "a:b:c");
    }

    #[test]
    fn malformed_headers_are_rejected() {
        let cases = [
            None,
            Some("Bearer"),
            Some("Bearer   "),
            Some("Digest abc"),
            Some("Basic !!!not-base64!!!"),
        ];
        for case in cases {
            assert!(
                matches!(PresentedCredential::parse(case), Err(CredentialError::MalformedAuth(_))),
                "expected rejection for {case:?}"
            );
        }

        let no_colon = format!("Basic {}", Base64::encode_string(b"nocolon"));
        assert!(PresentedCredential::parse(Some(&no_colon)).is_err());

        let empty_password = basic("user", "");
        assert!(PresentedCredential::parse(Some(&empty_password)).is_err());
    }

    #[test]
    fn verify_checks_the_store() {
        let temp_dir = TempDir::new().unwrap();
        let state = test_state(&temp_dir, None);
        let token = state.tokens.create("laptop", None, None).unwrap();
        let credential = state.signer.mint(&token).unwrap();
        let header = format!("Bearer {credential}");

        let claims = verify_authorization(Some(&header), &state.signer, &state.tokens).unwrap();
        assert_eq!(claims.token_id, token.token_id);

        state.tokens.revoke(&token.token_id).unwrap();
        assert_eq!(
            verify_authorization(Some(&header), &state.signer, &state.tokens),
            Err(CredentialError::RevokedOrExpired)
        );
    }

    #[test]
    fn deleted_token_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let state = test_state(&temp_dir, None);
        let token = state.tokens.create("tablet", None, None).unwrap();
        let credential = state.signer.mint(&token).unwrap();
        state.tokens.delete(&token.token_id).unwrap();

        let header = basic("obsidian", &credential);
        assert_eq!(
            verify_authorization(Some(&header), &state.signer, &state.tokens),
            Err(CredentialError::RevokedOrExpired)
        );
    }

    #[test]
    fn operator_secret_comparison() {
        assert_eq!(verify_operator(Some("Bearer s3cret"), Some("s3cret")), Ok(()));
        assert_eq!(verify_operator(Some("bearer s3cret"), Some("s3cret")), Ok(()));
        assert_eq!(
            verify_operator(Some("Bearer wrong"), Some("s3cret")),
            Err(AdminAuthError::InvalidAdminToken)
        );
        assert_eq!(
            verify_operator(Some("Bearer s3cret-longer"), Some("s3cret")),
            Err(AdminAuthError::InvalidAdminToken)
        );
        assert_eq!(
            verify_operator(None, Some("s3cret")),
            Err(AdminAuthError::MissingAuthHeader)
        );
        assert_eq!(
            verify_operator(Some("Basic s3cret"), Some("s3cret")),
            Err(AdminAuthError::InvalidAuthHeader)
        );
        assert_eq!(
            verify_operator(Some("Bearer s3cret"), None),
            Err(AdminAuthError::AdminDisabled)
        );
    }

    #[tokio::test]
    async fn admin_extractor_uses_configured_secret() {
        let temp_dir = TempDir::new().unwrap();
        let state = test_state(&temp_dir, Some("operator"));

        let mut parts = Request::builder()
            .uri("/admin/tokens/list")
            .header("Authorization", "Bearer operator")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        assert!(AdminOnly::from_request_parts(&mut parts, &state).await.is_ok());

        let mut parts = Request::builder()
            .uri("/admin/tokens/list")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        assert!(matches!(
            AdminOnly::from_request_parts(&mut parts, &state).await,
            Err(AdminAuthError::MissingAuthHeader)
        ));
    }

    #[tokio::test]
    async fn authenticate_device_records_use() {
        let temp_dir = TempDir::new().unwrap();
        let state = test_state(&temp_dir, None);
        let token = state.tokens.create("phone", Some(30), None).unwrap();
        let credential = state.signer.mint(&token).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, format!("Bearer {credential}").parse().unwrap());
        let claims = authenticate_device(&state, &headers).unwrap();
        assert_eq!(claims.device_name, "phone");

        let mut recorded = false;
        for _ in 0..50 {
            if state.tokens.get(&token.token_id).unwrap().unwrap().last_used_at.is_some() {
                recorded = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        assert!(recorded);
    }
}

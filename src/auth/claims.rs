// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signed device credentials (HS256 JWTs).
//!
//! A credential proves it was minted by this gateway; only the token store
//! can say whether it is still honored.

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use super::CredentialError;
use crate::storage::DeviceToken;

/// Verified claim set of a device credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialClaims {
    /// Device token this credential was minted for
    pub token_id: String,
    /// Device label at issue time
    pub device_name: String,
    /// Issued at (Unix seconds)
    pub iat: i64,
    /// Expiration (Unix seconds); absent for non-expiring tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// Claims as they arrive on the wire, before required fields are checked.
#[derive(Debug, Deserialize)]
struct WireClaims {
    #[serde(default)]
    token_id: Option<String>,
    #[serde(default)]
    device_name: String,
    #[serde(default)]
    iat: i64,
    #[serde(default)]
    exp: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
#[error("failed to sign credential: {0}")]
pub struct SigningError(#[from] jsonwebtoken::errors::Error);

/// Mints and verifies credentials with the gateway's single shared secret.
#[derive(Clone)]
pub struct CredentialSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl CredentialSigner {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Non-expiring devices carry no `exp`; the store decides their lifetime.
        validation.required_spec_claims.clear();
        validation.validate_aud = false;
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Mint a credential for a stored token. `exp` mirrors the token's expiry.
    pub fn mint(&self, token: &DeviceToken) -> Result<String, SigningError> {
        let claims = CredentialClaims {
            token_id: token.token_id.clone(),
            device_name: token.device_name.clone(),
            iat: Utc::now().timestamp(),
            exp: token.expires_at.map(|expires_at| expires_at.timestamp()),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Check signature, algorithm, and signed expiry, then require `token_id`.
    pub fn verify(&self, credential: &str) -> Result<CredentialClaims, CredentialError> {
        let token_data = decode::<WireClaims>(credential, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => CredentialError::ExpiredSignature,
                ErrorKind::InvalidToken => CredentialError::MalformedToken,
                _ => CredentialError::InvalidSignature,
            })?;

        let claims = token_data.claims;
        let token_id = claims
            .token_id
            .filter(|id| !id.is_empty())
            .ok_or(CredentialError::MissingClaim)?;

        Ok(CredentialClaims {
            token_id,
            device_name: claims.device_name,
            iat: claims.iat,
            exp: claims.exp,
        })
    }
}

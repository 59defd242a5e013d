// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Two independent credentials guard the gateway.
//!
//! ## Device Flow
//!
//! 1. An operator creates a device token and hands the device a signed credential
//! 2. The device sends `Authorization: Bearer <credential>` or
//!    `Authorization: Basic base64(<any user>:<credential>)`
//! 3. The gateway:
//!    - Verifies the HS256 signature and any signed `exp`
//!    - Requires a `token_id` claim
//!    - Asks the token store whether that token is still honored
//!    - Records `last_used_at` without delaying the request
//!
//! ## Operator Flow
//!
//! `/admin` requires `Authorization: Bearer <ADMIN_TOKEN>`. With no operator
//! secret configured every admin call is refused.
//!
//! ## Security
//!
//! - Only HS256 is accepted; unsigned tokens and other algorithms are rejected
//! - No clock skew leeway is applied to `exp`
//! - Rejection bodies never reveal which check failed beyond a generic code

pub mod claims;
pub mod error;
pub mod extractor;

pub use claims::{CredentialClaims, CredentialSigner, SigningError};
pub use error::{AdminAuthError, CredentialError};
pub use extractor::{
    authenticate_device, verify_authorization, verify_operator, AdminOnly, PresentedCredential,
};

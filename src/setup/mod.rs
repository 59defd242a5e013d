// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Setup Bundles
//!
//! One-step onboarding for a new device: issue a token, mint its credential,
//! wrap it in LiveSync settings, and seal them into an
//! `obsidian://setuplivesync` URI.
//!
//! Two passphrases come out of this and neither is stored:
//!
//! - the **transport** passphrase opens the URI once on the new device
//! - the **content** passphrase is the vault's end-to-end encryption key and
//!   must match across all devices of a vault

pub mod cipher;
pub mod settings;

use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::auth::{CredentialSigner, SigningError};
use crate::config::SetupConfig;
use crate::storage::{DeviceToken, StoreError, TokenStore};

pub use cipher::{decrypt_settings, encrypt_settings, generate_passphrase, BundleError};
pub use settings::{ConnectionSettings, LiveSyncSettings};

/// Scheme and query key the client registers for settings import.
pub const SETUP_URI_PREFIX: &str = "obsidian://setuplivesync?settings=";

const TRANSPORT_PASSPHRASE_PAIRS: usize = 2;
const CONTENT_PASSPHRASE_PAIRS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("device name must not be empty")]
    EmptyDeviceName,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Bundle(#[from] BundleError),
}

/// What to put in a bundle. Unset passphrases are generated.
#[derive(Debug, Clone)]
pub struct SetupOptions {
    pub device_name: String,
    pub transport_passphrase: Option<String>,
    pub content_passphrase: Option<String>,
    pub expires_in_days: Option<u32>,
    pub encryption: bool,
    pub path_obfuscation: bool,
}

impl SetupOptions {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            transport_passphrase: None,
            content_passphrase: None,
            expires_in_days: None,
            encryption: true,
            path_obfuscation: true,
        }
    }
}

/// A sealed bundle and the secrets needed to use it.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SetupBundle {
    /// `obsidian://setuplivesync?settings=...`
    pub setup_uri: String,
    /// Opens `setup_uri`; share it out of band
    pub uri_passphrase: String,
    /// Vault encryption passphrase; absent when encryption is off
    pub e2ee_passphrase: Option<String>,
    /// The device credential embedded in the bundle
    pub jwt_token: String,
    /// The token record created for this device
    pub token: DeviceToken,
}

fn passphrase_or_generate(given: Option<String>, pairs: usize) -> Result<String, BundleError> {
    match given {
        Some(p) if !p.is_empty() => Ok(p),
        _ => generate_passphrase(pairs),
    }
}

/// Wrap a sealed blob in the import URI.
pub fn setup_uri(blob: &str) -> String {
    format!("{SETUP_URI_PREFIX}{blob}")
}

/// Issue a device token and seal its onboarding settings.
pub fn issue_setup_bundle(
    tokens: &TokenStore,
    signer: &CredentialSigner,
    setup: &SetupConfig,
    options: SetupOptions,
) -> Result<SetupBundle, SetupError> {
    let device_name = options.device_name.trim().to_string();
    if device_name.is_empty() {
        return Err(SetupError::EmptyDeviceName);
    }

    let uri_passphrase =
        passphrase_or_generate(options.transport_passphrase, TRANSPORT_PASSPHRASE_PAIRS)?;
    let e2ee_passphrase = if options.encryption {
        Some(passphrase_or_generate(
            options.content_passphrase,
            CONTENT_PASSPHRASE_PAIRS,
        )?)
    } else {
        None
    };

    let token = tokens.create(&device_name, options.expires_in_days, None)?;

    let sealed = seal_for_token(
        &token,
        signer,
        setup,
        &uri_passphrase,
        e2ee_passphrase.as_deref(),
        options.path_obfuscation,
    );
    let (jwt_token, blob) = match sealed {
        Ok(parts) => parts,
        Err(e) => {
            // Nothing references the token yet; do not leave it behind.
            if let Err(cleanup) = tokens.delete(&token.token_id) {
                warn!(token_id = %token.token_id, error = %cleanup, "Failed to discard unused token");
            }
            return Err(e);
        }
    };

    info!(
        token_id = %token.token_id,
        device_name = %token.device_name,
        encrypted = e2ee_passphrase.is_some(),
        "Issued setup bundle"
    );

    Ok(SetupBundle {
        setup_uri: setup_uri(&blob),
        uri_passphrase,
        e2ee_passphrase,
        jwt_token,
        token,
    })
}

fn seal_for_token(
    token: &DeviceToken,
    signer: &CredentialSigner,
    setup: &SetupConfig,
    uri_passphrase: &str,
    e2ee_passphrase: Option<&str>,
    path_obfuscation: bool,
) -> Result<(String, String), SetupError> {
    let credential = signer.mint(token)?;

    let settings = LiveSyncSettings::new(
        ConnectionSettings {
            couchdb_uri: setup.couchdb_uri(),
            couchdb_user: setup.sync_user.clone(),
            couchdb_password: credential.clone(),
            couchdb_dbname: setup.couchdb_dbname(),
            device_name: token.device_name.clone(),
        },
        e2ee_passphrase,
        path_obfuscation,
    );
    let json = serde_json::to_string(&settings).map_err(BundleError::from)?;
    let blob = encrypt_settings(&json, uri_passphrase)?;

    Ok((credential, blob))
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use reqwest::redirect::Policy;

use crate::auth::CredentialSigner;
use crate::config::Config;
use crate::storage::TokenStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tokens: TokenStore,
    pub signer: CredentialSigner,
    /// Backend client; redirects are relayed to the device, never followed.
    pub upstream: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config, tokens: TokenStore) -> Result<Self, reqwest::Error> {
        let upstream = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .redirect(Policy::none())
            .no_proxy()
            .build()?;

        Ok(Self {
            signer: CredentialSigner::new(config.jwt_secret.as_bytes()),
            config: Arc::new(config),
            tokens,
            upstream,
        })
    }
}

/// State backed by a fresh token database in `dir`, pointing at an unused backend.
#[cfg(test)]
pub(crate) fn test_state(dir: &tempfile::TempDir, admin_token: Option<&str>) -> AppState {
    let mut overrides = Vec::new();
    if let Some(token) = admin_token {
        overrides.push(("ADMIN_TOKEN", token));
    }
    test_state_with(dir, &overrides)
}

/// Like [`test_state`], with extra environment entries taking precedence.
#[cfg(test)]
pub(crate) fn test_state_with(dir: &tempfile::TempDir, overrides: &[(&str, &str)]) -> AppState {
    let defaults = [
        ("COUCHDB_URL", "http://127.0.0.1:9"),
        ("COUCHDB_PASSWORD", "couch-pass"),
        ("JWT_HMAC_SECRET", "test-jwt-secret"),
    ];
    let config = Config::from_lookup(|key| {
        overrides
            .iter()
            .chain(defaults.iter())
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.to_string())
    })
    .unwrap();
    let tokens = TokenStore::open(&dir.path().join("tokens.redb")).unwrap();
    AppState::new(config, tokens).unwrap()
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Expired Token Sweeper
//!
//! Background task that periodically deletes tokens past their expiry, so
//! the store does not grow without bound when operators never call
//! `/admin/tokens/cleanup`.
//!
//! Enabled by `CLEANUP_INTERVAL_SECS > 0`. Expired tokens are already
//! rejected at authentication time; sweeping only reclaims space.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`; the same token drives the
//! server's graceful shutdown.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::storage::TokenStore;

/// Background sweeper that removes expired device tokens.
pub struct TokenSweeper {
    tokens: TokenStore,
    interval: Duration,
}

impl TokenSweeper {
    pub fn new(tokens: TokenStore, interval: Duration) -> Self {
        Self { tokens, interval }
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Token sweeper starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Token sweeper shutting down");
                    return;
                }
            }

            self.sweep_step().await;
        }
    }

    /// Execute one sweep on the blocking pool. Returns how many tokens were removed.
    async fn sweep_step(&self) -> usize {
        let tokens = self.tokens.clone();
        match tokio::task::spawn_blocking(move || tokens.cleanup_expired()).await {
            Ok(Ok(0)) => {
                debug!("Token sweeper: nothing expired");
                0
            }
            Ok(Ok(deleted)) => {
                info!(deleted, "Token sweeper: removed expired tokens");
                deleted
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Token sweeper: cleanup failed");
                0
            }
            Err(e) => {
                warn!(error = %e, "Token sweeper: cleanup task panicked");
                0
            }
        }
    }
}

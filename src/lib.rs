// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! livesync-gate - Per-Device Auth Gateway for CouchDB Sync
//!
//! Sits in front of a CouchDB instance used by the Obsidian LiveSync plugin.
//! Each device holds its own revocable credential; the backend only ever
//! sees the gateway's single service account.
//!
//! ## Modules
//!
//! - `api` - HTTP surface (Axum): health, admin API, pass-through proxy
//! - `auth` - Device credential and operator secret verification
//! - `config` - Environment configuration
//! - `setup` - Encrypted LiveSync setup URIs
//! - `storage` - Device token store (redb)
//! - `sweeper` - Periodic expired-token cleanup

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod setup;
pub mod state;
pub mod storage;
pub mod sweeper;

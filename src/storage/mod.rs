// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Token Storage Module
//!
//! Persistent lifecycle of device tokens in an embedded redb database.
//!
//! ## Storage Layout
//!
//! ```text
//! tokens.redb
//!   device_tokens        token_id → DeviceToken (JSON)
//!   tokens_by_created    !created_at|token_id → token_id
//! ```
//!
//! ## Important Notes
//!
//! - Each operation runs in its own redb transaction; nothing is cached
//! - A token row and its index entry are always written together
//! - The database file is locked by the process that opens it

pub mod tokens;

pub use tokens::{DeviceToken, StoreError, StoreResult, TokenStore};

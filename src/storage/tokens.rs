// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Device token store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `device_tokens`: token_id → serialized DeviceToken (JSON bytes)
//! - `tokens_by_created`: composite key (!created_at|token_id) → token_id
//!
//! Validity is never cached: every check opens a fresh read transaction so a
//! revocation is honored by the very next request.

use std::path::Path;
use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, TimeDelta, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: token_id → serialized DeviceToken (JSON bytes).
const DEVICE_TOKENS: TableDefinition<&str, &[u8]> = TableDefinition::new("device_tokens");

/// Index: `!created_at_micros_be|token_id` → token_id, newest first on a forward scan.
const TOKENS_BY_CREATED: TableDefinition<&[u8], &str> = TableDefinition::new("tokens_by_created");

/// Raw entropy per token id (256 bits).
const TOKEN_ID_BYTES: usize = 32;

/// Fresh ids to draw before giving up on finding an unused one.
const MAX_ID_ATTEMPTS: usize = 4;

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("system random number generator failed")]
    Random,

    #[error("could not allocate an unused token id")]
    IdExhausted,

    #[error("invalid expiry: {0} days")]
    InvalidExpiry(u32),
}

pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Record
// =============================================================================

/// One authorized device.
///
/// `token_id` never changes once issued and `revoked` only ever moves from
/// `false` to `true`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct DeviceToken {
    /// Opaque identifier embedded in signed credentials (URL-safe base64).
    pub token_id: String,
    /// Free-text device label.
    pub device_name: String,
    /// When the token was issued.
    pub created_at: DateTime<Utc>,
    /// When the token stops being honored (never if absent).
    pub expires_at: Option<DateTime<Utc>>,
    /// Last successful authentication (advisory).
    pub last_used_at: Option<DateTime<Utc>>,
    /// Whether the token was revoked.
    pub revoked: bool,
    /// When the token was revoked.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Operator-supplied metadata, stored verbatim.
    pub metadata: Option<String>,
}

impl DeviceToken {
    /// Whether the expiry, if any, lies strictly before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }

    /// Whether the token is honored at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && !self.is_expired_at(now)
    }
}

// =============================================================================
// Index Key Helpers
// =============================================================================

/// Build a composite key for the `tokens_by_created` table.
///
/// The inverted timestamp ensures newest-first ordering when scanning forward.
fn make_index_key(created_at: DateTime<Utc>, token_id: &str) -> Vec<u8> {
    let micros = created_at.timestamp_micros();
    let mut key = Vec::with_capacity(8 + 1 + token_id.len());
    key.extend_from_slice(&(!micros as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(token_id.as_bytes());
    key
}

// =============================================================================
// TokenStore
// =============================================================================

/// Persistent lifecycle of device tokens.
///
/// Cheap to clone; all clones share the same database handle.
#[derive(Clone)]
pub struct TokenStore {
    db: Arc<Database>,
    rng: SystemRandom,
}

impl TokenStore {
    /// Open (or create) the token database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(DEVICE_TOKENS)?;
            let _ = write_txn.open_table(TOKENS_BY_CREATED)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db: Arc::new(db),
            rng: SystemRandom::new(),
        })
    }

    /// Issue a new device token.
    pub fn create(
        &self,
        device_name: &str,
        expires_in_days: Option<u32>,
        metadata: Option<String>,
    ) -> StoreResult<DeviceToken> {
        self.create_at(Utc::now(), device_name, expires_in_days, metadata)
    }

    /// Issue a new device token as if the current time were `now`.
    pub fn create_at(
        &self,
        now: DateTime<Utc>,
        device_name: &str,
        expires_in_days: Option<u32>,
        metadata: Option<String>,
    ) -> StoreResult<DeviceToken> {
        // Zero days means no expiry.
        let expires_at = match expires_in_days.filter(|days| *days > 0) {
            None => None,
            Some(days) => Some(
                TimeDelta::try_days(i64::from(days))
                    .and_then(|delta| now.checked_add_signed(delta))
                    .ok_or(StoreError::InvalidExpiry(days))?,
            ),
        };

        let write_txn = self.db.begin_write()?;
        let record = {
            let mut tokens = write_txn.open_table(DEVICE_TOKENS)?;
            let mut index = write_txn.open_table(TOKENS_BY_CREATED)?;

            let mut token_id = None;
            for _ in 0..MAX_ID_ATTEMPTS {
                let candidate = self.generate_token_id()?;
                if tokens.get(candidate.as_str())?.is_none() {
                    token_id = Some(candidate);
                    break;
                }
            }
            let token_id = token_id.ok_or(StoreError::IdExhausted)?;

            let record = DeviceToken {
                token_id,
                device_name: device_name.to_string(),
                created_at: now,
                expires_at,
                last_used_at: None,
                revoked: false,
                revoked_at: None,
                metadata,
            };

            let json = serde_json::to_vec(&record)?;
            tokens.insert(record.token_id.as_str(), json.as_slice())?;
            let key = make_index_key(record.created_at, &record.token_id);
            index.insert(key.as_slice(), record.token_id.as_str())?;
            record
        };
        write_txn.commit()?;

        Ok(record)
    }

    /// Look up a single token.
    pub fn get(&self, token_id: &str) -> StoreResult<Option<DeviceToken>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(DEVICE_TOKENS)?;
        match table.get(token_id)? {
            Some(value) => {
                let record: DeviceToken = serde_json::from_slice(value.value())?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// False iff the token is missing, revoked, or past its expiry.
    pub fn is_valid(&self, token_id: &str) -> StoreResult<bool> {
        self.is_valid_at(token_id, Utc::now())
    }

    pub fn is_valid_at(&self, token_id: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        Ok(self
            .get(token_id)?
            .is_some_and(|record| record.is_valid_at(now)))
    }

    /// Record a successful use. Unknown ids are ignored.
    pub fn touch(&self, token_id: &str) -> StoreResult<()> {
        let now = Utc::now();
        self.modify(token_id, |record| {
            record.last_used_at = Some(now);
            true
        })?;
        Ok(())
    }

    /// Revoke a token. Returns `true` only if this call changed its state.
    pub fn revoke(&self, token_id: &str) -> StoreResult<bool> {
        let now = Utc::now();
        let changed = self.modify(token_id, |record| {
            if record.revoked {
                return false;
            }
            record.revoked = true;
            record.revoked_at = Some(now);
            true
        })?;
        Ok(changed == Some(true))
    }

    /// Permanently delete a token. Returns whether it existed.
    pub fn delete(&self, token_id: &str) -> StoreResult<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut tokens = write_txn.open_table(DEVICE_TOKENS)?;
            let removed = tokens.remove(token_id)?.map(|value| value.value().to_vec());

            match removed {
                Some(bytes) => {
                    let record: DeviceToken = serde_json::from_slice(&bytes)?;
                    let mut index = write_txn.open_table(TOKENS_BY_CREATED)?;
                    let key = make_index_key(record.created_at, &record.token_id);
                    index.remove(key.as_slice())?;
                    true
                }
                None => false,
            }
        };
        write_txn.commit()?;
        Ok(existed)
    }

    /// All tokens, newest first.
    pub fn list(&self, include_revoked: bool) -> StoreResult<Vec<DeviceToken>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(TOKENS_BY_CREATED)?;
        let tokens = read_txn.open_table(DEVICE_TOKENS)?;

        let mut results = Vec::new();
        for entry in index.iter()? {
            let entry = entry?;
            let token_id = entry.1.value();
            if let Some(value) = tokens.get(token_id)? {
                let record: DeviceToken = serde_json::from_slice(value.value())?;
                if include_revoked || !record.revoked {
                    results.push(record);
                }
            }
        }

        Ok(results)
    }

    /// Delete every token whose expiry is in the past. Returns how many were removed.
    pub fn cleanup_expired(&self) -> StoreResult<usize> {
        self.cleanup_expired_at(Utc::now())
    }

    pub fn cleanup_expired_at(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut tokens = write_txn.open_table(DEVICE_TOKENS)?;
            let mut index = write_txn.open_table(TOKENS_BY_CREATED)?;

            let mut expired = Vec::new();
            for entry in tokens.iter()? {
                let entry = entry?;
                let record: DeviceToken = serde_json::from_slice(entry.1.value())?;
                if record.expires_at.is_some_and(|expires_at| expires_at < now) {
                    expired.push(record);
                }
            }

            for record in &expired {
                tokens.remove(record.token_id.as_str())?;
                let key = make_index_key(record.created_at, &record.token_id);
                index.remove(key.as_slice())?;
            }
            expired.len()
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// Read-modify-write a single record.
    ///
    /// Returns `None` if the token does not exist, otherwise whether `apply`
    /// reported a change (only changed records are written back).
    fn modify<F>(&self, token_id: &str, apply: F) -> StoreResult<Option<bool>>
    where
        F: FnOnce(&mut DeviceToken) -> bool,
    {
        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut tokens = write_txn.open_table(DEVICE_TOKENS)?;
            let existing_bytes = tokens.get(token_id)?.map(|value| value.value().to_vec());

            match existing_bytes {
                Some(bytes) => {
                    let mut record: DeviceToken = serde_json::from_slice(&bytes)?;
                    let changed = apply(&mut record);
                    if changed {
                        let json = serde_json::to_vec(&record)?;
                        tokens.insert(token_id, json.as_slice())?;
                    }
                    Some(changed)
                }
                None => None,
            }
        };

        if outcome == Some(true) {
            write_txn.commit()?;
        } else {
            write_txn.abort()?;
        }
        Ok(outcome)
    }

    fn generate_token_id(&self) -> StoreResult<String> {
        let mut bytes = [0u8; TOKEN_ID_BYTES];
        self.rng.fill(&mut bytes).map_err(|_| StoreError::Random)?;
        Ok(Base64UrlUnpadded::encode_string(&bytes))
    }
}

// =============================================================================
// Tests
// =============================================================================

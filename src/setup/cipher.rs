// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Passphrase-sealed settings blobs.
//!
//! ## Blob Layout
//!
//! ```text
//! %  hex(iv: 16 bytes)  hex(salt: 16 bytes)  base64(ciphertext || tag)
//! ```
//!
//! The key is PBKDF2-HMAC-SHA256 over the passphrase with an iteration count
//! derived from its length. Only the first 12 bytes of `iv` are used as the
//! AES-256-GCM nonce; the last 4 are carried for wire compatibility.

use std::num::NonZeroU32;

use base64ct::{Base64, Encoding};
use ring::{
    aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN},
    pbkdf2,
    rand::{SecureRandom, SystemRandom},
};

const IV_LEN: usize = 16;
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Prefix of a sealed blob.
pub const BLOB_MARKER: char = '%';

const ADJECTIVES: [&str; 8] = [
    "happy", "bright", "swift", "calm", "brave", "quick", "kind", "wise",
];
const NOUNS: [&str; 8] = [
    "ocean", "mountain", "river", "forest", "valley", "cloud", "storm", "wind",
];

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("invalid settings blob: {0}")]
    InvalidFormat(&'static str),

    #[error("decryption failed (wrong passphrase or corrupted blob)")]
    Decrypt,

    #[error("encryption failed")]
    Encrypt,

    #[error("passphrase must not be empty")]
    EmptyPassphrase,

    #[error("system random number generator failed")]
    Random,

    #[error("settings serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// PBKDF2 iteration count for a passphrase of `len` Unicode scalar values.
pub fn iterations_for(len: usize) -> u32 {
    let n = u32::try_from(len).unwrap_or(u32::MAX / 1000);
    n.saturating_mul(1000).saturating_add(121).saturating_sub(n)
}

fn derive_key(passphrase: &str, salt: &[u8]) -> [u8; KEY_LEN] {
    let rounds = iterations_for(passphrase.chars().count());
    // Never zero: the count is at least 121.
    let rounds = NonZeroU32::new(rounds).unwrap_or(NonZeroU32::MIN);

    let mut key = [0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        rounds,
        salt,
        passphrase.as_bytes(),
        &mut key,
    );
    key
}

fn aead_key(key: &[u8; KEY_LEN]) -> Result<LessSafeKey, BundleError> {
    let unbound = UnboundKey::new(&AES_256_GCM, key).map_err(|_| BundleError::Encrypt)?;
    Ok(LessSafeKey::new(unbound))
}

/// Seal `plaintext` under `passphrase`, returning the `%`-prefixed blob.
pub fn encrypt_settings(plaintext: &str, passphrase: &str) -> Result<String, BundleError> {
    if passphrase.is_empty() {
        return Err(BundleError::EmptyPassphrase);
    }

    let rng = SystemRandom::new();
    let mut iv = [0u8; IV_LEN];
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut iv).map_err(|_| BundleError::Random)?;
    rng.fill(&mut salt).map_err(|_| BundleError::Random)?;

    seal_with(plaintext, passphrase, &iv, &salt)
}

/// Deterministic core of [`encrypt_settings`] for a given IV and salt.
fn seal_with(
    plaintext: &str,
    passphrase: &str,
    iv: &[u8; IV_LEN],
    salt: &[u8; SALT_LEN],
) -> Result<String, BundleError> {
    let key = aead_key(&derive_key(passphrase, salt))?;
    let nonce =
        Nonce::try_assume_unique_for_key(&iv[..NONCE_LEN]).map_err(|_| BundleError::Encrypt)?;

    let mut in_out = plaintext.as_bytes().to_vec();
    key.seal_in_place_append_tag(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| BundleError::Encrypt)?;

    Ok(format!(
        "{BLOB_MARKER}{}{}{}",
        hex::encode(iv),
        hex::encode(salt),
        Base64::encode_string(&in_out)
    ))
}

/// Open a blob produced by [`encrypt_settings`] (or the LiveSync client).
pub fn decrypt_settings(blob: &str, passphrase: &str) -> Result<String, BundleError> {
    let body = blob
        .strip_prefix(BLOB_MARKER)
        .ok_or(BundleError::InvalidFormat("missing '%' marker"))?;
    if !body.is_ascii() {
        return Err(BundleError::InvalidFormat("non-ASCII characters"));
    }
    if body.len() <= 2 * (IV_LEN + SALT_LEN) {
        return Err(BundleError::InvalidFormat("blob too short"));
    }

    let (iv_hex, rest) = body.split_at(2 * IV_LEN);
    let (salt_hex, ciphertext_b64) = rest.split_at(2 * SALT_LEN);
    let iv = hex::decode(iv_hex).map_err(|_| BundleError::InvalidFormat("bad iv hex"))?;
    let salt = hex::decode(salt_hex).map_err(|_| BundleError::InvalidFormat("bad salt hex"))?;
    let mut in_out = Base64::decode_vec(ciphertext_b64)
        .map_err(|_| BundleError::InvalidFormat("bad ciphertext base64"))?;
    if in_out.len() < AES_256_GCM.tag_len() {
        return Err(BundleError::InvalidFormat("ciphertext shorter than tag"));
    }

    let key = aead_key(&derive_key(passphrase, &salt))?;
    let nonce =
        Nonce::try_assume_unique_for_key(&iv[..NONCE_LEN]).map_err(|_| BundleError::Decrypt)?;
    let plaintext = key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| BundleError::Decrypt)?;

    String::from_utf8(plaintext.to_vec()).map_err(|_| BundleError::InvalidFormat("plaintext is not UTF-8"))
}

/// `pairs` adjective-noun pairs joined by `-`, drawn from the system CSPRNG.
pub fn generate_passphrase(pairs: usize) -> Result<String, BundleError> {
    let mut picks = vec![0u8; pairs * 2];
    SystemRandom::new()
        .fill(&mut picks)
        .map_err(|_| BundleError::Random)?;

    // Both lists have 8 entries, so `byte % 8` is uniform.
    let words: Vec<&str> = picks
        .chunks_exact(2)
        .flat_map(|pick| {
            [
                ADJECTIVES[usize::from(pick[0]) % ADJECTIVES.len()],
                NOUNS[usize::from(pick[1]) % NOUNS.len()],
            ]
        })
        .collect();
    Ok(words.join("-"))
}

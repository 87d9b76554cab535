//! Bearer token generation and hashing.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{RngCore, rngs::OsRng};
use secrecy::SecretString;
use sha2::{Digest, Sha256};
use uuid::Uuid;

const APPROVAL_TOKEN_BYTES: usize = 48;

/// Create a new approval token.
///
/// The raw value is only returned to the issuing caller; storage keeps the hash.
pub(crate) fn generate_approval_token() -> Result<SecretString> {
    let mut bytes = [0u8; APPROVAL_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate approval token")?;
    Ok(SecretString::from(
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes),
    ))
}

/// Hash an approval token so raw values never touch storage.
#[must_use]
pub fn hash_approval_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Stable identifier handed to the challenge service, derived from the session id.
#[must_use]
pub fn approval_id_for(session_id: Uuid) -> String {
    format!("terms_{session_id}")
}

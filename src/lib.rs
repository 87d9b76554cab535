//! # SecureApprove
//!
//! `secureapprove` gates sensitive administrative actions behind a fresh biometric
//! (`WebAuthn`) confirmation. An admin asks for an **approval token** bound to a
//! *context* (purpose, document type, version and hash, subject, tenant and an
//! optional `extra` map); the subject confirms or cancels it with an assertion
//! before the token expires.
//!
//! ## Token lifecycle
//!
//! 1. **Issue:** a random 48-byte token is returned once; only its SHA-256 digest
//!    is stored, next to the bound context and a 120 second deadline.
//! 2. **Confirm:** the token is looked up by digest and *claimed* with a single
//!    compare-and-set update. Exactly one request wins; every other attempt sees
//!    the token as already used.
//! 3. **Audit:** every attempt that reaches a known token writes an append-only
//!    audit row with the actor, network metadata and the context snapshot.
//!
//! The schema lives in `sql/schema.sql`.

pub mod api;
pub mod approval;
pub mod challenge;
pub mod cli;
pub mod directory;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

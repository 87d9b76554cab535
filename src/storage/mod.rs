//! Persistence for approval sessions and their audit trail.
//!
//! The only contended write is the claim: a compare-and-set on a session's
//! `consumed_at`. Everything else is an insert or a single-field update that
//! needs no coordination between requests.

mod memory;
mod postgres;

pub use memory::MemoryApprovalStore;
pub use postgres::PgApprovalStore;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::approval::{ApprovalAudit, ApprovalSession};

/// Result of the atomic claim on a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// `consumed_at` was null and the session was still live; it is now set.
    Claimed,
    /// Another request already set `consumed_at`.
    AlreadyClaimed,
    /// `consumed_at` is still null but the deadline had passed at claim time.
    Expired,
}

#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Insert a new session. Fails if the token hash already exists.
    async fn insert_session(&self, session: &ApprovalSession) -> Result<()>;

    async fn set_challenge_id(&self, session_id: Uuid, challenge_id: &str) -> Result<()>;

    async fn find_session_by_token_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<ApprovalSession>>;

    async fn get_session(&self, session_id: Uuid) -> Result<Option<ApprovalSession>>;

    /// Set `consumed_at = now` only if it is null and `expires_at > now`.
    async fn claim_session(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<ClaimOutcome>;

    /// Append an audit row. Audit rows are never updated or deleted.
    async fn insert_audit(&self, audit: &ApprovalAudit) -> Result<()>;

    async fn list_audits(&self, session_id: Uuid) -> Result<Vec<ApprovalAudit>>;
}

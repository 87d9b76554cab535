//! Step-up approval protocol.
//!
//! Flow:
//! - `issue`: an admin of the subject's tenant asks for a short-lived bearer
//!   token. A session row is written first, then the challenge collaborator is
//!   asked for WebAuthn options bound to the transaction context.
//! - `confirm`: the browser presents the token and the assertion. The session is
//!   claimed at most once, the assertion is verified against the rebuilt context,
//!   and the outcome is appended to the audit trail.
//!
//! Security boundaries:
//! - Only `SHA-256(token)` is stored; the raw token leaves the service once.
//! - An unknown token never creates state, so the audit table is not an oracle.
//! - `consumed_at` is only ever set by the store's compare-and-set claim.

mod audit;
mod consumer;
mod context;
mod error;
mod issuer;
mod model;
mod token;

#[cfg(test)]
mod tests;

pub use consumer::{ConfirmRequest, Confirmation};
pub use context::BoundContext;
pub use error::ApprovalError;
pub use issuer::{IssueRequest, IssuedApproval};
pub use model::{
    ApprovalAudit, ApprovalSession, AuditStatus, DEFAULT_DOCUMENT_TYPE, DEFAULT_PURPOSE,
    NetworkMetadata, TransactionDescriptor,
};
pub use token::{approval_id_for, hash_approval_token};

use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::{
    challenge::ChallengeService,
    directory::{Actor, Directory, UserSnapshot, hash_session_token},
    storage::ApprovalStore,
};

/// Lifetime of an approval token. Not configurable.
pub const APPROVAL_TOKEN_TTL_SECONDS: i64 = 120;

/// Entry point for both protocol operations.
#[derive(Clone)]
pub struct ApprovalService {
    store: Arc<dyn ApprovalStore>,
    directory: Arc<dyn Directory>,
    challenges: Arc<dyn ChallengeService>,
}

impl ApprovalService {
    #[must_use]
    pub fn new(
        store: Arc<dyn ApprovalStore>,
        directory: Arc<dyn Directory>,
        challenges: Arc<dyn ChallengeService>,
    ) -> Self {
        Self {
            store,
            directory,
            challenges,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn ApprovalStore> {
        &self.store
    }

    /// Resolve a caller session token into an actor.
    ///
    /// # Errors
    /// Returns `Internal` if the directory cannot be queried.
    pub async fn authenticate(&self, session_token: &str) -> Result<Option<Actor>, ApprovalError> {
        let hash = hash_session_token(session_token);
        Ok(self.directory.authenticate(&hash).await?)
    }

    /// Point-in-time identity of the subject, or a placeholder with only the ids.
    async fn subject_snapshot(&self, session: &ApprovalSession) -> UserSnapshot {
        match self.directory.snapshot(session.subject_user_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                warn!(
                    session_id = %session.id,
                    "Approval subject no longer resolves; using placeholder snapshot"
                );
                UserSnapshot::unresolved(session.subject_user_id, session.tenant_id)
            }
            Err(err) => {
                warn!(
                    session_id = %session.id,
                    "Failed to load subject snapshot: {err:#}"
                );
                UserSnapshot::unresolved(session.subject_user_id, session.tenant_id)
            }
        }
    }
}

/// Fresh audit id; v7 keeps rows for one session in creation order.
fn new_audit_id() -> Uuid {
    Uuid::now_v7()
}

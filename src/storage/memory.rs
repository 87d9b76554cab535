use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ApprovalStore, ClaimOutcome};
use crate::approval::{ApprovalAudit, ApprovalSession};

#[derive(Default)]
struct Inner {
    sessions: HashMap<Uuid, ApprovalSession>,
    by_token_hash: HashMap<Vec<u8>, Uuid>,
    audits: Vec<ApprovalAudit>,
}

/// Mutex-guarded store for a non-distributed deployment.
///
/// The claim runs entirely under the lock, which gives it the same
/// compare-and-set semantics as the conditional `UPDATE` in Postgres.
#[derive(Default)]
pub struct MemoryApprovalStore {
    inner: Mutex<Inner>,
}

impl MemoryApprovalStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.lock().await.sessions.len()
    }

    pub async fn sessions(&self) -> Vec<ApprovalSession> {
        self.inner.lock().await.sessions.values().cloned().collect()
    }

    /// Every audit row, in insertion order.
    pub async fn audits(&self) -> Vec<ApprovalAudit> {
        self.inner.lock().await.audits.clone()
    }
}

#[async_trait]
impl ApprovalStore for MemoryApprovalStore {
    async fn insert_session(&self, session: &ApprovalSession) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.by_token_hash.contains_key(&session.token_hash) {
            return Err(anyhow!("approval token hash already exists"));
        }
        if inner.sessions.contains_key(&session.id) {
            return Err(anyhow!("approval session {} already exists", session.id));
        }
        inner
            .by_token_hash
            .insert(session.token_hash.clone(), session.id);
        inner.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn set_challenge_id(&self, session_id: Uuid, challenge_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let session = inner
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| anyhow!("approval session {session_id} not found"))?;
        session.challenge_id = challenge_id.to_string();
        Ok(())
    }

    async fn find_session_by_token_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<ApprovalSession>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .by_token_hash
            .get(token_hash)
            .and_then(|id| inner.sessions.get(id))
            .cloned())
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<ApprovalSession>> {
        Ok(self.inner.lock().await.sessions.get(&session_id).cloned())
    }

    async fn claim_session(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<ClaimOutcome> {
        let mut inner = self.inner.lock().await;
        let session = inner
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| anyhow!("approval session {session_id} not found"))?;
        if session.consumed_at.is_some() {
            return Ok(ClaimOutcome::AlreadyClaimed);
        }
        if session.expires_at <= now {
            return Ok(ClaimOutcome::Expired);
        }
        session.consumed_at = Some(now);
        Ok(ClaimOutcome::Claimed)
    }

    async fn insert_audit(&self, audit: &ApprovalAudit) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.audits.iter().any(|existing| existing.id == audit.id) {
            return Err(anyhow!("approval audit {} already exists", audit.id));
        }
        inner.audits.push(audit.clone());
        Ok(())
    }

    async fn list_audits(&self, session_id: Uuid) -> Result<Vec<ApprovalAudit>> {
        Ok(self
            .inner
            .lock()
            .await
            .audits
            .iter()
            .filter(|audit| audit.session_id == session_id)
            .cloned()
            .collect())
    }
}

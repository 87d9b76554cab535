use chrono::Utc;
use tracing::error;

use super::{
    ApprovalError, BoundContext, new_audit_id,
    model::{ApprovalAudit, ApprovalSession, AuditStatus, NetworkMetadata},
};
use crate::{directory::UserSnapshot, storage::ApprovalStore};

/// What a single confirm attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct AttemptOutcome {
    pub status: AuditStatus,
    pub credential_id: String,
    pub challenge_id: String,
    pub error_message: Option<String>,
}

impl AttemptOutcome {
    pub(super) fn expired() -> Self {
        Self {
            status: AuditStatus::Expired,
            credential_id: String::new(),
            challenge_id: String::new(),
            error_message: Some("Approval token expired".to_string()),
        }
    }
}

/// Appends one audit row per attempt that located a session.
pub(super) struct AuditRecorder<'a> {
    store: &'a dyn ApprovalStore,
    session: &'a ApprovalSession,
    subject: &'a UserSnapshot,
    network: &'a NetworkMetadata,
}

impl<'a> AuditRecorder<'a> {
    pub(super) fn new(
        store: &'a dyn ApprovalStore,
        session: &'a ApprovalSession,
        subject: &'a UserSnapshot,
        network: &'a NetworkMetadata,
    ) -> Self {
        Self {
            store,
            session,
            subject,
            network,
        }
    }

    pub(super) fn build(&self, outcome: AttemptOutcome) -> ApprovalAudit {
        let session = self.session;
        let challenge_id = if outcome.challenge_id.is_empty() {
            session.challenge_id.clone()
        } else {
            outcome.challenge_id
        };
        ApprovalAudit {
            id: new_audit_id(),
            tenant_id: session.tenant_id,
            user_id: session.subject_user_id,
            initiated_by: session.created_by,
            session_id: session.id,
            purpose: session.descriptor.purpose.clone(),
            document_type: session.descriptor.document_type.clone(),
            document_version: session.descriptor.document_version.clone(),
            document_hash: session.descriptor.document_hash.clone(),
            status: outcome.status,
            credential_id: outcome.credential_id,
            challenge_id,
            ip_address: self.network.ip_address.clone(),
            user_agent: self.network.user_agent.clone(),
            user_snapshot: self.subject.clone(),
            context_data: BoundContext::for_session(session).to_value(),
            error_message: outcome.error_message,
            created_at: Utc::now(),
        }
    }

    pub(super) async fn record(&self, outcome: AttemptOutcome) -> Result<ApprovalAudit, ApprovalError> {
        let audit = self.build(outcome);
        if let Err(err) = self.store.insert_audit(&audit).await {
            error!(
                session_id = %audit.session_id,
                status = audit.status.as_str(),
                "Failed to write approval audit: {err:#}"
            );
            return Err(ApprovalError::Internal(err));
        }
        Ok(audit)
    }
}

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    APPROVAL_TOKEN_TTL_SECONDS, ApprovalError, ApprovalService, BoundContext,
    model::{ApprovalSession, TransactionDescriptor},
    token::{approval_id_for, generate_approval_token, hash_approval_token},
};
use crate::directory::Actor;

#[derive(Debug, Clone)]
pub struct IssueRequest {
    pub subject_user_id: Uuid,
    pub descriptor: TransactionDescriptor,
}

/// Returned once to the issuing caller; the raw token is not recoverable later.
#[derive(Debug)]
pub struct IssuedApproval {
    pub session_id: Uuid,
    pub token: SecretString,
    pub expires_at: DateTime<Utc>,
    pub webauthn_options: Value,
    pub descriptor: TransactionDescriptor,
}

impl ApprovalService {
    /// Issue a single-use approval token for `request.subject_user_id`.
    ///
    /// Checks run in order: tenant context, admin capability, subject in the
    /// same tenant, active credential. None of them write anything.
    ///
    /// # Errors
    /// Returns the first failing precondition, or `Internal` on storage or
    /// collaborator failure.
    #[instrument(skip_all, fields(actor_id = %actor.user_id, subject_id = %request.subject_user_id))]
    pub async fn issue(
        &self,
        actor: &Actor,
        request: IssueRequest,
    ) -> Result<IssuedApproval, ApprovalError> {
        let tenant_id = actor.tenant_id.ok_or(ApprovalError::NoTenantContext)?;
        if !actor.can_admin_tenant() {
            warn!(tenant_id = %tenant_id, "Approval issue denied: caller is not a tenant admin");
            return Err(ApprovalError::PermissionDenied);
        }

        let subject = self
            .directory
            .find_user_in_tenant(request.subject_user_id, tenant_id)
            .await?
            .ok_or(ApprovalError::SubjectNotFound)?;

        if !self.directory.has_active_credentials(subject.id).await? {
            return Err(ApprovalError::NoCredentials);
        }

        let token = generate_approval_token()?;
        let created_at = Utc::now();
        let session_id = Uuid::new_v4();
        let session = ApprovalSession {
            id: session_id,
            tenant_id,
            subject_user_id: subject.id,
            created_by: actor.user_id,
            descriptor: request.descriptor,
            approval_id: approval_id_for(session_id),
            token_hash: hash_approval_token(token.expose_secret()),
            challenge_id: String::new(),
            created_at,
            expires_at: created_at + TimeDelta::seconds(APPROVAL_TOKEN_TTL_SECONDS),
            consumed_at: None,
        };

        // The row must exist before the collaborator is called.
        self.store.insert_session(&session).await?;

        let context = BoundContext::for_session(&session);
        let challenge = self
            .challenges
            .generate_challenge(&subject, &session.approval_id, &context)
            .await?;
        self.store
            .set_challenge_id(session.id, &challenge.challenge_id)
            .await?;

        info!(
            tenant_id = %tenant_id,
            session_id = %session.id,
            purpose = %session.descriptor.purpose,
            "Approval token issued"
        );

        Ok(IssuedApproval {
            session_id: session.id,
            token,
            expires_at: session.expires_at,
            webauthn_options: challenge.options,
            descriptor: session.descriptor,
        })
    }
}

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{
    ApprovalError, ApprovalService, BoundContext,
    audit::{AttemptOutcome, AuditRecorder},
    model::{AuditStatus, NetworkMetadata},
    token::hash_approval_token,
};
use crate::{challenge::VerifyOutcome, storage::ClaimOutcome};

#[derive(Debug)]
pub struct ConfirmRequest {
    pub token: SecretString,
    pub approved: bool,
    pub assertion: Value,
    pub network: NetworkMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub session_id: Uuid,
    pub status: AuditStatus,
    pub approved: bool,
    pub audit_id: Uuid,
}

fn verification_outcome(outcome: VerifyOutcome, approved: bool) -> AttemptOutcome {
    match outcome {
        VerifyOutcome::Verified {
            credential_id,
            challenge_id,
        } => AttemptOutcome {
            status: if approved {
                AuditStatus::Success
            } else {
                AuditStatus::Cancelled
            },
            credential_id,
            challenge_id,
            error_message: None,
        },
        VerifyOutcome::Rejected {
            reason,
            credential_id,
            challenge_id,
        } => AttemptOutcome {
            status: AuditStatus::Failed,
            credential_id,
            challenge_id,
            error_message: Some(reason),
        },
        VerifyOutcome::MalformedInput(reason) => AttemptOutcome {
            status: AuditStatus::Failed,
            credential_id: String::new(),
            challenge_id: String::new(),
            error_message: Some(reason),
        },
    }
}

impl ApprovalService {
    /// Consume an approval token with a biometric assertion.
    ///
    /// Exactly one audit row is written for every attempt that located a
    /// session, except a lost claim: the winner already wrote it.
    ///
    /// # Errors
    /// `InvalidToken` for unknown tokens, `AlreadyUsed` once claimed,
    /// `Expired` past the deadline and `VerificationFailed` when the
    /// assertion does not verify.
    #[instrument(skip_all)]
    pub async fn confirm(&self, request: ConfirmRequest) -> Result<Confirmation, ApprovalError> {
        let token_hash = hash_approval_token(request.token.expose_secret());
        let Some(session) = self.store.find_session_by_token_hash(&token_hash).await? else {
            return Err(ApprovalError::InvalidToken);
        };
        if session.is_consumed() {
            return Err(ApprovalError::AlreadyUsed);
        }

        let subject = self.subject_snapshot(&session).await;
        let recorder = AuditRecorder::new(
            self.store.as_ref(),
            &session,
            &subject,
            &request.network,
        );

        let now = Utc::now();
        if session.is_expired_at(now) {
            recorder.record(AttemptOutcome::expired()).await?;
            info!(session_id = %session.id, status = "expired", "Approval token expired");
            return Err(ApprovalError::Expired);
        }

        match self.store.claim_session(session.id, now).await? {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::AlreadyClaimed => return Err(ApprovalError::AlreadyUsed),
            ClaimOutcome::Expired => {
                recorder.record(AttemptOutcome::expired()).await?;
                info!(session_id = %session.id, status = "expired", "Approval token expired at claim");
                return Err(ApprovalError::Expired);
            }
        }

        let context = BoundContext::for_session(&session);
        let outcome = match self
            .challenges
            .verify_response(
                &subject,
                &session.approval_id,
                &request.assertion,
                &context,
            )
            .await
        {
            Ok(outcome) => verification_outcome(outcome, request.approved),
            Err(err) => {
                error!(session_id = %session.id, "Challenge service failed during verification: {err:#}");
                AttemptOutcome {
                    status: AuditStatus::Failed,
                    credential_id: String::new(),
                    challenge_id: String::new(),
                    error_message: Some("Verification service error".to_string()),
                }
            }
        };

        let audit = recorder.record(outcome).await?;
        if audit.status == AuditStatus::Failed {
            warn!(
                session_id = %session.id,
                status = audit.status.as_str(),
                "Approval verification failed: {}",
                audit.error_message.as_deref().unwrap_or_default()
            );
            return Err(ApprovalError::VerificationFailed);
        }

        info!(
            tenant_id = %session.tenant_id,
            session_id = %session.id,
            status = audit.status.as_str(),
            "Approval confirmed"
        );
        Ok(Confirmation {
            session_id: session.id,
            status: audit.status,
            approved: request.approved,
            audit_id: audit.id,
        })
    }
}

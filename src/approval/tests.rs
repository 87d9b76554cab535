use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, json};
use std::sync::Arc;
use uuid::Uuid;

use super::*;
use crate::{
    challenge::stub::StubVerify,
    storage::{ClaimOutcome, MemoryApprovalStore},
    testing::Fixture,
};

/// Claims as if the request reached the store well after the deadline.
struct LateClaimStore {
    inner: Arc<MemoryApprovalStore>,
}

#[async_trait]
impl ApprovalStore for LateClaimStore {
    async fn insert_session(&self, session: &ApprovalSession) -> Result<()> {
        self.inner.insert_session(session).await
    }

    async fn set_challenge_id(&self, session_id: Uuid, challenge_id: &str) -> Result<()> {
        self.inner.set_challenge_id(session_id, challenge_id).await
    }

    async fn find_session_by_token_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<ApprovalSession>> {
        self.inner.find_session_by_token_hash(token_hash).await
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<ApprovalSession>> {
        self.inner.get_session(session_id).await
    }

    async fn claim_session(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<ClaimOutcome> {
        self.inner
            .claim_session(session_id, now + TimeDelta::seconds(600))
            .await
    }

    async fn insert_audit(&self, audit: &ApprovalAudit) -> Result<()> {
        self.inner.insert_audit(audit).await
    }

    async fn list_audits(&self, session_id: Uuid) -> Result<Vec<ApprovalAudit>> {
        self.inner.list_audits(session_id).await
    }
}

fn issue_request(subject_user_id: Uuid) -> IssueRequest {
    IssueRequest {
        subject_user_id,
        descriptor: TransactionDescriptor {
            document_version: "2026-10".to_string(),
            document_hash: "sha256:abc".to_string(),
            ..TransactionDescriptor::default()
        },
    }
}

fn confirm_request(token: &SecretString, approved: bool) -> ConfirmRequest {
    ConfirmRequest {
        token: token.clone(),
        approved,
        assertion: json!({ "id": "stub-credential", "response": {} }),
        network: NetworkMetadata {
            ip_address: Some("192.0.2.10".to_string()),
            user_agent: "test-agent".to_string(),
        },
    }
}

#[tokio::test]
async fn issue_stores_only_hash_and_fixed_ttl() -> Result<()> {
    let fixture = Fixture::new(StubVerify::Bound).await;
    let issued = fixture
        .service
        .issue(&fixture.admin, issue_request(fixture.subject.id))
        .await?;

    let Some(session) = fixture.store.get_session(issued.session_id).await? else {
        bail!("session not stored");
    };
    assert_eq!(
        session.token_hash,
        hash_approval_token(issued.token.expose_secret())
    );
    assert_eq!(
        session.expires_at - session.created_at,
        TimeDelta::seconds(APPROVAL_TOKEN_TTL_SECONDS)
    );
    assert_eq!(issued.expires_at, session.expires_at);
    assert_eq!(session.approval_id, approval_id_for(session.id));
    assert_eq!(session.created_by, fixture.admin.user_id);
    assert_eq!(session.challenge_id, format!("challenge-{}", session.approval_id));
    assert_eq!(
        issued.webauthn_options["challengeId"],
        json!(session.challenge_id)
    );
    assert_eq!(issued.descriptor.document_version, "2026-10");
    assert!(session.consumed_at.is_none());
    Ok(())
}

#[tokio::test]
async fn issue_without_tenant_is_rejected() -> Result<()> {
    let fixture = Fixture::new(StubVerify::Bound).await;
    let mut actor = fixture.admin.clone();
    actor.tenant_id = None;

    let result = fixture
        .service
        .issue(&actor, issue_request(fixture.subject.id))
        .await;
    assert!(matches!(result, Err(ApprovalError::NoTenantContext)));
    assert_eq!(fixture.store.session_count().await, 0);
    Ok(())
}

// Scenario D
#[tokio::test]
async fn issue_by_non_admin_creates_nothing() -> Result<()> {
    let fixture = Fixture::new(StubVerify::Bound).await;
    let result = fixture
        .service
        .issue(&fixture.requester, issue_request(fixture.subject.id))
        .await;
    assert!(matches!(result, Err(ApprovalError::PermissionDenied)));
    assert_eq!(result.err().map(|e| e.status_code().as_u16()), Some(403));
    assert_eq!(fixture.store.session_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn issue_for_other_tenant_or_unknown_subject_is_forbidden() -> Result<()> {
    let fixture = Fixture::new(StubVerify::Bound).await;
    let outsider = UserSnapshot {
        id: Uuid::new_v4(),
        tenant_id: Some(Uuid::new_v4()),
        ..UserSnapshot::default()
    };
    fixture.directory.insert_user(outsider.clone()).await;
    fixture
        .directory
        .set_active_credentials(outsider.id, true)
        .await;

    let cross_tenant = fixture
        .service
        .issue(&fixture.admin, issue_request(outsider.id))
        .await;
    let unknown = fixture
        .service
        .issue(&fixture.admin, issue_request(Uuid::new_v4()))
        .await;
    assert!(matches!(cross_tenant, Err(ApprovalError::SubjectNotFound)));
    assert!(matches!(unknown, Err(ApprovalError::SubjectNotFound)));
    assert_eq!(fixture.store.session_count().await, 0);
    Ok(())
}

// Scenario E
#[tokio::test]
async fn issue_for_subject_without_credentials_creates_nothing() -> Result<()> {
    let fixture = Fixture::new(StubVerify::Bound).await;
    let subject = fixture.subject_without_credentials().await;

    let result = fixture
        .service
        .issue(&fixture.admin, issue_request(subject.id))
        .await;
    assert!(matches!(result, Err(ApprovalError::NoCredentials)));
    assert_eq!(fixture.store.session_count().await, 0);
    Ok(())
}

// Scenario A
#[tokio::test]
async fn confirm_approved_records_success() -> Result<()> {
    let fixture = Fixture::new(StubVerify::Bound).await;
    let issued = fixture
        .service
        .issue(&fixture.admin, issue_request(fixture.subject.id))
        .await?;

    let confirmation = fixture
        .service
        .confirm(confirm_request(&issued.token, true))
        .await?;
    assert_eq!(confirmation.status, AuditStatus::Success);
    assert!(confirmation.approved);

    let audits = fixture.store.list_audits(issued.session_id).await?;
    assert_eq!(audits.len(), 1);
    let audit = &audits[0];
    assert_eq!(audit.id, confirmation.audit_id);
    assert_eq!(audit.credential_id, "stub-credential");
    assert_eq!(audit.initiated_by, fixture.admin.user_id);
    assert_eq!(audit.user_snapshot, fixture.subject);
    assert_eq!(audit.ip_address.as_deref(), Some("192.0.2.10"));
    assert_eq!(audit.document_hash, "sha256:abc");

    let session = fixture.store.get_session(issued.session_id).await?;
    assert!(session.is_some_and(|s| s.consumed_at.is_some()));
    Ok(())
}

#[tokio::test]
async fn confirm_declined_records_cancelled_and_burns_token() -> Result<()> {
    let fixture = Fixture::new(StubVerify::Bound).await;
    let issued = fixture
        .service
        .issue(&fixture.admin, issue_request(fixture.subject.id))
        .await?;

    let confirmation = fixture
        .service
        .confirm(confirm_request(&issued.token, false))
        .await?;
    assert_eq!(confirmation.status, AuditStatus::Cancelled);
    assert!(!confirmation.approved);

    let replay = fixture
        .service
        .confirm(confirm_request(&issued.token, true))
        .await;
    assert!(matches!(replay, Err(ApprovalError::AlreadyUsed)));
    assert_eq!(fixture.store.list_audits(issued.session_id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn confirm_never_issued_token_writes_nothing() -> Result<()> {
    let fixture = Fixture::new(StubVerify::Bound).await;
    let token = SecretString::from("never-issued".to_string());

    let result = fixture.service.confirm(confirm_request(&token, true)).await;
    assert!(matches!(result, Err(ApprovalError::InvalidToken)));
    assert!(fixture.store.audits().await.is_empty());
    assert_eq!(fixture.challenges.verify_calls(), 0);
    Ok(())
}

// Scenario C
#[tokio::test]
async fn confirm_after_deadline_appends_expired_each_time() -> Result<()> {
    let fixture = Fixture::new(StubVerify::Bound).await;
    let (session, token) = fixture.expired_session().await?;

    for _ in 0..3 {
        let result = fixture.service.confirm(confirm_request(&token, true)).await;
        assert!(matches!(result, Err(ApprovalError::Expired)));
    }

    let audits = fixture.store.list_audits(session.id).await?;
    assert_eq!(audits.len(), 3);
    assert!(audits.iter().all(|a| a.status == AuditStatus::Expired));
    assert_eq!(fixture.challenges.verify_calls(), 0);
    let stored = fixture.store.get_session(session.id).await?;
    assert!(stored.is_some_and(|s| s.consumed_at.is_none()));
    Ok(())
}

#[tokio::test]
async fn verifier_rejection_fails_and_burns_token() -> Result<()> {
    let fixture = Fixture::new(StubVerify::Reject).await;
    let issued = fixture
        .service
        .issue(&fixture.admin, issue_request(fixture.subject.id))
        .await?;

    let result = fixture
        .service
        .confirm(confirm_request(&issued.token, true))
        .await;
    assert!(matches!(result, Err(ApprovalError::VerificationFailed)));

    fixture.challenges.set_mode(StubVerify::Bound);
    let retry = fixture
        .service
        .confirm(confirm_request(&issued.token, true))
        .await;
    assert!(matches!(retry, Err(ApprovalError::AlreadyUsed)));

    let audits = fixture.store.list_audits(issued.session_id).await?;
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].status, AuditStatus::Failed);
    assert_eq!(audits[0].credential_id, "stub-credential");
    assert_eq!(audits[0].error_message.as_deref(), Some("signature mismatch"));
    Ok(())
}

#[tokio::test]
async fn malformed_assertion_is_a_failed_attempt() -> Result<()> {
    let fixture = Fixture::new(StubVerify::Malformed).await;
    let issued = fixture
        .service
        .issue(&fixture.admin, issue_request(fixture.subject.id))
        .await?;

    let result = fixture
        .service
        .confirm(confirm_request(&issued.token, true))
        .await;
    assert!(matches!(result, Err(ApprovalError::VerificationFailed)));
    let audits = fixture.store.list_audits(issued.session_id).await?;
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].status, AuditStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn collaborator_outage_looks_like_verification_failure() -> Result<()> {
    let fixture = Fixture::new(StubVerify::Bound).await;
    let issued = fixture
        .service
        .issue(&fixture.admin, issue_request(fixture.subject.id))
        .await?;

    fixture.challenges.set_mode(StubVerify::Unavailable);
    let result = fixture
        .service
        .confirm(confirm_request(&issued.token, true))
        .await;
    assert!(matches!(result, Err(ApprovalError::VerificationFailed)));
    let audits = fixture.store.list_audits(issued.session_id).await?;
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].status, AuditStatus::Failed);
    assert_eq!(
        audits[0].error_message.as_deref(),
        Some("Verification service error")
    );
    Ok(())
}

#[tokio::test]
async fn confirm_rebuilds_context_with_extra() -> Result<()> {
    let fixture = Fixture::new(StubVerify::Bound).await;
    let mut extra = Map::new();
    extra.insert("source".to_string(), json!("admin-portal"));
    let request = IssueRequest {
        subject_user_id: fixture.subject.id,
        descriptor: TransactionDescriptor {
            extra,
            ..TransactionDescriptor::default()
        },
    };
    let issued = fixture.service.issue(&fixture.admin, request).await?;

    let confirmation = fixture
        .service
        .confirm(confirm_request(&issued.token, true))
        .await?;
    assert_eq!(confirmation.status, AuditStatus::Success);
    Ok(())
}

// Scenario B and the concurrency property.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_confirms_have_exactly_one_terminal_outcome() -> Result<()> {
    let fixture = Arc::new(Fixture::new(StubVerify::Bound).await);
    let issued = fixture
        .service
        .issue(&fixture.admin, issue_request(fixture.subject.id))
        .await?;

    let mut handles = Vec::new();
    for _ in 0..12 {
        let service = fixture.service.clone();
        let token = issued.token.clone();
        handles.push(tokio::spawn(async move {
            service.confirm(confirm_request(&token, true)).await
        }));
    }

    let mut terminal = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) | Err(ApprovalError::VerificationFailed) => terminal += 1,
            Err(ApprovalError::AlreadyUsed) => conflicts += 1,
            Err(other) => bail!("unexpected confirm error: {other}"),
        }
    }
    assert_eq!(terminal, 1);
    assert_eq!(conflicts, 11);

    let audits = fixture.store.list_audits(issued.session_id).await?;
    assert_eq!(audits.len(), 1);
    assert!(audits[0].status.is_terminal());
    assert_eq!(fixture.challenges.verify_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn authenticate_resolves_session_tokens() -> Result<()> {
    let fixture = Fixture::new(StubVerify::Bound).await;
    let actor = fixture
        .service
        .authenticate(crate::testing::ADMIN_SESSION_TOKEN)
        .await?;
    assert_eq!(actor, Some(fixture.admin.clone()));
    assert_eq!(fixture.service.authenticate("unknown").await?, None);
    Ok(())
}

#[tokio::test]
async fn claim_past_deadline_is_audited_as_expired() -> Result<()> {
    let fixture = Fixture::new(StubVerify::Bound).await;
    let service = ApprovalService::new(
        Arc::new(LateClaimStore {
            inner: fixture.store.clone(),
        }),
        fixture.directory.clone(),
        fixture.challenges.clone(),
    );
    let issued = service
        .issue(&fixture.admin, issue_request(fixture.subject.id))
        .await?;

    let result = service.confirm(confirm_request(&issued.token, true)).await;
    assert!(matches!(result, Err(ApprovalError::Expired)));

    let audits = fixture.store.list_audits(issued.session_id).await?;
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].status, AuditStatus::Expired);
    let stored = fixture.store.get_session(issued.session_id).await?;
    assert!(stored.is_some_and(|s| s.consumed_at.is_none()));
    assert_eq!(fixture.challenges.verify_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn session_is_stored_before_challenge_generation() -> Result<()> {
    let fixture = Fixture::new(StubVerify::Unavailable).await;
    let result = fixture
        .service
        .issue(&fixture.admin, issue_request(fixture.subject.id))
        .await;
    assert!(matches!(result, Err(ApprovalError::Internal(_))));

    let sessions = fixture.store.sessions().await;
    assert_eq!(sessions.len(), 1);
    assert!(sessions[0].challenge_id.is_empty());
    assert_eq!(sessions[0].subject_user_id, fixture.subject.id);
    assert!(fixture.store.audits().await.is_empty());
    Ok(())
}

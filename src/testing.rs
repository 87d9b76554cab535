//! Shared fixtures for protocol and handler tests.

use chrono::{TimeDelta, Utc};
use secrecy::SecretString;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    approval::{
        ApprovalService, ApprovalSession, TransactionDescriptor, approval_id_for,
        hash_approval_token,
    },
    challenge::stub::{StubChallengeService, StubVerify},
    directory::{Actor, MemoryDirectory, UserSnapshot, hash_session_token},
    storage::{ApprovalStore, MemoryApprovalStore},
};

pub const ADMIN_SESSION_TOKEN: &str = "admin-session-token";
pub const REQUESTER_SESSION_TOKEN: &str = "requester-session-token";

pub struct Fixture {
    pub service: ApprovalService,
    pub store: Arc<MemoryApprovalStore>,
    pub directory: Arc<MemoryDirectory>,
    pub challenges: Arc<StubChallengeService>,
    pub tenant_id: Uuid,
    pub admin: Actor,
    pub requester: Actor,
    pub subject: UserSnapshot,
}

impl Fixture {
    /// Tenant with one admin, one requester and a subject holding an active credential.
    pub async fn new(mode: StubVerify) -> Self {
        let store = Arc::new(MemoryApprovalStore::new());
        let directory = Arc::new(MemoryDirectory::new());
        let challenges = Arc::new(StubChallengeService::new(mode));
        let tenant_id = Uuid::new_v4();

        let admin = Actor {
            user_id: Uuid::new_v4(),
            tenant_id: Some(tenant_id),
            role: "tenant_admin".to_string(),
            is_staff: false,
            is_superuser: false,
        };
        let requester = Actor {
            user_id: Uuid::new_v4(),
            tenant_id: Some(tenant_id),
            role: "requester".to_string(),
            is_staff: false,
            is_superuser: false,
        };
        let subject = UserSnapshot {
            id: Uuid::new_v4(),
            email: "subject@tenant.test".to_string(),
            name: "Subject User".to_string(),
            role: Some("approver".to_string()),
            username: Some("subject".to_string()),
            tenant_id: Some(tenant_id),
            tenant_key: Some("acme".to_string()),
            tenant_name: Some("Acme".to_string()),
        };

        directory.insert_user(subject.clone()).await;
        directory.set_active_credentials(subject.id, true).await;
        directory
            .insert_session(hash_session_token(ADMIN_SESSION_TOKEN), admin.clone())
            .await;
        directory
            .insert_session(
                hash_session_token(REQUESTER_SESSION_TOKEN),
                requester.clone(),
            )
            .await;

        let service = ApprovalService::new(
            store.clone(),
            directory.clone(),
            challenges.clone(),
        );

        Self {
            service,
            store,
            directory,
            challenges,
            tenant_id,
            admin,
            requester,
            subject,
        }
    }

    /// Insert a subject in the same tenant without any credential.
    pub async fn subject_without_credentials(&self) -> UserSnapshot {
        let user = UserSnapshot {
            id: Uuid::new_v4(),
            email: "nocred@tenant.test".to_string(),
            tenant_id: Some(self.tenant_id),
            ..UserSnapshot::default()
        };
        self.directory.insert_user(user.clone()).await;
        user
    }

    /// Store a session whose deadline has already passed, returning its raw token.
    pub async fn expired_session(&self) -> anyhow::Result<(ApprovalSession, SecretString)> {
        let raw = format!("expired-{}", Uuid::new_v4());
        let created_at = Utc::now() - TimeDelta::seconds(300);
        let id = Uuid::new_v4();
        let session = ApprovalSession {
            id,
            tenant_id: self.tenant_id,
            subject_user_id: self.subject.id,
            created_by: self.admin.user_id,
            descriptor: TransactionDescriptor::default(),
            approval_id: approval_id_for(id),
            token_hash: hash_approval_token(&raw),
            challenge_id: "challenge-expired".to_string(),
            created_at,
            expires_at: created_at + TimeDelta::seconds(120),
            consumed_at: None,
        };
        self.store.insert_session(&session).await?;
        Ok((session, SecretString::from(raw)))
    }
}

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::{PgPool, Row, postgres::PgRow, types::Json};
use std::net::IpAddr;
use uuid::Uuid;

use super::{ApprovalStore, ClaimOutcome};
use crate::{
    approval::{ApprovalAudit, ApprovalSession, AuditStatus, TransactionDescriptor},
    directory::UserSnapshot,
};

const SESSION_COLUMNS: &str = r"
    id, tenant_id, subject_user_id, created_by, purpose, document_type,
    document_version, document_hash, context_data, approval_id, token_hash,
    challenge_id, created_at, expires_at, consumed_at
";

const AUDIT_COLUMNS: &str = r"
    id, tenant_id, user_id, initiated_by, session_id, purpose, document_type,
    document_version, document_hash, status, credential_id, challenge_id,
    host(ip_address) AS ip_address, user_agent, user_snapshot, context_data,
    error_message, created_at
";

/// Postgres-backed approval store.
#[derive(Clone, Debug)]
pub struct PgApprovalStore {
    pool: PgPool,
}

impl PgApprovalStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn session_from_row(row: &PgRow) -> Result<ApprovalSession> {
    let extra: Value = row.try_get("context_data")?;
    let extra = match extra {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    Ok(ApprovalSession {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        subject_user_id: row.try_get("subject_user_id")?,
        created_by: row.try_get("created_by")?,
        descriptor: TransactionDescriptor {
            purpose: row.try_get("purpose")?,
            document_type: row.try_get("document_type")?,
            document_version: row.try_get("document_version")?,
            document_hash: row.try_get("document_hash")?,
            extra,
        },
        approval_id: row.try_get("approval_id")?,
        token_hash: row.try_get("token_hash")?,
        challenge_id: row.try_get("challenge_id")?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        consumed_at: row.try_get("consumed_at")?,
    })
}

fn audit_from_row(row: &PgRow) -> Result<ApprovalAudit> {
    let status: String = row.try_get("status")?;
    let status = AuditStatus::parse(&status)
        .ok_or_else(|| anyhow!("unknown approval audit status: {status}"))?;
    let Json(user_snapshot): Json<UserSnapshot> = row.try_get("user_snapshot")?;
    Ok(ApprovalAudit {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        user_id: row.try_get("user_id")?,
        initiated_by: row.try_get("initiated_by")?,
        session_id: row.try_get("session_id")?,
        purpose: row.try_get("purpose")?,
        document_type: row.try_get("document_type")?,
        document_version: row.try_get("document_version")?,
        document_hash: row.try_get("document_hash")?,
        status,
        credential_id: row.try_get("credential_id")?,
        challenge_id: row.try_get("challenge_id")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        user_snapshot,
        context_data: row.try_get("context_data")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Keep only values Postgres will accept as `inet`.
fn valid_ip(ip: Option<&str>) -> Option<&str> {
    ip.filter(|value| value.parse::<IpAddr>().is_ok())
}

#[async_trait]
impl ApprovalStore for PgApprovalStore {
    async fn insert_session(&self, session: &ApprovalSession) -> Result<()> {
        let query = r"
            INSERT INTO approval_sessions
                (id, tenant_id, subject_user_id, created_by, purpose, document_type,
                 document_version, document_hash, context_data, approval_id, token_hash,
                 challenge_id, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ";
        sqlx::query(query)
            .bind(session.id)
            .bind(session.tenant_id)
            .bind(session.subject_user_id)
            .bind(session.created_by)
            .bind(&session.descriptor.purpose)
            .bind(&session.descriptor.document_type)
            .bind(&session.descriptor.document_version)
            .bind(&session.descriptor.document_hash)
            .bind(Value::Object(session.descriptor.extra.clone()))
            .bind(&session.approval_id)
            .bind(&session.token_hash)
            .bind(&session.challenge_id)
            .bind(session.created_at)
            .bind(session.expires_at)
            .execute(&self.pool)
            .await
            .context("failed to insert approval session")?;
        Ok(())
    }

    async fn set_challenge_id(&self, session_id: Uuid, challenge_id: &str) -> Result<()> {
        sqlx::query("UPDATE approval_sessions SET challenge_id = $2 WHERE id = $1")
            .bind(session_id)
            .bind(challenge_id)
            .execute(&self.pool)
            .await
            .context("failed to store approval challenge id")?;
        Ok(())
    }

    async fn find_session_by_token_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<ApprovalSession>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM approval_sessions WHERE token_hash = $1");
        let row = sqlx::query(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await
            .context("failed to lookup approval session")?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<ApprovalSession>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM approval_sessions WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load approval session")?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn claim_session(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<ClaimOutcome> {
        let query = r"
            UPDATE approval_sessions
            SET consumed_at = $2
            WHERE id = $1
              AND consumed_at IS NULL
              AND expires_at > $2
            RETURNING id
        ";
        let claimed = sqlx::query(query)
            .bind(session_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .context("failed to claim approval session")?;
        if claimed.is_some() {
            return Ok(ClaimOutcome::Claimed);
        }

        // Lost the claim: tell a concurrent winner apart from a passed deadline.
        let row = sqlx::query("SELECT consumed_at FROM approval_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to reload approval session")?
            .ok_or_else(|| anyhow!("approval session {session_id} not found"))?;
        let consumed_at: Option<DateTime<Utc>> = row.try_get("consumed_at")?;
        Ok(if consumed_at.is_some() {
            ClaimOutcome::AlreadyClaimed
        } else {
            ClaimOutcome::Expired
        })
    }

    async fn insert_audit(&self, audit: &ApprovalAudit) -> Result<()> {
        let query = r"
            INSERT INTO approval_audits
                (id, tenant_id, user_id, initiated_by, session_id, purpose, document_type,
                 document_version, document_hash, status, credential_id, challenge_id,
                 ip_address, user_agent, user_snapshot, context_data, error_message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    $13::inet, $14, $15, $16, $17, $18)
        ";
        sqlx::query(query)
            .bind(audit.id)
            .bind(audit.tenant_id)
            .bind(audit.user_id)
            .bind(audit.initiated_by)
            .bind(audit.session_id)
            .bind(&audit.purpose)
            .bind(&audit.document_type)
            .bind(&audit.document_version)
            .bind(&audit.document_hash)
            .bind(audit.status.as_str())
            .bind(&audit.credential_id)
            .bind(&audit.challenge_id)
            .bind(valid_ip(audit.ip_address.as_deref()))
            .bind(&audit.user_agent)
            .bind(Json(&audit.user_snapshot))
            .bind(&audit.context_data)
            .bind(audit.error_message.as_deref())
            .bind(audit.created_at)
            .execute(&self.pool)
            .await
            .context("failed to insert approval audit")?;
        Ok(())
    }

    async fn list_audits(&self, session_id: Uuid) -> Result<Vec<ApprovalAudit>> {
        let query = format!(
            "SELECT {AUDIT_COLUMNS} FROM approval_audits WHERE session_id = $1 ORDER BY created_at, id"
        );
        let rows = sqlx::query(&query)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .context("failed to list approval audits")?;
        rows.iter().map(audit_from_row).collect()
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::directory::UserSnapshot;

pub const DEFAULT_PURPOSE: &str = "terms_acceptance";
pub const DEFAULT_DOCUMENT_TYPE: &str = "terms";

/// What is being approved: purpose tag, document identity and caller extras.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDescriptor {
    pub purpose: String,
    pub document_type: String,
    pub document_version: String,
    pub document_hash: String,
    pub extra: Map<String, Value>,
}

impl Default for TransactionDescriptor {
    fn default() -> Self {
        Self {
            purpose: DEFAULT_PURPOSE.to_string(),
            document_type: DEFAULT_DOCUMENT_TYPE.to_string(),
            document_version: String::new(),
            document_hash: String::new(),
            extra: Map::new(),
        }
    }
}

/// One issued approval token.
///
/// Only the token hash is kept; `consumed_at` moves from `None` to `Some`
/// exactly once, through `ApprovalStore::claim_session`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalSession {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub subject_user_id: Uuid,
    pub created_by: Uuid,
    pub descriptor: TransactionDescriptor,
    pub approval_id: String,
    pub token_hash: Vec<u8>,
    pub challenge_id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl ApprovalSession {
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.consumed_at.is_some()
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Expired,
    Failed,
    Cancelled,
    Success,
}

impl AuditStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Success => "success",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "expired" => Some(Self::Expired),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            "success" => Some(Self::Success),
            _ => None,
        }
    }

    /// Terminal outcomes are the ones only a claim winner can produce.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Expired)
    }
}

/// Request origin recorded with every audit row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkMetadata {
    pub ip_address: Option<String>,
    pub user_agent: String,
}

/// Immutable record of one confirm attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalAudit {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub initiated_by: Uuid,
    pub session_id: Uuid,
    pub purpose: String,
    pub document_type: String,
    pub document_version: String,
    pub document_hash: String,
    pub status: AuditStatus,
    pub credential_id: String,
    pub challenge_id: String,
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub user_snapshot: UserSnapshot,
    pub context_data: Value,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

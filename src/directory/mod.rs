//! Identity and capability lookups consumed by the approval protocol.
//!
//! The directory answers four questions: who is calling, does the subject exist
//! inside the caller's tenant, what did the subject look like at this moment,
//! and does the subject have at least one active biometric credential.

mod memory;
mod postgres;

pub use memory::MemoryDirectory;
pub use postgres::PgDirectory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const TENANT_ADMIN_ROLES: [&str; 3] = ["tenant_admin", "superadmin", "admin"];

/// Authenticated caller of the issue endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub role: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl Actor {
    #[must_use]
    pub fn can_admin_tenant(&self) -> bool {
        TENANT_ADMIN_ROLES.contains(&self.role.as_str()) || self.is_staff || self.is_superuser
    }
}

/// Point-in-time copy of a user's identity, stored with every audit row.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Option<String>,
    pub username: Option<String>,
    pub tenant_id: Option<Uuid>,
    pub tenant_key: Option<String>,
    pub tenant_name: Option<String>,
}

impl UserSnapshot {
    /// Placeholder for a subject that no longer resolves in the directory.
    #[must_use]
    pub fn unresolved(id: Uuid, tenant_id: Uuid) -> Self {
        Self {
            id,
            tenant_id: Some(tenant_id),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait Directory: Send + Sync {
    /// Resolve a caller session token hash into an actor.
    async fn authenticate(&self, session_token_hash: &[u8]) -> Result<Option<Actor>>;

    /// Look up a user, but only if they belong to `tenant_id`.
    async fn find_user_in_tenant(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<UserSnapshot>>;

    async fn snapshot(&self, user_id: Uuid) -> Result<Option<UserSnapshot>>;

    async fn has_active_credentials(&self, user_id: Uuid) -> Result<bool>;
}

/// Hash a caller session token; only hashes are compared against storage.
#[must_use]
pub fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Actor, Directory, UserSnapshot};

#[derive(Default)]
struct Inner {
    sessions: HashMap<Vec<u8>, Actor>,
    users: HashMap<Uuid, UserSnapshot>,
    credentialed: HashSet<Uuid>,
}

/// In-process directory for single-node deployments and tests.
#[derive(Default)]
pub struct MemoryDirectory {
    inner: RwLock<Inner>,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: UserSnapshot) {
        self.inner.write().await.users.insert(user.id, user);
    }

    /// Register a caller session for `actor` under the given token hash.
    pub async fn insert_session(&self, session_token_hash: Vec<u8>, actor: Actor) {
        self.inner
            .write()
            .await
            .sessions
            .insert(session_token_hash, actor);
    }

    pub async fn set_active_credentials(&self, user_id: Uuid, active: bool) {
        let mut inner = self.inner.write().await;
        if active {
            inner.credentialed.insert(user_id);
        } else {
            inner.credentialed.remove(&user_id);
        }
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn authenticate(&self, session_token_hash: &[u8]) -> Result<Option<Actor>> {
        Ok(self
            .inner
            .read()
            .await
            .sessions
            .get(session_token_hash)
            .cloned())
    }

    async fn find_user_in_tenant(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<UserSnapshot>> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .get(&user_id)
            .filter(|user| user.tenant_id == Some(tenant_id))
            .cloned())
    }

    async fn snapshot(&self, user_id: Uuid) -> Result<Option<UserSnapshot>> {
        Ok(self.inner.read().await.users.get(&user_id).cloned())
    }

    async fn has_active_credentials(&self, user_id: Uuid) -> Result<bool> {
        Ok(self.inner.read().await.credentialed.contains(&user_id))
    }
}

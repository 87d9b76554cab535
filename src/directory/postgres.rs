use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::{Actor, Directory, UserSnapshot};

const SNAPSHOT_COLUMNS: &str = r"
    u.id, u.email, u.name, u.role, u.username, u.tenant_id,
    t.key AS tenant_key, t.name AS tenant_name
";

/// Directory backed by the `users`, `tenants`, `user_sessions` and
/// `webauthn_credentials` tables.
#[derive(Clone, Debug)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn snapshot_from_row(row: &PgRow) -> Result<UserSnapshot, sqlx::Error> {
    Ok(UserSnapshot {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        role: row.try_get("role")?,
        username: row.try_get("username")?,
        tenant_id: row.try_get("tenant_id")?,
        tenant_key: row.try_get("tenant_key")?,
        tenant_name: row.try_get("tenant_name")?,
    })
}

#[async_trait]
impl Directory for PgDirectory {
    async fn authenticate(&self, session_token_hash: &[u8]) -> Result<Option<Actor>> {
        let query = r"
            SELECT u.id, u.tenant_id, u.role, u.is_staff, u.is_superuser
            FROM user_sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.session_hash = $1
              AND s.expires_at > NOW()
              AND u.is_active = TRUE
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(session_token_hash)
            .fetch_optional(&self.pool)
            .await
            .context("failed to lookup caller session")?;

        row.map(|row| -> Result<Actor> {
            Ok(Actor {
                user_id: row.try_get("id")?,
                tenant_id: row.try_get("tenant_id")?,
                role: row.try_get("role")?,
                is_staff: row.try_get("is_staff")?,
                is_superuser: row.try_get("is_superuser")?,
            })
        })
        .transpose()
    }

    async fn find_user_in_tenant(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
    ) -> Result<Option<UserSnapshot>> {
        let query = format!(
            r"
            SELECT {SNAPSHOT_COLUMNS}
            FROM users u
            LEFT JOIN tenants t ON t.id = u.tenant_id
            WHERE u.id = $1
              AND u.tenant_id = $2
            LIMIT 1
            "
        );
        let row = sqlx::query(&query)
            .bind(user_id)
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to lookup subject user")?;

        row.as_ref()
            .map(snapshot_from_row)
            .transpose()
            .context("failed to decode subject user")
    }

    async fn snapshot(&self, user_id: Uuid) -> Result<Option<UserSnapshot>> {
        let query = format!(
            r"
            SELECT {SNAPSHOT_COLUMNS}
            FROM users u
            LEFT JOIN tenants t ON t.id = u.tenant_id
            WHERE u.id = $1
            LIMIT 1
            "
        );
        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load user snapshot")?;

        row.as_ref()
            .map(snapshot_from_row)
            .transpose()
            .context("failed to decode user snapshot")
    }

    async fn has_active_credentials(&self, user_id: Uuid) -> Result<bool> {
        let query = r"
            SELECT EXISTS (
                SELECT 1
                FROM webauthn_credentials
                WHERE user_id = $1
                  AND is_active = TRUE
            ) AS present
        ";
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .context("failed to check WebAuthn credentials")?;
        Ok(row.try_get("present")?)
    }
}

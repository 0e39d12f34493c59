//! PostgreSQL implementation of SessionRepository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use courier_core::entities::{SessionRecord, SessionStatus};
use courier_core::error::DomainError;
use courier_core::traits::{RepoResult, SessionRepository};
use courier_core::value_objects::{Identity, ProxyEndpoint, SessionId, WebhookTarget};

use crate::mappers::SessionInsert;
use crate::models::SessionModel;

use super::error::{map_db_error, map_unique_violation, require_affected};

const SESSION_COLUMNS: &str = "id, identity, status, proxy_url, proxy_insecure, webhook_url, \
                               last_seen, created_at, updated_at";

/// PostgreSQL implementation of SessionRepository
#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    /// Create a new PgSessionRepository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `sessions` table if it does not exist yet
    pub async fn ensure_schema(&self) -> RepoResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS sessions (
                id             VARCHAR(64) PRIMARY KEY,
                identity       TEXT,
                status         VARCHAR(16) NOT NULL DEFAULT 'disconnected',
                proxy_url      TEXT,
                proxy_insecure BOOLEAN NOT NULL DEFAULT FALSE,
                webhook_url    TEXT,
                last_seen      TIMESTAMPTZ,
                created_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(())
    }

    async fn fetch_many(&self, filter: &str) -> RepoResult<Vec<SessionRecord>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions {filter} ORDER BY created_at");
        let rows = sqlx::query_as::<_, SessionModel>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        rows.into_iter().map(SessionRecord::try_from).collect()
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    #[instrument(skip(self, record), fields(session_id = %record.id))]
    async fn create(&self, record: &SessionRecord) -> RepoResult<()> {
        let row = SessionInsert::new(record);
        sqlx::query(
            r"
            INSERT INTO sessions (id, identity, status, proxy_url, proxy_insecure, webhook_url,
                                  last_seen, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(row.id)
        .bind(row.identity)
        .bind(row.status)
        .bind(row.proxy_url)
        .bind(row.proxy_insecure)
        .bind(row.webhook_url)
        .bind(record.last_seen)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, || DomainError::SessionExists(record.id.clone())))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_by_id(&self, id: &SessionId) -> RepoResult<Option<SessionRecord>> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1");
        let result = sqlx::query_as::<_, SessionModel>(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;

        result.map(SessionRecord::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn find_all(&self) -> RepoResult<Vec<SessionRecord>> {
        self.fetch_many("").await
    }

    #[instrument(skip(self))]
    async fn find_with_identity(&self) -> RepoResult<Vec<SessionRecord>> {
        self.fetch_many("WHERE identity IS NOT NULL").await
    }

    #[instrument(skip(self))]
    async fn update_status(&self, id: &SessionId, status: SessionStatus) -> RepoResult<()> {
        let result = sqlx::query(
            r"
            UPDATE sessions
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id.as_str())
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        require_affected(result.rows_affected(), id)
    }

    #[instrument(skip(self))]
    async fn update_identity(
        &self,
        id: &SessionId,
        identity: Option<&Identity>,
    ) -> RepoResult<()> {
        let result = sqlx::query(
            r"
            UPDATE sessions
            SET identity = $2, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id.as_str())
        .bind(identity.map(Identity::as_str))
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        require_affected(result.rows_affected(), id)
    }

    #[instrument(skip(self))]
    async fn update_last_seen(&self, id: &SessionId, at: DateTime<Utc>) -> RepoResult<()> {
        let result = sqlx::query(
            r"
            UPDATE sessions
            SET last_seen = $2, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id.as_str())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        require_affected(result.rows_affected(), id)
    }

    #[instrument(skip(self))]
    async fn update_proxy(
        &self,
        id: &SessionId,
        proxy: Option<&ProxyEndpoint>,
    ) -> RepoResult<()> {
        let result = sqlx::query(
            r"
            UPDATE sessions
            SET proxy_url = $2, proxy_insecure = $3, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id.as_str())
        .bind(proxy.map(|p| p.url.as_str()))
        .bind(proxy.is_some_and(|p| p.insecure))
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        require_affected(result.rows_affected(), id)
    }

    #[instrument(skip(self))]
    async fn update_webhook(
        &self,
        id: &SessionId,
        webhook: Option<&WebhookTarget>,
    ) -> RepoResult<()> {
        let result = sqlx::query(
            r"
            UPDATE sessions
            SET webhook_url = $2, updated_at = NOW()
            WHERE id = $1
            ",
        )
        .bind(id.as_str())
        .bind(webhook.map(WebhookTarget::url))
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;

        require_affected(result.rows_affected(), id)
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &SessionId) -> RepoResult<()> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_db_error)?;

        // Deleting an absent row is not an error; removal is idempotent.
        Ok(())
    }
}

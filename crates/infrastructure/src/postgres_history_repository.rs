use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use learnspire_application::HistoryRepository;
use learnspire_core::{AppError, AppResult, UserId};
use learnspire_domain::{AssignmentId, HistoryId, RoleChange, RoleChangeRecord, RoleId};

/// PostgreSQL-backed reader for the append-only audit trail.
///
/// Writes go through the assignment repository so they share the writer's
/// transaction; this type only reads and purges.
#[derive(Clone)]
pub struct PostgresHistoryRepository {
    pool: PgPool,
}

impl PostgresHistoryRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct HistoryRow {
    id: uuid::Uuid,
    user_id: uuid::Uuid,
    role_id: uuid::Uuid,
    assignment_id: uuid::Uuid,
    change: serde_json::Value,
    changed_by: Option<uuid::Uuid>,
    changed_at: DateTime<Utc>,
    reason: String,
    context: serde_json::Value,
}

impl HistoryRow {
    fn into_record(self) -> AppResult<RoleChangeRecord> {
        let change: RoleChange = serde_json::from_value(self.change).map_err(|error| {
            AppError::Internal(format!("stored malformed change payload: {error}"))
        })?;

        Ok(RoleChangeRecord {
            id: HistoryId::from_uuid(self.id),
            user_id: UserId::from_uuid(self.user_id),
            role_id: RoleId::from_uuid(self.role_id),
            assignment_id: AssignmentId::from_uuid(self.assignment_id),
            change,
            changed_by: self.changed_by.map(UserId::from_uuid),
            changed_at: self.changed_at,
            reason: self.reason,
            context: self.context,
        })
    }
}

#[async_trait]
impl HistoryRepository for PostgresHistoryRepository {
    async fn list_for_user(&self, user_id: UserId) -> AppResult<Vec<RoleChangeRecord>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, user_id, role_id, assignment_id, change,
                   changed_by, changed_at, reason, context
            FROM role_change_history
            WHERE user_id = $1
            ORDER BY changed_at DESC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list audit records: {error}")))?;

        rows.into_iter().map(HistoryRow::into_record).collect()
    }

    async fn list_for_assignment(
        &self,
        assignment_id: AssignmentId,
    ) -> AppResult<Vec<RoleChangeRecord>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, user_id, role_id, assignment_id, change,
                   changed_by, changed_at, reason, context
            FROM role_change_history
            WHERE assignment_id = $1
            ORDER BY changed_at DESC
            "#,
        )
        .bind(assignment_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list audit records: {error}")))?;

        rows.into_iter().map(HistoryRow::into_record).collect()
    }

    async fn purge_for_user(&self, user_id: UserId) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM role_change_history
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to purge audit records: {error}"))
        })?;

        Ok(result.rows_affected())
    }
}

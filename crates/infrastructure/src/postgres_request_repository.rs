use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use learnspire_application::RequestRepository;
use learnspire_core::{AppError, AppResult, UserId};
use learnspire_domain::{RequestId, RequestStatus, RoleId, RoleRequest};

use crate::postgres_role_repository::is_unique_violation;

/// PostgreSQL-backed repository for role requests.
///
/// Pending uniqueness per (user, role) is a partial unique index, so the
/// check and the insert are one statement.
#[derive(Clone)]
pub struct PostgresRequestRepository {
    pool: PgPool,
}

impl PostgresRequestRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RequestRow {
    id: uuid::Uuid,
    user_id: uuid::Uuid,
    requested_role_id: uuid::Uuid,
    justification: String,
    supporting_documents: serde_json::Value,
    status: String,
    reviewed_by: Option<uuid::Uuid>,
    reviewed_at: Option<DateTime<Utc>>,
    review_notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RequestRow {
    fn into_request(self) -> AppResult<RoleRequest> {
        let status = RequestStatus::from_str(self.status.as_str()).map_err(|_| {
            AppError::Internal(format!("stored unknown request status '{}'", self.status))
        })?;
        let supporting_documents: Vec<String> =
            serde_json::from_value(self.supporting_documents).map_err(|error| {
                AppError::Internal(format!("stored malformed document list: {error}"))
            })?;

        Ok(RoleRequest {
            id: RequestId::from_uuid(self.id),
            user_id: UserId::from_uuid(self.user_id),
            requested_role_id: RoleId::from_uuid(self.requested_role_id),
            justification: self.justification,
            supporting_documents,
            status,
            reviewed_by: self.reviewed_by.map(UserId::from_uuid),
            reviewed_at: self.reviewed_at,
            review_notes: self.review_notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const REQUEST_COLUMNS: &str = r#"
    id,
    user_id,
    requested_role_id,
    justification,
    supporting_documents,
    status,
    reviewed_by,
    reviewed_at,
    review_notes,
    created_at,
    updated_at
"#;

#[async_trait]
impl RequestRepository for PostgresRequestRepository {
    async fn insert_pending(&self, request: RoleRequest) -> AppResult<()> {
        let supporting_documents =
            serde_json::to_value(&request.supporting_documents).map_err(|error| {
                AppError::Internal(format!("failed to serialize document list: {error}"))
            })?;

        sqlx::query(
            r#"
            INSERT INTO user_role_requests (
                id, user_id, requested_role_id, justification, supporting_documents,
                status, reviewed_by, reviewed_at, review_notes, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(request.user_id.as_uuid())
        .bind(request.requested_role_id.as_uuid())
        .bind(request.justification.as_str())
        .bind(supporting_documents)
        .bind(request.status.as_str())
        .bind(request.reviewed_by.map(|actor| actor.as_uuid()))
        .bind(request.reviewed_at)
        .bind(request.review_notes.as_deref())
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                return AppError::Conflict(format!(
                    "user '{}' already has a pending request for role '{}'",
                    request.user_id, request.requested_role_id
                ));
            }
            AppError::Internal(format!("failed to insert request: {error}"))
        })?;

        Ok(())
    }

    async fn persist_review(
        &self,
        request: RoleRequest,
        expected: RequestStatus,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE user_role_requests SET
                status = $2,
                reviewed_by = $3,
                reviewed_at = $4,
                review_notes = $5,
                updated_at = $6
            WHERE id = $1 AND status = $7
            "#,
        )
        .bind(request.id.as_uuid())
        .bind(request.status.as_str())
        .bind(request.reviewed_by.map(|actor| actor.as_uuid()))
        .bind(request.reviewed_at)
        .bind(request.review_notes.as_deref())
        .bind(request.updated_at)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to persist review: {error}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "request '{}' is no longer '{}'",
                request.id,
                expected.as_str()
            )));
        }
        Ok(())
    }

    async fn find_request(&self, request_id: RequestId) -> AppResult<Option<RoleRequest>> {
        let row = sqlx::query_as::<_, RequestRow>(
            format!("SELECT {REQUEST_COLUMNS} FROM user_role_requests WHERE id = $1").as_str(),
        )
        .bind(request_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load request: {error}")))?;

        row.map(RequestRow::into_request).transpose()
    }

    async fn list_pending(&self) -> AppResult<Vec<RoleRequest>> {
        let rows = sqlx::query_as::<_, RequestRow>(
            format!(
                r#"
                SELECT {REQUEST_COLUMNS}
                FROM user_role_requests
                WHERE status = 'pending'
                ORDER BY created_at
                "#
            )
            .as_str(),
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list requests: {error}")))?;

        rows.into_iter().map(RequestRow::into_request).collect()
    }

    async fn list_for_user(&self, user_id: UserId) -> AppResult<Vec<RoleRequest>> {
        let rows = sqlx::query_as::<_, RequestRow>(
            format!(
                r#"
                SELECT {REQUEST_COLUMNS}
                FROM user_role_requests
                WHERE user_id = $1
                ORDER BY created_at DESC
                "#
            )
            .as_str(),
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list requests: {error}")))?;

        rows.into_iter().map(RequestRow::into_request).collect()
    }

    async fn count_pending(&self) -> AppResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM user_role_requests
            WHERE status = 'pending'
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to count requests: {error}")))?;

        Ok(count.max(0) as u64)
    }
}

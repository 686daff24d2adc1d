use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use learnspire_application::{AssignmentRepository, IssuerQuota};
use learnspire_core::{AppError, AppResult, UserId};
use learnspire_domain::{
    AssignmentId, AssignmentStatus, RoleChangeRecord, RoleId, UserRoleAssignment,
};

/// PostgreSQL-backed repository for assignments and their audit records.
///
/// The write methods run their gating reads and both inserts inside one
/// transaction, with `FOR UPDATE` row locks where a concurrent writer could
/// otherwise slip between read and write.
#[derive(Clone)]
pub struct PostgresAssignmentRepository {
    pool: PgPool,
}

impl PostgresAssignmentRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AssignmentRow {
    id: uuid::Uuid,
    user_id: uuid::Uuid,
    role_id: uuid::Uuid,
    assigned_by: Option<uuid::Uuid>,
    assigned_at: DateTime<Utc>,
    status: String,
    effective_from: DateTime<Utc>,
    effective_until: Option<DateTime<Utc>>,
    assignment_reason: String,
    notes: String,
    revoked_by: Option<uuid::Uuid>,
    revoked_at: Option<DateTime<Utc>>,
    revocation_reason: Option<String>,
    updated_at: DateTime<Utc>,
}

impl AssignmentRow {
    fn into_assignment(self) -> AppResult<UserRoleAssignment> {
        let status = AssignmentStatus::from_str(self.status.as_str()).map_err(|_| {
            AppError::Internal(format!("stored unknown assignment status '{}'", self.status))
        })?;

        Ok(UserRoleAssignment {
            id: AssignmentId::from_uuid(self.id),
            user_id: UserId::from_uuid(self.user_id),
            role_id: RoleId::from_uuid(self.role_id),
            assigned_by: self.assigned_by.map(UserId::from_uuid),
            assigned_at: self.assigned_at,
            status,
            effective_from: self.effective_from,
            effective_until: self.effective_until,
            assignment_reason: self.assignment_reason,
            notes: self.notes,
            revoked_by: self.revoked_by.map(UserId::from_uuid),
            revoked_at: self.revoked_at,
            revocation_reason: self.revocation_reason,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RoleCountRow {
    role_id: uuid::Uuid,
    active_assignments: i64,
}

const ASSIGNMENT_COLUMNS: &str = r#"
    id,
    user_id,
    role_id,
    assigned_by,
    assigned_at,
    status,
    effective_from,
    effective_until,
    assignment_reason,
    notes,
    revoked_by,
    revoked_at,
    revocation_reason,
    updated_at
"#;

#[async_trait]
impl AssignmentRepository for PostgresAssignmentRepository {
    async fn insert_granted(
        &self,
        assignment: UserRoleAssignment,
        history: RoleChangeRecord,
        quota: Option<IssuerQuota>,
    ) -> AppResult<()> {
        let mut transaction = begin(&self.pool).await?;

        if let Some(quota) = quota {
            // Lock the issuer's active rows so two concurrent grants cannot
            // both pass the count.
            let issued = sqlx::query_scalar::<_, uuid::Uuid>(
                r#"
                SELECT id
                FROM user_role_assignments
                WHERE assigned_by = $1 AND status = 'active'
                FOR UPDATE
                "#,
            )
            .bind(quota.issued_by.as_uuid())
            .fetch_all(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to count issued grants: {error}"))
            })?
            .len() as u64;

            if issued >= u64::from(quota.max_active) {
                return Err(AppError::QuotaExceeded(format!(
                    "issuer '{}' already holds {issued} of {} allowed active grants",
                    quota.issued_by, quota.max_active
                )));
            }
        }

        sqlx::query(
            r#"
            INSERT INTO user_role_assignments (
                id, user_id, role_id, assigned_by, assigned_at, status,
                effective_from, effective_until, assignment_reason, notes,
                revoked_by, revoked_at, revocation_reason, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(assignment.id.as_uuid())
        .bind(assignment.user_id.as_uuid())
        .bind(assignment.role_id.as_uuid())
        .bind(assignment.assigned_by.map(|actor| actor.as_uuid()))
        .bind(assignment.assigned_at)
        .bind(assignment.status.as_str())
        .bind(assignment.effective_from)
        .bind(assignment.effective_until)
        .bind(assignment.assignment_reason.as_str())
        .bind(assignment.notes.as_str())
        .bind(assignment.revoked_by.map(|actor| actor.as_uuid()))
        .bind(assignment.revoked_at)
        .bind(assignment.revocation_reason.as_deref())
        .bind(assignment.updated_at)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            if crate::postgres_role_repository::is_unique_violation(&error) {
                return AppError::Conflict(format!(
                    "user '{}' already holds an active assignment of role '{}'",
                    assignment.user_id, assignment.role_id
                ));
            }
            AppError::Internal(format!("failed to insert assignment: {error}"))
        })?;

        insert_history(&mut transaction, &history).await?;
        commit(transaction).await
    }

    async fn persist_transition(
        &self,
        assignment: UserRoleAssignment,
        expected: AssignmentStatus,
        history: RoleChangeRecord,
    ) -> AppResult<()> {
        let mut transaction = begin(&self.pool).await?;

        let stored_status = sqlx::query_scalar::<_, String>(
            r#"
            SELECT status
            FROM user_role_assignments
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(assignment.id.as_uuid())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to lock assignment: {error}")))?
        .ok_or_else(|| {
            AppError::NotFound(format!("assignment '{}' not found", assignment.id))
        })?;

        if stored_status != expected.as_str() {
            return Err(AppError::Conflict(format!(
                "assignment '{}' moved from '{}' to '{stored_status}'",
                assignment.id,
                expected.as_str()
            )));
        }

        sqlx::query(
            r#"
            UPDATE user_role_assignments SET
                status = $2,
                effective_until = $3,
                revoked_by = $4,
                revoked_at = $5,
                revocation_reason = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(assignment.id.as_uuid())
        .bind(assignment.status.as_str())
        .bind(assignment.effective_until)
        .bind(assignment.revoked_by.map(|actor| actor.as_uuid()))
        .bind(assignment.revoked_at)
        .bind(assignment.revocation_reason.as_deref())
        .bind(assignment.updated_at)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            // The active-pair partial index fires when a reactivation would
            // create a second active row for the same (user, role).
            if crate::postgres_role_repository::is_unique_violation(&error) {
                return AppError::Conflict(format!(
                    "user '{}' already holds an active assignment of role '{}'",
                    assignment.user_id, assignment.role_id
                ));
            }
            AppError::Internal(format!("failed to persist transition: {error}"))
        })?;

        insert_history(&mut transaction, &history).await?;
        commit(transaction).await
    }

    async fn find_assignment(&self, id: AssignmentId) -> AppResult<Option<UserRoleAssignment>> {
        let row = sqlx::query_as::<_, AssignmentRow>(
            format!("SELECT {ASSIGNMENT_COLUMNS} FROM user_role_assignments WHERE id = $1")
                .as_str(),
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load assignment: {error}")))?;

        row.map(AssignmentRow::into_assignment).transpose()
    }

    async fn find_active_for_user_role(
        &self,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<Option<UserRoleAssignment>> {
        let row = sqlx::query_as::<_, AssignmentRow>(
            format!(
                r#"
                SELECT {ASSIGNMENT_COLUMNS}
                FROM user_role_assignments
                WHERE user_id = $1 AND role_id = $2 AND status = 'active'
                "#
            )
            .as_str(),
        )
        .bind(user_id.as_uuid())
        .bind(role_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load assignment: {error}")))?;

        row.map(AssignmentRow::into_assignment).transpose()
    }

    async fn list_active_for_user(
        &self,
        user_id: UserId,
    ) -> AppResult<Vec<UserRoleAssignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            format!(
                r#"
                SELECT {ASSIGNMENT_COLUMNS}
                FROM user_role_assignments
                WHERE user_id = $1 AND status = 'active'
                ORDER BY assigned_at
                "#
            )
            .as_str(),
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list assignments: {error}")))?;

        rows.into_iter()
            .map(AssignmentRow::into_assignment)
            .collect()
    }

    async fn count_active_issued_by(&self, issuer: UserId) -> AppResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM user_role_assignments
            WHERE assigned_by = $1 AND status = 'active'
            "#,
        )
        .bind(issuer.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to count issued grants: {error}"))
        })?;

        Ok(count.max(0) as u64)
    }

    async fn list_active_for_role(
        &self,
        role_id: RoleId,
    ) -> AppResult<Vec<UserRoleAssignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            format!(
                r#"
                SELECT {ASSIGNMENT_COLUMNS}
                FROM user_role_assignments
                WHERE role_id = $1 AND status = 'active'
                ORDER BY assigned_at
                "#
            )
            .as_str(),
        )
        .bind(role_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list assignments: {error}")))?;

        rows.into_iter()
            .map(AssignmentRow::into_assignment)
            .collect()
    }

    async fn list_active_due_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> AppResult<Vec<UserRoleAssignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            format!(
                r#"
                SELECT {ASSIGNMENT_COLUMNS}
                FROM user_role_assignments
                WHERE status = 'active'
                    AND effective_until IS NOT NULL
                    AND effective_until <= $1
                ORDER BY effective_until
                "#
            )
            .as_str(),
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list due assignments: {error}"))
        })?;

        rows.into_iter()
            .map(AssignmentRow::into_assignment)
            .collect()
    }

    async fn count_active_by_role(&self) -> AppResult<Vec<(RoleId, u64)>> {
        let rows = sqlx::query_as::<_, RoleCountRow>(
            r#"
            SELECT role_id, COUNT(*) AS active_assignments
            FROM user_role_assignments
            WHERE status = 'active'
            GROUP BY role_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to count assignments: {error}"))
        })?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    RoleId::from_uuid(row.role_id),
                    row.active_assignments.max(0) as u64,
                )
            })
            .collect())
    }
}

async fn begin(pool: &PgPool) -> AppResult<Transaction<'static, Postgres>> {
    pool.begin()
        .await
        .map_err(|error| AppError::Internal(format!("failed to begin transaction: {error}")))
}

async fn commit(transaction: Transaction<'static, Postgres>) -> AppResult<()> {
    transaction
        .commit()
        .await
        .map_err(|error| AppError::Internal(format!("failed to commit transaction: {error}")))
}

/// Appends one audit record inside the caller's transaction.
pub(crate) async fn insert_history(
    transaction: &mut Transaction<'static, Postgres>,
    record: &RoleChangeRecord,
) -> AppResult<()> {
    let change = serde_json::to_value(&record.change).map_err(|error| {
        AppError::Internal(format!("failed to serialize change payload: {error}"))
    })?;

    sqlx::query(
        r#"
        INSERT INTO role_change_history (
            id, user_id, role_id, assignment_id, change,
            changed_by, changed_at, reason, context
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(record.id.as_uuid())
    .bind(record.user_id.as_uuid())
    .bind(record.role_id.as_uuid())
    .bind(record.assignment_id.as_uuid())
    .bind(change)
    .bind(record.changed_by.map(|actor| actor.as_uuid()))
    .bind(record.changed_at)
    .bind(record.reason.as_str())
    .bind(record.context.clone())
    .execute(&mut **transaction)
    .await
    .map_err(|error| AppError::Internal(format!("failed to insert audit record: {error}")))?;

    Ok(())
}

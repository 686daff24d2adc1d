use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use learnspire_application::PermissionGroupRepository;
use learnspire_core::{AppError, AppResult};
use learnspire_domain::{GroupId, PermissionGroup, PermissionGroupAttachment, RoleId};

use crate::postgres_role_repository::is_unique_violation;

/// PostgreSQL-backed repository for permission groups and role attachments.
#[derive(Clone)]
pub struct PostgresPermissionGroupRepository {
    pool: PgPool,
}

impl PostgresPermissionGroupRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct GroupRow {
    id: uuid::Uuid,
    name: String,
    description: String,
    permissions: serde_json::Value,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GroupRow {
    fn into_group(self) -> AppResult<PermissionGroup> {
        let permissions: Vec<String> =
            serde_json::from_value(self.permissions).map_err(|error| {
                AppError::Internal(format!("stored malformed permission list: {error}"))
            })?;

        Ok(PermissionGroup {
            id: GroupId::from_uuid(self.id),
            name: self.name,
            description: self.description,
            permissions,
            is_active: self.is_active,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[async_trait]
impl PermissionGroupRepository for PostgresPermissionGroupRepository {
    async fn insert_group(&self, group: PermissionGroup) -> AppResult<()> {
        let permissions = serde_json::to_value(&group.permissions).map_err(|error| {
            AppError::Internal(format!("failed to serialize permission list: {error}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO role_permission_groups (
                id, name, description, permissions, is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(group.id.as_uuid())
        .bind(group.name.as_str())
        .bind(group.description.as_str())
        .bind(permissions)
        .bind(group.is_active)
        .bind(group.created_at)
        .bind(group.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                return AppError::Conflict(format!(
                    "permission group '{}' already exists",
                    group.name
                ));
            }
            AppError::Internal(format!("failed to insert permission group: {error}"))
        })?;

        Ok(())
    }

    async fn find_group(&self, group_id: GroupId) -> AppResult<Option<PermissionGroup>> {
        let row = sqlx::query_as::<_, GroupRow>(
            r#"
            SELECT id, name, description, permissions, is_active, created_at, updated_at
            FROM role_permission_groups
            WHERE id = $1
            "#,
        )
        .bind(group_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load permission group: {error}"))
        })?;

        row.map(GroupRow::into_group).transpose()
    }

    async fn find_group_by_name(&self, name: &str) -> AppResult<Option<PermissionGroup>> {
        let row = sqlx::query_as::<_, GroupRow>(
            r#"
            SELECT id, name, description, permissions, is_active, created_at, updated_at
            FROM role_permission_groups
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to load permission group: {error}"))
        })?;

        row.map(GroupRow::into_group).transpose()
    }

    async fn list_groups(&self) -> AppResult<Vec<PermissionGroup>> {
        let rows = sqlx::query_as::<_, GroupRow>(
            r#"
            SELECT id, name, description, permissions, is_active, created_at, updated_at
            FROM role_permission_groups
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list permission groups: {error}"))
        })?;

        rows.into_iter().map(GroupRow::into_group).collect()
    }

    async fn attach_group_to_role(
        &self,
        attachment: PermissionGroupAttachment,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO role_permission_attachments (role_id, group_id, assigned_at, assigned_by)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (role_id, group_id) DO NOTHING
            "#,
        )
        .bind(attachment.role_id.as_uuid())
        .bind(attachment.group_id.as_uuid())
        .bind(attachment.assigned_at)
        .bind(attachment.assigned_by.map(|actor| actor.as_uuid()))
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to attach group: {error}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_groups_for_role(&self, role_id: RoleId) -> AppResult<Vec<PermissionGroup>> {
        let rows = sqlx::query_as::<_, GroupRow>(
            r#"
            SELECT groups.id, groups.name, groups.description, groups.permissions,
                   groups.is_active, groups.created_at, groups.updated_at
            FROM role_permission_groups AS groups
            INNER JOIN role_permission_attachments AS attachments
                ON attachments.group_id = groups.id
            WHERE attachments.role_id = $1
            ORDER BY groups.name
            "#,
        )
        .bind(role_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to list permission groups: {error}"))
        })?;

        rows.into_iter().map(GroupRow::into_group).collect()
    }
}

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use learnspire_application::RoleRepository;
use learnspire_core::{AppError, AppResult};
use learnspire_domain::{
    HierarchyLevel, RoleCapabilities, RoleDefinition, RoleId, RoleKind,
};

/// PostgreSQL-backed repository for the role catalog.
#[derive(Clone)]
pub struct PostgresRoleRepository {
    pool: PgPool,
}

impl PostgresRoleRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RoleRow {
    id: uuid::Uuid,
    kind: String,
    display_name: String,
    description: String,
    hierarchy_level: i32,
    can_manage_users: bool,
    can_manage_courses: bool,
    can_manage_content: bool,
    can_view_analytics: bool,
    can_manage_payments: bool,
    can_manage_system: bool,
    can_moderate_forums: bool,
    can_support_users: bool,
    max_users_manageable: Option<i32>,
    is_active: bool,
    is_assignable: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl RoleRow {
    fn into_role(self) -> AppResult<RoleDefinition> {
        let kind = RoleKind::from_str(self.kind.as_str())
            .map_err(|_| AppError::Internal(format!("stored unknown role kind '{}'", self.kind)))?;
        let hierarchy_level = HierarchyLevel::new(self.hierarchy_level).map_err(|_| {
            AppError::Internal(format!(
                "stored invalid hierarchy level {}",
                self.hierarchy_level
            ))
        })?;
        let max_users_manageable = match self.max_users_manageable {
            Some(value) => Some(u32::try_from(value).map_err(|_| {
                AppError::Internal(format!("stored negative issuance cap {value}"))
            })?),
            None => None,
        };

        Ok(RoleDefinition {
            id: RoleId::from_uuid(self.id),
            kind,
            display_name: self.display_name,
            description: self.description,
            hierarchy_level,
            capabilities: RoleCapabilities {
                can_manage_users: self.can_manage_users,
                can_manage_courses: self.can_manage_courses,
                can_manage_content: self.can_manage_content,
                can_view_analytics: self.can_view_analytics,
                can_manage_payments: self.can_manage_payments,
                can_manage_system: self.can_manage_system,
                can_moderate_forums: self.can_moderate_forums,
                can_support_users: self.can_support_users,
            },
            max_users_manageable,
            is_active: self.is_active,
            is_assignable: self.is_assignable,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const ROLE_COLUMNS: &str = r#"
    id,
    kind,
    display_name,
    description,
    hierarchy_level,
    can_manage_users,
    can_manage_courses,
    can_manage_content,
    can_view_analytics,
    can_manage_payments,
    can_manage_system,
    can_moderate_forums,
    can_support_users,
    max_users_manageable,
    is_active,
    is_assignable,
    created_at,
    updated_at
"#;

#[async_trait]
impl RoleRepository for PostgresRoleRepository {
    async fn insert_role(&self, role: RoleDefinition) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO role_definitions (
                id, kind, display_name, description, hierarchy_level,
                can_manage_users, can_manage_courses, can_manage_content,
                can_view_analytics, can_manage_payments, can_manage_system,
                can_moderate_forums, can_support_users,
                max_users_manageable, is_active, is_assignable,
                created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18
            )
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(role.kind.as_str())
        .bind(role.display_name.as_str())
        .bind(role.description.as_str())
        .bind(role.hierarchy_level.value())
        .bind(role.capabilities.can_manage_users)
        .bind(role.capabilities.can_manage_courses)
        .bind(role.capabilities.can_manage_content)
        .bind(role.capabilities.can_view_analytics)
        .bind(role.capabilities.can_manage_payments)
        .bind(role.capabilities.can_manage_system)
        .bind(role.capabilities.can_moderate_forums)
        .bind(role.capabilities.can_support_users)
        .bind(role.max_users_manageable.map(i64::from))
        .bind(role.is_active)
        .bind(role.is_assignable)
        .bind(role.created_at)
        .bind(role.updated_at)
        .execute(&self.pool)
        .await;

        result
            .map_err(|error| {
                if is_unique_violation(&error) {
                    return AppError::Conflict(format!(
                        "role '{}' already exists",
                        role.kind.as_str()
                    ));
                }
                AppError::Internal(format!("failed to insert role: {error}"))
            })
            .map(|_| ())
    }

    async fn update_role(&self, role: RoleDefinition) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE role_definitions SET
                display_name = $2,
                description = $3,
                hierarchy_level = $4,
                can_manage_users = $5,
                can_manage_courses = $6,
                can_manage_content = $7,
                can_view_analytics = $8,
                can_manage_payments = $9,
                can_manage_system = $10,
                can_moderate_forums = $11,
                can_support_users = $12,
                max_users_manageable = $13,
                is_active = $14,
                is_assignable = $15,
                updated_at = $16
            WHERE id = $1
            "#,
        )
        .bind(role.id.as_uuid())
        .bind(role.display_name.as_str())
        .bind(role.description.as_str())
        .bind(role.hierarchy_level.value())
        .bind(role.capabilities.can_manage_users)
        .bind(role.capabilities.can_manage_courses)
        .bind(role.capabilities.can_manage_content)
        .bind(role.capabilities.can_view_analytics)
        .bind(role.capabilities.can_manage_payments)
        .bind(role.capabilities.can_manage_system)
        .bind(role.capabilities.can_moderate_forums)
        .bind(role.capabilities.can_support_users)
        .bind(role.max_users_manageable.map(i64::from))
        .bind(role.is_active)
        .bind(role.is_assignable)
        .bind(role.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update role: {error}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("role '{}' not found", role.id)));
        }
        Ok(())
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<RoleDefinition>> {
        let row = sqlx::query_as::<_, RoleRow>(
            format!("SELECT {ROLE_COLUMNS} FROM role_definitions WHERE id = $1").as_str(),
        )
        .bind(role_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load role: {error}")))?;

        row.map(RoleRow::into_role).transpose()
    }

    async fn find_role_by_kind(&self, kind: RoleKind) -> AppResult<Option<RoleDefinition>> {
        let row = sqlx::query_as::<_, RoleRow>(
            format!("SELECT {ROLE_COLUMNS} FROM role_definitions WHERE kind = $1").as_str(),
        )
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load role: {error}")))?;

        row.map(RoleRow::into_role).transpose()
    }

    async fn list_roles(&self) -> AppResult<Vec<RoleDefinition>> {
        let rows = sqlx::query_as::<_, RoleRow>(
            format!(
                "SELECT {ROLE_COLUMNS} FROM role_definitions ORDER BY hierarchy_level, kind"
            )
            .as_str(),
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list roles: {error}")))?;

        rows.into_iter().map(RoleRow::into_role).collect()
    }
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(database_error) = error {
        return database_error.code().as_deref() == Some("23505");
    }
    false
}

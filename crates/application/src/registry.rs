//! Role catalog: repository port and bootstrap/administration service.

use std::sync::Arc;

use async_trait::async_trait;
use learnspire_core::{AppError, AppResult};
use learnspire_domain::{
    RoleDefinition, RoleId, RoleKind, builtin_groups, builtin_roles,
};

use crate::clock::Clock;
use crate::permission_group_service::PermissionGroupRepository;

/// Repository port for role definitions.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Inserts a role definition. Fails `Conflict` when the kind is taken.
    async fn insert_role(&self, role: RoleDefinition) -> AppResult<()>;

    /// Replaces a stored role definition. Fails `NotFound` when missing.
    async fn update_role(&self, role: RoleDefinition) -> AppResult<()>;

    /// Returns one role by identifier.
    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<RoleDefinition>>;

    /// Returns one role by identity tag.
    async fn find_role_by_kind(&self, kind: RoleKind) -> AppResult<Option<RoleDefinition>>;

    /// Lists the whole catalog ordered by rank.
    async fn list_roles(&self) -> AppResult<Vec<RoleDefinition>>;
}

/// Counts of catalog entries created by a bootstrap run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BootstrapSummary {
    /// Role definitions created.
    pub roles_created: usize,
    /// Permission groups created.
    pub groups_created: usize,
}

/// Catalog service for the role and permission-group definitions.
///
/// Mutations here are the trusted bootstrap/administration path; delegation
/// rules only apply to assignments, not to the catalog itself.
#[derive(Clone)]
pub struct RoleRegistry {
    roles: Arc<dyn RoleRepository>,
    groups: Arc<dyn PermissionGroupRepository>,
    clock: Arc<dyn Clock>,
}

impl RoleRegistry {
    /// Creates a registry from its repositories.
    #[must_use]
    pub fn new(
        roles: Arc<dyn RoleRepository>,
        groups: Arc<dyn PermissionGroupRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            roles,
            groups,
            clock,
        }
    }

    /// Seeds the built-in role and permission-group catalogs. Idempotent:
    /// entries that already exist are left untouched.
    pub async fn bootstrap(&self) -> AppResult<BootstrapSummary> {
        let now = self.clock.now();
        let mut summary = BootstrapSummary::default();

        for role in builtin_roles(now)? {
            if self.roles.find_role_by_kind(role.kind).await?.is_none() {
                self.roles.insert_role(role).await?;
                summary.roles_created += 1;
            }
        }

        for group in builtin_groups(now)? {
            if self
                .groups
                .find_group_by_name(group.name.as_str())
                .await?
                .is_none()
            {
                self.groups.insert_group(group).await?;
                summary.groups_created += 1;
            }
        }

        Ok(summary)
    }

    /// Returns one role by identifier.
    pub async fn find_role(&self, role_id: RoleId) -> AppResult<Option<RoleDefinition>> {
        self.roles.find_role(role_id).await
    }

    /// Returns one role by identity tag.
    pub async fn find_role_by_kind(&self, kind: RoleKind) -> AppResult<Option<RoleDefinition>> {
        self.roles.find_role_by_kind(kind).await
    }

    /// Lists the whole catalog.
    pub async fn list_roles(&self) -> AppResult<Vec<RoleDefinition>> {
        self.roles.list_roles().await
    }

    /// Lists roles currently open to new assignments.
    pub async fn list_assignable_roles(&self) -> AppResult<Vec<RoleDefinition>> {
        let roles = self.roles.list_roles().await?;
        Ok(roles
            .into_iter()
            .filter(|role| role.is_active && role.is_assignable)
            .collect())
    }

    /// Activates or deactivates a role.
    ///
    /// Deactivation closes the role to new assignments only; grants already
    /// issued under it keep their privilege.
    pub async fn set_role_active(&self, role_id: RoleId, is_active: bool) -> AppResult<()> {
        let mut role = self.require_role(role_id).await?;
        role.is_active = is_active;
        role.updated_at = self.clock.now();
        self.roles.update_role(role).await
    }

    /// Opens or closes a role for new assignments.
    pub async fn set_role_assignable(
        &self,
        role_id: RoleId,
        is_assignable: bool,
    ) -> AppResult<()> {
        let mut role = self.require_role(role_id).await?;
        role.is_assignable = is_assignable;
        role.updated_at = self.clock.now();
        self.roles.update_role(role).await
    }

    async fn require_role(&self, role_id: RoleId) -> AppResult<RoleDefinition> {
        self.roles
            .find_role(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' not found")))
    }
}

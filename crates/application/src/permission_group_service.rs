//! Permission group catalog: capability bundles attachable to roles.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use learnspire_core::{AppError, AppResult, NonEmptyString, UserId};
use learnspire_domain::{GroupId, PermissionGroup, PermissionGroupAttachment, RoleId};

use crate::assignment_service::RoleAssignmentService;
use crate::clock::Clock;
use crate::guard;
use crate::registry::RoleRepository;

/// Repository port for permission groups and their role attachments.
#[async_trait]
pub trait PermissionGroupRepository: Send + Sync {
    /// Inserts a group. Fails `Conflict` when the name is taken.
    async fn insert_group(&self, group: PermissionGroup) -> AppResult<()>;

    /// Returns one group by identifier.
    async fn find_group(&self, group_id: GroupId) -> AppResult<Option<PermissionGroup>>;

    /// Returns one group by unique name.
    async fn find_group_by_name(&self, name: &str) -> AppResult<Option<PermissionGroup>>;

    /// Lists all groups ordered by name.
    async fn list_groups(&self) -> AppResult<Vec<PermissionGroup>>;

    /// Records a role/group attachment. Idempotent; returns whether a new
    /// join record was created.
    async fn attach_group_to_role(
        &self,
        attachment: PermissionGroupAttachment,
    ) -> AppResult<bool>;

    /// Lists the groups attached to a role.
    async fn list_groups_for_role(&self, role_id: RoleId) -> AppResult<Vec<PermissionGroup>>;
}

/// Input payload for creating a permission group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateGroupInput {
    /// Unique group name.
    pub name: String,
    /// Longer description of the bundle.
    pub description: String,
    /// Capability identifiers in the bundle.
    pub permissions: Vec<String>,
}

/// Application service for the permission group catalog.
#[derive(Clone)]
pub struct PermissionGroupService {
    groups: Arc<dyn PermissionGroupRepository>,
    roles: Arc<dyn RoleRepository>,
    assignments: RoleAssignmentService,
    clock: Arc<dyn Clock>,
}

impl PermissionGroupService {
    /// Creates a new service from its dependencies.
    #[must_use]
    pub fn new(
        groups: Arc<dyn PermissionGroupRepository>,
        roles: Arc<dyn RoleRepository>,
        assignments: RoleAssignmentService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            groups,
            roles,
            assignments,
            clock,
        }
    }

    /// Creates a permission group on behalf of `actor`.
    pub async fn create_group(
        &self,
        actor: UserId,
        input: CreateGroupInput,
    ) -> AppResult<PermissionGroup> {
        let now = self.clock.now();
        let actor_primary = self.assignments.resolve_active_primary(actor, now).await?;
        guard::authorize_permission_management(actor_primary.as_ref())?;

        let group = PermissionGroup::new(
            NonEmptyString::new(input.name)?,
            input.description,
            input.permissions,
            now,
        );
        self.groups.insert_group(group.clone()).await?;
        Ok(group)
    }

    /// Attaches a group to a role on behalf of `actor`. Idempotent; returns
    /// whether a new join record was created.
    pub async fn attach_group_to_role(
        &self,
        actor: UserId,
        role_id: RoleId,
        group_id: GroupId,
    ) -> AppResult<bool> {
        let now = self.clock.now();
        let actor_primary = self.assignments.resolve_active_primary(actor, now).await?;
        guard::authorize_permission_management(actor_primary.as_ref())?;

        if self.roles.find_role(role_id).await?.is_none() {
            return Err(AppError::NotFound(format!("role '{role_id}' not found")));
        }

        if self.groups.find_group(group_id).await?.is_none() {
            return Err(AppError::NotFound(format!(
                "permission group '{group_id}' not found"
            )));
        }

        self.groups
            .attach_group_to_role(PermissionGroupAttachment {
                role_id,
                group_id,
                assigned_at: now,
                assigned_by: Some(actor),
            })
            .await
    }

    /// Lists all permission groups.
    pub async fn list_groups(&self) -> AppResult<Vec<PermissionGroup>> {
        self.groups.list_groups().await
    }

    /// Lists the groups attached to a role.
    pub async fn groups_for_role(&self, role_id: RoleId) -> AppResult<Vec<PermissionGroup>> {
        self.groups.list_groups_for_role(role_id).await
    }

    /// Returns the deduplicated capability identifiers a role gains from its
    /// active attached groups.
    pub async fn capabilities_for_role(&self, role_id: RoleId) -> AppResult<BTreeSet<String>> {
        let groups = self.groups.list_groups_for_role(role_id).await?;
        let mut capabilities = BTreeSet::new();
        for group in groups {
            if !group.is_active {
                continue;
            }
            capabilities.extend(group.permissions);
        }
        Ok(capabilities)
    }
}

#[cfg(test)]
mod tests;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use learnspire_application::{
    AssignmentRepository, HistoryRepository, IdentityDirectory, IssuerQuota,
    PermissionGroupRepository, RequestRepository, RoleRepository,
};
use learnspire_core::{AppError, AppResult, UserId};
use learnspire_domain::{
    AssignmentId, AssignmentStatus, GroupId, PermissionGroup, PermissionGroupAttachment,
    RequestId, RequestStatus, RoleChangeRecord, RoleDefinition, RoleId, RoleKind, RoleRequest,
    UserRoleAssignment,
};

#[derive(Default)]
struct StoreState {
    roles: HashMap<RoleId, RoleDefinition>,
    assignments: HashMap<AssignmentId, UserRoleAssignment>,
    history: Vec<RoleChangeRecord>,
    groups: HashMap<GroupId, PermissionGroup>,
    attachments: Vec<PermissionGroupAttachment>,
    requests: HashMap<RequestId, RoleRequest>,
}

/// In-memory implementation of every engine repository port.
///
/// One lock guards all tables, so the gate-read-plus-write methods hold the
/// same consistency guarantees the PostgreSQL adapters get from their
/// transactions. Suitable for local development and integration tests.
#[derive(Default)]
pub struct InMemoryRoleStore {
    state: Mutex<StoreState>,
}

impl InMemoryRoleStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoleRepository for InMemoryRoleStore {
    async fn insert_role(&self, role: RoleDefinition) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.roles.values().any(|stored| stored.kind == role.kind) {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists",
                role.kind.as_str()
            )));
        }
        state.roles.insert(role.id, role);
        Ok(())
    }

    async fn update_role(&self, role: RoleDefinition) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if !state.roles.contains_key(&role.id) {
            return Err(AppError::NotFound(format!("role '{}' not found", role.id)));
        }
        state.roles.insert(role.id, role);
        Ok(())
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<RoleDefinition>> {
        Ok(self.state.lock().await.roles.get(&role_id).cloned())
    }

    async fn find_role_by_kind(&self, kind: RoleKind) -> AppResult<Option<RoleDefinition>> {
        let state = self.state.lock().await;
        Ok(state
            .roles
            .values()
            .find(|role| role.kind == kind)
            .cloned())
    }

    async fn list_roles(&self) -> AppResult<Vec<RoleDefinition>> {
        let state = self.state.lock().await;
        let mut roles: Vec<RoleDefinition> = state.roles.values().cloned().collect();
        roles.sort_by_key(|role| (role.hierarchy_level.value(), role.kind.as_str()));
        Ok(roles)
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryRoleStore {
    async fn insert_granted(
        &self,
        assignment: UserRoleAssignment,
        history: RoleChangeRecord,
        quota: Option<IssuerQuota>,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;

        let duplicate = state.assignments.values().any(|stored| {
            stored.user_id == assignment.user_id
                && stored.role_id == assignment.role_id
                && stored.status == AssignmentStatus::Active
        });
        if duplicate {
            return Err(AppError::Conflict(format!(
                "user '{}' already holds an active assignment of role '{}'",
                assignment.user_id, assignment.role_id
            )));
        }

        if let Some(quota) = quota {
            let issued = state
                .assignments
                .values()
                .filter(|stored| {
                    stored.assigned_by == Some(quota.issued_by)
                        && stored.status == AssignmentStatus::Active
                })
                .count() as u64;
            if issued >= u64::from(quota.max_active) {
                return Err(AppError::QuotaExceeded(format!(
                    "issuer '{}' already holds {issued} of {} allowed active grants",
                    quota.issued_by, quota.max_active
                )));
            }
        }

        state.assignments.insert(assignment.id, assignment);
        state.history.push(history);
        Ok(())
    }

    async fn persist_transition(
        &self,
        assignment: UserRoleAssignment,
        expected: AssignmentStatus,
        history: RoleChangeRecord,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;

        let Some(stored) = state.assignments.get(&assignment.id) else {
            return Err(AppError::NotFound(format!(
                "assignment '{}' not found",
                assignment.id
            )));
        };
        if stored.status != expected {
            return Err(AppError::Conflict(format!(
                "assignment '{}' moved from '{}' to '{}'",
                assignment.id,
                expected.as_str(),
                stored.status.as_str()
            )));
        }

        // A transition back into active must re-check pair uniqueness: a
        // fresh active row may have landed while this one sat suspended.
        if assignment.status == AssignmentStatus::Active {
            let duplicate = state.assignments.values().any(|other| {
                other.id != assignment.id
                    && other.user_id == assignment.user_id
                    && other.role_id == assignment.role_id
                    && other.status == AssignmentStatus::Active
            });
            if duplicate {
                return Err(AppError::Conflict(format!(
                    "user '{}' already holds an active assignment of role '{}'",
                    assignment.user_id, assignment.role_id
                )));
            }
        }

        state.assignments.insert(assignment.id, assignment);
        state.history.push(history);
        Ok(())
    }

    async fn find_assignment(&self, id: AssignmentId) -> AppResult<Option<UserRoleAssignment>> {
        Ok(self.state.lock().await.assignments.get(&id).cloned())
    }

    async fn find_active_for_user_role(
        &self,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<Option<UserRoleAssignment>> {
        let state = self.state.lock().await;
        Ok(state
            .assignments
            .values()
            .find(|assignment| {
                assignment.user_id == user_id
                    && assignment.role_id == role_id
                    && assignment.status == AssignmentStatus::Active
            })
            .cloned())
    }

    async fn list_active_for_user(
        &self,
        user_id: UserId,
    ) -> AppResult<Vec<UserRoleAssignment>> {
        let state = self.state.lock().await;
        let mut assignments: Vec<UserRoleAssignment> = state
            .assignments
            .values()
            .filter(|assignment| {
                assignment.user_id == user_id && assignment.status == AssignmentStatus::Active
            })
            .cloned()
            .collect();
        assignments.sort_by_key(|assignment| assignment.assigned_at);
        Ok(assignments)
    }

    async fn count_active_issued_by(&self, issuer: UserId) -> AppResult<u64> {
        let state = self.state.lock().await;
        Ok(state
            .assignments
            .values()
            .filter(|assignment| {
                assignment.assigned_by == Some(issuer)
                    && assignment.status == AssignmentStatus::Active
            })
            .count() as u64)
    }

    async fn list_active_for_role(
        &self,
        role_id: RoleId,
    ) -> AppResult<Vec<UserRoleAssignment>> {
        let state = self.state.lock().await;
        let mut assignments: Vec<UserRoleAssignment> = state
            .assignments
            .values()
            .filter(|assignment| {
                assignment.role_id == role_id && assignment.status == AssignmentStatus::Active
            })
            .cloned()
            .collect();
        assignments.sort_by_key(|assignment| assignment.assigned_at);
        Ok(assignments)
    }

    async fn list_active_due_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> AppResult<Vec<UserRoleAssignment>> {
        let state = self.state.lock().await;
        let mut assignments: Vec<UserRoleAssignment> = state
            .assignments
            .values()
            .filter(|assignment| {
                assignment.status == AssignmentStatus::Active
                    && assignment
                        .effective_until
                        .is_some_and(|until| until <= cutoff)
            })
            .cloned()
            .collect();
        assignments.sort_by_key(|assignment| assignment.effective_until);
        Ok(assignments)
    }

    async fn count_active_by_role(&self) -> AppResult<Vec<(RoleId, u64)>> {
        let state = self.state.lock().await;
        let mut counts: HashMap<RoleId, u64> = HashMap::new();
        for assignment in state.assignments.values() {
            if assignment.status == AssignmentStatus::Active {
                *counts.entry(assignment.role_id).or_insert(0) += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }
}

#[async_trait]
impl HistoryRepository for InMemoryRoleStore {
    async fn list_for_user(&self, user_id: UserId) -> AppResult<Vec<RoleChangeRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<RoleChangeRecord> = state
            .history
            .iter()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|left, right| right.changed_at.cmp(&left.changed_at));
        Ok(records)
    }

    async fn list_for_assignment(
        &self,
        assignment_id: AssignmentId,
    ) -> AppResult<Vec<RoleChangeRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<RoleChangeRecord> = state
            .history
            .iter()
            .filter(|record| record.assignment_id == assignment_id)
            .cloned()
            .collect();
        records.sort_by(|left, right| right.changed_at.cmp(&left.changed_at));
        Ok(records)
    }

    async fn purge_for_user(&self, user_id: UserId) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.history.len();
        state.history.retain(|record| record.user_id != user_id);
        Ok((before - state.history.len()) as u64)
    }
}

#[async_trait]
impl PermissionGroupRepository for InMemoryRoleStore {
    async fn insert_group(&self, group: PermissionGroup) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.groups.values().any(|stored| stored.name == group.name) {
            return Err(AppError::Conflict(format!(
                "permission group '{}' already exists",
                group.name
            )));
        }
        state.groups.insert(group.id, group);
        Ok(())
    }

    async fn find_group(&self, group_id: GroupId) -> AppResult<Option<PermissionGroup>> {
        Ok(self.state.lock().await.groups.get(&group_id).cloned())
    }

    async fn find_group_by_name(&self, name: &str) -> AppResult<Option<PermissionGroup>> {
        let state = self.state.lock().await;
        Ok(state
            .groups
            .values()
            .find(|group| group.name == name)
            .cloned())
    }

    async fn list_groups(&self) -> AppResult<Vec<PermissionGroup>> {
        let state = self.state.lock().await;
        let mut groups: Vec<PermissionGroup> = state.groups.values().cloned().collect();
        groups.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(groups)
    }

    async fn attach_group_to_role(
        &self,
        attachment: PermissionGroupAttachment,
    ) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let exists = state.attachments.iter().any(|stored| {
            stored.role_id == attachment.role_id && stored.group_id == attachment.group_id
        });
        if exists {
            return Ok(false);
        }
        state.attachments.push(attachment);
        Ok(true)
    }

    async fn list_groups_for_role(&self, role_id: RoleId) -> AppResult<Vec<PermissionGroup>> {
        let state = self.state.lock().await;
        let mut groups: Vec<PermissionGroup> = state
            .attachments
            .iter()
            .filter(|attachment| attachment.role_id == role_id)
            .filter_map(|attachment| state.groups.get(&attachment.group_id).cloned())
            .collect();
        groups.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(groups)
    }
}

#[async_trait]
impl RequestRepository for InMemoryRoleStore {
    async fn insert_pending(&self, request: RoleRequest) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let duplicate = state.requests.values().any(|stored| {
            stored.user_id == request.user_id
                && stored.requested_role_id == request.requested_role_id
                && stored.status == RequestStatus::Pending
        });
        if duplicate {
            return Err(AppError::Conflict(format!(
                "user '{}' already has a pending request for role '{}'",
                request.user_id, request.requested_role_id
            )));
        }
        state.requests.insert(request.id, request);
        Ok(())
    }

    async fn persist_review(
        &self,
        request: RoleRequest,
        expected: RequestStatus,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let Some(stored) = state.requests.get(&request.id) else {
            return Err(AppError::NotFound(format!(
                "request '{}' not found",
                request.id
            )));
        };
        if stored.status != expected {
            return Err(AppError::Conflict(format!(
                "request '{}' is no longer '{}'",
                request.id,
                expected.as_str()
            )));
        }
        state.requests.insert(request.id, request);
        Ok(())
    }

    async fn find_request(&self, request_id: RequestId) -> AppResult<Option<RoleRequest>> {
        Ok(self.state.lock().await.requests.get(&request_id).cloned())
    }

    async fn list_pending(&self) -> AppResult<Vec<RoleRequest>> {
        let state = self.state.lock().await;
        let mut requests: Vec<RoleRequest> = state
            .requests
            .values()
            .filter(|request| request.status == RequestStatus::Pending)
            .cloned()
            .collect();
        requests.sort_by_key(|request| request.created_at);
        Ok(requests)
    }

    async fn list_for_user(&self, user_id: UserId) -> AppResult<Vec<RoleRequest>> {
        let state = self.state.lock().await;
        let mut requests: Vec<RoleRequest> = state
            .requests
            .values()
            .filter(|request| request.user_id == user_id)
            .cloned()
            .collect();
        requests.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(requests)
    }

    async fn count_pending(&self) -> AppResult<u64> {
        let state = self.state.lock().await;
        Ok(state
            .requests
            .values()
            .filter(|request| request.status == RequestStatus::Pending)
            .count() as u64)
    }
}

/// In-memory identity lookup over a registered user set.
#[derive(Default)]
pub struct InMemoryIdentityDirectory {
    users: RwLock<Vec<UserId>>,
}

impl InMemoryIdentityDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user so lookups succeed.
    pub async fn register(&self, user_id: UserId) {
        let mut users = self.users.write().await;
        if !users.contains(&user_id) {
            users.push(user_id);
        }
    }
}

#[async_trait]
impl IdentityDirectory for InMemoryIdentityDirectory {
    async fn user_exists(&self, user_id: UserId) -> AppResult<bool> {
        Ok(self.users.read().await.contains(&user_id))
    }
}

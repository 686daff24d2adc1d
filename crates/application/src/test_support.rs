//! Shared in-memory fixtures for service tests.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use learnspire_core::{AppError, AppResult, UserId};
use learnspire_domain::{
    AssignmentId, AssignmentStatus, GroupId, PermissionGroup, PermissionGroupAttachment,
    RequestId, RequestStatus, RoleChangeRecord, RoleDefinition, RoleId, RoleKind, RoleRequest,
    UserRoleAssignment,
};
use tokio::sync::Mutex;

use crate::assignment_service::{
    AssignmentRepository, HistoryRepository, IdentityDirectory, IssuerQuota, RoleAssignmentService,
    RoleEvent, RoleEventPublisher,
};
use crate::clock::{Clock, ManualClock};
use crate::permission_group_service::{PermissionGroupRepository, PermissionGroupService};
use crate::registry::{RoleRegistry, RoleRepository};
use crate::request_service::{RequestRepository, RoleRequestService};

#[derive(Default)]
struct State {
    users: HashSet<UserId>,
    roles: Vec<RoleDefinition>,
    assignments: Vec<UserRoleAssignment>,
    history: Vec<RoleChangeRecord>,
    groups: Vec<PermissionGroup>,
    attachments: Vec<PermissionGroupAttachment>,
    requests: Vec<RoleRequest>,
}

/// Fake store implementing every repository port behind one lock, so the
/// gate-read-plus-write methods are naturally atomic.
#[derive(Default)]
pub(crate) struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub(crate) async fn add_user(&self) -> UserId {
        let user_id = UserId::new();
        self.state.lock().await.users.insert(user_id);
        user_id
    }

    pub(crate) async fn assignment(&self, id: AssignmentId) -> Option<UserRoleAssignment> {
        self.state
            .lock()
            .await
            .assignments
            .iter()
            .find(|assignment| assignment.id == id)
            .cloned()
    }

    pub(crate) async fn history_len(&self) -> usize {
        self.state.lock().await.history.len()
    }
}

#[async_trait]
impl RoleRepository for MemoryStore {
    async fn insert_role(&self, role: RoleDefinition) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.roles.iter().any(|stored| stored.kind == role.kind) {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists",
                role.kind.as_str()
            )));
        }
        state.roles.push(role);
        Ok(())
    }

    async fn update_role(&self, role: RoleDefinition) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let Some(stored) = state.roles.iter_mut().find(|stored| stored.id == role.id) else {
            return Err(AppError::NotFound(format!("role '{}' not found", role.id)));
        };
        *stored = role;
        Ok(())
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<RoleDefinition>> {
        let state = self.state.lock().await;
        Ok(state.roles.iter().find(|role| role.id == role_id).cloned())
    }

    async fn find_role_by_kind(&self, kind: RoleKind) -> AppResult<Option<RoleDefinition>> {
        let state = self.state.lock().await;
        Ok(state.roles.iter().find(|role| role.kind == kind).cloned())
    }

    async fn list_roles(&self) -> AppResult<Vec<RoleDefinition>> {
        let state = self.state.lock().await;
        let mut roles = state.roles.clone();
        roles.sort_by_key(|role| role.hierarchy_level.value());
        Ok(roles)
    }
}

#[async_trait]
impl AssignmentRepository for MemoryStore {
    async fn insert_granted(
        &self,
        assignment: UserRoleAssignment,
        history: RoleChangeRecord,
        quota: Option<IssuerQuota>,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let duplicate = state.assignments.iter().any(|stored| {
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
                .iter()
                .filter(|stored| {
                    stored.assigned_by == Some(quota.issued_by)
                        && stored.status == AssignmentStatus::Active
                })
                .count() as u64;
            if issued >= u64::from(quota.max_active) {
                return Err(AppError::QuotaExceeded(format!(
                    "issuer '{}' reached {} active grants",
                    quota.issued_by, quota.max_active
                )));
            }
        }

        state.assignments.push(assignment);
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
        let Some(index) = state
            .assignments
            .iter()
            .position(|stored| stored.id == assignment.id)
        else {
            return Err(AppError::NotFound(format!(
                "assignment '{}' not found",
                assignment.id
            )));
        };
        if state.assignments[index].status != expected {
            return Err(AppError::Conflict(format!(
                "assignment '{}' moved from '{}' to '{}'",
                assignment.id,
                expected.as_str(),
                state.assignments[index].status.as_str()
            )));
        }

        // A transition back into active must re-check pair uniqueness: a
        // fresh active row may have landed while this one sat suspended.
        if assignment.status == AssignmentStatus::Active {
            let duplicate = state.assignments.iter().any(|other| {
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

        state.assignments[index] = assignment;
        state.history.push(history);
        Ok(())
    }

    async fn find_assignment(&self, id: AssignmentId) -> AppResult<Option<UserRoleAssignment>> {
        Ok(self.assignment(id).await)
    }

    async fn find_active_for_user_role(
        &self,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<Option<UserRoleAssignment>> {
        let state = self.state.lock().await;
        Ok(state
            .assignments
            .iter()
            .find(|assignment| {
                assignment.user_id == user_id
                    && assignment.role_id == role_id
                    && assignment.status == AssignmentStatus::Active
            })
            .cloned())
    }

    async fn list_active_for_user(&self, user_id: UserId) -> AppResult<Vec<UserRoleAssignment>> {
        let state = self.state.lock().await;
        Ok(state
            .assignments
            .iter()
            .filter(|assignment| {
                assignment.user_id == user_id && assignment.status == AssignmentStatus::Active
            })
            .cloned()
            .collect())
    }

    async fn count_active_issued_by(&self, issuer: UserId) -> AppResult<u64> {
        let state = self.state.lock().await;
        Ok(state
            .assignments
            .iter()
            .filter(|assignment| {
                assignment.assigned_by == Some(issuer)
                    && assignment.status == AssignmentStatus::Active
            })
            .count() as u64)
    }

    async fn list_active_for_role(&self, role_id: RoleId) -> AppResult<Vec<UserRoleAssignment>> {
        let state = self.state.lock().await;
        Ok(state
            .assignments
            .iter()
            .filter(|assignment| {
                assignment.role_id == role_id && assignment.status == AssignmentStatus::Active
            })
            .cloned()
            .collect())
    }

    async fn list_active_due_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> AppResult<Vec<UserRoleAssignment>> {
        let state = self.state.lock().await;
        Ok(state
            .assignments
            .iter()
            .filter(|assignment| {
                assignment.status == AssignmentStatus::Active
                    && assignment
                        .effective_until
                        .is_some_and(|until| until <= cutoff)
            })
            .cloned()
            .collect())
    }

    async fn count_active_by_role(&self) -> AppResult<Vec<(RoleId, u64)>> {
        let state = self.state.lock().await;
        let mut counts: Vec<(RoleId, u64)> = Vec::new();
        for assignment in &state.assignments {
            if assignment.status != AssignmentStatus::Active {
                continue;
            }
            match counts
                .iter_mut()
                .find(|(role_id, _)| *role_id == assignment.role_id)
            {
                Some((_, count)) => *count += 1,
                None => counts.push((assignment.role_id, 1)),
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl HistoryRepository for MemoryStore {
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
impl IdentityDirectory for MemoryStore {
    async fn user_exists(&self, user_id: UserId) -> AppResult<bool> {
        Ok(self.state.lock().await.users.contains(&user_id))
    }
}

#[async_trait]
impl PermissionGroupRepository for MemoryStore {
    async fn insert_group(&self, group: PermissionGroup) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.groups.iter().any(|stored| stored.name == group.name) {
            return Err(AppError::Conflict(format!(
                "permission group '{}' already exists",
                group.name
            )));
        }
        state.groups.push(group);
        Ok(())
    }

    async fn find_group(&self, group_id: GroupId) -> AppResult<Option<PermissionGroup>> {
        let state = self.state.lock().await;
        Ok(state.groups.iter().find(|group| group.id == group_id).cloned())
    }

    async fn find_group_by_name(&self, name: &str) -> AppResult<Option<PermissionGroup>> {
        let state = self.state.lock().await;
        Ok(state.groups.iter().find(|group| group.name == name).cloned())
    }

    async fn list_groups(&self) -> AppResult<Vec<PermissionGroup>> {
        let state = self.state.lock().await;
        let mut groups = state.groups.clone();
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

    async fn list_groups_for_role(
        &self,
        role_id: RoleId,
    ) -> AppResult<Vec<PermissionGroup>> {
        let state = self.state.lock().await;
        let mut groups: Vec<PermissionGroup> = state
            .attachments
            .iter()
            .filter(|attachment| attachment.role_id == role_id)
            .filter_map(|attachment| {
                state
                    .groups
                    .iter()
                    .find(|group| group.id == attachment.group_id)
                    .cloned()
            })
            .collect();
        groups.sort_by(|left, right| left.name.cmp(&right.name));
        Ok(groups)
    }
}

#[async_trait]
impl RequestRepository for MemoryStore {
    async fn insert_pending(&self, request: RoleRequest) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let duplicate = state.requests.iter().any(|stored| {
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
        state.requests.push(request);
        Ok(())
    }

    async fn persist_review(
        &self,
        request: RoleRequest,
        expected: RequestStatus,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let Some(stored) = state
            .requests
            .iter_mut()
            .find(|stored| stored.id == request.id)
        else {
            return Err(AppError::NotFound(format!(
                "request '{}' not found",
                request.id
            )));
        };
        if stored.status != expected {
            return Err(AppError::Conflict(format!(
                "request '{}' moved from '{}' to '{}'",
                request.id,
                expected.as_str(),
                stored.status.as_str()
            )));
        }
        *stored = request;
        Ok(())
    }

    async fn find_request(&self, request_id: RequestId) -> AppResult<Option<RoleRequest>> {
        let state = self.state.lock().await;
        Ok(state
            .requests
            .iter()
            .find(|request| request.id == request_id)
            .cloned())
    }

    async fn list_pending(&self) -> AppResult<Vec<RoleRequest>> {
        let state = self.state.lock().await;
        let mut requests: Vec<RoleRequest> = state
            .requests
            .iter()
            .filter(|request| request.status == RequestStatus::Pending)
            .cloned()
            .collect();
        requests.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(requests)
    }

    async fn list_for_user(&self, user_id: UserId) -> AppResult<Vec<RoleRequest>> {
        let state = self.state.lock().await;
        let mut requests: Vec<RoleRequest> = state
            .requests
            .iter()
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
            .iter()
            .filter(|request| request.status == RequestStatus::Pending)
            .count() as u64)
    }
}

/// Publisher that records events for assertions.
#[derive(Default)]
pub(crate) struct RecordingPublisher {
    events: Mutex<Vec<RoleEvent>>,
}

impl RecordingPublisher {
    pub(crate) async fn take(&self) -> Vec<RoleEvent> {
        std::mem::take(&mut *self.events.lock().await)
    }
}

#[async_trait]
impl RoleEventPublisher for RecordingPublisher {
    async fn publish(&self, event: RoleEvent) -> AppResult<()> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

/// Fully wired engine over the in-memory store, builtin catalog seeded.
pub(crate) struct TestEngine {
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) events: Arc<RecordingPublisher>,
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) registry: RoleRegistry,
    pub(crate) assignments: RoleAssignmentService,
    pub(crate) requests: RoleRequestService,
    pub(crate) groups: PermissionGroupService,
}

impl TestEngine {
    pub(crate) async fn role(&self, kind: RoleKind) -> RoleDefinition {
        match self.registry.find_role_by_kind(kind).await {
            Ok(Some(role)) => role,
            Ok(None) => panic!("builtin role '{}' missing", kind.as_str()),
            Err(error) => panic!("catalog lookup failed: {error}"),
        }
    }

    pub(crate) async fn admin_user(&self) -> UserId {
        let admin = self.store.add_user().await;
        let role = self.role(RoleKind::Admin).await;
        let assignment = UserRoleAssignment::grant(
            admin,
            role.id,
            admin,
            "seeded administrator",
            "",
            None,
            None,
            self.clock.now(),
        );
        let assignment = match assignment {
            Ok(assignment) => assignment,
            Err(error) => panic!("seed grant must validate: {error}"),
        };
        let mut state = self.store.state.lock().await;
        state.assignments.push(assignment);
        admin
    }
}

pub(crate) async fn engine() -> TestEngine {
    engine_at(Utc::now()).await
}

pub(crate) async fn engine_at(start: DateTime<Utc>) -> TestEngine {
    let store = Arc::new(MemoryStore::default());
    let events = Arc::new(RecordingPublisher::default());
    let clock = Arc::new(ManualClock::new(start));

    let registry = RoleRegistry::new(
        Arc::clone(&store) as Arc<dyn RoleRepository>,
        Arc::clone(&store) as Arc<dyn PermissionGroupRepository>,
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    if let Err(error) = registry.bootstrap().await {
        panic!("bootstrap must succeed: {error}");
    }

    let assignments = RoleAssignmentService::new(
        Arc::clone(&store) as Arc<dyn RoleRepository>,
        Arc::clone(&store) as Arc<dyn AssignmentRepository>,
        Arc::clone(&store) as Arc<dyn HistoryRepository>,
        Arc::clone(&store) as Arc<dyn IdentityDirectory>,
        Arc::clone(&events) as Arc<dyn RoleEventPublisher>,
        Arc::clone(&clock) as Arc<dyn Clock>,
        RoleKind::Student,
    );
    let requests = RoleRequestService::new(
        Arc::clone(&store) as Arc<dyn RequestRepository>,
        Arc::clone(&store) as Arc<dyn RoleRepository>,
        Arc::clone(&store) as Arc<dyn IdentityDirectory>,
        assignments.clone(),
        Arc::clone(&clock) as Arc<dyn Clock>,
    );
    let groups = PermissionGroupService::new(
        Arc::clone(&store) as Arc<dyn PermissionGroupRepository>,
        Arc::clone(&store) as Arc<dyn RoleRepository>,
        assignments.clone(),
        Arc::clone(&clock) as Arc<dyn Clock>,
    );

    TestEngine {
        store,
        events,
        clock,
        registry,
        assignments,
        requests,
        groups,
    }
}

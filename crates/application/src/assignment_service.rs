//! Assignment lifecycle: grants, transitions, queries, and the expiry sweep.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use learnspire_core::{AppError, AppResult, UserId};
use learnspire_domain::{
    AssignmentId, AssignmentStatus, HistoryId, RoleChange, RoleChangeRecord, RoleDefinition,
    RoleId, RoleKind, UserRoleAssignment,
};
use serde_json::json;

use crate::clock::Clock;
use crate::guard;
use crate::registry::RoleRepository;

/// Issuance cap re-verified by the store inside the grant transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuerQuota {
    /// Actor whose issued grants are counted.
    pub issued_by: UserId,
    /// Maximum simultaneously active grants the actor may have issued.
    pub max_active: u32,
}

/// Repository port for assignment rows and their audit records.
///
/// The two write methods are each one failure-atomic unit: the gating reads
/// (duplicate-active check, quota count, expected prior status) are evaluated
/// inside the same unit as the write, and the audit record lands with it or
/// not at all.
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Inserts a new active grant together with its audit record.
    ///
    /// Fails `Conflict` when an active row already exists for the (user,
    /// role) pair, and `QuotaExceeded` when `quota` is present and the
    /// issuer's active grant count has reached the cap.
    async fn insert_granted(
        &self,
        assignment: UserRoleAssignment,
        history: RoleChangeRecord,
        quota: Option<IssuerQuota>,
    ) -> AppResult<()>;

    /// Persists a status transition together with its audit record.
    ///
    /// Fails `Conflict` when the stored status is no longer `expected`; this
    /// guard keeps the expiry sweep and an explicit revoke from both closing
    /// the same row.
    async fn persist_transition(
        &self,
        assignment: UserRoleAssignment,
        expected: AssignmentStatus,
        history: RoleChangeRecord,
    ) -> AppResult<()>;

    /// Returns one assignment by identifier.
    async fn find_assignment(&self, id: AssignmentId) -> AppResult<Option<UserRoleAssignment>>;

    /// Returns the active assignment for a (user, role) pair, if any.
    async fn find_active_for_user_role(
        &self,
        user_id: UserId,
        role_id: RoleId,
    ) -> AppResult<Option<UserRoleAssignment>>;

    /// Lists a user's assignments with status `active`.
    async fn list_active_for_user(&self, user_id: UserId)
    -> AppResult<Vec<UserRoleAssignment>>;

    /// Counts active assignments issued by `issuer`.
    async fn count_active_issued_by(&self, issuer: UserId) -> AppResult<u64>;

    /// Lists active assignments of one role.
    async fn list_active_for_role(&self, role_id: RoleId)
    -> AppResult<Vec<UserRoleAssignment>>;

    /// Lists active assignments whose effective window ends at or before
    /// `cutoff`.
    async fn list_active_due_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> AppResult<Vec<UserRoleAssignment>>;

    /// Counts active assignments per role.
    async fn count_active_by_role(&self) -> AppResult<Vec<(RoleId, u64)>>;
}

/// Read/purge port for the append-only audit trail.
///
/// Audit rows are written through [`AssignmentRepository`] so they share the
/// writer's unit of work; this port never updates a row.
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Lists a user's audit records, most recent first.
    async fn list_for_user(&self, user_id: UserId) -> AppResult<Vec<RoleChangeRecord>>;

    /// Lists the audit records of one assignment, most recent first.
    async fn list_for_assignment(
        &self,
        assignment_id: AssignmentId,
    ) -> AppResult<Vec<RoleChangeRecord>>;

    /// Compliance purge: deletes a user's audit records, returning the count.
    async fn purge_for_user(&self, user_id: UserId) -> AppResult<u64>;
}

/// Identity-existence lookup consumed from the accounts domain.
///
/// The engine never reads or writes any other identity state.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Returns whether a user account exists.
    async fn user_exists(&self, user_id: UserId) -> AppResult<bool>;
}

/// Outbound notification emitted by the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleEvent {
    /// A user's derived primary role changed.
    PrimaryRoleChanged {
        /// Affected user.
        user_id: UserId,
        /// New primary role kind; `None` when the catalog has no fallback.
        role: Option<RoleKind>,
    },
}

/// Port for publishing role events to the rest of the platform.
#[async_trait]
pub trait RoleEventPublisher: Send + Sync {
    /// Publishes one event.
    async fn publish(&self, event: RoleEvent) -> AppResult<()>;
}

/// Input payload for a single grant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GrantRoleInput {
    /// Free-text reason recorded on the assignment and its audit row.
    pub reason: String,
    /// Free-text operator notes.
    pub notes: String,
    /// Start of the effective window; defaults to now.
    pub effective_from: Option<DateTime<Utc>>,
    /// Optional exclusive end of the effective window.
    pub effective_until: Option<DateTime<Utc>>,
}

/// One failed entry of a bulk grant.
#[derive(Debug)]
pub struct FailedGrant {
    /// User the grant was attempted for.
    pub user_id: UserId,
    /// Why the grant failed.
    pub error: AppError,
}

/// Best-effort outcome of a bulk grant. Order follows the input ids.
#[derive(Debug, Default)]
pub struct BulkGrantOutcome {
    /// Assignments created.
    pub succeeded: Vec<UserRoleAssignment>,
    /// Entries that failed, with their errors.
    pub failed: Vec<FailedGrant>,
}

/// One failed entry of a bulk revoke.
#[derive(Debug)]
pub struct FailedRevoke {
    /// Assignment the revoke was attempted for.
    pub assignment_id: AssignmentId,
    /// Why the revoke failed.
    pub error: AppError,
}

/// Best-effort outcome of a bulk revoke. Order follows the input ids.
#[derive(Debug, Default)]
pub struct BulkRevokeOutcome {
    /// Assignments revoked.
    pub succeeded: Vec<UserRoleAssignment>,
    /// Entries that failed, with their errors.
    pub failed: Vec<FailedRevoke>,
}

/// Active-assignment count for one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleUsage {
    /// Role identifier.
    pub role_id: RoleId,
    /// Role identity tag.
    pub kind: RoleKind,
    /// Human-readable label.
    pub display_name: String,
    /// Number of assignments with status `active`.
    pub active_assignments: u64,
}

/// Application service orchestrating the assignment lifecycle.
///
/// There is no stored primary-role pointer: the primary role is derived from
/// the active assignments, and a [`RoleEvent::PrimaryRoleChanged`] event is
/// published whenever an operation changes the derived result.
#[derive(Clone)]
pub struct RoleAssignmentService {
    roles: Arc<dyn RoleRepository>,
    assignments: Arc<dyn AssignmentRepository>,
    history: Arc<dyn HistoryRepository>,
    identity: Arc<dyn IdentityDirectory>,
    events: Arc<dyn RoleEventPublisher>,
    clock: Arc<dyn Clock>,
    default_role: RoleKind,
}

impl RoleAssignmentService {
    /// Creates a new service from its dependencies.
    ///
    /// `default_role` is the tier a user falls back to once their last
    /// active assignment is gone.
    #[must_use]
    pub fn new(
        roles: Arc<dyn RoleRepository>,
        assignments: Arc<dyn AssignmentRepository>,
        history: Arc<dyn HistoryRepository>,
        identity: Arc<dyn IdentityDirectory>,
        events: Arc<dyn RoleEventPublisher>,
        clock: Arc<dyn Clock>,
        default_role: RoleKind,
    ) -> Self {
        Self {
            roles,
            assignments,
            history,
            identity,
            events,
            clock,
            default_role,
        }
    }

    /// Grants a role to a user on behalf of `actor`.
    pub async fn grant(
        &self,
        actor: UserId,
        user_id: UserId,
        role_id: RoleId,
        input: GrantRoleInput,
    ) -> AppResult<UserRoleAssignment> {
        if !self.identity.user_exists(user_id).await? {
            return Err(AppError::NotFound(format!("user '{user_id}' not found")));
        }

        let role = self.require_role(role_id).await?;
        if !role.is_active || !role.is_assignable {
            return Err(AppError::NotAssignable(format!(
                "role '{}' is not assignable",
                role.kind.as_str()
            )));
        }

        let now = self.clock.now();
        let quota = self.authorize_grant_for(actor, &role, now).await?;

        if self
            .assignments
            .find_active_for_user_role(user_id, role_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "user '{user_id}' already holds an active '{}' assignment",
                role.kind.as_str()
            )));
        }

        let assignment = UserRoleAssignment::grant(
            user_id,
            role_id,
            actor,
            input.reason.clone(),
            input.notes,
            input.effective_from,
            input.effective_until,
            now,
        )?;

        let history = RoleChangeRecord {
            id: HistoryId::new(),
            user_id,
            role_id,
            assignment_id: assignment.id,
            change: RoleChange::Assigned {
                status: assignment.status,
                effective_from: assignment.effective_from,
                effective_until: assignment.effective_until,
            },
            changed_by: Some(actor),
            changed_at: now,
            reason: input.reason,
            context: json!({}),
        };

        let before = self.primary_kind(user_id, now).await?;
        self.assignments
            .insert_granted(assignment.clone(), history, quota)
            .await?;
        self.publish_if_primary_changed(user_id, before, now).await?;

        Ok(assignment)
    }

    /// Revokes an active assignment on behalf of `actor`. Terminal.
    pub async fn revoke(
        &self,
        actor: UserId,
        assignment_id: AssignmentId,
        reason: &str,
    ) -> AppResult<UserRoleAssignment> {
        let now = self.clock.now();
        let (mut assignment, role) = self
            .require_assignment(assignment_id, AssignmentStatus::Active)
            .await?;
        self.authorize_transition_for(actor, &assignment, &role, now)
            .await?;

        assignment.revoke(actor, reason, now)?;
        let history = self.transition_record(
            &assignment,
            RoleChange::Revoked {
                previous_status: AssignmentStatus::Active,
                revoked_at: now,
            },
            Some(actor),
            reason,
            now,
        );

        let before = self.primary_kind(assignment.user_id, now).await?;
        self.assignments
            .persist_transition(assignment.clone(), AssignmentStatus::Active, history)
            .await?;
        self.publish_if_primary_changed(assignment.user_id, before, now)
            .await?;

        Ok(assignment)
    }

    /// Suspends an active assignment on behalf of `actor`.
    ///
    /// The grant is retained but stops carrying privilege immediately.
    pub async fn suspend(
        &self,
        actor: UserId,
        assignment_id: AssignmentId,
        reason: &str,
    ) -> AppResult<UserRoleAssignment> {
        let now = self.clock.now();
        let (mut assignment, role) = self
            .require_assignment(assignment_id, AssignmentStatus::Active)
            .await?;
        self.authorize_transition_for(actor, &assignment, &role, now)
            .await?;

        assignment.suspend(now)?;
        let history = self.transition_record(
            &assignment,
            RoleChange::Suspended {
                previous_status: AssignmentStatus::Active,
            },
            Some(actor),
            reason,
            now,
        );

        let before = self.primary_kind(assignment.user_id, now).await?;
        self.assignments
            .persist_transition(assignment.clone(), AssignmentStatus::Active, history)
            .await?;
        self.publish_if_primary_changed(assignment.user_id, before, now)
            .await?;

        Ok(assignment)
    }

    /// Restores a suspended assignment to active on behalf of `actor`.
    pub async fn reactivate(
        &self,
        actor: UserId,
        assignment_id: AssignmentId,
        reason: &str,
    ) -> AppResult<UserRoleAssignment> {
        let now = self.clock.now();
        let (mut assignment, role) = self
            .require_assignment(assignment_id, AssignmentStatus::Suspended)
            .await?;
        self.authorize_transition_for(actor, &assignment, &role, now)
            .await?;

        assignment.reactivate(now)?;
        let history = self.transition_record(
            &assignment,
            RoleChange::Reactivated {
                previous_status: AssignmentStatus::Suspended,
            },
            Some(actor),
            reason,
            now,
        );

        let before = self.primary_kind(assignment.user_id, now).await?;
        self.assignments
            .persist_transition(assignment.clone(), AssignmentStatus::Suspended, history)
            .await?;
        self.publish_if_primary_changed(assignment.user_id, before, now)
            .await?;

        Ok(assignment)
    }

    /// Replaces the effective window's end of an active assignment on behalf
    /// of `actor`. The audit record snapshots the previous and the new value.
    pub async fn amend_assignment_window(
        &self,
        actor: UserId,
        assignment_id: AssignmentId,
        effective_until: Option<DateTime<Utc>>,
    ) -> AppResult<UserRoleAssignment> {
        let now = self.clock.now();
        let (mut assignment, role) = self
            .require_assignment(assignment_id, AssignmentStatus::Active)
            .await?;
        self.authorize_transition_for(actor, &assignment, &role, now)
            .await?;

        let previous = assignment.effective_until;
        assignment.amend_window(effective_until, now)?;
        let history = self.transition_record(
            &assignment,
            RoleChange::Modified {
                field: "effective_until".to_owned(),
                previous: json!(previous),
                updated: json!(assignment.effective_until),
            },
            Some(actor),
            "effective window amended",
            now,
        );

        let before = self.primary_kind(assignment.user_id, now).await?;
        self.assignments
            .persist_transition(assignment.clone(), AssignmentStatus::Active, history)
            .await?;
        self.publish_if_primary_changed(assignment.user_id, before, now)
            .await?;

        Ok(assignment)
    }

    /// Grants one role to many users. Best effort: one failure neither
    /// blocks nor rolls back the remaining ids.
    pub async fn bulk_grant(
        &self,
        actor: UserId,
        user_ids: &[UserId],
        role_id: RoleId,
        input: GrantRoleInput,
    ) -> AppResult<BulkGrantOutcome> {
        // Resolve the role up front so a missing or closed role fails the
        // whole call instead of once per id.
        let role = self.require_role(role_id).await?;
        if !role.is_active || !role.is_assignable {
            return Err(AppError::NotAssignable(format!(
                "role '{}' is not assignable",
                role.kind.as_str()
            )));
        }

        let mut outcome = BulkGrantOutcome::default();
        for user_id in user_ids {
            match self.grant(actor, *user_id, role_id, input.clone()).await {
                Ok(assignment) => outcome.succeeded.push(assignment),
                Err(error @ AppError::Internal(_)) => return Err(error),
                Err(error) => outcome.failed.push(FailedGrant {
                    user_id: *user_id,
                    error,
                }),
            }
        }

        Ok(outcome)
    }

    /// Revokes many assignments. Best effort, like [`Self::bulk_grant`].
    pub async fn bulk_revoke(
        &self,
        actor: UserId,
        assignment_ids: &[AssignmentId],
        reason: &str,
    ) -> AppResult<BulkRevokeOutcome> {
        let mut outcome = BulkRevokeOutcome::default();
        for assignment_id in assignment_ids {
            match self.revoke(actor, *assignment_id, reason).await {
                Ok(assignment) => outcome.succeeded.push(assignment),
                Err(error @ AppError::Internal(_)) => return Err(error),
                Err(error) => outcome.failed.push(FailedRevoke {
                    assignment_id: *assignment_id,
                    error,
                }),
            }
        }

        Ok(outcome)
    }

    /// Transitions every active assignment whose window has elapsed to
    /// `expired`. Idempotent; returns the number of rows closed.
    ///
    /// Uses the same expected-prior-status guard as an explicit revoke, so a
    /// row revoked mid-sweep is skipped rather than double-closed.
    pub async fn expire_due_assignments(&self) -> AppResult<u64> {
        let now = self.clock.now();
        let due = self.assignments.list_active_due_before(now).await?;

        let mut expired = 0_u64;
        for mut assignment in due {
            let Some(until) = assignment.effective_until else {
                continue;
            };

            if assignment.expire(now).is_err() {
                continue;
            }
            let history = self.transition_record(
                &assignment,
                RoleChange::Expired {
                    effective_until: until,
                },
                None,
                "effective window elapsed",
                now,
            );

            let before = self.primary_kind_before_expiry(assignment.user_id, now).await?;
            match self
                .assignments
                .persist_transition(assignment.clone(), AssignmentStatus::Active, history)
                .await
            {
                Ok(()) => {
                    expired += 1;
                    self.publish_if_primary_changed(assignment.user_id, before, now)
                        .await?;
                }
                // Lost the race against an explicit transition.
                Err(AppError::Conflict(_)) => continue,
                Err(error) => return Err(error),
            }
        }

        Ok(expired)
    }

    /// Lists a user's currently-active assignments.
    pub async fn active_roles_for_user(
        &self,
        user_id: UserId,
    ) -> AppResult<Vec<UserRoleAssignment>> {
        let now = self.clock.now();
        let assignments = self.assignments.list_active_for_user(user_id).await?;
        Ok(assignments
            .into_iter()
            .filter(|assignment| assignment.is_currently_active(now))
            .collect())
    }

    /// Returns a user's primary role: the most-privileged currently-active
    /// one, falling back to the configured default tier when none remain.
    pub async fn primary_role_for_user(
        &self,
        user_id: UserId,
    ) -> AppResult<Option<RoleDefinition>> {
        let now = self.clock.now();
        match self.resolve_active_primary(user_id, now).await? {
            Some(role) => Ok(Some(role)),
            None => self.roles.find_role_by_kind(self.default_role).await,
        }
    }

    /// Lists users currently holding a role.
    pub async fn users_holding_role(&self, role_id: RoleId) -> AppResult<Vec<UserId>> {
        let now = self.clock.now();
        let assignments = self.assignments.list_active_for_role(role_id).await?;
        let mut user_ids: Vec<UserId> = assignments
            .into_iter()
            .filter(|assignment| assignment.is_currently_active(now))
            .map(|assignment| assignment.user_id)
            .collect();
        user_ids.sort_by_key(UserId::as_uuid);
        user_ids.dedup();
        Ok(user_ids)
    }

    /// Lists a user's audit trail, most recent first.
    pub async fn history_for_user(&self, user_id: UserId) -> AppResult<Vec<RoleChangeRecord>> {
        self.history.list_for_user(user_id).await
    }

    /// Lists the audit trail of one assignment, most recent first.
    pub async fn history_for_assignment(
        &self,
        assignment_id: AssignmentId,
    ) -> AppResult<Vec<RoleChangeRecord>> {
        self.history.list_for_assignment(assignment_id).await
    }

    /// Compliance purge of a user's audit trail. Requires the system
    /// management capability.
    pub async fn purge_history_for_user(
        &self,
        actor: UserId,
        user_id: UserId,
    ) -> AppResult<u64> {
        let now = self.clock.now();
        let actor_primary = self.resolve_active_primary(actor, now).await?;
        guard::authorize_permission_management(actor_primary.as_ref())?;
        self.history.purge_for_user(user_id).await
    }

    /// Returns active-assignment counts per role.
    pub async fn role_statistics(&self) -> AppResult<Vec<RoleUsage>> {
        let counts = self.assignments.count_active_by_role().await?;
        let mut usage = Vec::with_capacity(counts.len());
        for (role_id, active_assignments) in counts {
            let role = self.require_role(role_id).await?;
            usage.push(RoleUsage {
                role_id,
                kind: role.kind,
                display_name: role.display_name,
                active_assignments,
            });
        }
        usage.sort_by_key(|entry| entry.role_id.as_uuid());
        Ok(usage)
    }

    /// Runs the full grant authorization for `actor` against `role` and
    /// returns the quota the store must re-verify, if any.
    pub(crate) async fn authorize_grant_for(
        &self,
        actor: UserId,
        role: &RoleDefinition,
        now: DateTime<Utc>,
    ) -> AppResult<Option<IssuerQuota>> {
        let actor_primary = self.resolve_active_primary(actor, now).await?;
        let issued = self.assignments.count_active_issued_by(actor).await?;
        guard::authorize_grant(actor_primary.as_ref(), issued, role)?;

        // The top capability is never quota-bound.
        let quota = actor_primary
            .filter(|primary| !primary.capabilities.can_manage_system)
            .and_then(|primary| primary.max_users_manageable)
            .map(|max_active| IssuerQuota {
                issued_by: actor,
                max_active,
            });
        Ok(quota)
    }

    /// Resolves the actor's most-privileged currently-active role, without
    /// the default-tier fallback. This is the guard-facing notion of
    /// "primary role": an actor with no effective grant has none.
    pub(crate) async fn resolve_active_primary(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> AppResult<Option<RoleDefinition>> {
        let assignments = self.assignments.list_active_for_user(user_id).await?;
        let mut primary: Option<RoleDefinition> = None;
        for assignment in assignments {
            if !assignment.is_currently_active(now) {
                continue;
            }
            let role = self.require_linked_role(assignment.role_id).await?;
            let outranks = primary
                .as_ref()
                .is_none_or(|current| role.hierarchy_level.outranks(current.hierarchy_level));
            if outranks {
                primary = Some(role);
            }
        }
        Ok(primary)
    }

    async fn authorize_transition_for(
        &self,
        actor: UserId,
        assignment: &UserRoleAssignment,
        role: &RoleDefinition,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let actor_primary = self.resolve_active_primary(actor, now).await?;
        guard::authorize_transition(actor, actor_primary.as_ref(), assignment, role)
    }

    async fn require_assignment(
        &self,
        assignment_id: AssignmentId,
        expected: AssignmentStatus,
    ) -> AppResult<(UserRoleAssignment, RoleDefinition)> {
        let assignment = self
            .assignments
            .find_assignment(assignment_id)
            .await?
            .filter(|assignment| assignment.status == expected)
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "{} assignment '{assignment_id}' not found",
                    expected.as_str()
                ))
            })?;
        let role = self.require_linked_role(assignment.role_id).await?;
        Ok((assignment, role))
    }

    async fn require_role(&self, role_id: RoleId) -> AppResult<RoleDefinition> {
        self.roles
            .find_role(role_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{role_id}' not found")))
    }

    /// Resolves a role referenced by a stored assignment; absence here is a
    /// referential integrity fault, not a caller error.
    async fn require_linked_role(&self, role_id: RoleId) -> AppResult<RoleDefinition> {
        self.roles.find_role(role_id).await?.ok_or_else(|| {
            AppError::Internal(format!("assignment references missing role '{role_id}'"))
        })
    }

    fn transition_record(
        &self,
        assignment: &UserRoleAssignment,
        change: RoleChange,
        changed_by: Option<UserId>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> RoleChangeRecord {
        RoleChangeRecord {
            id: HistoryId::new(),
            user_id: assignment.user_id,
            role_id: assignment.role_id,
            assignment_id: assignment.id,
            change,
            changed_by,
            changed_at: now,
            reason: reason.to_owned(),
            context: json!({}),
        }
    }

    async fn primary_kind(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> AppResult<Option<RoleKind>> {
        match self.resolve_active_primary(user_id, now).await? {
            Some(role) => Ok(Some(role.kind)),
            None => Ok(self
                .roles
                .find_role_by_kind(self.default_role)
                .await?
                .map(|role| role.kind)),
        }
    }

    /// Primary-role snapshot taken while a due assignment still counts.
    ///
    /// The expiry sweep needs the pre-transition picture, but the due row's
    /// window has already elapsed, so the window-checked resolver would skip
    /// it. This variant checks only the start of the window; rows the sweep
    /// is about to expire are still stored as active and remain visible.
    async fn primary_kind_before_expiry(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> AppResult<Option<RoleKind>> {
        let assignments = self.assignments.list_active_for_user(user_id).await?;
        let mut primary: Option<RoleDefinition> = None;
        for assignment in assignments {
            if assignment.effective_from > now {
                continue;
            }
            let role = self.require_linked_role(assignment.role_id).await?;
            let outranks = primary
                .as_ref()
                .is_none_or(|current| role.hierarchy_level.outranks(current.hierarchy_level));
            if outranks {
                primary = Some(role);
            }
        }
        match primary {
            Some(role) => Ok(Some(role.kind)),
            None => Ok(self
                .roles
                .find_role_by_kind(self.default_role)
                .await?
                .map(|role| role.kind)),
        }
    }

    async fn publish_if_primary_changed(
        &self,
        user_id: UserId,
        before: Option<RoleKind>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let after = self.primary_kind(user_id, now).await?;
        if after != before {
            self.events
                .publish(RoleEvent::PrimaryRoleChanged {
                    user_id,
                    role: after,
                })
                .await?;
        }
        Ok(())
    }
}

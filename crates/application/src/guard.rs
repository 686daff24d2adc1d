//! Hierarchy-bounded authorization decisions.
//!
//! Pure functions over already-resolved inputs so the lifecycle can evaluate
//! them inside the same unit of work as the dependent write. The "top
//! administrative capability" is the `can_manage_system` flag on the actor's
//! resolved primary role, never a cached role tag on the identity record.

use learnspire_core::{AppError, AppResult, UserId};
use learnspire_domain::{RoleDefinition, UserRoleAssignment};

/// Decides whether an actor may grant `role`.
///
/// `actor_primary` is the actor's most-privileged currently-active role, or
/// `None` when the actor holds no effective role. `issued_active_count` is
/// the number of active grants the actor has personally issued.
pub fn authorize_grant(
    actor_primary: Option<&RoleDefinition>,
    issued_active_count: u64,
    role: &RoleDefinition,
) -> AppResult<()> {
    let Some(primary) = actor_primary else {
        return Err(AppError::PermissionDenied(
            "actor holds no currently active role".to_owned(),
        ));
    };

    if primary.capabilities.can_manage_system {
        return Ok(());
    }

    // Equal rank is denied as well; delegation is strictly downward.
    if !primary.hierarchy_level.outranks(role.hierarchy_level) {
        return Err(AppError::PermissionDenied(format!(
            "role '{}' (rank {}) is not below the actor's rank {}",
            role.kind.as_str(),
            role.hierarchy_level.value(),
            primary.hierarchy_level.value()
        )));
    }

    if !primary.capabilities.can_manage_users {
        return Err(AppError::PermissionDenied(format!(
            "role '{}' does not carry the user management capability",
            primary.kind.as_str()
        )));
    }

    if let Some(max_active) = primary.max_users_manageable
        && issued_active_count >= u64::from(max_active)
    {
        return Err(AppError::QuotaExceeded(format!(
            "actor already issued {issued_active_count} of {max_active} allowed active grants"
        )));
    }

    Ok(())
}

/// Decides whether an actor may revoke, suspend, or reactivate `assignment`.
///
/// Allowed for the top administrative capability, the assignment's own user
/// (self-revocation), the original issuer, or any actor whose primary role
/// strictly outranks the assignment's role and carries user management.
pub fn authorize_transition(
    actor: UserId,
    actor_primary: Option<&RoleDefinition>,
    assignment: &UserRoleAssignment,
    assignment_role: &RoleDefinition,
) -> AppResult<()> {
    if actor_primary.is_some_and(|primary| primary.capabilities.can_manage_system) {
        return Ok(());
    }

    if assignment.user_id == actor {
        return Ok(());
    }

    if assignment.assigned_by == Some(actor) {
        return Ok(());
    }

    if let Some(primary) = actor_primary
        && primary
            .hierarchy_level
            .outranks(assignment_role.hierarchy_level)
        && primary.capabilities.can_manage_users
    {
        return Ok(());
    }

    Err(AppError::PermissionDenied(format!(
        "actor '{actor}' may not modify assignment '{}'",
        assignment.id
    )))
}

/// Decides whether an actor may review a role request for `role`.
///
/// Same rules as [`authorize_grant`] minus the issuance quota, which only
/// binds when a grant is actually created.
pub fn authorize_review(
    actor_primary: Option<&RoleDefinition>,
    role: &RoleDefinition,
) -> AppResult<()> {
    authorize_grant(actor_primary, 0, role)
}

/// Decides whether an actor may administer the permission group catalog.
pub fn authorize_permission_management(
    actor_primary: Option<&RoleDefinition>,
) -> AppResult<()> {
    if actor_primary.is_some_and(|primary| primary.capabilities.can_manage_system) {
        return Ok(());
    }

    Err(AppError::PermissionDenied(
        "permission group administration requires the system management capability".to_owned(),
    ))
}

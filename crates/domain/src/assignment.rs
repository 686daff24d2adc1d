//! Role grant records and their lifecycle transitions.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use learnspire_core::{AppError, AppResult, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::role::RoleId;

/// Unique identifier for a role assignment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssignmentId(Uuid);

impl AssignmentId {
    /// Creates a new random assignment identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an assignment identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AssignmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for AssignmentId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Lifecycle state of a role assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    /// Grant is in force (subject to its effective window).
    Active,
    /// Grant is retained but carries no privilege.
    Suspended,
    /// Grant was explicitly withdrawn. Terminal.
    Revoked,
    /// Grant's effective window elapsed. Terminal.
    Expired,
}

impl AssignmentStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
        }
    }

    /// Returns whether no further transition may leave this status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Revoked | Self::Expired)
    }
}

impl FromStr for AssignmentStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(Self::Active),
            "suspended" => Ok(Self::Suspended),
            "revoked" => Ok(Self::Revoked),
            "expired" => Ok(Self::Expired),
            _ => Err(AppError::Validation(format!(
                "unknown assignment status '{value}'"
            ))),
        }
    }
}

/// One grant attempt of a role to a user.
///
/// At most one `active` row may exist per (user, role) at any instant; the
/// stores enforce that inside the same unit of work as the insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoleAssignment {
    /// Stable assignment identifier.
    pub id: AssignmentId,
    /// Target user.
    pub user_id: UserId,
    /// Granted role.
    pub role_id: RoleId,
    /// Issuing actor; `None` once the actor record is gone.
    pub assigned_by: Option<UserId>,
    /// Creation timestamp. Immutable.
    pub assigned_at: DateTime<Utc>,
    /// Lifecycle state.
    pub status: AssignmentStatus,
    /// Start of the effective window.
    pub effective_from: DateTime<Utc>,
    /// Optional exclusive end of the effective window.
    pub effective_until: Option<DateTime<Utc>>,
    /// Free-text reason captured at grant time.
    pub assignment_reason: String,
    /// Free-text operator notes.
    pub notes: String,
    /// Actor who revoked the grant, when revoked.
    pub revoked_by: Option<UserId>,
    /// Revocation timestamp, when revoked.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Reason captured at revocation time.
    pub revocation_reason: Option<String>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl UserRoleAssignment {
    /// Creates a new active grant.
    ///
    /// `effective_from` defaults to `now`. Fails `InvalidRange` when
    /// `effective_until` is not strictly after `effective_from`.
    #[allow(clippy::too_many_arguments)]
    pub fn grant(
        user_id: UserId,
        role_id: RoleId,
        assigned_by: UserId,
        reason: impl Into<String>,
        notes: impl Into<String>,
        effective_from: Option<DateTime<Utc>>,
        effective_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<Self> {
        let effective_from = effective_from.unwrap_or(now);
        if let Some(until) = effective_until
            && until <= effective_from
        {
            return Err(AppError::InvalidRange(
                "effective until must be strictly after effective from".to_owned(),
            ));
        }

        Ok(Self {
            id: AssignmentId::new(),
            user_id,
            role_id,
            assigned_by: Some(assigned_by),
            assigned_at: now,
            status: AssignmentStatus::Active,
            effective_from,
            effective_until,
            assignment_reason: reason.into(),
            notes: notes.into(),
            revoked_by: None,
            revoked_at: None,
            revocation_reason: None,
            updated_at: now,
        })
    }

    /// Returns whether the grant carries privilege at `now`.
    #[must_use]
    pub fn is_currently_active(&self, now: DateTime<Utc>) -> bool {
        if self.status != AssignmentStatus::Active {
            return false;
        }

        if self.effective_from > now {
            return false;
        }

        match self.effective_until {
            Some(until) => until > now,
            None => true,
        }
    }

    /// Withdraws an active grant. Terminal.
    pub fn revoke(
        &mut self,
        revoked_by: UserId,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        self.require_status(AssignmentStatus::Active, "revoke")?;
        self.status = AssignmentStatus::Revoked;
        self.revoked_by = Some(revoked_by);
        self.revoked_at = Some(now);
        self.revocation_reason = Some(reason.into());
        self.updated_at = now;
        Ok(())
    }

    /// Parks an active grant without discarding it.
    pub fn suspend(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.require_status(AssignmentStatus::Active, "suspend")?;
        self.status = AssignmentStatus::Suspended;
        self.updated_at = now;
        Ok(())
    }

    /// Restores a suspended grant to active.
    pub fn reactivate(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.require_status(AssignmentStatus::Suspended, "reactivate")?;
        self.status = AssignmentStatus::Active;
        self.updated_at = now;
        Ok(())
    }

    /// Replaces the effective window's end on an active grant.
    ///
    /// Fails `InvalidRange` when the new end is not strictly after
    /// `effective_from`. Passing `None` leaves the grant open-ended.
    pub fn amend_window(
        &mut self,
        effective_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        self.require_status(AssignmentStatus::Active, "amend")?;
        if let Some(until) = effective_until
            && until <= self.effective_from
        {
            return Err(AppError::InvalidRange(
                "effective until must be strictly after effective from".to_owned(),
            ));
        }
        self.effective_until = effective_until;
        self.updated_at = now;
        Ok(())
    }

    /// Closes an active grant whose effective window elapsed. Terminal.
    pub fn expire(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.require_status(AssignmentStatus::Active, "expire")?;
        self.status = AssignmentStatus::Expired;
        self.updated_at = now;
        Ok(())
    }

    fn require_status(&self, expected: AssignmentStatus, operation: &str) -> AppResult<()> {
        if self.status != expected {
            return Err(AppError::Conflict(format!(
                "cannot {operation} assignment '{}' in status '{}'",
                self.id,
                self.status.as_str()
            )));
        }

        Ok(())
    }
}

//! Append-only audit trail of role assignment transitions.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use learnspire_core::{AppError, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::assignment::{AssignmentId, AssignmentStatus};
use crate::role::RoleId;

/// Unique identifier for an audit trail row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoryId(Uuid);

impl HistoryId {
    /// Creates a new random history identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a history identifier from an existing UUID value.
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

impl Default for HistoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for HistoryId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Closed set of transition kinds recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleChangeKind {
    /// A grant was created.
    Assigned,
    /// An active grant was withdrawn.
    Revoked,
    /// An active grant was parked.
    Suspended,
    /// A suspended grant was restored.
    Reactivated,
    /// An active grant's window elapsed.
    Expired,
    /// A grant field was edited in place.
    Modified,
}

impl RoleChangeKind {
    /// Returns a stable storage value for this change kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::Revoked => "revoked",
            Self::Suspended => "suspended",
            Self::Reactivated => "reactivated",
            Self::Expired => "expired",
            Self::Modified => "modified",
        }
    }
}

impl FromStr for RoleChangeKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "assigned" => Ok(Self::Assigned),
            "revoked" => Ok(Self::Revoked),
            "suspended" => Ok(Self::Suspended),
            "reactivated" => Ok(Self::Reactivated),
            "expired" => Ok(Self::Expired),
            "modified" => Ok(Self::Modified),
            _ => Err(AppError::Validation(format!(
                "unknown role change kind '{value}'"
            ))),
        }
    }
}

/// Before/after snapshot scoped to one transition kind.
///
/// Each variant carries exactly the fields that kind of change is expected
/// to record, so malformed snapshots cannot be constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoleChange {
    /// A grant was created.
    Assigned {
        /// Status of the new row.
        status: AssignmentStatus,
        /// Start of the effective window.
        effective_from: DateTime<Utc>,
        /// Optional end of the effective window.
        effective_until: Option<DateTime<Utc>>,
    },
    /// An active grant was withdrawn.
    Revoked {
        /// Status before the transition.
        previous_status: AssignmentStatus,
        /// Revocation timestamp written on the row.
        revoked_at: DateTime<Utc>,
    },
    /// An active grant was parked.
    Suspended {
        /// Status before the transition.
        previous_status: AssignmentStatus,
    },
    /// A suspended grant was restored.
    Reactivated {
        /// Status before the transition.
        previous_status: AssignmentStatus,
    },
    /// An active grant's window elapsed.
    Expired {
        /// The window end that triggered the sweep.
        effective_until: DateTime<Utc>,
    },
    /// A grant field was edited in place.
    Modified {
        /// Name of the edited field.
        field: String,
        /// Value before the edit.
        previous: Value,
        /// Value after the edit.
        updated: Value,
    },
}

impl RoleChange {
    /// Returns the kind tag of this snapshot.
    #[must_use]
    pub fn kind(&self) -> RoleChangeKind {
        match self {
            Self::Assigned { .. } => RoleChangeKind::Assigned,
            Self::Revoked { .. } => RoleChangeKind::Revoked,
            Self::Suspended { .. } => RoleChangeKind::Suspended,
            Self::Reactivated { .. } => RoleChangeKind::Reactivated,
            Self::Expired { .. } => RoleChangeKind::Expired,
            Self::Modified { .. } => RoleChangeKind::Modified,
        }
    }
}

/// Immutable audit record of one assignment transition.
///
/// Rows are never updated; deletion exists only behind the compliance purge
/// path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleChangeRecord {
    /// Stable record identifier.
    pub id: HistoryId,
    /// User whose role state changed.
    pub user_id: UserId,
    /// Role involved in the change.
    pub role_id: RoleId,
    /// Assignment row the change applied to.
    pub assignment_id: AssignmentId,
    /// Transition snapshot.
    pub change: RoleChange,
    /// Actor who performed the change; `None` for system transitions such as
    /// the expiry sweep.
    pub changed_by: Option<UserId>,
    /// Transition timestamp.
    pub changed_at: DateTime<Utc>,
    /// Free-text reason supplied by the actor.
    pub reason: String,
    /// Structured request context (IP, user agent, batch id).
    pub context: Value,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::Utc;

    use crate::assignment::AssignmentStatus;

    use super::{RoleChange, RoleChangeKind};

    #[test]
    fn change_kind_roundtrip_storage_value() {
        for kind in [
            RoleChangeKind::Assigned,
            RoleChangeKind::Revoked,
            RoleChangeKind::Suspended,
            RoleChangeKind::Reactivated,
            RoleChangeKind::Expired,
            RoleChangeKind::Modified,
        ] {
            let restored = RoleChangeKind::from_str(kind.as_str());
            assert!(restored.is_ok());
        }
    }

    #[test]
    fn snapshot_reports_its_kind() {
        let change = RoleChange::Revoked {
            previous_status: AssignmentStatus::Active,
            revoked_at: Utc::now(),
        };
        assert_eq!(change.kind(), RoleChangeKind::Revoked);
    }

    #[test]
    fn snapshot_serializes_with_kind_tag() {
        let change = RoleChange::Suspended {
            previous_status: AssignmentStatus::Active,
        };
        let Ok(value) = serde_json::to_value(&change) else {
            panic!("snapshot must serialize");
        };
        assert_eq!(value["kind"], "suspended");
        assert_eq!(value["previous_status"], "active");
    }
}

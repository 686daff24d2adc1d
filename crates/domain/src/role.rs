//! Role catalog types: privilege tiers, capability flags, hierarchy ranks.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use learnspire_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a role definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleId(Uuid);

impl RoleId {
    /// Creates a new random role identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a role identifier from an existing UUID value.
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

impl Default for RoleId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RoleId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Closed set of role identities known to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    /// Platform administrator.
    Admin,
    /// Content moderator.
    Moderator,
    /// Course instructor.
    Instructor,
    /// Teaching assistant.
    Assistant,
    /// Support staff.
    Support,
    /// Enrolled student.
    Student,
}

impl RoleKind {
    /// Returns a stable storage value for this role kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Moderator => "moderator",
            Self::Instructor => "instructor",
            Self::Assistant => "assistant",
            Self::Support => "support",
            Self::Student => "student",
        }
    }

    /// Returns all known role kinds.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[RoleKind] = &[
            RoleKind::Admin,
            RoleKind::Moderator,
            RoleKind::Instructor,
            RoleKind::Assistant,
            RoleKind::Support,
            RoleKind::Student,
        ];

        ALL
    }
}

impl FromStr for RoleKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Self::Admin),
            "moderator" => Ok(Self::Moderator),
            "instructor" => Ok(Self::Instructor),
            "assistant" => Ok(Self::Assistant),
            "support" => Ok(Self::Support),
            "student" => Ok(Self::Student),
            _ => Err(AppError::Validation(format!("unknown role kind '{value}'"))),
        }
    }
}

/// Integer privilege rank. Smaller values are more privileged; 1 is the top.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct HierarchyLevel(i32);

impl HierarchyLevel {
    /// Creates a validated hierarchy level (must be at least 1).
    pub fn new(value: i32) -> AppResult<Self> {
        if value < 1 {
            return Err(AppError::Validation(
                "hierarchy level must be at least 1".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the raw rank value.
    #[must_use]
    pub fn value(&self) -> i32 {
        self.0
    }

    /// Returns whether this rank is strictly more privileged than `other`.
    #[must_use]
    pub fn outranks(&self, other: HierarchyLevel) -> bool {
        self.0 < other.0
    }
}

/// Boolean capability flags granted by a role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCapabilities {
    /// Grant, revoke, and otherwise administer user role state.
    pub can_manage_users: bool,
    /// Create and administer courses.
    pub can_manage_courses: bool,
    /// Edit lesson and media content.
    pub can_manage_content: bool,
    /// Read platform analytics.
    pub can_view_analytics: bool,
    /// Administer payments and payouts.
    pub can_manage_payments: bool,
    /// Administer platform-wide settings; the top administrative capability.
    pub can_manage_system: bool,
    /// Moderate forum threads and posts.
    pub can_moderate_forums: bool,
    /// Act on support tickets for other users.
    pub can_support_users: bool,
}

/// A privilege tier in the role catalog.
///
/// Definitions are created at bootstrap and rarely mutated. Deactivating a
/// definition does not invalidate assignments already granted under it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    /// Stable role identifier.
    pub id: RoleId,
    /// Role identity tag from the closed set.
    pub kind: RoleKind,
    /// Human-readable label.
    pub display_name: String,
    /// Longer description of the tier.
    pub description: String,
    /// Privilege rank; smaller is more privileged.
    pub hierarchy_level: HierarchyLevel,
    /// Capability flags granted by the role.
    pub capabilities: RoleCapabilities,
    /// Cap on simultaneously active grants a holder may issue; `None` is
    /// unbounded.
    pub max_users_manageable: Option<u32>,
    /// Whether the role participates in the catalog at all.
    pub is_active: bool,
    /// Whether new assignments of this role are accepted.
    pub is_assignable: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl RoleDefinition {
    /// Creates an active, assignable role definition.
    pub fn new(
        kind: RoleKind,
        display_name: NonEmptyString,
        description: impl Into<String>,
        hierarchy_level: HierarchyLevel,
        capabilities: RoleCapabilities,
        max_users_manageable: Option<u32>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RoleId::new(),
            kind,
            display_name: display_name.into(),
            description: description.into(),
            hierarchy_level,
            capabilities,
            max_users_manageable,
            is_active: true,
            is_assignable: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Returns the built-in six-role catalog used at bootstrap.
///
/// Ranks follow the platform convention: admin 1, moderator 2, instructor 3,
/// assistant 4, support 5, student 6.
pub fn builtin_roles(now: DateTime<Utc>) -> AppResult<Vec<RoleDefinition>> {
    let entries: [(RoleKind, &str, &str, i32, RoleCapabilities); 6] = [
        (
            RoleKind::Admin,
            "Administrator",
            "Full system access with all permissions",
            1,
            RoleCapabilities {
                can_manage_users: true,
                can_manage_courses: true,
                can_manage_content: true,
                can_view_analytics: true,
                can_manage_payments: true,
                can_manage_system: true,
                can_moderate_forums: true,
                can_support_users: true,
            },
        ),
        (
            RoleKind::Moderator,
            "Content Moderator",
            "Content moderation and course approval",
            2,
            RoleCapabilities {
                can_manage_courses: true,
                can_manage_content: true,
                can_view_analytics: true,
                can_moderate_forums: true,
                ..RoleCapabilities::default()
            },
        ),
        (
            RoleKind::Instructor,
            "Instructor",
            "Course creation and management",
            3,
            RoleCapabilities {
                can_manage_courses: true,
                can_manage_content: true,
                can_view_analytics: true,
                ..RoleCapabilities::default()
            },
        ),
        (
            RoleKind::Assistant,
            "Teaching Assistant",
            "Assistant for helping with course management",
            4,
            RoleCapabilities {
                can_manage_content: true,
                can_support_users: true,
                ..RoleCapabilities::default()
            },
        ),
        (
            RoleKind::Support,
            "Support Staff",
            "Customer support and user assistance",
            5,
            RoleCapabilities {
                can_support_users: true,
                ..RoleCapabilities::default()
            },
        ),
        (
            RoleKind::Student,
            "Student",
            "Standard student role for course enrollment",
            6,
            RoleCapabilities::default(),
        ),
    ];

    let mut roles = Vec::with_capacity(entries.len());
    for (kind, display_name, description, rank, capabilities) in entries {
        roles.push(RoleDefinition::new(
            kind,
            NonEmptyString::new(display_name)?,
            description,
            HierarchyLevel::new(rank)?,
            capabilities,
            None,
            now,
        ));
    }

    Ok(roles)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::Utc;

    use super::{HierarchyLevel, RoleKind, builtin_roles};

    #[test]
    fn role_kind_roundtrip_storage_value() {
        for kind in RoleKind::all() {
            let restored = RoleKind::from_str(kind.as_str());
            assert!(restored.is_ok());
        }
    }

    #[test]
    fn unknown_role_kind_is_rejected() {
        assert!(RoleKind::from_str("superuser").is_err());
    }

    #[test]
    fn hierarchy_level_rejects_zero() {
        assert!(HierarchyLevel::new(0).is_err());
        assert!(HierarchyLevel::new(-3).is_err());
    }

    #[test]
    fn lower_rank_outranks_higher() {
        let Ok(top) = HierarchyLevel::new(1) else {
            panic!("rank 1 must validate");
        };
        let Ok(low) = HierarchyLevel::new(50) else {
            panic!("rank 50 must validate");
        };
        assert!(top.outranks(low));
        assert!(!low.outranks(top));
        assert!(!top.outranks(top));
    }

    #[test]
    fn builtin_catalog_covers_every_kind_once() {
        let Ok(roles) = builtin_roles(Utc::now()) else {
            panic!("builtin catalog must validate");
        };
        assert_eq!(roles.len(), RoleKind::all().len());
        for kind in RoleKind::all() {
            assert_eq!(roles.iter().filter(|role| role.kind == *kind).count(), 1);
        }
    }

    #[test]
    fn only_admin_holds_system_capability_in_builtins() {
        let Ok(roles) = builtin_roles(Utc::now()) else {
            panic!("builtin catalog must validate");
        };
        for role in roles {
            assert_eq!(
                role.capabilities.can_manage_system,
                role.kind == RoleKind::Admin
            );
        }
    }
}

//! Named capability bundles attachable to roles.

use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use learnspire_core::{AppResult, NonEmptyString, UserId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::role::RoleId;

/// Unique identifier for a permission group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(Uuid);

impl GroupId {
    /// Creates a new random group identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a group identifier from an existing UUID value.
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

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for GroupId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Named bundle of capability identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGroup {
    /// Stable group identifier.
    pub id: GroupId,
    /// Unique group name.
    pub name: String,
    /// Longer description of the bundle.
    pub description: String,
    /// Capability identifiers in the bundle, e.g. `courses.change_course`.
    pub permissions: Vec<String>,
    /// Whether the group participates in resolution.
    pub is_active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl PermissionGroup {
    /// Creates an active permission group.
    pub fn new(
        name: NonEmptyString,
        description: impl Into<String>,
        permissions: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: GroupId::new(),
            name: name.into(),
            description: description.into(),
            permissions,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Auditable join record linking a permission group to a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGroupAttachment {
    /// Role side of the attachment.
    pub role_id: RoleId,
    /// Group side of the attachment.
    pub group_id: GroupId,
    /// Attachment timestamp.
    pub assigned_at: DateTime<Utc>,
    /// Actor who attached the group; `None` once the actor record is gone.
    pub assigned_by: Option<UserId>,
}

/// Returns the default permission group catalog used at bootstrap.
pub fn builtin_groups(now: DateTime<Utc>) -> AppResult<Vec<PermissionGroup>> {
    let entries: [(&str, &str, &[&str]); 5] = [
        (
            "Course Management",
            "Permissions for managing courses and lessons",
            &[
                "courses.add_course",
                "courses.change_course",
                "courses.delete_course",
                "courses.view_course",
                "lessons.add_lesson",
                "lessons.change_lesson",
                "lessons.delete_lesson",
                "lessons.view_lesson",
            ],
        ),
        (
            "User Management",
            "Permissions for managing users and authentication",
            &[
                "auth.add_user",
                "auth.change_user",
                "auth.delete_user",
                "auth.view_user",
                "users.change_userprofile",
                "users.view_userprofile",
            ],
        ),
        (
            "Content Moderation",
            "Permissions for moderating content and forums",
            &[
                "forums.add_forum",
                "forums.change_forum",
                "forums.delete_forum",
                "forums.view_forum",
                "forums.add_forumpost",
                "forums.change_forumpost",
                "forums.delete_forumpost",
                "forums.view_forumpost",
            ],
        ),
        (
            "Payment Management",
            "Permissions for managing payments and transactions",
            &[
                "payments.view_order",
                "payments.change_order",
                "payments.view_payment",
                "payments.change_payment",
                "payments.view_instructorrevenue",
                "payments.change_instructorrevenue",
            ],
        ),
        (
            "Analytics Access",
            "Permissions for viewing analytics and reports",
            &[
                "analytics.view_platformmetrics",
                "analytics.view_instructormetrics",
                "analytics.view_coursemetrics",
                "analytics.view_studentmetrics",
            ],
        ),
    ];

    let mut groups = Vec::with_capacity(entries.len());
    for (name, description, permissions) in entries {
        groups.push(PermissionGroup::new(
            NonEmptyString::new(name)?,
            description,
            permissions.iter().map(|code| (*code).to_owned()).collect(),
            now,
        ));
    }

    Ok(groups)
}

//! Domain entities and invariants for the role engine.

#![forbid(unsafe_code)]

mod assignment;
mod history;
mod permission_group;
mod request;
mod role;

pub use assignment::{AssignmentId, AssignmentStatus, UserRoleAssignment};
pub use history::{HistoryId, RoleChange, RoleChangeKind, RoleChangeRecord};
pub use permission_group::{GroupId, PermissionGroup, PermissionGroupAttachment, builtin_groups};
pub use request::{RequestId, RequestStatus, RoleRequest};
pub use role::{
    HierarchyLevel, RoleCapabilities, RoleDefinition, RoleId, RoleKind, builtin_roles,
};

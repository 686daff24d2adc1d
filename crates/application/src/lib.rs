//! Application services and the ports they drive.
//!
//! Each service orchestrates domain types through repository traits; the
//! adapters live in the infrastructure crate.

#![forbid(unsafe_code)]

mod assignment_service;
mod clock;
mod guard;
mod permission_group_service;
mod registry;
mod request_service;
#[cfg(test)]
mod test_support;

pub use assignment_service::{
    AssignmentRepository, BulkGrantOutcome, BulkRevokeOutcome, FailedGrant, FailedRevoke,
    GrantRoleInput, HistoryRepository, IdentityDirectory, IssuerQuota, RoleAssignmentService,
    RoleEvent, RoleEventPublisher, RoleUsage,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use guard::{
    authorize_grant, authorize_permission_management, authorize_review, authorize_transition,
};
pub use permission_group_service::{
    CreateGroupInput, PermissionGroupRepository, PermissionGroupService,
};
pub use registry::{BootstrapSummary, RoleRegistry, RoleRepository};
pub use request_service::{RequestRepository, RoleRequestService, SubmitRequestInput};

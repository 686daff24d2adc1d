//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod in_memory_role_store;
mod postgres_assignment_repository;
mod postgres_history_repository;
mod postgres_identity_directory;
mod postgres_permission_group_repository;
mod postgres_request_repository;
mod postgres_role_repository;
mod tracing_event_publisher;

pub use in_memory_role_store::{InMemoryIdentityDirectory, InMemoryRoleStore};
pub use postgres_assignment_repository::PostgresAssignmentRepository;
pub use postgres_history_repository::PostgresHistoryRepository;
pub use postgres_identity_directory::PostgresIdentityDirectory;
pub use postgres_permission_group_repository::PostgresPermissionGroupRepository;
pub use postgres_request_repository::PostgresRequestRepository;
pub use postgres_role_repository::PostgresRoleRepository;
pub use tracing_event_publisher::TracingRoleEventPublisher;

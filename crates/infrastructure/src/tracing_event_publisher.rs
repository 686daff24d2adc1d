use async_trait::async_trait;

use learnspire_application::{RoleEvent, RoleEventPublisher};
use learnspire_core::AppResult;

/// Publisher that emits role events as structured log records.
///
/// Stands in until the platform event bus is wired up; downstream services
/// currently consume these from the log pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRoleEventPublisher;

#[async_trait]
impl RoleEventPublisher for TracingRoleEventPublisher {
    async fn publish(&self, event: RoleEvent) -> AppResult<()> {
        match event {
            RoleEvent::PrimaryRoleChanged { user_id, role } => {
                tracing::info!(
                    user_id = %user_id,
                    role = role.map(|kind| kind.as_str()).unwrap_or("none"),
                    "primary role changed"
                );
            }
        }
        Ok(())
    }
}

use async_trait::async_trait;
use sqlx::PgPool;

use learnspire_application::IdentityDirectory;
use learnspire_core::{AppError, AppResult, UserId};

/// Identity-existence lookup against the accounts-owned `users` table.
#[derive(Clone)]
pub struct PostgresIdentityDirectory {
    pool: PgPool,
}

impl PostgresIdentityDirectory {
    /// Creates a directory with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityDirectory for PostgresIdentityDirectory {
    async fn user_exists(&self, user_id: UserId) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to look up user: {error}")))
    }
}

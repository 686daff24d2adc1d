//! Learnspire role maintenance worker.
//!
//! Seeds the built-in role catalog on startup, then periodically closes
//! assignments whose effective window has elapsed.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use learnspire_application::{
    AssignmentRepository, Clock, HistoryRepository, IdentityDirectory, PermissionGroupRepository,
    RoleAssignmentService, RoleEventPublisher, RoleRegistry, RoleRepository, SystemClock,
};
use learnspire_core::{AppError, AppResult};
use learnspire_domain::RoleKind;
use learnspire_infrastructure::{
    PostgresAssignmentRepository, PostgresHistoryRepository, PostgresIdentityDirectory,
    PostgresPermissionGroupRepository, PostgresRoleRepository, TracingRoleEventPublisher,
};

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    sweep_interval_secs: u64,
    run_migrations: bool,
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let sweep_interval_secs = parse_env_u64("ROLE_SWEEP_INTERVAL_SECS", 60)?;
        let run_migrations = env::var("RUN_MIGRATIONS")
            .map(|value| value.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        if sweep_interval_secs == 0 {
            return Err(AppError::Validation(
                "ROLE_SWEEP_INTERVAL_SECS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            sweep_interval_secs,
            run_migrations,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;

    if config.run_migrations {
        sqlx::migrate!("../../crates/infrastructure/migrations")
            .run(&pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;
        info!("database migrations applied");
    }

    let (registry, assignments) = build_services(pool);

    let summary = registry.bootstrap().await?;
    if summary.roles_created > 0 || summary.groups_created > 0 {
        info!(
            roles_created = summary.roles_created,
            groups_created = summary.groups_created,
            "seeded built-in role catalog"
        );
    }

    info!(
        sweep_interval_secs = config.sweep_interval_secs,
        "learnspire-worker started"
    );

    loop {
        match assignments.expire_due_assignments().await {
            Ok(0) => {}
            Ok(expired) => info!(expired, "closed elapsed assignments"),
            Err(error) => warn!(error = %error, "expiry sweep failed"),
        }

        tokio::time::sleep(Duration::from_secs(config.sweep_interval_secs)).await;
    }
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn build_services(pool: PgPool) -> (RoleRegistry, RoleAssignmentService) {
    let roles: Arc<dyn RoleRepository> = Arc::new(PostgresRoleRepository::new(pool.clone()));
    let groups: Arc<dyn PermissionGroupRepository> =
        Arc::new(PostgresPermissionGroupRepository::new(pool.clone()));
    let assignments: Arc<dyn AssignmentRepository> =
        Arc::new(PostgresAssignmentRepository::new(pool.clone()));
    let history: Arc<dyn HistoryRepository> =
        Arc::new(PostgresHistoryRepository::new(pool.clone()));
    let identity: Arc<dyn IdentityDirectory> =
        Arc::new(PostgresIdentityDirectory::new(pool));
    let events: Arc<dyn RoleEventPublisher> = Arc::new(TracingRoleEventPublisher);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let registry = RoleRegistry::new(Arc::clone(&roles), groups, Arc::clone(&clock));
    let service = RoleAssignmentService::new(
        roles,
        assignments,
        history,
        identity,
        events,
        clock,
        RoleKind::Student,
    );

    (registry, service)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

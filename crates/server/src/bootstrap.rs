use std::sync::Arc;

use chrono::Duration;
use thiserror::Error;
use tracing::info;

use paintquote_agent::provider::{select_provider, ProviderError};
use paintquote_agent::runtime::IntakeRuntime;
use paintquote_agent::TracingAuditSink;
use paintquote_core::assembler::QuoteAssembler;
use paintquote_core::config::{AppConfig, ConfigError, LoadOptions};
use paintquote_core::pricing::{DeterministicPricingEngine, StructuralValidator};
use paintquote_core::session::{Clock, InMemorySessionStore, SystemClock, TurnRateLimiter};
use paintquote_db::repositories::{SqlCompanyRepository, SqlQuoteRepository};
use paintquote_db::{connect_with_settings, migrations, DbPool};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runtime: Arc<IntakeRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("conversation provider setup failed: {0}")]
    Provider(#[from] ProviderError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let runtime = build_runtime(&config, db_pool.clone())?;
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        provider = runtime.provider_name(),
        session_idle_minutes = config.intake.session_idle_minutes,
        turns_per_minute = config.intake.turns_per_minute,
        "intake runtime initialized"
    );

    Ok(Application { config, db_pool, runtime: Arc::new(runtime) })
}

fn build_runtime(config: &AppConfig, db_pool: DbPool) -> Result<IntakeRuntime, BootstrapError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let idle = Duration::minutes(i64::from(config.intake.session_idle_minutes));
    let assembler = QuoteAssembler::new(
        DeterministicPricingEngine::new(config.pricing.policy()),
        StructuralValidator,
    );

    Ok(IntakeRuntime::new(
        select_provider(&config.llm)?,
        Arc::new(InMemorySessionStore::new(clock.clone(), idle)),
        Arc::new(SqlCompanyRepository::new(db_pool.clone())),
        Arc::new(SqlQuoteRepository::new(db_pool)),
    )
    .with_limiter(TurnRateLimiter::new(config.intake.turns_per_minute, clock.clone()))
    .with_assembler(assembler)
    .with_audit(Arc::new(TracingAuditSink))
    .with_clock(clock))
}

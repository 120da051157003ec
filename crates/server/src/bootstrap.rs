use std::sync::Arc;

use thiserror::Error;

use tawar_agent::llm::OpenAiCompatClient;
use tawar_core::config::{AppConfig, ConfigError, LoadOptions};
use tawar_core::errors::ApplicationError;
use tawar_db::repositories::{SqlDealLedger, SqlProductStore, SqlSessionStore, SqlTranscriptStore};
use tawar_db::{connect_with_settings, migrations, DbPool};

use crate::exchange::ExchangeService;
use crate::identity::HeaderIdentityResolver;
use crate::routes::AppState;

/// Everything `main` needs after startup: the validated config, the live
/// pool (health checks probe it), and the wired route state.
pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("exchange service initialization failed: {0}")]
    Exchange(#[source] ApplicationError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Connects, migrates, and wires the exchange service. Fails fast: a bad
/// config, unreachable database, or broken migration stops startup here,
/// before the server binds its port.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    tracing::info!(event_name = "bootstrap.database_ready", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    tracing::info!(event_name = "bootstrap.migrations_applied", "schema is current");

    let exchange = ExchangeService::new(
        Arc::new(SqlProductStore::new(db_pool.clone())),
        Arc::new(SqlSessionStore::new(db_pool.clone())),
        Arc::new(SqlTranscriptStore::new(db_pool.clone())),
        Arc::new(SqlDealLedger::new(db_pool.clone())),
        Arc::new(OpenAiCompatClient::from_config(&config.llm)),
        config.negotiation.tuning(),
    )
    .map_err(BootstrapError::Exchange)?;

    let state = AppState {
        exchange: Arc::new(exchange),
        identity: Arc::new(HeaderIdentityResolver),
    };

    Ok(Application { config, db_pool, state })
}

#[cfg(test)]
mod tests {
    use tawar_core::config::{ConfigOverrides, LoadOptions};

    use super::bootstrap;

    fn options_with_database(url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn rejects_invalid_config_before_touching_the_database() {
        let error = bootstrap(options_with_database("postgres://nope"))
            .await
            .expect_err("non-sqlite url must fail");
        assert!(error.to_string().contains("database.url"));
    }

    #[tokio::test]
    async fn wires_a_working_application_over_a_fresh_database() {
        let app = bootstrap(options_with_database("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap succeeds");

        let (tables,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
             AND name IN ('products', 'negotiation_sessions', 'transcript_turns', 'agreements')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(tables, 4, "migrations must have produced the negotiation tables");

        app.db_pool.close().await;
    }
}

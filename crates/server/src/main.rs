mod bootstrap;
mod exchange;
mod health;
mod identity;
mod routes;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use tawar_core::config::{AppConfig, LoadOptions, LogFormat};

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    match config.logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Config first so logging honors the configured level and format.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let router = routes::router(app.state.clone()).merge(health::router(app.db_pool.clone()));
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    tracing::info!(
        event_name = "server.listening",
        bind_address = %address,
        grace_secs = app.config.server.graceful_shutdown_secs,
        "tawar-server accepting connections"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!(event_name = "server.stopped", "tawar-server shut down");
    Ok(())
}

use tawar_db::{connect_with_settings, migrations};

use super::{blocking_runtime, load_config, CommandResult, Failure};

pub fn run() -> CommandResult {
    match apply() {
        Ok(message) => CommandResult::success("migrate", message),
        Err(failure) => CommandResult::from_failure("migrate", failure),
    }
}

fn apply() -> Result<String, Failure> {
    let config = load_config()?;
    let runtime = blocking_runtime()?;

    runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| Failure::new("db_connectivity", error.to_string(), 4))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| Failure::new("migration", error.to_string(), 5))?;
        pool.close().await;

        Ok(format!("migrations up to date for `{}`", config.database.url))
    })
}

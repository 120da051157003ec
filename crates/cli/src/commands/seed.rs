use tawar_db::{connect_with_settings, migrations, seed_demo_products};

use super::{blocking_runtime, load_config, CommandResult, Failure};

pub fn run() -> CommandResult {
    match seed() {
        Ok(message) => CommandResult::success("seed", message),
        Err(failure) => CommandResult::from_failure("seed", failure),
    }
}

fn seed() -> Result<String, Failure> {
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

        let seeded = seed_demo_products(&pool)
            .await
            .map_err(|error| Failure::new("seed_execution", error.to_string(), 6))?;
        pool.close().await;

        Ok(format!("demo catalog loaded: {} negotiable products", seeded.products_seeded))
    })
}

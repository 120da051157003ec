use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use tawar_db::DbPool;

/// Readiness surface. The process is alive if this answers at all; it is
/// ready only when the database responds to a probe query.
pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(db_pool)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub ready: bool,
    pub database: ProbeResult,
    pub checked_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum ProbeResult {
    Ok,
    Failed(String),
}

pub async fn health(State(pool): State<DbPool>) -> (StatusCode, Json<HealthReport>) {
    let database = probe_database(&pool).await;
    let ready = database == ProbeResult::Ok;

    let report = HealthReport { ready, database, checked_at: Utc::now() };
    let code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(report))
}

async fn probe_database(pool: &DbPool) -> ProbeResult {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => ProbeResult::Ok,
        Err(error) => ProbeResult::Failed(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::Json;

    use tawar_db::connect_with_settings;

    use super::{health, ProbeResult};

    #[tokio::test]
    async fn reports_ready_while_the_database_answers() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 5)
            .await
            .expect("pool should connect");

        let (code, Json(report)) = health(State(pool.clone())).await;

        assert_eq!(code, StatusCode::OK);
        assert!(report.ready);
        assert_eq!(report.database, ProbeResult::Ok);

        pool.close().await;
    }

    #[tokio::test]
    async fn degrades_once_the_database_is_gone() {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 5)
            .await
            .expect("pool should connect");
        pool.close().await;

        let (code, Json(report)) = health(State(pool)).await;

        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!report.ready);
        assert!(matches!(report.database, ProbeResult::Failed(_)));
    }
}

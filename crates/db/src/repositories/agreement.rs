use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use tawar_core::domain::agreement::Agreement;
use tawar_core::domain::session::SessionId;

use super::session::is_unique_violation;
use super::{DealLedger, RepositoryError};
use crate::DbPool;

pub struct SqlDealLedger {
    pool: DbPool,
}

impl SqlDealLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DealLedger for SqlDealLedger {
    async fn record_if_accepted(
        &self,
        session_id: &SessionId,
        final_price: i64,
    ) -> Result<Agreement, RepositoryError> {
        if let Some(existing) = self.find(session_id).await? {
            return Ok(existing);
        }

        let created_at = Utc::now();
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO agreements (session_id, final_price, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(&session_id.0)
        .bind(final_price)
        .bind(created_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {
                // The deal and the terminal state flip commit together.
                sqlx::query(
                    "UPDATE negotiation_sessions SET state = 'dealt' WHERE id = ?1 AND state = 'open'",
                )
                .bind(&session_id.0)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;

                Ok(Agreement { session_id: session_id.clone(), final_price, created_at })
            }
            // A concurrent accept won the race; its row is the agreement.
            Err(error) if is_unique_violation(&error) => {
                drop(tx);
                self.find(session_id).await?.ok_or_else(|| {
                    RepositoryError::Decode(
                        "agreement vanished after uniqueness conflict".to_string(),
                    )
                })
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn find(&self, session_id: &SessionId) -> Result<Option<Agreement>, RepositoryError> {
        let row = sqlx::query(
            "SELECT session_id, final_price, created_at FROM agreements WHERE session_id = ?1",
        )
        .bind(&session_id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Agreement {
            session_id: SessionId(row.get::<String, _>("session_id")),
            final_price: row.get::<i64, _>("final_price"),
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
        }))
    }
}

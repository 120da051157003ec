use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use tawar_core::domain::product::ProductId;
use tawar_core::domain::session::{NegotiationSession, SessionId, SessionState};

use super::{RepositoryError, SessionStore, SessionSummary};
use crate::DbPool;

pub struct SqlSessionStore {
    pool: DbPool,
}

impl SqlSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn find_for_pair(
        &self,
        buyer_id: &str,
        product_id: &ProductId,
    ) -> Result<Option<NegotiationSession>, RepositoryError> {
        // An open session wins over any terminal one; among terminal
        // sessions the most recent is the read-only answer.
        let row = sqlx::query(
            "SELECT id, buyer_id, product_id, state, created_at
             FROM negotiation_sessions
             WHERE buyer_id = ?1 AND product_id = ?2
             ORDER BY CASE state WHEN 'open' THEN 0 ELSE 1 END, created_at DESC
             LIMIT 1",
        )
        .bind(buyer_id)
        .bind(&product_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_session).transpose()
    }
}

#[async_trait]
impl SessionStore for SqlSessionStore {
    async fn resolve(
        &self,
        buyer_id: &str,
        product_id: &ProductId,
    ) -> Result<NegotiationSession, RepositoryError> {
        if let Some(existing) = self.find_for_pair(buyer_id, product_id).await? {
            return Ok(existing);
        }

        let session = NegotiationSession::open(buyer_id, product_id.clone());
        let inserted = sqlx::query(
            "INSERT INTO negotiation_sessions (id, buyer_id, product_id, state, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&session.id.0)
        .bind(&session.buyer_id)
        .bind(&session.product_id.0)
        .bind(session.state.as_str())
        .bind(session.created_at)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(session),
            // Lost the open-pair uniqueness race: another resolver created
            // the session first, so return that one.
            Err(error) if is_unique_violation(&error) => self
                .find_for_pair(buyer_id, product_id)
                .await?
                .ok_or_else(|| {
                    RepositoryError::Decode(
                        "open session vanished after uniqueness conflict".to_string(),
                    )
                }),
            Err(error) => Err(error.into()),
        }
    }

    async fn find_by_id(
        &self,
        id: &SessionId,
    ) -> Result<Option<NegotiationSession>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, buyer_id, product_id, state, created_at
             FROM negotiation_sessions
             WHERE id = ?1",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_session).transpose()
    }

    async fn mark_abandoned(
        &self,
        id: &SessionId,
    ) -> Result<Option<NegotiationSession>, RepositoryError> {
        let updated = sqlx::query(
            "UPDATE negotiation_sessions SET state = 'abandoned' WHERE id = ?1 AND state = 'open'",
        )
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_by_id(id).await
    }

    async fn list_for_buyer(
        &self,
        buyer_id: &str,
    ) -> Result<Vec<SessionSummary>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT s.id, s.buyer_id, s.product_id, s.state, s.created_at,
                    t.text AS last_message, t.created_at AS last_activity
             FROM negotiation_sessions s
             LEFT JOIN transcript_turns t
               ON t.session_id = s.id
              AND t.sequence = (SELECT MAX(sequence) FROM transcript_turns WHERE session_id = s.id)
             WHERE s.buyer_id = ?1
             ORDER BY COALESCE(t.created_at, s.created_at) DESC",
        )
        .bind(buyer_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let last_message = row.get::<Option<String>, _>("last_message");
                let last_activity = row.get::<Option<DateTime<Utc>>, _>("last_activity");
                Ok(SessionSummary { session: decode_session(row)?, last_message, last_activity })
            })
            .collect()
    }
}

fn decode_session(row: SqliteRow) -> Result<NegotiationSession, RepositoryError> {
    let state = row
        .get::<String, _>("state")
        .parse::<SessionState>()
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(NegotiationSession {
        id: SessionId(row.get::<String, _>("id")),
        buyer_id: row.get::<String, _>("buyer_id"),
        product_id: ProductId(row.get::<String, _>("product_id")),
        state,
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

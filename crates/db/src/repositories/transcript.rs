use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use tawar_core::domain::session::SessionId;
use tawar_core::domain::turn::{Speaker, Turn};

use super::{RepositoryError, TranscriptStore};
use crate::DbPool;

pub struct SqlTranscriptStore {
    pool: DbPool,
}

impl SqlTranscriptStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TranscriptStore for SqlTranscriptStore {
    async fn append_exchange(
        &self,
        session_id: &SessionId,
        buyer_text: &str,
        agent_text: &str,
        counter_price: Option<i64>,
    ) -> Result<(Turn, Turn), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let next_sequence = sqlx::query(
            "SELECT COALESCE(MAX(sequence) + 1, 0) AS next
             FROM transcript_turns
             WHERE session_id = ?1",
        )
        .bind(&session_id.0)
        .fetch_one(&mut *tx)
        .await?
        .get::<i64, _>("next");

        let now = Utc::now();

        sqlx::query(
            "INSERT INTO transcript_turns (session_id, sequence, speaker, text, counter_price, created_at)
             VALUES (?1, ?2, 'buyer', ?3, NULL, ?4)",
        )
        .bind(&session_id.0)
        .bind(next_sequence)
        .bind(buyer_text)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO transcript_turns (session_id, sequence, speaker, text, counter_price, created_at)
             VALUES (?1, ?2, 'agent', ?3, ?4, ?5)",
        )
        .bind(&session_id.0)
        .bind(next_sequence + 1)
        .bind(agent_text)
        .bind(counter_price)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let buyer_turn = Turn {
            session_id: session_id.clone(),
            sequence: next_sequence,
            speaker: Speaker::Buyer,
            text: buyer_text.to_string(),
            counter_price: None,
            created_at: now,
        };
        let agent_turn = Turn {
            session_id: session_id.clone(),
            sequence: next_sequence + 1,
            speaker: Speaker::Agent,
            text: agent_text.to_string(),
            counter_price,
            created_at: now,
        };
        Ok((buyer_turn, agent_turn))
    }

    async fn list(&self, session_id: &SessionId) -> Result<Vec<Turn>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT session_id, sequence, speaker, text, counter_price, created_at
             FROM transcript_turns
             WHERE session_id = ?1
             ORDER BY sequence ASC",
        )
        .bind(&session_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_turn).collect()
    }

    async fn lowest_counter(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<i64>, RepositoryError> {
        let lowest = sqlx::query(
            "SELECT MIN(counter_price) AS lowest
             FROM transcript_turns
             WHERE session_id = ?1 AND counter_price IS NOT NULL",
        )
        .bind(&session_id.0)
        .fetch_one(&self.pool)
        .await?
        .get::<Option<i64>, _>("lowest");

        Ok(lowest)
    }
}

fn decode_turn(row: SqliteRow) -> Result<Turn, RepositoryError> {
    let speaker = row
        .get::<String, _>("speaker")
        .parse::<Speaker>()
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(Turn {
        session_id: SessionId(row.get::<String, _>("session_id")),
        sequence: row.get::<i64, _>("sequence"),
        speaker,
        text: row.get::<String, _>("text"),
        counter_price: row.get::<Option<i64>, _>("counter_price"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}

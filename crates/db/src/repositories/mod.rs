use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use tawar_core::domain::agreement::Agreement;
use tawar_core::domain::product::{Product, ProductId};
use tawar_core::domain::session::{NegotiationSession, SessionId};
use tawar_core::domain::turn::Turn;

pub mod agreement;
pub mod memory;
pub mod product;
pub mod session;
pub mod transcript;

pub use agreement::SqlDealLedger;
pub use memory::InMemoryNegotiationStore;
pub use product::SqlProductStore;
pub use session::SqlSessionStore;
pub use transcript::SqlTranscriptStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Inbox row: a buyer's session plus the most recent transcript activity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    pub session: NegotiationSession,
    pub last_message: Option<String>,
    pub last_activity: Option<DateTime<Utc>>,
}

/// Maps a (buyer, product) pair to its durable negotiation session. An OPEN
/// session is returned as-is; a terminal session is returned read-only; a
/// missing session is created lazily. Concurrent resolution never yields
/// two OPEN sessions for the same pair.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn resolve(
        &self,
        buyer_id: &str,
        product_id: &ProductId,
    ) -> Result<NegotiationSession, RepositoryError>;

    async fn find_by_id(
        &self,
        id: &SessionId,
    ) -> Result<Option<NegotiationSession>, RepositoryError>;

    /// Flips an OPEN session to abandoned. Returns `None` when the session
    /// was not open (the caller decides whether that is a conflict).
    async fn mark_abandoned(
        &self,
        id: &SessionId,
    ) -> Result<Option<NegotiationSession>, RepositoryError>;

    async fn list_for_buyer(
        &self,
        buyer_id: &str,
    ) -> Result<Vec<SessionSummary>, RepositoryError>;
}

/// Append-only ordered log of turns. An exchange (buyer turn + agent turn)
/// commits atomically; readers never observe a buyer turn without its
/// reply.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn append_exchange(
        &self,
        session_id: &SessionId,
        buyer_text: &str,
        agent_text: &str,
        counter_price: Option<i64>,
    ) -> Result<(Turn, Turn), RepositoryError>;

    async fn list(&self, session_id: &SessionId) -> Result<Vec<Turn>, RepositoryError>;

    /// Lowest counter-offer recorded on any agent turn of the session, used
    /// to keep concessions non-increasing.
    async fn lowest_counter(&self, session_id: &SessionId) -> Result<Option<i64>, RepositoryError>;
}

/// Records the single binding agreement per session. First successful
/// writer wins; later callers observe the existing record.
#[async_trait]
pub trait DealLedger: Send + Sync {
    async fn record_if_accepted(
        &self,
        session_id: &SessionId,
        final_price: i64,
    ) -> Result<Agreement, RepositoryError>;

    async fn find(&self, session_id: &SessionId) -> Result<Option<Agreement>, RepositoryError>;
}

/// Catalog seam. The floor price stays inside the engine; nothing read
/// from here may cross into a buyer-facing channel.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError>;
    async fn save(&self, product: Product) -> Result<(), RepositoryError>;
}

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use tawar_core::domain::agreement::Agreement;
use tawar_core::domain::product::{Product, ProductId};
use tawar_core::domain::session::{NegotiationSession, SessionId, SessionState};
use tawar_core::domain::turn::{Speaker, Turn};

use super::{
    DealLedger, ProductStore, RepositoryError, SessionStore, SessionSummary, TranscriptStore,
};

/// Single in-memory implementation of every negotiation store, mirroring
/// the SQLite semantics closely enough for engine and server tests: one
/// open session per pair, contiguous turn sequences, first-writer-wins
/// agreements.
#[derive(Default)]
pub struct InMemoryNegotiationStore {
    products: RwLock<HashMap<String, Product>>,
    sessions: RwLock<HashMap<String, NegotiationSession>>,
    turns: RwLock<HashMap<String, Vec<Turn>>>,
    agreements: RwLock<HashMap<String, Agreement>>,
}

#[async_trait]
impl SessionStore for InMemoryNegotiationStore {
    async fn resolve(
        &self,
        buyer_id: &str,
        product_id: &ProductId,
    ) -> Result<NegotiationSession, RepositoryError> {
        let mut sessions = self.sessions.write().await;

        let mut candidates: Vec<&NegotiationSession> = sessions
            .values()
            .filter(|session| {
                session.buyer_id == buyer_id && session.product_id == *product_id
            })
            .collect();
        candidates.sort_by(|a, b| {
            let rank = |session: &NegotiationSession| u8::from(session.state.is_terminal());
            rank(a).cmp(&rank(b)).then(b.created_at.cmp(&a.created_at))
        });

        if let Some(existing) = candidates.first() {
            return Ok((*existing).clone());
        }

        let session = NegotiationSession::open(buyer_id, product_id.clone());
        sessions.insert(session.id.0.clone(), session.clone());
        Ok(session)
    }

    async fn find_by_id(
        &self,
        id: &SessionId,
    ) -> Result<Option<NegotiationSession>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&id.0).cloned())
    }

    async fn mark_abandoned(
        &self,
        id: &SessionId,
    ) -> Result<Option<NegotiationSession>, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&id.0) {
            Some(session) if session.state == SessionState::Open => {
                session.state = SessionState::Abandoned;
                Ok(Some(session.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_for_buyer(
        &self,
        buyer_id: &str,
    ) -> Result<Vec<SessionSummary>, RepositoryError> {
        let sessions = self.sessions.read().await;
        let turns = self.turns.read().await;

        let mut summaries: Vec<SessionSummary> = sessions
            .values()
            .filter(|session| session.buyer_id == buyer_id)
            .map(|session| {
                let last_turn = turns.get(&session.id.0).and_then(|turns| turns.last());
                SessionSummary {
                    session: session.clone(),
                    last_message: last_turn.map(|turn| turn.text.clone()),
                    last_activity: last_turn.map(|turn| turn.created_at),
                }
            })
            .collect();

        summaries.sort_by(|a, b| {
            let activity = |summary: &SessionSummary| {
                summary.last_activity.unwrap_or(summary.session.created_at)
            };
            activity(b).cmp(&activity(a))
        });
        Ok(summaries)
    }
}

#[async_trait]
impl TranscriptStore for InMemoryNegotiationStore {
    async fn append_exchange(
        &self,
        session_id: &SessionId,
        buyer_text: &str,
        agent_text: &str,
        counter_price: Option<i64>,
    ) -> Result<(Turn, Turn), RepositoryError> {
        let mut turns = self.turns.write().await;
        let session_turns = turns.entry(session_id.0.clone()).or_default();
        let next_sequence = session_turns.len() as i64;
        let now = Utc::now();

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

        session_turns.push(buyer_turn.clone());
        session_turns.push(agent_turn.clone());
        Ok((buyer_turn, agent_turn))
    }

    async fn list(&self, session_id: &SessionId) -> Result<Vec<Turn>, RepositoryError> {
        let turns = self.turns.read().await;
        Ok(turns.get(&session_id.0).cloned().unwrap_or_default())
    }

    async fn lowest_counter(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<i64>, RepositoryError> {
        let turns = self.turns.read().await;
        Ok(turns
            .get(&session_id.0)
            .into_iter()
            .flatten()
            .filter_map(|turn| turn.counter_price)
            .min())
    }
}

#[async_trait]
impl DealLedger for InMemoryNegotiationStore {
    async fn record_if_accepted(
        &self,
        session_id: &SessionId,
        final_price: i64,
    ) -> Result<Agreement, RepositoryError> {
        let mut agreements = self.agreements.write().await;
        if let Some(existing) = agreements.get(&session_id.0) {
            return Ok(existing.clone());
        }

        let agreement = Agreement {
            session_id: session_id.clone(),
            final_price,
            created_at: Utc::now(),
        };
        agreements.insert(session_id.0.clone(), agreement.clone());

        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(&session_id.0) {
            if session.state == SessionState::Open {
                session.state = SessionState::Dealt;
            }
        }

        Ok(agreement)
    }

    async fn find(&self, session_id: &SessionId) -> Result<Option<Agreement>, RepositoryError> {
        let agreements = self.agreements.read().await;
        Ok(agreements.get(&session_id.0).cloned())
    }
}

#[async_trait]
impl ProductStore for InMemoryNegotiationStore {
    async fn find_product(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(products.get(&id.0).cloned())
    }

    async fn save(&self, product: Product) -> Result<(), RepositoryError> {
        let mut products = self.products.write().await;
        products.insert(product.id.0.clone(), product);
        Ok(())
    }
}

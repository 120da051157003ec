//! One negotiation exchange, end to end.
//!
//! Orchestrates: resolve session -> read history -> decide branch -> call
//! backend -> interpret -> commit both turns (and the agreement, on
//! acceptance). Exchanges within one session are serialized by a keyed
//! mutex; the buyer turn is never committed until a successful agent reply
//! exists, so a failed or timed-out exchange leaves no trace and is safe to
//! resubmit.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Mutex as AsyncMutex;

use tawar_agent::interpreter::{interpret, AgentDecision};
use tawar_agent::llm::{LlmClient, LlmError};
use tawar_agent::prompt::{completion_request, PromptRenderer};
use tawar_core::domain::agreement::Agreement;
use tawar_core::domain::product::ProductId;
use tawar_core::domain::session::{NegotiationSession, SessionId};
use tawar_core::domain::turn::Turn;
use tawar_core::errors::ApplicationError;
use tawar_core::policy::{CounterHistory, NegotiationTuning, PolicyEngine};
use tawar_db::repositories::{
    DealLedger, ProductStore, RepositoryError, SessionStore, SessionSummary, TranscriptStore,
};

/// Per-session mutual exclusion. Sessions are independent; exchanges within
/// one session must not race on history reads or ledger writes.
#[derive(Default)]
pub struct SessionLocks {
    inner: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    fn handle(&self, session_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = match self.inner.lock() {
            Ok(locks) => locks,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(session_id.to_string()).or_default().clone()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExchangeOutcome {
    pub session_id: SessionId,
    pub visible_text: String,
    pub accepted: bool,
    pub final_price: Option<i64>,
}

pub struct ExchangeService {
    products: Arc<dyn ProductStore>,
    sessions: Arc<dyn SessionStore>,
    transcript: Arc<dyn TranscriptStore>,
    ledger: Arc<dyn DealLedger>,
    llm: Arc<dyn LlmClient>,
    policy: PolicyEngine,
    prompts: PromptRenderer,
    locks: SessionLocks,
}

impl ExchangeService {
    pub fn new(
        products: Arc<dyn ProductStore>,
        sessions: Arc<dyn SessionStore>,
        transcript: Arc<dyn TranscriptStore>,
        ledger: Arc<dyn DealLedger>,
        llm: Arc<dyn LlmClient>,
        tuning: NegotiationTuning,
    ) -> Result<Self, ApplicationError> {
        let prompts = PromptRenderer::new()
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;

        Ok(Self {
            products,
            sessions,
            transcript,
            ledger,
            llm,
            policy: PolicyEngine::new(tuning),
            prompts,
            locks: SessionLocks::default(),
        })
    }

    pub async fn post_message(
        &self,
        buyer_id: &str,
        product_id: &str,
        text: &str,
    ) -> Result<ExchangeOutcome, ApplicationError> {
        if buyer_id.trim().is_empty() {
            return Err(ApplicationError::Validation("buyer id must not be empty".to_string()));
        }
        if product_id.trim().is_empty() {
            return Err(ApplicationError::Validation("product id must not be empty".to_string()));
        }
        if text.trim().is_empty() {
            return Err(ApplicationError::Validation("message must not be empty".to_string()));
        }

        let product_id = ProductId(product_id.to_string());
        let product = self
            .products
            .find_product(&product_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| {
                ApplicationError::NotFound(format!("unknown product `{}`", product_id.0))
            })?;
        product.validate_economics()?;

        let session = self.sessions.resolve(buyer_id, &product_id).await.map_err(persistence)?;

        let lock = self.locks.handle(&session.id.0);
        let _guard = lock.lock().await;

        // The session may have closed between resolution and lock
        // acquisition; re-read under the lock before touching anything.
        let session = self
            .sessions
            .find_by_id(&session.id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| {
                ApplicationError::NotFound(format!("unknown session `{}`", session.id.0))
            })?;
        if session.state.is_terminal() {
            return Err(ApplicationError::Conflict(format!(
                "session `{}` is {} and read-only",
                session.id.0,
                session.state.as_str()
            )));
        }

        let history = self.transcript.list(&session.id).await.map_err(persistence)?;
        let lowest_counter =
            self.transcript.lowest_counter(&session.id).await.map_err(persistence)?;

        let directive =
            self.policy.decide(&product, CounterHistory { lowest_counter }, text)?;

        tracing::info!(
            event_name = "exchange.directive_decided",
            session_id = %session.id.0,
            branch = directive.branch_key(),
            "negotiation branch decided"
        );

        let instructions = self
            .prompts
            .render(&product, &directive)
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
        let request = completion_request(instructions, &history, text);

        // The single suspension point. On failure nothing has been written;
        // the caller gets a retryable error and the transcript is untouched.
        let raw_reply = self.llm.complete(request).await.map_err(map_llm_error)?;

        let reply = interpret(&raw_reply, &directive, product.floor_price)
            .map_err(|error| ApplicationError::Backend(error.to_string()))?;

        self.transcript
            .append_exchange(&session.id, text, &reply.visible_text, directive.counter_price())
            .await
            .map_err(persistence)?;

        let final_price = match reply.decision {
            AgentDecision::Accept { final_price } => {
                let agreement = self
                    .ledger
                    .record_if_accepted(&session.id, final_price)
                    .await
                    .map_err(persistence)?;
                tracing::info!(
                    event_name = "exchange.deal_recorded",
                    session_id = %session.id.0,
                    final_price = agreement.final_price,
                    "agreement recorded, session dealt"
                );
                Some(agreement.final_price)
            }
            _ => None,
        };

        let accepted = reply.accepted();
        Ok(ExchangeOutcome {
            session_id: session.id,
            visible_text: reply.visible_text,
            accepted,
            final_price,
        })
    }

    pub async fn history(&self, session_id: &SessionId) -> Result<Vec<Turn>, ApplicationError> {
        self.require_session(session_id).await?;
        self.transcript.list(session_id).await.map_err(persistence)
    }

    pub async fn inbox(&self, buyer_id: &str) -> Result<Vec<SessionSummary>, ApplicationError> {
        if buyer_id.trim().is_empty() {
            return Err(ApplicationError::Validation("buyer id must not be empty".to_string()));
        }
        self.sessions.list_for_buyer(buyer_id).await.map_err(persistence)
    }

    pub async fn abandon(
        &self,
        session_id: &SessionId,
    ) -> Result<NegotiationSession, ApplicationError> {
        self.require_session(session_id).await?;

        let lock = self.locks.handle(&session_id.0);
        let _guard = lock.lock().await;

        match self.sessions.mark_abandoned(session_id).await.map_err(persistence)? {
            Some(session) => Ok(session),
            None => {
                // Already terminal; report the state it actually holds now.
                let current = self.require_session(session_id).await?;
                Err(ApplicationError::Conflict(format!(
                    "session `{}` is {} and read-only",
                    current.id.0,
                    current.state.as_str()
                )))
            }
        }
    }

    pub async fn checkout(&self, session_id: &SessionId) -> Result<Agreement, ApplicationError> {
        self.require_session(session_id).await?;
        self.ledger.find(session_id).await.map_err(persistence)?.ok_or_else(|| {
            ApplicationError::NotFound(format!("no agreement for session `{}`", session_id.0))
        })
    }

    async fn require_session(
        &self,
        session_id: &SessionId,
    ) -> Result<NegotiationSession, ApplicationError> {
        self.sessions
            .find_by_id(session_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| {
                ApplicationError::NotFound(format!("unknown session `{}`", session_id.0))
            })
    }
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

fn map_llm_error(error: LlmError) -> ApplicationError {
    match error {
        LlmError::Timeout { timeout_secs } => ApplicationError::BackendTimeout { timeout_secs },
        LlmError::Transport(message) | LlmError::Protocol(message) => {
            ApplicationError::Backend(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tawar_agent::interpreter::ACCEPTANCE_MARKER;
    use tawar_agent::llm::{LlmError, ScriptedLlm};
    use tawar_core::domain::product::{Product, ProductId};
    use tawar_core::domain::session::SessionState;
    use tawar_core::errors::ApplicationError;
    use tawar_core::policy::NegotiationTuning;
    use tawar_db::repositories::{DealLedger, ProductStore, SessionStore, TranscriptStore};
    use tawar_db::InMemoryNegotiationStore;

    use super::ExchangeService;

    const LIST: i64 = 100_000;
    const FLOOR: i64 = 70_000;

    async fn service_with(
        replies: Vec<Result<String, LlmError>>,
    ) -> (ExchangeService, Arc<InMemoryNegotiationStore>, Arc<ScriptedLlm>) {
        let store = Arc::new(InMemoryNegotiationStore::default());
        store
            .save(Product::new("p-1", "Sepatu Lari", LIST, FLOOR).expect("valid product"))
            .await
            .expect("save product");

        let llm = Arc::new(ScriptedLlm::with_replies(replies));
        let service = ExchangeService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            llm.clone(),
            NegotiationTuning::default(),
        )
        .expect("service");

        (service, store, llm)
    }

    #[tokio::test]
    async fn lowball_offer_is_rejected_without_leaking_the_floor() {
        let (service, _, _) = service_with(vec![Ok(
            "Waduh bos, belum dapet segitu mah, buat beli bensin aja kurang.".to_string(),
        )])
        .await;

        let outcome =
            service.post_message("buyer-1", "p-1", "mau 50000").await.expect("exchange");

        assert!(!outcome.accepted);
        assert!(!outcome.visible_text.contains("70000"));
        assert!(!outcome.visible_text.contains("70.000"));
        assert!(!outcome.visible_text.contains(ACCEPTANCE_MARKER));
    }

    #[tokio::test]
    async fn offer_above_floor_closes_the_deal_at_the_offer() {
        let (service, store, _) = service_with(vec![Ok(format!(
            "{ACCEPTANCE_MARKER} Sip bos, 80.000 meluncur!"
        ))])
        .await;

        let outcome =
            service.post_message("buyer-1", "p-1", "80000 deal ga").await.expect("exchange");

        assert!(outcome.accepted);
        assert_eq!(outcome.final_price, Some(80_000));

        let session = store
            .find_by_id(&outcome.session_id)
            .await
            .expect("find session")
            .expect("session exists");
        assert_eq!(session.state, SessionState::Dealt);

        let agreement = store
            .find(&outcome.session_id)
            .await
            .expect("find agreement")
            .expect("agreement exists");
        assert_eq!(agreement.final_price, 80_000);
    }

    #[tokio::test]
    async fn best_price_query_is_not_an_acceptance() {
        let (service, store, llm) =
            service_with(vec![Ok("Harga pas 95.000 ya bos, mentok.".to_string())]).await;

        let outcome =
            service.post_message("buyer-1", "p-1", "net berapa?").await.expect("exchange");

        assert!(!outcome.accepted);
        assert!(store.find(&outcome.session_id).await.expect("find").is_none());

        // The grounding instructions pin the computed net price.
        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].messages[0].content.contains("95.000"));
    }

    #[tokio::test]
    async fn posting_to_a_dealt_session_is_a_conflict_and_mutates_nothing() {
        let (service, store, llm) = service_with(vec![Ok(format!(
            "{ACCEPTANCE_MARKER} Sip bos, deal 80.000!"
        ))])
        .await;

        let outcome =
            service.post_message("buyer-1", "p-1", "80000 deal ga").await.expect("exchange");
        let transcript_before =
            store.list(&outcome.session_id).await.expect("list transcript");

        llm.push_reply(Ok("should never be used".to_string()));
        let error = service
            .post_message("buyer-1", "p-1", "mau nego lagi 90000")
            .await
            .expect_err("dealt session is read-only");

        assert!(matches!(error, ApplicationError::Conflict(_)));
        let transcript_after =
            store.list(&outcome.session_id).await.expect("list transcript again");
        assert_eq!(transcript_after, transcript_before);
    }

    #[tokio::test]
    async fn backend_timeout_leaves_no_partial_writes_and_is_retryable() {
        let (service, store, llm) =
            service_with(vec![Err(LlmError::Timeout { timeout_secs: 30 })]).await;

        let error = service
            .post_message("buyer-1", "p-1", "mau 50000")
            .await
            .expect_err("timeout aborts");
        assert!(matches!(error, ApplicationError::BackendTimeout { .. }));
        assert!(error.is_retryable());

        let session = store
            .resolve("buyer-1", &ProductId("p-1".to_string()))
            .await
            .expect("session exists");
        assert!(store.list(&session.id).await.expect("list").is_empty());

        // The same message can be resubmitted once the backend recovers.
        llm.push_reply(Ok("Waduh belum dapet bos.".to_string()));
        let outcome =
            service.post_message("buyer-1", "p-1", "mau 50000").await.expect("retry succeeds");
        assert!(!outcome.accepted);
        assert_eq!(store.list(&session.id).await.expect("list").len(), 2);
    }

    #[tokio::test]
    async fn repeated_accepts_keep_a_single_agreement() {
        let (service, store, _) = service_with(vec![Ok(format!(
            "{ACCEPTANCE_MARKER} Sip bos, 80.000!"
        ))])
        .await;

        let outcome =
            service.post_message("buyer-1", "p-1", "80000 deal ga").await.expect("exchange");

        // A duplicate ledger write (operator replay, crash recovery) is a
        // no-op returning the original agreement.
        let replay = store
            .record_if_accepted(&outcome.session_id, 90_000)
            .await
            .expect("replay record");
        assert_eq!(replay.final_price, 80_000);
    }

    #[tokio::test]
    async fn counter_offers_are_non_increasing_across_exchanges() {
        let (service, store, _) = service_with(vec![
            Ok("Gimana kalau naik dikit bos?".to_string()),
            Ok("Segini aja deh bos.".to_string()),
        ])
        .await;

        service.post_message("buyer-1", "p-1", "72000 bisa?").await.expect("first exchange");
        service.post_message("buyer-1", "p-1", "73000 deh").await.expect("second exchange");

        let session = store
            .resolve("buyer-1", &ProductId("p-1".to_string()))
            .await
            .expect("session");
        let turns = store.list(&session.id).await.expect("list");
        let counters: Vec<i64> =
            turns.iter().filter_map(|turn| turn.counter_price).collect();

        assert_eq!(counters.len(), 2);
        assert!(counters[1] <= counters[0], "counters must never increase: {counters:?}");
        for (index, turn) in turns.iter().enumerate() {
            assert_eq!(turn.sequence, index as i64);
        }
    }

    #[tokio::test]
    async fn floor_leak_in_generated_text_aborts_the_exchange() {
        let (service, store, _) =
            service_with(vec![Ok("Modal saya 70.000 bos, ga bisa.".to_string())]).await;

        let error = service
            .post_message("buyer-1", "p-1", "mau 50000")
            .await
            .expect_err("leak aborts");
        assert!(matches!(error, ApplicationError::Backend(_)));

        let session = store
            .resolve("buyer-1", &ProductId("p-1".to_string()))
            .await
            .expect("session");
        assert!(store.list(&session.id).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn unknown_product_is_not_found_before_any_side_effect() {
        let (service, _, llm) = service_with(vec![]).await;

        let error = service
            .post_message("buyer-1", "missing", "mau 50000")
            .await
            .expect_err("unknown product");
        assert!(matches!(error, ApplicationError::NotFound(_)));
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn blank_inputs_are_validation_errors() {
        let (service, _, _) = service_with(vec![]).await;

        for (buyer, product, text) in
            [("", "p-1", "halo"), ("buyer-1", " ", "halo"), ("buyer-1", "p-1", "  ")]
        {
            let error = service
                .post_message(buyer, product, text)
                .await
                .expect_err("blank input must fail");
            assert!(matches!(error, ApplicationError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn abandon_flips_open_sessions_once() {
        let (service, store, _) =
            service_with(vec![Ok("Siap bos, ditunggu ya.".to_string())]).await;

        let outcome =
            service.post_message("buyer-1", "p-1", "masih ada barangnya?").await.expect("chat");

        let abandoned = service.abandon(&outcome.session_id).await.expect("abandon");
        assert_eq!(abandoned.state, SessionState::Abandoned);

        let error = service.abandon(&outcome.session_id).await.expect_err("already terminal");
        assert!(matches!(error, ApplicationError::Conflict(_)));

        // Committed turns survive abandonment untouched.
        let turns = store.list(&outcome.session_id).await.expect("list");
        assert_eq!(turns.len(), 2);
    }

    #[tokio::test]
    async fn checkout_exposes_the_agreement_only_after_a_deal() {
        let (service, _, llm) =
            service_with(vec![Ok("Siap bos, ditawar aja.".to_string())]).await;

        let outcome =
            service.post_message("buyer-1", "p-1", "halo bang").await.expect("chat");

        let error = service.checkout(&outcome.session_id).await.expect_err("no deal yet");
        assert!(matches!(error, ApplicationError::NotFound(_)));

        llm.push_reply(Ok(format!("{ACCEPTANCE_MARKER} Mantap bos!")));
        let dealt =
            service.post_message("buyer-1", "p-1", "85000 deal").await.expect("deal exchange");
        assert!(dealt.accepted);

        let agreement = service.checkout(&outcome.session_id).await.expect("agreement");
        assert_eq!(agreement.final_price, 85_000);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::product::ProductId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Open,
    Dealt,
    Abandoned,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Dealt => "dealt",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Dealt | Self::Abandoned)
    }
}

impl std::str::FromStr for SessionState {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "open" => Ok(Self::Open),
            "dealt" => Ok(Self::Dealt),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown session state `{other}`"
            ))),
        }
    }
}

/// One buyer-product negotiation thread. Dealt and abandoned are terminal:
/// once entered, neither the state nor the transcript may change again.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationSession {
    pub id: SessionId,
    pub buyer_id: String,
    pub product_id: ProductId,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

impl NegotiationSession {
    pub fn open(buyer_id: impl Into<String>, product_id: ProductId) -> Self {
        Self {
            id: SessionId(Uuid::new_v4().to_string()),
            buyer_id: buyer_id.into(),
            product_id,
            state: SessionState::Open,
            created_at: Utc::now(),
        }
    }

    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self.state, next),
            (SessionState::Open, SessionState::Dealt)
                | (SessionState::Open, SessionState::Abandoned)
        )
    }

    pub fn transition_to(&mut self, next: SessionState) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.state = next;
            return Ok(());
        }

        Err(DomainError::InvalidSessionTransition { from: self.state, to: next })
    }
}

#[cfg(test)]
mod tests {
    use super::{NegotiationSession, SessionState};
    use crate::domain::product::ProductId;
    use crate::errors::DomainError;

    fn session() -> NegotiationSession {
        NegotiationSession::open("buyer-1", ProductId("p-1".to_string()))
    }

    #[test]
    fn new_sessions_start_open() {
        let session = session();
        assert_eq!(session.state, SessionState::Open);
        assert!(!session.state.is_terminal());
    }

    #[test]
    fn open_can_deal_or_abandon() {
        let mut dealt = session();
        dealt.transition_to(SessionState::Dealt).expect("open -> dealt");
        assert!(dealt.state.is_terminal());

        let mut abandoned = session();
        abandoned.transition_to(SessionState::Abandoned).expect("open -> abandoned");
        assert!(abandoned.state.is_terminal());
    }

    #[test]
    fn terminal_states_accept_no_transition() {
        let mut session = session();
        session.transition_to(SessionState::Dealt).expect("open -> dealt");

        let error = session
            .transition_to(SessionState::Abandoned)
            .expect_err("dealt is terminal");
        assert!(matches!(error, DomainError::InvalidSessionTransition { .. }));
        assert_eq!(session.state, SessionState::Dealt);
    }

    #[test]
    fn state_round_trips_through_strings() {
        for state in [SessionState::Open, SessionState::Dealt, SessionState::Abandoned] {
            assert_eq!(state.as_str().parse::<SessionState>().expect("parse"), state);
        }
        assert!("closed".parse::<SessionState>().is_err());
    }
}

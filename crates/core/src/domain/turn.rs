use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::session::SessionId;
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Buyer,
    Agent,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Agent => "agent",
        }
    }
}

impl std::str::FromStr for Speaker {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "buyer" => Ok(Self::Buyer),
            "agent" => Ok(Self::Agent),
            other => Err(DomainError::InvariantViolation(format!("unknown speaker `{other}`"))),
        }
    }
}

/// One immutable message unit in a session transcript. Sequence numbers are
/// contiguous per session starting at 0. Agent turns that carried a
/// counter-offer keep the proposed price so later exchanges can honor the
/// non-increasing concession rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub session_id: SessionId,
    pub sequence: i64,
    pub speaker: Speaker,
    pub text: String,
    pub counter_price: Option<i64>,
    pub created_at: DateTime<Utc>,
}

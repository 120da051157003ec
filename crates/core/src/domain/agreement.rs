use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::session::SessionId;

/// The single binding record of a closed deal. At most one exists per
/// session; writing it flips the session to dealt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agreement {
    pub session_id: SessionId,
    pub final_price: i64,
    pub created_at: DateTime<Utc>,
}

//! Reply interpretation.
//!
//! The only component that inspects raw backend text. Everything
//! downstream consumes the typed [`AgentDecision`]; control markers and
//! leak checks stop here. Marker detection is scoped to the agent-generated
//! reply — buyer-authored text is never scanned, so a buyer pasting the
//! marker string cannot force an acceptance.

use thiserror::Error;

use tawar_core::policy::NegotiationDirective;

use crate::prompt::format_rupiah;

/// Control token the backend is instructed to emit exactly on the deal
/// branch. Stripped before anything becomes buyer-visible.
pub const ACCEPTANCE_MARKER: &str = "DEAL_ACCEPTED";

/// Closed union of everything an agent reply can mean. Produced once, here;
/// no other component re-parses text for control signals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentDecision {
    Accept { final_price: i64 },
    Counter { proposal: i64 },
    Reject,
    BestPrice { net: i64 },
    Clarify,
}

impl AgentDecision {
    pub fn accepted(&self) -> bool {
        matches!(self, Self::Accept { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterpretedReply {
    pub decision: AgentDecision,
    pub visible_text: String,
}

impl InterpretedReply {
    pub fn accepted(&self) -> bool {
        self.decision.accepted()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterpretError {
    #[error("generated reply disclosed the reserve price")]
    FloorDisclosure,
    #[error("generated reply was empty after marker removal")]
    EmptyReply,
}

/// Parses a raw backend reply against the directive that produced it. The
/// directive is authoritative for the decision; the marker is a cross-check
/// on the generated text and is always stripped from the visible output.
pub fn interpret(
    raw_reply: &str,
    directive: &NegotiationDirective,
    floor_price: i64,
) -> Result<InterpretedReply, InterpretError> {
    let marker_present = raw_reply.contains(ACCEPTANCE_MARKER);
    let visible_text = raw_reply.replace(ACCEPTANCE_MARKER, "").trim().to_string();

    if visible_text.is_empty() {
        return Err(InterpretError::EmptyReply);
    }

    let decision = match directive {
        NegotiationDirective::Accept { price } => {
            if !marker_present {
                tracing::warn!(
                    event_name = "agent.interpret.marker_missing",
                    "accept directive produced a reply without the acceptance marker"
                );
            }
            AgentDecision::Accept { final_price: *price }
        }
        NegotiationDirective::Counter { proposal } => {
            warn_on_stray_marker(marker_present, directive);
            AgentDecision::Counter { proposal: *proposal }
        }
        NegotiationDirective::Reject { .. } => {
            warn_on_stray_marker(marker_present, directive);
            AgentDecision::Reject
        }
        NegotiationDirective::BestPrice { net } => {
            warn_on_stray_marker(marker_present, directive);
            AgentDecision::BestPrice { net: *net }
        }
        NegotiationDirective::Clarify => {
            warn_on_stray_marker(marker_present, directive);
            AgentDecision::Clarify
        }
    };

    if leaks_floor(&visible_text, floor_price, &directive.disclosed_prices()) {
        return Err(InterpretError::FloorDisclosure);
    }

    Ok(InterpretedReply { decision, visible_text })
}

fn warn_on_stray_marker(marker_present: bool, directive: &NegotiationDirective) {
    if marker_present {
        tracing::warn!(
            event_name = "agent.interpret.stray_marker",
            branch = directive.branch_key(),
            "non-accept directive produced the acceptance marker; marker dropped"
        );
    }
}

/// True when the floor price digits show up outside any price the directive
/// sanctioned for disclosure. A sanctioned price that coincides with the
/// floor does not reveal that it is the floor.
fn leaks_floor(visible_text: &str, floor_price: i64, sanctioned: &[i64]) -> bool {
    let mut scrubbed = visible_text.to_string();
    for price in sanctioned {
        for variant in [price.to_string(), format_rupiah(*price)] {
            scrubbed = scrubbed.replace(&variant, "#");
        }
    }

    [floor_price.to_string(), format_rupiah(floor_price)]
        .iter()
        .any(|needle| scrubbed.contains(needle.as_str()))
}

#[cfg(test)]
mod tests {
    use tawar_core::policy::NegotiationDirective;

    use super::{interpret, AgentDecision, InterpretError, ACCEPTANCE_MARKER};

    const FLOOR: i64 = 70_000;

    #[test]
    fn marker_is_stripped_and_acceptance_carried() {
        let reply = format!("{ACCEPTANCE_MARKER} Sip bos, 80.000 meluncur!");
        let interpreted = interpret(
            &reply,
            &NegotiationDirective::Accept { price: 80_000 },
            FLOOR,
        )
        .expect("interpret");

        assert!(interpreted.accepted());
        assert_eq!(interpreted.decision, AgentDecision::Accept { final_price: 80_000 });
        assert_eq!(interpreted.visible_text, "Sip bos, 80.000 meluncur!");
        assert!(!interpreted.visible_text.contains(ACCEPTANCE_MARKER));
    }

    #[test]
    fn marker_absence_is_ordinary_no_deal() {
        let interpreted = interpret(
            "Waduh bos, belum dapet segitu mah.",
            &NegotiationDirective::Reject { offer: 50_000 },
            FLOOR,
        )
        .expect("interpret");

        assert!(!interpreted.accepted());
        assert_eq!(interpreted.decision, AgentDecision::Reject);
        assert_eq!(interpreted.visible_text, "Waduh bos, belum dapet segitu mah.");
    }

    #[test]
    fn stray_marker_on_non_accept_branch_is_dropped() {
        let reply = format!("Belum bisa bos {ACCEPTANCE_MARKER}");
        let interpreted = interpret(
            &reply,
            &NegotiationDirective::Reject { offer: 50_000 },
            FLOOR,
        )
        .expect("interpret");

        assert!(!interpreted.accepted());
        assert_eq!(interpreted.visible_text, "Belum bisa bos");
    }

    #[test]
    fn missing_marker_on_accept_branch_still_accepts() {
        let interpreted = interpret(
            "Oke bos, ambil deh.",
            &NegotiationDirective::Accept { price: 80_000 },
            FLOOR,
        )
        .expect("interpret");

        assert!(interpreted.accepted());
    }

    #[test]
    fn floor_disclosure_aborts_the_reply() {
        let error = interpret(
            "Modalnya aja 70000 bos, ga bisa turun.",
            &NegotiationDirective::Reject { offer: 50_000 },
            FLOOR,
        )
        .expect_err("leak must abort");

        assert_eq!(error, InterpretError::FloorDisclosure);
    }

    #[test]
    fn dotted_floor_disclosure_is_also_caught() {
        let error = interpret(
            "Di bawah 70.000 rugi bang.",
            &NegotiationDirective::Counter { proposal: 86_000 },
            FLOOR,
        )
        .expect_err("leak must abort");

        assert_eq!(error, InterpretError::FloorDisclosure);
    }

    #[test]
    fn sanctioned_price_equal_to_floor_is_allowed() {
        // Best price clamped to the floor: stating the number is fine, it
        // is just a price, not a disclosure that it is the floor.
        let interpreted = interpret(
            "Harga pas 70.000 ya bos, mentok.",
            &NegotiationDirective::BestPrice { net: 70_000 },
            FLOOR,
        )
        .expect("interpret");

        assert_eq!(interpreted.decision, AgentDecision::BestPrice { net: 70_000 });
    }

    #[test]
    fn empty_reply_after_marker_removal_is_an_error() {
        let error = interpret(
            &format!("  {ACCEPTANCE_MARKER}  "),
            &NegotiationDirective::Accept { price: 80_000 },
            FLOOR,
        )
        .expect_err("empty reply");

        assert_eq!(error, InterpretError::EmptyReply);
    }
}

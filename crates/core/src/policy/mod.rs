//! Deterministic negotiation policy.
//!
//! The generation backend never decides prices. This module turns product
//! economics, the session's concession history, and the new buyer message
//! into exactly one [`NegotiationDirective`]; the backend only phrases the
//! branch that already fired. All comparisons use exact integer currency
//! units.

pub mod offer;

use serde::{Deserialize, Serialize};

use crate::domain::product::Product;
use crate::errors::DomainError;
use offer::{extract_offer, is_best_price_query};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationTuning {
    /// Flat discount applied when a buyer asks for the best price, percent
    /// off the list price.
    pub net_discount_pct: u8,
    /// Offers at or above this share of the list price are taken
    /// immediately; lower (but still at/above floor) offers get a counter.
    pub accept_threshold_pct: u8,
}

impl Default for NegotiationTuning {
    fn default() -> Self {
        Self { net_discount_pct: 5, accept_threshold_pct: 80 }
    }
}

/// The one branch that fires for a buyer message. Exactly one variant per
/// exchange; downstream components consume only this, never raw text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "branch", rename_all = "snake_case")]
pub enum NegotiationDirective {
    Accept { price: i64 },
    Counter { proposal: i64 },
    Reject { offer: i64 },
    BestPrice { net: i64 },
    Clarify,
}

impl NegotiationDirective {
    pub fn branch_key(&self) -> &'static str {
        match self {
            Self::Accept { .. } => "accept",
            Self::Counter { .. } => "counter",
            Self::Reject { .. } => "reject",
            Self::BestPrice { .. } => "best_price",
            Self::Clarify => "clarify",
        }
    }

    pub fn counter_price(&self) -> Option<i64> {
        match self {
            Self::Counter { proposal } => Some(*proposal),
            _ => None,
        }
    }

    /// Prices the agent is allowed to state in its visible reply. The floor
    /// itself is never in this set unless a sanctioned price happens to
    /// coincide with it.
    pub fn disclosed_prices(&self) -> Vec<i64> {
        match self {
            Self::Accept { price } => vec![*price],
            Self::Counter { proposal } => vec![*proposal],
            Self::BestPrice { net } => vec![*net],
            Self::Reject { .. } | Self::Clarify => Vec::new(),
        }
    }
}

/// Concession state recovered from the session's prior agent turns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CounterHistory {
    /// Lowest counter proposed so far in this session, if any. Later
    /// counters must never exceed it.
    pub lowest_counter: Option<i64>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PolicyEngine {
    tuning: NegotiationTuning,
}

impl PolicyEngine {
    pub fn new(tuning: NegotiationTuning) -> Self {
        Self { tuning }
    }

    pub fn decide(
        &self,
        product: &Product,
        history: CounterHistory,
        buyer_text: &str,
    ) -> Result<NegotiationDirective, DomainError> {
        product.validate_economics()?;
        if buyer_text.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "buyer message must not be empty".to_string(),
            ));
        }

        match extract_offer(buyer_text) {
            Some(offer) => Ok(self.price_branch(product, history, offer)),
            None if is_best_price_query(buyer_text) => {
                Ok(NegotiationDirective::BestPrice { net: self.net_price(product) })
            }
            None => Ok(NegotiationDirective::Clarify),
        }
    }

    fn price_branch(
        &self,
        product: &Product,
        history: CounterHistory,
        offer: i64,
    ) -> NegotiationDirective {
        if offer < product.floor_price {
            return NegotiationDirective::Reject { offer };
        }
        if offer >= self.accept_threshold(product.list_price) || offer >= product.list_price {
            return NegotiationDirective::Accept { price: offer };
        }

        // Offer clears the floor but is still far from list: counter at the
        // midpoint, strictly below list, never below floor, and never above
        // an earlier counter in this session.
        let mut proposal = offer + (product.list_price - offer) / 2;
        proposal = proposal.min(product.list_price - 1);
        if let Some(lowest) = history.lowest_counter {
            proposal = proposal.min(lowest);
        }
        proposal = proposal.max(product.floor_price);

        // A counter at or below what the buyer already offered is a worse
        // deal for the seller than just taking the offer.
        if proposal <= offer {
            return NegotiationDirective::Accept { price: offer };
        }
        NegotiationDirective::Counter { proposal }
    }

    fn accept_threshold(&self, list_price: i64) -> i64 {
        pct_of(list_price, self.tuning.accept_threshold_pct)
    }

    fn net_price(&self, product: &Product) -> i64 {
        let discounted = product.list_price - pct_of(product.list_price, self.tuning.net_discount_pct);
        discounted.max(product.floor_price)
    }
}

fn pct_of(amount: i64, pct: u8) -> i64 {
    ((amount as i128 * i128::from(pct)) / 100) as i64
}

#[cfg(test)]
mod tests {
    use super::{CounterHistory, NegotiationDirective, NegotiationTuning, PolicyEngine};
    use crate::domain::product::Product;
    use crate::errors::DomainError;

    fn product() -> Product {
        Product::new("p-1", "Sepatu Lari", 100_000, 70_000).expect("valid product")
    }

    fn engine() -> PolicyEngine {
        PolicyEngine::new(NegotiationTuning::default())
    }

    #[test]
    fn offer_below_floor_is_rejected() {
        let directive = engine()
            .decide(&product(), CounterHistory::default(), "mau 50000")
            .expect("decide");
        assert_eq!(directive, NegotiationDirective::Reject { offer: 50_000 });
    }

    #[test]
    fn offer_at_floor_clearing_threshold_is_accepted() {
        let directive = engine()
            .decide(&product(), CounterHistory::default(), "80000 deal ga")
            .expect("decide");
        assert_eq!(directive, NegotiationDirective::Accept { price: 80_000 });
    }

    #[test]
    fn best_price_query_gets_flat_discount() {
        let directive = engine()
            .decide(&product(), CounterHistory::default(), "net berapa?")
            .expect("decide");
        assert_eq!(directive, NegotiationDirective::BestPrice { net: 95_000 });
    }

    #[test]
    fn low_but_viable_offer_gets_countered_at_midpoint() {
        let directive = engine()
            .decide(&product(), CounterHistory::default(), "gimana kalau 72000")
            .expect("decide");
        assert_eq!(directive, NegotiationDirective::Counter { proposal: 86_000 });
    }

    #[test]
    fn counters_never_increase_within_a_session() {
        let engine = engine();
        let product = product();

        let first = engine
            .decide(&product, CounterHistory::default(), "72000 bisa?")
            .expect("decide");
        let first_counter = first.counter_price().expect("first counter");

        let second = engine
            .decide(
                &product,
                CounterHistory { lowest_counter: Some(first_counter) },
                "yaudah 71000 deh",
            )
            .expect("decide");
        let second_counter = second.counter_price().expect("second counter");

        assert!(second_counter <= first_counter);
    }

    #[test]
    fn counter_clamped_to_or_below_offer_degrades_to_accept() {
        // An earlier concession already went to 75_000; a fresh offer at
        // that level should close the deal instead of re-proposing it.
        let directive = engine()
            .decide(
                &product(),
                CounterHistory { lowest_counter: Some(75_000) },
                "oke 75000 ya",
            )
            .expect("decide");
        assert_eq!(directive, NegotiationDirective::Accept { price: 75_000 });
    }

    #[test]
    fn counter_stays_strictly_below_list() {
        let product = Product::new("p-2", "Gelas", 10, 0).expect("valid product");
        let directive = engine()
            .decide(&product, CounterHistory::default(), "ambil 7 ya")
            .expect("decide");
        match directive {
            NegotiationDirective::Counter { proposal } => assert!(proposal < 10),
            NegotiationDirective::Accept { .. } => {}
            other => panic!("unexpected directive: {other:?}"),
        }
    }

    #[test]
    fn net_price_never_undercuts_floor() {
        let tight = Product::new("p-3", "Koleksi", 100_000, 98_000).expect("valid product");
        let directive = engine()
            .decide(&tight, CounterHistory::default(), "harga pas berapa?")
            .expect("decide");
        assert_eq!(directive, NegotiationDirective::BestPrice { net: 98_000 });
    }

    #[test]
    fn chatter_without_price_signal_clarifies() {
        let directive = engine()
            .decide(&product(), CounterHistory::default(), "barangnya masih ada?")
            .expect("decide");
        assert_eq!(directive, NegotiationDirective::Clarify);
    }

    #[test]
    fn offer_above_list_is_accepted_at_offer() {
        let directive = engine()
            .decide(&product(), CounterHistory::default(), "120000 langsung kirim")
            .expect("decide");
        assert_eq!(directive, NegotiationDirective::Accept { price: 120_000 });
    }

    #[test]
    fn empty_message_violates_preconditions() {
        let error = engine()
            .decide(&product(), CounterHistory::default(), "   ")
            .expect_err("empty message");
        assert!(matches!(error, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn invalid_economics_are_fatal() {
        let mut broken = product();
        broken.floor_price = broken.list_price + 1;
        let error = engine()
            .decide(&broken, CounterHistory::default(), "mau 50000")
            .expect_err("invalid economics");
        assert!(matches!(error, DomainError::InvalidEconomics { .. }));
    }
}

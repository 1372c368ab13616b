//! Local bet slip.
//!
//! Holds the bets a session has placed on the current table, keyed by
//! market id. A second bet on the same market replaces the first. The slip
//! is purely local: nothing here talks to the network.

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::types::{BetType, PlacedBet};

#[derive(Debug, Clone, Default)]
pub struct BetSlip {
    bets: HashMap<String, PlacedBet>,
}

impl BetSlip {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a bet, replacing any earlier bet on the same market.
    pub fn record(
        &mut self,
        market_id: &str,
        market_name: &str,
        stake: Decimal,
        odds: Decimal,
        bet_type: BetType,
    ) -> &PlacedBet {
        let bet = PlacedBet {
            market_id: market_id.to_string(),
            market_name: market_name.to_string(),
            stake,
            odds,
            bet_type,
            placed_at: Utc::now(),
        };
        self.bets.insert(market_id.to_string(), bet);
        &self.bets[market_id]
    }

    pub fn get(&self, market_id: &str) -> Option<&PlacedBet> {
        self.bets.get(market_id)
    }

    pub fn remove(&mut self, market_id: &str) -> Option<PlacedBet> {
        self.bets.remove(market_id)
    }

    /// Drop every bet.
    pub fn clear(&mut self) {
        self.bets.clear();
    }

    pub fn len(&self) -> usize {
        self.bets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bets.is_empty()
    }

    pub fn bets(&self) -> impl Iterator<Item = &PlacedBet> {
        self.bets.values()
    }

    pub fn total_stake(&self) -> Decimal {
        self.bets.values().map(|b| b.stake).sum()
    }

    pub fn total_potential_payout(&self) -> Decimal {
        self.bets.values().map(PlacedBet::potential_payout).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_record_and_payout() {
        let mut slip = BetSlip::new();
        let bet = slip.record("m1", "Player A", dec!(100), dec!(1.98), BetType::Back);
        assert_eq!(bet.potential_payout(), dec!(198.00));
        assert_eq!(slip.len(), 1);
    }

    #[test]
    fn test_same_market_replaces() {
        let mut slip = BetSlip::new();
        slip.record("m1", "Player A", dec!(100), dec!(1.98), BetType::Back);
        slip.record("m1", "Player A", dec!(50), dec!(2.10), BetType::Back);
        assert_eq!(slip.len(), 1);
        assert_eq!(slip.get("m1").unwrap().stake, dec!(50));
    }

    #[test]
    fn test_totals() {
        let mut slip = BetSlip::new();
        slip.record("m1", "Dragon", dec!(100), dec!(2), BetType::Back);
        slip.record("m2", "Tiger", dec!(40), dec!(1.5), BetType::Back);
        assert_eq!(slip.total_stake(), dec!(140));
        assert_eq!(slip.total_potential_payout(), dec!(260));
    }

    #[test]
    fn test_clear_empties() {
        let mut slip = BetSlip::new();
        slip.record("m1", "Dragon", dec!(10), dec!(2), BetType::Back);
        slip.record("m2", "Tiger", dec!(10), dec!(2), BetType::Lay);
        slip.clear();
        assert!(slip.is_empty());
        assert_eq!(slip.total_stake(), Decimal::ZERO);
    }

    #[test]
    fn test_remove() {
        let mut slip = BetSlip::new();
        slip.record("m1", "Dragon", dec!(10), dec!(2), BetType::Back);
        assert!(slip.remove("m1").is_some());
        assert!(slip.remove("m1").is_none());
    }
}

//! Demo settlement.
//!
//! Resolves a bet slip locally for demo tables and tests. Nothing here
//! touches a wallet or a ledger; production settlement goes through
//! [`crate::settlement`].

use rand::seq::SliceRandom;
use rand::Rng;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::betslip::BetSlip;
use crate::types::{exposure, BetStatus, BetType, CasinoGameData, PlacedBet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulatedBet {
    pub market_id: String,
    pub bet_type: BetType,
    pub stake: Decimal,
    pub odds: Decimal,
    /// What the bet puts at risk: the stake for a back, the liability for a lay.
    pub staked: Decimal,
    pub status: BetStatus,
    /// Amount returned to the player (0 when lost).
    pub returned: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    pub winner: String,
    pub bets: Vec<SimulatedBet>,
    pub total_stake: Decimal,
    pub total_returned: Decimal,
}

impl SimulationReport {
    /// Player profit (negative when the house wins).
    pub fn net(&self) -> Decimal {
        self.total_returned - self.total_stake
    }
}

fn resolve(bet: &PlacedBet, winner: &str) -> SimulatedBet {
    let hit = bet.market_id == winner;
    let won = match bet.bet_type {
        BetType::Back => hit,
        BetType::Lay => !hit,
    };
    let (status, returned) = if won {
        (BetStatus::Won, bet.potential_payout())
    } else {
        (BetStatus::Lost, Decimal::ZERO)
    };
    SimulatedBet {
        market_id: bet.market_id.clone(),
        bet_type: bet.bet_type,
        stake: bet.stake,
        odds: bet.odds,
        staked: exposure(bet.bet_type, bet.stake, bet.odds),
        status,
        returned,
    }
}

/// Settle every bet on the slip against `winner` (a market id).
pub fn simulate(slip: &BetSlip, winner: &str) -> SimulationReport {
    let mut bets: Vec<SimulatedBet> = slip.bets().map(|b| resolve(b, winner)).collect();
    bets.sort_by(|a, b| a.market_id.cmp(&b.market_id));

    let report = SimulationReport {
        winner: winner.to_string(),
        total_stake: bets.iter().map(|b| b.staked).sum(),
        total_returned: bets.iter().map(|b| b.returned).sum(),
        bets,
    };
    info!(
        winner,
        bets = report.bets.len(),
        stake = %report.total_stake,
        returned = %report.total_returned,
        "Simulated round"
    );
    report
}

/// Pick a winning selection uniformly among the table's markets.
pub fn random_winner<R: Rng + ?Sized>(data: &CasinoGameData, rng: &mut R) -> Option<String> {
    data.markets
        .choose(rng)
        .map(|m| m.selection_id.clone())
}

/// Draw a winner and settle the slip against it.
pub fn simulate_random<R: Rng + ?Sized>(
    slip: &BetSlip,
    data: &CasinoGameData,
    rng: &mut R,
) -> Option<SimulationReport> {
    random_winner(data, rng).map(|w| simulate(slip, &w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CasinoMarket, MarketStatus};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal_macros::dec;

    fn table() -> CasinoGameData {
        CasinoGameData {
            game_type: "dt20".into(),
            round_id: "r1".into(),
            timer: Some(10),
            cards: String::new(),
            markets: ["1", "2", "3"]
                .iter()
                .map(|id| CasinoMarket {
                    selection_id: id.to_string(),
                    name: format!("sel-{id}"),
                    back: Some(dec!(2)),
                    lay: None,
                    status: MarketStatus::Active,
                })
                .collect(),
        }
    }

    #[test]
    fn test_simulate_back_and_lay() {
        let mut slip = BetSlip::new();
        slip.record("1", "Dragon", dec!(100), dec!(1.98), BetType::Back);
        slip.record("2", "Tiger", dec!(50), dec!(2), BetType::Back);
        slip.record("3", "Tie", dec!(10), dec!(11), BetType::Lay);

        let report = simulate(&slip, "1");
        assert_eq!(report.bets[0].returned, dec!(198.00));
        assert_eq!(report.bets[1].status, BetStatus::Lost);
        assert_eq!(report.bets[2].status, BetStatus::Won);
        // The Tie lay at 11 risks 100 and returns liability plus stake.
        assert_eq!(report.bets[2].staked, dec!(100));
        assert_eq!(report.bets[2].returned, dec!(110));
        assert_eq!(report.total_stake, dec!(250));
        assert_eq!(report.total_returned, dec!(308.00));
        assert_eq!(report.net(), dec!(58.00));
    }

    #[test]
    fn test_simulated_lay_loss_costs_liability() {
        let mut slip = BetSlip::new();
        slip.record("3", "Tie", dec!(10), dec!(11), BetType::Lay);

        let report = simulate(&slip, "3");
        assert_eq!(report.bets[0].status, BetStatus::Lost);
        assert_eq!(report.total_stake, dec!(100));
        assert_eq!(report.net(), dec!(-100));
    }

    #[test]
    fn test_simulate_empty_slip() {
        let report = simulate(&BetSlip::new(), "1");
        assert!(report.bets.is_empty());
        assert_eq!(report.net(), Decimal::ZERO);
    }

    #[test]
    fn test_random_winner_is_a_market() {
        let mut rng = StdRng::seed_from_u64(7);
        let data = table();
        for _ in 0..20 {
            let w = random_winner(&data, &mut rng).unwrap();
            assert!(data.market(&w).is_some());
        }
    }

    #[test]
    fn test_random_winner_empty_table() {
        let mut data = table();
        data.markets.clear();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(simulate_random(&BetSlip::new(), &data, &mut rng).is_none());
    }
}

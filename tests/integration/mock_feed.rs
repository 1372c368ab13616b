//! Mock casino feed for integration testing.
//!
//! Serves a fixed table whose round id and result can be driven from test
//! code, with an optional forced error. Everything is in-memory.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};

use oddsdesk::feeds::CasinoFeed;
use oddsdesk::types::{CasinoGameData, CasinoMarket, CasinoResult, MarketStatus, RoundResult};

pub struct MockFeed {
    round_id: Arc<Mutex<String>>,
    winners: Arc<Mutex<Vec<RoundResult>>>,
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockFeed {
    pub fn new(round_id: &str) -> Self {
        Self {
            round_id: Arc::new(Mutex::new(round_id.to_string())),
            winners: Arc::new(Mutex::new(Vec::new())),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Close the current round with `winner` and open `next_round`.
    pub fn finish_round(&self, winner: &str, next_round: &str) {
        let mut round = self.round_id.lock().unwrap();
        self.winners.lock().unwrap().insert(
            0,
            RoundResult {
                round_id: round.clone(),
                winner: winner.to_string(),
            },
        );
        *round = next_round.to_string();
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    fn check_error(&self) -> Result<()> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl CasinoFeed for MockFeed {
    async fn fetch_game_data(&self, game_type: &str) -> Result<CasinoGameData> {
        self.check_error()?;
        Ok(CasinoGameData {
            game_type: game_type.to_string(),
            round_id: self.round_id.lock().unwrap().clone(),
            timer: Some(12),
            cards: "1|2|3".to_string(),
            markets: vec![
                CasinoMarket {
                    selection_id: "1".into(),
                    name: "Dragon".into(),
                    back: Some(dec!(1.98)),
                    lay: Some(dec!(2.02)),
                    status: MarketStatus::Active,
                },
                CasinoMarket {
                    selection_id: "2".into(),
                    name: "Tiger".into(),
                    back: Some(dec!(1.98)),
                    lay: Some(dec!(2.02)),
                    status: MarketStatus::Active,
                },
                CasinoMarket {
                    selection_id: "3".into(),
                    name: "Tie".into(),
                    back: Some(dec!(11)),
                    lay: None,
                    status: MarketStatus::Suspended,
                },
            ],
        })
    }

    async fn fetch_result(&self, game_type: &str) -> Result<CasinoResult> {
        self.check_error()?;
        Ok(CasinoResult {
            game_type: game_type.to_string(),
            rounds: self.winners.lock().unwrap().clone(),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

//! Live casino table poller.
//!
//! For one table, two independent interval tasks fetch the current round
//! and the latest results. Each successful fetch replaces its half of the
//! snapshot wholesale; any failure records the error and flips
//! `is_connected` off. There is no backoff: the next tick is the retry.
//!
//! Stopping the poller (or dropping it) aborts both tasks, and a response
//! that was already in flight is discarded instead of written.

use anyhow::Result;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::betslip::BetSlip;
use crate::config::PollerConfig;
use crate::feeds::CasinoFeed;
use crate::types::{BetPlacementOutcome, BetRequest, BetType, CasinoGameData, CasinoResult};
use crate::wallet::BetPlacement;

/// Everything a table view needs, replaced piecemeal by the poll tasks.
#[derive(Debug, Clone, Default)]
pub struct PollerSnapshot {
    pub game_data: Option<CasinoGameData>,
    pub last_result: Option<CasinoResult>,
    pub is_connected: bool,
    pub error: Option<String>,
    pub slip: BetSlip,
    /// Bumped on every write; also published on the watch channel.
    pub revision: u64,
}

#[derive(Clone)]
struct PollContext {
    state: Arc<RwLock<PollerSnapshot>>,
    active: Arc<AtomicBool>,
    changes: Arc<watch::Sender<u64>>,
}

impl PollContext {
    /// Write into the snapshot unless the poller has been stopped.
    ///
    /// The flag is checked again once the lock is held, since `stop` can
    /// land while a writer is queued.
    async fn write<F: FnOnce(&mut PollerSnapshot)>(&self, f: F) -> bool {
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        let mut state = self.state.write().await;
        if !self.active.load(Ordering::Acquire) {
            return false;
        }
        f(&mut state);
        state.revision += 1;
        let _ = self.changes.send(state.revision);
        true
    }
}

pub struct CasinoPoller {
    game_type: String,
    user_id: String,
    ctx: PollContext,
    placement: Arc<dyn BetPlacement>,
    tasks: Vec<JoinHandle<()>>,
}

impl CasinoPoller {
    /// Start polling `game_type`. Must be called inside a Tokio runtime.
    pub fn start(
        game_type: &str,
        user_id: &str,
        feed: Arc<dyn CasinoFeed>,
        placement: Arc<dyn BetPlacement>,
        config: &PollerConfig,
    ) -> Self {
        let (tx, _rx) = watch::channel(0);
        let ctx = PollContext {
            state: Arc::new(RwLock::new(PollerSnapshot::default())),
            active: Arc::new(AtomicBool::new(true)),
            changes: Arc::new(tx),
        };

        let data_task = {
            let feed = feed.clone();
            let game_type = game_type.to_string();
            spawn_poll(
                ctx.clone(),
                config.data_interval(),
                "game data",
                move || {
                    let feed = feed.clone();
                    let game_type = game_type.clone();
                    async move { feed.fetch_game_data(&game_type).await }
                },
                |s, data| s.game_data = Some(data),
            )
        };

        let result_task = {
            let game_type = game_type.to_string();
            spawn_poll(
                ctx.clone(),
                config.result_interval(),
                "result",
                move || {
                    let feed = feed.clone();
                    let game_type = game_type.clone();
                    async move { feed.fetch_result(&game_type).await }
                },
                |s, result| s.last_result = Some(result),
            )
        };

        info!(
            game_type,
            data_ms = config.data_interval_ms,
            result_ms = config.result_interval_ms,
            "Casino poller started"
        );

        Self {
            game_type: game_type.to_string(),
            user_id: user_id.to_string(),
            ctx,
            placement,
            tasks: vec![data_task, result_task],
        }
    }

    pub fn game_type(&self) -> &str {
        &self.game_type
    }

    pub async fn snapshot(&self) -> PollerSnapshot {
        self.ctx.state.read().await.clone()
    }

    pub async fn is_connected(&self) -> bool {
        self.ctx.state.read().await.is_connected
    }

    /// Receiver that yields the snapshot revision after every write.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.ctx.changes.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.ctx.active.load(Ordering::Acquire)
    }

    /// Forward a bet and record it on the slip if the backend says success.
    ///
    /// The bet is filed against the current round, which is the unit
    /// settlement works on. `market_id` is the selection id on the table and
    /// becomes the bet's selection, matching the winner id the result feed
    /// publishes.
    pub async fn place_bet(
        &self,
        market_id: &str,
        market_name: &str,
        stake: Decimal,
        odds: Decimal,
        bet_type: BetType,
    ) -> Result<BetPlacementOutcome> {
        let round_id = {
            let state = self.ctx.state.read().await;
            state.game_data.as_ref().map(|d| d.round_id.clone())
        };
        let Some(round_id) = round_id else {
            warn!(game_type = %self.game_type, market_id, "Bet refused: no open round");
            return Ok(BetPlacementOutcome::failed("No open round"));
        };

        let req = BetRequest {
            user_id: self.user_id.clone(),
            event_id: self.game_type.clone(),
            market_id: round_id,
            market_name: market_name.to_string(),
            selection: market_id.to_string(),
            bet_type,
            odds,
            stake,
            reference: Some(uuid::Uuid::new_v4().to_string()),
        };

        let outcome = self.placement.place_bet(&req).await?;
        if outcome.success {
            self.ctx
                .write(|s| {
                    s.slip.record(market_id, market_name, stake, odds, bet_type);
                })
                .await;
            info!(
                game_type = %self.game_type,
                market_id,
                stake = %stake,
                odds = %odds,
                "Bet recorded on slip"
            );
        } else {
            warn!(
                game_type = %self.game_type,
                market_id,
                error = ?outcome.error,
                "Bet placement refused"
            );
        }
        Ok(outcome)
    }

    /// Empty the local slip. No network call is made.
    pub async fn clear_bets(&self) {
        self.ctx.write(|s| s.slip.clear()).await;
        debug!(game_type = %self.game_type, "Bet slip cleared");
    }

    /// Abort both poll tasks. Idempotent.
    pub fn stop(&mut self) {
        if self.ctx.active.swap(false, Ordering::AcqRel) {
            info!(game_type = %self.game_type, "Casino poller stopped");
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for CasinoPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_poll<T, Fut, F, A>(
    ctx: PollContext,
    period: Duration,
    label: &'static str,
    fetch: F,
    apply: A,
) -> JoinHandle<()>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    A: Fn(&mut PollerSnapshot, T) + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let outcome = fetch().await;
            let written = match outcome {
                Ok(value) => {
                    ctx.write(|s| {
                        apply(s, value);
                        s.is_connected = true;
                        s.error = None;
                    })
                    .await
                }
                Err(e) => {
                    warn!(what = label, error = %e, "Poll failed");
                    let msg = e.to_string();
                    ctx.write(|s| {
                        s.is_connected = false;
                        s.error = Some(msg);
                    })
                    .await
                }
            };
            if !written {
                debug!(what = label, "Poller inactive, discarding response");
                break;
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Wallet ledger, the single source of truth for balances and bets.
//!
//! Every wallet keeps a running balance plus a version that is bumped on
//! each movement. Movements are compare-and-swap updates on that version,
//! so a caller holding a stale view of the wallet is refused rather than
//! silently overwriting a concurrent write. Each movement is also recorded
//! as a [`Transaction`] whose reference is unique per user and kind;
//! replaying a reference is a no-op. Bet debits and settlement credits use
//! their own kinds, so a client deposit reference can never shadow them.
//!
//! The transaction log is never used to derive a balance. [`Ledger::audit`]
//! sums it only to detect drift.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::types::{
    Bet, BetRequest, BetStatus, DeskError, ResultCode, SettlementSummary, Transaction,
    TransactionKind,
};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Running balance for one user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: String,
    pub balance: Decimal,
    pub version: u64,
}

/// Everything the ledger owns. Serialised as-is by [`crate::storage`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub wallets: BTreeMap<String, Wallet>,
    pub transactions: Vec<Transaction>,
    pub bets: Vec<Bet>,
}

/// A balance that disagrees with the sum of its transactions.
#[derive(Debug, Clone, PartialEq)]
pub struct Drift {
    pub user_id: String,
    pub balance: Decimal,
    pub ledger_sum: Decimal,
}

impl LedgerSnapshot {
    fn wallet(&self, user_id: &str) -> Wallet {
        self.wallets.get(user_id).cloned().unwrap_or_else(|| Wallet {
            user_id: user_id.to_string(),
            ..Wallet::default()
        })
    }

    fn find_transaction(
        &self,
        user_id: &str,
        kind: TransactionKind,
        reference: &str,
    ) -> Option<&Transaction> {
        self.transactions
            .iter()
            .find(|t| t.user_id == user_id && t.kind == kind && t.reference == reference)
    }

    /// Apply a signed movement to a wallet.
    ///
    /// `expected_version` of `None` means "whatever is current"; the update
    /// still happens under the ledger lock so it is atomic either way.
    fn apply(
        &mut self,
        user_id: &str,
        delta: Decimal,
        kind: TransactionKind,
        reference: &str,
        expected_version: Option<u64>,
    ) -> Result<Wallet, DeskError> {
        if self.find_transaction(user_id, kind, reference).is_some() {
            return Err(DeskError::DuplicateReference(reference.to_string()));
        }

        let current = self.wallet(user_id);
        if let Some(expected) = expected_version {
            if expected != current.version {
                return Err(DeskError::VersionConflict {
                    user_id: user_id.to_string(),
                    expected,
                    found: current.version,
                });
            }
        }

        let new_balance = current.balance + delta;
        if new_balance < Decimal::ZERO {
            return Err(DeskError::InsufficientBalance {
                needed: -delta,
                available: current.balance,
            });
        }

        let updated = Wallet {
            user_id: user_id.to_string(),
            balance: new_balance,
            version: current.version + 1,
        };
        self.wallets.insert(user_id.to_string(), updated.clone());
        self.transactions.push(Transaction {
            reference: reference.to_string(),
            user_id: user_id.to_string(),
            kind,
            amount: delta,
            balance_after: new_balance,
            created_at: Utc::now(),
        });

        debug!(
            user_id,
            kind = %kind,
            amount = %delta,
            balance = %new_balance,
            version = updated.version,
            "Ledger movement"
        );
        Ok(updated)
    }

    /// Credit or debit with an idempotent reference.
    ///
    /// Replaying a reference with the same user, kind and amount returns the
    /// current wallet untouched; reusing it for anything else is an error.
    fn apply_idempotent(
        &mut self,
        user_id: &str,
        delta: Decimal,
        kind: TransactionKind,
        reference: &str,
    ) -> Result<Wallet, DeskError> {
        if let Some(existing) = self.find_transaction(user_id, kind, reference) {
            if existing.amount == delta {
                debug!(reference, "Replayed reference ignored");
                return Ok(self.wallet(user_id));
            }
            return Err(DeskError::DuplicateReference(reference.to_string()));
        }
        self.apply(user_id, delta, kind, reference, None)
    }
}

fn require_positive(amount: Decimal) -> Result<(), DeskError> {
    if amount <= Decimal::ZERO {
        return Err(DeskError::InvalidAmount(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

pub struct Ledger {
    state: Mutex<LedgerSnapshot>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self::from_snapshot(LedgerSnapshot::default())
    }

    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self {
            state: Mutex::new(snapshot),
        }
    }

    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.state.lock().await.clone()
    }

    // -- Wallet ------------------------------------------------------------

    /// Current wallet. Unknown users have a zero balance at version 0.
    pub async fn wallet(&self, user_id: &str) -> Wallet {
        self.state.lock().await.wallet(user_id)
    }

    pub async fn balance(&self, user_id: &str) -> Decimal {
        self.wallet(user_id).await.balance
    }

    /// Credit a deposit. Replaying `reference` does not credit twice.
    pub async fn deposit(
        &self,
        user_id: &str,
        amount: Decimal,
        reference: &str,
    ) -> Result<Decimal, DeskError> {
        require_positive(amount)?;
        let mut state = self.state.lock().await;
        let wallet = state.apply_idempotent(user_id, amount, TransactionKind::Deposit, reference)?;
        info!(user_id, amount = %amount, balance = %wallet.balance, "Deposit applied");
        Ok(wallet.balance)
    }

    /// Debit a withdrawal. Fails without side effects when funds are short.
    pub async fn withdraw(
        &self,
        user_id: &str,
        amount: Decimal,
        reference: &str,
    ) -> Result<Decimal, DeskError> {
        require_positive(amount)?;
        let mut state = self.state.lock().await;
        let wallet =
            state.apply_idempotent(user_id, -amount, TransactionKind::Withdrawal, reference)?;
        info!(user_id, amount = %amount, balance = %wallet.balance, "Withdrawal applied");
        Ok(wallet.balance)
    }

    /// Apply a movement only if the wallet is still at `expected_version`.
    pub async fn compare_and_swap(
        &self,
        user_id: &str,
        expected_version: u64,
        delta: Decimal,
        kind: TransactionKind,
        reference: &str,
    ) -> Result<Wallet, DeskError> {
        if delta == Decimal::ZERO {
            return Err(DeskError::InvalidAmount("delta must be non-zero".into()));
        }
        let mut state = self.state.lock().await;
        state.apply(user_id, delta, kind, reference, Some(expected_version))
    }

    pub async fn transactions_for(&self, user_id: &str) -> Vec<Transaction> {
        let state = self.state.lock().await;
        state
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Wallets whose running balance disagrees with their transaction sum.
    pub async fn audit(&self) -> Vec<Drift> {
        let state = self.state.lock().await;
        let mut sums: BTreeMap<&str, Decimal> = BTreeMap::new();
        for t in &state.transactions {
            *sums.entry(t.user_id.as_str()).or_default() += t.amount;
        }

        let drift: Vec<Drift> = state
            .wallets
            .values()
            .filter_map(|w| {
                let ledger_sum = sums.get(w.user_id.as_str()).copied().unwrap_or_default();
                (ledger_sum != w.balance).then(|| Drift {
                    user_id: w.user_id.clone(),
                    balance: w.balance,
                    ledger_sum,
                })
            })
            .collect();

        for d in &drift {
            warn!(user_id = %d.user_id, balance = %d.balance, ledger_sum = %d.ledger_sum, "Ledger drift");
        }
        drift
    }

    // -- Bets --------------------------------------------------------------

    /// Validate, debit the exposure and record a pending bet.
    ///
    /// Insufficient funds leave both the wallet and the bet table untouched.
    /// Bet references are scoped per user: a request reusing one of the same
    /// user's references returns that user's existing bet.
    pub async fn place_bet(&self, req: &BetRequest) -> Result<Bet, DeskError> {
        req.validate()?;
        let reference = req
            .reference
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .bets
            .iter()
            .find(|b| b.user_id == req.user_id && b.reference == reference)
        {
            debug!(reference = %reference, "Replayed bet placement ignored");
            return Ok(existing.clone());
        }

        let exposure = req.exposure();
        let available = state.wallet(&req.user_id).balance;
        if exposure > available {
            warn!(
                user_id = %req.user_id,
                needed = %exposure,
                available = %available,
                "Bet rejected: insufficient balance"
            );
            return Err(DeskError::InsufficientBalance {
                needed: exposure,
                available,
            });
        }

        state.apply(
            &req.user_id,
            -exposure,
            TransactionKind::BetDebit,
            &format!("bet:{reference}"),
            None,
        )?;

        let bet = Bet {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: req.user_id.clone(),
            event_id: req.event_id.clone(),
            market_id: req.market_id.clone(),
            selection: req.selection.clone(),
            bet_type: req.bet_type,
            odds: req.odds,
            stake: req.stake,
            status: BetStatus::Pending,
            payout: Decimal::ZERO,
            reference,
            created_at: Utc::now(),
            settled_at: None,
        };
        state.bets.push(bet.clone());

        info!(
            bet_id = %bet.id,
            user_id = %bet.user_id,
            market_id = %bet.market_id,
            bet_type = %bet.bet_type,
            stake = %bet.stake,
            odds = %bet.odds,
            "Bet placed"
        );
        Ok(bet)
    }

    pub async fn bet(&self, bet_id: &str) -> Option<Bet> {
        let state = self.state.lock().await;
        state.bets.iter().find(|b| b.id == bet_id).cloned()
    }

    pub async fn bets_for_user(&self, user_id: &str) -> Vec<Bet> {
        let state = self.state.lock().await;
        state
            .bets
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn pending_bets(&self, market_id: &str) -> Vec<Bet> {
        let state = self.state.lock().await;
        state
            .bets
            .iter()
            .filter(|b| b.market_id == market_id && b.status == BetStatus::Pending)
            .cloned()
            .collect()
    }

    // -- Settlement --------------------------------------------------------

    /// Resolve every pending bet on a market and credit payouts.
    ///
    /// Already-settled bets are skipped, so settling a market twice only
    /// touches bets placed after the first settlement. The whole market is
    /// resolved on a working copy; if any bet fails nothing is written.
    pub async fn settle_market(
        &self,
        market_id: &str,
        result_code: &str,
    ) -> Result<SettlementSummary, DeskError> {
        let result: ResultCode = result_code.parse()?;
        let mut state = self.state.lock().await;
        let mut working = state.clone();
        let mut summary = SettlementSummary {
            market_id: market_id.to_string(),
            ..SettlementSummary::default()
        };

        let pending: Vec<usize> = working
            .bets
            .iter()
            .enumerate()
            .filter(|(_, b)| b.market_id == market_id && b.status == BetStatus::Pending)
            .map(|(i, _)| i)
            .collect();

        for idx in pending {
            let (status, payout) = settle_one(&mut working, idx, &result)?;
            summary.record(status, payout);
        }
        *state = working;

        info!(
            market_id,
            result = %result,
            settled = summary.settled_count(),
            payout = %summary.total_payout,
            "Market settled"
        );
        Ok(summary)
    }

    /// Resolve a single bet. Settling a settled bet is an error.
    pub async fn settle_bet(&self, bet_id: &str, result_code: &str) -> Result<Bet, DeskError> {
        let result: ResultCode = result_code.parse()?;
        let mut state = self.state.lock().await;
        let idx = state
            .bets
            .iter()
            .position(|b| b.id == bet_id)
            .ok_or_else(|| DeskError::BetNotFound(bet_id.to_string()))?;
        if state.bets[idx].status.is_settled() {
            return Err(DeskError::AlreadySettled(bet_id.to_string()));
        }
        settle_one(&mut state, idx, &result)?;
        Ok(state.bets[idx].clone())
    }
}

fn settle_one(
    state: &mut LedgerSnapshot,
    idx: usize,
    result: &ResultCode,
) -> Result<(BetStatus, Decimal), DeskError> {
    let (status, payout) = result.outcome_for(&state.bets[idx]);
    let (user_id, reference) = {
        let bet = &state.bets[idx];
        (bet.user_id.clone(), bet.reference.clone())
    };

    if payout > Decimal::ZERO {
        let kind = if status == BetStatus::Void {
            TransactionKind::BetRefund
        } else {
            TransactionKind::BetPayout
        };
        state.apply(&user_id, payout, kind, &format!("settle:{reference}"), None)?;
    }

    let bet = &mut state.bets[idx];
    bet.status = status;
    bet.payout = payout;
    bet.settled_at = Some(Utc::now());
    Ok((status, payout))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Shared types for ODDSDESK.
//!
//! These types form the data model moved between the odds feeds, the
//! poller, the wallet ledger and the settlement layer. They carry no
//! behaviour beyond small derived quantities (exposure, payout) so that
//! every other module can depend on them without cycles.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Casino table state
// ---------------------------------------------------------------------------

/// Snapshot of a single casino table as returned by the odds feed.
///
/// Replaced wholesale on every poll. There is no partial merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CasinoGameData {
    pub game_type: String,
    pub round_id: String,
    /// Seconds left before betting closes, if the feed reports it.
    pub timer: Option<u32>,
    /// Raw card string, e.g. "ASS,10HH,1".
    pub cards: String,
    pub markets: Vec<CasinoMarket>,
}

impl CasinoGameData {
    /// Look up a market by selection id.
    pub fn market(&self, selection_id: &str) -> Option<&CasinoMarket> {
        self.markets.iter().find(|m| m.selection_id == selection_id)
    }

    /// Markets currently open for betting.
    pub fn open_markets(&self) -> impl Iterator<Item = &CasinoMarket> {
        self.markets.iter().filter(|m| m.status == MarketStatus::Active)
    }
}

impl fmt::Display for CasinoGameData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] round={} timer={} markets={}",
            self.game_type,
            self.round_id,
            self.timer.map(|t| t.to_string()).unwrap_or_else(|| "-".into()),
            self.markets.len(),
        )
    }
}

/// One bettable selection on a casino table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CasinoMarket {
    pub selection_id: String,
    pub name: String,
    pub back: Option<Decimal>,
    pub lay: Option<Decimal>,
    pub status: MarketStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketStatus {
    Active,
    Suspended,
    Closed,
}

impl MarketStatus {
    /// Map a feed status string. Unknown values are treated as suspended.
    pub fn from_feed(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "ACTIVE" | "OPEN" | "1" => MarketStatus::Active,
            "CLOSED" | "REMOVED" => MarketStatus::Closed,
            _ => MarketStatus::Suspended,
        }
    }
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketStatus::Active => write!(f, "ACTIVE"),
            MarketStatus::Suspended => write!(f, "SUSPENDED"),
            MarketStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Recently settled rounds for a table, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CasinoResult {
    pub game_type: String,
    pub rounds: Vec<RoundResult>,
}

impl CasinoResult {
    pub fn latest(&self) -> Option<&RoundResult> {
        self.rounds.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    pub round_id: String,
    /// Result code as published by the feed (winning selection).
    pub winner: String,
}

// ---------------------------------------------------------------------------
// Bets
// ---------------------------------------------------------------------------

/// Bet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetType {
    /// Bet for the selection.
    Back,
    /// Bet against the selection.
    Lay,
}

impl BetType {
    pub fn opposite(&self) -> Self {
        match self {
            BetType::Back => BetType::Lay,
            BetType::Lay => BetType::Back,
        }
    }
}

impl fmt::Display for BetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BetType::Back => write!(f, "BACK"),
            BetType::Lay => write!(f, "LAY"),
        }
    }
}

impl std::str::FromStr for BetType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "back" | "b" => Ok(BetType::Back),
            "lay" | "l" => Ok(BetType::Lay),
            _ => Err(anyhow::anyhow!("Unknown bet type: {s}")),
        }
    }
}

/// Amount withheld from the wallet when a bet is placed.
///
/// Back bets risk their stake; lay bets risk the backer's winnings.
pub fn exposure(bet_type: BetType, stake: Decimal, odds: Decimal) -> Decimal {
    match bet_type {
        BetType::Back => stake,
        BetType::Lay => stake * (odds - Decimal::ONE),
    }
}

/// Total returned to the wallet if the bet wins outright.
pub fn potential_payout(bet_type: BetType, stake: Decimal, odds: Decimal) -> Decimal {
    match bet_type {
        BetType::Back => stake * odds,
        BetType::Lay => exposure(bet_type, stake, odds) + stake,
    }
}

/// Lifecycle of a persisted bet. Only `Pending` may transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetStatus {
    Pending,
    Won,
    Lost,
    Void,
    HalfWon,
    HalfLost,
}

impl BetStatus {
    pub fn is_settled(&self) -> bool {
        !matches!(self, BetStatus::Pending)
    }
}

impl fmt::Display for BetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BetStatus::Pending => "pending",
            BetStatus::Won => "won",
            BetStatus::Lost => "lost",
            BetStatus::Void => "void",
            BetStatus::HalfWon => "half_won",
            BetStatus::HalfLost => "half_lost",
        };
        write!(f, "{s}")
    }
}

/// A bet on the local slip, not yet confirmed by any ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedBet {
    pub market_id: String,
    pub market_name: String,
    pub stake: Decimal,
    pub odds: Decimal,
    pub bet_type: BetType,
    pub placed_at: DateTime<Utc>,
}

impl PlacedBet {
    pub fn potential_payout(&self) -> Decimal {
        potential_payout(self.bet_type, self.stake, self.odds)
    }
}

impl fmt::Display for PlacedBet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}) stake={:.2} @ {} -> {:.2}",
            self.bet_type,
            self.market_name,
            self.market_id,
            self.stake,
            self.odds,
            self.potential_payout(),
        )
    }
}

/// A bet placement request, as sent to the `bet-placement` function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetRequest {
    pub user_id: String,
    pub event_id: String,
    pub market_id: String,
    pub market_name: String,
    pub selection: String,
    pub bet_type: BetType,
    pub odds: Decimal,
    pub stake: Decimal,
    /// Idempotency key; generated by the client when absent.
    #[serde(default)]
    pub reference: Option<String>,
}

impl BetRequest {
    /// Reject non-positive stake or odds before anything touches a wallet.
    pub fn validate(&self) -> Result<(), DeskError> {
        if self.stake <= Decimal::ZERO {
            return Err(DeskError::InvalidBet(format!(
                "stake must be positive, got {}",
                self.stake
            )));
        }
        if self.odds <= Decimal::ZERO {
            return Err(DeskError::InvalidBet(format!(
                "odds must be positive, got {}",
                self.odds
            )));
        }
        if self.bet_type == BetType::Lay && self.odds <= Decimal::ONE {
            return Err(DeskError::InvalidBet(format!(
                "lay odds must exceed 1.0, got {}",
                self.odds
            )));
        }
        if self.market_id.trim().is_empty() || self.user_id.trim().is_empty() {
            return Err(DeskError::InvalidBet("user_id and market_id are required".into()));
        }
        Ok(())
    }

    pub fn exposure(&self) -> Decimal {
        exposure(self.bet_type, self.stake, self.odds)
    }

    pub fn potential_payout(&self) -> Decimal {
        potential_payout(self.bet_type, self.stake, self.odds)
    }
}

/// A bet as persisted by the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    pub id: String,
    pub user_id: String,
    pub event_id: String,
    pub market_id: String,
    pub selection: String,
    pub bet_type: BetType,
    pub odds: Decimal,
    pub stake: Decimal,
    pub status: BetStatus,
    pub payout: Decimal,
    pub reference: String,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Bet {
    pub fn exposure(&self) -> Decimal {
        exposure(self.bet_type, self.stake, self.odds)
    }

    pub fn potential_payout(&self) -> Decimal {
        potential_payout(self.bet_type, self.stake, self.odds)
    }
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} {} stake={:.2} @ {} status={}",
            self.id, self.user_id, self.bet_type, self.selection, self.stake, self.odds, self.status,
        )
    }
}

/// Response of the `bet-placement` function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetPlacementOutcome {
    pub success: bool,
    #[serde(default)]
    pub bet_id: Option<String>,
    #[serde(default)]
    pub new_balance: Option<Decimal>,
    #[serde(default)]
    pub error: Option<String>,
}

impl BetPlacementOutcome {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            bet_id: None,
            new_balance: None,
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    BetDebit,
    BetPayout,
    BetRefund,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::BetDebit => "bet_debit",
            TransactionKind::BetPayout => "bet_payout",
            TransactionKind::BetRefund => "bet_refund",
        };
        write!(f, "{s}")
    }
}

/// A single ledger movement. `amount` is signed: debits are negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub reference: String,
    pub user_id: String,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Operation accepted by the `wallet-operation` function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum WalletOperation {
    Balance {
        user_id: String,
    },
    Deposit {
        user_id: String,
        amount: Decimal,
        reference: String,
    },
    Withdraw {
        user_id: String,
        amount: Decimal,
        reference: String,
    },
}

impl WalletOperation {
    pub fn user_id(&self) -> &str {
        match self {
            WalletOperation::Balance { user_id }
            | WalletOperation::Deposit { user_id, .. }
            | WalletOperation::Withdraw { user_id, .. } => user_id,
        }
    }
}

/// Response of the `wallet-operation` function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletOutcome {
    pub success: bool,
    #[serde(default)]
    pub balance: Option<Decimal>,
    #[serde(default)]
    pub error: Option<String>,
}

impl WalletOutcome {
    pub fn ok(balance: Decimal) -> Self {
        Self {
            success: true,
            balance: Some(balance),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            balance: None,
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

/// How a market resolved, parsed from the RPC's `result_code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultCode {
    Winner(String),
    Void,
    HalfWon(String),
    HalfLost(String),
}

impl std::str::FromStr for ResultCode {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(DeskError::InvalidResultCode("empty result code".into()));
        }
        if s.eq_ignore_ascii_case("void") {
            return Ok(ResultCode::Void);
        }
        let split = |prefix: &str| -> Option<String> {
            s.strip_prefix(prefix)
                .map(str::trim)
                .filter(|sel| !sel.is_empty())
                .map(str::to_string)
        };
        if s.starts_with("half_won:") {
            return split("half_won:")
                .map(ResultCode::HalfWon)
                .ok_or_else(|| DeskError::InvalidResultCode(s.to_string()));
        }
        if s.starts_with("half_lost:") {
            return split("half_lost:")
                .map(ResultCode::HalfLost)
                .ok_or_else(|| DeskError::InvalidResultCode(s.to_string()));
        }
        Ok(ResultCode::Winner(s.to_string()))
    }
}

impl ResultCode {
    /// Resolve a single bet against this result: new status and payout.
    ///
    /// A half result only splits bets on its own selection. Other backs
    /// lose and other lays win outright.
    pub fn outcome_for(&self, bet: &Bet) -> (BetStatus, Decimal) {
        let exposure = bet.exposure();
        let full = bet.potential_payout();
        let half_won = (BetStatus::HalfWon, (full + exposure) / dec!(2));
        let half_lost = (BetStatus::HalfLost, exposure / dec!(2));
        let outright = |won: bool| {
            if won {
                (BetStatus::Won, full)
            } else {
                (BetStatus::Lost, Decimal::ZERO)
            }
        };
        match self {
            ResultCode::Void => (BetStatus::Void, exposure),
            ResultCode::Winner(sel) => {
                let hit = bet.selection == *sel;
                outright(match bet.bet_type {
                    BetType::Back => hit,
                    BetType::Lay => !hit,
                })
            }
            ResultCode::HalfWon(sel) if bet.selection == *sel => match bet.bet_type {
                BetType::Back => half_won,
                BetType::Lay => half_lost,
            },
            ResultCode::HalfLost(sel) if bet.selection == *sel => match bet.bet_type {
                BetType::Back => half_lost,
                BetType::Lay => half_won,
            },
            ResultCode::HalfWon(_) | ResultCode::HalfLost(_) => {
                outright(bet.bet_type == BetType::Lay)
            }
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCode::Winner(s) => write!(f, "{s}"),
            ResultCode::Void => write!(f, "void"),
            ResultCode::HalfWon(s) => write!(f, "half_won:{s}"),
            ResultCode::HalfLost(s) => write!(f, "half_lost:{s}"),
        }
    }
}

/// Summary returned by `settle_market`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementSummary {
    pub market_id: String,
    pub won: u32,
    pub lost: u32,
    pub void: u32,
    pub half_won: u32,
    pub half_lost: u32,
    pub total_payout: Decimal,
}

impl SettlementSummary {
    pub fn settled_count(&self) -> u32 {
        self.won + self.lost + self.void + self.half_won + self.half_lost
    }

    pub(crate) fn record(&mut self, status: BetStatus, payout: Decimal) {
        match status {
            BetStatus::Won => self.won += 1,
            BetStatus::Lost => self.lost += 1,
            BetStatus::Void => self.void += 1,
            BetStatus::HalfWon => self.half_won += 1,
            BetStatus::HalfLost => self.half_lost += 1,
            BetStatus::Pending => return,
        }
        self.total_payout += payout;
    }
}

impl fmt::Display for SettlementSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: won={} lost={} void={} half_won={} half_lost={} payout={:.2}",
            self.market_id,
            self.won,
            self.lost,
            self.void,
            self.half_won,
            self.half_lost,
            self.total_payout,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for ODDSDESK.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeskError {
    #[error("Invalid bet: {0}")]
    InvalidBet(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient balance: need {needed:.2}, have {available:.2}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    #[error("Duplicate reference: {0}")]
    DuplicateReference(String),

    #[error("Version conflict for {user_id}: expected {expected}, found {found}")]
    VersionConflict {
        user_id: String,
        expected: u64,
        found: u64,
    },

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Bet not found: {0}")]
    BetNotFound(String),

    #[error("Bet already settled: {0}")]
    AlreadySettled(String),

    #[error("Invalid result code: {0}")]
    InvalidResultCode(String),

    #[error("Feed error ({feed}): {message}")]
    Feed { feed: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl DeskError {
    /// Whether the caller sent a malformed request (maps to HTTP 400).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DeskError::InvalidBet(_) | DeskError::InvalidAmount(_) | DeskError::InvalidResultCode(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

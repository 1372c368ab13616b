//! Wallet and bet client.
//!
//! Wraps the two edge functions that move money:
//!
//! - `wallet-operation`: balance, deposit, withdraw
//! - `bet-placement`: validate, check balance, debit, record bet
//!
//! The client does no balance arithmetic of its own. Insufficient funds
//! come back as a typed `success: false` outcome, not as an `Err`; `Err`
//! is reserved for transport and protocol failures.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ledger::Ledger;
use crate::types::{
    BetPlacementOutcome, BetRequest, DeskError, WalletOperation, WalletOutcome,
};

pub const WALLET_FUNCTION: &str = "wallet-operation";
pub const BET_FUNCTION: &str = "bet-placement";

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Anything that can take a bet: the hosted edge function or a local ledger.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BetPlacement: Send + Sync {
    async fn place_bet(&self, req: &BetRequest) -> Result<BetPlacementOutcome>;
}

/// Anything that can run a wallet operation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletBackend: Send + Sync {
    async fn wallet_operation(&self, op: &WalletOperation) -> Result<WalletOutcome>;
}

// ---------------------------------------------------------------------------
// Edge-function client
// ---------------------------------------------------------------------------

/// HTTP client for the hosted functions at `{base}/functions/v1/{name}`.
pub struct EdgeFunctionClient {
    http: Client,
    base_url: String,
    anon_key: SecretString,
}

impl EdgeFunctionClient {
    pub fn new(base_url: impl Into<String>, anon_key: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("ODDSDESK/0.1.0")
            .build()
            .context("Failed to build HTTP client for edge functions")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST to a function. 2xx and 400 bodies are both parsed as `T`, since
    /// the functions report validation failures as `{success:false, error}`.
    pub(crate) async fn invoke<B, T>(&self, function: &str, body: &B) -> Result<T>
    where
        B: serde::Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}/functions/v1/{function}", self.base_url);
        self.post(&url, function, body).await
    }

    pub(crate) async fn post<B, T>(&self, url: &str, label: &str, body: &B) -> Result<T>
    where
        B: serde::Serialize + ?Sized,
        T: serde::de::DeserializeOwned,
    {
        debug!(url = %url, "Edge function request");
        let key = self.anon_key.expose_secret();

        let resp = self
            .http
            .post(url)
            .header("apikey", key.as_str())
            .bearer_auth(key)
            .json(body)
            .send()
            .await
            .with_context(|| format!("{label} request failed"))?;

        let status = resp.status();
        if !status.is_success() && status != StatusCode::BAD_REQUEST {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("{label} error {status}: {text}");
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse {label} response ({status})"))
    }
}

#[async_trait]
impl BetPlacement for EdgeFunctionClient {
    async fn place_bet(&self, req: &BetRequest) -> Result<BetPlacementOutcome> {
        self.invoke(BET_FUNCTION, req).await
    }
}

#[async_trait]
impl WalletBackend for EdgeFunctionClient {
    async fn wallet_operation(&self, op: &WalletOperation) -> Result<WalletOutcome> {
        self.invoke(WALLET_FUNCTION, op).await
    }
}

// ---------------------------------------------------------------------------
// In-process backend
// ---------------------------------------------------------------------------

#[async_trait]
impl BetPlacement for Ledger {
    async fn place_bet(&self, req: &BetRequest) -> Result<BetPlacementOutcome> {
        match Ledger::place_bet(self, req).await {
            Ok(bet) => Ok(BetPlacementOutcome {
                success: true,
                new_balance: Some(self.balance(&bet.user_id).await),
                bet_id: Some(bet.id),
                error: None,
            }),
            Err(e) => Ok(BetPlacementOutcome::failed(e.to_string())),
        }
    }
}

#[async_trait]
impl WalletBackend for Ledger {
    async fn wallet_operation(&self, op: &WalletOperation) -> Result<WalletOutcome> {
        let result: Result<Decimal, DeskError> = match op {
            WalletOperation::Balance { user_id } => Ok(self.balance(user_id).await),
            WalletOperation::Deposit {
                user_id,
                amount,
                reference,
            } => self.deposit(user_id, *amount, reference).await,
            WalletOperation::Withdraw {
                user_id,
                amount,
                reference,
            } => self.withdraw(user_id, *amount, reference).await,
        };
        Ok(match result {
            Ok(balance) => WalletOutcome::ok(balance),
            Err(e) => WalletOutcome::failed(e.to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Wallet service
// ---------------------------------------------------------------------------

/// Convenience wrapper used by the binary and by UI-facing callers.
pub struct WalletService {
    backend: Arc<dyn WalletBackend>,
}

impl WalletService {
    pub fn new(backend: Arc<dyn WalletBackend>) -> Self {
        Self { backend }
    }

    pub async fn balance(&self, user_id: &str) -> Result<Decimal> {
        let outcome = self
            .backend
            .wallet_operation(&WalletOperation::Balance {
                user_id: user_id.to_string(),
            })
            .await?;
        match (outcome.success, outcome.balance) {
            (true, Some(balance)) => Ok(balance),
            _ => anyhow::bail!(
                "Balance lookup failed: {}",
                outcome.error.unwrap_or_else(|| "no balance returned".into())
            ),
        }
    }

    /// Deposit with an explicit idempotency reference, or a fresh one.
    pub async fn deposit(
        &self,
        user_id: &str,
        amount: Decimal,
        reference: Option<&str>,
    ) -> Result<WalletOutcome> {
        let reference = reference
            .map(str::to_string)
            .unwrap_or_else(|| format!("dep-{}", uuid::Uuid::new_v4()));
        let outcome = self
            .backend
            .wallet_operation(&WalletOperation::Deposit {
                user_id: user_id.to_string(),
                amount,
                reference: reference.clone(),
            })
            .await?;
        log_outcome("deposit", user_id, amount, &reference, &outcome);
        Ok(outcome)
    }

    pub async fn withdraw(
        &self,
        user_id: &str,
        amount: Decimal,
        reference: Option<&str>,
    ) -> Result<WalletOutcome> {
        let reference = reference
            .map(str::to_string)
            .unwrap_or_else(|| format!("wd-{}", uuid::Uuid::new_v4()));
        let outcome = self
            .backend
            .wallet_operation(&WalletOperation::Withdraw {
                user_id: user_id.to_string(),
                amount,
                reference: reference.clone(),
            })
            .await?;
        log_outcome("withdraw", user_id, amount, &reference, &outcome);
        Ok(outcome)
    }
}

fn log_outcome(op: &str, user_id: &str, amount: Decimal, reference: &str, outcome: &WalletOutcome) {
    if outcome.success {
        info!(op, user_id, amount = %amount, reference, balance = ?outcome.balance, "Wallet operation applied");
    } else {
        warn!(op, user_id, amount = %amount, reference, error = ?outcome.error, "Wallet operation refused");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

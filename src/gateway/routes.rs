//! Gateway route handlers.
//!
//! Every handler answers with the same `{success, ...}` bodies the hosted
//! functions return. Malformed requests get HTTP 400; business refusals
//! (insufficient balance, duplicate reference) are HTTP 200 with
//! `success: false`.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::ledger::Ledger;
use crate::settlement::{SettleMarketParams, SettleMarketResponse};
use crate::types::{BetPlacementOutcome, BetRequest, DeskError, WalletOperation, WalletOutcome};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct GatewayState {
    pub ledger: Arc<Ledger>,
    /// When set, callers must present it in the `apikey` header.
    pub anon_key: Option<SecretString>,
    /// CORS origin; any origin when unset.
    pub allowed_origin: Option<String>,
}

impl GatewayState {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self {
            ledger,
            anon_key: None,
            allowed_origin: None,
        }
    }

    pub fn with_anon_key(mut self, key: SecretString) -> Self {
        self.anon_key = Some(key);
        self
    }

    pub fn with_allowed_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origin = Some(origin.into());
        self
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        match &self.anon_key {
            None => true,
            Some(key) => headers
                .get("apikey")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == key.expose_secret().as_str()),
        }
    }
}

pub type AppState = Arc<GatewayState>;

fn status_for(err: &DeskError) -> StatusCode {
    if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// POST /functions/v1/bet-placement
pub async fn place_bet(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<BetRequest>,
) -> (StatusCode, Json<BetPlacementOutcome>) {
    if !state.authorized(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(BetPlacementOutcome::failed("Invalid API key")),
        );
    }

    match state.ledger.place_bet(&req).await {
        Ok(bet) => {
            let balance = state.ledger.balance(&bet.user_id).await;
            (
                StatusCode::OK,
                Json(BetPlacementOutcome {
                    success: true,
                    bet_id: Some(bet.id),
                    new_balance: Some(balance),
                    error: None,
                }),
            )
        }
        Err(e) => {
            warn!(user_id = %req.user_id, market_id = %req.market_id, error = %e, "Bet refused");
            (status_for(&e), Json(BetPlacementOutcome::failed(e.to_string())))
        }
    }
}

/// POST /functions/v1/wallet-operation
pub async fn wallet_operation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(op): Json<WalletOperation>,
) -> (StatusCode, Json<WalletOutcome>) {
    if !state.authorized(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(WalletOutcome::failed("Invalid API key")),
        );
    }

    let result = match &op {
        WalletOperation::Balance { user_id } => Ok(state.ledger.balance(user_id).await),
        WalletOperation::Deposit {
            user_id,
            amount,
            reference,
        } => state.ledger.deposit(user_id, *amount, reference).await,
        WalletOperation::Withdraw {
            user_id,
            amount,
            reference,
        } => state.ledger.withdraw(user_id, *amount, reference).await,
    };

    match result {
        Ok(balance) => (StatusCode::OK, Json(WalletOutcome::ok(balance))),
        Err(e) => {
            warn!(user_id = op.user_id(), error = %e, "Wallet operation refused");
            (status_for(&e), Json(WalletOutcome::failed(e.to_string())))
        }
    }
}

/// POST /rest/v1/rpc/settle_market
pub async fn settle_market(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(params): Json<SettleMarketParams>,
) -> (StatusCode, Json<SettleMarketResponse>) {
    if !state.authorized(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(SettleMarketResponse::failed("Invalid API key")),
        );
    }

    match state
        .ledger
        .settle_market(&params.market_id, &params.result_code)
        .await
    {
        Ok(summary) => {
            info!(market_id = %params.market_id, summary = %summary, "settle_market served");
            (StatusCode::OK, Json(SettleMarketResponse::ok(summary)))
        }
        Err(e) => (status_for(&e), Json(SettleMarketResponse::failed(e.to_string()))),
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub wallets: usize,
    pub bets: usize,
    /// Wallets whose running balance disagrees with their transactions.
    pub drift: usize,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.ledger.snapshot().await;
    let drift = state.ledger.audit().await.len();
    Json(HealthResponse {
        status: if drift == 0 { "ok" } else { "degraded" },
        wallets: snapshot.wallets.len(),
        bets: snapshot.bets.len(),
        drift,
    })
}

//! Gateway: Axum server exposing the ledger as the wallet, bet and
//! settlement functions.
//!
//! Lets the binary (and tests) run without the hosted backend: point
//! `gateway.url` at this server and the HTTP clients in [`crate::wallet`]
//! and [`crate::settlement`] talk to it unchanged.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info};

pub use routes::{AppState, GatewayState};

/// Bind `port` and serve in a background task.
pub async fn spawn_gateway(state: AppState, port: u16) -> Result<JoinHandle<()>> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind gateway port {port}"))?;
    let bound = listener.local_addr().context("Gateway listener has no address")?;
    info!(addr = %bound, "Gateway listening");

    let app = build_router(state);
    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Gateway server error");
        }
    }))
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let origin = match state
        .allowed_origin
        .as_deref()
        .and_then(|o| o.parse::<HeaderValue>().ok())
    {
        Some(value) => AllowOrigin::exact(value),
        None => AllowOrigin::from(Any),
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("apikey"),
        ]);

    Router::new()
        .route("/functions/v1/bet-placement", post(routes::place_bet))
        .route("/functions/v1/wallet-operation", post(routes::wallet_operation))
        .route("/rest/v1/rpc/settle_market", post(routes::settle_market))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! ODDSDESK entry point.
//!
//! Loads configuration, initialises structured logging, restores the
//! ledger from disk, starts the gateway, one poller per casino table and
//! the odds mirror, then runs until Ctrl+C and saves the ledger.

use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use oddsdesk::config::{self, AppConfig};
use oddsdesk::feeds::diamond::DiamondClient;
use oddsdesk::feeds::sportbex::SportBexClient;
use oddsdesk::feeds::CasinoFeed;
use oddsdesk::gateway::{self, GatewayState};
use oddsdesk::ledger::Ledger;
use oddsdesk::mirror::{OddsMirror, ReconnectPolicy, RequestAction};
use oddsdesk::poller::CasinoPoller;
use oddsdesk::storage;
use oddsdesk::wallet::{BetPlacement, EdgeFunctionClient, WalletService};

const BANNER: &str = r#"
  ___  ____  ____  ____  ____  _____ ____  _  __
 / _ \|  _ \|  _ \/ ___||  _ \| ____/ ___|| |/ /
| | | | | | | | | \___ \| | | |  _| \___ \| ' /
| |_| | |_| | |_| |___) | |_| | |___ ___) | . \
 \___/|____/|____/|____/|____/|_____|____/|_|\_\

  Live odds, wallet ledger and settlement
  v0.1.0
"#;

/// How often the ledger is flushed to disk while running.
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    // Only one provider is compiled in; a second install is harmless.
    let _ = rustls::crypto::ring::default_provider().install_default();

    println!("{BANNER}");
    info!(
        config = %config_path,
        diamond = %cfg.diamond.base_url(),
        tables = ?cfg.diamond.game_types,
        gateway = %cfg.gateway.url,
        "ODDSDESK starting up"
    );

    // -- Restore or create the ledger ------------------------------------

    let snapshot_path = cfg.storage.snapshot_path.clone();
    let ledger = Arc::new(match storage::load_snapshot(&snapshot_path)? {
        Some(snapshot) => Ledger::from_snapshot(snapshot),
        None => Ledger::new(),
    });
    let drift = ledger.audit().await;
    if !drift.is_empty() {
        warn!(wallets = drift.len(), "Ledger drift detected on startup");
    }

    // -- Gateway ---------------------------------------------------------

    let anon_key = AppConfig::resolve_secret(&cfg.gateway.anon_key_env).ok();
    let gateway_task = if cfg.gateway.enabled {
        let mut state = GatewayState::new(ledger.clone());
        if let Some(key) = &anon_key {
            state = state.with_anon_key(key.clone());
        }
        if let Some(origin) = &cfg.gateway.allowed_origin {
            state = state.with_allowed_origin(origin.clone());
        }
        Some(gateway::spawn_gateway(Arc::new(state), cfg.gateway.port).await?)
    } else {
        None
    };

    // Bets go through the configured gateway when a key is available,
    // otherwise straight into the in-process ledger.
    let placement: Arc<dyn BetPlacement> = match &anon_key {
        Some(key) => Arc::new(EdgeFunctionClient::new(cfg.gateway.url.clone(), key.clone())?),
        None => {
            warn!(
                env = %cfg.gateway.anon_key_env,
                "No gateway key set, placing bets against the local ledger"
            );
            ledger.clone()
        }
    };

    let wallet = WalletService::new(ledger.clone());
    match wallet.balance(&cfg.user_id).await {
        Ok(balance) => info!(user_id = %cfg.user_id, balance = %balance, "Desk wallet"),
        Err(e) => warn!(error = %e, "Could not read desk wallet"),
    }

    // -- Feeds -----------------------------------------------------------

    let diamond_key = AppConfig::resolve_secret(&cfg.diamond.api_key_env)
        .context("Diamond feed key is required")?;
    let feed: Arc<dyn CasinoFeed> =
        Arc::new(DiamondClient::new(cfg.diamond.base_url(), diamond_key.clone())?);

    let mut pollers: Vec<CasinoPoller> = cfg
        .diamond
        .game_types
        .iter()
        .map(|game_type| {
            CasinoPoller::start(
                game_type,
                &cfg.user_id,
                feed.clone(),
                placement.clone(),
                &cfg.poller,
            )
        })
        .collect();

    let mirror = OddsMirror::connect(
        cfg.diamond.ws_url(diamond_key.expose_secret()),
        ReconnectPolicy::from_config(&cfg.websocket),
    );
    for topic in &cfg.diamond.topics {
        let topic_name = topic.clone();
        mirror.subscribe(topic, move |msg| {
            info!(topic = %topic_name, timestamp = %msg.timestamp, "Mirror update");
        });
    }
    mirror.request(RequestAction::GetSports, "");

    if let Some(sb) = &cfg.sportbex {
        log_sportbex_catalogue(sb).await;
    }

    // -- Main loop -------------------------------------------------------

    let mut flush = tokio::time::interval(SNAPSHOT_INTERVAL);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(tables = pollers.len(), "Running. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = flush.tick() => {
                for poller in &pollers {
                    let snap = poller.snapshot().await;
                    if let Some(err) = &snap.error {
                        warn!(game_type = poller.game_type(), error = %err, "Table feed unhealthy");
                    }
                }
                if let Err(e) = storage::save_snapshot(&ledger.snapshot().await, &snapshot_path) {
                    error!(error = %e, "Failed to save ledger snapshot");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    for poller in &mut pollers {
        poller.stop();
    }
    drop(mirror);
    if let Some(task) = gateway_task {
        task.abort();
    }

    let snapshot = ledger.snapshot().await;
    storage::save_snapshot(&snapshot, &snapshot_path)?;
    info!(
        wallets = snapshot.wallets.len(),
        bets = snapshot.bets.len(),
        "ODDSDESK shut down cleanly."
    );

    Ok(())
}

/// Log the sports catalogue once at startup.
async fn log_sportbex_catalogue(cfg: &config::SportBexConfig) {
    let key = match AppConfig::resolve_secret(&cfg.api_key_env) {
        Ok(k) => k,
        Err(e) => {
            warn!(error = %e, "SportBex configured without a key, skipping");
            return;
        }
    };
    let client = match SportBexClient::new(cfg.base_url.clone(), key) {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "SportBex client unavailable");
            return;
        }
    };
    match client.list_sports().await {
        Ok(sports) => info!(count = sports.len(), "SportBex sports available"),
        Err(e) => warn!(error = %e, "SportBex catalogue fetch failed"),
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("oddsdesk=info"));

    if std::env::var("ODDSDESK_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}

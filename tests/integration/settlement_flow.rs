//! Deposit, bet through the gateway, settle over RPC, check the wallet.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

use oddsdesk::config::PollerConfig;
use oddsdesk::gateway::{spawn_gateway, GatewayState};
use oddsdesk::ledger::Ledger;
use oddsdesk::poller::{CasinoPoller, PollerSnapshot};
use oddsdesk::settlement::{RemoteSettlement, SettlementService};
use oddsdesk::simulation;
use oddsdesk::storage;
use oddsdesk::types::{BetStatus, BetType, TransactionKind};
use oddsdesk::wallet::{EdgeFunctionClient, WalletService};

use crate::mock_feed::MockFeed;

const ANON: &str = "test-anon-key";

struct Desk {
    ledger: Arc<Ledger>,
    base_url: String,
    gateway: tokio::task::JoinHandle<()>,
}

impl Desk {
    async fn start() -> Self {
        let ledger = Arc::new(Ledger::new());
        let state = GatewayState::new(ledger.clone())
            .with_anon_key(SecretString::new(ANON.to_string()));

        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);
        let gateway = spawn_gateway(Arc::new(state), port).await.unwrap();

        Self {
            ledger,
            base_url: format!("http://127.0.0.1:{port}"),
            gateway,
        }
    }

    fn client(&self) -> EdgeFunctionClient {
        EdgeFunctionClient::new(self.base_url.clone(), SecretString::new(ANON.to_string()))
            .unwrap()
    }
}

impl Drop for Desk {
    fn drop(&mut self) {
        self.gateway.abort();
    }
}

fn fast() -> PollerConfig {
    PollerConfig {
        data_interval_ms: 10,
        result_interval_ms: 10,
    }
}

async fn wait_for<F>(poller: &CasinoPoller, pred: F) -> PollerSnapshot
where
    F: Fn(&PollerSnapshot) -> bool,
{
    for _ in 0..300 {
        let snap = poller.snapshot().await;
        if pred(&snap) {
            return snap;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("poller condition not reached");
}

#[tokio::test]
async fn test_full_round_back_and_lay() {
    let desk = Desk::start().await;
    let wallet = WalletService::new(Arc::new(desk.client()));
    wallet.deposit("player-1", dec!(300), Some("dep-1")).await.unwrap();

    let feed = Arc::new(MockFeed::new("r-100"));
    let poller = CasinoPoller::start(
        "dt20",
        "player-1",
        feed.clone(),
        Arc::new(desk.client()),
        &fast(),
    );
    wait_for(&poller, |s| s.game_data.is_some()).await;

    let back = poller
        .place_bet("1", "Dragon", dec!(100), dec!(1.98), BetType::Back)
        .await
        .unwrap();
    assert!(back.success);
    assert_eq!(back.new_balance, Some(dec!(200)));

    let lay = poller
        .place_bet("2", "Tiger", dec!(50), dec!(2.02), BetType::Lay)
        .await
        .unwrap();
    assert!(lay.success);
    assert_eq!(wallet.balance("player-1").await.unwrap(), dec!(149.00));

    let snap = poller.snapshot().await;
    assert_eq!(snap.slip.len(), 2);
    assert_eq!(snap.slip.get("1").unwrap().potential_payout(), dec!(198.00));

    // The result feed names the winner by selection id.
    feed.finish_round("1", "r-101");
    let snap = wait_for(&poller, |s| s.last_result.as_ref().is_some_and(|r| !r.rounds.is_empty())).await;
    let latest = snap.last_result.unwrap().latest().cloned().unwrap();
    assert_eq!(latest.round_id, "r-100");
    assert_eq!(latest.winner, "1");

    let filed: Vec<String> = desk
        .ledger
        .pending_bets("r-100")
        .await
        .into_iter()
        .map(|b| b.selection)
        .collect();
    assert_eq!(filed, vec!["1".to_string(), "2".to_string()]);

    let settlement = SettlementService::new(Arc::new(
        RemoteSettlement::new(desk.base_url.clone(), SecretString::new(ANON.to_string())).unwrap(),
    ));
    let summary = settlement
        .settle_market(&latest.round_id, &latest.winner)
        .await
        .unwrap();
    assert_eq!(summary.won, 2);
    assert_eq!(summary.lost, 0);
    // 198 for the back bet, 51 exposure + 50 stake for the lay bet.
    assert_eq!(summary.total_payout, dec!(299.00));
    assert_eq!(wallet.balance("player-1").await.unwrap(), dec!(448.00));

    // Second settlement of the same round touches nothing.
    let again = settlement
        .settle_market(&latest.round_id, &latest.winner)
        .await
        .unwrap();
    assert_eq!(again.settled_count(), 0);
    assert_eq!(wallet.balance("player-1").await.unwrap(), dec!(448.00));

    assert!(desk.ledger.audit().await.is_empty());
    let kinds: Vec<TransactionKind> = desk
        .ledger
        .transactions_for("player-1")
        .await
        .iter()
        .map(|t| t.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            TransactionKind::Deposit,
            TransactionKind::BetDebit,
            TransactionKind::BetDebit,
            TransactionKind::BetPayout,
            TransactionKind::BetPayout,
        ]
    );

    poller.clear_bets().await;
    assert!(poller.snapshot().await.slip.is_empty());
}

#[tokio::test]
async fn test_back_bet_on_winning_selection_id_is_won() {
    let desk = Desk::start().await;
    let wallet = WalletService::new(Arc::new(desk.client()));
    wallet.deposit("player-7", dec!(100), None).await.unwrap();

    let feed = Arc::new(MockFeed::new("r-200"));
    let poller = CasinoPoller::start("dt20", "player-7", feed.clone(), Arc::new(desk.client()), &fast());
    wait_for(&poller, |s| s.game_data.is_some()).await;
    poller
        .place_bet("1", "Dragon", dec!(50), dec!(1.98), BetType::Back)
        .await
        .unwrap();

    feed.finish_round("1", "r-201");
    let snap = wait_for(&poller, |s| s.last_result.as_ref().is_some_and(|r| !r.rounds.is_empty())).await;
    let latest = snap.last_result.unwrap().latest().cloned().unwrap();

    let summary = SettlementService::new(desk.ledger.clone())
        .settle_market(&latest.round_id, &latest.winner)
        .await
        .unwrap();
    assert_eq!(summary.won, 1);
    let bets = desk.ledger.bets_for_user("player-7").await;
    assert_eq!(bets[0].status, BetStatus::Won);
    assert_eq!(wallet.balance("player-7").await.unwrap(), dec!(149.00));
}

#[tokio::test]
async fn test_insufficient_balance_leaves_wallet_untouched() {
    let desk = Desk::start().await;
    let wallet = WalletService::new(Arc::new(desk.client()));
    wallet.deposit("player-2", dec!(20), None).await.unwrap();

    let feed = Arc::new(MockFeed::new("r-7"));
    let poller = CasinoPoller::start(
        "dt20",
        "player-2",
        feed,
        Arc::new(desk.client()),
        &fast(),
    );
    wait_for(&poller, |s| s.game_data.is_some()).await;

    let outcome = poller
        .place_bet("1", "Dragon", dec!(100), dec!(1.98), BetType::Back)
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("Insufficient"));
    assert!(poller.snapshot().await.slip.is_empty());
    assert_eq!(wallet.balance("player-2").await.unwrap(), dec!(20));
    assert!(desk.ledger.bets_for_user("player-2").await.is_empty());
}

#[tokio::test]
async fn test_void_round_refunds_exposure() {
    let desk = Desk::start().await;
    let client = desk.client();
    let wallet = WalletService::new(Arc::new(desk.client()));
    wallet.deposit("player-3", dec!(100), None).await.unwrap();

    let feed = Arc::new(MockFeed::new("r-9"));
    let poller = CasinoPoller::start("dt20", "player-3", feed, Arc::new(client), &fast());
    wait_for(&poller, |s| s.game_data.is_some()).await;
    poller
        .place_bet("2", "Tiger", dec!(40), dec!(2.5), BetType::Lay)
        .await
        .unwrap();
    assert_eq!(wallet.balance("player-3").await.unwrap(), dec!(40.0));

    let settlement = SettlementService::new(desk.ledger.clone());
    let summary = settlement.settle_market("r-9", "void").await.unwrap();
    assert_eq!(summary.void, 1);
    assert_eq!(wallet.balance("player-3").await.unwrap(), dec!(100.0));

    let bets = desk.ledger.bets_for_user("player-3").await;
    assert_eq!(bets[0].status, BetStatus::Void);
}

#[tokio::test]
async fn test_feed_outage_and_recovery() {
    let feed = Arc::new(MockFeed::new("r-1"));
    feed.set_error("upstream 502");
    let poller = CasinoPoller::start(
        "teen20",
        "player-4",
        feed.clone(),
        Arc::new(Ledger::new()),
        &fast(),
    );
    let snap = wait_for(&poller, |s| s.error.is_some()).await;
    assert!(!snap.is_connected);

    feed.clear_error();
    let snap = wait_for(&poller, |s| s.is_connected && s.game_data.is_some()).await;
    assert_eq!(snap.game_data.unwrap().open_markets().count(), 2);
}

#[tokio::test]
async fn test_simulated_round_matches_slip() {
    let feed = Arc::new(MockFeed::new("r-50"));
    let ledger = Arc::new(Ledger::new());
    ledger.deposit("player-5", dec!(500), "seed").await.unwrap();
    let poller = CasinoPoller::start("dt20", "player-5", feed, ledger, &fast());
    wait_for(&poller, |s| s.game_data.is_some()).await;

    poller
        .place_bet("1", "Dragon", dec!(100), dec!(1.98), BetType::Back)
        .await
        .unwrap();
    poller
        .place_bet("2", "Tiger", dec!(100), dec!(1.98), BetType::Back)
        .await
        .unwrap();

    let snap = poller.snapshot().await;
    let report = simulation::simulate(&snap.slip, "1");
    assert_eq!(report.total_stake, dec!(200));
    assert_eq!(report.total_returned, dec!(198.00));
    assert_eq!(report.net(), dec!(-2.00));
    assert!(report.bets.iter().any(|b| b.status == BetStatus::Lost));
    assert_ne!(report.net(), Decimal::ZERO);
}

#[tokio::test]
async fn test_ledger_survives_restart() {
    let path = std::env::temp_dir()
        .join(format!("oddsdesk_it_{}.json", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .to_string();

    {
        let desk = Desk::start().await;
        let wallet = WalletService::new(Arc::new(desk.client()));
        wallet.deposit("player-6", dec!(75), Some("dep-6")).await.unwrap();
        storage::save_snapshot(&desk.ledger.snapshot().await, &path).unwrap();
    }

    let restored = Ledger::from_snapshot(storage::load_snapshot(&path).unwrap().unwrap());
    let wallet = WalletService::new(Arc::new(restored));
    assert_eq!(wallet.balance("player-6").await.unwrap(), dec!(75));
    let replay = wallet.deposit("player-6", dec!(75), Some("dep-6")).await.unwrap();
    assert!(replay.success);
    assert_eq!(wallet.balance("player-6").await.unwrap(), dec!(75));

    storage::delete_snapshot(&path).unwrap();
}

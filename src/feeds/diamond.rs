//! Diamond casino odds feed (HTTP).
//!
//! Live casino tables (Teen Patti, Dragon Tiger, Andar Bahar, ...) are
//! exposed as two GET endpoints keyed by table type:
//!
//! - `GET {BASE}/casino/data?type={game}&key={api_key}`: current round
//! - `GET {BASE}/casino/result?type={game}&key={api_key}`: last results
//!
//! Payloads come in two shapes depending on the table generation: a flat
//! `{mid, autotime, card, sub: [...]}` object, or the older
//! `{t1: [{mid, autotime, C1..}], t2: [{sid, nat, b1, l1, gstatus}]}`
//! pair. Both are normalised into [`CasinoGameData`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{value_to_price, value_to_string, CasinoFeed};
use crate::types::{CasinoGameData, CasinoMarket, CasinoResult, MarketStatus, RoundResult};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const FEED_NAME: &str = "diamond";

/// Results older than this are dropped from the response.
const MAX_RESULTS: usize = 10;

// ---------------------------------------------------------------------------
// Diamond API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    data: Option<T>,
    #[serde(default, alias = "message", alias = "error")]
    msg: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct GamePayload {
    #[serde(default, alias = "roundId")]
    mid: Value,
    #[serde(default)]
    autotime: Value,
    #[serde(default, alias = "cards")]
    card: Option<String>,
    #[serde(default)]
    sub: Vec<RawMarket>,
    #[serde(default)]
    t1: Vec<RawRound>,
    #[serde(default)]
    t2: Vec<RawMarket>,
}

#[derive(Debug, Deserialize)]
struct RawRound {
    #[serde(default)]
    mid: Value,
    #[serde(default)]
    autotime: Value,
    #[serde(default, rename = "C1")]
    c1: Option<String>,
    #[serde(default, rename = "C2")]
    c2: Option<String>,
    #[serde(default, rename = "C3")]
    c3: Option<String>,
}

impl RawRound {
    fn cards(&self) -> String {
        [&self.c1, &self.c2, &self.c3]
            .iter()
            .filter_map(|c| c.as_deref())
            .filter(|c| !c.is_empty() && *c != "1")
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, Deserialize)]
struct RawMarket {
    #[serde(default, alias = "sectionId")]
    sid: Value,
    #[serde(default, alias = "nation")]
    nat: String,
    #[serde(default, alias = "b1")]
    b: Value,
    #[serde(default, alias = "l1")]
    l: Value,
    #[serde(default)]
    gstatus: Value,
}

#[derive(Debug, Default, Deserialize)]
struct ResultPayload {
    #[serde(default)]
    res: Vec<RawResult>,
}

#[derive(Debug, Deserialize)]
struct RawResult {
    #[serde(default)]
    mid: Value,
    #[serde(default, alias = "result")]
    win: Value,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Diamond HTTP feed client.
pub struct DiamondClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl DiamondClient {
    /// Create a client for `{protocol}://{host}`.
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .user_agent("ODDSDESK/0.1.0")
            .build()
            .context("Failed to build HTTP client for Diamond")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// GET a casino endpoint and unwrap the `{success, data}` envelope.
    async fn casino_api<T>(&self, endpoint: &str, game_type: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        let url = format!("{}/casino/{endpoint}", self.base_url);
        debug!(url = %url, game_type, "Diamond API request");

        let resp = self
            .http
            .get(&url)
            .query(&[("type", game_type), ("key", self.api_key.expose_secret().as_str())])
            .send()
            .await
            .with_context(|| format!("Diamond {endpoint} request failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Diamond {endpoint} error {status}: {body}");
        }

        let envelope: Envelope<T> = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse Diamond {endpoint} response"))?;

        if envelope.success == Some(false) {
            anyhow::bail!(
                "Diamond {endpoint} rejected: {}",
                envelope.msg.unwrap_or_else(|| "unknown error".into())
            );
        }

        Ok(envelope.data.unwrap_or_default())
    }

    // -- Conversion --------------------------------------------------------

    fn to_game_data(game_type: &str, payload: GamePayload) -> Result<CasinoGameData> {
        let header = payload.t1.first();
        let round_id = value_to_string(&payload.mid)
            .or_else(|| header.and_then(|h| value_to_string(&h.mid)))
            .context("Diamond game data has no round id")?;
        let timer = value_to_string(&payload.autotime)
            .or_else(|| header.and_then(|h| value_to_string(&h.autotime)))
            .and_then(|t| t.parse::<u32>().ok());
        let cards = payload
            .card
            .clone()
            .or_else(|| header.map(RawRound::cards))
            .unwrap_or_default();

        let raw_markets = if payload.sub.is_empty() { payload.t2 } else { payload.sub };
        let markets = raw_markets
            .into_iter()
            .filter_map(|m| {
                let selection_id = value_to_string(&m.sid)?;
                Some(CasinoMarket {
                    name: if m.nat.is_empty() { selection_id.clone() } else { m.nat },
                    selection_id,
                    back: value_to_price(&m.b),
                    lay: value_to_price(&m.l),
                    status: value_to_string(&m.gstatus)
                        .map(|s| MarketStatus::from_feed(&s))
                        .unwrap_or(MarketStatus::Suspended),
                })
            })
            .collect();

        Ok(CasinoGameData {
            game_type: game_type.to_string(),
            round_id,
            timer,
            cards,
            markets,
        })
    }

    fn to_result(game_type: &str, payload: ResultPayload) -> CasinoResult {
        let rounds = payload
            .res
            .into_iter()
            .filter_map(|r| {
                Some(RoundResult {
                    round_id: value_to_string(&r.mid)?,
                    winner: value_to_string(&r.win)?,
                })
            })
            .take(MAX_RESULTS)
            .collect();

        CasinoResult {
            game_type: game_type.to_string(),
            rounds,
        }
    }
}

#[async_trait]
impl CasinoFeed for DiamondClient {
    async fn fetch_game_data(&self, game_type: &str) -> Result<CasinoGameData> {
        let payload: GamePayload = self.casino_api("data", game_type).await?;
        Self::to_game_data(game_type, payload)
    }

    async fn fetch_result(&self, game_type: &str) -> Result<CasinoResult> {
        let payload: ResultPayload = self.casino_api("result", game_type).await?;
        let result = Self::to_result(game_type, payload);
        if result.rounds.is_empty() {
            warn!(game_type, "Diamond returned no results");
        }
        Ok(result)
    }

    fn name(&self) -> &str {
        FEED_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Query, routing::get, Json, Router};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::collections::HashMap;

    fn payload(v: Value) -> GamePayload {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_flat_payload() {
        let p = payload(json!({
            "mid": "101240519",
            "autotime": "12",
            "card": "ASS,10HH",
            "sub": [
                {"sid": 1, "nat": "Player A", "b": 1.98, "l": 0, "gstatus": "ACTIVE"},
                {"sid": "2", "nat": "Player B", "b": "1.98", "gstatus": "SUSPENDED"}
            ]
        }));
        let data = DiamondClient::to_game_data("teen20", p).unwrap();

        assert_eq!(data.round_id, "101240519");
        assert_eq!(data.timer, Some(12));
        assert_eq!(data.cards, "ASS,10HH");
        assert_eq!(data.markets.len(), 2);
        assert_eq!(data.markets[0].back, Some(dec!(1.98)));
        assert_eq!(data.markets[0].lay, None);
        assert_eq!(data.markets[1].status, MarketStatus::Suspended);
        assert_eq!(data.open_markets().count(), 1);
    }

    #[test]
    fn test_legacy_t1_t2_payload() {
        let p = payload(json!({
            "t1": [{"mid": "2.2405", "autotime": 5, "C1": "KHH", "C2": "1", "C3": "QSS"}],
            "t2": [
                {"sid": "1", "nat": "Dragon", "b1": "2.00", "l1": "2.02", "gstatus": "1"},
                {"sid": "", "nat": "broken"}
            ]
        }));
        let data = DiamondClient::to_game_data("dt20", p).unwrap();

        assert_eq!(data.round_id, "2.2405");
        assert_eq!(data.timer, Some(5));
        assert_eq!(data.cards, "KHH,QSS");
        assert_eq!(data.markets.len(), 1);
        assert_eq!(data.market("1").unwrap().lay, Some(dec!(2.02)));
        assert_eq!(data.markets[0].status, MarketStatus::Active);
    }

    #[test]
    fn test_missing_round_id_is_error() {
        let p = payload(json!({"sub": []}));
        assert!(DiamondClient::to_game_data("teen20", p).is_err());
    }

    #[test]
    fn test_result_conversion() {
        let p: ResultPayload = serde_json::from_value(json!({
            "res": [
                {"mid": "11", "win": "1"},
                {"mid": "10", "result": 2},
                {"mid": null, "win": "1"}
            ]
        }))
        .unwrap();
        let result = DiamondClient::to_result("teen20", p);
        assert_eq!(result.rounds.len(), 2);
        assert_eq!(result.latest().unwrap().round_id, "11");
        assert_eq!(result.rounds[1].winner, "2");
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_fetch_game_data_over_http() {
        let router = Router::new().route(
            "/casino/data",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q.get("key").map(String::as_str), Some("secret"));
                Json(json!({
                    "success": true,
                    "data": {"mid": q.get("type").cloned().unwrap_or_default(), "sub": []}
                }))
            }),
        );
        let base = serve(router).await;
        let client = DiamondClient::new(base, SecretString::new("secret".into())).unwrap();

        let data = client.fetch_game_data("teen20").await.unwrap();
        assert_eq!(data.round_id, "teen20");
        assert_eq!(client.name(), "diamond");
    }

    #[tokio::test]
    async fn test_fetch_rejected_envelope() {
        let router = Router::new().route(
            "/casino/result",
            get(|| async { Json(json!({"success": false, "msg": "invalid key"})) }),
        );
        let base = serve(router).await;
        let client = DiamondClient::new(base, SecretString::new("bad".into())).unwrap();

        let err = client.fetch_result("teen20").await.unwrap_err();
        assert!(err.to_string().contains("invalid key"));
    }

    #[tokio::test]
    async fn test_fetch_http_error() {
        let router = Router::new();
        let base = serve(router).await;
        let client = DiamondClient::new(base, SecretString::new("k".into())).unwrap();
        assert!(client.fetch_game_data("teen20").await.is_err());
    }
}

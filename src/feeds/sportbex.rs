//! SportBex sportsbook integration.
//!
//! SportBex re-publishes the Betfair exchange catalogue and prices over a
//! plain REST API authenticated by a static key header.
//!
//! Base URL: https://trial-api.sportbex.com/api
//! Auth header: `sportbex-api-key: {key}`
//!
//! Endpoints used:
//! - `GET  /betfair/sports`
//! - `GET  /betfair/competitions/{sport_id}`
//! - `GET  /betfair/event/{sport_id}/{competition_id}`
//! - `POST /betfair/listMarketBook/{sport_id}` with `{"marketIds": [...]}`
//!
//! Prices are decimal odds. Only the best available back/lay level per
//! runner is kept.

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::{value_to_price, value_to_string};
use crate::types::MarketStatus;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://trial-api.sportbex.com/api";
const API_KEY_HEADER: &str = "sportbex-api-key";

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTypeResult {
    event_type: IdName,
    #[serde(default)]
    market_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompetitionResult {
    competition: IdName,
    #[serde(default)]
    competition_region: Option<String>,
    #[serde(default)]
    market_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventResult {
    event: EventInfo,
    #[serde(default)]
    market_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct IdName {
    id: Value,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventInfo {
    id: Value,
    name: String,
    #[serde(default)]
    country_code: Option<String>,
    #[serde(default)]
    open_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketBook {
    market_id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    inplay: Option<bool>,
    #[serde(default)]
    runners: Vec<RunnerBook>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunnerBook {
    selection_id: Value,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    ex: Option<ExchangePrices>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangePrices {
    #[serde(default)]
    available_to_back: Vec<PriceSize>,
    #[serde(default)]
    available_to_lay: Vec<PriceSize>,
}

#[derive(Debug, Deserialize)]
struct PriceSize {
    price: Value,
    #[serde(default)]
    size: Value,
}

// ---------------------------------------------------------------------------
// Public model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sport {
    pub id: String,
    pub name: String,
    pub market_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Competition {
    pub id: String,
    pub name: String,
    pub region: Option<String>,
    pub market_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SportEvent {
    pub id: String,
    pub name: String,
    pub country_code: Option<String>,
    pub open_date: Option<String>,
    pub market_count: u32,
}

/// Best prices for one exchange market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOdds {
    pub market_id: String,
    pub status: MarketStatus,
    pub in_play: bool,
    pub runners: Vec<RunnerOdds>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerOdds {
    pub selection_id: String,
    pub back: Option<Decimal>,
    pub back_size: Option<Decimal>,
    pub lay: Option<Decimal>,
    pub lay_size: Option<Decimal>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// SportBex REST client.
pub struct SportBexClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl SportBexClient {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("ODDSDESK/0.1.0")
            .build()
            .context("Failed to build HTTP client for SportBex")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.header(API_KEY_HEADER, self.api_key.expose_secret().as_str())
            .header("Accept", "application/json")
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        req: RequestBuilder,
    ) -> Result<T> {
        debug!(endpoint, "SportBex API request");

        let resp = self
            .authed(req)
            .send()
            .await
            .with_context(|| format!("SportBex {endpoint} request failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("SportBex {endpoint} error {status}: {body}");
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse SportBex {endpoint} response"))
    }

    /// List all sports with open markets.
    pub async fn list_sports(&self) -> Result<Vec<Sport>> {
        let url = format!("{}/betfair/sports", self.base_url);
        let raw: Vec<EventTypeResult> = self.send("sports", self.http.get(&url)).await?;

        let sports: Vec<Sport> = raw
            .into_iter()
            .filter_map(|r| {
                Some(Sport {
                    id: value_to_string(&r.event_type.id)?,
                    name: r.event_type.name,
                    market_count: r.market_count.unwrap_or(0),
                })
            })
            .collect();

        info!(count = sports.len(), "SportBex sports fetched");
        Ok(sports)
    }

    /// List competitions for a sport.
    pub async fn list_competitions(&self, sport_id: &str) -> Result<Vec<Competition>> {
        let url = format!("{}/betfair/competitions/{sport_id}", self.base_url);
        let raw: Vec<CompetitionResult> =
            self.send("competitions", self.http.get(&url)).await?;

        Ok(raw
            .into_iter()
            .filter_map(|r| {
                Some(Competition {
                    id: value_to_string(&r.competition.id)?,
                    name: r.competition.name,
                    region: r.competition_region,
                    market_count: r.market_count.unwrap_or(0),
                })
            })
            .collect())
    }

    /// List events in a competition.
    pub async fn list_events(&self, sport_id: &str, competition_id: &str) -> Result<Vec<SportEvent>> {
        let url = format!("{}/betfair/event/{sport_id}/{competition_id}", self.base_url);
        let raw: Vec<EventResult> = self.send("event", self.http.get(&url)).await?;

        Ok(raw
            .into_iter()
            .filter_map(|r| {
                Some(SportEvent {
                    id: value_to_string(&r.event.id)?,
                    name: r.event.name,
                    country_code: r.event.country_code,
                    open_date: r.event.open_date,
                    market_count: r.market_count.unwrap_or(0),
                })
            })
            .collect())
    }

    /// Fetch best back/lay prices for the given markets.
    pub async fn market_odds(&self, sport_id: &str, market_ids: &[String]) -> Result<Vec<MarketOdds>> {
        if market_ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/betfair/listMarketBook/{sport_id}", self.base_url);
        let body = serde_json::json!({ "marketIds": market_ids });
        let raw: Vec<MarketBook> = self
            .send("listMarketBook", self.http.post(&url).json(&body))
            .await?;

        Ok(raw.into_iter().map(Self::to_market_odds).collect())
    }

    fn to_market_odds(book: MarketBook) -> MarketOdds {
        let runners = book
            .runners
            .into_iter()
            .filter(|r| r.status.as_deref().map_or(true, |s| s == "ACTIVE"))
            .filter_map(|r| {
                let ex = r.ex.unwrap_or_default();
                let best_back = ex.available_to_back.first();
                let best_lay = ex.available_to_lay.first();
                Some(RunnerOdds {
                    selection_id: value_to_string(&r.selection_id)?,
                    back: best_back.and_then(|p| value_to_price(&p.price)),
                    back_size: best_back.and_then(|p| value_to_price(&p.size)),
                    lay: best_lay.and_then(|p| value_to_price(&p.price)),
                    lay_size: best_lay.and_then(|p| value_to_price(&p.size)),
                })
            })
            .collect();

        MarketOdds {
            market_id: book.market_id,
            status: book
                .status
                .as_deref()
                .map(MarketStatus::from_feed)
                .unwrap_or(MarketStatus::Suspended),
            in_play: book.inplay.unwrap_or(false),
            runners,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, routing::get, routing::post, Json, Router};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn book(v: Value) -> MarketBook {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_to_market_odds_best_level() {
        let odds = SportBexClient::to_market_odds(book(json!({
            "marketId": "1.2345",
            "status": "OPEN",
            "inplay": true,
            "runners": [
                {"selectionId": 47972, "status": "ACTIVE", "ex": {
                    "availableToBack": [{"price": 1.5, "size": 120.0}, {"price": 1.49, "size": 10}],
                    "availableToLay": [{"price": 1.52, "size": 80}]
                }},
                {"selectionId": 47973, "status": "REMOVED"}
            ]
        })));

        assert_eq!(odds.status, MarketStatus::Active);
        assert!(odds.in_play);
        assert_eq!(odds.runners.len(), 1);
        assert_eq!(odds.runners[0].selection_id, "47972");
        assert_eq!(odds.runners[0].back, Some(dec!(1.5)));
        assert_eq!(odds.runners[0].back_size, Some(dec!(120.0)));
        assert_eq!(odds.runners[0].lay, Some(dec!(1.52)));
    }

    #[test]
    fn test_to_market_odds_empty_book() {
        let odds = SportBexClient::to_market_odds(book(json!({"marketId": "1.1"})));
        assert_eq!(odds.status, MarketStatus::Suspended);
        assert!(odds.runners.is_empty());
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
    async fn test_list_sports_sends_key_header() {
        let router = Router::new().route(
            "/betfair/sports",
            get(|headers: HeaderMap| async move {
                let key = headers
                    .get(API_KEY_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!([
                    {"eventType": {"id": "4", "name": format!("Cricket-{key}")}, "marketCount": 12},
                    {"eventType": {"id": 1, "name": "Soccer"}}
                ]))
            }),
        );
        let base = serve(router).await;
        let client = SportBexClient::new(base, SecretString::new("k1".into())).unwrap();

        let sports = client.list_sports().await.unwrap();
        assert_eq!(sports.len(), 2);
        assert_eq!(sports[0].name, "Cricket-k1");
        assert_eq!(sports[0].market_count, 12);
        assert_eq!(sports[1].id, "1");
    }

    #[tokio::test]
    async fn test_market_odds_posts_ids() {
        let router = Router::new().route(
            "/betfair/listMarketBook/4",
            post(|Json(body): Json<Value>| async move {
                let id = body["marketIds"][0].as_str().unwrap_or_default().to_string();
                Json(json!([{"marketId": id, "status": "OPEN", "runners": []}]))
            }),
        );
        let base = serve(router).await;
        let client = SportBexClient::new(base, SecretString::new("k".into())).unwrap();

        let odds = client.market_odds("4", &["1.99".to_string()]).await.unwrap();
        assert_eq!(odds[0].market_id, "1.99");
        assert!(client.market_odds("4", &[]).await.unwrap().is_empty());
    }
}

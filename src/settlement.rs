//! Settlement trigger.
//!
//! Settling a market is a single RPC: hand over the market id and the
//! result code, get back a summary of what moved. The RPC owns all payout
//! arithmetic; this module validates inputs, forwards, and reports.

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::ledger::Ledger;
use crate::types::{ResultCode, SettlementSummary};
use crate::wallet::EdgeFunctionClient;

/// Body of the `settle_market` RPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettleMarketParams {
    pub market_id: String,
    pub result_code: String,
}

/// What the RPC returns: a summary on success, an error string otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettleMarketResponse {
    pub success: bool,
    #[serde(default)]
    pub summary: Option<SettlementSummary>,
    #[serde(default)]
    pub error: Option<String>,
}

impl SettleMarketResponse {
    pub fn ok(summary: SettlementSummary) -> Self {
        Self {
            success: true,
            summary: Some(summary),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            summary: None,
            error: Some(error.into()),
        }
    }
}

/// The `settle_market` RPC, local or remote.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettlementRpc: Send + Sync {
    async fn settle_market(&self, params: &SettleMarketParams) -> Result<SettleMarketResponse>;
}

#[async_trait]
impl SettlementRpc for Ledger {
    async fn settle_market(&self, params: &SettleMarketParams) -> Result<SettleMarketResponse> {
        Ok(
            match Ledger::settle_market(self, &params.market_id, &params.result_code).await {
                Ok(summary) => SettleMarketResponse::ok(summary),
                Err(e) => SettleMarketResponse::failed(e.to_string()),
            },
        )
    }
}

/// Calls `POST {base}/rest/v1/rpc/settle_market`.
pub struct RemoteSettlement {
    client: EdgeFunctionClient,
}

impl RemoteSettlement {
    pub fn new(base_url: impl Into<String>, anon_key: SecretString) -> Result<Self> {
        Ok(Self {
            client: EdgeFunctionClient::new(base_url, anon_key)?,
        })
    }
}

#[async_trait]
impl SettlementRpc for RemoteSettlement {
    async fn settle_market(&self, params: &SettleMarketParams) -> Result<SettleMarketResponse> {
        let url = format!("{}/rest/v1/rpc/settle_market", self.client.base_url());
        self.client.post(&url, "settle_market", params).await
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct SettlementService {
    rpc: Arc<dyn SettlementRpc>,
}

impl SettlementService {
    pub fn new(rpc: Arc<dyn SettlementRpc>) -> Self {
        Self { rpc }
    }

    /// Settle a market. Returns the RPC's summary or its error string.
    ///
    /// Malformed inputs are refused before the RPC is called; transport
    /// failures are folded into the error string as well.
    pub async fn settle_market(
        &self,
        market_id: &str,
        result_code: &str,
    ) -> std::result::Result<SettlementSummary, String> {
        if market_id.trim().is_empty() {
            return Err("market id is required".to_string());
        }
        result_code.parse::<ResultCode>().map_err(|e| e.to_string())?;

        let params = SettleMarketParams {
            market_id: market_id.to_string(),
            result_code: result_code.to_string(),
        };

        let response = match self.rpc.settle_market(&params).await {
            Ok(r) => r,
            Err(e) => {
                error!(market_id, error = %e, "settle_market call failed");
                return Err(e.to_string());
            }
        };

        match (response.success, response.summary) {
            (true, Some(summary)) => {
                info!(market_id, result_code, summary = %summary, "Settlement complete");
                Ok(summary)
            }
            (_, _) => {
                let msg = response
                    .error
                    .unwrap_or_else(|| "settlement returned no summary".to_string());
                error!(market_id, result_code, error = %msg, "Settlement failed");
                Err(msg)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

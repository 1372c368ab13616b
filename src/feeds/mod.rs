//! Odds feed integrations.
//!
//! Defines the `CasinoFeed` trait and provides implementations for:
//! - Diamond: casino table state and results over HTTP (plus the WebSocket
//!   gateway handled by [`crate::mirror`])
//! - SportBex: sportsbook catalogue and prices over REST

pub mod diamond;
pub mod sportbex;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use crate::types::{CasinoGameData, CasinoResult};

/// Abstraction over casino odds sources.
///
/// The poller only ever needs the current table state and the latest
/// settled rounds; each call replaces whatever the caller held before.
#[async_trait]
pub trait CasinoFeed: Send + Sync {
    /// Fetch the live state of a casino table.
    async fn fetch_game_data(&self, game_type: &str) -> Result<CasinoGameData>;

    /// Fetch the most recent results for a casino table.
    async fn fetch_result(&self, game_type: &str) -> Result<CasinoResult>;

    /// Feed name for logging and identification.
    fn name(&self) -> &str;
}

/// Render a loosely-typed JSON scalar as a string.
///
/// Feeds send ids and timers as either numbers or strings.
pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse a price. Zero, blank and non-numeric values mean "no price".
pub(crate) fn value_to_price(value: &Value) -> Option<Decimal> {
    let raw = value_to_string(value)?;
    let price = Decimal::from_str(&raw).ok()?;
    (price > Decimal::ZERO).then_some(price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&json!("abc")), Some("abc".into()));
        assert_eq!(value_to_string(&json!(42)), Some("42".into()));
        assert_eq!(value_to_string(&json!("  ")), None);
        assert_eq!(value_to_string(&Value::Null), None);
    }

    #[test]
    fn test_value_to_price() {
        assert_eq!(value_to_price(&json!("1.98")), Some(dec!(1.98)));
        assert_eq!(value_to_price(&json!(2)), Some(dec!(2)));
        assert_eq!(value_to_price(&json!("0")), None);
        assert_eq!(value_to_price(&json!(0)), None);
        assert_eq!(value_to_price(&json!("n/a")), None);
    }
}

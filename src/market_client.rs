use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventOutcome {
    pub token_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketEvent {
    pub event_slug: String,
    pub tipoff_utc: DateTime<Utc>,
    pub outcomes: Vec<EventOutcome>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceQuote {
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub mid: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBookLevel {
    pub price: Decimal,
    pub size_usd: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<OrderBookLevel>,
    pub asks: Vec<OrderBookLevel>,
}

impl OrderBook {
    /// USD depth available on the ask side within 5 cents of best-ask.
    pub fn ask_depth_5c_usd(&self) -> Decimal {
        let Some(best_ask) = self.asks.iter().map(|l| l.price).min() else {
            return Decimal::ZERO;
        };
        let ceiling = best_ask + Decimal::new(5, 2);
        self.asks
            .iter()
            .filter(|l| l.price <= ceiling)
            .map(|l| l.size_usd)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeOrderStatus {
    Open,
    Filled,
    PartiallyFilled,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderState {
    pub status: ExchangeOrderStatus,
    pub filled_shares: Decimal,
    pub avg_price: Decimal,
    pub fee_rate_bps: i32,
    pub fee_usd: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatusCode {
    Executed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReceipt {
    pub status: MergeStatusCode,
    pub tx_hash: Option<String>,
    pub gas_cost_usd: Decimal,
}

/// Which class of wallet is signing on-chain calls (merge redeem). An
/// exhaustively-matched tagged enum, never a string tag compared ad hoc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletClass {
    EoaWallet,
    ProxyWallet,
}

/// Abstract capability set for the prediction-market exchange. Concrete
/// implementations (the specific HTTP/chain APIs) are collaborators outside
/// this crate's core; executors depend only on this trait.
#[async_trait]
pub trait MarketClient: Send + Sync {
    fn wallet_class(&self) -> WalletClass;

    async fn get_events(&self, date: DateTime<Utc>) -> Result<Vec<MarketEvent>>;

    async fn get_price(&self, token_id: &str) -> Result<PriceQuote>;

    async fn get_order_book(&self, token_id: &str) -> Result<OrderBook>;

    /// Maker-only: `price` must be below best ask at call time.
    async fn place_limit_buy(
        &self,
        token_id: &str,
        price: Decimal,
        size_usd: Decimal,
    ) -> Result<String>;

    async fn cancel_order(&self, order_id: &str) -> Result<bool>;

    async fn get_order(&self, order_id: &str) -> Result<OrderState>;

    async fn cancel_and_replace(
        &self,
        order_id: &str,
        new_price: Decimal,
        new_size: Decimal,
    ) -> Result<String>;

    /// Burns matched YES/NO shares back into collateral. Supports both wallet
    /// classes; multi-signature proxies are out of scope.
    async fn merge_positions(
        &self,
        condition_id: &str,
        amount_shares: Decimal,
    ) -> Result<MergeReceipt>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
    Postponed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredGame {
    pub away_abbr: String,
    pub home_abbr: String,
    pub tipoff_utc: DateTime<Utc>,
    pub status: GameStatus,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
}

/// Abstract sportsbook discovery capability, kept separate from the market
/// client since games and markets come from different sources.
#[async_trait]
pub trait GameDiscovery: Send + Sync {
    async fn get_games(&self, date: DateTime<Utc>) -> Result<Vec<DiscoveredGame>>;
}

/// `nba-{away_abbr_lower}-{home_abbr_lower}-YYYY-MM-DD`, where the date is
/// the tipoff date in US Eastern time, not UTC.
pub fn event_slug(away_abbr: &str, home_abbr: &str, tipoff_eastern_date: chrono::NaiveDate) -> String {
    format!(
        "nba-{}-{}-{}",
        away_abbr.to_lowercase(),
        home_abbr.to_lowercase(),
        tipoff_eastern_date.format("%Y-%m-%d")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_slug_is_lowercase_with_eastern_date() {
        let date = chrono::NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        assert_eq!(event_slug("BOS", "MIA", date), "nba-bos-mia-2026-01-15");
    }

    #[test]
    fn ask_depth_5c_sums_only_near_levels() {
        let book = OrderBook {
            bids: vec![],
            asks: vec![
                OrderBookLevel { price: Decimal::new(45, 2), size_usd: Decimal::from(100) },
                OrderBookLevel { price: Decimal::new(49, 2), size_usd: Decimal::from(50) },
                OrderBookLevel { price: Decimal::new(60, 2), size_usd: Decimal::from(999) },
            ],
        };
        assert_eq!(book.ask_depth_5c_usd(), Decimal::from(150));
    }
}

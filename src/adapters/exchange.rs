use crate::error::{EngineError, Result};
use crate::market_client::{
    DiscoveredGame, GameDiscovery, MarketClient, MarketEvent, MergeReceipt, OrderBook, OrderState,
    PriceQuote, WalletClass,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;

/// Thin REST client against the exchange's event/order/merge endpoints.
/// Request and response bodies mirror the domain types directly; a real
/// exchange-specific wire format would sit behind this same trait without
/// touching executor code.
pub struct HttpMarketClient {
    http: Client,
    base_url: String,
    wallet_class: WalletClass,
}

impl HttpMarketClient {
    pub fn new(base_url: impl Into<String>, wallet_class: WalletClass) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            wallet_class,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct PlaceLimitBuyRequest<'a> {
    token_id: &'a str,
    price: Decimal,
    size_usd: Decimal,
}

#[derive(Serialize)]
struct CancelAndReplaceRequest {
    new_price: Decimal,
    new_size: Decimal,
}

#[derive(Serialize)]
struct MergePositionsRequest<'a> {
    condition_id: &'a str,
    amount_shares: Decimal,
}

#[async_trait]
impl MarketClient for HttpMarketClient {
    fn wallet_class(&self) -> WalletClass {
        self.wallet_class
    }

    async fn get_events(&self, date: DateTime<Utc>) -> Result<Vec<MarketEvent>> {
        let resp = self
            .http
            .get(self.url("/events"))
            .query(&[("date", date.format("%Y-%m-%d").to_string())])
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn get_price(&self, token_id: &str) -> Result<PriceQuote> {
        let resp = self
            .http
            .get(self.url(&format!("/price/{token_id}")))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn get_order_book(&self, token_id: &str) -> Result<OrderBook> {
        let resp = self
            .http
            .get(self.url(&format!("/book/{token_id}")))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn place_limit_buy(&self, token_id: &str, price: Decimal, size_usd: Decimal) -> Result<String> {
        let resp = self
            .http
            .post(self.url("/orders"))
            .json(&PlaceLimitBuyRequest { token_id, price, size_usd })
            .send()
            .await?
            .error_for_status()?;
        #[derive(serde::Deserialize)]
        struct Resp {
            order_id: String,
        }
        Ok(resp.json::<Resp>().await?.order_id)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool> {
        let resp = self
            .http
            .delete(self.url(&format!("/orders/{order_id}")))
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderState> {
        let resp = self
            .http
            .get(self.url(&format!("/orders/{order_id}")))
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    async fn cancel_and_replace(&self, order_id: &str, new_price: Decimal, new_size: Decimal) -> Result<String> {
        let resp = self
            .http
            .post(self.url(&format!("/orders/{order_id}/replace")))
            .json(&CancelAndReplaceRequest { new_price, new_size })
            .send()
            .await?
            .error_for_status()?;
        #[derive(serde::Deserialize)]
        struct Resp {
            order_id: String,
        }
        Ok(resp.json::<Resp>().await?.order_id)
    }

    async fn merge_positions(&self, condition_id: &str, amount_shares: Decimal) -> Result<MergeReceipt> {
        let resp = self
            .http
            .post(self.url("/merge"))
            .json(&MergePositionsRequest { condition_id, amount_shares })
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }
}

/// Sportsbook schedule/score feed, kept as a separate collaborator from the
/// market client since games and markets come from different sources.
pub struct HttpGameDiscovery {
    http: Client,
    base_url: String,
}

impl HttpGameDiscovery {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl GameDiscovery for HttpGameDiscovery {
    async fn get_games(&self, date: DateTime<Utc>) -> Result<Vec<DiscoveredGame>> {
        let url = format!("{}/games", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .get(url)
            .query(&[("date", date.format("%Y-%m-%d").to_string())])
            .send()
            .await
            .map_err(EngineError::Http)?
            .error_for_status()
            .map_err(EngineError::Http)?;
        Ok(resp.json().await?)
    }
}

pub mod dca;
pub mod directional;
pub mod hedge;
pub mod merge;

use crate::adapters::Store;
use crate::config::AppConfig;
use crate::market_client::MarketClient;
use crate::mode::ExecutionMode;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Shared collaborators and knobs every executor needs. Grouped into one
/// struct so executor functions take a single context argument rather than
/// a long parameter list.
pub struct ExecutorContext {
    pub store: Arc<Store>,
    pub market: Arc<dyn MarketClient>,
    pub config: AppConfig,
    pub mode: ExecutionMode,
    pub risk_multiplier: Decimal,
    pub orders_placed_this_tick: std::sync::atomic::AtomicU32,
}

impl ExecutorContext {
    pub fn quota_remaining(&self) -> bool {
        let placed = self
            .orders_placed_this_tick
            .load(std::sync::atomic::Ordering::SeqCst);
        placed < self.config.risk.max_orders_per_tick
    }

    pub fn record_order_placed(&self) {
        self.orders_placed_this_tick
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}

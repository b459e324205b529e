use crate::domain::order_event::OrderEvent;
use crate::domain::signal::{OrderStatus, Signal};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone)]
pub struct OrderManagerConfig {
    pub order_ttl_min: i64,
    pub order_max_replaces: i32,
    pub check_batch_size: usize,
}

/// Result of evaluating one signal's order on one order-manager pass.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderAction {
    /// Market reports a fill; signal and an order event were updated by the caller.
    Filled,
    /// Still within TTL, no action needed.
    Keep,
    /// TTL/replace budget exhausted or tipoff has passed: cancel and expire.
    CancelExpire,
    /// Cancel the old order and place a new one at `new_price`.
    Reprice { new_price: Decimal },
}

/// Pure decision function for one signal given its current market fill state
/// and a freshly fetched best-ask; the caller performs the actual API calls
/// and persists the result.
#[instrument(skip(signal))]
pub fn evaluate(
    signal: &Signal,
    cfg: &OrderManagerConfig,
    now: DateTime<Utc>,
    tipoff_utc: DateTime<Utc>,
    best_ask: Decimal,
    is_hedge: bool,
    dir_vwap: Decimal,
    min_margin: Decimal,
) -> OrderAction {
    let placed_at = match signal.order_placed_at {
        Some(t) => t,
        None => return OrderAction::Keep,
    };

    if now - placed_at < Duration::minutes(cfg.order_ttl_min) {
        return OrderAction::Keep;
    }

    if signal.order_replace_count >= cfg.order_max_replaces || now >= tipoff_utc {
        debug!(signal_id = ?signal.id, "order expired: replace budget or tipoff cutoff reached");
        return OrderAction::CancelExpire;
    }

    let new_limit = best_ask - Decimal::new(1, 2); // best_ask - 0.01

    if is_hedge {
        let max_acceptable = Decimal::ONE - dir_vwap - min_margin;
        if dir_vwap + new_limit > Decimal::ONE - min_margin {
            warn!("hedge reprice would violate merge economics, keeping order");
            let _ = max_acceptable; // documents the rejected bound for diagnostics
            return OrderAction::Keep;
        }
    }

    OrderAction::Reprice { new_price: new_limit }
}

/// Append-log helper: builds the `replaced` order event for a reprice action.
pub fn replace_event(signal_id: i64, old_price: Decimal, new_price: Decimal) -> OrderEvent {
    OrderEvent::replaced(signal_id, old_price, new_price)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::SignalRole;
    use rust_decimal_macros::dec;

    fn cfg() -> OrderManagerConfig {
        OrderManagerConfig {
            order_ttl_min: 5,
            order_max_replaces: 3,
            check_batch_size: 10,
        }
    }

    fn placed_signal(placed_at: DateTime<Utc>, replace_count: i32) -> Signal {
        let mut s = Signal::new(1, "tok".into(), dec!(0.45), dec!(50), dec!(111), SignalRole::Directional, 1);
        s.order_status = OrderStatus::Placed;
        s.order_placed_at = Some(placed_at);
        s.order_replace_count = replace_count;
        s
    }

    #[test]
    fn within_ttl_keeps_order() {
        let now = Utc::now();
        let s = placed_signal(now, 0);
        let action = evaluate(&s, &cfg(), now, now + Duration::hours(2), dec!(0.46), false, dec!(0), dec!(0));
        assert_eq!(action, OrderAction::Keep);
    }

    #[test]
    fn past_ttl_reprices() {
        let now = Utc::now();
        let placed_at = now - Duration::minutes(6);
        let s = placed_signal(placed_at, 0);
        let action = evaluate(&s, &cfg(), now, now + Duration::hours(2), dec!(0.46), false, dec!(0), dec!(0));
        assert_eq!(action, OrderAction::Reprice { new_price: dec!(0.45) });
    }

    #[test]
    fn max_replaces_exhausted_expires() {
        let now = Utc::now();
        let placed_at = now - Duration::minutes(6);
        let s = placed_signal(placed_at, 3);
        let action = evaluate(&s, &cfg(), now, now + Duration::hours(2), dec!(0.46), false, dec!(0), dec!(0));
        assert_eq!(action, OrderAction::CancelExpire);
    }

    #[test]
    fn past_tipoff_expires_even_within_replace_budget() {
        let now = Utc::now();
        let placed_at = now - Duration::minutes(6);
        let s = placed_signal(placed_at, 0);
        let action = evaluate(&s, &cfg(), now, now - Duration::minutes(1), dec!(0.46), false, dec!(0), dec!(0));
        assert_eq!(action, OrderAction::CancelExpire);
    }

    #[test]
    fn hedge_reprice_blocked_when_merge_economics_violated() {
        let now = Utc::now();
        let placed_at = now - Duration::minutes(6);
        let s = placed_signal(placed_at, 0);
        // dir_vwap=0.55, min_margin=0.02, best_ask=0.50 -> new_limit=0.49
        // dir_vwap + new_limit = 1.04 > 1 - 0.02 = 0.98 -> blocked.
        let action = evaluate(&s, &cfg(), now, now + Duration::hours(2), dec!(0.50), true, dec!(0.55), dec!(0.02));
        assert_eq!(action, OrderAction::Keep);
    }

    #[test]
    fn reprice_sequence_hits_max_replaces_then_expires() {
        let now = Utc::now();
        let tipoff = now + Duration::hours(2);
        let mut s = placed_signal(now - Duration::minutes(6), 0);
        for _ in 0..3 {
            let action = evaluate(&s, &cfg(), now, tipoff, dec!(0.46), false, dec!(0), dec!(0));
            match action {
                OrderAction::Reprice { .. } => s.order_replace_count += 1,
                other => panic!("expected reprice, got {other:?}"),
            }
        }
        let action = evaluate(&s, &cfg(), now, tipoff, dec!(0.46), false, dec!(0), dec!(0));
        assert_eq!(action, OrderAction::CancelExpire);
    }
}

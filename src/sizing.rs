use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// Diagnostic outcome of a sizing attempt, mirroring the `Reject{reason,
/// details}` / `Approve(Signal)` shape used elsewhere for entry-gate logic.
#[derive(Debug, Clone, Serialize)]
pub enum SizingOutcome {
    Approve {
        size_usd: Decimal,
    },
    Reject {
        reason: String,
        details: String,
    },
}

#[derive(Debug, Clone)]
pub struct LiquiditySnapshot {
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub ask_depth_5c_usd: Decimal,
}

impl LiquiditySnapshot {
    pub fn spread_pct(&self) -> Decimal {
        if self.best_ask.is_zero() {
            return Decimal::ZERO;
        }
        (self.best_ask - self.best_bid) / self.best_ask
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SizingInputs {
    pub bankroll: Decimal,
    pub point_estimate: Decimal,
    pub lower_bound_win_rate: Decimal,
    pub fractional_kelly: Decimal,
    pub capital_risk_pct: Decimal,
    pub max_position_usd: Decimal,
    pub liquidity_fill_pct: Decimal,
    pub max_spread_pct: Decimal,
    pub risk_engine_multiplier: Decimal,
}

/// Fractional-Kelly position sizer combining win-rate edge, capital
/// constraints, and order-book liquidity. Pure function; no I/O.
pub fn size_entry(
    inputs: &SizingInputs,
    liquidity: &LiquiditySnapshot,
) -> SizingOutcome {
    let ask = liquidity.best_ask;

    if ask <= Decimal::ZERO || ask >= Decimal::ONE {
        return SizingOutcome::Reject {
            reason: "invalid_ask".to_string(),
            details: format!("best_ask={ask} out of (0,1)"),
        };
    }

    // 1. EV guard.
    let ev_per_dollar = (inputs.lower_bound_win_rate / ask) - Decimal::ONE;
    if ev_per_dollar <= Decimal::ZERO {
        return SizingOutcome::Reject {
            reason: "no_edge".to_string(),
            details: format!("ev_per_dollar={ev_per_dollar}"),
        };
    }

    // 2. Kelly fraction at the lower bound, clamped to [0, 1].
    let one_minus_ask = Decimal::ONE - ask;
    if one_minus_ask <= Decimal::ZERO {
        return SizingOutcome::Reject {
            reason: "ask_at_ceiling".to_string(),
            details: "best_ask == 1.0".to_string(),
        };
    }
    let f = ((inputs.lower_bound_win_rate - ask) / one_minus_ask)
        .clamp(Decimal::ZERO, Decimal::ONE);
    if f.is_zero() {
        return SizingOutcome::Reject {
            reason: "zero_kelly_fraction".to_string(),
            details: "lb_wr <= ask".to_string(),
        };
    }

    // 3. Confidence multiplier.
    let m = if inputs.point_estimate.is_zero() {
        dec!(0.5)
    } else {
        (inputs.lower_bound_win_rate / inputs.point_estimate).clamp(dec!(0.5), Decimal::ONE)
    };

    // 4. Raw size.
    let mut size_usd =
        inputs.bankroll * inputs.fractional_kelly * f * m * inputs.risk_engine_multiplier;

    // 5. Capital cap.
    let capital_cap = inputs.bankroll * inputs.capital_risk_pct;
    size_usd = size_usd.min(capital_cap);

    // 6. Absolute cap.
    size_usd = size_usd.min(inputs.max_position_usd);

    // 7. Liquidity cap.
    let liquidity_cap = liquidity.ask_depth_5c_usd * inputs.liquidity_fill_pct;
    size_usd = size_usd.min(liquidity_cap);

    if size_usd <= Decimal::ZERO {
        return SizingOutcome::Reject {
            reason: "zero_liquidity".to_string(),
            details: format!("ask_depth_5c_usd={}", liquidity.ask_depth_5c_usd),
        };
    }

    // 8. Spread guard.
    if liquidity.spread_pct() > inputs.max_spread_pct {
        return SizingOutcome::Reject {
            reason: "spread_too_wide".to_string(),
            details: format!(
                "spread_pct={} > max_spread_pct={}",
                liquidity.spread_pct(),
                inputs.max_spread_pct
            ),
        };
    }

    SizingOutcome::Approve { size_usd }
}

/// Outcome of the target-holding DCA sizer.
#[derive(Debug, Clone, Serialize)]
pub enum DcaSizingOutcome {
    Order { size_usd: Decimal },
    TargetReached,
    BudgetExhausted,
}

/// Target-holding sizer for DCA follow-on entries.
pub fn size_dca_entry(
    running_cost: Decimal,
    filled_shares_total: Decimal,
    budget_usd: Decimal,
    remaining_entries: u32,
    current_price: Decimal,
    cap_mult: Decimal,
    min_order_usd: Decimal,
) -> DcaSizingOutcome {
    let value = filled_shares_total * current_price;
    let gap = (budget_usd - value).max(Decimal::ZERO);
    let remaining_budget = budget_usd - running_cost;

    if remaining_budget <= Decimal::ZERO {
        return DcaSizingOutcome::BudgetExhausted;
    }

    let k = remaining_entries.max(1);
    let cap = (remaining_budget / Decimal::from(k)) * cap_mult;

    let order = gap.min(remaining_budget).min(cap);

    if order < min_order_usd {
        if gap <= Decimal::ZERO {
            DcaSizingOutcome::TargetReached
        } else {
            DcaSizingOutcome::BudgetExhausted
        }
    } else {
        DcaSizingOutcome::Order { size_usd: order }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs() -> SizingInputs {
        SizingInputs {
            bankroll: dec!(5000),
            point_estimate: dec!(0.60),
            lower_bound_win_rate: dec!(0.55),
            fractional_kelly: dec!(0.25),
            capital_risk_pct: dec!(0.02),
            max_position_usd: dec!(100),
            liquidity_fill_pct: dec!(0.10),
            max_spread_pct: dec!(0.10),
            risk_engine_multiplier: Decimal::ONE,
        }
    }

    fn base_liquidity() -> LiquiditySnapshot {
        LiquiditySnapshot {
            best_bid: dec!(0.44),
            best_ask: dec!(0.45),
            ask_depth_5c_usd: dec!(5000),
        }
    }

    #[test]
    fn no_edge_rejects_with_zero_size() {
        let mut inputs = base_inputs();
        inputs.lower_bound_win_rate = dec!(0.30);
        let outcome = size_entry(&inputs, &base_liquidity());
        assert!(matches!(outcome, SizingOutcome::Reject { reason, .. } if reason == "no_edge"));
    }

    #[test]
    fn ask_at_one_rejects() {
        let inputs = base_inputs();
        let liquidity = LiquiditySnapshot {
            best_bid: dec!(0.99),
            best_ask: Decimal::ONE,
            ask_depth_5c_usd: dec!(5000),
        };
        let outcome = size_entry(&inputs, &liquidity);
        assert!(matches!(outcome, SizingOutcome::Reject { .. }));
    }

    #[test]
    fn zero_liquidity_rejects() {
        let inputs = base_inputs();
        let liquidity = LiquiditySnapshot {
            best_bid: dec!(0.44),
            best_ask: dec!(0.45),
            ask_depth_5c_usd: Decimal::ZERO,
        };
        let outcome = size_entry(&inputs, &liquidity);
        assert!(matches!(outcome, SizingOutcome::Reject { reason, .. } if reason == "zero_liquidity"));
    }

    #[test]
    fn wide_spread_rejects() {
        let inputs = base_inputs();
        let liquidity = LiquiditySnapshot {
            best_bid: dec!(0.30),
            best_ask: dec!(0.45),
            ask_depth_5c_usd: dec!(5000),
        };
        let outcome = size_entry(&inputs, &liquidity);
        assert!(matches!(outcome, SizingOutcome::Reject { reason, .. } if reason == "spread_too_wide"));
    }

    #[test]
    fn healthy_inputs_approve_a_capped_size() {
        let inputs = base_inputs();
        let outcome = size_entry(&inputs, &base_liquidity());
        match outcome {
            SizingOutcome::Approve { size_usd } => {
                assert!(size_usd > Decimal::ZERO);
                assert!(size_usd <= inputs.max_position_usd);
            }
            SizingOutcome::Reject { reason, details } => {
                panic!("expected approval, got reject: {reason} {details}")
            }
        }
    }

    #[test]
    fn dca_target_reached_when_gap_closed() {
        let outcome = size_dca_entry(
            dec!(100),
            dec!(222.22),
            dec!(100),
            3,
            dec!(0.45),
            dec!(2),
            dec!(1),
        );
        assert!(matches!(outcome, DcaSizingOutcome::TargetReached));
    }

    #[test]
    fn dca_sizes_an_order_within_budget() {
        let outcome = size_dca_entry(
            dec!(20),
            dec!(44.4),
            dec!(100),
            4,
            dec!(0.29),
            dec!(2),
            dec!(1),
        );
        match outcome {
            DcaSizingOutcome::Order { size_usd } => assert!(size_usd > Decimal::ZERO),
            other => panic!("expected an order, got {other:?}"),
        }
    }
}

use crate::domain::result::SettlementResult;
use crate::domain::signal::Signal;
use crate::market_client::GameStatus;
use rust_decimal::Decimal;
use tracing::{instrument, warn};

/// Computes a single signal's settlement PnL from its filled/merged state and
/// the game's resolved winner. One formula for single entries, DCA groups,
/// bothside pairs and partially-merged positions — no branching by position
/// structure.
#[instrument(skip(signal))]
pub fn settle_signal(
    signal: &Signal,
    winner_won: bool,
    score_home: Option<i32>,
    score_away: Option<i32>,
) -> SettlementResult {
    let settlement_price = if winner_won { Decimal::ONE } else { Decimal::ZERO };
    let remaining_shares = signal.remaining_shares();
    let cost = signal.cost();

    SettlementResult::compute(
        signal.id.unwrap_or_default(),
        remaining_shares,
        settlement_price,
        signal.merge_recovery_usd,
        cost,
        signal.fee_usd,
        score_home,
        score_away,
    )
}

/// A game is settleable when the box score is final or the market has
/// resolved to near-certainty and gone inactive. Postponed games are skipped,
/// not force-resolved.
pub fn is_settleable(status: GameStatus, market_resolved: bool) -> SettlementDecision {
    match status {
        GameStatus::Postponed => SettlementDecision::Skip,
        GameStatus::Final => SettlementDecision::Settle,
        GameStatus::InProgress | GameStatus::Scheduled => {
            if market_resolved {
                SettlementDecision::Settle
            } else {
                SettlementDecision::NotYet
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementDecision {
    Settle,
    NotYet,
    Skip,
}

pub fn warn_postponed(event_slug: &str) {
    warn!(event_slug, "postponed game: settlement skipped, job not force-resolved");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::{OrderStatus, SignalRole};
    use rust_decimal_macros::dec;

    #[test]
    fn single_directional_win_scenario() {
        let mut s = Signal::new(1, "tok".into(), dec!(0.45), dec!(90), dec!(200), SignalRole::Directional, 1);
        s.order_status = OrderStatus::Filled;
        s.vwap_to_date = dec!(0.45);
        let result = settle_signal(&s, true, Some(101), Some(97));
        assert_eq!(result.pnl_usd, dec!(110.00));
    }

    #[test]
    fn bothside_merge_net_result_matches_worked_example() {
        // Directional: 100 shares @ 0.45, merged away entirely, no remainder.
        // Total merge recovery is one pair-level figure ($6.00 here) that must be
        // split between the two legs, not credited in full to each.
        use crate::domain::vwap::Fill;
        use crate::market_client::WalletClass;
        use crate::merge_strategy::{combined_vwap, evaluate_merge_gate, mergeable_shares};

        let dir_fills = [Fill { price: dec!(0.45), shares: dec!(100) }];
        let hedge_fills = [Fill { price: dec!(0.49), shares: dec!(100) }];
        let cvwap = combined_vwap(&dir_fills, &hedge_fills).unwrap();
        let mergeable = mergeable_shares(dec!(100), dec!(100));
        let gate = evaluate_merge_gate(cvwap, mergeable, dec!(2), dec!(0.5), dec!(1), WalletClass::EoaWallet);

        let recovery_usd = mergeable * gate.recovery_per_share;
        let dir_recovery = recovery_usd * (dec!(100) / (dec!(100) + dec!(100)));
        let hedge_recovery = recovery_usd - dir_recovery;
        assert_eq!(dir_recovery + hedge_recovery, recovery_usd);

        let mut dir = Signal::new(1, "tok_home".into(), dec!(0.45), dec!(45), dec!(100), SignalRole::Directional, 1);
        dir.order_status = OrderStatus::Filled;
        dir.vwap_to_date = dec!(0.45);
        dir.shares_merged = dec!(100);
        dir.merge_recovery_usd = dir_recovery;

        let mut hedge = Signal::new(2, "tok_away".into(), dec!(0.49), dec!(49), dec!(100), SignalRole::Hedge, 1);
        hedge.order_status = OrderStatus::Filled;
        hedge.vwap_to_date = dec!(0.49);
        hedge.shares_merged = dec!(100);
        hedge.merge_recovery_usd = hedge_recovery;

        let dir_result = settle_signal(&dir, true, None, None);
        let hedge_result = settle_signal(&hedge, true, None, None);

        // Directional fully merged: pnl = 0 remaining*1 + 3 recovery - 45 cost = -42
        assert_eq!(dir_result.pnl_usd, dec!(-42.00));
        // Hedge fully merged: pnl = 0 + 3 - 49 = -46
        assert_eq!(hedge_result.pnl_usd, dec!(-46.00));
        assert_eq!(dir_result.pnl_usd + hedge_result.pnl_usd, dec!(-88.00));
    }

    #[test]
    fn postponed_game_is_skipped_not_force_resolved() {
        assert_eq!(is_settleable(GameStatus::Postponed, false), SettlementDecision::Skip);
    }

    #[test]
    fn in_progress_game_waits_unless_market_resolved() {
        assert_eq!(is_settleable(GameStatus::InProgress, false), SettlementDecision::NotYet);
        assert_eq!(is_settleable(GameStatus::InProgress, true), SettlementDecision::Settle);
    }
}

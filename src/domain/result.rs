use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Settled outcome of one signal after its game has resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementResult {
    pub id: Option<i64>,
    pub signal_id: i64,
    pub won: bool,
    pub pnl_usd: Decimal,
    pub settlement_price: Decimal,
    pub score_home: Option<i32>,
    pub score_away: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl SettlementResult {
    /// `pnl = (remaining_shares * settlement_price) + merge_recovery_usd - cost - fee_usd`.
    ///
    /// Uniform across single entries, DCA groups, bothside pairs and partially
    /// merged positions; no branching by position structure.
    pub fn compute(
        signal_id: i64,
        remaining_shares: Decimal,
        settlement_price: Decimal,
        merge_recovery_usd: Decimal,
        cost: Decimal,
        fee_usd: Decimal,
        score_home: Option<i32>,
        score_away: Option<i32>,
    ) -> Self {
        let pnl_usd =
            (remaining_shares * settlement_price) + merge_recovery_usd - cost - fee_usd;
        Self {
            id: None,
            signal_id,
            won: settlement_price == Decimal::ONE,
            pnl_usd,
            settlement_price,
            score_home,
            score_away,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn single_directional_win() {
        // 200 shares at 0.45 vwap, wins, no merge, no fee.
        let r = SettlementResult::compute(1, dec!(200), dec!(1.0), dec!(0), dec!(90), dec!(0), Some(101), Some(97));
        assert_eq!(r.pnl_usd, dec!(110));
        assert!(r.won);
    }

    #[test]
    fn losing_signal_has_negative_pnl_equal_to_cost() {
        let r = SettlementResult::compute(1, dec!(200), dec!(0.0), dec!(0), dec!(90), dec!(0), None, None);
        assert_eq!(r.pnl_usd, dec!(-90));
        assert!(!r.won);
    }
}

use crate::domain::vwap::{vwap, Fill};
use crate::market_client::WalletClass;
use rust_decimal::Decimal;

/// Both wallet classes support on-chain merges; the contract call shape
/// differs (direct EOA signature vs 1-of-1 proxy forward) but both settle.
pub fn supports_merge(wallet_class: WalletClass) -> bool {
    matches!(wallet_class, WalletClass::EoaWallet | WalletClass::ProxyWallet)
}

/// `min(dir_filled, hedge_filled)` — the number of shares that can be burned
/// against each other in one redeem call.
pub fn mergeable_shares(dir_filled: Decimal, hedge_filled: Decimal) -> Decimal {
    dir_filled.min(hedge_filled)
}

/// Sum of the two legs' cost-weighted mean prices, via the shared VWAP helper.
pub fn combined_vwap(dir_fills: &[Fill], hedge_fills: &[Fill]) -> Option<Decimal> {
    let dir_vwap = vwap(dir_fills)?;
    let hedge_vwap = vwap(hedge_fills)?;
    Some(dir_vwap + hedge_vwap)
}

/// `max(min_profit_usd / shares, est_gas_usd / shares)`, with `shares` floored
/// to avoid a division blow-up on tiny merge sizes.
pub fn min_margin(
    mergeable: Decimal,
    min_profit_usd: Decimal,
    est_gas_usd: Decimal,
    min_shares_floor: Decimal,
) -> Decimal {
    let denom = mergeable.max(min_shares_floor);
    (min_profit_usd / denom).max(est_gas_usd / denom)
}

#[derive(Debug, Clone, Copy)]
pub struct MergeGateResult {
    pub eligible: bool,
    pub recovery_per_share: Decimal,
    pub min_margin: Decimal,
}

/// Evaluates whether a merge should proceed: profitable net of the margin
/// floor, and the caller wallet supports the on-chain redeem call.
pub fn evaluate_merge_gate(
    combined_vwap: Decimal,
    mergeable: Decimal,
    min_profit_usd: Decimal,
    est_gas_usd: Decimal,
    min_shares_floor: Decimal,
    wallet_class: WalletClass,
) -> MergeGateResult {
    let margin = min_margin(mergeable, min_profit_usd, est_gas_usd, min_shares_floor);
    let recovery_per_share = Decimal::ONE - combined_vwap;
    let eligible =
        supports_merge(wallet_class) && (Decimal::ONE - combined_vwap - margin) > Decimal::ZERO;

    MergeGateResult {
        eligible,
        recovery_per_share,
        min_margin: margin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn mergeable_shares_takes_the_minimum() {
        assert_eq!(mergeable_shares(dec!(200), dec!(150)), dec!(150));
    }

    #[test]
    fn combined_vwap_sums_both_legs() {
        let dir = [Fill { price: dec!(0.45), shares: dec!(100) }];
        let hedge = [Fill { price: dec!(0.49), shares: dec!(100) }];
        assert_eq!(combined_vwap(&dir, &hedge), Some(dec!(0.94)));
    }

    #[test]
    fn bothside_merge_net_profit_scenario() {
        // 100 shares each leg, combined vwap 0.94 -> recovery 0.06/share = $6,
        // minus gas ~$0.50 leaves net profit, well above the margin floor.
        let dir = [Fill { price: dec!(0.45), shares: dec!(100) }];
        let hedge = [Fill { price: dec!(0.49), shares: dec!(100) }];
        let cvwap = combined_vwap(&dir, &hedge).unwrap();
        let mergeable = mergeable_shares(dec!(100), dec!(100));
        let gate = evaluate_merge_gate(cvwap, mergeable, dec!(2), dec!(0.5), dec!(1), WalletClass::EoaWallet);
        assert!(gate.eligible);
        assert_eq!(gate.recovery_per_share, dec!(0.06));
    }

    #[test]
    fn thin_margin_is_rejected() {
        let cvwap = dec!(0.99);
        let gate = evaluate_merge_gate(cvwap, dec!(50), dec!(2), dec!(0.5), dec!(1), WalletClass::EoaWallet);
        assert!(!gate.eligible);
    }
}

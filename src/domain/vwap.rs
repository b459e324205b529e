use rust_decimal::Decimal;

/// One (price, shares) fill used to compute a cost-weighted mean price.
#[derive(Debug, Clone, Copy)]
pub struct Fill {
    pub price: Decimal,
    pub shares: Decimal,
}

/// Cost-weighted mean price across a sequence of fills. Shared by signal-level
/// VWAP tracking and the merge strategy's combined-VWAP calculation — one
/// function, two call sites.
///
/// Returns `None` for an empty fill set (no shares, no price).
pub fn vwap(fills: &[Fill]) -> Option<Decimal> {
    let total_shares: Decimal = fills.iter().map(|f| f.shares).sum();
    if total_shares.is_zero() {
        return None;
    }
    let total_cost: Decimal = fills.iter().map(|f| f.price * f.shares).sum();
    Some(total_cost / total_shares)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn empty_fills_have_no_vwap() {
        assert_eq!(vwap(&[]), None);
    }

    #[test]
    fn single_fill_vwap_is_its_price() {
        let fills = [Fill {
            price: dec!(0.45),
            shares: dec!(100),
        }];
        assert_eq!(vwap(&fills), Some(dec!(0.45)));
    }

    #[test]
    fn vwap_round_trips_to_total_cost() {
        let fills = [
            Fill {
                price: dec!(0.40),
                shares: dec!(50),
            },
            Fill {
                price: dec!(0.50),
                shares: dec!(150),
            },
        ];
        let total_shares: Decimal = fills.iter().map(|f| f.shares).sum();
        let total_cost: Decimal = fills.iter().map(|f| f.price * f.shares).sum();
        let v = vwap(&fills).unwrap();
        assert_eq!(v * total_shares, total_cost);
    }
}

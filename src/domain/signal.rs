use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which leg of a bothside pair a signal was placed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalRole {
    Directional,
    Hedge,
}

impl SignalRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalRole::Directional => "directional",
            SignalRole::Hedge => "hedge",
        }
    }
}

impl fmt::Display for SignalRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for SignalRole {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "directional" => Ok(SignalRole::Directional),
            "hedge" => Ok(SignalRole::Hedge),
            _ => Err(format!("unknown signal_role: {s}")),
        }
    }
}

/// Lifecycle of a single placed order intent. Never regresses: placed→filled
/// is allowed, filled→placed is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Placed,
    Filled,
    PartiallyFilled,
    Cancelled,
    Expired,
    Paper,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Placed => "placed",
            OrderStatus::Filled => "filled",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Expired => "expired",
            OrderStatus::Paper => "paper",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Expired
                | OrderStatus::Paper
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Placed | OrderStatus::PartiallyFilled)
    }

    /// Monotonicity check: does `self -> target` ever count as a regression?
    pub fn regresses_to(&self, target: OrderStatus) -> bool {
        use OrderStatus::*;
        let rank = |s: OrderStatus| match s {
            Pending => 0,
            Placed => 1,
            PartiallyFilled => 2,
            Filled | Cancelled | Expired | Paper => 3,
        };
        rank(target) < rank(*self)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for OrderStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(OrderStatus::Pending),
            "placed" => Ok(OrderStatus::Placed),
            "filled" => Ok(OrderStatus::Filled),
            "partially_filled" => Ok(OrderStatus::PartiallyFilled),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "expired" => Ok(OrderStatus::Expired),
            "paper" => Ok(OrderStatus::Paper),
            _ => Err(format!("unknown order_status: {s}")),
        }
    }
}

/// One placed order intent: a single BUY limit order (or its paper-mode
/// equivalent) against an outcome token, possibly one entry of a DCA group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Option<i64>,
    pub job_id: i64,
    pub token_id: String,
    pub limit_price: Decimal,
    pub requested_usd: Decimal,
    pub shares: Decimal,
    pub vwap_to_date: Decimal,
    pub order_status: OrderStatus,
    pub order_placed_at: Option<DateTime<Utc>>,
    pub order_original_price: Decimal,
    pub order_replace_count: i32,
    pub exchange_order_id: Option<String>,
    pub fee_rate_bps: i32,
    pub fee_usd: Decimal,
    pub shares_merged: Decimal,
    pub merge_recovery_usd: Decimal,
    pub signal_role: SignalRole,
    pub dca_sequence: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(
        job_id: i64,
        token_id: String,
        limit_price: Decimal,
        requested_usd: Decimal,
        shares: Decimal,
        signal_role: SignalRole,
        dca_sequence: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            job_id,
            token_id,
            limit_price,
            requested_usd,
            shares,
            vwap_to_date: limit_price,
            order_status: OrderStatus::Pending,
            order_placed_at: None,
            order_original_price: limit_price,
            order_replace_count: 0,
            exchange_order_id: None,
            fee_rate_bps: 0,
            fee_usd: Decimal::ZERO,
            shares_merged: Decimal::ZERO,
            merge_recovery_usd: Decimal::ZERO,
            signal_role,
            dca_sequence,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn filled_shares(&self) -> Decimal {
        if self.order_status == OrderStatus::Filled || self.order_status == OrderStatus::Paper {
            self.shares
        } else {
            Decimal::ZERO
        }
    }

    pub fn remaining_shares(&self) -> Decimal {
        self.filled_shares() - self.shares_merged
    }

    pub fn cost(&self) -> Decimal {
        self.filled_shares() * self.vwap_to_date
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn new_signal_starts_pending_with_vwap_equal_to_limit() {
        let s = Signal::new(
            1,
            "tok".into(),
            dec!(0.45),
            dec!(50),
            dec!(111.11),
            SignalRole::Directional,
            1,
        );
        assert_eq!(s.order_status, OrderStatus::Pending);
        assert_eq!(s.vwap_to_date, dec!(0.45));
    }

    #[test]
    fn filled_to_placed_is_a_regression() {
        assert!(OrderStatus::Filled.regresses_to(OrderStatus::Placed));
        assert!(!OrderStatus::Placed.regresses_to(OrderStatus::Filled));
    }

    #[test]
    fn remaining_shares_subtracts_merged() {
        let mut s = Signal::new(
            1,
            "tok".into(),
            dec!(0.45),
            dec!(50),
            dec!(100),
            SignalRole::Hedge,
            1,
        );
        s.order_status = OrderStatus::Filled;
        s.shares_merged = dec!(30);
        assert_eq!(s.remaining_shares(), dec!(70));
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOpStatus {
    Simulated,
    Executed,
    Failed,
}

impl MergeOpStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeOpStatus::Simulated => "simulated",
            MergeOpStatus::Executed => "executed",
            MergeOpStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for MergeOpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for MergeOpStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "simulated" => Ok(MergeOpStatus::Simulated),
            "executed" => Ok(MergeOpStatus::Executed),
            "failed" => Ok(MergeOpStatus::Failed),
            _ => Err(format!("unknown merge_operation status: {s}")),
        }
    }
}

/// One on-chain (or simulated, in paper mode) redeem call that burns matched
/// YES/NO shares back into collateral.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOperation {
    pub id: Option<i64>,
    pub event_slug: String,
    pub shares_merged: Decimal,
    pub combined_vwap: Decimal,
    pub recovery_usd: Decimal,
    pub gas_cost_usd: Decimal,
    pub status: MergeOpStatus,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MergeOperation {
    pub fn new(
        event_slug: String,
        shares_merged: Decimal,
        combined_vwap: Decimal,
        status: MergeOpStatus,
    ) -> Self {
        let recovery_usd = shares_merged * (Decimal::ONE - combined_vwap);
        Self {
            id: None,
            event_slug,
            shares_merged,
            combined_vwap,
            recovery_usd,
            gas_cost_usd: Decimal::ZERO,
            status,
            tx_hash: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn recovery_usd_follows_merge_conservation() {
        let op = MergeOperation::new("nba-bos-mia-2026-01-01".into(), dec!(100), dec!(0.94), MergeOpStatus::Simulated);
        assert_eq!(op.recovery_usd, dec!(6.00));
    }
}

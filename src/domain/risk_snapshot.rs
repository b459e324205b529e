use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Circuit-breaker severity level. Ordered GREEN < YELLOW < ORANGE < RED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Green,
    Yellow,
    Orange,
    Red,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Green => "GREEN",
            RiskLevel::Yellow => "YELLOW",
            RiskLevel::Orange => "ORANGE",
            RiskLevel::Red => "RED",
        }
    }

    /// Sizing multiplier applied at this level.
    pub fn sizing_multiplier(&self) -> Decimal {
        match self {
            RiskLevel::Green => Decimal::ONE,
            RiskLevel::Yellow => Decimal::new(5, 1),
            RiskLevel::Orange | RiskLevel::Red => Decimal::ZERO,
        }
    }

    pub fn blocks_new_entries(&self) -> bool {
        !matches!(self, RiskLevel::Green)
    }

    pub fn settle_only(&self) -> bool {
        matches!(self, RiskLevel::Orange | RiskLevel::Red)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for RiskLevel {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_uppercase().as_str() {
            "GREEN" => Ok(RiskLevel::Green),
            "YELLOW" => Ok(RiskLevel::Yellow),
            "ORANGE" => Ok(RiskLevel::Orange),
            "RED" => Ok(RiskLevel::Red),
            _ => Err(format!("unknown risk level: {s}")),
        }
    }
}

/// One row of the risk time series. The most recent row is authoritative
/// state between ticks — never trust an in-process singleton across ticks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSnapshot {
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub level: RiskLevel,
    pub sizing_multiplier: Decimal,
    pub daily_pnl: Decimal,
    pub weekly_pnl: Decimal,
    pub consec_losses: i32,
    pub max_drawdown_pct: Decimal,
    pub drift_z_max: Decimal,
    /// Win rate over the last 5 settlements, gating ORANGE -> YELLOW recovery.
    pub recent_win_rate_5: Decimal,
    /// Consecutive trailing days with net positive PnL, gating YELLOW -> GREEN.
    pub consec_positive_days: i32,
    pub degraded_mode: bool,
    pub halted_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl RiskSnapshot {
    pub fn degraded() -> Self {
        Self {
            id: None,
            timestamp: Utc::now(),
            level: RiskLevel::Yellow,
            sizing_multiplier: Decimal::new(5, 1),
            daily_pnl: Decimal::ZERO,
            weekly_pnl: Decimal::ZERO,
            consec_losses: 0,
            max_drawdown_pct: Decimal::ZERO,
            drift_z_max: Decimal::ZERO,
            recent_win_rate_5: Decimal::ZERO,
            consec_positive_days: 0,
            degraded_mode: true,
            halted_at: None,
            acknowledged_at: None,
        }
    }
}

/// One level-transition event kept in a bounded ring buffer for diagnostics,
/// mirroring the capped circuit-breaker event log this engine's risk model
/// is generalized from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEvent {
    pub from: RiskLevel,
    pub to: RiskLevel,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

pub const RISK_EVENT_LOG_CAPACITY: usize = 100;

#[derive(Debug, Default)]
pub struct RiskEventLog {
    events: std::collections::VecDeque<RiskEvent>,
}

impl RiskEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: RiskEvent) {
        if self.events.len() >= RISK_EVENT_LOG_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn recent(&self) -> impl Iterator<Item = &RiskEvent> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_order_by_severity() {
        assert!(RiskLevel::Green < RiskLevel::Yellow);
        assert!(RiskLevel::Yellow < RiskLevel::Orange);
        assert!(RiskLevel::Orange < RiskLevel::Red);
    }

    #[test]
    fn event_log_caps_at_capacity() {
        let mut log = RiskEventLog::new();
        for i in 0..(RISK_EVENT_LOG_CAPACITY + 10) {
            log.push(RiskEvent {
                from: RiskLevel::Green,
                to: RiskLevel::Yellow,
                reason: format!("event {i}"),
                timestamp: Utc::now(),
            });
        }
        assert_eq!(log.recent().count(), RISK_EVENT_LOG_CAPACITY);
    }
}

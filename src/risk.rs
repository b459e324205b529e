use crate::config::RiskConfig;
use crate::domain::risk_snapshot::{RiskEvent, RiskEventLog, RiskLevel, RiskSnapshot};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

/// Raw inputs the level computation needs, gathered fresh each tick.
#[derive(Debug, Clone)]
pub struct RiskInputs {
    pub daily_pnl: Decimal,
    pub weekly_pnl: Decimal,
    pub drawdown_pct: Decimal,
    pub consec_losses: i32,
    pub drift_z_max: Decimal,
    /// Win rate over the last 5 settlements. Gates ORANGE -> YELLOW recovery.
    pub recent_win_rate_5: Decimal,
    /// Consecutive trailing days (most recent first) with net positive PnL.
    /// Gates YELLOW -> GREEN recovery.
    pub consec_positive_days: i32,
}

/// Computes and persists the circuit-breaker level across ticks. The
/// snapshot is the durable process-wide value; this struct only holds the
/// in-memory event log and dwell-time bookkeeping for one process lifetime,
/// restored from the latest persisted snapshot on cold start.
#[derive(Debug)]
pub struct RiskEngine {
    config: RiskConfig,
    current: RiskSnapshot,
    events: RiskEventLog,
    last_level_change_at: DateTime<Utc>,
    acknowledged_red: bool,
}

impl RiskEngine {
    /// Cold-start restore from the latest persisted snapshot, re-deriving
    /// bookkeeping rather than trusting in-process memory across restarts.
    pub fn restore(config: RiskConfig, last_snapshot: Option<RiskSnapshot>) -> Self {
        let current = last_snapshot.unwrap_or_else(|| RiskSnapshot {
            id: None,
            timestamp: Utc::now(),
            level: RiskLevel::Green,
            sizing_multiplier: Decimal::ONE,
            daily_pnl: Decimal::ZERO,
            weekly_pnl: Decimal::ZERO,
            consec_losses: 0,
            max_drawdown_pct: Decimal::ZERO,
            drift_z_max: Decimal::ZERO,
            recent_win_rate_5: Decimal::ZERO,
            consec_positive_days: 0,
            degraded_mode: false,
            halted_at: None,
            acknowledged_at: None,
        });
        let last_level_change_at = current.halted_at.unwrap_or(current.timestamp);
        let acknowledged_red = current.acknowledged_at.is_some();
        Self {
            config,
            current,
            events: RiskEventLog::new(),
            last_level_change_at,
            acknowledged_red,
        }
    }

    pub fn current_level(&self) -> RiskLevel {
        self.current.level
    }

    pub fn current_snapshot(&self) -> &RiskSnapshot {
        &self.current
    }

    pub fn events(&self) -> impl Iterator<Item = &RiskEvent> {
        self.events.recent()
    }

    /// Mark the current RED halt as acknowledged by an operator, required
    /// before the 72h dwell gate can let the level recover to ORANGE.
    pub fn acknowledge(&mut self) {
        self.acknowledged_red = true;
        self.current.acknowledged_at = Some(Utc::now());
    }

    /// Recompute the level from fresh inputs, respecting recovery hysteresis:
    /// entering a more severe level is immediate; recovering requires the
    /// configured dwell time and, for RED, an acknowledgement.
    #[instrument(skip(self, inputs))]
    pub fn recompute(&mut self, inputs: RiskInputs, now: DateTime<Utc>) -> &RiskSnapshot {
        let target = self.target_level(&inputs);
        let previous = self.current.level;

        // Escalation to a more severe level is immediate and may jump
        // straight to the target. Recovery steps down one level at a time,
        // each gated by its own dwell time, even if the underlying inputs
        // would already justify a full jump to GREEN.
        let next_level = if target > previous {
            target
        } else if target < previous {
            let step_down = less_severe(previous);
            if self.recovery_permitted(previous, step_down, &inputs, now) {
                step_down
            } else {
                previous
            }
        } else {
            previous
        };

        if next_level != previous {
            self.events.push(RiskEvent {
                from: previous,
                to: next_level,
                reason: format!("level computed as {target}, applied {next_level}"),
                timestamp: now,
            });
            self.last_level_change_at = now;
            if next_level == RiskLevel::Red {
                self.acknowledged_red = false;
            }
            warn!(from = %previous, to = %next_level, "risk level transition");
        }

        self.current = RiskSnapshot {
            id: None,
            timestamp: now,
            level: next_level,
            sizing_multiplier: next_level.sizing_multiplier(),
            daily_pnl: inputs.daily_pnl,
            weekly_pnl: inputs.weekly_pnl,
            consec_losses: inputs.consec_losses,
            max_drawdown_pct: inputs.drawdown_pct,
            drift_z_max: inputs.drift_z_max,
            recent_win_rate_5: inputs.recent_win_rate_5,
            consec_positive_days: inputs.consec_positive_days,
            degraded_mode: false,
            halted_at: if next_level == RiskLevel::Red {
                Some(self.last_level_change_at)
            } else {
                None
            },
            acknowledged_at: self.current.acknowledged_at,
        };

        info!(level = %self.current.level, multiplier = %self.current.sizing_multiplier, "risk snapshot computed");
        &self.current
    }

    /// Risk computation failed (DB error, drift calc exception): fall back to
    /// a safe, never-unsafe default rather than propagating the failure.
    pub fn degrade(&mut self, now: DateTime<Utc>) -> &RiskSnapshot {
        warn!("risk computation failed; entering degraded mode");
        self.current = RiskSnapshot {
            degraded_mode: true,
            timestamp: now,
            ..RiskSnapshot::degraded()
        };
        &self.current
    }

    fn target_level(&self, inputs: &RiskInputs) -> RiskLevel {
        let cfg = &self.config;
        let weekly_limit = cfg.bankroll_usd * (cfg.weekly_loss_limit_pct / Decimal::from(100));
        let daily_limit = cfg.bankroll_usd * (cfg.daily_loss_limit_pct / Decimal::from(100));

        if -inputs.weekly_pnl >= weekly_limit || inputs.drawdown_pct >= cfg.max_drawdown_limit_pct
        {
            return RiskLevel::Red;
        }
        if -inputs.daily_pnl >= daily_limit || inputs.drift_z_max > cfg.drift_threshold_sigma {
            return RiskLevel::Orange;
        }
        if inputs.consec_losses >= 5 || -inputs.daily_pnl >= daily_limit / Decimal::from(2) {
            return RiskLevel::Yellow;
        }
        RiskLevel::Green
    }

    fn recovery_permitted(
        &self,
        from: RiskLevel,
        to: RiskLevel,
        inputs: &RiskInputs,
        now: DateTime<Utc>,
    ) -> bool {
        let elapsed = now - self.last_level_change_at;
        match (from, to) {
            (RiskLevel::Red, RiskLevel::Orange) => {
                self.acknowledged_red && elapsed >= Duration::hours(72)
            }
            (RiskLevel::Orange, RiskLevel::Yellow) => {
                elapsed >= Duration::hours(24) && inputs.recent_win_rate_5 >= Decimal::new(60, 2)
            }
            (RiskLevel::Yellow, RiskLevel::Green) => inputs.consec_positive_days >= 3,
            // No skipping a level on recovery: RED can only step down to ORANGE,
            // never straight to YELLOW or GREEN in one recompute.
            _ => false,
        }
    }
}

fn less_severe(level: RiskLevel) -> RiskLevel {
    match level {
        RiskLevel::Red => RiskLevel::Orange,
        RiskLevel::Orange => RiskLevel::Yellow,
        RiskLevel::Yellow => RiskLevel::Green,
        RiskLevel::Green => RiskLevel::Green,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> RiskConfig {
        RiskConfig {
            daily_loss_limit_pct: Decimal::from(3),
            weekly_loss_limit_pct: Decimal::from(5),
            max_drawdown_limit_pct: Decimal::from(15),
            drift_threshold_sigma: Decimal::from(2),
            bankroll_usd: Decimal::from(10_000),
            max_game_exposure_usd: Decimal::from(100),
            max_total_exposure_usd: Decimal::from(1000),
            max_orders_per_tick: 3,
            max_daily_positions: 10,
        }
    }

    fn green_inputs() -> RiskInputs {
        RiskInputs {
            daily_pnl: Decimal::ZERO,
            weekly_pnl: Decimal::ZERO,
            drawdown_pct: Decimal::ZERO,
            consec_losses: 0,
            drift_z_max: Decimal::ZERO,
            recent_win_rate_5: Decimal::new(60, 2),
            consec_positive_days: 3,
        }
    }

    #[test]
    fn cold_start_without_snapshot_defaults_to_green() {
        let engine = RiskEngine::restore(cfg(), None);
        assert_eq!(engine.current_level(), RiskLevel::Green);
    }

    #[test]
    fn escalation_to_red_on_weekly_loss_is_immediate() {
        let mut engine = RiskEngine::restore(cfg(), None);
        let now = Utc::now();
        let mut inputs = green_inputs();
        inputs.weekly_pnl = Decimal::from(-600); // 6% of 10k > 5% limit
        engine.recompute(inputs, now);
        assert_eq!(engine.current_level(), RiskLevel::Red);
    }

    #[test]
    fn red_does_not_recover_without_acknowledgement_and_dwell() {
        let mut engine = RiskEngine::restore(cfg(), None);
        let now = Utc::now();
        let mut inputs = green_inputs();
        inputs.weekly_pnl = Decimal::from(-600);
        engine.recompute(inputs.clone(), now);
        assert_eq!(engine.current_level(), RiskLevel::Red);

        // 73 hours later, still unacknowledged: must stay RED.
        let later = now + Duration::hours(73);
        engine.recompute(green_inputs(), later);
        assert_eq!(engine.current_level(), RiskLevel::Red);

        engine.acknowledge();
        engine.recompute(green_inputs(), later);
        assert_eq!(engine.current_level(), RiskLevel::Orange);
    }

    #[test]
    fn full_recovery_path_requires_every_dwell_gate() {
        let mut engine = RiskEngine::restore(cfg(), None);
        let t0 = Utc::now();
        let mut inputs = green_inputs();
        inputs.weekly_pnl = Decimal::from(-600);
        engine.recompute(inputs, t0);
        engine.acknowledge();

        let t1 = t0 + Duration::hours(73);
        engine.recompute(green_inputs(), t1);
        assert_eq!(engine.current_level(), RiskLevel::Orange);

        // Not enough time for ORANGE -> YELLOW yet.
        let t2 = t1 + Duration::hours(1);
        engine.recompute(green_inputs(), t2);
        assert_eq!(engine.current_level(), RiskLevel::Orange);

        let t3 = t1 + Duration::hours(25);
        engine.recompute(green_inputs(), t3);
        assert_eq!(engine.current_level(), RiskLevel::Yellow);

        let t4 = t3 + Duration::days(4);
        engine.recompute(green_inputs(), t4);
        assert_eq!(engine.current_level(), RiskLevel::Green);
    }

    #[test]
    fn orange_to_yellow_blocked_by_low_win_rate_despite_dwell() {
        let mut engine = RiskEngine::restore(cfg(), None);
        let t0 = Utc::now();
        let mut inputs = green_inputs();
        inputs.weekly_pnl = Decimal::from(-600);
        engine.recompute(inputs, t0);
        engine.acknowledge();

        let t1 = t0 + Duration::hours(73);
        engine.recompute(green_inputs(), t1);
        assert_eq!(engine.current_level(), RiskLevel::Orange);

        // Dwell time satisfied, but the last-5 win rate is below 60%.
        let t2 = t1 + Duration::hours(25);
        let mut low_win_rate = green_inputs();
        low_win_rate.recent_win_rate_5 = Decimal::new(40, 2);
        engine.recompute(low_win_rate, t2);
        assert_eq!(engine.current_level(), RiskLevel::Orange);
    }

    #[test]
    fn yellow_to_green_requires_consecutive_positive_days_not_just_time() {
        let mut engine = RiskEngine::restore(cfg(), None);
        let t0 = Utc::now();
        let mut inputs = green_inputs();
        inputs.weekly_pnl = Decimal::from(-600);
        engine.recompute(inputs, t0);
        engine.acknowledge();

        let t1 = t0 + Duration::hours(73);
        engine.recompute(green_inputs(), t1);
        let t2 = t1 + Duration::hours(25);
        engine.recompute(green_inputs(), t2);
        assert_eq!(engine.current_level(), RiskLevel::Yellow);

        // Plenty of elapsed time, but fewer than 3 consecutive positive days.
        let t3 = t2 + Duration::days(10);
        let mut short_streak = green_inputs();
        short_streak.consec_positive_days = 1;
        engine.recompute(short_streak, t3);
        assert_eq!(engine.current_level(), RiskLevel::Yellow);
    }

    #[test]
    fn degraded_mode_returns_yellow_half_multiplier() {
        let mut engine = RiskEngine::restore(cfg(), None);
        let snap = engine.degrade(Utc::now());
        assert_eq!(snap.level, RiskLevel::Yellow);
        assert_eq!(snap.sizing_multiplier, Decimal::new(5, 1));
        assert!(snap.degraded_mode);
    }
}

use crate::adapters::Store;
use crate::calibration::CalibrationArtifact;
use crate::config::AppConfig;
use crate::domain::job::{JobStatus, LegSide, MergeStatus, TradeJob};
use crate::domain::risk_snapshot::RiskLevel;
use crate::error::{EngineError, Result};
use crate::domain::order_event::OrderEvent;
use crate::domain::vwap::{vwap, Fill};
use crate::executors::{dca, directional, hedge, merge, ExecutorContext};
use crate::market_client::{event_slug, EventOutcome, GameDiscovery, GameStatus, MarketClient};
use crate::mode::ExecutionMode;
use crate::notify::{Notification, Notifier, Severity};
use crate::order_manager::{self, OrderAction, OrderManagerConfig};
use crate::risk::{RiskEngine, RiskInputs};
use crate::settlement::{is_settleable, settle_signal, warn_postponed, SettlementDecision};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// One tick's outcome, surfaced to the CLI and logs.
#[derive(Debug, Clone, Default)]
pub struct TickSummary {
    pub games_discovered: usize,
    pub jobs_dispatched: usize,
    pub orders_placed: u32,
    pub merges_executed: usize,
    pub signals_settled: usize,
    pub risk_level: Option<RiskLevel>,
}

/// Orchestrates one tick end to end: discovery, dispatch, merge, settlement,
/// and risk bookkeeping. Holds the long-lived collaborators; per-tick state
/// (the order quota counter) lives in a fresh `ExecutorContext` each call.
pub struct Scheduler {
    store: Arc<Store>,
    market: Arc<dyn MarketClient>,
    discovery: Arc<dyn GameDiscovery>,
    notifier: Arc<dyn Notifier>,
    config: AppConfig,
    mode: ExecutionMode,
    risk: RiskEngine,
    artifact: CalibrationArtifact,
}

impl Scheduler {
    pub async fn new(
        store: Arc<Store>,
        market: Arc<dyn MarketClient>,
        discovery: Arc<dyn GameDiscovery>,
        notifier: Arc<dyn Notifier>,
        config: AppConfig,
        mode: ExecutionMode,
        artifact: CalibrationArtifact,
    ) -> Result<Self> {
        let last_snapshot = store.latest_risk_snapshot().await?;
        let risk = RiskEngine::restore(config.risk.clone(), last_snapshot);
        Ok(Self { store, market, discovery, notifier, config, mode, risk, artifact })
    }

    /// Runs one full tick. `settle` gates the settlement phase so `tick
    /// --no-settle` can dispatch/merge without resolving games.
    #[instrument(skip(self))]
    pub async fn tick(&mut self, now: DateTime<Utc>, settle: bool) -> Result<TickSummary> {
        let _lock = TickLock::acquire(&self.config.execution.lock_dir)?;
        let mut summary = TickSummary::default();

        let games = self.discovery.get_games(now).await.unwrap_or_else(|e| {
            warn!(error = %e, "game discovery failed, continuing with no new games");
            Vec::new()
        });
        summary.games_discovered = games.len();
        for game in &games {
            if let Err(e) = self.ensure_job_for_game(game, now).await {
                warn!(error = %e, "failed to create job for discovered game");
            }
        }

        self.expire_stale_jobs(now).await?;

        let risk_level = self.recompute_risk(now).await;
        summary.risk_level = Some(risk_level);

        let risk_multiplier = self.risk.current_snapshot().sizing_multiplier;
        let blocks_entries = risk_level.blocks_new_entries();

        let ctx = ExecutorContext {
            store: Arc::clone(&self.store),
            market: Arc::clone(&self.market),
            config: self.config.clone(),
            mode: self.mode,
            risk_multiplier,
            orders_placed_this_tick: AtomicU32::new(0),
        };

        let dispatchable = self
            .store
            .list_dispatchable_jobs(&[JobStatus::Pending, JobStatus::DcaActive])
            .await?;

        for job in &dispatchable {
            if job.is_expired(now) {
                continue;
            }
            let dispatched = match (job.leg_side, job.status) {
                (LegSide::Directional, JobStatus::Pending) => {
                    if blocks_entries {
                        false
                    } else {
                        directional::run(&ctx, &self.artifact, job, now).await.is_ok()
                    }
                }
                (LegSide::Hedge, JobStatus::Pending) => hedge::run(&ctx, job, now).await.is_ok(),
                (_, JobStatus::DcaActive) => {
                    if blocks_entries {
                        false
                    } else {
                        dca::run(&ctx, job, now).await.is_ok()
                    }
                }
                _ => false,
            };
            if dispatched {
                summary.jobs_dispatched += 1;
            }
        }

        self.run_order_maintenance(&ctx, now).await?;

        if self.config.dca.merge_enabled {
            summary.merges_executed = self.run_merges(&ctx).await?;
        }

        if settle {
            summary.signals_settled = self.settle_finished_games(&games).await?;
        }

        summary.orders_placed = ctx.orders_placed_this_tick.into_inner();
        self.store.insert_risk_snapshot(self.risk.current_snapshot()).await?;

        if risk_level == RiskLevel::Red && !self.risk_acknowledged() {
            self.notifier.notify(Notification {
                title: "risk halt".to_string(),
                body: format!("risk level is RED as of {now}; new entries are blocked"),
                severity: Severity::Critical,
            });
        }

        info!(
            games = summary.games_discovered,
            dispatched = summary.jobs_dispatched,
            orders = summary.orders_placed,
            merges = summary.merges_executed,
            settled = summary.signals_settled,
            risk_level = %risk_level,
            "tick complete"
        );

        Ok(summary)
    }

    fn risk_acknowledged(&self) -> bool {
        self.risk.current_snapshot().acknowledged_at.is_some()
    }

    /// One directional job per discovered game, picking the cheaper ("favorite")
    /// of the two outcomes as the entry side. The other side only ever appears
    /// as the later-queued hedge leg.
    async fn ensure_job_for_game(&self, game: &crate::market_client::DiscoveredGame, now: DateTime<Utc>) -> Result<()> {
        if matches!(game.status, GameStatus::Final | GameStatus::Postponed) {
            return Ok(());
        }
        let tipoff_date = game.tipoff_utc.date_naive();
        let slug = event_slug(&game.away_abbr, &game.home_abbr, tipoff_date);

        if !self.store.list_jobs_by_event_slug(&slug).await?.is_empty() {
            return Ok(());
        }

        let events = self.market.get_events(now).await?;
        let Some(event) = events.into_iter().find(|e| e.event_slug == slug) else {
            return Ok(());
        };
        if event.outcomes.len() != 2 {
            return Ok(());
        }

        let mut best: Option<(EventOutcome, Decimal)> = None;
        for outcome in &event.outcomes {
            if let Ok(quote) = self.market.get_price(&outcome.token_id).await {
                let is_better = match &best {
                    Some((_, best_ask)) => quote.best_ask < *best_ask,
                    None => true,
                };
                if is_better {
                    best = Some((outcome.clone(), quote.best_ask));
                }
            }
        }
        let Some((directional_outcome, _)) = best else { return Ok(()) };
        let hedge_outcome = event
            .outcomes
            .iter()
            .find(|o| o.token_id != directional_outcome.token_id)
            .expect("exactly two outcomes, checked above");
        let directional_is_home = directional_outcome.name.eq_ignore_ascii_case(&game.home_abbr);

        let job = TradeJob::new_directional(
            slug,
            game.away_abbr.clone(),
            game.home_abbr.clone(),
            game.tipoff_utc,
            now,
            game.tipoff_utc,
            directional_outcome.token_id,
            Uuid::new_v4().to_string(),
            directional_is_home,
            hedge_outcome.token_id.clone(),
        );
        self.store.insert_job(&job).await?;
        Ok(())
    }

    async fn expire_stale_jobs(&self, now: DateTime<Utc>) -> Result<()> {
        for job in self.store.list_expired_candidates(now).await? {
            if let Some(id) = job.id {
                self.store.update_job_status(id, JobStatus::Expired).await?;
            }
        }
        Ok(())
    }

    /// TTL/reprice maintenance for already-placed orders: fetches a fresh
    /// quote per active signal and lets `order_manager::evaluate` decide
    /// whether to keep, reprice, or cancel-and-expire it.
    async fn run_order_maintenance(&self, ctx: &ExecutorContext, now: DateTime<Utc>) -> Result<()> {
        let cfg = OrderManagerConfig {
            order_ttl_min: self.config.execution.order_ttl_min as i64,
            order_max_replaces: self.config.execution.order_max_replaces as i32,
            check_batch_size: self.config.execution.check_batch_size as usize,
        };

        let signals = self.store.list_active_signals(cfg.check_batch_size as i64).await?;
        for signal in signals {
            let Some(signal_id) = signal.id else { continue };
            let Some(job) = self.store.get_job(signal.job_id).await? else { continue };

            let quote = match self.market.get_price(&signal.token_id).await {
                Ok(q) => q,
                Err(e) => {
                    warn!(signal_id, error = %e, "order maintenance: quote fetch failed, skipping");
                    continue;
                }
            };

            let (is_hedge, dir_vwap, min_margin) = if job.leg_side == LegSide::Hedge {
                self.hedge_margin_inputs(&job).await?
            } else {
                (false, Decimal::ZERO, Decimal::ZERO)
            };

            let action = order_manager::evaluate(
                &signal, &cfg, now, job.tipoff_utc, quote.best_ask, is_hedge, dir_vwap, min_margin,
            );

            match action {
                OrderAction::Keep | OrderAction::Filled => {}
                OrderAction::CancelExpire => {
                    if let Some(order_id) = &signal.exchange_order_id {
                        if ctx.mode == ExecutionMode::Live {
                            let _ = self.market.cancel_order(order_id).await;
                        }
                    }
                    self.store.expire_signal(signal_id).await?;
                    let event = OrderEvent::expired(signal_id, signal.order_original_price);
                    self.store.insert_order_event(&event).await?;
                }
                OrderAction::Reprice { new_price } => {
                    let new_order_id = if ctx.mode == ExecutionMode::Live {
                        match &signal.exchange_order_id {
                            Some(old_id) => {
                                match self.market.cancel_and_replace(old_id, new_price, signal.requested_usd).await {
                                    Ok(id) => id,
                                    Err(e) => {
                                        warn!(signal_id, error = %e, "reprice failed, keeping old order");
                                        continue;
                                    }
                                }
                            }
                            None => continue,
                        }
                    } else {
                        format!("paper-{signal_id}-{}", signal.order_replace_count + 1)
                    };
                    self.store
                        .replace_signal_price(signal_id, new_price, &new_order_id)
                        .await?;
                    let event = OrderEvent::replaced(signal_id, signal.order_original_price, new_price);
                    self.store.insert_order_event(&event).await?;
                }
            }
        }
        Ok(())
    }

    /// For a hedge job's signal: the sibling directional leg's fill VWAP and
    /// the minimum per-share margin, used to keep a reprice from violating
    /// the pair's merge economics.
    async fn hedge_margin_inputs(&self, hedge_job: &TradeJob) -> Result<(bool, Decimal, Decimal)> {
        let siblings = self.store.list_jobs_by_event_slug(&hedge_job.event_slug).await?;
        let Some(dir_job) = siblings.into_iter().find(|j| j.leg_side == LegSide::Directional) else {
            return Ok((true, Decimal::ZERO, Decimal::ZERO));
        };
        let Some(dir_job_id) = dir_job.id else {
            return Ok((true, Decimal::ZERO, Decimal::ZERO));
        };
        let dir_signals = self.store.list_signals_for_job(dir_job_id).await?;
        let fills: Vec<Fill> = dir_signals
            .iter()
            .filter(|s| s.order_status.is_terminal() && s.filled_shares() > Decimal::ZERO)
            .map(|s| Fill { price: s.vwap_to_date, shares: s.filled_shares() })
            .collect();
        let dir_vwap = vwap(&fills).unwrap_or(Decimal::ZERO);
        let margin = crate::merge_strategy::min_margin(
            fills.iter().map(|f| f.shares).sum(),
            self.config.execution.min_profit_usd,
            self.config.execution.est_gas_usd,
            self.config.execution.min_shares_floor,
        );
        Ok((true, dir_vwap, margin))
    }

    async fn recompute_risk(&mut self, now: DateTime<Utc>) -> RiskLevel {
        match self.gather_risk_inputs(now).await {
            Ok(inputs) => self.risk.recompute(inputs, now).level,
            Err(e) => {
                warn!(error = %e, "risk input gathering failed, entering degraded mode");
                self.risk.degrade(now).level
            }
        }
    }

    async fn gather_risk_inputs(&self, now: DateTime<Utc>) -> Result<RiskInputs> {
        let day_start = now - Duration::hours(24);
        let week_start = now - Duration::days(7);
        let daily_pnl = self.store.sum_pnl_since(day_start).await?;
        let weekly_pnl = self.store.sum_pnl_since(week_start).await?;

        let recent = self.store.recent_results(30).await?;
        let consec_losses = recent.iter().take_while(|r| r.pnl_usd < Decimal::ZERO).count() as i32;

        let bankroll = self.config.risk.bankroll_usd;
        let mut peak = bankroll;
        let mut running = bankroll;
        let mut max_drawdown_pct = Decimal::ZERO;
        for r in recent.iter().rev() {
            running += r.pnl_usd;
            peak = peak.max(running);
            if peak > Decimal::ZERO {
                let dd = (peak - running) / peak;
                max_drawdown_pct = max_drawdown_pct.max(dd);
            }
        }

        let recent_win_rate_5 = if recent.len() >= 5 {
            let wins = recent.iter().take(5).filter(|r| r.won).count();
            Decimal::from(wins) / Decimal::from(5)
        } else {
            Decimal::ZERO
        };
        let consec_positive_days = consecutive_positive_days(&recent);

        Ok(RiskInputs {
            daily_pnl,
            weekly_pnl,
            drawdown_pct: max_drawdown_pct * Decimal::from(100),
            consec_losses,
            drift_z_max: Decimal::ZERO,
            recent_win_rate_5,
            consec_positive_days,
        })
    }

    async fn run_merges(&self, ctx: &ExecutorContext) -> Result<usize> {
        let candidates = self
            .store
            .list_dispatchable_jobs(&[JobStatus::Executed, JobStatus::DcaActive])
            .await?;
        let mut executed = 0;
        let mut seen_groups = std::collections::HashSet::new();

        for job in &candidates {
            if job.merge_status != MergeStatus::None {
                continue;
            }
            let Some(group_id) = job.bothside_group_id.clone() else { continue };
            if !seen_groups.insert(group_id.clone()) {
                continue;
            }
            let pair: Vec<&TradeJob> = candidates
                .iter()
                .filter(|j| j.bothside_group_id.as_deref() == Some(group_id.as_str()))
                .collect();
            let (Some(dir), Some(hedge_job)) = (
                pair.iter().find(|j| j.leg_side == LegSide::Directional),
                pair.iter().find(|j| j.leg_side == LegSide::Hedge),
            ) else {
                continue;
            };
            if let Ok(merge::MergeOutcome::Executed) = merge::run(ctx, dir, hedge_job).await {
                executed += 1;
            }
        }
        Ok(executed)
    }

    async fn settle_finished_games(&self, games: &[crate::market_client::DiscoveredGame]) -> Result<usize> {
        let mut settled = 0;
        for game in games {
            let decision = is_settleable(game.status, true);
            match decision {
                SettlementDecision::Skip => {
                    let tipoff_date = game.tipoff_utc.date_naive();
                    let slug = event_slug(&game.away_abbr, &game.home_abbr, tipoff_date);
                    warn_postponed(&slug);
                    continue;
                }
                SettlementDecision::NotYet => continue,
                SettlementDecision::Settle => {}
            }
            let Some(home_score) = game.home_score else { continue };
            let Some(away_score) = game.away_score else { continue };
            let home_won = home_score > away_score;

            let tipoff_date = game.tipoff_utc.date_naive();
            let slug = event_slug(&game.away_abbr, &game.home_abbr, tipoff_date);
            let jobs = self.store.list_jobs_by_event_slug(&slug).await?;
            for job in jobs {
                let Some(job_id) = job.id else { continue };
                let directional_won = if job.directional_is_home { home_won } else { !home_won };
                let winner_won = match job.leg_side {
                    LegSide::Directional => directional_won,
                    LegSide::Hedge => !directional_won,
                };
                for signal in self.store.list_signals_for_job(job_id).await? {
                    let Some(signal_id) = signal.id else { continue };
                    if self.store.get_result_for_signal(signal_id).await?.is_some() {
                        continue;
                    }
                    let result = settle_signal(&signal, winner_won, Some(home_score), Some(away_score));
                    self.store.insert_result(&result).await?;
                    settled += 1;
                }
            }
        }
        Ok(settled)
    }
}

/// Counts the leading streak of trailing days (most recent first) whose net
/// PnL across all settlements that day is positive. Stops at the first day
/// with zero or negative net PnL, or when `results` runs out.
fn consecutive_positive_days(results: &[crate::domain::result::SettlementResult]) -> i32 {
    let mut by_day: std::collections::BTreeMap<chrono::NaiveDate, Decimal> = std::collections::BTreeMap::new();
    for r in results {
        *by_day.entry(r.created_at.date_naive()).or_insert(Decimal::ZERO) += r.pnl_usd;
    }
    let mut streak = 0;
    for (_, pnl) in by_day.iter().rev() {
        if *pnl > Decimal::ZERO {
            streak += 1;
        } else {
            break;
        }
    }
    streak
}

/// Cooperative lock via atomic directory creation, guarding against two
/// processes running a tick concurrently against the same lock directory.
struct TickLock {
    path: String,
}

impl TickLock {
    fn acquire(lock_dir: &str) -> Result<Self> {
        std::fs::create_dir(lock_dir).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                EngineError::Internal(format!("tick already running (lock held at {lock_dir})"))
            } else {
                EngineError::Io(e)
            }
        })?;
        Ok(Self { path: lock_dir.to_string() })
    }
}

impl Drop for TickLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir(&self.path);
    }
}

use super::ExecutorContext;
use crate::calibration::{estimate, CalibrationArtifact};
use crate::domain::job::{JobStatus, TradeJob};
use crate::domain::signal::{OrderStatus, Signal, SignalRole};
use crate::error::Result;
use crate::market_client::PriceQuote;
use crate::mode::ExecutionMode;
use crate::sizing::{size_entry, LiquiditySnapshot, SizingInputs, SizingOutcome};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionalOutcome {
    Executed,
    DcaActive,
    Skipped,
    Failed,
    NotClaimed,
}

/// Runs the directional (initial entry) executor for one job. The job is
/// claimed (`pending -> executing`) via row-level CAS before any side
/// effects; a lost race leaves the job untouched for another tick.
#[instrument(skip(ctx, artifact, job))]
pub async fn run(
    ctx: &ExecutorContext,
    artifact: &CalibrationArtifact,
    job: &TradeJob,
    now: DateTime<Utc>,
) -> Result<DirectionalOutcome> {
    let job_id = job.id.expect("persisted job has an id");

    if job.status != JobStatus::Pending || !job.within_window(now) || !ctx.quota_remaining() {
        return Ok(DirectionalOutcome::NotClaimed);
    }

    if !ctx.store.claim_job(job_id).await? {
        return Ok(DirectionalOutcome::NotClaimed);
    }

    let quote = ctx.market.get_price(&job.token_id).await?;
    let book = ctx.market.get_order_book(&job.token_id).await?;
    let liquidity = LiquiditySnapshot {
        best_bid: quote.best_bid,
        best_ask: quote.best_ask,
        ask_depth_5c_usd: book.ask_depth_5c_usd(),
    };

    if liquidity.spread_pct() > ctx.config.sizing.max_spread_pct {
        ctx.store.update_job_status(job_id, JobStatus::Skipped).await?;
        warn!(job_id, "directional skipped: spread too wide");
        return Ok(DirectionalOutcome::Skipped);
    }

    let (win_rate, _band) = estimate(
        artifact,
        liquidity.best_ask,
        ctx.config.sizing.calibration_confidence_level,
    )?;

    let preflight = run_preflight(ctx, job).await?;
    if let Err(reason) = preflight {
        ctx.store.update_job_status(job_id, JobStatus::Failed).await?;
        ctx.store.increment_retry_count(job_id).await?;
        warn!(job_id, reason, "directional failed preflight");
        return Ok(DirectionalOutcome::Failed);
    }

    let inputs = SizingInputs {
        bankroll: ctx.config.risk.bankroll_usd,
        point_estimate: win_rate.point_estimate,
        lower_bound_win_rate: win_rate.lower_bound,
        fractional_kelly: ctx.config.sizing.fractional_kelly,
        capital_risk_pct: ctx.config.sizing.capital_risk_pct,
        max_position_usd: ctx.config.sizing.max_position_usd,
        liquidity_fill_pct: ctx.config.sizing.liquidity_fill_pct,
        max_spread_pct: ctx.config.sizing.max_spread_pct,
        risk_engine_multiplier: ctx.risk_multiplier,
    };

    let size_usd = match size_entry(&inputs, &liquidity) {
        SizingOutcome::Approve { size_usd } => size_usd,
        SizingOutcome::Reject { reason, details } => {
            ctx.store.update_job_status(job_id, JobStatus::Skipped).await?;
            info!(job_id, reason, details, "directional sized to zero, skipping");
            return Ok(DirectionalOutcome::Skipped);
        }
    };

    maybe_queue_hedge(ctx, artifact, job, &quote, win_rate.point_estimate, now).await?;

    let limit_price = liquidity.best_ask - Decimal::new(1, 2);
    let dca_enabled = ctx.config.dca.dca_max_entries > 1;
    let budget = size_usd;
    let max_entries = ctx.config.dca.dca_max_entries.max(1);
    let first_slice = budget / Decimal::from(max_entries);
    let shares = if limit_price.is_zero() {
        Decimal::ZERO
    } else {
        first_slice / limit_price
    };

    let (order_status, exchange_order_id) = if ctx.mode == ExecutionMode::Live {
        let order_id = ctx
            .market
            .place_limit_buy(&job.token_id, limit_price, first_slice)
            .await?;
        info!(job_id, order_id, "placed directional limit order");
        (OrderStatus::Placed, Some(order_id))
    } else {
        (OrderStatus::Paper, None)
    };

    let mut signal = Signal::new(
        job_id,
        job.token_id.clone(),
        limit_price,
        first_slice,
        shares,
        SignalRole::Directional,
        1,
    );
    signal.order_status = order_status;
    signal.order_placed_at = Some(now);
    signal.order_original_price = limit_price;
    signal.exchange_order_id = exchange_order_id;
    ctx.store.insert_signal(&signal).await?;
    ctx.record_order_placed();

    let next_status = if dca_enabled {
        JobStatus::DcaActive
    } else {
        JobStatus::Executed
    };
    ctx.store.update_job_status(job_id, next_status).await?;

    Ok(if dca_enabled {
        DirectionalOutcome::DcaActive
    } else {
        DirectionalOutcome::Executed
    })
}

/// Daily position count, daily USD exposure, per-game exposure cap, total
/// exposure cap. Returns `Err(reason)` on the first failing check.
async fn run_preflight(ctx: &ExecutorContext, job: &TradeJob) -> Result<std::result::Result<(), String>> {
    let existing = ctx.store.list_signals_for_job(job.id.expect("persisted")).await?;
    let game_exposure: Decimal = existing.iter().map(|s| s.requested_usd).sum();
    if game_exposure >= ctx.config.risk.max_game_exposure_usd {
        return Ok(Err("per_game_exposure_cap".to_string()));
    }

    let day_start = Utc::now() - Duration::hours(24);
    let daily_positions = ctx.store.count_directional_jobs_since(day_start).await?;
    if daily_positions >= ctx.config.risk.max_daily_positions as i64 {
        return Ok(Err("max_daily_positions".to_string()));
    }

    let total_exposure = ctx.store.total_open_exposure_usd().await?;
    if total_exposure >= ctx.config.risk.max_total_exposure_usd {
        return Ok(Err("max_total_exposure_usd".to_string()));
    }

    Ok(Ok(()))
}

/// If bothside is enabled and both legs have positive EV, queue a hedge job
/// sharing the same `bothside_group_id`, scheduled `hedge_delay_min` out.
/// The hedge leg's own calibration estimate is computed at its own ask,
/// not reused from the directional leg.
async fn maybe_queue_hedge(
    ctx: &ExecutorContext,
    artifact: &CalibrationArtifact,
    job: &TradeJob,
    quote: &PriceQuote,
    point_estimate: Decimal,
    now: DateTime<Utc>,
) -> Result<()> {
    if !ctx.config.dca.bothside_enabled {
        return Ok(());
    }
    let Some(hedge_token_id) = job.hedge_token_id.clone() else {
        warn!(job_id = ?job.id, "no hedge token id recorded on directional job, skipping hedge");
        return Ok(());
    };

    let hedge_ask = Decimal::ONE - quote.best_bid;
    let (hedge_win_rate, _band) = estimate(
        artifact,
        hedge_ask,
        ctx.config.sizing.calibration_confidence_level,
    )?;
    let hedge_ev = hedge_win_rate.point_estimate > Decimal::ZERO && hedge_ask < Decimal::ONE;
    if !(point_estimate > Decimal::ZERO && hedge_ev) {
        return Ok(());
    }

    let group_id = job
        .bothside_group_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let hedge_job = TradeJob {
        id: None,
        event_slug: job.event_slug.clone(),
        away_abbr: job.away_abbr.clone(),
        home_abbr: job.home_abbr.clone(),
        tipoff_utc: job.tipoff_utc,
        execute_after: now + Duration::minutes(ctx.config.dca.hedge_delay_min as i64),
        execute_before: job.execute_before,
        leg_side: crate::domain::job::LegSide::Hedge,
        token_id: hedge_token_id,
        status: JobStatus::Pending,
        retry_count: 0,
        merge_status: crate::domain::job::MergeStatus::None,
        dca_group_id: None,
        bothside_group_id: Some(group_id),
        merge_pair_id: None,
        directional_is_home: job.directional_is_home,
        hedge_token_id: None,
        created_at: now,
        updated_at: now,
    };
    ctx.store.insert_job(&hedge_job).await?;
    Ok(())
}

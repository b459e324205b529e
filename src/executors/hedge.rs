use super::ExecutorContext;
use crate::domain::job::{JobStatus, LegSide, TradeJob};
use crate::domain::signal::{OrderStatus, Signal, SignalRole};
use crate::domain::vwap::{vwap, Fill};
use crate::error::Result;
use crate::merge_strategy::min_margin;
use crate::mode::ExecutionMode;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HedgeOutcome {
    Executed,
    DcaActive,
    HeldPending,
    Skipped,
    NotClaimed,
}

/// Runs the hedge executor for one hedge-leg job. A hedge is always
/// scheduled alongside its directional counterpart (see
/// `directional::maybe_queue_hedge`) but never executes until the
/// directional leg has filled inventory, and never at a price that would
/// make a future merge unprofitable.
#[instrument(skip(ctx, job))]
pub async fn run(ctx: &ExecutorContext, job: &TradeJob, now: DateTime<Utc>) -> Result<HedgeOutcome> {
    let job_id = job.id.expect("persisted job has an id");

    if job.status != JobStatus::Pending || job.leg_side != LegSide::Hedge || !job.within_window(now) {
        return Ok(HedgeOutcome::NotClaimed);
    }
    if !ctx.quota_remaining() {
        return Ok(HedgeOutcome::NotClaimed);
    }

    let Some(group_id) = job.bothside_group_id.clone() else {
        return Ok(HedgeOutcome::NotClaimed);
    };
    let Some(directional_job) = find_directional_sibling(ctx, &group_id, job_id).await? else {
        return Ok(HedgeOutcome::HeldPending);
    };

    let dir_signals = ctx
        .store
        .list_signals_for_job(directional_job.id.expect("persisted"))
        .await?;
    let dir_fills: Vec<Fill> = dir_signals
        .iter()
        .filter(|s| s.order_status.is_terminal() && s.filled_shares() > Decimal::ZERO)
        .map(|s| Fill { price: s.vwap_to_date, shares: s.filled_shares() })
        .collect();

    if dir_fills.is_empty() {
        // Directional leg has no filled inventory yet: never execute a hedge alone.
        return Ok(HedgeOutcome::HeldPending);
    }

    let dir_vwap = vwap(&dir_fills).unwrap_or(Decimal::ZERO);
    let quote = ctx.market.get_price(&job.token_id).await?;
    let hedge_price = quote.best_ask - Decimal::new(1, 2);

    let margin = min_margin(
        dir_fills.iter().map(|f| f.shares).sum(),
        ctx.config.execution.min_profit_usd,
        ctx.config.execution.est_gas_usd,
        ctx.config.execution.min_shares_floor,
    );
    let max_hedge = Decimal::ONE - dir_vwap - margin;

    if hedge_price > max_hedge {
        warn!(job_id, %hedge_price, %max_hedge, "hedge price above max_hedge, holding");
        if ctx.mode == ExecutionMode::Live {
            // Job stays pending untouched; next tick re-evaluates at a fresh price.
            return Ok(HedgeOutcome::HeldPending);
        }
        ctx.store.update_job_status(job_id, JobStatus::Skipped).await?;
        return Ok(HedgeOutcome::Skipped);
    }

    if !ctx.store.claim_job(job_id).await? {
        return Ok(HedgeOutcome::NotClaimed);
    }

    let size_usd = (dir_fills.iter().map(|f| f.shares * f.price).sum::<Decimal>())
        .min(ctx.config.sizing.max_position_usd);
    let shares = if hedge_price.is_zero() { Decimal::ZERO } else { size_usd / hedge_price };

    let (order_status, exchange_order_id) = if ctx.mode == ExecutionMode::Live {
        let order_id = ctx.market.place_limit_buy(&job.token_id, hedge_price, size_usd).await?;
        info!(job_id, order_id, "placed hedge limit order");
        (OrderStatus::Placed, Some(order_id))
    } else {
        (OrderStatus::Paper, None)
    };

    let mut signal = Signal::new(job_id, job.token_id.clone(), hedge_price, size_usd, shares, SignalRole::Hedge, 1);
    signal.order_status = order_status;
    signal.order_placed_at = Some(now);
    signal.order_original_price = hedge_price;
    signal.exchange_order_id = exchange_order_id;
    ctx.store.insert_signal(&signal).await?;
    ctx.record_order_placed();

    let dca_enabled = ctx.config.dca.dca_max_entries > 1;
    let next_status = if dca_enabled { JobStatus::DcaActive } else { JobStatus::Executed };
    ctx.store.update_job_status(job_id, next_status).await?;

    Ok(if dca_enabled { HedgeOutcome::DcaActive } else { HedgeOutcome::Executed })
}

async fn find_directional_sibling(
    ctx: &ExecutorContext,
    group_id: &str,
    hedge_job_id: i64,
) -> Result<Option<TradeJob>> {
    let candidates = ctx
        .store
        .list_dispatchable_jobs(&[
            JobStatus::Executed,
            JobStatus::DcaActive,
            JobStatus::Executing,
            JobStatus::Pending,
        ])
        .await?;
    Ok(candidates.into_iter().find(|j| {
        j.id != Some(hedge_job_id)
            && j.leg_side == LegSide::Directional
            && j.bothside_group_id.as_deref() == Some(group_id)
    }))
}

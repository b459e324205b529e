use super::ExecutorContext;
use crate::domain::job::{JobStatus, TradeJob};
use crate::domain::signal::{OrderStatus, Signal};
use crate::error::Result;
use crate::mode::ExecutionMode;
use crate::sizing::{size_dca_entry, DcaSizingOutcome};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcaOutcome {
    Ordered,
    Completed,
    Waiting,
    DriftRejected,
    NotClaimed,
}

const CUTOFF_BEFORE_TIPOFF_MIN: i64 = 30;

/// Runs one DCA follow-on tick for a job already in `dca_active`. Fires on a
/// time trigger (min interval elapsed) or a favorable-price trigger (price
/// dipped), guarded against chasing a price that has drifted too far from
/// the first entry.
#[instrument(skip(ctx, job))]
pub async fn run(ctx: &ExecutorContext, job: &TradeJob, now: DateTime<Utc>) -> Result<DcaOutcome> {
    let job_id = job.id.expect("persisted job has an id");
    if job.status != JobStatus::DcaActive {
        return Ok(DcaOutcome::NotClaimed);
    }

    let mut signals = ctx.store.list_signals_for_job(job_id).await?;
    signals.sort_by_key(|s| s.dca_sequence);

    let Some(first) = signals.first().cloned() else {
        return Ok(DcaOutcome::NotClaimed);
    };
    let Some(last) = signals.last().cloned() else {
        return Ok(DcaOutcome::NotClaimed);
    };

    let cutoff = job.tipoff_utc - Duration::minutes(CUTOFF_BEFORE_TIPOFF_MIN);
    let max_entries = ctx.config.dca.dca_max_entries;
    if now >= cutoff || signals.len() as u32 >= max_entries {
        ctx.store.update_job_status(job_id, JobStatus::Executed).await?;
        return Ok(DcaOutcome::Completed);
    }

    if !ctx.quota_remaining() {
        return Ok(DcaOutcome::NotClaimed);
    }

    let quote = ctx.market.get_price(&job.token_id).await?;
    let current_price = quote.best_ask;

    let last_placed_at = last.order_placed_at.unwrap_or(last.created_at);
    let min_interval = Duration::minutes(ctx.config.dca.dca_min_interval_min as i64);
    let time_trigger = now - last_placed_at >= min_interval;

    let dip_threshold = last.order_original_price * (Decimal::ONE - ctx.config.dca.min_price_dip_pct);
    let price_trigger = current_price <= dip_threshold;

    if !time_trigger && !price_trigger {
        return Ok(DcaOutcome::Waiting);
    }

    let drift = (current_price - first.order_original_price).abs() / first.order_original_price;
    if drift > ctx.config.dca.dca_max_price_spread {
        warn!(job_id, %drift, "dca follow-on rejected: price drifted past max spread");
        return Ok(DcaOutcome::DriftRejected);
    }

    let filled_shares_total: Decimal = signals.iter().map(|s| s.filled_shares()).sum();
    let running_cost: Decimal = signals.iter().map(|s| s.cost()).sum();
    let budget_usd = first.requested_usd * Decimal::from(max_entries);
    let remaining_entries = max_entries.saturating_sub(signals.len() as u32);

    let size_usd = match size_dca_entry(
        running_cost,
        filled_shares_total,
        budget_usd,
        remaining_entries,
        current_price,
        ctx.config.sizing.cap_mult,
        ctx.config.sizing.min_order_usd,
    ) {
        DcaSizingOutcome::Order { size_usd } => size_usd,
        DcaSizingOutcome::TargetReached | DcaSizingOutcome::BudgetExhausted => {
            ctx.store.update_job_status(job_id, JobStatus::Executed).await?;
            return Ok(DcaOutcome::Completed);
        }
    };

    let limit_price = current_price - Decimal::new(1, 2);
    let shares = if limit_price.is_zero() { Decimal::ZERO } else { size_usd / limit_price };

    let (order_status, exchange_order_id) = if ctx.mode == ExecutionMode::Live {
        let order_id = ctx.market.place_limit_buy(&job.token_id, limit_price, size_usd).await?;
        info!(job_id, order_id, "placed dca follow-on limit order");
        (OrderStatus::Placed, Some(order_id))
    } else {
        (OrderStatus::Paper, None)
    };

    let role = first.signal_role;
    let next_sequence = signals.iter().map(|s| s.dca_sequence).max().unwrap_or(0) + 1;
    let mut signal = Signal::new(job_id, job.token_id.clone(), limit_price, size_usd, shares, role, next_sequence);
    signal.order_status = order_status;
    signal.order_placed_at = Some(now);
    signal.order_original_price = limit_price;
    signal.exchange_order_id = exchange_order_id;
    ctx.store.insert_signal(&signal).await?;
    ctx.record_order_placed();

    Ok(DcaOutcome::Ordered)
}

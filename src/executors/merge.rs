use super::ExecutorContext;
use crate::domain::job::{JobStatus, MergeStatus, TradeJob};
use crate::domain::merge_operation::{MergeOpStatus, MergeOperation};
use crate::domain::signal::Signal;
use crate::domain::vwap::Fill;
use crate::error::Result;
use crate::merge_strategy::{combined_vwap, evaluate_merge_gate, mergeable_shares};
use crate::mode::ExecutionMode;
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Executed,
    Skipped,
    NotEligible,
    Retrying,
}

const MAX_MERGE_RETRIES: i32 = 3;

/// Runs the merge/redeem executor for one directional/hedge pair once both
/// legs have executed and neither has already been merged. Dispatched by
/// `merge_pair_id`, independent of the job-status dispatch loop.
#[instrument(skip(ctx, directional, hedge))]
pub async fn run(
    ctx: &ExecutorContext,
    directional: &TradeJob,
    hedge: &TradeJob,
) -> Result<MergeOutcome> {
    if directional.merge_status != MergeStatus::None || hedge.merge_status != MergeStatus::None {
        return Ok(MergeOutcome::NotEligible);
    }
    if !matches!(directional.status, JobStatus::Executed | JobStatus::DcaActive)
        || !matches!(hedge.status, JobStatus::Executed | JobStatus::DcaActive)
    {
        return Ok(MergeOutcome::NotEligible);
    }

    let dir_signals = ctx.store.list_signals_for_job(directional.id.expect("persisted")).await?;
    let hedge_signals = ctx.store.list_signals_for_job(hedge.id.expect("persisted")).await?;

    let dir_fills = filled(&dir_signals);
    let hedge_fills = filled(&hedge_signals);

    let Some(cvwap) = combined_vwap(&dir_fills, &hedge_fills) else {
        return Ok(MergeOutcome::NotEligible);
    };
    let dir_filled: Decimal = dir_fills.iter().map(|f| f.shares).sum();
    let hedge_filled: Decimal = hedge_fills.iter().map(|f| f.shares).sum();
    let mergeable = mergeable_shares(dir_filled, hedge_filled);

    if mergeable <= Decimal::ZERO {
        return Ok(MergeOutcome::NotEligible);
    }

    let gate = evaluate_merge_gate(
        cvwap,
        mergeable,
        ctx.config.execution.min_profit_usd,
        ctx.config.execution.est_gas_usd,
        ctx.config.execution.min_shares_floor,
        ctx.market.wallet_class(),
    );

    if !gate.eligible {
        ctx.store.update_merge_status(directional.id.expect("persisted"), MergeStatus::Skipped).await?;
        ctx.store.update_merge_status(hedge.id.expect("persisted"), MergeStatus::Skipped).await?;
        info!(event_slug = %directional.event_slug, "merge gate rejected, both legs skipped");
        return Ok(MergeOutcome::Skipped);
    }

    let recovery_usd = mergeable * gate.recovery_per_share;
    let total_filled = dir_filled + hedge_filled;
    let dir_recovery_usd = recovery_usd * (dir_filled / total_filled);
    let hedge_recovery_usd = recovery_usd - dir_recovery_usd;

    let (status, tx_hash) = if ctx.mode == ExecutionMode::Live {
        match ctx.market.merge_positions(&directional.event_slug, mergeable).await {
            Ok(receipt) => (MergeOpStatus::Executed, receipt.tx_hash),
            Err(e) => {
                let retries = directional.retry_count.max(hedge.retry_count);
                if retries + 1 >= MAX_MERGE_RETRIES {
                    ctx.store.update_merge_status(directional.id.expect("persisted"), MergeStatus::Failed).await?;
                    ctx.store.update_merge_status(hedge.id.expect("persisted"), MergeStatus::Failed).await?;
                    warn!(error = %e, "merge failed after max retries");
                    return Ok(MergeOutcome::NotEligible);
                }
                ctx.store.increment_retry_count(directional.id.expect("persisted")).await?;
                ctx.store.increment_retry_count(hedge.id.expect("persisted")).await?;
                warn!(error = %e, "merge attempt failed, will retry");
                return Ok(MergeOutcome::Retrying);
            }
        }
    } else {
        // Paper mode: simulate the redeem and credit recovery immediately.
        (MergeOpStatus::Simulated, None)
    };

    let op = MergeOperation::new(directional.event_slug.clone(), mergeable, cvwap, status);
    ctx.store.insert_merge_operation(&op).await?;

    credit_per_signal(ctx, &dir_signals, dir_filled, mergeable, dir_recovery_usd).await?;
    credit_per_signal(ctx, &hedge_signals, hedge_filled, mergeable, hedge_recovery_usd).await?;

    ctx.store.update_merge_status(directional.id.expect("persisted"), MergeStatus::Executed).await?;
    ctx.store.update_merge_status(hedge.id.expect("persisted"), MergeStatus::Executed).await?;

    Ok(MergeOutcome::Executed)
}

fn filled(signals: &[Signal]) -> Vec<Fill> {
    signals
        .iter()
        .filter(|s| s.order_status.is_terminal() && s.filled_shares() > Decimal::ZERO)
        .map(|s| Fill { price: s.vwap_to_date, shares: s.filled_shares() })
        .collect()
}

/// Splits the merge's recovered shares/USD proportionally across a leg's
/// signals (oldest DCA entries first), so settlement stays independent per
/// signal even though the merge itself is computed at the job-pair level.
async fn credit_per_signal(
    ctx: &ExecutorContext,
    signals: &[Signal],
    leg_filled: Decimal,
    mergeable: Decimal,
    recovery_usd: Decimal,
) -> Result<()> {
    if leg_filled.is_zero() {
        return Ok(());
    }
    for signal in signals {
        let filled = signal.filled_shares();
        if filled.is_zero() {
            continue;
        }
        let share_of_leg = filled / leg_filled;
        let shares_merged = (mergeable * share_of_leg).min(filled);
        let recovery_share = recovery_usd * share_of_leg;
        ctx.store
            .credit_merge_recovery(signal.id.expect("persisted"), shares_merged, recovery_share)
            .await?;
    }
    Ok(())
}

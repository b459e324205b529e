use nba_engine::domain::job::JobStatus;
use nba_engine::sizing::{size_dca_entry, DcaSizingOutcome};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::Mutex;

/// First entry fills 40 shares @ 0.50 (cost $20), price dips to $0.40, and a
/// follow-on entry is due. The next order should close most of the gap
/// between current holding value and the position's target budget while
/// respecting the per-entry cap.
#[test]
fn dca_rebalance_orders_toward_target_budget() {
    let first_entry_usd = dec!(20);
    let max_entries = 4u32;
    let budget_usd = first_entry_usd * Decimal::from(max_entries);

    let filled_shares_total = dec!(40);
    let running_cost = dec!(20);
    let remaining_entries = max_entries - 1;
    let current_price = dec!(0.40);
    let cap_mult = dec!(2);
    let min_order_usd = dec!(5);

    let outcome = size_dca_entry(
        running_cost,
        filled_shares_total,
        budget_usd,
        remaining_entries,
        current_price,
        cap_mult,
        min_order_usd,
    );

    match outcome {
        DcaSizingOutcome::Order { size_usd } => assert_eq!(size_usd, dec!(40)),
        other => panic!("expected a follow-on order, got {other:?}"),
    }
}

/// Once the running cost already consumes the whole position budget, a
/// follow-on tick must stop ordering instead of overspending.
#[test]
fn dca_rebalance_stops_once_budget_is_exhausted() {
    let outcome = size_dca_entry(
        dec!(80),   // running_cost == budget_usd, nothing left
        dec!(160),
        dec!(80),
        1,
        dec!(0.40),
        dec!(2),
        dec!(5),
    );
    assert!(matches!(outcome, DcaSizingOutcome::BudgetExhausted));
}

/// Mirrors `Store::claim_job`'s row-level CAS (`UPDATE ... WHERE status =
/// 'pending'`, success iff exactly one row is affected): two concurrent tick
/// invocations racing to claim the same job must leave exactly one winner,
/// regardless of interleaving.
async fn claim(state: &Arc<Mutex<JobStatus>>) -> bool {
    let mut guard = state.lock().await;
    if *guard == JobStatus::Pending {
        *guard = JobStatus::Executing;
        true
    } else {
        false
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_claim_job_has_exactly_one_winner() {
    let state = Arc::new(Mutex::new(JobStatus::Pending));

    let a = { let s = Arc::clone(&state); tokio::spawn(async move { claim(&s).await }) };
    let b = { let s = Arc::clone(&state); tokio::spawn(async move { claim(&s).await }) };

    let (won_a, won_b) = (a.await.unwrap(), b.await.unwrap());

    assert_ne!(won_a, won_b, "exactly one of the two concurrent claims must win");
    assert_eq!(*state.lock().await, JobStatus::Executing);
}

use crate::domain::job::{JobStatus, LegSide, MergeStatus, TradeJob};
use crate::domain::merge_operation::{MergeOpStatus, MergeOperation};
use crate::domain::order_event::{OrderEvent, OrderEventKind};
use crate::domain::result::SettlementResult;
use crate::domain::risk_snapshot::{RiskLevel, RiskSnapshot};
use crate::domain::signal::{OrderStatus, Signal, SignalRole};
use crate::error::{EngineError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

/// Postgres-backed store for the engine's tables: trade jobs, signals,
/// order events, merge operations, settlement results, and risk snapshots.
/// All queries are dynamic `sqlx::query`/`query_as` with `.bind()`, never
/// the compile-time `query!` macro, since there is no live database to
/// check against at compile time.
#[derive(Debug, Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    // ==================== trade_job ====================

    pub async fn insert_job(&self, job: &TradeJob) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO trade_job (
                event_slug, away_abbr, home_abbr, tipoff_utc, execute_after, execute_before,
                leg_side, token_id, status, retry_count, merge_status,
                dca_group_id, bothside_group_id, merge_pair_id,
                directional_is_home, hedge_token_id, created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18)
            ON CONFLICT (event_slug, leg_side) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&job.event_slug)
        .bind(&job.away_abbr)
        .bind(&job.home_abbr)
        .bind(job.tipoff_utc)
        .bind(job.execute_after)
        .bind(job.execute_before)
        .bind(job.leg_side.as_str())
        .bind(&job.token_id)
        .bind(job.status.as_str())
        .bind(job.retry_count)
        .bind(job.merge_status.as_str())
        .bind(&job.dca_group_id)
        .bind(&job.bothside_group_id)
        .bind(job.merge_pair_id)
        .bind(job.directional_is_home)
        .bind(&job.hedge_token_id)
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(r.get::<i64, _>("id")),
            None => {
                let existing = self.get_job_by_slug_side(&job.event_slug, job.leg_side).await?;
                existing
                    .and_then(|j| j.id)
                    .ok_or_else(|| EngineError::DataInconsistency(format!(
                        "job insert conflicted but existing row not found for {} {}",
                        job.event_slug, job.leg_side
                    )))
            }
        }
    }

    pub async fn get_job(&self, id: i64) -> Result<Option<TradeJob>> {
        let row = sqlx::query("SELECT * FROM trade_job WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_job(&r)).transpose()
    }

    pub async fn get_job_by_slug_side(
        &self,
        event_slug: &str,
        leg_side: LegSide,
    ) -> Result<Option<TradeJob>> {
        let row = sqlx::query("SELECT * FROM trade_job WHERE event_slug = $1 AND leg_side = $2")
            .bind(event_slug)
            .bind(leg_side.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_job(&r)).transpose()
    }

    /// Row-level CAS claim: `pending -> executing`. Returns `true` if this
    /// caller won the race (the primary concurrency guard against two ticks
    /// racing on the same job).
    pub async fn claim_job(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE trade_job SET status = 'executing', updated_at = now() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn update_job_status(&self, id: i64, status: JobStatus) -> Result<()> {
        sqlx::query("UPDATE trade_job SET status = $1, updated_at = now() WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn increment_retry_count(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE trade_job SET retry_count = retry_count + 1, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_merge_pair(&self, id: i64, merge_pair_id: i64, status: MergeStatus) -> Result<()> {
        sqlx::query(
            "UPDATE trade_job SET merge_pair_id = $1, merge_status = $2, updated_at = now() WHERE id = $3",
        )
        .bind(merge_pair_id)
        .bind(status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_merge_status(&self, id: i64, status: MergeStatus) -> Result<()> {
        sqlx::query("UPDATE trade_job SET merge_status = $1, updated_at = now() WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Jobs eligible for dispatch this tick, deterministically ordered by
    /// `(tipoff_time ASC, event_slug ASC)`.
    pub async fn list_dispatchable_jobs(&self, statuses: &[JobStatus]) -> Result<Vec<TradeJob>> {
        let status_strs: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let rows = sqlx::query(
            "SELECT * FROM trade_job WHERE status = ANY($1) ORDER BY tipoff_utc ASC, event_slug ASC",
        )
        .bind(&status_strs)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_job).collect()
    }

    pub async fn list_expired_candidates(&self, now: DateTime<Utc>) -> Result<Vec<TradeJob>> {
        let rows = sqlx::query(
            "SELECT * FROM trade_job WHERE status IN ('pending','failed') AND execute_before < $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_job).collect()
    }

    // ==================== signal ====================

    pub async fn insert_signal(&self, signal: &Signal) -> Result<i64> {
        // Signal-level duplicate check keyed on (job_id, dca_sequence) before placement.
        let existing = sqlx::query(
            "SELECT id FROM signal WHERE job_id = $1 AND dca_sequence = $2",
        )
        .bind(signal.job_id)
        .bind(signal.dca_sequence)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = existing {
            return Ok(row.get::<i64, _>("id"));
        }

        let row = sqlx::query(
            r#"
            INSERT INTO signal (
                job_id, token_id, limit_price, requested_usd, shares, vwap_to_date,
                order_status, order_placed_at, order_original_price, order_replace_count,
                exchange_order_id, fee_rate_bps, fee_usd, shares_merged, merge_recovery_usd,
                signal_role, dca_sequence, created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19)
            RETURNING id
            "#,
        )
        .bind(signal.job_id)
        .bind(&signal.token_id)
        .bind(signal.limit_price)
        .bind(signal.requested_usd)
        .bind(signal.shares)
        .bind(signal.vwap_to_date)
        .bind(signal.order_status.as_str())
        .bind(signal.order_placed_at)
        .bind(signal.order_original_price)
        .bind(signal.order_replace_count)
        .bind(&signal.exchange_order_id)
        .bind(signal.fee_rate_bps)
        .bind(signal.fee_usd)
        .bind(signal.shares_merged)
        .bind(signal.merge_recovery_usd)
        .bind(signal.signal_role.as_str())
        .bind(signal.dca_sequence)
        .bind(signal.created_at)
        .bind(signal.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("id"))
    }

    pub async fn get_signal(&self, id: i64) -> Result<Option<Signal>> {
        let row = sqlx::query("SELECT * FROM signal WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_signal(&r)).transpose()
    }

    pub async fn list_signals_for_job(&self, job_id: i64) -> Result<Vec<Signal>> {
        let rows = sqlx::query("SELECT * FROM signal WHERE job_id = $1 ORDER BY dca_sequence ASC")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_signal).collect()
    }

    pub async fn list_active_signals(&self, limit: i64) -> Result<Vec<Signal>> {
        let rows = sqlx::query(
            "SELECT * FROM signal WHERE order_status IN ('pending','placed','partially_filled') \
             ORDER BY order_placed_at ASC NULLS LAST LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_signal).collect()
    }

    pub async fn update_signal_order_status(
        &self,
        id: i64,
        status: OrderStatus,
        vwap_to_date: Decimal,
        shares_filled: Decimal,
        fee_usd: Decimal,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE signal SET order_status = $1, vwap_to_date = $2, shares = $3, fee_usd = $4, updated_at = now() \
             WHERE id = $5",
        )
        .bind(status.as_str())
        .bind(vwap_to_date)
        .bind(shares_filled)
        .bind(fee_usd)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_signal_placed(
        &self,
        id: i64,
        placed_at: DateTime<Utc>,
        exchange_order_id: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE signal SET order_status = 'placed', order_placed_at = $1, exchange_order_id = $2, \
             updated_at = now() WHERE id = $3",
        )
        .bind(placed_at)
        .bind(exchange_order_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn replace_signal_price(
        &self,
        id: i64,
        new_price: Decimal,
        new_exchange_order_id: &str,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE signal SET order_original_price = $1, order_replace_count = order_replace_count + 1, \
             exchange_order_id = $2, updated_at = now() WHERE id = $3",
        )
        .bind(new_price)
        .bind(new_exchange_order_id)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn expire_signal(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE signal SET order_status = 'expired', updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn credit_merge_recovery(&self, id: i64, shares_merged: Decimal, recovery_usd: Decimal) -> Result<()> {
        sqlx::query(
            "UPDATE signal SET shares_merged = shares_merged + $1, merge_recovery_usd = merge_recovery_usd + $2, updated_at = now() \
             WHERE id = $3",
        )
        .bind(shares_merged)
        .bind(recovery_usd)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ==================== order_event ====================

    pub async fn insert_order_event(&self, event: &OrderEvent) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO order_event (signal_id, kind, old_price, new_price, note, created_at) \
             VALUES ($1,$2,$3,$4,$5,$6) RETURNING id",
        )
        .bind(event.signal_id)
        .bind(event.kind.as_str())
        .bind(event.old_price)
        .bind(event.new_price)
        .bind(&event.note)
        .bind(event.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("id"))
    }

    pub async fn list_order_events(&self, signal_id: i64) -> Result<Vec<OrderEvent>> {
        let rows = sqlx::query("SELECT * FROM order_event WHERE signal_id = $1 ORDER BY created_at ASC")
            .bind(signal_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_order_event).collect()
    }

    // ==================== merge_operation ====================

    pub async fn insert_merge_operation(&self, op: &MergeOperation) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO merge_operation (event_slug, shares_merged, combined_vwap, recovery_usd, gas_cost_usd, status, tx_hash, created_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8) RETURNING id",
        )
        .bind(&op.event_slug)
        .bind(op.shares_merged)
        .bind(op.combined_vwap)
        .bind(op.recovery_usd)
        .bind(op.gas_cost_usd)
        .bind(op.status.as_str())
        .bind(&op.tx_hash)
        .bind(op.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("id"))
    }

    pub async fn list_merge_operations(&self, event_slug: &str) -> Result<Vec<MergeOperation>> {
        let rows = sqlx::query("SELECT * FROM merge_operation WHERE event_slug = $1 ORDER BY created_at ASC")
            .bind(event_slug)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_merge_operation).collect()
    }

    // ==================== result ====================

    pub async fn insert_result(&self, result: &SettlementResult) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO result (signal_id, won, pnl_usd, settlement_price, score_home, score_away, created_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7) \
             ON CONFLICT (signal_id) DO UPDATE SET won=$2, pnl_usd=$3, settlement_price=$4, score_home=$5, score_away=$6 \
             RETURNING id",
        )
        .bind(result.signal_id)
        .bind(result.won)
        .bind(result.pnl_usd)
        .bind(result.settlement_price)
        .bind(result.score_home)
        .bind(result.score_away)
        .bind(result.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("id"))
    }

    pub async fn get_result_for_signal(&self, signal_id: i64) -> Result<Option<SettlementResult>> {
        let row = sqlx::query("SELECT * FROM result WHERE signal_id = $1")
            .bind(signal_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_result(&r)).transpose()
    }

    /// Sum of settled PnL since a cutoff, used for the daily/weekly risk inputs.
    pub async fn sum_pnl_since(&self, since: DateTime<Utc>) -> Result<Decimal> {
        let row = sqlx::query("SELECT COALESCE(SUM(pnl_usd), 0) AS total FROM result WHERE created_at >= $1")
            .bind(since)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<Decimal, _>("total"))
    }

    /// Most recent settled results, newest first, for the risk engine's
    /// consecutive-loss and drawdown inputs.
    pub async fn recent_results(&self, limit: i64) -> Result<Vec<SettlementResult>> {
        let rows = sqlx::query("SELECT * FROM result ORDER BY created_at DESC LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_result).collect()
    }

    pub async fn list_jobs_by_event_slug(&self, event_slug: &str) -> Result<Vec<TradeJob>> {
        let rows = sqlx::query("SELECT * FROM trade_job WHERE event_slug = $1")
            .bind(event_slug)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_job).collect()
    }

    /// Count of directional jobs placed since `since`, for the daily
    /// position cap.
    pub async fn count_directional_jobs_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM trade_job WHERE created_at >= $1 AND leg_side = $2",
        )
        .bind(since)
        .bind(LegSide::Directional.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }

    /// Total requested USD across every signal belonging to a non-terminal
    /// job, including unfilled DCA remainder already queued as a signal.
    pub async fn total_open_exposure_usd(&self) -> Result<Decimal> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(s.requested_usd), 0) AS total
             FROM signal s
             JOIN trade_job j ON j.id = s.job_id
             WHERE j.status NOT IN ('executed', 'failed', 'skipped', 'expired', 'cancelled')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("total"))
    }

    // ==================== risk_snapshot ====================

    pub async fn insert_risk_snapshot(&self, snap: &RiskSnapshot) -> Result<i64> {
        let row = sqlx::query(
            "INSERT INTO risk_snapshot (
                timestamp, level, sizing_multiplier, daily_pnl, weekly_pnl,
                consec_losses, max_drawdown_pct, drift_z_max, recent_win_rate_5,
                consec_positive_days, degraded_mode, halted_at, acknowledged_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13) RETURNING id",
        )
        .bind(snap.timestamp)
        .bind(snap.level.as_str())
        .bind(snap.sizing_multiplier)
        .bind(snap.daily_pnl)
        .bind(snap.weekly_pnl)
        .bind(snap.consec_losses)
        .bind(snap.max_drawdown_pct)
        .bind(snap.drift_z_max)
        .bind(snap.recent_win_rate_5)
        .bind(snap.consec_positive_days)
        .bind(snap.degraded_mode)
        .bind(snap.halted_at)
        .bind(snap.acknowledged_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get::<i64, _>("id"))
    }

    /// Most recent snapshot is authoritative state between ticks.
    pub async fn latest_risk_snapshot(&self) -> Result<Option<RiskSnapshot>> {
        let row = sqlx::query("SELECT * FROM risk_snapshot ORDER BY timestamp DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_risk_snapshot(&r)).transpose()
    }
}

fn row_to_job(row: &sqlx::postgres::PgRow) -> Result<TradeJob> {
    let leg_side_str: String = row.get("leg_side");
    let status_str: String = row.get("status");
    let merge_status_str: String = row.get("merge_status");
    Ok(TradeJob {
        id: Some(row.get("id")),
        event_slug: row.get("event_slug"),
        away_abbr: row.get("away_abbr"),
        home_abbr: row.get("home_abbr"),
        tipoff_utc: row.get("tipoff_utc"),
        execute_after: row.get("execute_after"),
        execute_before: row.get("execute_before"),
        leg_side: LegSide::try_from(leg_side_str.as_str()).map_err(EngineError::DataInconsistency)?,
        token_id: row.get("token_id"),
        status: JobStatus::try_from(status_str.as_str()).map_err(EngineError::DataInconsistency)?,
        retry_count: row.get("retry_count"),
        merge_status: MergeStatus::try_from(merge_status_str.as_str())
            .map_err(EngineError::DataInconsistency)?,
        dca_group_id: row.get("dca_group_id"),
        bothside_group_id: row.get("bothside_group_id"),
        merge_pair_id: row.get("merge_pair_id"),
        directional_is_home: row.get("directional_is_home"),
        hedge_token_id: row.get("hedge_token_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_signal(row: &sqlx::postgres::PgRow) -> Result<Signal> {
    let order_status_str: String = row.get("order_status");
    let signal_role_str: String = row.get("signal_role");
    Ok(Signal {
        id: Some(row.get("id")),
        job_id: row.get("job_id"),
        token_id: row.get("token_id"),
        limit_price: row.get("limit_price"),
        requested_usd: row.get("requested_usd"),
        shares: row.get("shares"),
        vwap_to_date: row.get("vwap_to_date"),
        order_status: OrderStatus::try_from(order_status_str.as_str())
            .map_err(EngineError::DataInconsistency)?,
        order_placed_at: row.get("order_placed_at"),
        order_original_price: row.get("order_original_price"),
        order_replace_count: row.get("order_replace_count"),
        exchange_order_id: row.get("exchange_order_id"),
        fee_rate_bps: row.get("fee_rate_bps"),
        fee_usd: row.get("fee_usd"),
        shares_merged: row.get("shares_merged"),
        merge_recovery_usd: row.get("merge_recovery_usd"),
        signal_role: SignalRole::try_from(signal_role_str.as_str())
            .map_err(EngineError::DataInconsistency)?,
        dca_sequence: row.get("dca_sequence"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_order_event(row: &sqlx::postgres::PgRow) -> Result<OrderEvent> {
    let kind_str: String = row.get("kind");
    Ok(OrderEvent {
        id: Some(row.get("id")),
        signal_id: row.get("signal_id"),
        kind: OrderEventKind::try_from(kind_str.as_str()).map_err(EngineError::DataInconsistency)?,
        old_price: row.get("old_price"),
        new_price: row.get("new_price"),
        note: row.get("note"),
        created_at: row.get("created_at"),
    })
}

fn row_to_merge_operation(row: &sqlx::postgres::PgRow) -> Result<MergeOperation> {
    let status_str: String = row.get("status");
    Ok(MergeOperation {
        id: Some(row.get("id")),
        event_slug: row.get("event_slug"),
        shares_merged: row.get("shares_merged"),
        combined_vwap: row.get("combined_vwap"),
        recovery_usd: row.get("recovery_usd"),
        gas_cost_usd: row.get("gas_cost_usd"),
        status: MergeOpStatus::try_from(status_str.as_str()).map_err(EngineError::DataInconsistency)?,
        tx_hash: row.get("tx_hash"),
        created_at: row.get("created_at"),
    })
}

fn row_to_result(row: &sqlx::postgres::PgRow) -> Result<SettlementResult> {
    Ok(SettlementResult {
        id: Some(row.get("id")),
        signal_id: row.get("signal_id"),
        won: row.get("won"),
        pnl_usd: row.get("pnl_usd"),
        settlement_price: row.get("settlement_price"),
        score_home: row.get("score_home"),
        score_away: row.get("score_away"),
        created_at: row.get("created_at"),
    })
}

fn row_to_risk_snapshot(row: &sqlx::postgres::PgRow) -> Result<RiskSnapshot> {
    let level_str: String = row.get("level");
    Ok(RiskSnapshot {
        id: Some(row.get("id")),
        timestamp: row.get("timestamp"),
        level: RiskLevel::try_from(level_str.as_str()).map_err(EngineError::DataInconsistency)?,
        sizing_multiplier: row.get("sizing_multiplier"),
        daily_pnl: row.get("daily_pnl"),
        weekly_pnl: row.get("weekly_pnl"),
        consec_losses: row.get("consec_losses"),
        max_drawdown_pct: row.get("max_drawdown_pct"),
        drift_z_max: row.get("drift_z_max"),
        recent_win_rate_5: row.get("recent_win_rate_5"),
        consec_positive_days: row.get("consec_positive_days"),
        degraded_mode: row.get("degraded_mode"),
        halted_at: row.get("halted_at"),
        acknowledged_at: row.get("acknowledged_at"),
    })
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which leg of the bothside pair a job represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegSide {
    Directional,
    Hedge,
}

impl LegSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegSide::Directional => "directional",
            LegSide::Hedge => "hedge",
        }
    }
}

impl fmt::Display for LegSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for LegSide {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "directional" => Ok(LegSide::Directional),
            "hedge" => Ok(LegSide::Hedge),
            _ => Err(format!("unknown leg_side: {s}")),
        }
    }
}

/// Job lifecycle states. Terminal: executed, failed, skipped, expired, cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Executing,
    DcaActive,
    Executed,
    Failed,
    Skipped,
    Expired,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Executing => "executing",
            JobStatus::DcaActive => "dca_active",
            JobStatus::Executed => "executed",
            JobStatus::Failed => "failed",
            JobStatus::Skipped => "skipped",
            JobStatus::Expired => "expired",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Executed
                | JobStatus::Failed
                | JobStatus::Skipped
                | JobStatus::Expired
                | JobStatus::Cancelled
        )
    }

    /// Check whether a transition to `target` is one of the allowed edges of the
    /// job state machine.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;

        match (self, target) {
            (Pending, Executing) => true,
            (Pending, Skipped) => true,
            (Executing, Executed) => true,
            (Executing, DcaActive) => true,
            (Executing, Failed) => true,
            (Executing, Skipped) => true,
            (DcaActive, Executed) => true,
            (Pending, Expired) => true,
            (Failed, Expired) => true,
            _ => false,
        }
    }

    pub fn valid_transitions(&self) -> Vec<JobStatus> {
        use JobStatus::*;

        match self {
            Pending => vec![Executing, Skipped, Expired],
            Executing => vec![Executed, DcaActive, Failed, Skipped],
            DcaActive => vec![Executed],
            Failed => vec![Expired],
            Executed | Skipped | Expired | Cancelled => vec![],
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for JobStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "executing" => Ok(JobStatus::Executing),
            "dca_active" => Ok(JobStatus::DcaActive),
            "executed" => Ok(JobStatus::Executed),
            "failed" => Ok(JobStatus::Failed),
            "skipped" => Ok(JobStatus::Skipped),
            "expired" => Ok(JobStatus::Expired),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(format!("unknown job status: {s}")),
        }
    }
}

/// Which executor handles a job on a given tick. Dispatch is an exhaustive
/// match on this tag, never a string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    Directional,
    Hedge,
    DcaFollowOn,
    Merge,
}

/// A single transition record kept in-memory for the lifetime of one tick invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTransition {
    pub from: JobStatus,
    pub to: JobStatus,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Tracks status transitions for a single job across one tick, enforcing
/// the edges of the state machine and keeping an audit trail.
#[derive(Debug, Default)]
pub struct JobStateMachine {
    history: Vec<JobTransition>,
}

impl JobStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempt a transition. Returns the new status or an error naming the
    /// disallowed edge; never mutates status on failure.
    pub fn transition(
        &mut self,
        from: JobStatus,
        to: JobStatus,
        reason: impl Into<String>,
    ) -> Result<JobStatus, String> {
        if !from.can_transition_to(to) {
            return Err(format!("invalid job transition: {from} -> {to}"));
        }
        self.history.push(JobTransition {
            from,
            to,
            reason: reason.into(),
            timestamp: Utc::now(),
        });
        Ok(to)
    }

    pub fn history(&self) -> &[JobTransition] {
        &self.history
    }
}

/// Merge eligibility/progress status tracked per leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStatus {
    None,
    Eligible,
    Simulated,
    Executed,
    Failed,
    Skipped,
}

impl MergeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStatus::None => "none",
            MergeStatus::Eligible => "eligible",
            MergeStatus::Simulated => "simulated",
            MergeStatus::Executed => "executed",
            MergeStatus::Failed => "failed",
            MergeStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for MergeStatus {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "none" => Ok(MergeStatus::None),
            "eligible" => Ok(MergeStatus::Eligible),
            "simulated" => Ok(MergeStatus::Simulated),
            "executed" => Ok(MergeStatus::Executed),
            "failed" => Ok(MergeStatus::Failed),
            "skipped" => Ok(MergeStatus::Skipped),
            _ => Err(format!("unknown merge status: {s}")),
        }
    }
}

/// One outcome token side of one game (directional or hedge).
///
/// Unique on (event_slug, leg_side). Created by discovery, mutated only by
/// the dispatcher, never deleted — terminal rows are retained for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeJob {
    pub id: Option<i64>,
    pub event_slug: String,
    pub away_abbr: String,
    pub home_abbr: String,
    pub tipoff_utc: DateTime<Utc>,
    pub execute_after: DateTime<Utc>,
    pub execute_before: DateTime<Utc>,
    pub leg_side: LegSide,
    pub token_id: String,
    pub status: JobStatus,
    pub retry_count: i32,
    pub merge_status: MergeStatus,
    pub dca_group_id: Option<String>,
    pub bothside_group_id: Option<String>,
    pub merge_pair_id: Option<i64>,
    /// Whether the directional leg's `token_id` represents the home team's
    /// outcome. Set once on the directional job and copied onto its hedge,
    /// since the favorite side (and so the directional token) can be either
    /// team; settlement must not assume it is always home.
    pub directional_is_home: bool,
    /// The opposing outcome's real token id, captured when the directional
    /// job is created. Used to queue the hedge job against an actual
    /// exchange-issued token instead of a synthesized id.
    pub hedge_token_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TradeJob {
    #[allow(clippy::too_many_arguments)]
    pub fn new_directional(
        event_slug: String,
        away_abbr: String,
        home_abbr: String,
        tipoff_utc: DateTime<Utc>,
        execute_after: DateTime<Utc>,
        execute_before: DateTime<Utc>,
        token_id: String,
        bothside_group_id: String,
        directional_is_home: bool,
        hedge_token_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            event_slug,
            away_abbr,
            home_abbr,
            tipoff_utc,
            execute_after,
            execute_before,
            leg_side: LegSide::Directional,
            token_id,
            status: JobStatus::Pending,
            retry_count: 0,
            merge_status: MergeStatus::None,
            dca_group_id: None,
            bothside_group_id: Some(bothside_group_id),
            merge_pair_id: None,
            directional_is_home,
            hedge_token_id: Some(hedge_token_id),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.execute_before < now
    }

    pub fn within_window(&self, now: DateTime<Utc>) -> bool {
        self.execute_after <= now && now < self.execute_before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_to_executing_is_allowed() {
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Executing));
    }

    #[test]
    fn executing_to_pending_is_rejected() {
        assert!(!JobStatus::Executing.can_transition_to(JobStatus::Pending));
    }

    #[test]
    fn executed_is_terminal_with_no_outgoing_edges() {
        assert!(JobStatus::Executed.is_terminal());
        assert!(JobStatus::Executed.valid_transitions().is_empty());
    }

    #[test]
    fn state_machine_records_history_and_rejects_invalid_edges() {
        let mut sm = JobStateMachine::new();
        sm.transition(JobStatus::Pending, JobStatus::Executing, "claimed")
            .unwrap();
        sm.transition(JobStatus::Executing, JobStatus::DcaActive, "first fill")
            .unwrap();
        let err = sm
            .transition(JobStatus::DcaActive, JobStatus::Pending, "bad")
            .unwrap_err();
        assert!(err.contains("invalid job transition"));
        assert_eq!(sm.history().len(), 2);
    }

    #[test]
    fn job_status_round_trips_through_str() {
        for s in [
            JobStatus::Pending,
            JobStatus::Executing,
            JobStatus::DcaActive,
            JobStatus::Executed,
            JobStatus::Failed,
            JobStatus::Skipped,
            JobStatus::Expired,
            JobStatus::Cancelled,
        ] {
            assert_eq!(JobStatus::try_from(s.as_str()).unwrap(), s);
        }
    }
}

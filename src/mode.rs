use std::fmt;
use std::str::FromStr;

/// Execution mode shared by the CLI, executors and the order manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// No orders are placed; used for smoke-testing discovery and sizing.
    DryRun,
    /// Orders are simulated and recorded with `order_status = paper`.
    Paper,
    /// Orders are placed against the real exchange.
    Live,
}

impl ExecutionMode {
    pub fn is_live(&self) -> bool {
        matches!(self, ExecutionMode::Live)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionMode::DryRun => "dry-run",
            ExecutionMode::Paper => "paper",
            ExecutionMode::Live => "live",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dry-run" => Ok(ExecutionMode::DryRun),
            "paper" => Ok(ExecutionMode::Paper),
            "live" => Ok(ExecutionMode::Live),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

pub mod job;
pub mod merge_operation;
pub mod order_event;
pub mod result;
pub mod risk_snapshot;
pub mod signal;
pub mod vwap;

pub use job::{ExecutorKind, JobStateMachine, JobStatus, JobTransition, LegSide, MergeStatus, TradeJob};
pub use merge_operation::{MergeOpStatus, MergeOperation};
pub use order_event::{OrderEvent, OrderEventKind};
pub use result::SettlementResult;
pub use risk_snapshot::{RiskEvent, RiskEventLog, RiskLevel, RiskSnapshot};
pub use signal::{OrderStatus, Signal, SignalRole};
pub use vwap::{vwap, Fill};

//! Reward distribution: recipient input, call encoding and batch orchestration

pub mod call;
pub mod classify;
pub mod planner;
pub mod recipients;

pub use call::DistributionCall;
pub use classify::FailureKind;
pub use planner::{BatchOutcome, BatchPlan, BatchPlanner, RunReport};
pub use recipients::{read_csv, total_amount};

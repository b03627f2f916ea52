//! Runtime Module - run execution
//!
//! - `scheduler`: ready-set computation, concurrent dispatch, skip/prune
//!   propagation, cancellation
//! - `operation`: per-kind block operations behind one trait + registry
//! - `aggregate`: RunResult assembly from the terminated context
//! - `handle`: Engine entry point and the RunHandle push interface
//!
//! This module is the "how" of a run; static structure lives in `graph`.

mod aggregate;
mod handle;
mod operation;
mod scheduler;

pub use aggregate::{aggregate, BlockTrace, FailureSummary, RunResult, RunStatus};
pub use handle::{Engine, RunHandle};
pub use operation::{
    BlockOperation, OperationOutcome, OperationRegistry, OperationRequest,
};
pub use scheduler::Scheduler;

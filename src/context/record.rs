//! BlockRecord - per-block execution state within one run
//!
//! Records move through the scheduler state machine:
//! Pending → Ready → Running → Succeeded | Failed, with Pending/Ready → Skipped
//! for pruned branches and failed upstreams. A record never mutates after
//! reaching a terminal status.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SkeinError;

/// Execution status of one block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl BlockStatus {
    /// Terminal statuses never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a block was skipped without executing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A condition upstream selected a different branch. Counts as a
    /// satisfied dependency for downstream merge blocks.
    BranchNotSelected,
    /// An upstream block failed (or was itself skipped for this reason).
    /// Poisons exclusive downstream dependents.
    UpstreamFailed,
    /// The run was cancelled before this block started.
    Cancelled,
}

/// Failure payload attached to a Failed block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockFailure {
    /// Stable failure kind: timeout, memory_exceeded, runtime, syntax,
    /// resolution, operation, operation_timeout, cancelled, internal
    pub kind: String,
    pub message: String,
}

impl BlockFailure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Classify an engine error into a failure payload.
    ///
    /// The kind lets the caller distinguish resource failures (timeout,
    /// memory) from user-code failures without parsing messages.
    pub fn from_error(err: &SkeinError) -> Self {
        let kind = match err {
            SkeinError::SandboxTimeout { .. } => "timeout",
            SkeinError::SandboxMemoryExceeded { .. } => "memory_exceeded",
            SkeinError::SandboxRuntime { .. } => "runtime",
            SkeinError::SandboxSyntax { .. } => "syntax",
            SkeinError::SandboxCancelled => "cancelled",
            SkeinError::FieldNotFound { .. } | SkeinError::InvalidTraversal { .. } => "resolution",
            SkeinError::OperationTimeout { .. } => "operation_timeout",
            SkeinError::OperationFailed { .. } => "operation",
            _ => "internal",
        };
        Self::new(kind, err.to_string())
    }
}

/// Mutable execution state for one block within one run
#[derive(Debug, Clone)]
pub struct BlockRecord {
    pub block_id: Arc<str>,
    pub status: BlockStatus,
    /// Present iff status == Succeeded
    pub output: Option<Arc<Value>>,
    /// Present iff status == Failed
    pub failure: Option<BlockFailure>,
    /// Present iff status == Skipped
    pub skip_reason: Option<SkipReason>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration: Option<Duration>,
    /// Captured stdout (function blocks only)
    pub stdout: Option<String>,
}

impl BlockRecord {
    pub fn pending(block_id: Arc<str>) -> Self {
        Self {
            block_id,
            status: BlockStatus::Pending,
            output: None,
            failure: None,
            skip_reason: None,
            started_at: None,
            ended_at: None,
            duration: None,
            stdout: None,
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.status == BlockStatus::Succeeded
    }

    /// Whether this record satisfies a downstream dependency: succeeded, or
    /// pruned by branch selection (merge blocks still run in that case).
    pub fn satisfies_dependency(&self) -> bool {
        self.is_succeeded()
            || (self.status == BlockStatus::Skipped
                && self.skip_reason == Some(SkipReason::BranchNotSelected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::intern;

    #[test]
    fn terminal_statuses() {
        assert!(!BlockStatus::Pending.is_terminal());
        assert!(!BlockStatus::Ready.is_terminal());
        assert!(!BlockStatus::Running.is_terminal());
        assert!(BlockStatus::Succeeded.is_terminal());
        assert!(BlockStatus::Failed.is_terminal());
        assert!(BlockStatus::Skipped.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_value(BlockStatus::Succeeded).unwrap();
        assert_eq!(json, "succeeded");
    }

    #[test]
    fn pending_record_is_empty() {
        let record = BlockRecord::pending(intern("b"));
        assert_eq!(record.status, BlockStatus::Pending);
        assert!(record.output.is_none());
        assert!(record.failure.is_none());
        assert!(record.started_at.is_none());
    }

    #[test]
    fn pruned_skip_satisfies_dependency() {
        let mut record = BlockRecord::pending(intern("b"));
        record.status = BlockStatus::Skipped;
        record.skip_reason = Some(SkipReason::BranchNotSelected);
        assert!(record.satisfies_dependency());

        record.skip_reason = Some(SkipReason::UpstreamFailed);
        assert!(!record.satisfies_dependency());
    }

    #[test]
    fn failure_kind_classification() {
        assert_eq!(
            BlockFailure::from_error(&SkeinError::SandboxTimeout { limit_ms: 1 }).kind,
            "timeout"
        );
        assert_eq!(
            BlockFailure::from_error(&SkeinError::SandboxMemoryExceeded { limit_bytes: 1 }).kind,
            "memory_exceeded"
        );
        assert_eq!(
            BlockFailure::from_error(&SkeinError::SandboxRuntime {
                message: "x".into()
            })
            .kind,
            "runtime"
        );
        assert_eq!(
            BlockFailure::from_error(&SkeinError::FieldNotFound {
                block_id: "a".into(),
                path: "b".into()
            })
            .kind,
            "resolution"
        );
        assert_eq!(
            BlockFailure::from_error(&SkeinError::OperationFailed {
                block_id: "a".into(),
                reason: "x".into()
            })
            .kind,
            "operation"
        );
    }
}

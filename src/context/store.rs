//! ExecutionContext - per-run block record store
//!
//! Single DashMap keyed by block id with lock-free concurrent access. The
//! context is exclusively owned by its run: the scheduler issues exactly one
//! transition per block per phase, operations read upstream outputs through
//! it, nothing else mutates it.
//!
//! Every transition is validated against the scheduler state machine; an
//! out-of-order transition is an internal invariant violation, not a block
//! failure.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;

use crate::error::SkeinError;

use super::record::{BlockFailure, BlockRecord, BlockStatus, SkipReason};

/// Thread-safe store of block records for one run
#[derive(Clone, Default)]
pub struct ExecutionContext {
    records: Arc<DashMap<Arc<str>, BlockRecord>>,
}

impl ExecutionContext {
    /// Create a context with every block Pending
    pub fn new(block_ids: impl IntoIterator<Item = Arc<str>>) -> Self {
        let records = DashMap::new();
        for id in block_ids {
            records.insert(Arc::clone(&id), BlockRecord::pending(id));
        }
        Self {
            records: Arc::new(records),
        }
    }

    /// Get a snapshot of one block's record
    pub fn get(&self, block_id: &str) -> Option<BlockRecord> {
        self.records.get(block_id).map(|r| r.value().clone())
    }

    /// Current status of a block
    pub fn status(&self, block_id: &str) -> Option<BlockStatus> {
        self.records.get(block_id).map(|r| r.status)
    }

    /// Output of a succeeded block (O(1) Arc clone)
    pub fn output(&self, block_id: &str) -> Option<Arc<Value>> {
        self.records
            .get(block_id)
            .and_then(|r| r.output.as_ref().map(Arc::clone))
    }

    /// Pending → Ready
    pub fn mark_ready(&self, block_id: &str) -> Result<(), SkeinError> {
        self.transition(block_id, BlockStatus::Ready, |record| {
            record.status == BlockStatus::Pending
        })
    }

    /// Ready → Running; stamps the start time
    pub fn mark_running(&self, block_id: &str) -> Result<(), SkeinError> {
        self.transition(block_id, BlockStatus::Running, |record| {
            if record.status != BlockStatus::Ready {
                return false;
            }
            record.started_at = Some(Utc::now());
            true
        })
    }

    /// Running → Succeeded with the block's output
    pub fn complete_success(
        &self,
        block_id: &str,
        output: Value,
        stdout: Option<String>,
        duration: Duration,
    ) -> Result<(), SkeinError> {
        self.transition(block_id, BlockStatus::Succeeded, |record| {
            if record.status != BlockStatus::Running {
                return false;
            }
            record.output = Some(Arc::new(output.clone()));
            record.stdout = stdout.clone();
            record.ended_at = Some(Utc::now());
            record.duration = Some(duration);
            true
        })
    }

    /// Running → Failed with the failure payload
    pub fn complete_failure(
        &self,
        block_id: &str,
        failure: BlockFailure,
        stdout: Option<String>,
        duration: Duration,
    ) -> Result<(), SkeinError> {
        self.transition(block_id, BlockStatus::Failed, |record| {
            if record.status != BlockStatus::Running {
                return false;
            }
            record.failure = Some(failure.clone());
            record.stdout = stdout.clone();
            record.ended_at = Some(Utc::now());
            record.duration = Some(duration);
            true
        })
    }

    /// Pending | Ready → Skipped
    pub fn mark_skipped(&self, block_id: &str, reason: SkipReason) -> Result<(), SkeinError> {
        self.transition(block_id, BlockStatus::Skipped, |record| {
            if !matches!(record.status, BlockStatus::Pending | BlockStatus::Ready) {
                return false;
            }
            record.skip_reason = Some(reason);
            true
        })
    }

    /// Snapshot of every record (order unspecified)
    pub fn snapshot(&self) -> Vec<BlockRecord> {
        self.records.iter().map(|r| r.value().clone()).collect()
    }

    /// Count of blocks currently in a given status
    pub fn count_in(&self, status: BlockStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    /// True when no block can make further progress
    pub fn all_terminal(&self) -> bool {
        self.records.iter().all(|r| r.status.is_terminal())
    }

    fn transition(
        &self,
        block_id: &str,
        to: BlockStatus,
        apply: impl FnOnce(&mut BlockRecord) -> bool,
    ) -> Result<(), SkeinError> {
        let mut record = self
            .records
            .get_mut(block_id)
            .ok_or_else(|| SkeinError::IllegalTransition {
                block_id: block_id.to_string(),
                from: "absent".to_string(),
                to: to.as_str().to_string(),
            })?;

        let from = record.status;
        if !apply(&mut record) {
            return Err(SkeinError::IllegalTransition {
                block_id: block_id.to_string(),
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            });
        }
        record.status = to;
        Ok(())
    }
}

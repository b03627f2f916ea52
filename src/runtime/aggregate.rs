//! Result Aggregator - assembles the final RunResult
//!
//! Pure read over the execution context after run termination: the output
//! of succeeded response blocks, the full per-block trace, and the failure
//! list. Every failed block appears with its failure kind and message even
//! when other branches produced output.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::context::{BlockFailure, BlockStatus, ExecutionContext, SkipReason};
use crate::graph::{BlockKind, Graph};

/// Terminal status of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every executed block succeeded
    Succeeded,
    /// At least one block failed
    Failed,
    /// The run was cancelled before termination
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One block's row in the run trace
#[derive(Debug, Clone, Serialize)]
pub struct BlockTrace {
    pub block_id: Arc<str>,
    pub kind: BlockKind,
    pub status: BlockStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Arc<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<BlockFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
}

/// Failed block summary for the caller
#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    pub block_id: Arc<str>,
    /// Failure kind (timeout, runtime, resolution, operation, ...)
    pub kind: String,
    pub message: String,
}

/// Aggregated outcome of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: String,
    pub status: RunStatus,
    /// Output of succeeded response blocks: the single value when one
    /// responded, an object keyed by block id when several did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    pub blocks: Vec<BlockTrace>,
    pub failures: Vec<FailureSummary>,
    pub duration: Duration,
}

/// Assemble the RunResult from a terminated context
pub fn aggregate(
    graph: &Graph,
    context: &ExecutionContext,
    run_id: String,
    status: RunStatus,
    duration: Duration,
) -> RunResult {
    let mut blocks = Vec::with_capacity(graph.len());
    let mut failures = Vec::new();
    let mut responses: Vec<(Arc<str>, Arc<Value>)> = Vec::new();

    for block in graph.blocks() {
        let Some(record) = context.get(&block.id) else {
            continue;
        };

        if let Some(failure) = &record.failure {
            failures.push(FailureSummary {
                block_id: Arc::clone(&record.block_id),
                kind: failure.kind.clone(),
                message: failure.message.clone(),
            });
        }

        if block.kind == BlockKind::Response && record.is_succeeded() {
            if let Some(output) = &record.output {
                responses.push((Arc::clone(&record.block_id), Arc::clone(output)));
            }
        }

        blocks.push(BlockTrace {
            block_id: Arc::clone(&record.block_id),
            kind: block.kind,
            status: record.status,
            output: record.output.clone(),
            failure: record.failure.clone(),
            skip_reason: record.skip_reason,
            started_at: record.started_at,
            ended_at: record.ended_at,
            duration_ms: record.duration.map(|d| d.as_millis() as u64),
            stdout: record.stdout.clone(),
        });
    }

    let output = match responses.len() {
        0 => None,
        1 => Some((*responses[0].1).clone()),
        _ => {
            let mut map = Map::with_capacity(responses.len());
            for (id, value) in responses {
                map.insert(id.to_string(), (*value).clone());
            }
            Some(Value::Object(map))
        }
    };

    RunResult {
        run_id,
        status,
        output,
        blocks,
        failures,
        duration,
    }
}

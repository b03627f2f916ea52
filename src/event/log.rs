//! EventLog - event sourcing for run execution
//!
//! Full audit trail of one run:
//! - Event: envelope with id + timestamp + kind
//! - EventKind: run-level and block-level variants
//! - EventLog: thread-safe, append-only log

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::SkipReason;

/// Single event in the run execution log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since run start (ms)
    pub timestamp_ms: u64,
    /// Event type and data
    pub kind: EventKind,
}

/// All event types, serialized with a `type` tag.
///
/// Uses Arc<str> for block_id fields to enable zero-cost cloning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    // ═══════════════════════════════════════════
    // RUN LEVEL
    // ═══════════════════════════════════════════
    RunStarted {
        block_count: usize,
        run_id: String,
        /// xxh3 fingerprint of the graph shape
        graph_fingerprint: String,
        engine_version: String,
    },
    RunCompleted {
        status: String,
        output: Arc<Value>,
        total_duration_ms: u64,
    },
    RunFailed {
        error: String,
    },
    RunCancelled {
        total_duration_ms: u64,
    },

    // ═══════════════════════════════════════════
    // BLOCK LEVEL
    // ═══════════════════════════════════════════
    BlockReady {
        block_id: Arc<str>,
        dependencies: Vec<Arc<str>>,
    },
    /// Block execution begins with its fully resolved configuration
    BlockStarted {
        block_id: Arc<str>,
        kind: String,
        inputs: Value,
    },
    BlockSucceeded {
        block_id: Arc<str>,
        output: Arc<Value>,
        duration_ms: u64,
    },
    BlockFailed {
        block_id: Arc<str>,
        /// Failure kind: timeout, memory_exceeded, runtime, syntax,
        /// resolution, operation, ...
        failure_kind: String,
        error: String,
        duration_ms: u64,
    },
    BlockSkipped {
        block_id: Arc<str>,
        reason: SkipReason,
    },

    // ═══════════════════════════════════════════
    // FINE-GRAINED
    // ═══════════════════════════════════════════
    /// A condition block picked its branch
    BranchSelected {
        block_id: Arc<str>,
        branch: String,
    },
    /// A sandbox invocation finished (either way)
    SandboxSettled {
        block_id: Arc<str>,
        ok: bool,
        stdout_len: usize,
        elapsed_ms: u64,
    },
}

impl EventKind {
    /// Extract block_id if the event is block-related
    pub fn block_id(&self) -> Option<&str> {
        match self {
            Self::BlockReady { block_id, .. }
            | Self::BlockStarted { block_id, .. }
            | Self::BlockSucceeded { block_id, .. }
            | Self::BlockFailed { block_id, .. }
            | Self::BlockSkipped { block_id, .. }
            | Self::BranchSelected { block_id, .. }
            | Self::SandboxSettled { block_id, .. } => Some(block_id),
            Self::RunStarted { .. }
            | Self::RunCompleted { .. }
            | Self::RunFailed { .. }
            | Self::RunCancelled { .. } => None,
        }
    }

    /// Check if this is a run-level event
    pub fn is_run_event(&self) -> bool {
        matches!(
            self,
            Self::RunStarted { .. }
                | Self::RunCompleted { .. }
                | Self::RunFailed { .. }
                | Self::RunCancelled { .. }
        )
    }
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    /// Create a new event log (call at run start)
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event (thread-safe, returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        self.emit_full(kind).id
    }

    /// Emit an event and return the full envelope (used by the broadcast
    /// bridge to push the exact stored event)
    pub fn emit_full(&self, kind: EventKind) -> Event {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };

        self.events.write().push(event.clone());
        event
    }

    /// Get all events (cloned - use `with_events` for zero-copy access)
    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Zero-copy access to events via callback.
    ///
    /// Holds the read lock for the duration of the callback - keep it short.
    pub fn with_events<T>(&self, f: impl FnOnce(&[Event]) -> T) -> T {
        f(&self.events.read())
    }

    /// Filter events by block ID
    pub fn filter_block(&self, block_id: &str) -> Vec<Event> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.block_id() == Some(block_id))
                .cloned()
                .collect()
        })
    }

    /// Run-level events only
    pub fn run_events(&self) -> Vec<Event> {
        self.with_events(|events| {
            events
                .iter()
                .filter(|e| e.kind.is_run_event())
                .cloned()
                .collect()
        })
    }

    /// Serialize to JSON for persistence/debugging
    pub fn to_json(&self) -> Value {
        self.with_events(|events| serde_json::to_value(events).unwrap_or(Value::Null))
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").field("len", &self.len()).finish()
    }
}

//! Event Module - event sourcing for run execution
//!
//! Provides the full audit trail and the push interface:
//! - `Event`: envelope with id + timestamp + kind
//! - `EventKind`: run-level and block-level variants
//! - `EventLog`: thread-safe, append-only log
//! - `EventEmitter`: trait for dependency injection
//! - `NoopEmitter`: zero-cost no-op for testing
//! - `BroadcastEmitter`: log + pushed status events for RunHandle
//! - `TraceWriter`: NDJSON export for debugging

mod emitter;
mod log;
mod trace;

pub use emitter::{BroadcastEmitter, EventEmitter, NoopEmitter};
pub use log::{Event, EventKind, EventLog};
pub use trace::{engine_version, generate_run_id, TraceWriter};

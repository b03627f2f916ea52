//! Skein - workflow execution engine
//!
//! Turns a validated graph of typed blocks (agent, api, function,
//! condition, response) wired by `<id.path>` data references into an
//! ordered, data-flowing, fault-isolated run. Function block code executes
//! in a per-invocation sandbox with a wall-clock timeout, a memory ceiling,
//! and no network or filesystem capability.
//!
//! ## Module Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        DOMAIN MODEL                          │
//! │  graph/     JSON description → validated Graph (refs, DAG)   │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      APPLICATION LAYER                       │
//! │  runtime/   run execution (Engine, Scheduler, operations)    │
//! │  resolver/  reference resolution against the context         │
//! │  sandbox/   isolated function block execution                │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    INFRASTRUCTURE LAYER                      │
//! │  context/   per-run state (ExecutionContext, BlockRecord)    │
//! │  event/     event sourcing (EventLog, BroadcastEmitter)      │
//! │  util/      interner, constants                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`graph`] | description parsing, reference AST, cycle detection |
//! | [`resolver`] | `<id.path>` → literal values from upstream outputs |
//! | [`sandbox`] | per-invocation Lua interpreter with limits |
//! | [`runtime`] | scheduling, operations, aggregation, run handles |
//! | [`context`] | block record state machine, single source of truth |
//! | [`event`] | audit trail and pushed status events |
//! | [`config`] | engine configuration (sandbox limits) |
//! | [`error`] | error types with stable codes |

// ═══════════════════════════════════════════════════════════════
// DOMAIN MODEL
// ═══════════════════════════════════════════════════════════════
pub mod graph;

// ═══════════════════════════════════════════════════════════════
// APPLICATION LAYER
// ═══════════════════════════════════════════════════════════════
pub mod resolver;
pub mod runtime;
pub mod sandbox;

// ═══════════════════════════════════════════════════════════════
// INFRASTRUCTURE LAYER
// ═══════════════════════════════════════════════════════════════
pub mod context;
pub mod event;
pub mod util;

// ═══════════════════════════════════════════════════════════════
// CROSS-CUTTING
// ═══════════════════════════════════════════════════════════════
pub mod config;
pub mod error;

// ═══════════════════════════════════════════════════════════════
// PUBLIC API RE-EXPORTS
// ═══════════════════════════════════════════════════════════════

// Error types
pub use error::{FixSuggestion, SkeinError};

// Config types
pub use config::EngineConfig;

// Graph types (Domain Model)
pub use graph::{validate, BlockKind, BlockSpec, Graph, GraphDescription};

// Runtime types (Application Layer)
pub use runtime::{
    BlockOperation, Engine, OperationOutcome, OperationRegistry, OperationRequest, RunHandle,
    RunResult, RunStatus,
};

// Sandbox types
pub use sandbox::{SandboxExecutor, SandboxLimits, SandboxResult};

// Context types
pub use context::{BlockFailure, BlockRecord, BlockStatus, ExecutionContext, SkipReason};

// Event types
pub use event::{Event, EventEmitter, EventKind, EventLog, NoopEmitter, TraceWriter};

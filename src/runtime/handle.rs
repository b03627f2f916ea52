//! Engine and RunHandle - the run trigger interface
//!
//! `Engine::start_run(graph, input)` spawns the scheduler and returns a
//! `RunHandle`: a push interface delivering per-block status events plus the
//! awaited final `RunResult`. Cancellation fans out through the handle to
//! every in-flight operation, preemptively for sandboxed code.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::{Result, SkeinError};
use crate::event::{generate_run_id, BroadcastEmitter, Event, EventLog};
use crate::graph::{BlockKind, Graph, GraphDescription};
use crate::util::constants::EVENT_CHANNEL_CAPACITY;

use super::aggregate::RunResult;
use super::operation::{BlockOperation, OperationRegistry};
use super::scheduler::Scheduler;

/// The workflow execution engine.
///
/// Owns the operation registry and configuration; independent of any run.
/// Collaborator kinds (agent, api) must be registered before a graph using
/// them can start.
pub struct Engine {
    config: EngineConfig,
    registry: Arc<OperationRegistry>,
}

impl Engine {
    /// Engine with built-in operations (function, condition, response)
    pub fn new(config: EngineConfig) -> Self {
        let registry = OperationRegistry::with_builtins(&config);
        Self {
            config,
            registry: Arc::new(registry),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a collaborator operation for a block kind.
    ///
    /// Panics if called while a run started from this engine is still
    /// holding the registry; register everything before starting runs.
    pub fn register_operation(&mut self, kind: BlockKind, operation: Arc<dyn BlockOperation>) {
        Arc::get_mut(&mut self.registry)
            .expect("register operations before starting runs")
            .register(kind, operation);
    }

    /// Validate a description into an executable graph
    pub fn validate(description: &GraphDescription) -> Result<Graph> {
        crate::graph::validate(description)
    }

    /// Start a run and return its handle immediately.
    ///
    /// Fails fast (before any block runs) when the graph needs a kind with
    /// no registered operation.
    pub fn start_run(&self, graph: Graph, initial_input: Value) -> Result<RunHandle> {
        self.registry.ensure_supported(&graph)?;

        let run_id = generate_run_id();
        let cancel = CancellationToken::new();
        let log = EventLog::new();
        let (sender, events) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let emitter = BroadcastEmitter::new(log.clone(), sender);

        let scheduler = Scheduler::new(
            Arc::new(graph),
            Arc::clone(&self.registry),
            Arc::new(emitter.clone()),
            cancel.clone(),
            run_id.clone(),
        );

        let task = tokio::spawn(async move { scheduler.run(initial_input).await });

        Ok(RunHandle {
            run_id,
            cancel,
            events,
            emitter,
            task,
        })
    }

    /// Run a graph to completion (convenience wrapper over start_run)
    pub async fn run(&self, graph: Graph, initial_input: Value) -> Result<RunResult> {
        self.start_run(graph, initial_input)?.result().await
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Handle to one in-flight run
pub struct RunHandle {
    run_id: String,
    cancel: CancellationToken,
    events: broadcast::Receiver<Event>,
    emitter: BroadcastEmitter,
    task: JoinHandle<Result<RunResult>>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Cancel the run: in-flight sandboxed code is interrupted
    /// preemptively, collaborator operations observe the token, and
    /// unstarted blocks end Skipped.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Receive pushed status events (the handle's own subscription)
    pub fn events(&mut self) -> &mut broadcast::Receiver<Event> {
        &mut self.events
    }

    /// An additional event subscription for another consumer
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.emitter.subscribe()
    }

    /// The run's full audit log
    pub fn log(&self) -> &EventLog {
        self.emitter.log()
    }

    /// Await the final aggregated result
    pub async fn result(self) -> Result<RunResult> {
        self.task.await.map_err(|e| SkeinError::OperationFailed {
            block_id: "scheduler".to_string(),
            reason: format!("run task panicked: {}", e),
        })?
    }
}

//! Scheduler - drives one run of a validated graph
//!
//! State machine per block: Pending → Ready → Running → Succeeded | Failed,
//! with Pending/Ready → Skipped for pruned branches, failed upstreams, and
//! cancellation.
//!
//! Dispatch: every Ready block is spawned onto a JoinSet immediately;
//! completions are drained one at a time and each completion triggers skip
//! propagation plus dispatch of newly Ready blocks. Independent blocks are
//! never serialized, and no wave barrier holds fast siblings hostage to a
//! slow one.
//!
//! Skip policy (see DESIGN.md for the recorded decisions):
//! - any Failed or failure-skipped dependency skips a block eagerly
//! - a block whose dependencies all ended branch-pruned is pruned too;
//!   one succeeded dependency keeps a merge block eligible
//! - cancellation skips everything that has not started

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::context::{BlockFailure, BlockStatus, ExecutionContext, SkipReason};
use crate::error::SkeinError;
use crate::event::{engine_version, EventEmitter, EventKind};
use crate::graph::{BlockKind, Graph};
use crate::resolver::resolve_config;

use super::aggregate::{aggregate, RunResult, RunStatus};
use super::operation::{OperationOutcome, OperationRegistry, OperationRequest};

/// Result of one dispatched block, reported back to the scheduler loop
struct Completion {
    block_id: Arc<str>,
    kind: BlockKind,
    outcome: OperationOutcome,
    duration: std::time::Duration,
}

/// Drives one run to termination
pub struct Scheduler {
    graph: Arc<Graph>,
    registry: Arc<OperationRegistry>,
    context: ExecutionContext,
    emitter: Arc<dyn EventEmitter>,
    cancel: CancellationToken,
    run_id: String,
}

impl Scheduler {
    pub fn new(
        graph: Arc<Graph>,
        registry: Arc<OperationRegistry>,
        emitter: Arc<dyn EventEmitter>,
        cancel: CancellationToken,
        run_id: String,
    ) -> Self {
        let context =
            ExecutionContext::new(graph.deps().block_ids().iter().map(Arc::clone));
        Self {
            graph,
            registry,
            context,
            emitter,
            cancel,
            run_id,
        }
    }

    /// The run's execution context (single source of truth for records)
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Execute the run to termination.
    ///
    /// Returns Ok with a RunResult even when blocks failed; Err is reserved
    /// for internal invariant violations that abort the run.
    #[instrument(skip(self, initial_input), fields(run_id = %self.run_id, blocks = self.graph.len()))]
    pub async fn run(&self, initial_input: Value) -> Result<RunResult, SkeinError> {
        let started = Instant::now();
        info!("starting run");

        self.emitter.emit(EventKind::RunStarted {
            block_count: self.graph.len(),
            run_id: self.run_id.clone(),
            graph_fingerprint: self.graph.fingerprint().to_string(),
            engine_version: engine_version().to_string(),
        });

        let input = Arc::new(initial_input);
        let mut join_set: JoinSet<Completion> = JoinSet::new();
        let mut cancelled = self.cancel.is_cancelled();

        if !cancelled {
            self.propagate_skips()?;
            self.dispatch_ready(&mut join_set, &input)?;
        }

        while let Some(joined) = join_set.join_next().await {
            let completion = joined.map_err(|e| SkeinError::OperationFailed {
                block_id: "unknown".to_string(),
                reason: format!("block task panicked: {}", e),
            })?;

            if let Err(internal) = self.apply_completion(completion) {
                self.emitter.emit(EventKind::RunFailed {
                    error: internal.to_string(),
                });
                return Err(internal);
            }

            if !cancelled && self.cancel.is_cancelled() {
                cancelled = true;
                debug!("cancellation observed, draining in-flight blocks");
            }
            if !cancelled {
                self.propagate_skips()?;
                self.dispatch_ready(&mut join_set, &input)?;
            }
        }

        cancelled = cancelled || self.cancel.is_cancelled();
        let total_duration = started.elapsed();

        if cancelled {
            self.skip_unstarted(SkipReason::Cancelled)?;
            self.emitter.emit(EventKind::RunCancelled {
                total_duration_ms: total_duration.as_millis() as u64,
            });
            return Ok(aggregate(
                &self.graph,
                &self.context,
                self.run_id.clone(),
                RunStatus::Cancelled,
                total_duration,
            ));
        }

        // A drained JoinSet with non-terminal blocks means the ready-set
        // computation broke; surface it instead of silently returning.
        if !self.context.all_terminal() {
            let pending = self.context.count_in(BlockStatus::Pending)
                + self.context.count_in(BlockStatus::Ready);
            let err = SkeinError::Stalled { pending };
            self.emitter.emit(EventKind::RunFailed {
                error: err.to_string(),
            });
            return Err(err);
        }

        let status = if self.context.count_in(BlockStatus::Failed) > 0 {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };

        let result = aggregate(
            &self.graph,
            &self.context,
            self.run_id.clone(),
            status,
            total_duration,
        );

        self.emitter.emit(EventKind::RunCompleted {
            status: result.status.as_str().to_string(),
            output: Arc::new(result.output.clone().unwrap_or(Value::Null)),
            total_duration_ms: total_duration.as_millis() as u64,
        });
        info!(status = result.status.as_str(), "run finished");

        Ok(result)
    }

    /// Dispatch every Pending block whose dependencies are satisfied
    fn dispatch_ready(
        &self,
        join_set: &mut JoinSet<Completion>,
        input: &Arc<Value>,
    ) -> Result<(), SkeinError> {
        for block in self.graph.blocks() {
            if self.context.status(&block.id) != Some(BlockStatus::Pending) {
                continue;
            }
            if !self.dependencies_satisfied(&block.id) {
                continue;
            }

            let block_id = crate::util::intern(&block.id);

            self.context.mark_ready(&block_id)?;
            self.emitter.emit(EventKind::BlockReady {
                block_id: Arc::clone(&block_id),
                dependencies: self.graph.deps().dependencies(&block_id).to_vec(),
            });

            self.context.mark_running(&block_id)?;

            let block = Arc::clone(block);
            let kind = block.kind;
            let context = self.context.clone();
            let registry = Arc::clone(&self.registry);
            let emitter = Arc::clone(&self.emitter);
            let cancel = self.cancel.clone();
            let input = Arc::clone(input);

            join_set.spawn(async move {
                let block_started = Instant::now();

                let resolved = resolve_config(&block, &context, &input);
                let outcome = match resolved {
                    Err(e) => OperationOutcome::err(e),
                    Ok(config) => {
                        emitter.emit(EventKind::BlockStarted {
                            block_id: Arc::clone(&block_id),
                            kind: kind.to_string(),
                            inputs: Value::Object(config.clone()),
                        });

                        match registry.get(kind) {
                            Some(operation) => {
                                let request = OperationRequest {
                                    block: Arc::clone(&block),
                                    config,
                                    cancel,
                                };
                                let outcome = operation.run(request).await;

                                if kind == BlockKind::Function || kind == BlockKind::Condition {
                                    emitter.emit(EventKind::SandboxSettled {
                                        block_id: Arc::clone(&block_id),
                                        ok: outcome.result.is_ok(),
                                        stdout_len: outcome
                                            .stdout
                                            .as_ref()
                                            .map_or(0, String::len),
                                        elapsed_ms: block_started.elapsed().as_millis() as u64,
                                    });
                                }
                                outcome
                            }
                            // start_run verified the registry; stay defensive
                            // in the task rather than panic the JoinSet
                            None => OperationOutcome::err(SkeinError::UnsupportedBlockKind {
                                kind: kind.to_string(),
                            }),
                        }
                    }
                };

                Completion {
                    block_id,
                    kind,
                    outcome,
                    duration: block_started.elapsed(),
                }
            });
        }
        Ok(())
    }

    /// Apply one completion to the context and emit its events.
    ///
    /// Err aborts the run: internal invariant violations only.
    fn apply_completion(&self, completion: Completion) -> Result<(), SkeinError> {
        let Completion {
            block_id,
            kind,
            outcome,
            duration,
        } = completion;

        match outcome.result {
            Ok(value) => {
                self.context.complete_success(
                    &block_id,
                    value.clone(),
                    outcome.stdout,
                    duration,
                )?;
                self.emitter.emit(EventKind::BlockSucceeded {
                    block_id: Arc::clone(&block_id),
                    output: Arc::new(value.clone()),
                    duration_ms: duration.as_millis() as u64,
                });

                if kind == BlockKind::Condition {
                    self.apply_branch_selection(&block_id, &value)?;
                }
                Ok(())
            }
            Err(err) if err.is_internal() => Err(err),
            Err(err) => {
                let failure = BlockFailure::from_error(&err);
                self.emitter.emit(EventKind::BlockFailed {
                    block_id: Arc::clone(&block_id),
                    failure_kind: failure.kind.clone(),
                    error: failure.message.clone(),
                    duration_ms: duration.as_millis() as u64,
                });
                self.context
                    .complete_failure(&block_id, failure, outcome.stdout, duration)?;
                Ok(())
            }
        }
    }

    /// Prune the non-selected branches of a completed condition block
    fn apply_branch_selection(&self, block_id: &Arc<str>, output: &Value) -> Result<(), SkeinError> {
        let Some(selected) = output.get("branch").and_then(Value::as_str) else {
            // ConditionOperation always sets "branch"; a custom operation
            // that does not simply leaves every branch live
            return Ok(());
        };

        self.emitter.emit(EventKind::BranchSelected {
            block_id: Arc::clone(block_id),
            branch: selected.to_string(),
        });

        let Some(block) = self.graph.block(block_id) else {
            return Ok(());
        };
        let Some(branches) = &block.branches else {
            return Ok(());
        };

        if !branches.contains_key(selected) {
            warn!(block = %block_id, branch = selected, "selected branch is not declared; pruning all branches");
        }

        for (branch, targets) in branches {
            if branch == selected {
                continue;
            }
            for target in targets {
                if matches!(
                    self.context.status(target),
                    Some(BlockStatus::Pending) | Some(BlockStatus::Ready)
                ) {
                    self.skip_block(target, SkipReason::BranchNotSelected)?;
                }
            }
        }
        Ok(())
    }

    /// Propagate skips to a fixpoint:
    /// - failure skips: any Failed or failure-skipped dependency
    /// - prune skips: all dependencies terminal, none succeeded, at least
    ///   one branch-pruned
    fn propagate_skips(&self) -> Result<(), SkeinError> {
        let mut changed = true;
        while changed {
            changed = false;

            for block in self.graph.blocks() {
                if self.context.status(&block.id) != Some(BlockStatus::Pending) {
                    continue;
                }
                let deps = self.graph.deps().dependencies(&block.id);
                if deps.is_empty() {
                    continue;
                }

                let mut any_failed = false;
                let mut any_pruned = false;
                let mut any_succeeded = false;
                let mut all_terminal = true;

                for dep in deps {
                    let Some(record) = self.context.get(dep) else {
                        continue;
                    };
                    match record.status {
                        BlockStatus::Failed => any_failed = true,
                        BlockStatus::Skipped => match record.skip_reason {
                            Some(SkipReason::BranchNotSelected) => any_pruned = true,
                            _ => any_failed = true,
                        },
                        BlockStatus::Succeeded => any_succeeded = true,
                        _ => all_terminal = false,
                    }
                }

                if any_failed {
                    self.skip_block(&block.id, SkipReason::UpstreamFailed)?;
                    changed = true;
                } else if all_terminal && any_pruned && !any_succeeded {
                    self.skip_block(&block.id, SkipReason::BranchNotSelected)?;
                    changed = true;
                }
            }
        }
        Ok(())
    }

    /// All dependencies terminal and satisfied (succeeded or branch-pruned)
    fn dependencies_satisfied(&self, block_id: &str) -> bool {
        self.graph
            .deps()
            .dependencies(block_id)
            .iter()
            .all(|dep| {
                self.context
                    .get(dep)
                    .is_some_and(|record| record.satisfies_dependency())
            })
    }

    fn skip_block(&self, block_id: &str, reason: SkipReason) -> Result<(), SkeinError> {
        self.context.mark_skipped(block_id, reason)?;
        let interned = crate::util::intern(block_id);
        self.emitter.emit(EventKind::BlockSkipped {
            block_id: interned,
            reason,
        });
        Ok(())
    }

    /// Mark every block that never started as skipped (cancellation path)
    fn skip_unstarted(&self, reason: SkipReason) -> Result<(), SkeinError> {
        for block in self.graph.blocks() {
            if matches!(
                self.context.status(&block.id),
                Some(BlockStatus::Pending) | Some(BlockStatus::Ready)
            ) {
                self.skip_block(&block.id, reason)?;
            }
        }
        Ok(())
    }
}

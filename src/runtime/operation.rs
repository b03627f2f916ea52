//! Block Operations - per-kind execution behind one trait
//!
//! The engine ships operations for the kinds it owns:
//! - `function`: user code in the sandbox executor
//! - `condition`: branch expression evaluated in the sandbox
//! - `response`: shapes the run output from resolved config
//!
//! Agent and api blocks are external collaborators: the embedding
//! application registers its own `BlockOperation` for them, and their
//! timeout policy is theirs. The engine surfaces a collaborator failure
//! verbatim as the block's failure payload.

use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::error::SkeinError;
use crate::graph::{BlockKind, BlockSpec, Graph};
use crate::sandbox::{SandboxExecutor, SandboxLimits};

/// Everything an operation needs for one block execution
pub struct OperationRequest {
    pub block: Arc<BlockSpec>,
    /// Fully resolved configuration (no remaining reference syntax)
    pub config: Map<String, Value>,
    /// Run-level cancellation signal; operations are expected to observe it
    pub cancel: CancellationToken,
}

impl OperationRequest {
    /// The block's resolved `input` parameter (null when absent)
    pub fn input(&self) -> Value {
        self.config.get("input").cloned().unwrap_or(Value::Null)
    }
}

/// Result of one operation: the outcome plus captured stdout.
///
/// Stdout is carried separately so it lands in the block record even when
/// the outcome is a failure.
pub struct OperationOutcome {
    pub result: Result<Value, SkeinError>,
    pub stdout: Option<String>,
}

impl OperationOutcome {
    pub fn ok(value: Value) -> Self {
        Self {
            result: Ok(value),
            stdout: None,
        }
    }

    pub fn err(error: SkeinError) -> Self {
        Self {
            result: Err(error),
            stdout: None,
        }
    }
}

/// One executable block kind
#[async_trait]
pub trait BlockOperation: Send + Sync {
    async fn run(&self, request: OperationRequest) -> OperationOutcome;
}

/// Registry of operations keyed by block kind
pub struct OperationRegistry {
    operations: FxHashMap<BlockKind, Arc<dyn BlockOperation>>,
}

impl OperationRegistry {
    /// Registry with the engine's built-in operations
    pub fn with_builtins(config: &EngineConfig) -> Self {
        let executor = SandboxExecutor::new();
        let mut operations: FxHashMap<BlockKind, Arc<dyn BlockOperation>> = FxHashMap::default();

        operations.insert(
            BlockKind::Function,
            Arc::new(FunctionOperation {
                executor: executor.clone(),
                defaults: config.sandbox_limits(),
                max_timeout: config.max_sandbox_timeout(),
            }),
        );
        operations.insert(
            BlockKind::Condition,
            Arc::new(ConditionOperation {
                executor,
                limits: config.sandbox_limits(),
            }),
        );
        operations.insert(BlockKind::Response, Arc::new(ResponseOperation));

        Self { operations }
    }

    /// Register (or replace) the operation for a kind
    pub fn register(&mut self, kind: BlockKind, operation: Arc<dyn BlockOperation>) {
        self.operations.insert(kind, operation);
    }

    pub fn get(&self, kind: BlockKind) -> Option<Arc<dyn BlockOperation>> {
        self.operations.get(&kind).map(Arc::clone)
    }

    /// Fail fast when a graph needs a kind nobody registered
    pub fn ensure_supported(&self, graph: &Graph) -> Result<(), SkeinError> {
        for block in graph.blocks() {
            if !self.operations.contains_key(&block.kind) {
                return Err(SkeinError::UnsupportedBlockKind {
                    kind: block.kind.to_string(),
                });
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
// Built-in: function
// ═══════════════════════════════════════════════════════════════

/// Runs the block's code in the sandbox against its resolved input
struct FunctionOperation {
    executor: SandboxExecutor,
    defaults: SandboxLimits,
    max_timeout: std::time::Duration,
}

#[async_trait]
impl BlockOperation for FunctionOperation {
    async fn run(&self, request: OperationRequest) -> OperationOutcome {
        // Validation guarantees code is present on function blocks
        let Some(code) = request.block.code() else {
            return OperationOutcome::err(SkeinError::ValidationError {
                reason: format!("function block '{}' has no code", request.block.id),
            });
        };

        let limits = self
            .defaults
            .with_timeout_override(request.block.timeout_secs(), self.max_timeout);

        let result = self
            .executor
            .execute(code, request.input(), limits, request.cancel.clone())
            .await;

        OperationOutcome {
            result: result.outcome,
            stdout: Some(result.stdout),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// Built-in: condition
// ═══════════════════════════════════════════════════════════════

/// Evaluates a branch expression over the resolved input.
///
/// A boolean result selects `then`/`else`; a string result selects the
/// branch of that name. The block's output records the decision so
/// downstream blocks can reference it.
struct ConditionOperation {
    executor: SandboxExecutor,
    limits: SandboxLimits,
}

#[async_trait]
impl BlockOperation for ConditionOperation {
    async fn run(&self, request: OperationRequest) -> OperationOutcome {
        let Some(expression) = request.block.expression() else {
            return OperationOutcome::err(SkeinError::ValidationError {
                reason: format!("condition block '{}' has no expression", request.block.id),
            });
        };

        let code = format!("return ({})", expression);
        let result = self
            .executor
            .execute(&code, request.input(), self.limits, request.cancel.clone())
            .await;

        let value = match result.outcome {
            Ok(v) => v,
            Err(e) => {
                return OperationOutcome {
                    result: Err(e),
                    stdout: Some(result.stdout),
                }
            }
        };

        let branch = match &value {
            Value::Bool(true) => "then".to_string(),
            Value::Bool(false) => "else".to_string(),
            Value::String(name) => name.clone(),
            other => {
                return OperationOutcome {
                    result: Err(SkeinError::OperationFailed {
                        block_id: request.block.id.clone(),
                        reason: format!(
                            "condition expression must return a boolean or branch name, got {}",
                            crate::resolver::path::value_type_name(other)
                        ),
                    }),
                    stdout: Some(result.stdout),
                };
            }
        };

        OperationOutcome {
            result: Ok(json!({"branch": branch, "value": value})),
            stdout: Some(result.stdout),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// Built-in: response
// ═══════════════════════════════════════════════════════════════

/// Terminal output shaping: the resolved `data` parameter becomes the
/// block's output (and, via the aggregator, the run output).
struct ResponseOperation;

#[async_trait]
impl BlockOperation for ResponseOperation {
    async fn run(&self, request: OperationRequest) -> OperationOutcome {
        let data = request.config.get("data").cloned().unwrap_or(Value::Null);
        OperationOutcome::ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(json_spec: Value, config: Value) -> OperationRequest {
        let block: BlockSpec = serde_json::from_value(json_spec).unwrap();
        let Value::Object(config) = config else {
            panic!("config must be an object")
        };
        OperationRequest {
            block: Arc::new(block),
            config,
            cancel: CancellationToken::new(),
        }
    }

    fn registry() -> OperationRegistry {
        OperationRegistry::with_builtins(&EngineConfig::default())
    }

    // ═══════════════════════════════════════════════════════════════
    // REGISTRY
    // ═══════════════════════════════════════════════════════════════

    #[test]
    fn builtins_cover_engine_kinds() {
        let registry = registry();
        assert!(registry.get(BlockKind::Function).is_some());
        assert!(registry.get(BlockKind::Condition).is_some());
        assert!(registry.get(BlockKind::Response).is_some());
        // Collaborator kinds are not built in
        assert!(registry.get(BlockKind::Agent).is_none());
        assert!(registry.get(BlockKind::Api).is_none());
    }

    #[test]
    fn ensure_supported_rejects_unregistered_kind() {
        let desc = crate::graph::GraphDescription::from_json(
            r#"{"schema": "skein/graph@0.3",
                "blocks": [{"id": "call", "kind": "api", "config": {}}]}"#,
        )
        .unwrap();
        let graph = crate::graph::validate(&desc).unwrap();

        let err = registry().ensure_supported(&graph).unwrap_err();
        assert_eq!(err.code(), "SKEIN-026");
        assert!(err.to_string().contains("api"));
    }

    // ═══════════════════════════════════════════════════════════════
    // FUNCTION
    // ═══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn function_runs_code_against_input() {
        let op = registry().get(BlockKind::Function).unwrap();
        let outcome = op
            .run(request(
                json!({"id": "calc", "kind": "function", "config": {"code": "return input.x + 1"}}),
                json!({"code": "return input.x + 1", "input": {"x": 4}}),
            ))
            .await;

        assert_eq!(outcome.result.unwrap(), json!(5));
        assert_eq!(outcome.stdout.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn function_failure_keeps_stdout() {
        let op = registry().get(BlockKind::Function).unwrap();
        let outcome = op
            .run(request(
                json!({"id": "bad", "kind": "function",
                       "config": {"code": "print('x') error('no')"}}),
                json!({"code": "print('x') error('no')"}),
            ))
            .await;

        assert!(outcome.result.is_err());
        assert_eq!(outcome.stdout.as_deref(), Some("x\n"));
    }

    // ═══════════════════════════════════════════════════════════════
    // CONDITION
    // ═══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn condition_true_selects_then() {
        let op = registry().get(BlockKind::Condition).unwrap();
        let outcome = op
            .run(request(
                json!({"id": "gate", "kind": "condition",
                       "config": {"expression": "input.n > 10"},
                       "branches": {"then": [], "else": []}}),
                json!({"expression": "input.n > 10", "input": {"n": 11}}),
            ))
            .await;

        let value = outcome.result.unwrap();
        assert_eq!(value["branch"], "then");
        assert_eq!(value["value"], json!(true));
    }

    #[tokio::test]
    async fn condition_false_selects_else() {
        let op = registry().get(BlockKind::Condition).unwrap();
        let outcome = op
            .run(request(
                json!({"id": "gate", "kind": "condition",
                       "config": {"expression": "input.n > 10"},
                       "branches": {"then": []}}),
                json!({"expression": "input.n > 10", "input": {"n": 3}}),
            ))
            .await;

        assert_eq!(outcome.result.unwrap()["branch"], "else");
    }

    #[tokio::test]
    async fn condition_string_selects_named_branch() {
        let op = registry().get(BlockKind::Condition).unwrap();
        let outcome = op
            .run(request(
                json!({"id": "route", "kind": "condition",
                       "config": {"expression": "input.tier"},
                       "branches": {"gold": [], "silver": []}}),
                json!({"expression": "input.tier", "input": {"tier": "gold"}}),
            ))
            .await;

        assert_eq!(outcome.result.unwrap()["branch"], "gold");
    }

    #[tokio::test]
    async fn condition_rejects_non_branch_result() {
        let op = registry().get(BlockKind::Condition).unwrap();
        let outcome = op
            .run(request(
                json!({"id": "gate", "kind": "condition",
                       "config": {"expression": "42"},
                       "branches": {"then": []}}),
                json!({"expression": "42"}),
            ))
            .await;

        let err = outcome.result.unwrap_err();
        assert_eq!(err.code(), "SKEIN-063");
        assert!(err.to_string().contains("boolean or branch name"));
    }

    // ═══════════════════════════════════════════════════════════════
    // RESPONSE
    // ═══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn response_returns_resolved_data() {
        let op = registry().get(BlockKind::Response).unwrap();
        let outcome = op
            .run(request(
                json!({"id": "out", "kind": "response", "config": {}}),
                json!({"data": {"total": 12}}),
            ))
            .await;

        assert_eq!(outcome.result.unwrap(), json!({"total": 12}));
    }

    #[tokio::test]
    async fn response_without_data_is_null() {
        let op = registry().get(BlockKind::Response).unwrap();
        let outcome = op
            .run(request(
                json!({"id": "out", "kind": "response", "config": {}}),
                json!({}),
            ))
            .await;

        assert_eq!(outcome.result.unwrap(), Value::Null);
    }
}

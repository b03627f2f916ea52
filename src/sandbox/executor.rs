//! Sandbox Executor - isolated execution of function block code
//!
//! Each invocation gets a fresh Lua interpreter loaded with only the safe
//! stdlib subset (table/string/math/coroutine). No os, no io, no package:
//! nothing inside the sandbox can reach the filesystem, spawn processes, or
//! open sockets. The capability surface visible to block authors is exactly:
//!
//! - `input`: the resolved block input
//! - `print(...)`: appends to a captured stdout buffer
//! - the safe stdlib subset
//!
//! Enforcement:
//! - wall-clock deadline via an instruction-count hook (preemptive; also
//!   observes run cancellation)
//! - memory ceiling via the interpreter's allocator limit
//! - an outer watchdog covering hook latency
//!
//! The chunk runs on a blocking thread, so `execute` is a single suspension
//! point from the scheduler's perspective. The interpreter is dropped after
//! every call; no state survives between invocations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mlua::{Lua, LuaOptions, LuaSerdeExt, StdLib, Value as LuaValue, Variadic, VmState};
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::SkeinError;
use crate::util::constants::{SANDBOX_HOOK_INTERVAL, SANDBOX_WATCHDOG_GRACE};

use super::limits::SandboxLimits;

/// Result of one sandbox invocation.
///
/// Stdout is captured even when the outcome is an error: whatever the code
/// printed before failing is part of the block's record.
#[derive(Debug)]
pub struct SandboxResult {
    pub outcome: Result<Value, SkeinError>,
    pub stdout: String,
    pub elapsed: Duration,
}

/// Flags set by the instruction hook before it aborts the chunk, so the
/// resulting error can be classified after the fact.
#[derive(Default)]
struct AbortFlags {
    timed_out: AtomicBool,
    cancelled: AtomicBool,
}

/// Executes function block code in per-invocation isolation
#[derive(Debug, Clone, Default)]
pub struct SandboxExecutor;

impl SandboxExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `code` against `input` under `limits`.
    ///
    /// Suspends the caller until the chunk completes, times out, exhausts
    /// memory, errors, or is cancelled; never returns control early.
    #[instrument(skip(self, code, input, cancel), fields(code_len = code.len()))]
    pub async fn execute(
        &self,
        code: &str,
        input: Value,
        limits: SandboxLimits,
        cancel: CancellationToken,
    ) -> SandboxResult {
        let started = Instant::now();
        let stdout = Arc::new(Mutex::new(String::new()));
        let flags = Arc::new(AbortFlags::default());

        let code = code.to_string();
        let stdout_inner = Arc::clone(&stdout);
        let flags_inner = Arc::clone(&flags);

        let handle = tokio::task::spawn_blocking(move || {
            run_chunk(&code, input, limits, cancel, stdout_inner, flags_inner)
        });

        // Watchdog: the hook aborts the chunk at the deadline; the grace
        // period only covers hook latency. If even that elapses the
        // blocking thread is abandoned and the run proceeds.
        let joined =
            tokio::time::timeout(limits.timeout + SANDBOX_WATCHDOG_GRACE, handle).await;

        let elapsed = started.elapsed();
        let captured = stdout.lock().clone();

        let outcome = match joined {
            Err(_) => Err(SkeinError::SandboxTimeout {
                limit_ms: limits.timeout.as_millis() as u64,
            }),
            Ok(Err(join_err)) => Err(SkeinError::SandboxRuntime {
                message: format!("sandbox worker panicked: {}", join_err),
            }),
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(lua_err))) => Err(classify(lua_err, &flags, &limits)),
        };

        debug!(elapsed_ms = elapsed.as_millis() as u64, ok = outcome.is_ok(), "sandbox settled");

        SandboxResult {
            outcome,
            stdout: captured,
            elapsed,
        }
    }
}

/// Build the isolated interpreter and evaluate the chunk. Runs on the
/// blocking pool.
fn run_chunk(
    code: &str,
    input: Value,
    limits: SandboxLimits,
    cancel: CancellationToken,
    stdout: Arc<Mutex<String>>,
    flags: Arc<AbortFlags>,
) -> Result<Value, mlua::Error> {
    let lua = Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::COROUTINE,
        LuaOptions::default(),
    )?;

    lua.set_memory_limit(limits.memory)?;

    let globals = lua.globals();

    // Base library leaks file access through dofile/loadfile; close it.
    globals.set("dofile", LuaValue::Nil)?;
    globals.set("loadfile", LuaValue::Nil)?;

    // Logging capability: print appends to the captured buffer
    let print_buffer = Arc::clone(&stdout);
    let print = lua.create_function(move |_, args: Variadic<LuaValue>| {
        let mut line = String::new();
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                line.push('\t');
            }
            match arg.to_string() {
                Ok(s) => line.push_str(&s),
                Err(_) => line.push_str(arg.type_name()),
            }
        }
        line.push('\n');
        print_buffer.lock().push_str(&line);
        Ok(())
    })?;
    globals.set("print", print)?;

    globals.set("input", lua.to_value(&input)?)?;

    // Preemptive supervision: abort the chunk at the deadline or on run
    // cancellation. Flags record which one fired for classification.
    let deadline = Instant::now() + limits.timeout;
    let hook_flags = Arc::clone(&flags);
    lua.set_hook(
        mlua::HookTriggers::new().every_nth_instruction(SANDBOX_HOOK_INTERVAL),
        move |_lua, _debug| {
            if cancel.is_cancelled() {
                hook_flags.cancelled.store(true, Ordering::SeqCst);
                return Err(mlua::Error::RuntimeError("run cancelled".to_string()));
            }
            if Instant::now() >= deadline {
                hook_flags.timed_out.store(true, Ordering::SeqCst);
                return Err(mlua::Error::RuntimeError("deadline exceeded".to_string()));
            }
            Ok(VmState::Continue)
        },
    );

    let result: LuaValue = lua.load(code).set_name("block code").eval()?;
    lua.from_value(result)
}

/// Map an interpreter error to the sandbox error taxonomy.
fn classify(err: mlua::Error, flags: &AbortFlags, limits: &SandboxLimits) -> SkeinError {
    if flags.cancelled.load(Ordering::SeqCst) {
        return SkeinError::SandboxCancelled;
    }
    if flags.timed_out.load(Ordering::SeqCst) {
        return SkeinError::SandboxTimeout {
            limit_ms: limits.timeout.as_millis() as u64,
        };
    }

    match err {
        mlua::Error::SyntaxError { message, .. } => SkeinError::SandboxSyntax { details: message },
        mlua::Error::MemoryError(_) => SkeinError::SandboxMemoryExceeded {
            limit_bytes: limits.memory,
        },
        mlua::Error::CallbackError { traceback, cause } => {
            // Memory exhaustion inside a callback still counts as memory
            if matches!(&*cause, mlua::Error::MemoryError(_)) {
                return SkeinError::SandboxMemoryExceeded {
                    limit_bytes: limits.memory,
                };
            }
            SkeinError::SandboxRuntime {
                message: format!("{}\n{}", cause, traceback),
            }
        }
        other => SkeinError::SandboxRuntime {
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn limits_with_timeout(secs: u64) -> SandboxLimits {
        SandboxLimits {
            timeout: Duration::from_secs(secs),
            ..SandboxLimits::default()
        }
    }

    async fn run(code: &str, input: Value) -> SandboxResult {
        SandboxExecutor::new()
            .execute(code, input, SandboxLimits::default(), CancellationToken::new())
            .await
    }

    // ═══════════════════════════════════════════════════════════════
    // HAPPY PATH
    // ═══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn returns_computed_value() {
        let result = run("return input.x + 1", json!({"x": 4})).await;
        assert_eq!(result.outcome.unwrap(), json!(5));
        assert!(result.stdout.is_empty());
    }

    #[tokio::test]
    async fn returns_structured_value() {
        let result = run(
            "return { total = input.a + input.b, tags = {'x', 'y'} }",
            json!({"a": 2, "b": 3}),
        )
        .await;
        assert_eq!(
            result.outcome.unwrap(),
            json!({"total": 5, "tags": ["x", "y"]})
        );
    }

    #[tokio::test]
    async fn print_is_captured_not_leaked() {
        let result = run(
            "print('step', 1) print('done') return true",
            Value::Null,
        )
        .await;
        assert_eq!(result.outcome.unwrap(), json!(true));
        assert_eq!(result.stdout, "step\t1\ndone\n");
    }

    #[tokio::test]
    async fn coroutines_are_available() {
        // Async-style code suspending on internally-resolved values
        let result = run(
            r#"
            local co = coroutine.create(function(n) coroutine.yield(n * 2) end)
            local _, doubled = coroutine.resume(co, input.n)
            return doubled
            "#,
            json!({"n": 21}),
        )
        .await;
        assert_eq!(result.outcome.unwrap(), json!(42));
    }

    #[tokio::test]
    async fn elapsed_is_recorded() {
        let result = run("return 1", Value::Null).await;
        assert!(result.elapsed > Duration::ZERO);
    }

    // ═══════════════════════════════════════════════════════════════
    // FAILURE CLASSIFICATION
    // ═══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn infinite_loop_times_out() {
        let result = SandboxExecutor::new()
            .execute(
                "while true do end",
                Value::Null,
                limits_with_timeout(1),
                CancellationToken::new(),
            )
            .await;

        match result.outcome.unwrap_err() {
            SkeinError::SandboxTimeout { limit_ms } => assert_eq!(limit_ms, 1_000),
            other => panic!("expected timeout, got {other}"),
        }
        // Bounded: well under the watchdog grace on top of the 1s deadline
        assert!(result.elapsed < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn memory_ceiling_is_enforced() {
        let limits = SandboxLimits {
            memory: 2 * 1024 * 1024,
            ..limits_with_timeout(10)
        };
        let result = SandboxExecutor::new()
            .execute(
                "local t = {} local i = 1 while true do t[i] = string.rep('x', 4096) i = i + 1 end",
                Value::Null,
                limits,
                CancellationToken::new(),
            )
            .await;

        assert!(matches!(
            result.outcome.unwrap_err(),
            SkeinError::SandboxMemoryExceeded { .. }
        ));
    }

    #[tokio::test]
    async fn thrown_error_is_runtime_with_message() {
        let result = run("error('user boom')", Value::Null).await;
        match result.outcome.unwrap_err() {
            SkeinError::SandboxRuntime { message } => assert!(message.contains("user boom")),
            other => panic!("expected runtime error, got {other}"),
        }
    }

    #[tokio::test]
    async fn syntax_error_is_distinguished() {
        let result = run("return ((", Value::Null).await;
        assert!(matches!(
            result.outcome.unwrap_err(),
            SkeinError::SandboxSyntax { .. }
        ));
    }

    #[tokio::test]
    async fn stdout_survives_failure() {
        let result = run("print('before crash') error('x')", Value::Null).await;
        assert!(result.outcome.is_err());
        assert_eq!(result.stdout, "before crash\n");
    }

    // ═══════════════════════════════════════════════════════════════
    // CAPABILITY SURFACE
    // ═══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn network_capability_is_absent() {
        // No socket library exists; reaching for one fails, never succeeds
        let result = run("return socket.connect('example.com', 80)", Value::Null).await;
        assert!(matches!(
            result.outcome.unwrap_err(),
            SkeinError::SandboxRuntime { .. }
        ));
    }

    #[tokio::test]
    async fn filesystem_capability_is_absent() {
        for code in [
            "return io.open('/etc/passwd')",
            "return os.execute('ls')",
            "return dofile('/etc/passwd')",
            "return loadfile('/etc/passwd')",
            "return require('io')",
        ] {
            let result = run(code, Value::Null).await;
            assert!(
                matches!(result.outcome, Err(SkeinError::SandboxRuntime { .. })),
                "{code} must be denied"
            );
        }
    }

    #[tokio::test]
    async fn no_state_leaks_between_invocations() {
        let executor = SandboxExecutor::new();
        let first = executor
            .execute(
                "leak = 'secret' return true",
                Value::Null,
                SandboxLimits::default(),
                CancellationToken::new(),
            )
            .await;
        assert_eq!(first.outcome.unwrap(), json!(true));

        let second = executor
            .execute(
                "return leak == nil",
                Value::Null,
                SandboxLimits::default(),
                CancellationToken::new(),
            )
            .await;
        assert_eq!(second.outcome.unwrap(), json!(true));
    }

    // ═══════════════════════════════════════════════════════════════
    // CANCELLATION
    // ═══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn cancellation_interrupts_running_code() {
        let cancel = CancellationToken::new();
        let child = cancel.clone();

        let task = tokio::spawn(async move {
            SandboxExecutor::new()
                .execute(
                    "while true do end",
                    Value::Null,
                    limits_with_timeout(30),
                    child,
                )
                .await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        let result = task.await.unwrap();
        assert!(matches!(
            result.outcome.unwrap_err(),
            SkeinError::SandboxCancelled
        ));
        assert!(result.elapsed < Duration::from_secs(5));
    }
}

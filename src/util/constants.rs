//! Centralized constants for engine runtime configuration
//!
//! All timeout and limit values in one place for easy tuning.

use std::time::Duration;

// ═══════════════════════════════════════════════════════════════
// Sandbox Limits
// ═══════════════════════════════════════════════════════════════

/// Default wall-clock timeout for function block code
pub const SANDBOX_TIMEOUT: Duration = Duration::from_secs(30);

/// Hard upper bound for per-block timeout overrides
pub const SANDBOX_TIMEOUT_MAX: Duration = Duration::from_secs(300);

/// Default memory ceiling for one sandbox invocation (bytes)
pub const SANDBOX_MEMORY_LIMIT: usize = 128 * 1024 * 1024;

/// Instruction interval between deadline/cancellation checks in the
/// sandbox hook. Small enough to interrupt a tight loop within
/// milliseconds, large enough to stay off the hot path.
pub const SANDBOX_HOOK_INTERVAL: u32 = 10_000;

/// Grace period added to the outer watchdog on top of the sandbox
/// deadline, covering hook latency before the chunk aborts.
pub const SANDBOX_WATCHDOG_GRACE: Duration = Duration::from_secs(2);

// ═══════════════════════════════════════════════════════════════
// Scheduler Limits
// ═══════════════════════════════════════════════════════════════

/// Capacity of the per-run status event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

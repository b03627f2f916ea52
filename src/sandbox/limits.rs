//! Sandbox resource limits
//!
//! One `SandboxLimits` value per invocation: wall-clock deadline and memory
//! ceiling. Per-block timeout overrides are clamped to the configured upper
//! bound so a graph cannot opt out of supervision.

use std::time::Duration;

use crate::util::constants::{SANDBOX_MEMORY_LIMIT, SANDBOX_TIMEOUT, SANDBOX_TIMEOUT_MAX};

/// Resource limits for one sandbox invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Wall-clock timeout measured from the start of execution
    pub timeout: Duration,
    /// Memory ceiling in bytes for the interpreter's allocator
    pub memory: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            timeout: SANDBOX_TIMEOUT,
            memory: SANDBOX_MEMORY_LIMIT,
        }
    }
}

impl SandboxLimits {
    /// Apply a per-block timeout override, clamped to `max_timeout`
    pub fn with_timeout_override(self, override_secs: Option<u64>, max_timeout: Duration) -> Self {
        let Some(secs) = override_secs else {
            return self;
        };
        let requested = Duration::from_secs(secs.max(1));
        Self {
            timeout: requested.min(max_timeout),
            ..self
        }
    }
}

/// Default upper bound for timeout overrides
pub fn default_max_timeout() -> Duration {
    SANDBOX_TIMEOUT_MAX
}

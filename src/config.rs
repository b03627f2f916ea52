//! Engine Configuration
//!
//! Persistent configuration for sandbox limits. Config is stored in
//! `~/.config/skein/config.toml`.
//!
//! ## Priority order (highest to lowest)
//!
//! 1. Environment variables (`SKEIN_SANDBOX_TIMEOUT_SECS`, ...)
//! 2. Config file (`~/.config/skein/config.toml`)
//! 3. Defaults

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SkeinError};
use crate::sandbox::SandboxLimits;
use crate::util::constants::{SANDBOX_MEMORY_LIMIT, SANDBOX_TIMEOUT, SANDBOX_TIMEOUT_MAX};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Sandbox limit settings
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

/// Sandbox limit settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SandboxConfig {
    /// Default wall-clock timeout for function blocks (seconds)
    pub timeout_secs: u64,
    /// Upper bound for per-block timeout overrides (seconds)
    pub max_timeout_secs: u64,
    /// Memory ceiling per invocation (MiB)
    pub memory_mib: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_secs: SANDBOX_TIMEOUT.as_secs(),
            max_timeout_secs: SANDBOX_TIMEOUT_MAX.as_secs(),
            memory_mib: SANDBOX_MEMORY_LIMIT / (1024 * 1024),
        }
    }
}

impl EngineConfig {
    /// Config directory: `~/.config/skein/` on Unix
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("skein")
    }

    /// Config file path: `~/.config/skein/config.toml`
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration: file if present, then env overrides.
    ///
    /// Returns defaults when no file exists; errors only on a malformed
    /// file or malformed env values.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        let mut config = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| SkeinError::ConfigError {
                reason: format!("failed to read config file: {}", e),
            })?;
            toml::from_str(&content).map_err(|e| SkeinError::ConfigError {
                reason: format!("failed to parse config file: {}", e),
            })?
        } else {
            Self::default()
        };

        config.apply_env()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env(&mut self) -> Result<()> {
        if let Some(secs) = read_env_u64("SKEIN_SANDBOX_TIMEOUT_SECS")? {
            self.sandbox.timeout_secs = secs;
        }
        if let Some(secs) = read_env_u64("SKEIN_SANDBOX_MAX_TIMEOUT_SECS")? {
            self.sandbox.max_timeout_secs = secs;
        }
        if let Some(mib) = read_env_u64("SKEIN_SANDBOX_MEMORY_MIB")? {
            self.sandbox.memory_mib = mib as usize;
        }
        Ok(())
    }

    /// Default sandbox limits derived from this config
    pub fn sandbox_limits(&self) -> SandboxLimits {
        SandboxLimits {
            timeout: Duration::from_secs(self.sandbox.timeout_secs.max(1)),
            memory: self.sandbox.memory_mib.max(1) * 1024 * 1024,
        }
    }

    /// Upper bound for per-block timeout overrides
    pub fn max_sandbox_timeout(&self) -> Duration {
        Duration::from_secs(
            self.sandbox
                .max_timeout_secs
                .max(self.sandbox.timeout_secs)
                .max(1),
        )
    }
}

fn read_env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<u64>()
            .map(Some)
            .map_err(|_| SkeinError::ConfigError {
                reason: format!("{} must be a positive integer, got '{}'", name, raw),
            }),
        Err(_) => Ok(None),
    }
}

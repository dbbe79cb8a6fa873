/*!
 * Kernel Configuration
 *
 * Runtime configuration with defaults taken from `limits`, an optional JSON
 * file, and `KERNEL_*` environment overrides.
 */

use super::data_structures::InlineString;
use super::errors::{KernelError, KernelResult};
use super::limits::*;
use super::serde::skip_serializing_none;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// Kernel configuration
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default, deny_unknown_fields)]
pub struct KernelConfig {
    /// Maximum number of live process/thread records
    pub max_processes: usize,
    /// Largest pid before the allocator wraps
    pub max_pid: u32,
    /// Descriptor table capacity per process
    pub max_fds: usize,
    /// Symlink expansions allowed per resolution
    pub max_symlink_expansions: usize,
    /// Ring buffer size of pipes and socket pairs
    pub pipe_capacity: usize,
    /// Length of one cooperative scheduling quantum in microseconds
    pub scheduler_quantum_us: u64,
    /// Host directory mounted at /storage
    pub storage_path: Option<PathBuf>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_processes: DEFAULT_MAX_PROCESSES,
            max_pid: DEFAULT_MAX_PID,
            max_fds: STANDARD_MAX_FILE_DESCRIPTORS,
            max_symlink_expansions: MAX_SYMLINK_EXPANSIONS,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
            scheduler_quantum_us: DEFAULT_SCHEDULER_QUANTUM.as_micros() as u64,
            storage_path: None,
        }
    }
}

impl KernelConfig {
    /// Load configuration from the environment
    ///
    /// Environment variables:
    /// - KERNEL_CONFIG: path to a JSON config file (optional)
    /// - KERNEL_STORAGE_PATH: host directory mounted at /storage
    /// - KERNEL_MAX_PROCESSES, KERNEL_MAX_PID, KERNEL_MAX_FDS, KERNEL_PIPE_CAPACITY,
    ///   KERNEL_QUANTUM_US: numeric overrides
    pub fn from_env() -> KernelResult<Self> {
        let mut config = match std::env::var("KERNEL_CONFIG") {
            Ok(path) => Self::from_file(&PathBuf::from(path))?,
            Err(_) => Self::default(),
        };

        if let Ok(path) = std::env::var("KERNEL_STORAGE_PATH") {
            config.storage_path = Some(PathBuf::from(path));
        }
        override_from_env("KERNEL_MAX_PROCESSES", &mut config.max_processes)?;
        override_from_env("KERNEL_MAX_PID", &mut config.max_pid)?;
        override_from_env("KERNEL_MAX_FDS", &mut config.max_fds)?;
        override_from_env("KERNEL_PIPE_CAPACITY", &mut config.pipe_capacity)?;
        override_from_env("KERNEL_QUANTUM_US", &mut config.scheduler_quantum_us)?;

        config.validate()?;
        debug!(?config, "Kernel configuration loaded");
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &PathBuf) -> KernelResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            KernelError::Configuration(format!("cannot read {}: {}", path.display(), e).into())
        })?;
        Self::from_json(&text)
    }

    /// Parse configuration from JSON text
    pub fn from_json(text: &str) -> KernelResult<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| KernelError::Configuration(format!("invalid config: {}", e).into()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject limits that would make the kernel unusable
    pub fn validate(&self) -> KernelResult<()> {
        let zero = |name: &str| KernelError::Configuration(InlineString::from(format!("{} must be positive", name)));
        if self.max_processes == 0 {
            return Err(zero("max_processes"));
        }
        if self.max_fds == 0 {
            return Err(zero("max_fds"));
        }
        if self.pipe_capacity == 0 {
            return Err(zero("pipe_capacity"));
        }
        if self.pipe_capacity > MAX_PIPE_CAPACITY {
            return Err(KernelError::Configuration(
                format!("pipe_capacity exceeds {}", MAX_PIPE_CAPACITY).into(),
            ));
        }
        if self.max_pid < FIRST_USER_PID {
            return Err(KernelError::Configuration(
                format!("max_pid must be at least {}", FIRST_USER_PID).into(),
            ));
        }
        Ok(())
    }

    /// Scheduling quantum as a duration
    #[inline]
    pub fn scheduler_quantum(&self) -> Duration {
        Duration::from_micros(self.scheduler_quantum_us)
    }
}

fn override_from_env<T: std::str::FromStr>(name: &str, slot: &mut T) -> KernelResult<()> {
    if let Ok(raw) = std::env::var(name) {
        match raw.parse() {
            Ok(value) => *slot = value,
            Err(_) => {
                warn!(variable = name, value = %raw, "Ignoring unparsable override");
                return Err(KernelError::Configuration(
                    format!("{} is not a number: {}", name, raw).into(),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = KernelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_fds, 1024);
        assert_eq!(config.scheduler_quantum(), Duration::from_millis(1));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = KernelConfig::from_json(r#"{"max_fds": 16}"#).unwrap();
        assert_eq!(config.max_fds, 16);
        assert_eq!(config.max_pid, DEFAULT_MAX_PID);
    }

    #[test]
    fn test_rejects_zero_limits_and_unknown_fields() {
        assert!(KernelConfig::from_json(r#"{"max_fds": 0}"#).is_err());
        assert!(KernelConfig::from_json(r#"{"max_files": 3}"#).is_err());
    }
}

/// Engine configuration loaded from an optional JSON file
use crate::config::namespace::NamespacePolicy;
use crate::config::types::{Result, SnipboxError, DEFAULT_TIMEOUT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// What happens to stdout captured before a timeout.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimeoutOutputPolicy {
    /// Report empty output
    #[default]
    #[serde(rename = "discard")]
    Discard,
    /// Report whatever was captured up to the kill
    #[serde(rename = "partial")]
    Partial,
}

/// Execution engine configuration.
///
/// Every field has a default, so a config file only lists overrides.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interpreter executable (absolute path, or a name resolved through PATH)
    pub interpreter: PathBuf,
    /// Wall-clock budget per execution unit
    pub timeout_ms: u64,
    pub timeout_output: TimeoutOutputPolicy,
    /// Grace period between SIGTERM and SIGKILL on timeout
    pub kill_grace_ms: u64,
    /// Supervisor poll interval
    pub poll_interval_ms: u64,
    /// Upper bound on waiting for collectors after the unit is reaped
    pub collection_timeout_ms: u64,
    /// Admission cap on concurrently running units
    pub max_concurrent_units: usize,
    /// Per-stream capture limits (bytes)
    pub stdout_limit: usize,
    pub stderr_limit: usize,
    /// Builtins visible to executed code
    pub namespace: NamespacePolicy,
    /// Extra environment entries for the interpreter process
    pub environment: Vec<(String, String)>,
    /// Working directory of the interpreter process
    pub workdir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from("/usr/bin/python3"),
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            timeout_output: TimeoutOutputPolicy::Discard,
            kill_grace_ms: 100,
            poll_interval_ms: 10,
            collection_timeout_ms: 1000,
            max_concurrent_units: 16,
            stdout_limit: 1024 * 1024,
            stderr_limit: 256 * 1024,
            namespace: NamespacePolicy::default(),
            environment: Vec::new(),
            workdir: std::env::temp_dir(),
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file; missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SnipboxError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
            .map_err(|e| SnipboxError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| SnipboxError::Config(format!("invalid engine config: {}", e)))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn collection_timeout(&self) -> Duration {
        Duration::from_millis(self.collection_timeout_ms)
    }

    /// Resolve the interpreter to an executable path.
    ///
    /// Absolute paths are used as-is; bare names are searched on PATH.
    pub fn resolve_interpreter(&self) -> Option<PathBuf> {
        if self.interpreter.is_absolute() {
            return self.interpreter.is_file().then(|| self.interpreter.clone());
        }
        let path_var = std::env::var_os("PATH")?;
        std::env::split_paths(&path_var)
            .map(|dir| dir.join(&self.interpreter))
            .find(|candidate| candidate.is_file())
    }
}

//! Execution units
//!
//! Spawns one interpreter process per execution and hands it to the
//! supervisor for deadline enforcement.

pub mod executor;

#[cfg(test)]
pub(crate) mod test_support {
    use super::executor::Executor;
    use crate::config::engine::EngineConfig;
    use crate::config::namespace::NamespacePolicy;
    use crate::config::types::{FaultKind, Result};
    use crate::judge::adapter::LanguageAdapter;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    /// `/bin/sh` reading its script from stdin; keeps lifecycle tests
    /// independent of a Python install.
    pub struct ShellAdapter;

    impl LanguageAdapter for ShellAdapter {
        fn language(&self) -> &'static str {
            "sh"
        }

        fn display_name(&self) -> &'static str {
            "Shell"
        }

        fn run_command(&self, interpreter: &Path, _namespace: &NamespacePolicy) -> Result<Vec<String>> {
            Ok(vec![interpreter.to_string_lossy().to_string(), "-s".to_string()])
        }

        fn version_command(&self, interpreter: &Path) -> Vec<String> {
            vec![interpreter.to_string_lossy().to_string()]
        }

        fn classify_exit(&self, exit_code: Option<i32>, _signal: Option<i32>) -> Option<FaultKind> {
            match exit_code {
                Some(0) => None,
                Some(2) => Some(FaultKind::Compile),
                _ => Some(FaultKind::Runtime),
            }
        }
    }

    pub fn shell_executor(config: EngineConfig) -> Executor {
        let config = EngineConfig {
            interpreter: PathBuf::from("/bin/sh"),
            ..config
        };
        Executor::new(Arc::new(ShellAdapter), &config).expect("shell executor")
    }

    /// True once `pid` is gone, or is a zombie waiting for its new parent.
    pub fn wait_until_gone(pid: i32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let alive = match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
                Ok(stat) => stat
                    .rsplit_once(')')
                    .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
                    .unwrap_or(false),
                Err(_) => false,
            };
            if !alive {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

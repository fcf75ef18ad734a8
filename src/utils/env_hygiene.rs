/// Environment hygiene for interpreter processes.
///
/// Units never inherit the server's environment. Each one starts from an
/// empty environment plus a small deterministic set and any configured extras.
use crate::config::types::{Result, SnipboxError};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Loader variables that are never passed through.
const LOADER_VARS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    "LD_BIND_NOW",
    "LD_DEBUG",
    "LD_PROFILE",
    "LD_USE_LOAD_BIAS",
    "LD_DYNAMIC_WEAK",
];

const DETERMINISTIC_PATH: &str = "/usr/local/bin:/usr/bin:/bin";
const DETERMINISTIC_LOCALE: &str = "C.UTF-8";

/// Environment construction policy
#[derive(Debug, Clone)]
pub struct EnvPolicy {
    /// Directory used for HOME and TMPDIR
    pub scratch_dir: PathBuf,
}

impl Default for EnvPolicy {
    fn default() -> Self {
        EnvPolicy {
            scratch_dir: std::env::temp_dir(),
        }
    }
}

/// Environment hygiene manager
pub struct EnvHygiene {
    env_policy: EnvPolicy,
}

impl EnvHygiene {
    pub fn new(env_policy: EnvPolicy) -> Self {
        EnvHygiene { env_policy }
    }

    /// Build the complete environment for one interpreter process.
    ///
    /// Extras are applied last and may override the deterministic entries,
    /// except loader variables, which are rejected.
    pub fn build_environment(&self, extra: &[(String, String)]) -> Result<BTreeMap<String, String>> {
        let mut env_map = BTreeMap::new();
        env_map.insert("PATH".to_string(), DETERMINISTIC_PATH.to_string());
        env_map.insert("LANG".to_string(), DETERMINISTIC_LOCALE.to_string());
        env_map.insert("LC_ALL".to_string(), DETERMINISTIC_LOCALE.to_string());

        let scratch = self.env_policy.scratch_dir.to_string_lossy().to_string();
        env_map.insert("HOME".to_string(), scratch.clone());
        env_map.insert("TMPDIR".to_string(), scratch);

        for (key, value) in extra {
            if LOADER_VARS.contains(&key.as_str()) || key.starts_with("LD_") {
                return Err(SnipboxError::Config(format!(
                    "loader variable {} cannot be passed to the interpreter",
                    key
                )));
            }
            env_map.insert(key.clone(), value.clone());
        }

        Ok(env_map)
    }
}

/// Validate environment safety
pub fn validate_environment_safety(env_map: &BTreeMap<String, String>) -> Vec<String> {
    let mut warnings = Vec::new();

    for var in LOADER_VARS {
        if env_map.contains_key(*var) {
            warnings.push(format!("Dangerous environment variable present: {}", var));
        }
    }

    if let Some(path) = env_map.get("PATH") {
        if path.contains("..") || path.contains('~') {
            warnings.push("PATH contains relative or home directory references".to_string());
        }
    }

    warnings
}

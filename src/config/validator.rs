// Engine config validation.
// Fails fast at startup with actionable errors; warnings are logged and tolerated.

use crate::config::engine::EngineConfig;
use crate::config::types::{Result, SnipboxError};

/// Validation result with detailed errors
#[derive(Debug)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate config at startup. Any error is fatal.
pub fn validate_config(config: &EngineConfig) -> Result<ValidationResult> {
    let result = collect_findings(config);

    if !result.is_valid() {
        let error_msg = format!(
            "Config validation failed:\n{}",
            result.errors.join("\n")
        );
        return Err(SnipboxError::Config(error_msg));
    }

    Ok(result)
}

/// Run every check and report all findings without failing.
pub fn collect_findings(config: &EngineConfig) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_timing(config, &mut result);
    validate_limits(config, &mut result);
    validate_paths(config, &mut result);
    validate_namespace(config, &mut result);
    validate_environment(config, &mut result);

    result
}

fn validate_timing(config: &EngineConfig, result: &mut ValidationResult) {
    if config.timeout_ms == 0 {
        result.add_error("timeout_ms cannot be zero".to_string());
    }
    if config.timeout_ms > 5 * 60 * 1000 {
        result.add_warning(format!(
            "timeout_ms {} is very high (> 5 minutes); requests will hold capacity that long",
            config.timeout_ms
        ));
    }

    if config.poll_interval_ms == 0 {
        result.add_error("poll_interval_ms cannot be zero".to_string());
    }
    if config.timeout_ms > 0 && config.poll_interval_ms > config.timeout_ms {
        result.add_warning(format!(
            "poll_interval_ms ({}) exceeds timeout_ms ({}); deadline overshoot will be large",
            config.poll_interval_ms, config.timeout_ms
        ));
    }

    if config.kill_grace_ms > 5000 {
        result.add_warning(format!(
            "kill_grace_ms {} delays timeout responses by up to that long",
            config.kill_grace_ms
        ));
    }

    if config.collection_timeout_ms == 0 {
        result.add_error("collection_timeout_ms cannot be zero".to_string());
    }
}

fn validate_limits(config: &EngineConfig, result: &mut ValidationResult) {
    if config.max_concurrent_units == 0 {
        result.add_error("max_concurrent_units cannot be zero".to_string());
    }

    if config.stdout_limit == 0 {
        result.add_error("stdout_limit cannot be zero".to_string());
    }
    if config.stderr_limit == 0 {
        result.add_error("stderr_limit cannot be zero".to_string());
    } else if config.stderr_limit < 4096 {
        result.add_warning(format!(
            "stderr_limit {} is very low (< 4KB); fault traces may be truncated",
            config.stderr_limit
        ));
    }
}

fn validate_paths(config: &EngineConfig, result: &mut ValidationResult) {
    if config.interpreter.as_os_str().is_empty() {
        result.add_error("interpreter cannot be empty".to_string());
    } else if config.resolve_interpreter().is_none() {
        // Not fatal: check-deps reports it and spawn failures surface as server errors.
        result.add_warning(format!(
            "interpreter not found: {:?}",
            config.interpreter
        ));
    }

    if !config.workdir.is_absolute() {
        result.add_error(format!(
            "workdir must be absolute path: {:?}",
            config.workdir
        ));
    } else if !config.workdir.is_dir() {
        result.add_warning(format!("workdir does not exist: {:?}", config.workdir));
    }
}

fn validate_namespace(config: &EngineConfig, result: &mut ValidationResult) {
    if let Err(e) = config.namespace.validate() {
        result.add_error(e.to_string());
    }

    if !config.namespace.builtins.iter().any(|n| n == "print") {
        result.add_warning("namespace does not expose 'print'; snippets cannot produce output".to_string());
    }

    let sensitive = config.namespace.sensitive_names();
    if !sensitive.is_empty() {
        result.add_warning(format!(
            "namespace exposes sensitive builtins: {}",
            sensitive.join(", ")
        ));
    }
}

fn validate_environment(config: &EngineConfig, result: &mut ValidationResult) {
    for (key, _) in &config.environment {
        if key.is_empty() || key.contains('=') || key.contains('\0') {
            result.add_error(format!("invalid environment variable name: {:?}", key));
        }
        if key.starts_with("LD_") {
            result.add_error(format!(
                "loader variable {} cannot be passed to the interpreter",
                key
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_valid_default_config() {
        let config = EngineConfig::default();
        let result = validate_config(&config);

        // Default config should be valid (may have warnings)
        assert!(result.is_ok());
    }

    #[test]
    fn test_zero_timeout() {
        let mut config = EngineConfig::default();
        config.timeout_ms = 0;

        let result = collect_findings(&config);
        assert!(!result.is_valid());
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("timeout_ms cannot be zero")));
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_admission_cap() {
        let mut config = EngineConfig::default();
        config.max_concurrent_units = 0;

        let result = collect_findings(&config);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("max_concurrent_units")));
    }

    #[test]
    fn test_zero_output_limits() {
        let mut config = EngineConfig::default();
        config.stdout_limit = 0;
        config.stderr_limit = 0;

        let result = collect_findings(&config);
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_relative_workdir_rejected() {
        let mut config = EngineConfig::default();
        config.workdir = PathBuf::from("relative/dir");

        let result = validate_config(&config);
        assert!(result.is_err());
    }

    #[test]
    fn test_sensitive_builtins_warn() {
        let mut config = EngineConfig::default();
        config.namespace.builtins.push("open".to_string());

        let result = validate_config(&config).unwrap();
        assert!(result.warnings.iter().any(|w| w.contains("open")));
    }

    #[test]
    fn test_loader_env_rejected() {
        let mut config = EngineConfig::default();
        config.environment.push(("LD_PRELOAD".into(), "/tmp/x.so".into()));

        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_missing_interpreter_is_warning() {
        let mut config = EngineConfig::default();
        config.interpreter = PathBuf::from("/nonexistent/python3");

        let result = validate_config(&config).unwrap();
        assert!(result.warnings.iter().any(|w| w.contains("interpreter")));
    }
}
